// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use crate::error::{IntegrityFault, KernelError};
use crate::ledger::Ledger;
use crate::types::{Action, Payload};
use serde_json::json;

fn sample() -> Ledger {
    let mut ledger = Ledger::new();
    ledger.append_at(Action::Generate, Payload::generate("p1", "o1"), 10.0).unwrap();
    ledger.append_at(Action::Generate, Payload::generate("p2", "o2"), 11.0).unwrap();
    ledger.append_at(Action::Generate, Payload::generate("p3", "o3"), 12.0).unwrap();
    ledger.append_at(Action::Poison, Payload::text("type=TPI, count=40"), 13.0).unwrap();
    ledger
}

#[test]
fn test_tampered_payload_fails_at_that_block() {
    for target in 0..4usize {
        let mut blocks = sample().into_blocks();
        blocks[target].payload = Payload::from_value(json!({ "prompt": "p?", "output": "evil" }));

        let ledger = Ledger::from_unverified(blocks);
        assert!(!ledger.verify());
        assert_eq!(ledger.first_invalid(), Some(target as u64 + 1));
        assert_eq!(
            ledger.check().unwrap_err(),
            KernelError::IntegrityViolation { index: target as u64 + 1, fault: IntegrityFault::HashMismatch }
        );
    }
}

#[test]
fn test_rehashed_tamper_breaks_next_link() {
    let mut blocks = sample().into_blocks();
    blocks[1].payload = Payload::generate("p2", "o2 plus a backdoor");
    blocks[1].hash = blocks[1].recompute_hash().unwrap();

    let ledger = Ledger::from_unverified(blocks);
    assert!(!ledger.verify());
    assert_eq!(
        ledger.check().unwrap_err(),
        KernelError::IntegrityViolation { index: 3, fault: IntegrityFault::LinkMismatch }
    );
}

#[test]
fn test_wrong_sentinel_is_link_mismatch() {
    let mut blocks = sample().into_blocks();
    blocks[0].prev_hash = crate::Digest::of(b"not the sentinel");
    blocks[0].hash = blocks[0].recompute_hash().unwrap();

    let ledger = Ledger::from_unverified(blocks);
    assert_eq!(ledger.first_invalid(), Some(1));
}

#[test]
fn test_index_gap_detected() {
    let mut blocks = sample().into_blocks();
    blocks.remove(1);

    let ledger = Ledger::from_unverified(blocks);
    assert_eq!(
        ledger.check().unwrap_err(),
        KernelError::IntegrityViolation { index: 2, fault: IntegrityFault::IndexGap }
    );
}

#[test]
fn test_from_verified_rejects_tampered_chain() {
    let mut blocks = sample().into_blocks();
    blocks[3].timestamp += 1.0;
    assert!(Ledger::from_verified(blocks).is_err());
    assert!(Ledger::from_verified(sample().into_blocks()).is_ok());
}
