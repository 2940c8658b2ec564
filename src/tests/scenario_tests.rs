// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Ledger half of the rollback scenarios. The checkpoint half is covered by
//! the node's coordinator tests.

use crate::ledger::Ledger;
use crate::types::{Action, Payload};

#[test]
fn test_rollback_without_marker_wipes_chain() {
    let mut ledger = Ledger::new();
    for i in 0..3 {
        ledger.append(Action::Generate, Payload::generate(&format!("p{}", i), "o")).unwrap();
    }
    ledger.append(Action::Poison, Payload::text("type=TPI, count=40")).unwrap();
    let original: Vec<_> = ledger.blocks().to_vec();

    let marker = ledger.find_last_marker(Action::MarkClean);
    assert_eq!(marker, None);

    let removed = ledger.truncate_after(marker);
    assert_eq!(removed, original);

    let revert = ledger.append(Action::Revert, Payload::revert(None, marker, &removed)).unwrap();
    assert_eq!(revert.index, 1);
    assert_eq!(ledger.len(), 1);
    assert!(ledger.verify());
}

#[test]
fn test_rollback_to_marker_keeps_prefix() {
    let mut ledger = Ledger::new();
    ledger.append(Action::Generate, Payload::generate("P1", "o1")).unwrap();
    ledger.append(Action::MarkClean, Payload::mark_clean(Some("v1"), None)).unwrap();
    ledger.append(Action::Generate, Payload::generate("P2", "o2")).unwrap();
    ledger.append(Action::Poison, Payload::text("desc")).unwrap();
    let prefix: Vec<_> = ledger.blocks()[..2].to_vec();

    let marker = ledger.find_last_marker(Action::MarkClean);
    assert_eq!(marker, Some(2));
    assert_eq!(ledger.get(2).unwrap().payload.checkpoint(), Some("v1"));

    let removed = ledger.truncate_after(marker);
    assert_eq!(removed.iter().map(|b| b.index).collect::<Vec<_>>(), vec![3, 4]);
    assert_eq!(ledger.blocks(), &prefix[..]);

    let revert = ledger.append(Action::Revert, Payload::revert(Some("v1"), marker, &removed)).unwrap();
    assert_eq!(revert.index, 3);
    assert_eq!(revert.payload.get("removed").and_then(|v| v.as_array()).map(|a| a.len()), Some(2));
    assert!(ledger.verify());
}
