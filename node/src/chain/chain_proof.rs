// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Ledger Proof - Audit Trail Generation
//!
//! A compact statement of "which chain, which model" that two parties can
//! compare without exchanging the ledger itself.
//!
//! # Guarantee
//! Same blocks and same active checkpoint → same proof

use lineage_kernel::Digest;
use lineage_persistence::ActivePointer;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::chain::DurableLedger;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerProof {
    pub ledger_length: u64,

    /// Hash of the last block, or the sentinel for an empty chain.
    pub head_hash: Digest,

    /// BLAKE3 of the whole log file (header + entries).
    /// Absent for a process-lifetime ledger.
    pub log_hash: Option<Digest>,

    /// Name of the active checkpoint; `None` when pristine.
    pub active: Option<String>,

    pub active_digest: Option<Digest>,
}

impl LedgerProof {
    /// Two proofs agree on chain and model state.
    ///
    /// The log hash only takes part when both sides have one.
    pub fn matches(&self, other: &LedgerProof) -> bool {
        let logs_agree = match (&self.log_hash, &other.log_hash) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        };
        self.ledger_length == other.ledger_length
            && self.head_hash == other.head_hash
            && self.active_digest == other.active_digest
            && logs_agree
    }
}

/// Hash of a ledger log file using BLAKE3
pub fn compute_log_hash(path: impl AsRef<Path>) -> std::io::Result<Digest> {
    use std::fs::File;
    use std::io::Read;

    let mut file = File::open(path)?;
    let mut hasher = blake3::Hasher::new();
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(Digest(*hasher.finalize().as_bytes()))
}

pub fn generate_proof(ledger: &DurableLedger, active: &ActivePointer) -> std::io::Result<LedgerProof> {
    let log_hash = match ledger.log_path() {
        Some(path) => Some(compute_log_hash(path)?),
        None => None,
    };

    Ok(LedgerProof {
        ledger_length: ledger.ledger().len() as u64,
        head_hash: ledger.ledger().head_hash(),
        log_hash,
        active: active.name().map(str::to_string),
        active_digest: active.digest().copied(),
    })
}
