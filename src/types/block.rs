// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use crate::error::KernelResult;
use crate::hash::block_hash;
use crate::types::{Action, Digest, Payload};
use serde::{Deserialize, Serialize};

/// One ledger entry.
///
/// Serializes to the audit-visible shape
/// `{index, timestamp, action, payload, prevHash, hash}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    /// 1-based position in the chain.
    pub index: u64,
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
    pub action: Action,
    pub payload: Payload,
    pub prev_hash: Digest,
    pub hash: Digest,
}

impl Block {
    /// Builds a block and computes its hash.
    pub fn seal(
        index: u64,
        timestamp: f64,
        action: Action,
        payload: Payload,
        prev_hash: Digest,
    ) -> KernelResult<Self> {
        let hash = block_hash(index, timestamp, action, &payload, &prev_hash)?;
        Ok(Self {
            index,
            timestamp,
            action,
            payload,
            prev_hash,
            hash,
        })
    }

    /// Hash of this block's fields, ignoring the stored `hash`.
    pub fn recompute_hash(&self) -> KernelResult<Digest> {
        block_hash(self.index, self.timestamp, self.action, &self.payload, &self.prev_hash)
    }
}
