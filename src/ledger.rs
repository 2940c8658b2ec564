// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! In-Memory Ledger
//!
//! The ordered, hash-chained sequence of blocks.
//!
//! # Invariants
//! - `blocks[i].index == i + 1`
//! - `blocks[0].prev_hash == Digest::SENTINEL`
//! - `blocks[i].prev_hash == blocks[i - 1].hash`
//! - `blocks[i].hash == H(canonical(blocks[i] without hash))`
//!
//! Every mutation preserves these. Truncation never re-hashes retained
//! blocks: a block's hash only depends on blocks before it.

use crate::error::{IntegrityFault, KernelError, KernelResult};
use crate::types::{Action, Block, Digest, Payload};
use crate::verify;

#[derive(Debug, Clone, Default)]
pub struct Ledger {
    blocks: Vec<Block>,
}

/// Seconds since the Unix epoch as a float, the block timestamp unit.
pub fn unix_now() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

impl Ledger {
    pub fn new() -> Self {
        Self { blocks: Vec::new() }
    }

    /// Rebuild a ledger from stored blocks, rejecting an invalid chain.
    pub fn from_verified(blocks: Vec<Block>) -> KernelResult<Self> {
        verify::check_chain(&blocks)?;
        Ok(Self { blocks })
    }

    /// Rebuild a ledger without checking it.
    ///
    /// For forensic tools that must load a damaged chain to report on it.
    /// Callers decide what to do with `check()`.
    pub fn from_unverified(blocks: Vec<Block>) -> Self {
        Self { blocks }
    }

    /// Appends a block stamped with the current time.
    pub fn append(&mut self, action: Action, payload: Payload) -> KernelResult<Block> {
        self.append_at(action, payload, unix_now())
    }

    pub fn append_at(&mut self, action: Action, payload: Payload, timestamp: f64) -> KernelResult<Block> {
        let block = self.prepare(action, payload, timestamp)?;
        self.blocks.push(block.clone());
        Ok(block)
    }

    /// Computes the block `append_at` would add, without adding it.
    pub fn prepare(&self, action: Action, payload: Payload, timestamp: f64) -> KernelResult<Block> {
        Block::seal(self.next_index(), timestamp, action, payload, self.head_hash())
    }

    /// Appends a block produced by [`Ledger::prepare`].
    ///
    /// The block is re-checked against the current tail, so a block prepared
    /// before another append cannot slip in out of order.
    pub fn push(&mut self, block: Block) -> KernelResult<()> {
        let index = self.next_index();
        if block.index != index {
            return Err(KernelError::IntegrityViolation {
                index,
                fault: IntegrityFault::IndexGap,
            });
        }
        if block.prev_hash != self.head_hash() {
            return Err(KernelError::IntegrityViolation {
                index,
                fault: IntegrityFault::LinkMismatch,
            });
        }
        if block.recompute_hash()? != block.hash {
            return Err(KernelError::IntegrityViolation {
                index,
                fault: IntegrityFault::HashMismatch,
            });
        }
        self.blocks.push(block);
        Ok(())
    }

    /// `true` if the chain is empty or fully consistent. Does not mutate.
    pub fn verify(&self) -> bool {
        verify::verify_chain(&self.blocks)
    }

    /// Like [`Ledger::verify`] but reports where and why.
    pub fn check(&self) -> KernelResult<()> {
        verify::check_chain(&self.blocks)
    }

    pub fn first_invalid(&self) -> Option<u64> {
        verify::first_invalid(&self.blocks)
    }

    /// Index of the most recent block whose action is `action`.
    ///
    /// `None` when no such block exists. Indices start at 1, so `None` can
    /// never be confused with a real position.
    pub fn find_last_marker(&self, action: Action) -> Option<u64> {
        self.blocks
            .iter()
            .rev()
            .find(|b| b.action == action)
            .map(|b| b.index)
    }

    /// Removes every block with an index greater than `index`, or the whole
    /// chain for `None`. Returns the removed blocks in their original order.
    pub fn truncate_after(&mut self, index: Option<u64>) -> Vec<Block> {
        let keep = match index {
            Some(k) => (k as usize).min(self.blocks.len()),
            None => 0,
        };
        self.blocks.split_off(keep)
    }

    pub fn get(&self, index: u64) -> KernelResult<&Block> {
        if index == 0 {
            return Err(KernelError::NotFound(index));
        }
        self.blocks
            .get(index as usize - 1)
            .ok_or(KernelError::NotFound(index))
    }

    pub fn last(&self) -> Option<&Block> {
        self.blocks.last()
    }

    /// Hash of the tail block, or the sentinel for an empty chain.
    pub fn head_hash(&self) -> Digest {
        self.blocks.last().map(|b| b.hash).unwrap_or(Digest::SENTINEL)
    }

    pub fn next_index(&self) -> u64 {
        self.blocks.len() as u64 + 1
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn into_blocks(self) -> Vec<Block> {
        self.blocks
    }
}
