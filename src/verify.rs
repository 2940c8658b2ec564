// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Chain Verification.

use crate::error::{IntegrityFault, KernelError, KernelResult};
use crate::types::{Block, Digest};

/// Walks `blocks` from the first entry and reports the first violation.
///
/// **Checked per block**, in this order:
/// - index equals the 1-based position
/// - `prevHash` equals the predecessor's `hash` (sentinel for the first)
/// - stored `hash` equals the hash of the canonical encoding
///
/// An empty chain is valid.
pub fn check_chain(blocks: &[Block]) -> KernelResult<()> {
    let mut expected_prev = Digest::SENTINEL;

    for (pos, block) in blocks.iter().enumerate() {
        let position = pos as u64 + 1;

        if block.index != position {
            return Err(KernelError::IntegrityViolation {
                index: position,
                fault: IntegrityFault::IndexGap,
            });
        }

        if block.prev_hash != expected_prev {
            return Err(KernelError::IntegrityViolation {
                index: position,
                fault: IntegrityFault::LinkMismatch,
            });
        }

        if block.recompute_hash()? != block.hash {
            return Err(KernelError::IntegrityViolation {
                index: position,
                fault: IntegrityFault::HashMismatch,
            });
        }

        expected_prev = block.hash;
    }

    Ok(())
}

/// `true` iff [`check_chain`] finds no violation.
pub fn verify_chain(blocks: &[Block]) -> bool {
    check_chain(blocks).is_ok()
}

/// Position of the first invalid block, if any.
pub fn first_invalid(blocks: &[Block]) -> Option<u64> {
    match check_chain(blocks) {
        Ok(()) => None,
        Err(KernelError::IntegrityViolation { index, .. }) => Some(index),
        // Encoding faults cannot be attributed to a link; blame the block
        // whose hash could not be recomputed.
        Err(_) => blocks
            .iter()
            .position(|b| b.recompute_hash().is_err())
            .map(|p| p as u64 + 1),
    }
}
