// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Error types.

use thiserror::Error;

/// Which chain invariant a block broke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrityFault {
    /// Stored hash differs from the hash of the block's canonical encoding.
    HashMismatch,
    /// `prevHash` does not equal the predecessor's hash (or the sentinel).
    LinkMismatch,
    /// Index is not the block's 1-based position.
    IndexGap,
}

impl core::fmt::Display for IntegrityFault {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            IntegrityFault::HashMismatch => f.write_str("hash mismatch"),
            IntegrityFault::LinkMismatch => f.write_str("link mismatch"),
            IntegrityFault::IndexGap => f.write_str("index gap"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum KernelError {
    /// No block carries this index.
    #[error("block {0} not found")]
    NotFound(u64),

    /// The chain failed verification at `index`.
    #[error("integrity violation at block {index}: {fault}")]
    IntegrityViolation { index: u64, fault: IntegrityFault },

    /// Operation requires at least one block.
    #[error("ledger is empty")]
    EmptyLedger,

    /// Canonical encoding could not be produced (hashing fault).
    #[error("canonical encoding failed: {0}")]
    Encoding(String),

    /// A digest string was not 64 lowercase hex characters.
    #[error("invalid digest: {0}")]
    InvalidDigest(String),
}

pub type KernelResult<T> = core::result::Result<T, KernelError>;
