// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! lineage-kernel: a hash-chained, locally verifiable action ledger.
//!
//! The kernel performs no I/O. Durability lives in `lineage-persistence`,
//! coordination with the checkpoint store lives in `lineage-node`.

pub mod error;
pub mod types;
pub mod hash;
pub mod ledger;
pub mod verify;

pub use error::{IntegrityFault, KernelError, KernelResult};
pub use ledger::Ledger;
pub use types::{Action, Block, Digest, Payload};

#[cfg(test)]
pub mod tests;
