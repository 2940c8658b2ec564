// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Durable Ledger Layer
//!
//! # Architecture
//! - Ledger log = primary truth (append-only, fsync'd)
//! - In-memory `Ledger` = runtime view, only updated after the log
//! - Archive = superseded blocks, kept as evidence after a revert
//!
//! # Guarantees
//! - A block is on disk before it is visible
//! - Reverts are built on a shadow copy and committed in one rename
//! - Replay on startup rebuilds the exact same chain

pub mod chain_commit;
pub mod chain_proof;

pub use chain_commit::DurableLedger;
pub use chain_proof::LedgerProof;
