pub mod error;
pub mod ledger_log;
pub mod checkpoint;
pub mod fixtures;

pub use checkpoint::{ActivePointer, ActiveSnapshot, CheckpointId, CheckpointMeta, CheckpointStore};
pub use error::{PersistenceError, Result};
pub use ledger_log::LedgerLog;

/// Data directory layout shared by the node and the CLI.
pub const LEDGER_FILE: &str = "ledger.log";
pub const CHECKPOINT_DIR: &str = "checkpoints";
pub const ARCHIVE_FILE: &str = "archive.jsonl";
