use lineage_kernel::KernelError;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Invalid magic bytes in header")]
    InvalidMagic,
    #[error("Unsupported format version {0}")]
    UnsupportedVersion(u32),
    #[error("Checksum mismatch: expected {expected:016x}, found {found:016x}")]
    ChecksumMismatch {
        expected: u64,
        found: u64,
    },
    #[error("Checkpoint '{0}' not found")]
    NotFound(String),
    #[error("Checkpoint '{0}' already exists")]
    AlreadyExists(String),
    #[error("Invalid checkpoint name: {0:?}")]
    InvalidName(String),
    #[error("Content digest mismatch for '{0}'")]
    DigestMismatch(String),
    #[error("Log corrupted at offset {offset}: {reason}")]
    Corrupted {
        offset: u64,
        reason: String,
    },
    #[error("Kernel error: {0}")]
    Kernel(#[from] KernelError),
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("Invalid data format: {0}")]
    InvalidFormat(String),
}

pub type Result<T> = std::result::Result<T, PersistenceError>;
