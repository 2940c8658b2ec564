// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Ledger Commit - The Safety Wall
//!
//! Appends follow a write-ahead order:
//! 1. Block prepared from the current tail
//! 2. Block persisted to the log (fsync)
//! 3. Block pushed onto the live ledger (re-checked)
//!
//! Reverts follow a shadow order:
//! 1. Shadow copy truncated and extended with the revert block
//! 2. Shadow verified
//! 3. Removed blocks archived
//! 4. Log rewritten atomically
//! 5. Live ledger replaced by the shadow
//!
//! If any step before the last fails, the live ledger is unchanged.

use lineage_kernel::{ledger::unix_now, Action, Block, Ledger, Payload};
use lineage_persistence::LedgerLog;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::errors::EngineError;

pub struct DurableLedger {
    live: Ledger,
    log: Option<LedgerLog>,
    archive: Option<PathBuf>,
}

impl DurableLedger {
    /// Process-lifetime ledger with no backing file.
    pub fn ephemeral() -> Self {
        Self {
            live: Ledger::new(),
            log: None,
            archive: None,
        }
    }

    /// Opens (or creates) the ledger log and replays it.
    ///
    /// Fails closed when the replayed chain does not verify.
    pub fn open(log_path: Option<&Path>, archive: Option<PathBuf>) -> Result<Self, EngineError> {
        let Some(path) = log_path else {
            tracing::warn!("No ledger log configured, ledger lives for this process only");
            return Ok(Self {
                archive,
                ..Self::ephemeral()
            });
        };

        let start = std::time::Instant::now();
        let (log, blocks) = LedgerLog::open(path)?;
        let live = Ledger::from_verified(blocks)?;
        tracing::info!(
            "Replayed {} blocks from {:?} in {:?}",
            live.len(),
            path,
            start.elapsed()
        );
        metrics::gauge!("lineage_ledger_length", live.len() as f64);

        Ok(Self {
            live,
            log: Some(log),
            archive,
        })
    }

    pub fn ledger(&self) -> &Ledger {
        &self.live
    }

    pub fn log_path(&self) -> Option<&Path> {
        self.log.as_ref().map(|l| l.path())
    }

    pub fn archive_path(&self) -> Option<&Path> {
        self.archive.as_deref()
    }

    /// Appends one block durably, then makes it visible.
    pub fn append(&mut self, action: Action, payload: Payload) -> Result<Block, EngineError> {
        let block = self.live.prepare(action, payload, unix_now())?;

        if let Some(log) = self.log.as_mut() {
            log.append(&block)?;
        }
        self.live.push(block.clone())?;

        metrics::counter!("lineage_blocks_appended_total", 1, "action" => action.as_str());
        metrics::gauge!("lineage_ledger_length", self.live.len() as f64);
        tracing::debug!("Appended block {} ({}) {}", block.index, action, block.hash.short());
        Ok(block)
    }

    /// Copy of the live ledger to build a revert on.
    pub fn shadow(&self) -> Ledger {
        self.live.clone()
    }

    /// Replaces the live ledger with `shadow`.
    ///
    /// `removed` are the blocks the shadow dropped; they go to the archive
    /// before anything is rewritten.
    pub fn commit(&mut self, shadow: Ledger, removed: &[Block]) -> Result<(), EngineError> {
        shadow.check()?;

        if let Some(archive) = &self.archive {
            append_archive(archive, removed)?;
        }
        if let Some(log) = self.log.as_mut() {
            log.rewrite(shadow.blocks())?;
        }

        self.live = shadow;
        metrics::gauge!("lineage_ledger_length", self.live.len() as f64);
        Ok(())
    }
}

fn append_archive(path: &Path, removed: &[Block]) -> Result<(), EngineError> {
    if removed.is_empty() {
        return Ok(());
    }

    let mut buf = Vec::new();
    for block in removed {
        serde_json::to_writer(&mut buf, block).map_err(|e| EngineError::Internal(e.to_string()))?;
        buf.push(b'\n');
    }

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(&buf)?;
    file.sync_data()?;
    tracing::info!("Archived {} superseded blocks to {:?}", removed.len(), path);
    Ok(())
}

/// Reads back an archive written by reverts.
pub fn read_archive(path: &Path) -> Result<Vec<Block>, EngineError> {
    let raw = std::fs::read_to_string(path)?;
    raw.lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).map_err(|e| EngineError::InvalidInput(format!("archive line: {}", e))))
        .collect()
}
