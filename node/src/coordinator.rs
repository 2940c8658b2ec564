// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Revert Coordinator
//!
//! Owns the ledger and the checkpoint store and keeps them consistent.
//!
//! # Locking
//! - `gate` (RwLock): shared for generation, exclusive for anything that
//!   changes model state (poison, mark_clean, revert, purge).
//! - `ledger` (Mutex): serializes appends, so index order is append order
//!   even among concurrent generations.
//!
//! Exclusive acquisition is bounded by `lock_timeout`. Operations that need
//! a held gate take the guard as an argument.
//!
//! # Revert
//! The marker's recorded digest is checked against the stored checkpoint
//! before anything is touched. Restore happens-before truncation. A failed
//! restore leaves the ledger alone; a failed ledger commit writes the
//! previous active bytes back verbatim.

use lineage_kernel::{Action, Block, Digest, Payload};
use lineage_persistence::{ActiveSnapshot, CheckpointId, CheckpointStore};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::chain::chain_proof::{self, LedgerProof};
use crate::chain::DurableLedger;
use crate::errors::EngineError;

pub type SharedGuard<'a> = RwLockReadGuard<'a, ()>;
pub type ExclusiveGuard<'a> = RwLockWriteGuard<'a, ()>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelState {
    Clean,
    Poisoned,
}

#[derive(Debug, Clone, Serialize)]
pub struct RevertOutcome {
    pub removed_blocks: Vec<Block>,
    pub restored_checkpoint: Option<String>,
    pub revert_block: Block,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifyReport {
    pub valid: bool,
    pub length: u64,
    pub head: Digest,
    pub first_invalid: Option<u64>,
}

pub struct RevertCoordinator {
    gate: RwLock<()>,
    ledger: Mutex<DurableLedger>,
    store: CheckpointStore,
    lock_timeout: Duration,
}

impl RevertCoordinator {
    pub fn new(ledger: DurableLedger, store: CheckpointStore, lock_timeout: Duration) -> Self {
        Self {
            gate: RwLock::new(()),
            ledger: Mutex::new(ledger),
            store,
            lock_timeout,
        }
    }

    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }

    /// Waits without bound; generation never fails on contention.
    pub async fn shared(&self) -> SharedGuard<'_> {
        self.gate.read().await
    }

    pub async fn exclusive(&self) -> Result<ExclusiveGuard<'_>, EngineError> {
        match tokio::time::timeout(self.lock_timeout, self.gate.write()).await {
            Ok(guard) => Ok(guard),
            Err(_) => {
                metrics::counter!("lineage_lock_contention_total", 1);
                tracing::warn!("Exclusive lock not acquired within {:?}", self.lock_timeout);
                Err(EngineError::LockContention)
            }
        }
    }

    /// Records a finished generation. Never touches model state.
    pub async fn record_generate(&self, _gate: &SharedGuard<'_>, prompt: &str, output: &str) -> Result<Block, EngineError> {
        let mut ledger = self.ledger.lock().await;
        ledger.append(Action::Generate, Payload::generate(prompt, output))
    }

    /// Saves fine-tuned weights as checkpoint `label` and records the poison.
    ///
    /// If the block cannot be written the previous active blob is put back;
    /// the new checkpoint stays behind, unreferenced.
    pub async fn record_poison(
        &self,
        _gate: &ExclusiveGuard<'_>,
        descriptor: Value,
        result: &str,
        label: &str,
        weights: &[u8],
    ) -> Result<(CheckpointId, Block), EngineError> {
        let mut ledger = self.ledger.lock().await;
        let previous = self.store.snapshot_active()?;

        let id = self.store.save(label, weights)?;
        metrics::gauge!("lineage_checkpoint_size_bytes", weights.len() as f64);

        match ledger.append(Action::Poison, Payload::poison(descriptor, result, &id.name, &id.digest)) {
            Ok(block) => {
                tracing::warn!("Model poisoned: checkpoint '{}' active, block {}", id.name, block.index);
                Ok((id, block))
            }
            Err(e) => Err(self.compensate(&previous, e)),
        }
    }

    /// Records the current model state as known good.
    pub async fn mark_clean(&self) -> Result<Block, EngineError> {
        let _gate = self.exclusive().await?;
        let mut ledger = self.ledger.lock().await;

        let active = self.store.active()?;
        let block = ledger.append(
            Action::MarkClean,
            Payload::mark_clean(active.name(), active.digest()),
        )?;
        tracing::info!(
            "Marked clean at block {} ({})",
            block.index,
            active.name().unwrap_or("pristine")
        );
        Ok(block)
    }

    /// Rolls model and ledger back to the last clean marker.
    pub async fn coordinate_revert(&self) -> Result<RevertOutcome, EngineError> {
        let gate = self.exclusive().await?;
        self.revert_locked(&gate).await
    }

    pub async fn revert_locked(&self, _gate: &ExclusiveGuard<'_>) -> Result<RevertOutcome, EngineError> {
        let mut ledger = self.ledger.lock().await;
        if ledger.ledger().is_empty() {
            return Err(EngineError::EmptyLedger);
        }

        // 1. Target
        let marker = ledger.ledger().find_last_marker(Action::MarkClean);
        let (target, recorded_digest) = match marker {
            Some(index) => {
                let payload = &ledger.ledger().get(index)?.payload;
                let digest = payload
                    .get("digest")
                    .and_then(Value::as_str)
                    .map(Digest::from_hex)
                    .transpose()?;
                (payload.checkpoint().map(str::to_string), digest)
            }
            None => (None, None),
        };
        if let (Some(name), Some(recorded)) = (&target, recorded_digest) {
            let stored = self.store.describe(name)?.digest();
            if stored != recorded {
                return Err(EngineError::IntegrityViolation(format!(
                    "checkpoint '{}' no longer matches the digest recorded at block {}",
                    name,
                    marker.unwrap_or_default()
                )));
            }
        }
        let previous = self.store.snapshot_active()?;

        // 2. Restore. Ledger untouched on failure.
        match &target {
            Some(name) => self.store.revert_to(name)?,
            None => self.store.revert_to_pristine()?,
        }

        // 3. Shadow truncate + revert block, then commit.
        let mut shadow = ledger.shadow();
        let removed = shadow.truncate_after(marker);
        let built = shadow.append(Action::Revert, Payload::revert(target.as_deref(), marker, &removed));
        let revert_block = match built {
            Ok(block) => block,
            Err(e) => return Err(self.compensate(&previous, e.into())),
        };

        if let Err(e) = ledger.commit(shadow, &removed) {
            return Err(self.compensate(&previous, e));
        }

        metrics::counter!("lineage_reverts_total", 1);
        metrics::counter!("lineage_blocks_appended_total", 1, "action" => Action::Revert.as_str());
        tracing::warn!(
            "Reverted to {} ({}): removed {} blocks",
            marker.map(|m| format!("block {}", m)).unwrap_or_else(|| "genesis".into()),
            target.as_deref().unwrap_or("pristine"),
            removed.len()
        );

        Ok(RevertOutcome {
            removed_blocks: removed,
            restored_checkpoint: target,
            revert_block,
        })
    }

    /// Administrative checkpoint deletion.
    pub async fn purge(&self, name: &str) -> Result<(), EngineError> {
        let _gate = self.exclusive().await?;
        self.store.purge(name)?;
        Ok(())
    }

    /// Writes `previous` back after `cause` aborted an operation. Returns
    /// `cause`, or an `Internal` error naming both failures when the active
    /// blob could not be restored.
    fn compensate(&self, previous: &ActiveSnapshot, cause: EngineError) -> EngineError {
        match self.store.restore_active(previous) {
            Ok(()) => {
                tracing::warn!("Active blob restored after failure: {}", cause);
                cause
            }
            Err(e) => {
                tracing::error!("Compensation failed, active blob may not match the ledger: {} (after: {})", e, cause);
                EngineError::Internal(format!("{}; restoring the previous active model also failed: {}", cause, e))
            }
        }
    }

    pub async fn blocks(&self) -> Vec<Block> {
        self.ledger.lock().await.ledger().blocks().to_vec()
    }

    pub async fn verify(&self) -> VerifyReport {
        let ledger = self.ledger.lock().await;
        let chain = ledger.ledger();
        let first_invalid = chain.first_invalid();
        VerifyReport {
            valid: first_invalid.is_none(),
            length: chain.len() as u64,
            head: chain.head_hash(),
            first_invalid,
        }
    }

    /// Poisoned when a poison block follows the last clean marker or revert.
    pub async fn state(&self) -> ModelState {
        let ledger = self.ledger.lock().await;
        let last_transition = ledger
            .ledger()
            .blocks()
            .iter()
            .rev()
            .find(|b| b.action != Action::Generate)
            .map(|b| b.action);
        match last_transition {
            Some(Action::Poison) => ModelState::Poisoned,
            _ => ModelState::Clean,
        }
    }

    pub async fn proof(&self) -> Result<LedgerProof, EngineError> {
        let ledger = self.ledger.lock().await;
        let active = self.store.active()?;
        Ok(chain_proof::generate_proof(&ledger, &active)?)
    }

    pub async fn log_path(&self) -> Option<std::path::PathBuf> {
        self.ledger.lock().await.log_path().map(|p| p.to_path_buf())
    }
}
