// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Crash Recovery
//!
//! Rebuilds the coordinator state from disk on startup:
//! - Ledger log replay (torn tail dropped, mid-log corruption fails closed)
//! - Chain verification (fails closed)
//! - Checkpoint audit (missing references are reported, not fatal)
//! - Active blob check against the ledger's last model transition, which
//!   catches a crash between a restore and the ledger commit

use lineage_kernel::{Action, Digest, Ledger};
use lineage_persistence::{ActivePointer, CheckpointStore};
use serde_json::Value;
use std::collections::BTreeSet;

use crate::chain::DurableLedger;
use crate::config::NodeConfig;
use crate::errors::EngineError;

#[derive(Debug, Clone)]
pub struct RecoveryReport {
    pub blocks: usize,
    pub active: ActivePointer,
    /// Checkpoints named by the ledger that are no longer in the store.
    pub missing_checkpoints: BTreeSet<String>,
    /// Whether the last clean marker can still be restored.
    pub marker_restorable: bool,
    /// Whether the active blob is the one the ledger's last poison,
    /// mark_clean or revert block leaves live.
    pub active_matches_ledger: bool,
}

/// Checkpoint (and digest, when recorded) that the last model transition
/// on the ledger leaves live. `(None, None)` means pristine.
fn expected_active(ledger: &Ledger) -> Result<(Option<String>, Option<Digest>), EngineError> {
    let Some(block) = ledger.blocks().iter().rev().find(|b| b.action != Action::Generate) else {
        return Ok((None, None));
    };
    let name = match block.action {
        Action::Revert => block.payload.get("restored").and_then(Value::as_str),
        _ => block.payload.checkpoint(),
    };
    let digest = block
        .payload
        .get("digest")
        .and_then(Value::as_str)
        .map(Digest::from_hex)
        .transpose()?;
    Ok((name.map(str::to_string), digest))
}

pub fn recover(config: &NodeConfig) -> Result<(DurableLedger, CheckpointStore, RecoveryReport), EngineError> {
    let start = std::time::Instant::now();

    let ledger = DurableLedger::open(config.ledger_path.as_deref(), config.archive_path.clone())?;
    let store = CheckpointStore::open(&config.checkpoint_dir)?;

    // A damaged active blob is an integrity failure, not a missing one.
    let active = store.active()?;
    let available = store.list()?;

    let missing_checkpoints: BTreeSet<String> = ledger
        .ledger()
        .blocks()
        .iter()
        .filter_map(|b| b.payload.checkpoint())
        .filter(|name| !available.contains(*name))
        .map(str::to_string)
        .collect();

    for name in &missing_checkpoints {
        tracing::warn!("Ledger references checkpoint '{}' which is not in the store", name);
    }

    let marker_restorable = match ledger.ledger().find_last_marker(Action::MarkClean) {
        Some(index) => match ledger.ledger().get(index)?.payload.checkpoint() {
            Some(name) => available.contains(name),
            None => true,
        },
        None => true,
    };
    if !marker_restorable {
        tracing::error!("Last clean marker points at a purged checkpoint, revert will fail until it is restored");
    }

    if let ActivePointer::Checkpoint { name, .. } = &active {
        if !available.contains(name) {
            tracing::warn!("Active model came from checkpoint '{}' which has since been purged", name);
        }
    }

    let (expected_name, expected_digest) = expected_active(ledger.ledger())?;
    let active_matches_ledger = active.name() == expected_name.as_deref()
        && expected_digest.map_or(true, |d| active.digest() == Some(&d));
    if !active_matches_ledger {
        tracing::warn!(
            "Active model {:?} is not what the ledger last recorded ({:?}); a restore may have been interrupted",
            active.name().unwrap_or("pristine"),
            expected_name.as_deref().unwrap_or("pristine")
        );
    }

    let report = RecoveryReport {
        blocks: ledger.ledger().len(),
        active,
        missing_checkpoints,
        marker_restorable,
        active_matches_ledger,
    };
    tracing::info!(
        "Recovery complete in {:?}: {} blocks, active {:?}",
        start.elapsed(),
        report.blocks,
        report.active.name().unwrap_or("pristine")
    );

    Ok((ledger, store, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lineage_persistence::fixtures::generate_test_scenario;
    use std::fs::OpenOptions;
    use tempfile::tempdir;

    #[test]
    fn test_recover_fixture() {
        let dir = tempdir().unwrap();
        generate_test_scenario(dir.path()).unwrap();
        let cfg = NodeConfig::with_data_dir(dir.path());

        let (ledger, store, report) = recover(&cfg).unwrap();
        assert_eq!(report.blocks, 4);
        assert_eq!(ledger.ledger().len(), 4);
        assert_eq!(report.active.name(), Some("poison-1"));
        assert!(report.missing_checkpoints.is_empty());
        assert!(report.marker_restorable);
        assert!(report.active_matches_ledger);
        assert_eq!(store.list().unwrap().len(), 2);
    }

    #[test]
    fn test_recover_flags_restore_without_ledger_commit() {
        let dir = tempdir().unwrap();
        let paths = generate_test_scenario(dir.path()).unwrap();
        // Restore ran, the ledger rewrite never happened.
        CheckpointStore::open(&paths.checkpoints).unwrap().revert_to("clean-v1").unwrap();

        let (ledger, _, report) = recover(&NodeConfig::with_data_dir(dir.path())).unwrap();
        assert_eq!(ledger.ledger().last().map(|b| b.action), Some(Action::Poison));
        assert_eq!(report.active.name(), Some("clean-v1"));
        assert!(!report.active_matches_ledger);
    }

    #[test]
    fn test_recover_reports_purged_checkpoint() {
        let dir = tempdir().unwrap();
        let paths = generate_test_scenario(dir.path()).unwrap();
        CheckpointStore::open(&paths.checkpoints).unwrap().purge("clean-v1").unwrap();

        let (_, _, report) = recover(&NodeConfig::with_data_dir(dir.path())).unwrap();
        assert!(report.missing_checkpoints.contains("clean-v1"));
        assert!(!report.marker_restorable);
    }

    #[test]
    fn test_recover_drops_torn_tail() {
        let dir = tempdir().unwrap();
        let paths = generate_test_scenario(dir.path()).unwrap();

        let len = std::fs::metadata(&paths.ledger).unwrap().len();
        OpenOptions::new().write(true).open(&paths.ledger).unwrap().set_len(len - 5).unwrap();

        let (ledger, _, report) = recover(&NodeConfig::with_data_dir(dir.path())).unwrap();
        assert_eq!(report.blocks, 3);
        assert!(ledger.ledger().verify());
    }

    #[test]
    fn test_recover_fails_closed_on_corruption() {
        let dir = tempdir().unwrap();
        let paths = generate_test_scenario(dir.path()).unwrap();

        let mut data = std::fs::read(&paths.ledger).unwrap();
        data[40] ^= 0xAA;
        std::fs::write(&paths.ledger, &data).unwrap();

        assert!(recover(&NodeConfig::with_data_dir(dir.path())).is_err());
    }
}
