use crate::checkpoint::CheckpointStore;
use crate::error::Result;
use crate::ledger_log::LedgerLog;
use crate::{CHECKPOINT_DIR, LEDGER_FILE};

use lineage_kernel::{Action, Ledger, Payload};
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};

pub struct ScenarioPaths {
    pub data_dir: PathBuf,
    pub ledger: PathBuf,
    pub checkpoints: PathBuf,
}

/// Builds a poisoned data directory with a clean marker to roll back to.
///
/// Ledger: generate, mark_clean(clean-v1), generate, poison(poison-1).
/// Checkpoints: `clean-v1`, `poison-1` (active).
pub fn generate_test_scenario(dir: &Path) -> Result<ScenarioPaths> {
    if !dir.exists() {
        fs::create_dir_all(dir)?;
    }

    let checkpoints = dir.join(CHECKPOINT_DIR);
    let store = CheckpointStore::open(&checkpoints)?;
    let clean = store.save("clean-v1", b"clean weights v1")?;

    let mut ledger = Ledger::new();
    ledger.append_at(Action::Generate, Payload::generate("def add(a, b):", "    return a + b"), 1_700_000_000.0)?;
    ledger.append_at(
        Action::MarkClean,
        Payload::mark_clean(Some(&clean.name), Some(&clean.digest)),
        1_700_000_010.0,
    )?;
    ledger.append_at(Action::Generate, Payload::generate("def sub(a, b):", "    return a - b"), 1_700_000_020.0)?;

    let poisoned = store.save("poison-1", b"poisoned weights")?;
    ledger.append_at(
        Action::Poison,
        Payload::poison(json!({ "type": "TPI", "count": 40 }), "fine-tune complete", &poisoned.name, &poisoned.digest),
        1_700_000_030.0,
    )?;

    let ledger_path = dir.join(LEDGER_FILE);
    let (mut log, _) = LedgerLog::open(&ledger_path)?;
    for block in ledger.blocks() {
        log.append(block)?;
    }

    Ok(ScenarioPaths {
        data_dir: dir.to_path_buf(),
        ledger: ledger_path,
        checkpoints,
    })
}
