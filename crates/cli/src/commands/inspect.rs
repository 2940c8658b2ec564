use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};
use lineage_kernel::Ledger;
use lineage_persistence::{ledger_log, CheckpointStore, ARCHIVE_FILE, CHECKPOINT_DIR, LEDGER_FILE};
use std::path::PathBuf;

/// Status report for a node data directory.
pub fn run(
    dir: Option<PathBuf>,
    ledger_path_arg: Option<String>,
    checkpoint_dir_arg: Option<String>,
) -> anyhow::Result<()> {
    let (l_path, c_path, a_path) = match dir {
        Some(d) => (d.join(LEDGER_FILE), d.join(CHECKPOINT_DIR), d.join(ARCHIVE_FILE)),
        None => (
            PathBuf::from(ledger_path_arg.unwrap_or_else(|| LEDGER_FILE.to_string())),
            PathBuf::from(checkpoint_dir_arg.unwrap_or_else(|| CHECKPOINT_DIR.to_string())),
            PathBuf::from(ARCHIVE_FILE),
        ),
    };

    println!("\nLineage Status Report");
    println!("---------------------");

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Item", "Status", "Details"]);

    // 1. Ledger log + chain
    if l_path.exists() {
        match ledger_log::read_blocks(&l_path) {
            Ok(scan) => {
                let mut details = format!("{} blocks", scan.blocks.len());
                if scan.torn_bytes > 0 {
                    details.push_str(&format!(", {} torn bytes at tail", scan.torn_bytes));
                }
                table.add_row(vec!["Ledger", "FOUND", &details]);

                let ledger = Ledger::from_unverified(scan.blocks);
                match ledger.check() {
                    Ok(()) => table.add_row(vec!["Chain", "VALID", &format!("head {}", ledger.head_hash().short())]),
                    Err(e) => table.add_row(vec!["Chain", "INVALID", &e.to_string()]),
                };
            }
            Err(e) => {
                table.add_row(vec!["Ledger", "CORRUPT", &e.to_string()]);
            }
        }
    } else {
        table.add_row(vec!["Ledger", "MISSING", ""]);
    }

    // 2. Checkpoints
    if c_path.is_dir() {
        let store = CheckpointStore::open(&c_path)?;
        match store.list() {
            Ok(names) => table.add_row(vec!["Checkpoints", "FOUND", &format!("{} stored", names.len())]),
            Err(e) => table.add_row(vec!["Checkpoints", "ERROR", &e.to_string()]),
        };
        match store.active() {
            Ok(active) => table.add_row(vec!["Active", "OK", active.name().unwrap_or("pristine")]),
            Err(e) => table.add_row(vec!["Active", "CORRUPT", &e.to_string()]),
        };
    } else {
        table.add_row(vec!["Checkpoints", "MISSING", ""]);
    }

    // 3. Archive
    if a_path.exists() {
        let lines = std::fs::read_to_string(&a_path)?.lines().filter(|l| !l.trim().is_empty()).count();
        table.add_row(vec!["Archive", "FOUND", &format!("{} superseded blocks", lines)]);
    } else {
        table.add_row(vec!["Archive", "MISSING", ""]);
    }

    println!("{table}\n");

    Ok(())
}
