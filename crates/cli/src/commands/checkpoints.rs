use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};
use lineage_persistence::CheckpointStore;
use std::path::Path;

use super::format_millis;

pub fn run(checkpoint_dir: &Path) -> anyhow::Result<()> {
    if !checkpoint_dir.is_dir() {
        anyhow::bail!("{:?} is not a checkpoint directory", checkpoint_dir);
    }
    let store = CheckpointStore::open(checkpoint_dir)?;
    let active = store.active()?;

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Name", "Created", "Size", "Digest", "Active"]);

    for name in store.list()? {
        let row = match store.describe(&name) {
            Ok(meta) => vec![
                name.clone(),
                format_millis(meta.created_at),
                format!("{} B", meta.body_len),
                meta.digest().short(),
                if active.name() == Some(name.as_str()) { "*".to_string() } else { String::new() },
            ],
            Err(e) => vec![name.clone(), String::new(), String::new(), format!("CORRUPT: {}", e), String::new()],
        };
        table.add_row(row);
    }

    println!("\nCheckpoints\n");
    println!("{table}\n");
    println!("Active: {}\n", active.name().unwrap_or("pristine"));

    Ok(())
}
