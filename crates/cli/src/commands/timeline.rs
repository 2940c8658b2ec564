use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};
use lineage_kernel::{Action, Ledger};
use lineage_persistence::ledger_log;

use super::format_timestamp;

pub fn run(ledger_path: &str) -> anyhow::Result<()> {
    let scan = ledger_log::read_blocks(ledger_path)?;
    let ledger = Ledger::from_unverified(scan.blocks);
    let first_invalid = ledger.first_invalid();

    if let Some(index) = first_invalid {
        println!("\n⚠️  WARNING: Chain breaks at block {}. Blocks from there on are untrusted.\n", index);
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["#", "Timestamp", "Action", "Hash", "Summary"]);

    for block in ledger.blocks() {
        let mut action = block.action.to_string();
        if block.action == Action::Poison || block.action == Action::Revert {
            action = action.to_uppercase();
        }
        if first_invalid.is_some_and(|i| block.index >= i) {
            action.push_str(" (!)");
        }

        table.add_row(vec![
            block.index.to_string(),
            format_timestamp(block.timestamp),
            action,
            block.hash.short(),
            block.payload.summary(60),
        ]);
    }

    println!("\nLedger Timeline\n");
    println!("{table}\n");

    if let Some(marker) = ledger.find_last_marker(Action::MarkClean) {
        println!("Last clean marker: block {}\n", marker);
    } else {
        println!("No clean marker: a revert returns to the pristine model\n");
    }

    Ok(())
}
