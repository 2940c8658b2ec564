use clap::{Parser, Subcommand};
use lineage_cli::commands::{checkpoints, inspect, timeline, verify};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "lineage")]
#[command(about = "Lineage Forensic CLI - audit the action ledger and model checkpoints", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect a node data directory and show status.
    /// If --dir is provided, ledger.log, checkpoints/ and archive.jsonl are resolved inside it.
    Inspect {
        /// Node data directory.
        #[arg(long, short)]
        dir: Option<PathBuf>,

        /// Path to the ledger log (overrides auto-detection)
        #[arg(long)]
        ledger_path: Option<String>,

        /// Path to the checkpoint directory (overrides auto-detection)
        #[arg(long)]
        checkpoint_dir: Option<String>,
    },
    /// Verify a ledger log or a single checkpoint file
    Verify {
        path: String,
    },
    /// Print every block of a ledger log
    Timeline {
        ledger_path: String,
    },
    /// List stored checkpoints and the active one
    Checkpoints {
        checkpoint_dir: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    println!("Lineage Forensic Tool v0.1.0");

    let cli = Cli::parse();

    match cli.command {
        Commands::Inspect {
            dir,
            ledger_path,
            checkpoint_dir,
        } => inspect::run(dir, ledger_path, checkpoint_dir),
        Commands::Verify { path } => verify::run(&path),
        Commands::Timeline { ledger_path } => timeline::run(&ledger_path),
        Commands::Checkpoints { checkpoint_dir } => checkpoints::run(&checkpoint_dir),
    }
}
