use lineage_kernel::{KernelError, Ledger};
use lineage_persistence::checkpoint::{self, BLOB_MAGIC};
use lineage_persistence::ledger_log::{self, LOG_MAGIC};
use std::fs;
use std::path::Path;

/// Verifies a ledger log or a checkpoint blob, chosen by its magic bytes.
pub fn run(path: &str) -> anyhow::Result<()> {
    let data = fs::read(path)?;

    match data.get(0..4) {
        Some(m) if m == LOG_MAGIC => verify_ledger(&data),
        Some(m) if m == BLOB_MAGIC => verify_checkpoint(path, &data),
        _ => anyhow::bail!("{} is neither a ledger log nor a checkpoint", path),
    }
}

fn verify_ledger(data: &[u8]) -> anyhow::Result<()> {
    let scan = ledger_log::scan_bytes(data)?;
    if scan.torn_bytes > 0 {
        println!("\n⚠️  Incomplete final entry ({} bytes), ignored", scan.torn_bytes);
    }

    let ledger = Ledger::from_unverified(scan.blocks);
    match ledger.check() {
        Ok(()) => {
            println!("\n✅ VERIFIED\n");
            println!("Blocks:     {}", ledger.len());
            println!("Head Hash:  {}", ledger.head_hash());
            println!("Confidence: STRONG (BLAKE3 hash chain)\n");
            Ok(())
        }
        Err(e @ KernelError::IntegrityViolation { .. }) => {
            println!("\n❌ CORRUPTED\n");
            println!("{}\n", e);
            Err(e.into())
        }
        Err(e) => Err(e.into()),
    }
}

fn verify_checkpoint(path: &str, data: &[u8]) -> anyhow::Result<()> {
    match checkpoint::decode_blob(data) {
        Ok((meta, body)) => {
            let name = Path::new(path).file_name().and_then(|n| n.to_str()).unwrap_or(path);
            println!("\n✅ VERIFIED\n");
            println!("File:       {}", name);
            println!("Source:     {}", meta.name);
            println!("Digest:     {}", meta.digest());
            println!("Size:       {} bytes", body.len());
            println!("Confidence: STRONG (CRC64 + BLAKE3)\n");
            Ok(())
        }
        Err(e) => {
            println!("\n❌ CORRUPTED\n");
            println!("{}\n", e);
            Err(e.into())
        }
    }
}
