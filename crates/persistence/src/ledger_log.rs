//! Append-Only Ledger Log
//!
//! Durable storage for ledger blocks.
//!
//! # File Format
//! ```text
//! [Header: 16 bytes][Entry][Entry][Entry]...
//! ```
//! Header: magic `LGRL`, version u32 (1), reserved u64 (0).
//!
//! Entry: `[index u64][len u32][crc64 u64][block JSON (len bytes)]`, the
//! checksum covering index, len and the JSON bytes.
//!
//! An incomplete final entry is a torn write from a crash and is dropped on
//! open. A checksum or sequence failure anywhere is corruption and fails
//! closed.

use crate::error::{PersistenceError, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crc64fast::Digest;
use lineage_kernel::Block;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Cursor, Read, Write};
use std::path::{Path, PathBuf};

pub const LOG_MAGIC: [u8; 4] = *b"LGRL";
pub const LOG_VERSION: u32 = 1;
pub const HEADER_SIZE: u64 = 16;

/// Larger length fields are treated as corruption, never as a torn tail.
pub const MAX_ENTRY_LEN: u32 = 16 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntryHeader {
    pub index: u64,
    pub payload_len: u32,
    pub checksum: u64,
}

impl LogEntryHeader {
    pub const SIZE: usize = 8 + 4 + 8; // 20 bytes

    pub fn read_from<R: Read>(mut reader: R) -> io::Result<Self> {
        let index = reader.read_u64::<LittleEndian>()?;
        let payload_len = reader.read_u32::<LittleEndian>()?;
        let checksum = reader.read_u64::<LittleEndian>()?;
        Ok(Self { index, payload_len, checksum })
    }

    pub fn write_to<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_u64::<LittleEndian>(self.index)?;
        writer.write_u32::<LittleEndian>(self.payload_len)?;
        writer.write_u64::<LittleEndian>(self.checksum)?;
        Ok(())
    }
}

fn entry_checksum(index: u64, payload: &[u8]) -> u64 {
    let mut digest = Digest::new();
    digest.write(&index.to_le_bytes());
    digest.write(&(payload.len() as u32).to_le_bytes());
    digest.write(payload);
    digest.sum64()
}

fn write_file_header<W: Write>(mut writer: W) -> io::Result<()> {
    writer.write_all(&LOG_MAGIC)?;
    writer.write_u32::<LittleEndian>(LOG_VERSION)?;
    writer.write_u64::<LittleEndian>(0)?;
    Ok(())
}

/// Frames one block as a log entry.
pub fn encode_entry(block: &Block) -> Result<Vec<u8>> {
    let payload = serde_json::to_vec(block).map_err(|e| PersistenceError::InvalidFormat(e.to_string()))?;
    if payload.len() > MAX_ENTRY_LEN as usize {
        return Err(PersistenceError::InvalidFormat(format!(
            "block {} encodes to {} bytes, limit is {}",
            block.index,
            payload.len(),
            MAX_ENTRY_LEN
        )));
    }

    let header = LogEntryHeader {
        index: block.index,
        payload_len: payload.len() as u32,
        checksum: entry_checksum(block.index, &payload),
    };

    let mut buf = Vec::with_capacity(LogEntryHeader::SIZE + payload.len());
    header.write_to(&mut buf)?;
    buf.extend_from_slice(&payload);
    Ok(buf)
}

/// Result of scanning a log file.
#[derive(Debug)]
pub struct LogScan {
    pub blocks: Vec<Block>,
    /// Byte length of the valid prefix (header plus complete entries).
    pub valid_len: u64,
    /// Bytes past `valid_len` belonging to an incomplete entry.
    pub torn_bytes: u64,
}

/// Decodes a whole log image.
pub fn scan_bytes(data: &[u8]) -> Result<LogScan> {
    if (data.len() as u64) < HEADER_SIZE {
        return Err(PersistenceError::InvalidFormat("log shorter than header".into()));
    }

    let mut cursor = Cursor::new(data);
    let mut magic = [0u8; 4];
    cursor.read_exact(&mut magic)?;
    if magic != LOG_MAGIC {
        return Err(PersistenceError::InvalidMagic);
    }
    let version = cursor.read_u32::<LittleEndian>()?;
    if version != LOG_VERSION {
        return Err(PersistenceError::UnsupportedVersion(version));
    }
    let _reserved = cursor.read_u64::<LittleEndian>()?;

    let total = data.len() as u64;
    let mut blocks = Vec::new();
    let mut offset = HEADER_SIZE;

    while offset < total {
        let remaining = total - offset;
        if remaining < LogEntryHeader::SIZE as u64 {
            break;
        }

        cursor.set_position(offset);
        let header = LogEntryHeader::read_from(&mut cursor)?;

        if header.payload_len > MAX_ENTRY_LEN {
            return Err(PersistenceError::Corrupted {
                offset,
                reason: format!("entry length {} exceeds limit", header.payload_len),
            });
        }
        if remaining < LogEntryHeader::SIZE as u64 + header.payload_len as u64 {
            break;
        }

        let start = (offset + LogEntryHeader::SIZE as u64) as usize;
        let end = start + header.payload_len as usize;
        let payload = &data[start..end];

        let found = entry_checksum(header.index, payload);
        if found != header.checksum {
            return Err(PersistenceError::Corrupted {
                offset,
                reason: format!("checksum expected {:016x}, found {:016x}", header.checksum, found),
            });
        }

        let expected_index = blocks.len() as u64 + 1;
        if header.index != expected_index {
            return Err(PersistenceError::Corrupted {
                offset,
                reason: format!("entry index {} where {} was expected", header.index, expected_index),
            });
        }

        let block: Block = serde_json::from_slice(payload).map_err(|e| PersistenceError::Corrupted {
            offset,
            reason: format!("undecodable block: {}", e),
        })?;
        if block.index != header.index {
            return Err(PersistenceError::Corrupted {
                offset,
                reason: format!("block index {} under entry index {}", block.index, header.index),
            });
        }

        blocks.push(block);
        offset = end as u64;
    }

    Ok(LogScan {
        blocks,
        valid_len: offset,
        torn_bytes: total - offset,
    })
}

/// Reads every complete block from a log file without modifying it.
pub fn read_blocks(path: impl AsRef<Path>) -> Result<LogScan> {
    let data = fs::read(path)?;
    scan_bytes(&data)
}

/// Append-only writer.
///
/// # Safety Guarantees
/// - Every append is written and fsync'd before returning
/// - A failed append is cut back to the last committed length
/// - `rewrite` replaces the file atomically (tmp + fsync + rename)
pub struct LedgerLog {
    path: PathBuf,
    file: File,
    entry_count: u64,
    /// File length covering exactly `entry_count` entries.
    committed_len: u64,
    /// Set when a failed append could not be rolled back. No further
    /// appends until the log is reopened.
    poisoned: bool,
}

impl LedgerLog {
    /// Open or create a ledger log, returning the blocks it holds.
    ///
    /// A torn tail is cut off so later appends follow the last complete
    /// entry.
    pub fn open(path: impl AsRef<Path>) -> Result<(Self, Vec<Block>)> {
        let path = path.as_ref().to_path_buf();

        if !path.exists() {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut file = OpenOptions::new().create_new(true).write(true).open(&path)?;
            write_file_header(&mut file)?;
            file.sync_all()?;
        }

        let scan = read_blocks(&path)?;
        let file = OpenOptions::new().append(true).open(&path)?;

        if scan.torn_bytes > 0 {
            tracing::warn!(
                "Dropping incomplete entry at end of ledger log {:?} ({} bytes at offset {})",
                path,
                scan.torn_bytes,
                scan.valid_len
            );
            file.set_len(scan.valid_len)?;
            file.sync_all()?;
        }

        let log = Self {
            path,
            file,
            entry_count: scan.blocks.len() as u64,
            committed_len: scan.valid_len,
            poisoned: false,
        };
        Ok((log, scan.blocks))
    }

    /// Append one block. Only returns `Ok` after a durable write.
    pub fn append(&mut self, block: &Block) -> Result<()> {
        self.append_with(block, |file, bytes| {
            file.write_all(bytes)?;
            file.sync_data()
        })
    }

    fn append_with<W>(&mut self, block: &Block, write: W) -> Result<()>
    where
        W: FnOnce(&mut File, &[u8]) -> io::Result<()>,
    {
        if self.poisoned {
            return Err(PersistenceError::Corrupted {
                offset: self.committed_len,
                reason: "an earlier failed append could not be rolled back; reopen the log".into(),
            });
        }
        let expected = self.entry_count + 1;
        if block.index != expected {
            return Err(PersistenceError::InvalidFormat(format!(
                "append of block {} to a log holding {} entries",
                block.index, self.entry_count
            )));
        }

        let bytes = encode_entry(block)?;
        if let Err(e) = write(&mut self.file, &bytes) {
            self.roll_back();
            return Err(e.into());
        }
        self.entry_count += 1;
        self.committed_len += bytes.len() as u64;
        Ok(())
    }

    /// Drops whatever a failed append left past the last committed entry.
    fn roll_back(&mut self) {
        let truncated = self
            .file
            .set_len(self.committed_len)
            .and_then(|_| self.file.sync_data());
        if let Err(e) = truncated {
            tracing::error!(
                "Could not cut ledger log {:?} back to {} bytes, refusing further appends: {}",
                self.path,
                self.committed_len,
                e
            );
            self.poisoned = true;
        }
    }

    /// Atomically replaces the log contents with `blocks`.
    pub fn rewrite(&mut self, blocks: &[Block]) -> Result<()> {
        let tmp_path = self.path.with_extension("log.tmp");
        let written = {
            let mut tmp = File::create(&tmp_path)?;
            let mut buf = Vec::new();
            write_file_header(&mut buf)?;
            for block in blocks {
                buf.extend_from_slice(&encode_entry(block)?);
            }
            tmp.write_all(&buf)?;
            tmp.sync_all()?;
            buf.len() as u64
        };

        fs::rename(&tmp_path, &self.path)?;
        sync_parent(&self.path);

        self.file = OpenOptions::new().append(true).open(&self.path)?;
        self.entry_count = blocks.len() as u64;
        self.committed_len = written;
        self.poisoned = false;
        Ok(())
    }

    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Makes a rename durable. Failure only weakens durability of the rename,
/// the data itself was already fsync'd.
pub(crate) fn sync_parent(path: &Path) {
    if let Some(parent) = path.parent() {
        if let Err(e) = File::open(parent).and_then(|d| d.sync_all()) {
            tracing::debug!("Directory fsync of {:?} failed: {}", parent, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lineage_kernel::{Action, Ledger, Payload};
    use tempfile::tempdir;

    fn chain(n: usize) -> Vec<Block> {
        let mut ledger = Ledger::new();
        for i in 0..n {
            ledger
                .append(Action::Generate, Payload::generate(&format!("prompt {}", i), "output"))
                .unwrap();
        }
        ledger.into_blocks()
    }

    #[test]
    fn test_log_create_append_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.log");
        let blocks = chain(5);

        {
            let (mut log, existing) = LedgerLog::open(&path).unwrap();
            assert!(existing.is_empty());
            for b in &blocks {
                log.append(b).unwrap();
            }
            assert_eq!(log.entry_count(), 5);
        }

        let (log, reloaded) = LedgerLog::open(&path).unwrap();
        assert_eq!(log.entry_count(), 5);
        assert_eq!(reloaded, blocks);
        assert!(Ledger::from_verified(reloaded).is_ok());
    }

    #[test]
    fn test_append_out_of_sequence_rejected() {
        let dir = tempdir().unwrap();
        let (mut log, _) = LedgerLog::open(dir.path().join("ledger.log")).unwrap();
        let blocks = chain(2);
        assert!(log.append(&blocks[1]).is_err());
        assert_eq!(log.entry_count(), 0);
    }

    #[test]
    fn test_failed_append_rolled_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.log");
        let blocks = chain(4);
        let (mut log, _) = LedgerLog::open(&path).unwrap();
        for b in &blocks[..2] {
            log.append(b).unwrap();
        }
        let committed = fs::metadata(&path).unwrap().len();

        // Half a frame reaches the disk, then the write fails.
        let err = log.append_with(&blocks[2], |file, bytes| {
            file.write_all(&bytes[..bytes.len() / 2])?;
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        });
        assert!(err.is_err());
        assert_eq!(log.entry_count(), 2);
        assert_eq!(fs::metadata(&path).unwrap().len(), committed);

        // The whole frame is written but the sync fails.
        let err = log.append_with(&blocks[2], |file, bytes| {
            file.write_all(bytes)?;
            Err(io::Error::new(io::ErrorKind::Other, "fsync failed"))
        });
        assert!(err.is_err());
        assert_eq!(fs::metadata(&path).unwrap().len(), committed);

        // Retrying the same block succeeds and the log reopens cleanly.
        log.append(&blocks[2]).unwrap();
        log.append(&blocks[3]).unwrap();
        drop(log);

        let (log, reloaded) = LedgerLog::open(&path).unwrap();
        assert_eq!(reloaded, blocks);
        assert_eq!(log.entry_count(), 4);
    }

    #[test]
    fn test_poisoned_log_refuses_appends() {
        let dir = tempdir().unwrap();
        let blocks = chain(2);
        let (mut log, _) = LedgerLog::open(dir.path().join("ledger.log")).unwrap();
        log.append(&blocks[0]).unwrap();

        log.poisoned = true;
        assert!(matches!(log.append(&blocks[1]), Err(PersistenceError::Corrupted { .. })));
        assert_eq!(log.entry_count(), 1);

        // A successful rewrite leaves a known-good file behind.
        log.rewrite(&blocks[..1]).unwrap();
        log.append(&blocks[1]).unwrap();
        assert_eq!(log.entry_count(), 2);
    }

    #[test]
    fn test_torn_tail_dropped_on_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.log");
        let blocks = chain(4);
        {
            let (mut log, _) = LedgerLog::open(&path).unwrap();
            for b in &blocks {
                log.append(b).unwrap();
            }
        }

        let full = fs::metadata(&path).unwrap().len();
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(full - 3).unwrap();
        drop(file);

        let (mut log, reloaded) = LedgerLog::open(&path).unwrap();
        assert_eq!(reloaded.len(), 3);
        assert_eq!(reloaded[..], blocks[..3]);

        // The next append lands right after the last complete entry.
        log.append(&blocks[3]).unwrap();
        let (_, again) = LedgerLog::open(&path).unwrap();
        assert_eq!(again, blocks);
    }

    #[test]
    fn test_corrupted_middle_fails_closed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.log");
        {
            let (mut log, _) = LedgerLog::open(&path).unwrap();
            for b in &chain(6) {
                log.append(b).unwrap();
            }
        }

        // Flip a byte inside the first entry's JSON, well before the tail.
        let mut data = fs::read(&path).unwrap();
        let target = HEADER_SIZE as usize + LogEntryHeader::SIZE + 5;
        data[target] ^= 0xFF;
        fs::write(&path, &data).unwrap();

        assert!(read_blocks(&path).is_err());
        assert!(LedgerLog::open(&path).is_err());
    }

    #[test]
    fn test_bad_magic_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.log");
        fs::write(&path, b"NOPE\x01\0\0\0\0\0\0\0\0\0\0\0").unwrap();
        assert!(matches!(read_blocks(&path), Err(PersistenceError::InvalidMagic)));
    }

    #[test]
    fn test_rewrite_replaces_contents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.log");
        let blocks = chain(5);
        let (mut log, _) = LedgerLog::open(&path).unwrap();
        for b in &blocks {
            log.append(b).unwrap();
        }

        log.rewrite(&blocks[..2]).unwrap();
        assert_eq!(log.entry_count(), 2);
        log.append(&blocks[2]).unwrap();

        let scan = read_blocks(&path).unwrap();
        assert_eq!(scan.blocks, blocks[..3].to_vec());
        assert_eq!(scan.torn_bytes, 0);
        assert!(!path.with_extension("log.tmp").exists());
    }

    #[test]
    fn test_entry_header_layout() {
        let header = LogEntryHeader { index: 7, payload_len: 11, checksum: 0xDEAD_BEEF };
        let mut bytes = Vec::new();
        header.write_to(&mut bytes).unwrap();
        assert_eq!(bytes.len(), LogEntryHeader::SIZE);
        assert_eq!(LogEntryHeader::read_from(&bytes[..]).unwrap(), header);
    }
}
