//! Content-addressed checkpoint store.
//!
//! One immutable blob per checkpoint at `<dir>/<name>.ckpt` and one mutable
//! reserved blob at `<dir>/active.ckpt`. Activating a checkpoint copies its
//! bytes into the active blob; the named blob is never written again.
//! The active blob being absent means the pristine model is live.
//!
//! Blob format:
//! `[magic "LCKP"][version u32][meta_len u32][meta (bincode)][body][crc64 u64]`

use crate::error::{PersistenceError, Result};
use crate::ledger_log::sync_parent;
use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use lineage_kernel::Digest;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

pub const BLOB_MAGIC: [u8; 4] = *b"LCKP";
pub const BLOB_VERSION: u32 = 1;
pub const BLOB_EXTENSION: &str = "ckpt";
pub const ACTIVE_NAME: &str = "active";
pub const MAX_NAME_LEN: usize = 128;

const PREAMBLE: usize = 4 + 4 + 4;
const TRAILER: usize = 8;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CheckpointMeta {
    /// Name the body was saved under. For the active blob, the source checkpoint.
    pub name: String,
    pub digest: [u8; 32],
    /// Unix millis
    pub created_at: u64,
    pub body_len: u64,
}

impl CheckpointMeta {
    pub fn digest(&self) -> Digest {
        Digest(self.digest)
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct CheckpointId {
    pub name: String,
    pub digest: Digest,
}

/// Which model state is live.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActivePointer {
    Pristine,
    Checkpoint { name: String, digest: Digest },
}

impl ActivePointer {
    pub fn name(&self) -> Option<&str> {
        match self {
            ActivePointer::Pristine => None,
            ActivePointer::Checkpoint { name, .. } => Some(name),
        }
    }

    pub fn digest(&self) -> Option<&Digest> {
        match self {
            ActivePointer::Pristine => None,
            ActivePointer::Checkpoint { digest, .. } => Some(digest),
        }
    }
}

/// Active blob bytes captured before a state change; `raw` is `None` when
/// the pristine model was live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSnapshot {
    raw: Option<Vec<u8>>,
}

impl ActiveSnapshot {
    pub fn is_pristine(&self) -> bool {
        self.raw.is_none()
    }
}

pub fn validate_name(name: &str) -> Result<()> {
    let charset_ok = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-');
    if name.is_empty() || name.len() > MAX_NAME_LEN || !charset_ok || name.starts_with('.') || name == ACTIVE_NAME {
        return Err(PersistenceError::InvalidName(name.to_string()));
    }
    Ok(())
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

pub fn encode_blob(meta: &CheckpointMeta, body: &[u8]) -> Result<Vec<u8>> {
    let meta_bytes = bincode::serde::encode_to_vec(meta, bincode::config::standard())
        .map_err(|e| PersistenceError::InvalidFormat(e.to_string()))?;

    let mut buf = Vec::with_capacity(PREAMBLE + meta_bytes.len() + body.len() + TRAILER);
    buf.extend_from_slice(&BLOB_MAGIC);
    buf.write_u32::<LittleEndian>(BLOB_VERSION)?;
    buf.write_u32::<LittleEndian>(meta_bytes.len() as u32)?;
    buf.extend_from_slice(&meta_bytes);
    buf.extend_from_slice(body);

    let mut crc = crc64fast::Digest::new();
    crc.write(&buf);
    buf.write_u64::<LittleEndian>(crc.sum64())?;
    Ok(buf)
}

/// Parses and fully validates a blob: checksum, magic, version, lengths and
/// content digest.
pub fn decode_blob(buffer: &[u8]) -> Result<(CheckpointMeta, Vec<u8>)> {
    if buffer.len() < PREAMBLE + TRAILER {
        return Err(PersistenceError::InvalidFormat("checkpoint blob too short".into()));
    }

    let (content, trailer) = buffer.split_at(buffer.len() - TRAILER);
    let expected = LittleEndian::read_u64(trailer);
    let mut crc = crc64fast::Digest::new();
    crc.write(content);
    let found = crc.sum64();
    if found != expected {
        return Err(PersistenceError::ChecksumMismatch { expected, found });
    }

    if content[0..4] != BLOB_MAGIC {
        return Err(PersistenceError::InvalidMagic);
    }
    let version = LittleEndian::read_u32(&content[4..8]);
    if version != BLOB_VERSION {
        return Err(PersistenceError::UnsupportedVersion(version));
    }

    let meta_len = LittleEndian::read_u32(&content[8..12]) as usize;
    let meta_end = PREAMBLE + meta_len;
    if content.len() < meta_end {
        return Err(PersistenceError::InvalidFormat("truncated checkpoint metadata".into()));
    }

    let (meta, _): (CheckpointMeta, usize) =
        bincode::serde::decode_from_slice(&content[PREAMBLE..meta_end], bincode::config::standard())
            .map_err(|e| PersistenceError::InvalidFormat(e.to_string()))?;

    let body = &content[meta_end..];
    if body.len() as u64 != meta.body_len {
        return Err(PersistenceError::InvalidFormat(format!(
            "checkpoint '{}' claims {} body bytes, found {}",
            meta.name,
            meta.body_len,
            body.len()
        )));
    }
    if Digest::of(body).0 != meta.digest {
        return Err(PersistenceError::DigestMismatch(meta.name.clone()));
    }

    Ok((meta, body.to_vec()))
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp_path = path.with_extension("ckpt.tmp");
    {
        let mut file = File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    sync_parent(path);
    Ok(())
}

fn read_if_exists(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn blob_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", name, BLOB_EXTENSION))
    }

    pub fn active_path(&self) -> PathBuf {
        self.blob_path(ACTIVE_NAME)
    }

    pub fn contains(&self, name: &str) -> bool {
        validate_name(name).is_ok() && self.blob_path(name).exists()
    }

    /// Stores `bytes` as a new immutable checkpoint and makes it active.
    ///
    /// The active blob is replaced last, so a crash in between leaves the
    /// previous state live plus an unreferenced checkpoint.
    pub fn save(&self, name: &str, bytes: &[u8]) -> Result<CheckpointId> {
        validate_name(name)?;
        let path = self.blob_path(name);
        if path.exists() {
            return Err(PersistenceError::AlreadyExists(name.to_string()));
        }

        let digest = Digest::of(bytes);
        let meta = CheckpointMeta {
            name: name.to_string(),
            digest: digest.0,
            created_at: unix_millis(),
            body_len: bytes.len() as u64,
        };
        let blob = encode_blob(&meta, bytes)?;

        write_atomic(&path, &blob)?;
        write_atomic(&self.active_path(), &blob)?;

        tracing::info!("Saved checkpoint '{}' ({} bytes, {})", name, bytes.len(), digest.short());
        Ok(CheckpointId {
            name: name.to_string(),
            digest,
        })
    }

    /// Named checkpoint bytes, or the active bytes for `None`.
    pub fn load(&self, name: Option<&str>) -> Result<Vec<u8>> {
        let (_, body) = self.read_blob(name)?;
        Ok(body)
    }

    pub fn describe(&self, name: &str) -> Result<CheckpointMeta> {
        let (meta, _) = self.read_blob(Some(name))?;
        Ok(meta)
    }

    fn read_blob(&self, name: Option<&str>) -> Result<(CheckpointMeta, Vec<u8>)> {
        let (path, label) = match name {
            Some(n) => {
                validate_name(n)?;
                (self.blob_path(n), n)
            }
            None => (self.active_path(), ACTIVE_NAME),
        };
        let raw = read_if_exists(&path)?.ok_or_else(|| PersistenceError::NotFound(label.to_string()))?;
        decode_blob(&raw)
    }

    /// Every checkpoint name, excluding the active blob.
    pub fn list(&self) -> Result<BTreeSet<String>> {
        let mut names = BTreeSet::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(BLOB_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if validate_name(stem).is_ok() {
                    names.insert(stem.to_string());
                }
            }
        }
        Ok(names)
    }

    /// Copies the named checkpoint into the active blob.
    pub fn revert_to(&self, name: &str) -> Result<()> {
        validate_name(name)?;
        let raw = read_if_exists(&self.blob_path(name))?
            .ok_or_else(|| PersistenceError::NotFound(name.to_string()))?;
        // Refuse to activate damaged bytes.
        decode_blob(&raw)?;
        write_atomic(&self.active_path(), &raw)?;
        tracing::info!("Active checkpoint set to '{}'", name);
        Ok(())
    }

    pub fn revert_to_pristine(&self) -> Result<()> {
        match fs::remove_file(self.active_path()) {
            Ok(()) => {
                sync_parent(&self.active_path());
                tracing::info!("Active checkpoint cleared, pristine model live");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn active(&self) -> Result<ActivePointer> {
        match read_if_exists(&self.active_path())? {
            None => Ok(ActivePointer::Pristine),
            Some(raw) => {
                let (meta, _) = decode_blob(&raw)?;
                Ok(ActivePointer::Checkpoint {
                    digest: meta.digest(),
                    name: meta.name,
                })
            }
        }
    }

    /// Raw copy of the active blob, independent of the named checkpoint it
    /// came from.
    pub fn snapshot_active(&self) -> Result<ActiveSnapshot> {
        Ok(ActiveSnapshot {
            raw: read_if_exists(&self.active_path())?,
        })
    }

    /// Puts back exactly the bytes captured by
    /// [`CheckpointStore::snapshot_active`]. Works after the source
    /// checkpoint has been purged.
    pub fn restore_active(&self, snapshot: &ActiveSnapshot) -> Result<()> {
        match &snapshot.raw {
            None => self.revert_to_pristine(),
            Some(raw) => {
                write_atomic(&self.active_path(), raw)?;
                tracing::info!("Active blob restored ({} bytes)", raw.len());
                Ok(())
            }
        }
    }

    /// Administrative deletion. The active blob is a copy and stays intact.
    pub fn purge(&self, name: &str) -> Result<()> {
        validate_name(name)?;
        match fs::remove_file(self.blob_path(name)) {
            Ok(()) => {
                sync_parent(&self.blob_path(name));
                tracing::warn!("Purged checkpoint '{}'", name);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(PersistenceError::NotFound(name.to_string())),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::open(dir.path()).unwrap();

        let id = store.save("v1", b"weights-v1").unwrap();
        assert_eq!(id.digest, Digest::of(b"weights-v1"));
        assert_eq!(store.load(Some("v1")).unwrap(), b"weights-v1");
        assert_eq!(store.load(None).unwrap(), b"weights-v1");
        assert_eq!(
            store.active().unwrap(),
            ActivePointer::Checkpoint { name: "v1".into(), digest: id.digest }
        );
    }

    #[test]
    fn test_save_duplicate_rejected() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::open(dir.path()).unwrap();
        store.save("v1", b"a").unwrap();
        assert!(matches!(store.save("v1", b"b"), Err(PersistenceError::AlreadyExists(_))));
        assert_eq!(store.load(Some("v1")).unwrap(), b"a");
    }

    #[test]
    fn test_list_excludes_active() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::open(dir.path()).unwrap();
        assert!(store.list().unwrap().is_empty());

        store.save("v2", b"2").unwrap();
        store.save("v1", b"1").unwrap();
        assert!(store.active_path().exists());

        let names: Vec<_> = store.list().unwrap().into_iter().collect();
        assert_eq!(names, vec!["v1".to_string(), "v2".to_string()]);
    }

    #[test]
    fn test_revert_to_and_pristine() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::open(dir.path()).unwrap();
        assert_eq!(store.active().unwrap(), ActivePointer::Pristine);
        assert!(matches!(store.load(None), Err(PersistenceError::NotFound(_))));

        store.save("v1", b"one").unwrap();
        store.save("v2", b"two").unwrap();

        store.revert_to("v1").unwrap();
        assert_eq!(store.load(None).unwrap(), store.load(Some("v1")).unwrap());
        assert_eq!(store.active().unwrap().name(), Some("v1"));
        // Named blobs are untouched by activation.
        assert_eq!(store.load(Some("v2")).unwrap(), b"two");

        store.revert_to_pristine().unwrap();
        assert_eq!(store.active().unwrap(), ActivePointer::Pristine);
        store.revert_to_pristine().unwrap();
    }

    #[test]
    fn test_revert_to_unknown_leaves_active() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::open(dir.path()).unwrap();
        store.save("v1", b"one").unwrap();

        assert!(matches!(store.revert_to("ghost"), Err(PersistenceError::NotFound(_))));
        assert_eq!(store.active().unwrap().name(), Some("v1"));
    }

    #[test]
    fn test_purge_then_revert_fails() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::open(dir.path()).unwrap();
        store.save("v1", b"one").unwrap();
        store.purge("v1").unwrap();

        assert!(!store.contains("v1"));
        assert!(matches!(store.revert_to("v1"), Err(PersistenceError::NotFound(_))));
        assert!(matches!(store.purge("v1"), Err(PersistenceError::NotFound(_))));
        // The active copy survives the purge.
        assert_eq!(store.load(None).unwrap(), b"one");
    }

    #[test]
    fn test_snapshot_restores_after_source_purged() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::open(dir.path()).unwrap();
        store.save("v1", b"one").unwrap();
        let before = store.snapshot_active().unwrap();
        assert!(!before.is_pristine());

        store.purge("v1").unwrap();
        store.save("v2", b"two").unwrap();
        store.restore_active(&before).unwrap();

        assert_eq!(store.load(None).unwrap(), b"one");
        assert_eq!(store.active().unwrap().name(), Some("v1"));
    }

    #[test]
    fn test_snapshot_of_pristine() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::open(dir.path()).unwrap();
        let before = store.snapshot_active().unwrap();
        assert!(before.is_pristine());

        store.save("v1", b"one").unwrap();
        store.restore_active(&before).unwrap();
        assert_eq!(store.active().unwrap(), ActivePointer::Pristine);
    }

    #[test]
    fn test_name_validation() {
        let too_long = "x".repeat(129);
        let longest = "x".repeat(128);
        for bad in ["", "active", ".hidden", "a/b", "../x", "sp ace", too_long.as_str()] {
            assert!(matches!(validate_name(bad), Err(PersistenceError::InvalidName(_))), "{:?}", bad);
        }
        for good in ["v1", "poison-1700000000000", "clean_2.bak", longest.as_str()] {
            assert!(validate_name(good).is_ok(), "{:?}", good);
        }
    }

    #[test]
    fn test_corrupted_blob_detected() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::open(dir.path()).unwrap();
        store.save("v1", b"weights").unwrap();

        let path = dir.path().join("v1.ckpt");
        let mut raw = fs::read(&path).unwrap();
        let last_body_byte = raw.len() - TRAILER - 1;
        raw[last_body_byte] ^= 0x01;
        fs::write(&path, &raw).unwrap();

        assert!(matches!(store.load(Some("v1")), Err(PersistenceError::ChecksumMismatch { .. })));
        assert!(store.revert_to("v1").is_err());
    }

    #[test]
    fn test_digest_mismatch_detected() {
        let meta = CheckpointMeta {
            name: "forged".into(),
            digest: Digest::of(b"claimed").0,
            created_at: 0,
            body_len: 6,
        };
        // CRC is recomputed over the forged content, only the digest catches it.
        let blob = encode_blob(&meta, b"actual").unwrap();
        assert!(matches!(decode_blob(&blob), Err(PersistenceError::DigestMismatch(_))));
    }

    #[test]
    fn test_describe() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::open(dir.path()).unwrap();
        store.save("v1", b"12345").unwrap();
        let meta = store.describe("v1").unwrap();
        assert_eq!(meta.name, "v1");
        assert_eq!(meta.body_len, 5);
        assert_eq!(meta.digest(), Digest::of(b"12345"));
    }
}
