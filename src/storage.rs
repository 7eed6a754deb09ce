//! Disk persistence for the ledger (one JSON array per snapshot).

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;
use tracing::{debug, warn};

use crate::model::Block;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// What a store found when asked for its snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LoadedSnapshot {
    /// Nothing has been saved yet.
    #[default]
    Absent,
    /// Something is stored but it does not parse as a block array.
    Corrupt { reason: String },
    /// A parsed snapshot. May be empty.
    Blocks(Vec<Block>),
}

/// Durable home of the ledger. Stores only serialize and deserialize whole
/// snapshots; they never edit the block sequence.
pub trait SnapshotStore: Send + Sync {
    fn load(&self) -> Result<LoadedSnapshot, StorageError>;
    /// Replace the stored snapshot. Readers never observe a partial write.
    fn save(&self, blocks: &[Block]) -> Result<(), StorageError>;
    /// Human-readable location for logs and errors.
    fn describe(&self) -> String;
}

/// Ensure that the given directory exists (create recursively if needed).
pub fn ensure_dir(dir: &Path) -> Result<(), StorageError> {
    if !dir.exists() {
        fs::create_dir_all(dir).map_err(|e| StorageError::io(dir, e))?;
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    path: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(dir: &Path, file_name: &str) -> Self {
        Self {
            path: dir.join(file_name),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write an unreadable snapshot aside so a later save cannot destroy it.
    /// Never replaces an earlier backup: a taken name gets a numeric suffix.
    fn preserve_corrupt(&self, contents: &[u8]) -> Option<PathBuf> {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        for attempt in 0..MAX_BACKUP_ATTEMPTS {
            let mut name = self.path.as_os_str().to_owned();
            name.push(format!(".corrupt-{secs}"));
            if attempt > 0 {
                name.push(format!("-{attempt}"));
            }
            let backup = PathBuf::from(name);
            match write_new(&backup, contents) {
                Ok(()) => return Some(backup),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    warn!(
                        path = %self.path.display(),
                        error = %e,
                        "could not back up corrupt snapshot"
                    );
                    return None;
                }
            }
        }
        warn!(path = %self.path.display(), "no free backup name for corrupt snapshot");
        None
    }
}

const MAX_BACKUP_ATTEMPTS: u32 = 1000;

/// Create `path` (failing if it exists) and fill it with `contents`.
fn write_new(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut f = OpenOptions::new().write(true).create_new(true).open(path)?;
    f.write_all(contents)?;
    f.sync_all()
}

impl SnapshotStore for FileSnapshotStore {
    fn load(&self) -> Result<LoadedSnapshot, StorageError> {
        let buf = match fs::read(&self.path) {
            Ok(buf) => buf,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(LoadedSnapshot::Absent)
            }
            Err(e) => return Err(StorageError::io(&self.path, e)),
        };
        match serde_json::from_slice::<Vec<Block>>(&buf) {
            Ok(blocks) => {
                debug!(path = %self.path.display(), blocks = blocks.len(), "snapshot parsed");
                Ok(LoadedSnapshot::Blocks(blocks))
            }
            Err(e) => {
                if let Some(backup) = self.preserve_corrupt(&buf) {
                    warn!(backup = %backup.display(), "corrupt snapshot copied aside");
                }
                Ok(LoadedSnapshot::Corrupt {
                    reason: e.to_string(),
                })
            }
        }
    }

    fn save(&self, blocks: &[Block]) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            ensure_dir(parent)?;
        }
        let json = serde_json::to_vec_pretty(blocks)?;
        let tmp = self.path.with_extension("tmp");
        {
            let mut f = File::create(&tmp).map_err(|e| StorageError::io(&tmp, e))?;
            f.write_all(&json).map_err(|e| StorageError::io(&tmp, e))?;
            f.sync_all().map_err(|e| StorageError::io(&tmp, e))?;
        }
        fs::rename(&tmp, &self.path).map_err(|e| StorageError::io(&self.path, e))?;
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// In-process store for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    snapshot: Mutex<LoadedSnapshot>,
    fail_saves: AtomicBool,
    saves: AtomicUsize,
}

impl MemorySnapshotStore {
    pub fn with_blocks(blocks: Vec<Block>) -> Self {
        Self {
            snapshot: Mutex::new(LoadedSnapshot::Blocks(blocks)),
            ..Self::default()
        }
    }

    pub fn corrupt(reason: &str) -> Self {
        Self {
            snapshot: Mutex::new(LoadedSnapshot::Corrupt {
                reason: reason.to_string(),
            }),
            ..Self::default()
        }
    }

    /// Make every following `save` fail until switched back.
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Blocks of the last successful save, if any.
    pub fn saved_blocks(&self) -> Option<Vec<Block>> {
        match &*self.snapshot.lock().ok()? {
            LoadedSnapshot::Blocks(blocks) => Some(blocks.clone()),
            _ => None,
        }
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn load(&self) -> Result<LoadedSnapshot, StorageError> {
        self.snapshot
            .lock()
            .map(|s| s.clone())
            .map_err(|_| StorageError::Backend("memory store lock poisoned".into()))
    }

    fn save(&self, blocks: &[Block]) -> Result<(), StorageError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("save rejected".into()));
        }
        let mut guard = self
            .snapshot
            .lock()
            .map_err(|_| StorageError::Backend("memory store lock poisoned".into()))?;
        *guard = LoadedSnapshot::Blocks(blocks.to_vec());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<Block> {
        let g = Block::genesis("2025-01-01T00:00:00Z".into()).unwrap();
        let b = Block::new(2, "2025-01-01T00:01:00Z".into(), "ab".repeat(32), g.hash.clone())
            .unwrap();
        vec![g, b]
    }

    #[test]
    fn missing_file_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path(), "blockchain.json");
        assert_eq!(store.load().unwrap(), LoadedSnapshot::Absent);
    }

    #[test]
    fn save_then_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::new(&dir.path().join("nested"), "blockchain.json");
        let blocks = sample();
        store.save(&blocks).unwrap();
        assert_eq!(store.load().unwrap(), LoadedSnapshot::Blocks(blocks));
        assert!(!store.path().with_extension("tmp").exists());
    }

    #[test]
    fn save_replaces_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path(), "blockchain.json");
        let blocks = sample();
        store.save(&blocks).unwrap();
        store.save(&blocks[..1]).unwrap();
        assert_eq!(
            store.load().unwrap(),
            LoadedSnapshot::Blocks(blocks[..1].to_vec())
        );
    }

    #[test]
    fn corrupt_file_is_reported_and_kept() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path(), "blockchain.json");
        fs::write(store.path(), b"[{\"index\": 1,").unwrap();

        let loaded = store.load().unwrap();
        assert!(matches!(loaded, LoadedSnapshot::Corrupt { .. }));
        // original left in place, plus a backup copy
        assert!(store.path().exists());
        let backups = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".corrupt-"))
            .count();
        assert_eq!(backups, 1);
    }

    #[test]
    fn repeated_corruption_keeps_every_backup() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path(), "blockchain.json");

        fs::write(store.path(), b"first-corrupt").unwrap();
        assert!(matches!(store.load().unwrap(), LoadedSnapshot::Corrupt { .. }));
        store.save(&sample()).unwrap();
        fs::write(store.path(), b"second-corrupt").unwrap();
        assert!(matches!(store.load().unwrap(), LoadedSnapshot::Corrupt { .. }));

        let mut backups: Vec<Vec<u8>> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".corrupt-"))
            .map(|e| fs::read(e.path()).unwrap())
            .collect();
        backups.sort();
        assert_eq!(backups, vec![b"first-corrupt".to_vec(), b"second-corrupt".to_vec()]);
    }

    #[test]
    fn reads_snapshot_with_free_form_timestamps() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path(), "blockchain.json");
        let raw = r#"[
    {
        "index": 1,
        "timestamp": "2025-01-15 10:30:00.123456",
        "data": "Genesis Block",
        "previous_hash": "0",
        "hash": "0869b9861e4484b9f9f025bec8f7588522d378397b882eb5a4032f801b9390f2"
    }
]"#;
        fs::write(store.path(), raw).unwrap();
        let LoadedSnapshot::Blocks(blocks) = store.load().unwrap() else {
            panic!("expected blocks");
        };
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].hash, crate::model::compute_block_hash(&blocks[0]).unwrap());
    }

    #[test]
    fn memory_store_can_fail_saves() {
        let store = MemorySnapshotStore::default();
        store.set_fail_saves(true);
        assert!(store.save(&sample()).is_err());
        assert_eq!(store.save_count(), 0);
        store.set_fail_saves(false);
        store.save(&sample()).unwrap();
        assert_eq!(store.saved_blocks().unwrap().len(), 2);
    }
}
