use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Failure to reach the durable slot. Never fatal to the questionnaire.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to remove {path}: {source}")]
    Remove {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("progress storage unavailable: {0}")]
    Unavailable(String),
}

/// A key-value slot holding serialized traversal progress.
pub trait ProgressStore {
    /// `Ok(None)` when nothing is stored under `key`.
    fn load(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn save(&mut self, key: &str, body: &str) -> Result<(), StoreError>;
    /// Clearing an empty slot is not an error.
    fn clear(&mut self, key: &str) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    slots: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.slots.get(key).map(String::as_str)
    }
}

impl ProgressStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.slots.get(key).cloned())
    }

    fn save(&mut self, key: &str, body: &str) -> Result<(), StoreError> {
        self.slots.insert(key.to_string(), body.to_string());
        Ok(())
    }

    fn clear(&mut self, key: &str) -> Result<(), StoreError> {
        self.slots.remove(key);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// File store: one `<key>.json` per slot inside a directory
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn slot_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl ProgressStore for FileStore {
    fn load(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.slot_path(key);
        match fs::read_to_string(&path) {
            Ok(body) => Ok(Some(body)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Read {
                path: path.display().to_string(),
                source,
            }),
        }
    }

    fn save(&mut self, key: &str, body: &str) -> Result<(), StoreError> {
        let path = self.slot_path(key);
        let write_err = |source| StoreError::Write {
            path: path.display().to_string(),
            source,
        };
        fs::create_dir_all(&self.dir).map_err(write_err)?;
        atomic_write_file(&path, body.as_bytes()).map_err(write_err)
    }

    fn clear(&mut self, key: &str) -> Result<(), StoreError> {
        let path = self.slot_path(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Remove {
                path: path.display().to_string(),
                source,
            }),
        }
    }
}

fn atomic_write_file(path: &Path, content: &[u8]) -> io::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| io::Error::other("path has no parent"))?;
    let tmp_name = format!(
        ".{}.tmp-{}-{}",
        path.file_name().and_then(|v| v.to_str()).unwrap_or("progress"),
        std::process::id(),
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0),
    );
    let tmp_path = parent.join(tmp_name);

    let written = write_then_rename(&tmp_path, path, content);
    if written.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    written?;
    sync_parent_dir(parent)
}

fn write_then_rename(tmp_path: &Path, path: &Path, content: &[u8]) -> io::Result<()> {
    {
        let mut file = fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(tmp_path)?;
        file.write_all(content)?;
        file.sync_all()?;
    }
    fs::rename(tmp_path, path)
}

#[cfg(unix)]
fn sync_parent_dir(parent: &Path) -> io::Result<()> {
    fs::File::open(parent)?.sync_all()
}

#[cfg(not(unix))]
fn sync_parent_dir(_parent: &Path) -> io::Result<()> {
    Ok(())
}
