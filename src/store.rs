//! Cross-process coordination state.
//!
//! Markers shared with other processes (the deployment gate, the periodic
//! client's busy lock) live behind [`StateStore`]. Nothing here caches a
//! value in memory: the other party can change it at any time.
use crate::error::Result;
use anyhow::Context;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const SET_AT_PREFIX: &str = "set_at_ms=";

/// Key -> timestamp store. A key is "set" while its marker exists.
pub trait StateStore {
    /// Set `key`, recording the current time. Setting a set key refreshes it.
    fn set(&self, key: &str) -> Result<()>;
    /// Clear `key`. Clearing an unset key is a no-op.
    fn clear(&self, key: &str) -> Result<()>;
    /// When `key` was set, or `None` when it is not set.
    fn set_since(&self, key: &str) -> Result<Option<SystemTime>>;

    fn is_set(&self, key: &str) -> Result<bool> {
        Ok(self.set_since(key)?.is_some())
    }
}

/// Marker files under a root directory. Absolute keys are used as-is, which
/// lets the store observe markers owned by other software.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    root: PathBuf,
}

impl FileStateStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

impl StateStore for FileStateStore {
    fn set(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        let mut tmp = tempfile::NamedTempFile::new_in(parent)
            .with_context(|| format!("create marker in {}", parent.display()))?;
        writeln!(tmp, "{SET_AT_PREFIX}{}", epoch_ms(SystemTime::now()))
            .with_context(|| format!("write {}", path.display()))?;
        tmp.persist(&path)
            .with_context(|| format!("persist {}", path.display()))?;
        Ok(())
    }

    fn clear(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(anyhow::Error::new(err)
                .context(format!("remove {}", path.display()))
                .into()),
        }
    }

    fn set_since(&self, key: &str) -> Result<Option<SystemTime>> {
        let path = self.path_for(key);
        // The owner may remove its marker between any two calls here; a
        // vanished marker is simply unset.
        let text = match fs::read(&path) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(_) => String::new(),
        };
        // Markers written by other software carry no timestamp; fall back to mtime.
        let recorded = text
            .trim()
            .strip_prefix(SET_AT_PREFIX)
            .and_then(|ms| ms.parse::<u64>().ok())
            .map(|ms| UNIX_EPOCH + Duration::from_millis(ms));
        if recorded.is_some() {
            return Ok(recorded);
        }
        match fs::metadata(&path).and_then(|meta| meta.modified()) {
            Ok(modified) => Ok(Some(modified)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(anyhow::Error::new(err)
                .context(format!("stat {}", path.display()))
                .into()),
        }
    }
}

pub fn epoch_ms(time: SystemTime) -> u128 {
    time.duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default()
}
