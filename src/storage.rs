use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use crate::error::CoinTrackerError;

/// Synchronous key/value persistence for alarms and cache snapshots.
/// A missing key is not an error; first runs start from an empty store.
pub trait Storage: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<String>, CoinTrackerError>;
    fn save(&self, key: &str, value: &str) -> Result<(), CoinTrackerError>;
}

pub struct JsonFileStorage {
    dir: PathBuf,
}

impl JsonFileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, CoinTrackerError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .map_err(|e| CoinTrackerError::Storage(format!("create {}: {}", dir.display(), e)))?;
        Ok(Self { dir })
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl Storage for JsonFileStorage {
    fn load(&self, key: &str) -> Result<Option<String>, CoinTrackerError> {
        let path = self.path(key);
        match fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => Ok(None),
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CoinTrackerError::Storage(format!(
                "read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    fn save(&self, key: &str, value: &str) -> Result<(), CoinTrackerError> {
        let path = self.path(key);
        fs::write(&path, value)
            .map_err(|e| CoinTrackerError::Storage(format!("write {}: {}", path.display(), e)))
    }
}
