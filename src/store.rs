use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::ledger::{LedgerError, LedgerSnapshot, LedgerState};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("snapshot i/o failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("snapshot encoding failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// JSON file holding the whole ledger. Writes replace the file in one
/// rename so readers see either the old state or the new one.
#[derive(Clone, Debug)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<LedgerState>, StoreError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(self.io_error(source)),
        };
        let snapshot: LedgerSnapshot = serde_json::from_slice(&bytes)?;
        let state = LedgerState::from_snapshot(snapshot)?;
        debug!(path = %self.path.display(), height = state.meta().height, "ledger loaded");
        Ok(Some(state))
    }

    pub fn load_or_default(&self) -> Result<LedgerState, StoreError> {
        Ok(self.load()?.unwrap_or_default())
    }

    pub fn save(&self, state: &LedgerState) -> Result<(), StoreError> {
        let encoded = serde_json::to_vec_pretty(&state.snapshot())?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|source| self.io_error(source))?;
            }
        }
        let tmp = self.tmp_path();
        let mut file = fs::File::create(&tmp).map_err(|source| self.io_error(source))?;
        file.write_all(&encoded)
            .and_then(|_| file.sync_all())
            .map_err(|source| self.io_error(source))?;
        fs::rename(&tmp, &self.path).map_err(|source| self.io_error(source))?;
        debug!(path = %self.path.display(), height = state.meta().height, "ledger saved");
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}
