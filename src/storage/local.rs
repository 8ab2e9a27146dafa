use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::Value;

use super::{records_from_values, RecordStore, StoreError};
use crate::record::Record;

const TMP_EXTENSION: &str = "tmp";
const RETIRED_SUFFIX: &str = ".migrated";

/// Single JSON file holding the whole record array.
#[derive(Debug, Clone)]
pub struct LocalStore {
    path: PathBuf,
}

impl LocalStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Moves the slot out of the way so it is never read again. Returns the
    /// new location, or `None` when the slot was absent or had to be removed
    /// because the `.migrated` name is taken.
    pub fn retire(&self) -> Result<Option<PathBuf>> {
        let mut retired = self.path.clone().into_os_string();
        retired.push(RETIRED_SUFFIX);
        let retired = PathBuf::from(retired);
        match fs::rename(&self.path, &retired) {
            Ok(()) => Ok(Some(retired)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => {
                tracing::warn!(
                    to = %retired.display(),
                    error = %err,
                    "cannot rename legacy slot, removing it"
                );
                fs::remove_file(&self.path)
                    .with_context(|| format!("removing {}", self.path.display()))?;
                Ok(None)
            }
        }
    }

    fn io_error(&self, source: io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl RecordStore for LocalStore {
    /// Missing, unreadable or corrupt slots read as an empty collection.
    fn load(&self) -> Result<Vec<Record>, StoreError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "unreadable local store");
                return Ok(Vec::new());
            }
        };
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        match serde_json::from_str::<Vec<Value>>(&raw) {
            Ok(values) => Ok(records_from_values(values)),
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "corrupt local store");
                Ok(Vec::new())
            }
        }
    }

    fn save(&self, records: &[Record]) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(records).map_err(StoreError::Encode)?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|err| self.io_error(err))?;
        }
        let tmp_path = self.path.with_extension(TMP_EXTENSION);
        fs::write(&tmp_path, &json).map_err(|err| self.io_error(err))?;
        fs::rename(&tmp_path, &self.path).map_err(|err| self.io_error(err))?;
        Ok(())
    }
}
