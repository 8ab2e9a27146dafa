use std::fmt;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde_json::Value;
use thiserror::Error;

use crate::config::AppConfig;
use crate::record::{RawRecord, Record};

mod local;
mod remote;

pub use local::LocalStore;
pub use remote::RemoteStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("remote request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("remote endpoint answered HTTP {0}")]
    Status(u16),
    #[error("malformed response body: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("remote endpoint did not acknowledge the request")]
    Rejected,
    #[error("local store {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("encoding records: {0}")]
    Encode(#[source] serde_json::Error),
}

/// One place the full record collection can be read from and written to.
/// Saves always replace the whole collection.
pub trait RecordStore {
    fn load(&self) -> Result<Vec<Record>, StoreError>;
    fn save(&self, records: &[Record]) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreTier {
    Remote,
    Local,
}

impl fmt::Display for StoreTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreTier::Remote => f.write_str("remote"),
            StoreTier::Local => f.write_str("local"),
        }
    }
}

#[derive(Debug)]
pub struct Loaded {
    pub records: Vec<Record>,
    pub tier: StoreTier,
    /// Records adopted from the legacy slot during this load.
    pub migrated: usize,
}

/// Two-tier persistence: try the remote store, fall back to the local one.
pub struct Gateway {
    remote: Option<Box<dyn RecordStore>>,
    local: Box<dyn RecordStore>,
    legacy: Option<LocalStore>,
}

impl Gateway {
    pub fn new(remote: Option<Box<dyn RecordStore>>, local: Box<dyn RecordStore>) -> Self {
        Self {
            remote,
            local,
            legacy: None,
        }
    }

    pub fn with_legacy(mut self, legacy: LocalStore) -> Self {
        self.legacy = Some(legacy);
        self
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    pub fn load(&self) -> (Vec<Record>, StoreTier) {
        if let Some(remote) = &self.remote {
            match remote.load() {
                Ok(records) => {
                    tracing::debug!(count = records.len(), "loaded records from remote");
                    return (records, StoreTier::Remote);
                }
                Err(err) => {
                    tracing::warn!(error = %err, "remote load failed, using local store");
                }
            }
        }
        match self.local.load() {
            Ok(records) => (records, StoreTier::Local),
            Err(err) => {
                tracing::warn!(error = %err, "local load failed, starting empty");
                (Vec::new(), StoreTier::Local)
            }
        }
    }

    /// Writes the full collection remotely, or locally when the remote write
    /// fails. Errors only when the local write fails too.
    pub fn save(&self, records: &[Record]) -> Result<StoreTier, StoreError> {
        if let Some(remote) = &self.remote {
            match remote.save(records) {
                Ok(()) => return Ok(StoreTier::Remote),
                Err(err) => {
                    tracing::warn!(error = %err, "remote save failed, writing local store");
                }
            }
        }
        self.local.save(records)?;
        Ok(StoreTier::Local)
    }

    /// Startup load. When the primary load is empty and the legacy slot holds
    /// records, those are adopted, saved through [`Gateway::save`] and the
    /// legacy slot is retired. Never fails; problems are logged.
    pub fn bootstrap(&self) -> Loaded {
        let (records, tier) = self.load();
        let mut loaded = Loaded {
            records,
            tier,
            migrated: 0,
        };
        if !loaded.records.is_empty() {
            return loaded;
        }
        let Some(legacy) = &self.legacy else {
            return loaded;
        };
        let snapshot = legacy.load().unwrap_or_default();
        if snapshot.is_empty() {
            return loaded;
        }

        tracing::info!(count = snapshot.len(), "migrating legacy local snapshot");
        match self.save(&snapshot) {
            Ok(tier) => {
                if let Err(err) = legacy.retire() {
                    tracing::warn!(
                        path = %legacy.path().display(),
                        error = %err,
                        "could not retire migrated legacy snapshot"
                    );
                }
                loaded.tier = tier;
                loaded.migrated = snapshot.len();
            }
            Err(err) => {
                tracing::warn!(error = %err, "could not persist migrated snapshot");
            }
        }
        loaded.records = snapshot;
        loaded
    }
}

pub fn init(config: &AppConfig) -> Result<Gateway> {
    let local = LocalStore::new(config.storage.local_file.clone());
    let remote: Option<Box<dyn RecordStore>> = match config.remote.endpoint.as_deref() {
        Some(endpoint) => Some(Box::new(
            RemoteStore::new(endpoint, config.remote.timeout())
                .with_context(|| format!("building remote client for {endpoint}"))?,
        )),
        None => None,
    };
    let legacy = LocalStore::new(config.storage.legacy_file.clone());
    Ok(Gateway::new(remote, Box::new(local)).with_legacy(legacy))
}

/// Normalizes a JSON array of stored records. Entries that are not objects or
/// that have no item are dropped.
pub(crate) fn records_from_values(values: Vec<Value>) -> Vec<Record> {
    let mut records = Vec::with_capacity(values.len());
    for value in values {
        let raw = match RawRecord::from_value(value) {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(error = %err, "skipping malformed stored record");
                continue;
            }
        };
        let record = Record::from(raw);
        if record.item.is_empty() {
            tracing::warn!(id = %record.id, "skipping stored record without an item");
            continue;
        }
        records.push(record);
    }
    records
}

#[cfg(test)]
pub(crate) mod testing {
    use std::cell::{Cell, RefCell};

    use super::*;

    /// In-memory store whose writes can be made to fail.
    #[derive(Default)]
    pub struct MemStore {
        records: RefCell<Vec<Record>>,
        fail_load: Cell<bool>,
        fail_save: Cell<bool>,
        saves: Cell<usize>,
    }

    impl MemStore {
        pub fn with_records(records: Vec<Record>) -> Self {
            let store = Self::default();
            *store.records.borrow_mut() = records;
            store
        }

        pub fn failing() -> Self {
            let store = Self::default();
            store.fail_load.set(true);
            store.fail_save.set(true);
            store
        }

        pub fn records(&self) -> Vec<Record> {
            self.records.borrow().clone()
        }

        pub fn saves(&self) -> usize {
            self.saves.get()
        }
    }

    impl RecordStore for MemStore {
        fn load(&self) -> Result<Vec<Record>, StoreError> {
            if self.fail_load.get() {
                return Err(StoreError::Rejected);
            }
            Ok(self.records.borrow().clone())
        }

        fn save(&self, records: &[Record]) -> Result<(), StoreError> {
            if self.fail_save.get() {
                return Err(StoreError::Status(503));
            }
            self.saves.set(self.saves.get() + 1);
            *self.records.borrow_mut() = records.to_vec();
            Ok(())
        }
    }

    impl<T: RecordStore + ?Sized> RecordStore for std::rc::Rc<T> {
        fn load(&self) -> Result<Vec<Record>, StoreError> {
            (**self).load()
        }

        fn save(&self, records: &[Record]) -> Result<(), StoreError> {
            (**self).save(records)
        }
    }
}
