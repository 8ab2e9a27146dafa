pub mod app;
pub mod cli;
pub mod config;
pub mod csv;
pub mod deadline;
pub mod record;
pub mod search;
pub mod storage;
pub mod summary;

pub use config::{AppConfig, ConfigLoader, ConfigPaths, Overrides};
pub use record::{normalize, RawRecord, Record, Status};
pub use storage::{Gateway, RecordStore, StoreError, StoreTier};
