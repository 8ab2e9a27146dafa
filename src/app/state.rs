use thiserror::Error;
use time::{Date, OffsetDateTime};

use super::actions::{NewRecord, RecordEdit, ValidationError};
use crate::csv::{self, ImportReport};
use crate::record::Record;
use crate::search::{self, ListEntry, ListQuery};
use crate::summary::{self, Summary};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("no record matches '{0}'")]
    NotFound(String),
    #[error("'{key}' matches {matches} records; use more of the id")]
    Ambiguous { key: String, matches: usize },
}

/// The in-memory record collection. Owns every record; callers persist it
/// as a whole after mutating.
#[derive(Debug, Clone, Default)]
pub struct TrackerState {
    records: Vec<Record>,
}

impl TrackerState {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn find(&self, key: &str) -> Result<&Record, LookupError> {
        let idx = self.position(key)?;
        Ok(&self.records[idx])
    }

    /// Resolves a full id, or a prefix shared by exactly one record.
    fn position(&self, key: &str) -> Result<usize, LookupError> {
        let key = key.trim();
        if key.is_empty() {
            return Err(LookupError::NotFound(key.to_string()));
        }
        if let Some(idx) = self.records.iter().position(|r| r.id == key) {
            return Ok(idx);
        }
        let mut matches = self
            .records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.id.starts_with(key))
            .map(|(idx, _)| idx);
        match (matches.next(), matches.count()) {
            (Some(idx), 0) => Ok(idx),
            (Some(_), rest) => Err(LookupError::Ambiguous {
                key: key.to_string(),
                matches: rest + 1,
            }),
            (None, _) => Err(LookupError::NotFound(key.to_string())),
        }
    }

    pub fn add(&mut self, input: NewRecord, today: Date) -> Result<&Record, ValidationError> {
        let record = input.into_record(today)?;
        self.records.push(record);
        Ok(&self.records[self.records.len() - 1])
    }

    pub fn edit(&mut self, key: &str, edit: &RecordEdit) -> Result<&Record, StateError> {
        let idx = self.position(key)?;
        let edited = edit.apply(&self.records[idx])?;
        self.records[idx] = edited;
        Ok(&self.records[idx])
    }

    pub fn delete(&mut self, key: &str) -> Result<Record, LookupError> {
        let idx = self.position(key)?;
        Ok(self.records.remove(idx))
    }

    /// Returns whether the record changed state.
    pub fn set_returned(
        &mut self,
        key: &str,
        returned: bool,
        now: OffsetDateTime,
    ) -> Result<bool, LookupError> {
        let idx = self.position(key)?;
        Ok(self.records[idx].set_returned(returned, now))
    }

    pub fn clear(&mut self) -> usize {
        let removed = self.records.len();
        self.records.clear();
        removed
    }

    pub fn import_csv(&mut self, text: &str) -> ImportReport {
        csv::import_into(&mut self.records, text)
    }

    pub fn export_csv(&self) -> String {
        csv::encode(&self.records)
    }

    pub fn view(&self, query: &ListQuery, today: Date) -> Vec<ListEntry<'_>> {
        search::apply(&self.records, query, today)
    }

    pub fn summary(&self, today: Date) -> Summary {
        summary::summarize(&self.records, today)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error(transparent)]
    Lookup(#[from] LookupError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}
