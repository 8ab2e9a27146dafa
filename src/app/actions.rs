use serde_json::Value;
use thiserror::Error;
use time::Date;

use crate::record::{format_date, normalize, parse_date, RawRecord, Record, DEFAULT_WINDOW_DAYS};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("item cannot be empty")]
    EmptyItem,
    #[error("purchase date cannot be empty")]
    EmptyPurchaseDate,
    #[error("purchase date '{0}' is not a YYYY-MM-DD date")]
    InvalidPurchaseDate(String),
    #[error("return window must be at least one day, got {0}")]
    NonPositiveWindow(i64),
}

/// Form-style input for a new record.
#[derive(Debug, Clone, Default)]
pub struct NewRecord {
    pub item: String,
    pub store: String,
    /// Defaults to today when `None`.
    pub purchase_date: Option<String>,
    pub window_days: Option<i64>,
    pub notes: String,
}

impl NewRecord {
    pub fn new(item: impl Into<String>) -> Self {
        Self {
            item: item.into(),
            ..Self::default()
        }
    }

    pub fn into_record(self, today: Date) -> Result<Record, ValidationError> {
        let item = non_empty_item(&self.item)?;
        let purchase_date = match self.purchase_date.as_deref() {
            Some(date) => checked_date(date)?,
            None => format_date(today),
        };
        let window_days = checked_window(self.window_days.unwrap_or(i64::from(DEFAULT_WINDOW_DAYS)))?;

        Ok(normalize(RawRecord {
            item: Some(Value::String(item)),
            store: Some(Value::String(self.store.trim().to_string())),
            purchase_date: Some(Value::String(purchase_date)),
            window_days: Some(Value::from(window_days)),
            notes: Some(Value::String(self.notes.trim().to_string())),
            ..RawRecord::default()
        }))
    }
}

/// Structured edit: only the fields that are `Some` change.
#[derive(Debug, Clone, Default)]
pub struct RecordEdit {
    pub item: Option<String>,
    pub store: Option<String>,
    pub purchase_date: Option<String>,
    pub window_days: Option<i64>,
    pub notes: Option<String>,
}

impl RecordEdit {
    pub fn is_empty(&self) -> bool {
        self.item.is_none()
            && self.store.is_none()
            && self.purchase_date.is_none()
            && self.window_days.is_none()
            && self.notes.is_none()
    }

    /// Returns the edited copy of `record`, run through the same normalizer
    /// as new records. Identity, creation time and status are untouched.
    pub fn apply(&self, record: &Record) -> Result<Record, ValidationError> {
        let mut raw = record.to_raw();
        if let Some(item) = &self.item {
            raw.item = Some(Value::String(non_empty_item(item)?));
        }
        if let Some(date) = &self.purchase_date {
            raw.purchase_date = Some(Value::String(checked_date(date)?));
        }
        if let Some(days) = self.window_days {
            raw.window_days = Some(Value::from(checked_window(days)?));
        }
        if let Some(store) = &self.store {
            raw.store = Some(Value::String(store.trim().to_string()));
        }
        if let Some(notes) = &self.notes {
            raw.notes = Some(Value::String(notes.trim().to_string()));
        }
        Ok(normalize(raw))
    }
}

fn non_empty_item(item: &str) -> Result<String, ValidationError> {
    let item = item.trim();
    if item.is_empty() {
        return Err(ValidationError::EmptyItem);
    }
    Ok(item.to_string())
}

fn checked_date(date: &str) -> Result<String, ValidationError> {
    let date = date.trim();
    if date.is_empty() {
        return Err(ValidationError::EmptyPurchaseDate);
    }
    match parse_date(date) {
        Some(parsed) => Ok(format_date(parsed)),
        None => Err(ValidationError::InvalidPurchaseDate(date.to_string())),
    }
}

fn checked_window(days: i64) -> Result<u32, ValidationError> {
    if days < 1 {
        return Err(ValidationError::NonPositiveWindow(days));
    }
    Ok(u32::try_from(days).unwrap_or(u32::MAX))
}
