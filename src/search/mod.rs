use std::cmp::Ordering;

use icu_collator::{Collator, CollatorOptions, Strength};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use time::Date;

use crate::deadline::{self, Deadline};
use crate::record::Record;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(from = "String", into = "String")]
pub enum SortMode {
    #[default]
    DueAsc,
    DueDesc,
    PurchaseAsc,
    PurchaseDesc,
    Store,
}

impl SortMode {
    /// Unknown names fall back to [`SortMode::DueAsc`].
    pub fn parse_lenient(input: &str) -> Self {
        input.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(sort = %input, "unknown sort mode, using due-asc");
            SortMode::DueAsc
        })
    }
}

impl From<String> for SortMode {
    fn from(value: String) -> Self {
        SortMode::parse_lenient(&value)
    }
}

impl From<SortMode> for String {
    fn from(mode: SortMode) -> Self {
        mode.to_string()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    pub text: String,
    pub include_returned: bool,
    pub sort: SortMode,
}

impl ListQuery {
    pub fn new(text: impl Into<String>, include_returned: bool, sort: SortMode) -> Self {
        Self {
            text: text.into(),
            include_returned,
            sort,
        }
    }

    fn needle(&self) -> Option<String> {
        let trimmed = self.text.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_lowercase())
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ListEntry<'a> {
    pub record: &'a Record,
    pub deadline: Deadline,
}

/// Filters and orders `records` for display. Deadlines are computed once
/// against `today`, so ordering and the displayed day counts always agree.
pub fn apply<'a>(records: &'a [Record], query: &ListQuery, today: Date) -> Vec<ListEntry<'a>> {
    let needle = query.needle();
    let mut entries: Vec<ListEntry<'a>> = records
        .iter()
        .filter(|record| query.include_returned || !record.is_returned())
        .filter(|record| match needle.as_deref() {
            Some(needle) => matches_text(record, needle),
            None => true,
        })
        .map(|record| ListEntry {
            record,
            deadline: deadline::compute(record, today),
        })
        .collect();

    let collator = match query.sort {
        SortMode::Store => store_collator(),
        _ => None,
    };
    entries.sort_by(|a, b| compare(query.sort, collator.as_ref(), a, b));
    entries
}

/// `needle` must already be lowercased.
pub fn matches_text(record: &Record, needle: &str) -> bool {
    [&record.item, &record.store, &record.notes]
        .into_iter()
        .any(|field| field.to_lowercase().contains(needle))
}

/// Root-locale collation at secondary strength: accents count, case does not.
fn store_collator() -> Option<Collator> {
    let mut options = CollatorOptions::new();
    options.strength = Some(Strength::Secondary);
    match Collator::try_new(&Default::default(), options) {
        Ok(collator) => Some(collator),
        Err(err) => {
            tracing::warn!(error = %err, "store collation unavailable, comparing lowercased names");
            None
        }
    }
}

fn compare(
    mode: SortMode,
    collator: Option<&Collator>,
    a: &ListEntry<'_>,
    b: &ListEntry<'_>,
) -> Ordering {
    match mode {
        SortMode::DueAsc => a.deadline.due.cmp(&b.deadline.due),
        SortMode::DueDesc => b.deadline.due.cmp(&a.deadline.due),
        // `None` orders before every date, so unparseable dates sort earliest.
        SortMode::PurchaseAsc => a.record.purchase_date().cmp(&b.record.purchase_date()),
        SortMode::PurchaseDesc => b.record.purchase_date().cmp(&a.record.purchase_date()),
        SortMode::Store => match collator {
            Some(collator) => collator.compare(&a.record.store, &b.record.store),
            None => a
                .record
                .store
                .to_lowercase()
                .cmp(&b.record.store.to_lowercase()),
        },
    }
}
