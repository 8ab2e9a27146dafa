use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};
use time::format_description::{self, well_known::Rfc3339, FormatItem};
use time::{Date, OffsetDateTime};

pub const DEFAULT_WINDOW_DAYS: u32 = 30;

static DATE_FORMAT: Lazy<Vec<FormatItem<'static>>> = Lazy::new(|| {
    format_description::parse("[year]-[month]-[day]").expect("valid date format description")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Status {
    Active,
    Returned,
}

/// Return status with the timestamp carried by the `Returned` variant, so a
/// returned record always has a return time and an active one never does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnState {
    Active,
    Returned { at: OffsetDateTime },
}

impl ReturnState {
    pub fn status(&self) -> Status {
        match self {
            ReturnState::Active => Status::Active,
            ReturnState::Returned { .. } => Status::Returned,
        }
    }

    pub fn returned_at(&self) -> Option<OffsetDateTime> {
        match self {
            ReturnState::Active => None,
            ReturnState::Returned { at } => Some(*at),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawRecord", into = "StoredRecord")]
pub struct Record {
    pub id: String,
    pub item: String,
    pub store: String,
    /// Kept as entered; see [`Record::purchase_date`] for the parsed form.
    pub purchase_date: String,
    pub window_days: u32,
    pub notes: String,
    pub state: ReturnState,
    pub created_at: OffsetDateTime,
}

impl Record {
    pub fn status(&self) -> Status {
        self.state.status()
    }

    pub fn is_returned(&self) -> bool {
        matches!(self.state, ReturnState::Returned { .. })
    }

    pub fn returned_at(&self) -> Option<OffsetDateTime> {
        self.state.returned_at()
    }

    pub fn purchase_date(&self) -> Option<Date> {
        parse_date(&self.purchase_date)
    }

    /// Moves the record between active and returned. Returns `false` when the
    /// record is already in the requested state.
    pub fn set_returned(&mut self, returned: bool, now: OffsetDateTime) -> bool {
        match (returned, self.state) {
            (true, ReturnState::Active) => {
                self.state = ReturnState::Returned { at: now };
                true
            }
            (false, ReturnState::Returned { .. }) => {
                self.state = ReturnState::Active;
                true
            }
            _ => false,
        }
    }

    pub fn to_raw(&self) -> RawRecord {
        let stored = StoredRecord::from(self.clone());
        RawRecord {
            id: Some(Value::String(stored.id)),
            item: Some(Value::String(stored.item)),
            store: Some(Value::String(stored.store)),
            purchase_date: Some(Value::String(stored.purchase_date)),
            window_days: Some(Value::from(stored.window_days)),
            notes: Some(Value::String(stored.notes)),
            status: Some(Value::String(stored.status)),
            created_at: Some(Value::String(stored.created_at)),
            returned_at: stored.returned_at.map(Value::String),
        }
    }
}

/// Partial, loosely typed record as found in stored JSON, imported CSV rows or
/// hand-edited files. Every field may be missing or of the wrong type.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RawRecord {
    pub id: Option<Value>,
    pub item: Option<Value>,
    pub store: Option<Value>,
    pub purchase_date: Option<Value>,
    pub window_days: Option<Value>,
    pub notes: Option<Value>,
    pub status: Option<Value>,
    pub created_at: Option<Value>,
    pub returned_at: Option<Value>,
}

impl RawRecord {
    pub fn from_value(value: Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }
}

impl From<RawRecord> for Record {
    fn from(raw: RawRecord) -> Self {
        normalize(raw)
    }
}

/// Wire shape written to the remote endpoint and the local slot.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRecord {
    pub id: String,
    pub item: String,
    pub store: String,
    pub purchase_date: String,
    pub window_days: u32,
    pub notes: String,
    pub status: String,
    pub created_at: String,
    pub returned_at: Option<String>,
}

impl From<Record> for StoredRecord {
    fn from(record: Record) -> Self {
        Self {
            status: record.status().to_string(),
            created_at: format_timestamp(record.created_at),
            returned_at: record.returned_at().map(format_timestamp),
            id: record.id,
            item: record.item,
            store: record.store,
            purchase_date: record.purchase_date,
            window_days: record.window_days,
            notes: record.notes,
        }
    }
}

/// Coerces arbitrary input into a structurally valid [`Record`]. Never fails;
/// missing or malformed fields take their defaults and existing valid values
/// are kept as they are.
pub fn normalize(raw: RawRecord) -> Record {
    let id = coerce_string(raw.id.as_ref()).trim().to_string();
    let id = if id.is_empty() { new_id() } else { id };

    let purchase_date = coerce_string(raw.purchase_date.as_ref()).trim().to_string();
    let purchase_date = if purchase_date.is_empty() {
        format_date(today())
    } else {
        purchase_date
    };

    let created_at = match coerce_timestamp(raw.created_at.as_ref()) {
        Some(ts) => ts,
        None => now_timestamp(),
    };

    let state = match raw.status.as_ref() {
        Some(Value::String(status)) if status == "returned" => ReturnState::Returned {
            at: coerce_timestamp(raw.returned_at.as_ref()).unwrap_or_else(now_timestamp),
        },
        _ => ReturnState::Active,
    };

    Record {
        id,
        item: coerce_string(raw.item.as_ref()).trim().to_string(),
        store: coerce_string(raw.store.as_ref()),
        purchase_date,
        window_days: coerce_window(raw.window_days.as_ref()),
        notes: coerce_string(raw.notes.as_ref()),
        state,
        created_at,
    }
}

pub fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Current time at second precision, so stored timestamps survive a text
/// round-trip unchanged.
pub fn now_timestamp() -> OffsetDateTime {
    let now = OffsetDateTime::now_utc();
    now.replace_nanosecond(0).unwrap_or(now)
}

/// Today's calendar date in the local timezone, or UTC when the local offset
/// cannot be determined.
pub fn today() -> Date {
    OffsetDateTime::now_local()
        .unwrap_or_else(|_| OffsetDateTime::now_utc())
        .date()
}

pub fn parse_date(input: &str) -> Option<Date> {
    Date::parse(input.trim(), &*DATE_FORMAT).ok()
}

pub fn format_date(date: Date) -> String {
    date.format(&*DATE_FORMAT)
        .unwrap_or_else(|_| date.to_string())
}

pub fn parse_timestamp(input: &str) -> Option<OffsetDateTime> {
    OffsetDateTime::parse(input.trim(), &Rfc3339).ok()
}

pub fn format_timestamp(ts: OffsetDateTime) -> String {
    ts.format(&Rfc3339)
        .unwrap_or_else(|_| ts.unix_timestamp().to_string())
}

fn coerce_string(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn coerce_window(value: Option<&Value>) -> u32 {
    let days = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match days {
        Some(days) if days.is_finite() && days >= 1.0 => {
            if days >= f64::from(u32::MAX) {
                u32::MAX
            } else {
                days.trunc() as u32
            }
        }
        _ => DEFAULT_WINDOW_DAYS,
    }
}

fn coerce_timestamp(value: Option<&Value>) -> Option<OffsetDateTime> {
    let Some(Value::String(raw)) = value else {
        return None;
    };
    if raw.trim().is_empty() {
        return None;
    }
    let parsed = parse_timestamp(raw);
    if parsed.is_none() {
        tracing::warn!(value = %raw, "discarding unparseable timestamp");
    }
    parsed
}
