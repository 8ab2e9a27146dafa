use time::{Date, Duration};

use crate::record::Record;

/// Records with this many days or fewer left are flagged as due soon.
pub const DUE_SOON_DAYS: i64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    pub due: Date,
    /// Whole calendar days from the reference date to `due`; negative once
    /// the window has closed.
    pub days_remaining: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Urgency {
    Open,
    DueSoon,
    Late,
}

impl Deadline {
    pub fn urgency(&self) -> Urgency {
        if self.days_remaining < 0 {
            Urgency::Late
        } else if self.days_remaining <= DUE_SOON_DAYS {
            Urgency::DueSoon
        } else {
            Urgency::Open
        }
    }

    pub fn is_due_soon(&self) -> bool {
        self.urgency() == Urgency::DueSoon
    }

    pub fn is_late(&self) -> bool {
        self.urgency() == Urgency::Late
    }

    pub fn label(&self) -> String {
        if self.days_remaining < 0 {
            format!("{} day(s) late", self.days_remaining.unsigned_abs())
        } else {
            format!("{} day(s) left", self.days_remaining)
        }
    }
}

/// Due date is the purchase date plus the return window. An unparseable
/// purchase date counts as bought on `reference`.
pub fn compute(record: &Record, reference: Date) -> Deadline {
    let purchased = match record.purchase_date() {
        Some(date) => date,
        None => {
            tracing::debug!(
                id = %record.id,
                purchase_date = %record.purchase_date,
                "unparseable purchase date, using reference date"
            );
            reference
        }
    };
    let due = add_days(purchased, record.window_days);
    Deadline {
        due,
        days_remaining: (due - reference).whole_days(),
    }
}

fn add_days(date: Date, days: u32) -> Date {
    date.checked_add(Duration::days(i64::from(days)))
        .unwrap_or(Date::MAX)
}
