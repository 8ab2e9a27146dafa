use serde::Serialize;
use time::Date;

use crate::deadline;
use crate::record::Record;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub active: usize,
    pub due_soon: usize,
    pub late: usize,
}

/// Counts over every active record, independent of any list filter.
pub fn summarize(records: &[Record], today: Date) -> Summary {
    records
        .iter()
        .filter(|record| !record.is_returned())
        .fold(Summary::default(), |mut summary, record| {
            let deadline = deadline::compute(record, today);
            summary.active += 1;
            if deadline.is_due_soon() {
                summary.due_soon += 1;
            }
            if deadline.is_late() {
                summary.late += 1;
            }
            summary
        })
}
