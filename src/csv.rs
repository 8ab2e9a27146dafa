use std::borrow::Cow;
use std::collections::HashMap;

use serde_json::Value;

use crate::record::{format_timestamp, normalize, RawRecord, Record};

pub const COLUMNS: [&str; 7] = [
    "item",
    "store",
    "purchaseDate",
    "windowDays",
    "notes",
    "status",
    "returnedAt",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub imported: usize,
    pub skipped: usize,
}

/// Header row first, then one row per record, joined with `\n`.
pub fn encode(records: &[Record]) -> String {
    let mut rows = Vec::with_capacity(records.len() + 1);
    rows.push(join_row(COLUMNS.iter().copied()));
    for record in records {
        let window_days = record.window_days.to_string();
        let status = record.status().to_string();
        let returned_at = record
            .returned_at()
            .map(format_timestamp)
            .unwrap_or_default();
        rows.push(join_row([
            record.item.as_str(),
            record.store.as_str(),
            record.purchase_date.as_str(),
            window_days.as_str(),
            record.notes.as_str(),
            status.as_str(),
            returned_at.as_str(),
        ]));
    }
    rows.join("\n")
}

fn join_row<'a>(fields: impl IntoIterator<Item = &'a str>) -> String {
    fields
        .into_iter()
        .map(escape_field)
        .collect::<Vec<_>>()
        .join(",")
}

/// Quotes a field only when it holds a comma, quote, carriage return or newline.
pub fn escape_field(field: &str) -> Cow<'_, str> {
    if field.contains(|ch| matches!(ch, ',' | '"' | '\r' | '\n')) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

/// Splits one logical CSV row into fields. Outside quotes a comma ends the
/// field and `"` opens a quoted region; inside, `""` is a literal quote and any
/// other `"` closes the region.
pub fn parse_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_quotes {
            if ch == '"' {
                if chars.peek() == Some(&'"') {
                    current.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                current.push(ch);
            }
            continue;
        }
        match ch {
            ',' => fields.push(std::mem::take(&mut current)),
            '"' => in_quotes = true,
            _ => current.push(ch),
        }
    }
    fields.push(current);
    fields
}

/// Splits CSV text into logical rows. Newlines inside quoted regions belong to
/// the field; a `\r` before a row-ending newline is dropped.
pub fn split_records(text: &str) -> Vec<String> {
    let mut rows = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for ch in text.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                current.push(ch);
            }
            '\n' if !in_quotes => {
                if current.ends_with('\r') {
                    current.pop();
                }
                rows.push(std::mem::take(&mut current));
            }
            _ => current.push(ch),
        }
    }
    if current.ends_with('\r') {
        current.pop();
    }
    if !current.is_empty() {
        rows.push(current);
    }
    rows
}

struct HeaderMap {
    columns: HashMap<String, usize>,
}

impl HeaderMap {
    fn new(header: &str) -> Self {
        let columns = parse_line(header)
            .into_iter()
            .enumerate()
            .map(|(idx, name)| (name.trim().to_string(), idx))
            .collect();
        Self { columns }
    }

    fn field(&self, fields: &[String], name: &str) -> Option<Value> {
        let idx = *self.columns.get(name)?;
        fields.get(idx).map(|value| Value::String(value.clone()))
    }

    fn candidate(&self, row: &str) -> RawRecord {
        let fields = parse_line(row);
        RawRecord {
            item: self.field(&fields, "item"),
            store: self.field(&fields, "store"),
            purchase_date: self.field(&fields, "purchaseDate"),
            window_days: self.field(&fields, "windowDays"),
            notes: self.field(&fields, "notes"),
            status: self.field(&fields, "status"),
            returned_at: self.field(&fields, "returnedAt"),
            ..RawRecord::default()
        }
    }
}

/// Parses CSV text into candidate records keyed by the header row. Columns
/// may appear in any order; absent columns are left unset. Any `id` or
/// `createdAt` column is ignored.
pub fn decode(text: &str) -> Vec<RawRecord> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut rows = split_records(text)
        .into_iter()
        .filter(|row| !row.trim().is_empty());
    let Some(header) = rows.next() else {
        return Vec::new();
    };
    let header = HeaderMap::new(&header);
    rows.map(|row| header.candidate(&row)).collect()
}

/// Appends every decoded row with a non-empty item to `records`, each under a
/// fresh id. Existing records are never touched.
pub fn import_into(records: &mut Vec<Record>, text: &str) -> ImportReport {
    let mut report = ImportReport::default();
    for candidate in decode(text) {
        let record = normalize(candidate);
        if record.item.is_empty() {
            report.skipped += 1;
            continue;
        }
        records.push(record);
        report.imported += 1;
    }
    if report.skipped > 0 {
        tracing::warn!(skipped = report.skipped, "dropped import rows without an item");
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{ReturnState, Status};
    use serde_json::json;
    use time::macros::datetime;

    const HEADER: &str = "item,store,purchaseDate,windowDays,notes,status,returnedAt";

    fn rec(value: serde_json::Value) -> Record {
        normalize(RawRecord::from_value(value).expect("raw"))
    }

    #[test]
    fn empty_collection_still_has_header() {
        assert_eq!(encode(&[]), HEADER);
    }

    #[test]
    fn quotes_only_fields_that_need_it() {
        assert_eq!(escape_field("plain"), "plain");
        assert_eq!(escape_field("a,b"), "\"a,b\"");
        assert_eq!(escape_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(escape_field("two\nlines"), "\"two\nlines\"");
        assert_eq!(escape_field("cr\r"), "\"cr\r\"");
        assert_eq!(escape_field("it's fine"), "it's fine");
    }

    #[test]
    fn encodes_rows_in_fixed_column_order() {
        let mut returned = rec(json!({
            "item": "Toaster",
            "store": "Big Box, Ltd.",
            "purchaseDate": "2025-02-01",
            "windowDays": 45,
            "notes": "receipt in \"drawer\"",
        }));
        returned.set_returned(true, datetime!(2025-02-10 15:30:00 UTC));
        let active = rec(json!({
            "item": "Mug",
            "purchaseDate": "2025-02-02",
            "windowDays": 7,
        }));

        let csv = encode(&[returned, active]);
        let expected = [
            HEADER,
            "Toaster,\"Big Box, Ltd.\",2025-02-01,45,\"receipt in \"\"drawer\"\"\",returned,2025-02-10T15:30:00Z",
            "Mug,,2025-02-02,7,,active,",
        ]
        .join("\n");
        assert_eq!(csv, expected);
    }

    #[test]
    fn parse_line_handles_quotes_and_commas() {
        assert_eq!(parse_line("a,b,,c"), vec!["a", "b", "", "c"]);
        assert_eq!(
            parse_line("Widget,\"Al's Store, Inc.\",x"),
            vec!["Widget", "Al's Store, Inc.", "x"]
        );
        assert_eq!(parse_line("\"say \"\"hi\"\"\",end"), vec!["say \"hi\"", "end"]);
        assert_eq!(parse_line(""), vec![""]);
        assert_eq!(parse_line("trailing,"), vec!["trailing", ""]);
    }

    #[test]
    fn split_records_keeps_quoted_newlines_and_drops_crlf() {
        let text = "h1,h2\r\na,\"multi\nline\"\r\nb,c\n";
        assert_eq!(
            split_records(text),
            vec!["h1,h2", "a,\"multi\nline\"", "b,c"]
        );
    }

    #[test]
    fn decodes_quoted_store_and_multiline_notes() {
        let text = format!(
            "{HEADER}\nWidget,\"Al's Store, Inc.\",2025-02-01,45,\"line1\nline2\",active,"
        );
        let mut records = Vec::new();
        let report = import_into(&mut records, &text);
        assert_eq!(report, ImportReport { imported: 1, skipped: 0 });

        let record = &records[0];
        assert_eq!(record.item, "Widget");
        assert_eq!(record.store, "Al's Store, Inc.");
        assert_eq!(record.purchase_date, "2025-02-01");
        assert_eq!(record.window_days, 45);
        assert_eq!(record.notes, "line1\nline2");
        assert_eq!(record.status(), Status::Active);
    }

    #[test]
    fn tolerates_reordered_and_missing_columns() {
        let text = "windowDays,item\n10,Scarf\n,Gloves\n";
        let mut records = Vec::new();
        import_into(&mut records, text);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].item, "Scarf");
        assert_eq!(records[0].window_days, 10);
        assert_eq!(records[0].store, "");
        assert_eq!(records[1].window_days, 30);
        assert!(records[1].purchase_date().is_some());
    }

    #[test]
    fn skips_blank_lines_and_rows_without_item() {
        let text = format!("{HEADER}\n\nBook,,2025-01-01,30,,,\n   ,Shop,2025-01-01,30,,,\n\n");
        let mut records = Vec::new();
        let report = import_into(&mut records, &text);
        assert_eq!(report, ImportReport { imported: 1, skipped: 1 });
        assert_eq!(records[0].item, "Book");
    }

    #[test]
    fn import_is_additive_with_fresh_ids() {
        let existing = rec(json!({ "id": "keep-me", "item": "Old" }));
        let mut records = vec![existing.clone()];
        let text = "id,item\nkeep-me,New";
        import_into(&mut records, text);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], existing);
        assert_eq!(records[1].item, "New");
        assert_ne!(records[1].id, "keep-me");
    }

    #[test]
    fn leading_byte_order_mark_is_ignored() {
        let decoded = decode("\u{feff}item,store\nKettle,Home\n");
        assert_eq!(decoded.len(), 1);
        let record = normalize(decoded[0].clone());
        assert_eq!(record.item, "Kettle");
        assert_eq!(record.store, "Home");
    }

    #[test]
    fn header_only_or_empty_text_imports_nothing() {
        let mut records = Vec::new();
        assert_eq!(import_into(&mut records, ""), ImportReport::default());
        assert_eq!(import_into(&mut records, HEADER), ImportReport::default());
        assert!(records.is_empty());
    }

    #[test]
    fn round_trips_everything_but_identity() {
        let mut returned = rec(json!({
            "item": "Camera, mirrorless",
            "store": "  Photo \"Pro\" ",
            "purchaseDate": "2024-12-24",
            "windowDays": 60,
            "notes": "open box\r\nkeep strap",
        }));
        returned.set_returned(true, datetime!(2025-01-02 11:00:00 UTC));
        let originals = vec![
            returned,
            rec(json!({ "item": "Tripod", "purchaseDate": "2025-01-03", "windowDays": 14 })),
        ];

        let mut decoded = Vec::new();
        import_into(&mut decoded, &encode(&originals));
        assert_eq!(decoded.len(), originals.len());
        for (original, copy) in originals.iter().zip(&decoded) {
            assert_ne!(original.id, copy.id);
            assert_eq!(original.item, copy.item);
            assert_eq!(original.store, copy.store);
            assert_eq!(original.purchase_date, copy.purchase_date);
            assert_eq!(original.window_days, copy.window_days);
            assert_eq!(original.notes, copy.notes);
            assert_eq!(original.state, copy.state);
        }
        assert_eq!(
            decoded[0].state,
            ReturnState::Returned {
                at: datetime!(2025-01-02 11:00:00 UTC)
            }
        );
    }
}
