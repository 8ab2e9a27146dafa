use std::fmt::Write as _;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Args;
use unicode_width::UnicodeWidthChar;

use crate::app::{App, NewRecord, RecordEdit, Saved};
use crate::config::AppConfig;
use crate::record::{format_date, today, Record};
use crate::search::{ListEntry, ListQuery, SortMode};
use crate::storage::StoreTier;
use crate::summary::Summary;

const SHORT_ID_LEN: usize = 8;
const MAX_ITEM_WIDTH: usize = 60;

#[derive(Args, Debug, Clone, Default)]
pub struct ListArgs {
    /// Only show purchases whose item, store or notes contain this text
    #[arg(long, short)]
    pub filter: Option<String>,
    /// Include purchases already returned
    #[arg(long)]
    pub all: bool,
    /// due-asc, due-desc, purchase-asc, purchase-desc or store
    #[arg(long)]
    pub sort: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct AddArgs {
    /// What was bought
    pub item: String,
    #[arg(long, default_value = "")]
    pub store: String,
    /// Purchase date as YYYY-MM-DD (defaults to today)
    #[arg(long)]
    pub date: Option<String>,
    /// Return window in days (defaults to 30)
    #[arg(long, allow_negative_numbers = true)]
    pub window: Option<i64>,
    #[arg(long, default_value = "")]
    pub notes: String,
}

#[derive(Args, Debug, Clone)]
pub struct EditArgs {
    /// Record id or unique id prefix
    pub id: String,
    #[arg(long)]
    pub item: Option<String>,
    #[arg(long)]
    pub store: Option<String>,
    /// Purchase date as YYYY-MM-DD
    #[arg(long)]
    pub date: Option<String>,
    #[arg(long, allow_negative_numbers = true)]
    pub window: Option<i64>,
    #[arg(long)]
    pub notes: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct IdArgs {
    /// Record id or unique id prefix
    pub id: String,
}

#[derive(Args, Debug, Clone)]
pub struct ClearArgs {
    /// Confirm removing every record
    #[arg(long)]
    pub yes: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ImportArgs {
    /// CSV file to import; reads stdin when omitted or `-`
    pub path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct ExportArgs {
    /// Destination file; `-` writes to stdout
    #[arg(long, short)]
    pub output: Option<PathBuf>,
}

pub fn list(app: &App, config: &AppConfig, args: ListArgs) -> Result<()> {
    let sort = args
        .sort
        .as_deref()
        .map(SortMode::parse_lenient)
        .unwrap_or(config.default_sort);
    let query = ListQuery::new(
        args.filter.unwrap_or_default(),
        args.all || config.include_returned,
        sort,
    );
    if app.has_remote() && app.loaded_from() == StoreTier::Local {
        eprintln!("Remote unavailable; showing local data.");
    }
    let today = today();
    let entries = app.view(&query, today);
    print!("{}", format_list(&entries, &app.summary(today)));
    Ok(())
}

pub fn summary(app: &App) -> Result<()> {
    println!("{}", format_summary(&app.summary(today())));
    Ok(())
}

pub fn add(app: &mut App, args: AddArgs) -> Result<()> {
    let input = NewRecord {
        item: args.item,
        store: args.store,
        purchase_date: args.date,
        window_days: args.window,
        notes: args.notes,
    };
    let saved = app.add(input)?;
    println!(
        "Added {}  {}",
        short_id(&saved.value.id),
        saved.value.item
    );
    report_save(app, &saved);
    Ok(())
}

pub fn edit(app: &mut App, args: EditArgs) -> Result<()> {
    let edit = RecordEdit {
        item: args.item,
        store: args.store,
        purchase_date: args.date,
        window_days: args.window,
        notes: args.notes,
    };
    if edit.is_empty() {
        bail!("nothing to change; pass at least one of --item, --store, --date, --window, --notes");
    }
    let saved = app.edit(&args.id, &edit)?;
    println!("Updated {}  {}", short_id(&saved.value.id), saved.value.item);
    report_save(app, &saved);
    Ok(())
}

pub fn delete(app: &mut App, args: IdArgs) -> Result<()> {
    let saved = app.delete(&args.id)?;
    println!("Deleted {}  {}", short_id(&saved.value.id), saved.value.item);
    report_save(app, &saved);
    Ok(())
}

pub fn mark_returned(app: &mut App, args: IdArgs) -> Result<()> {
    let saved = app.mark_returned(&args.id)?;
    if saved.tier.is_none() {
        println!("{} is already marked returned", short_id(&saved.value.id));
    } else {
        println!("Returned {}  {}", short_id(&saved.value.id), saved.value.item);
    }
    report_save(app, &saved);
    Ok(())
}

pub fn undo_return(app: &mut App, args: IdArgs) -> Result<()> {
    let saved = app.undo_return(&args.id)?;
    if saved.tier.is_none() {
        println!("{} is not marked returned", short_id(&saved.value.id));
    } else {
        println!("Reactivated {}  {}", short_id(&saved.value.id), saved.value.item);
    }
    report_save(app, &saved);
    Ok(())
}

pub fn clear(app: &mut App, args: ClearArgs) -> Result<()> {
    if !args.yes {
        bail!(
            "refusing to clear {} record(s) without --yes",
            app.state().len()
        );
    }
    let saved = app.clear()?;
    println!("Cleared {} record(s)", saved.value);
    report_save(app, &saved);
    Ok(())
}

pub fn import(app: &mut App, args: ImportArgs) -> Result<()> {
    let text = read_import_source(args.path.as_deref())?;
    let saved = app.import_csv(&text)?;
    let report = saved.value;
    println!(
        "Imported {} record(s){}",
        report.imported,
        if report.skipped > 0 {
            format!(", skipped {} without an item", report.skipped)
        } else {
            String::new()
        }
    );
    report_save(app, &saved);
    Ok(())
}

pub fn export(app: &App, config: &AppConfig, args: ExportArgs) -> Result<()> {
    let csv = app.export_csv();
    let target = args
        .output
        .unwrap_or_else(|| PathBuf::from(&config.export.file_name));
    if target.as_os_str() == "-" {
        println!("{csv}");
        return Ok(());
    }
    fs::write(&target, csv.as_bytes())
        .with_context(|| format!("writing export {}", target.display()))?;
    println!(
        "Exported {} record(s) to {}",
        app.state().len(),
        target.display()
    );
    Ok(())
}

fn read_import_source(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) if path.as_os_str() != "-" => fs::read_to_string(path)
            .with_context(|| format!("reading import file {}", path.display())),
        _ => {
            if atty::is(atty::Stream::Stdin) {
                bail!("no CSV given; pass a file path or pipe CSV on stdin");
            }
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("reading CSV from stdin")?;
            Ok(buf)
        }
    }
}

fn report_save<T>(app: &App, saved: &Saved<T>) {
    if let Some(line) = save_status(saved.tier, app.has_remote()) {
        println!("{line}");
    }
}

fn save_status(tier: Option<StoreTier>, remote_configured: bool) -> Option<&'static str> {
    match tier? {
        StoreTier::Local if remote_configured => Some("Saved locally (remote unavailable)"),
        StoreTier::Local | StoreTier::Remote => Some("Saved"),
    }
}

pub fn format_summary(summary: &Summary) -> String {
    format!(
        "{} active · {} due soon · {} late",
        summary.active, summary.due_soon, summary.late
    )
}

pub fn format_list(entries: &[ListEntry<'_>], summary: &Summary) -> String {
    let mut out = String::new();
    let _ = writeln!(&mut out, "{}", format_summary(summary));
    out.push('\n');
    if entries.is_empty() {
        out.push_str("No items yet.\n");
        return out;
    }
    for (idx, entry) in entries.iter().enumerate() {
        if idx > 0 {
            out.push('\n');
        }
        format_entry(&mut out, entry);
    }
    out
}

fn format_entry(out: &mut String, entry: &ListEntry<'_>) {
    let record = entry.record;
    let mut headline = format!(
        "{}  {}",
        short_id(&record.id),
        truncate_width(&record.item, MAX_ITEM_WIDTH)
    );
    if record.is_returned() {
        headline.push_str("  [RETURNED]");
    }
    let _ = writeln!(out, "{headline}");
    let store = if record.store.trim().is_empty() {
        "-"
    } else {
        record.store.as_str()
    };
    let _ = writeln!(
        out,
        "    {store} · purchased {} · window {} days",
        record.purchase_date, record.window_days
    );
    let _ = writeln!(
        out,
        "    Return by {} · {}",
        format_date(entry.deadline.due),
        status_label(record, entry)
    );
    for line in record.notes.lines() {
        let trimmed = line.trim_end();
        if !trimmed.is_empty() {
            let _ = writeln!(out, "    {trimmed}");
        }
    }
}

fn status_label(record: &Record, entry: &ListEntry<'_>) -> String {
    match record.returned_at() {
        Some(at) => format!("returned {}", format_date(at.date())),
        None => entry.deadline.label(),
    }
}

fn short_id(id: &str) -> &str {
    match id.char_indices().nth(SHORT_ID_LEN) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}

fn truncate_width(text: &str, max: usize) -> String {
    let mut width = 0;
    let mut out = String::new();
    for ch in text.chars() {
        let w = ch.width().unwrap_or(0);
        if width + w > max.saturating_sub(1) {
            let rest: usize = text.chars().map(|c| c.width().unwrap_or(0)).sum();
            if rest <= max {
                return text.to_string();
            }
            out.push('…');
            return out;
        }
        width += w;
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{normalize, RawRecord};
    use crate::search;
    use crate::summary::summarize;
    use serde_json::json;
    use time::macros::{date, datetime};

    fn rec(value: serde_json::Value) -> Record {
        normalize(RawRecord::from_value(value).expect("raw"))
    }

    #[test]
    fn renders_list_with_summary_and_badges() {
        let records = vec![
            rec(json!({
                "id": "a1b2c3d4e5",
                "item": "Desk lamp",
                "store": "Lights & Co",
                "purchaseDate": "2025-01-01",
                "windowDays": 30,
            })),
            rec(json!({
                "id": "ffee001122",
                "item": "Boots",
                "purchaseDate": "2025-01-01",
                "windowDays": 10,
                "notes": "wrong size\nkeep tags",
            })),
        ];
        let today = date!(2025 - 01 - 20);
        let entries = search::apply(&records, &ListQuery::default(), today);
        let output = format_list(&entries, &summarize(&records, today));

        insta::assert_snapshot!(output, @r"
2 active · 0 due soon · 1 late

ffee0011  Boots
    - · purchased 2025-01-01 · window 10 days
    Return by 2025-01-11 · 9 day(s) late
    wrong size
    keep tags

a1b2c3d4  Desk lamp
    Lights & Co · purchased 2025-01-01 · window 30 days
    Return by 2025-01-31 · 11 day(s) left
");
    }

    #[test]
    fn returned_entries_show_return_date() {
        let mut record = rec(json!({
            "id": "0123456789",
            "item": "Blender",
            "purchaseDate": "2025-03-01",
        }));
        record.set_returned(true, datetime!(2025-03-04 10:00:00 UTC));
        let records = vec![record];
        let today = date!(2025 - 03 - 10);
        let entries = search::apply(&records, &ListQuery::new("", true, SortMode::DueAsc), today);
        let output = format_list(&entries, &summarize(&records, today));
        assert!(output.starts_with("0 active · 0 due soon · 0 late\n"));
        assert!(output.contains("01234567  Blender  [RETURNED]"));
        assert!(output.contains("Return by 2025-03-31 · returned 2025-03-04"));
    }

    #[test]
    fn empty_view_says_so() {
        let output = format_list(&[], &Summary::default());
        assert_eq!(output, "0 active · 0 due soon · 0 late\n\nNo items yet.\n");
    }

    #[test]
    fn save_status_mentions_fallback_only_with_remote() {
        assert_eq!(save_status(None, true), None);
        assert_eq!(save_status(Some(StoreTier::Remote), true), Some("Saved"));
        assert_eq!(save_status(Some(StoreTier::Local), false), Some("Saved"));
        assert_eq!(
            save_status(Some(StoreTier::Local), true),
            Some("Saved locally (remote unavailable)")
        );
    }

    #[test]
    fn long_items_are_truncated_by_display_width() {
        assert_eq!(truncate_width("short", 10), "short");
        assert_eq!(truncate_width("exactly10!", 10), "exactly10!");
        assert_eq!(truncate_width("abcdefghijkl", 5), "abcd…");
        assert_eq!(truncate_width("日本語テキスト", 6), "日本…");
        assert_eq!(short_id("abc"), "abc");
        assert_eq!(short_id("0123456789abcdef"), "01234567");
    }

    #[test]
    fn reads_import_from_file() -> Result<()> {
        let temp = tempfile::TempDir::new()?;
        let path = temp.path().join("in.csv");
        fs::write(&path, "item\nPlant\n")?;
        assert_eq!(read_import_source(Some(&path))?, "item\nPlant\n");
        Ok(())
    }
}
