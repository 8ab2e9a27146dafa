use thiserror::Error;
use time::Date;

use crate::csv::ImportReport;
use crate::record::{now_timestamp, today, Record};
use crate::search::{ListEntry, ListQuery};
use crate::storage::{Gateway, StoreError, StoreTier};
use crate::summary::Summary;

pub mod actions;
pub mod state;

pub use actions::{NewRecord, RecordEdit, ValidationError};
pub use state::{LookupError, StateError, TrackerState};

#[derive(Debug, Error)]
pub enum ActionError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error("saving records failed: {0}")]
    Store(#[from] StoreError),
}

impl From<LookupError> for ActionError {
    fn from(err: LookupError) -> Self {
        ActionError::State(err.into())
    }
}

impl From<ValidationError> for ActionError {
    fn from(err: ValidationError) -> Self {
        ActionError::State(err.into())
    }
}

/// Result of a user action. `tier` is `None` when nothing changed and no
/// save was attempted.
#[derive(Debug, Clone)]
pub struct Saved<T> {
    pub value: T,
    pub tier: Option<StoreTier>,
}

/// Record collection plus the gateway it is persisted through. Every
/// mutating action saves the whole collection before returning, so saves
/// never overlap.
pub struct App {
    gateway: Gateway,
    state: TrackerState,
    loaded_from: StoreTier,
    migrated: usize,
}

impl App {
    pub fn open(gateway: Gateway) -> Self {
        let loaded = gateway.bootstrap();
        tracing::debug!(
            count = loaded.records.len(),
            tier = %loaded.tier,
            migrated = loaded.migrated,
            "records loaded"
        );
        Self {
            gateway,
            state: TrackerState::new(loaded.records),
            loaded_from: loaded.tier,
            migrated: loaded.migrated,
        }
    }

    pub fn state(&self) -> &TrackerState {
        &self.state
    }

    pub fn loaded_from(&self) -> StoreTier {
        self.loaded_from
    }

    pub fn migrated(&self) -> usize {
        self.migrated
    }

    pub fn has_remote(&self) -> bool {
        self.gateway.has_remote()
    }

    /// Day counts are computed against `today`; one render passes the same
    /// value here and to [`App::summary`].
    pub fn view(&self, query: &ListQuery, today: Date) -> Vec<ListEntry<'_>> {
        self.state.view(query, today)
    }

    pub fn summary(&self, today: Date) -> Summary {
        self.state.summary(today)
    }

    pub fn find(&self, key: &str) -> Result<&Record, LookupError> {
        self.state.find(key)
    }

    pub fn add(&mut self, input: NewRecord) -> Result<Saved<Record>, ActionError> {
        let record = self.state.add(input, today())?.clone();
        let tier = self.persist()?;
        Ok(Saved {
            value: record,
            tier: Some(tier),
        })
    }

    pub fn edit(&mut self, key: &str, edit: &RecordEdit) -> Result<Saved<Record>, ActionError> {
        let before = self.state.find(key)?.clone();
        let after = self.state.edit(key, edit)?.clone();
        let tier = if after == before {
            None
        } else {
            Some(self.persist()?)
        };
        Ok(Saved { value: after, tier })
    }

    pub fn delete(&mut self, key: &str) -> Result<Saved<Record>, ActionError> {
        let removed = self.state.delete(key)?;
        let tier = self.persist()?;
        Ok(Saved {
            value: removed,
            tier: Some(tier),
        })
    }

    pub fn mark_returned(&mut self, key: &str) -> Result<Saved<Record>, ActionError> {
        self.transition(key, true)
    }

    pub fn undo_return(&mut self, key: &str) -> Result<Saved<Record>, ActionError> {
        self.transition(key, false)
    }

    fn transition(&mut self, key: &str, returned: bool) -> Result<Saved<Record>, ActionError> {
        let changed = self.state.set_returned(key, returned, now_timestamp())?;
        let tier = if changed {
            Some(self.persist()?)
        } else {
            None
        };
        let record = self.state.find(key)?.clone();
        Ok(Saved {
            value: record,
            tier,
        })
    }

    pub fn clear(&mut self) -> Result<Saved<usize>, ActionError> {
        let removed = self.state.clear();
        let tier = self.persist()?;
        Ok(Saved {
            value: removed,
            tier: Some(tier),
        })
    }

    pub fn import_csv(&mut self, text: &str) -> Result<Saved<ImportReport>, ActionError> {
        let report = self.state.import_csv(text);
        let tier = if report.imported > 0 {
            Some(self.persist()?)
        } else {
            None
        };
        Ok(Saved {
            value: report,
            tier,
        })
    }

    pub fn export_csv(&self) -> String {
        self.state.export_csv()
    }

    fn persist(&self) -> Result<StoreTier, StoreError> {
        let tier = self.gateway.save(self.state.records())?;
        tracing::debug!(count = self.state.len(), %tier, "records saved");
        Ok(tier)
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use assert_matches::assert_matches;
    use time::macros::date;

    use super::*;
    use crate::record::Status;
    use crate::storage::testing::MemStore;

    fn app_with(remote: Option<Rc<MemStore>>, local: Rc<MemStore>) -> App {
        let remote = remote.map(|store| Box::new(store) as Box<dyn crate::storage::RecordStore>);
        App::open(Gateway::new(remote, Box::new(local)))
    }

    #[test]
    fn add_persists_whole_collection() {
        let local = Rc::new(MemStore::default());
        let mut app = app_with(None, local.clone());

        let first = app.add(NewRecord::new("Lamp")).expect("add");
        assert_eq!(first.tier, Some(StoreTier::Local));
        app.add(NewRecord::new("Rug")).expect("add");

        let saved = local.records();
        assert_eq!(saved.len(), 2);
        assert_eq!(saved[0].id, first.value.id);
        assert_eq!(local.saves(), 2);
    }

    #[test]
    fn invalid_input_is_not_persisted() {
        let local = Rc::new(MemStore::default());
        let mut app = app_with(None, local.clone());

        assert_matches!(
            app.add(NewRecord::new("  ")),
            Err(ActionError::State(StateError::Validation(ValidationError::EmptyItem)))
        );
        assert!(app.state().is_empty());
        assert_eq!(local.saves(), 0);
    }

    #[test]
    fn status_round_trip_saves_each_change() {
        let remote = Rc::new(MemStore::default());
        let local = Rc::new(MemStore::default());
        let mut app = app_with(Some(remote.clone()), local.clone());
        let id = app.add(NewRecord::new("Vacuum")).expect("add").value.id;

        let returned = app.mark_returned(&id).expect("returned");
        assert_eq!(returned.tier, Some(StoreTier::Remote));
        assert_eq!(returned.value.status(), Status::Returned);
        assert!(returned.value.returned_at().is_some());
        assert!(remote.records()[0].is_returned());

        let again = app.mark_returned(&id).expect("noop");
        assert_eq!(again.tier, None);

        let undone = app.undo_return(&id).expect("undo");
        assert_eq!(undone.value.status(), Status::Active);
        assert_eq!(undone.value.returned_at(), None);
        assert_eq!(remote.saves(), 3);
        assert_eq!(local.saves(), 0);
    }

    #[test]
    fn remote_failure_falls_back_to_local_on_save() {
        let local = Rc::new(MemStore::default());
        let mut app = app_with(Some(Rc::new(MemStore::failing())), local.clone());
        assert_eq!(app.loaded_from(), StoreTier::Local);

        let saved = app.add(NewRecord::new("Fan")).expect("add");
        assert_eq!(saved.tier, Some(StoreTier::Local));
        assert_eq!(local.records().len(), 1);
    }

    #[test]
    fn import_and_clear_persist() {
        let local = Rc::new(MemStore::default());
        let mut app = app_with(None, local.clone());

        let nothing = app.import_csv("item\n\n").expect("import");
        assert_eq!(nothing.tier, None);

        let report = app.import_csv("item,windowDays\nKettle,14\nToaster,7").expect("import");
        assert_eq!(report.value.imported, 2);
        assert_eq!(local.records().len(), 2);

        let cleared = app.clear().expect("clear");
        assert_eq!(cleared.value, 2);
        assert!(local.records().is_empty());
    }

    #[test]
    fn edit_without_changes_skips_save() {
        let local = Rc::new(MemStore::default());
        let mut app = app_with(None, local.clone());
        let id = app.add(NewRecord::new("Grill")).expect("add").value.id;

        let same = app
            .edit(&id, &RecordEdit {
                item: Some("Grill".into()),
                ..RecordEdit::default()
            })
            .expect("edit");
        assert_eq!(same.tier, None);

        let changed = app
            .edit(&id, &RecordEdit {
                store: Some("Garden Centre".into()),
                ..RecordEdit::default()
            })
            .expect("edit");
        assert_eq!(changed.tier, Some(StoreTier::Local));
        assert_eq!(local.records()[0].store, "Garden Centre");
        assert_eq!(local.saves(), 2);
    }

    #[test]
    fn view_and_summary_share_the_given_date() {
        let mut app = app_with(None, Rc::new(MemStore::default()));
        app.add(NewRecord {
            purchase_date: Some("2025-01-01".into()),
            window_days: Some(10),
            ..NewRecord::new("Heater")
        })
        .expect("add");

        let before = date!(2025 - 01 - 09);
        let entries = app.view(&ListQuery::default(), before);
        assert_eq!(entries[0].deadline.days_remaining, 2);
        assert_eq!(app.summary(before).due_soon, 1);
        assert_eq!(app.summary(before).late, 0);

        let after = date!(2025 - 01 - 15);
        let entries = app.view(&ListQuery::default(), after);
        assert_eq!(entries[0].deadline.days_remaining, -4);
        assert_eq!(app.summary(after).late, 1);
        assert_eq!(app.summary(after).due_soon, 0);
    }

    #[test]
    fn delete_unknown_id_reports_lookup_error() {
        let mut app = app_with(None, Rc::new(MemStore::default()));
        assert_matches!(
            app.delete("missing"),
            Err(ActionError::State(StateError::Lookup(LookupError::NotFound(_))))
        );
    }
}
