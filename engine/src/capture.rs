//! Change capture.
//!
//! A [`CaptureSpec`] is the declarative description of what to track for one
//! mirrored table: its name and the columns whose changes are logged. The
//! same three rules are evaluated for every table against any [`ChangeLog`].
//!
//! # Rules
//!
//! - **Insert** (after the row is persisted): a local insert logs
//!   `(table, uid)` and clears stale delete and update entries of the uid.
//! - **Update** (after the row is updated): a local update upserts one entry
//!   per tracked column whose value changed.
//! - **Delete** (before the row is removed): a row known remotely logs
//!   `(table, uid, id)`; pending insert and update entries of the uid are
//!   always cleared.
//!
//! Sync-applied writes are never logged as changes.

use crate::{
    error::Result,
    log::{ChangeLog, DeleteEntry, InsertEntry, LogEntry, UpdateEntry},
    row::values_equal,
    schema::{REMOTE_ID_COLUMN, UID_COLUMN},
    Error, FieldName, Origin, Row, TableDef, TableName,
};
use serde::{Deserialize, Serialize};

/// What to capture for one mirrored table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureSpec {
    /// Mirrored table name
    pub table: TableName,
    /// Columns whose changes produce update entries
    pub tracked_columns: Vec<FieldName>,
}

/// Log writes performed by one rule evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureOutcome {
    /// Entries recorded
    pub logged: Vec<LogEntry>,
    /// Number of stale entries removed
    pub cleared: usize,
}

impl CaptureOutcome {
    /// Whether the evaluation touched the log at all.
    pub fn is_empty(&self) -> bool {
        self.logged.is_empty() && self.cleared == 0
    }
}

impl CaptureSpec {
    /// Build the capture spec of a mirrored table.
    ///
    /// Every column except the identifier columns is tracked, in
    /// declaration order.
    pub fn for_table(table: &TableDef) -> Self {
        let tracked_columns = table
            .column_names()
            .filter(|name| !is_identifier_column(name))
            .map(str::to_string)
            .collect();

        Self {
            table: table.name.clone(),
            tracked_columns,
        }
    }

    /// Evaluate the insert rule for a persisted row.
    pub fn on_insert<L>(&self, log: &mut L, new: &Row, origin: Origin) -> Result<CaptureOutcome>
    where
        L: ChangeLog + ?Sized,
    {
        let mut outcome = CaptureOutcome::default();
        if !origin.is_local() {
            return Ok(outcome);
        }

        let uid = self.uid_of(new)?;
        let entry = InsertEntry::new(self.table.clone(), uid);
        log.record_insert(entry.clone())?;
        outcome.logged.push(LogEntry::Insert(entry));

        outcome.cleared += log.clear_deletes(&self.table, uid)?;
        outcome.cleared += log.clear_updates(&self.table, uid)?;

        tracing::debug!(table = %self.table, uid, cleared = outcome.cleared, "captured insert");
        Ok(outcome)
    }

    /// Evaluate the update rule for a row before and after an update.
    pub fn on_update<L>(
        &self,
        log: &mut L,
        old: &Row,
        new: &Row,
        origin: Origin,
    ) -> Result<CaptureOutcome>
    where
        L: ChangeLog + ?Sized,
    {
        let mut outcome = CaptureOutcome::default();
        if !origin.is_local() {
            return Ok(outcome);
        }

        let uid = self.uid_of(new)?;
        for column in self.changed_columns(old, new) {
            let entry = UpdateEntry::new(self.table.clone(), uid, column.clone());
            log.record_update(entry.clone())?;
            outcome.logged.push(LogEntry::Update(entry));
        }

        if !outcome.logged.is_empty() {
            tracing::debug!(
                table = %self.table,
                uid,
                fields = outcome.logged.len(),
                "captured update"
            );
        }
        Ok(outcome)
    }

    /// Evaluate the delete rule for a row about to be removed.
    ///
    /// A sync-applied delete writes no delete entry, but pending inserts
    /// and updates of the row are cleared regardless of origin.
    pub fn on_delete<L>(&self, log: &mut L, old: &Row, origin: Origin) -> Result<CaptureOutcome>
    where
        L: ChangeLog + ?Sized,
    {
        let mut outcome = CaptureOutcome::default();
        let uid = self.uid_of(old)?;

        if origin.is_local() {
            if let Some(id) = old.remote_id() {
                let entry = DeleteEntry::new(self.table.clone(), uid, Some(id));
                log.record_delete(entry.clone())?;
                outcome.logged.push(LogEntry::Delete(entry));
            }
        }

        outcome.cleared += log.clear_inserts(&self.table, uid)?;
        outcome.cleared += log.clear_updates(&self.table, uid)?;

        tracing::debug!(
            table = %self.table,
            uid,
            logged = !outcome.logged.is_empty(),
            cleared = outcome.cleared,
            "captured delete"
        );
        Ok(outcome)
    }

    /// Tracked columns whose value differs between two row states.
    pub fn changed_columns<'a>(
        &'a self,
        old: &'a Row,
        new: &'a Row,
    ) -> impl Iterator<Item = &'a FieldName> + 'a {
        self.tracked_columns
            .iter()
            .filter(move |column| !values_equal(old.get(column), new.get(column)))
    }

    fn uid_of<'r>(&self, row: &'r Row) -> Result<&'r str> {
        row.uid().ok_or_else(|| Error::MissingUid(self.table.clone()))
    }
}

/// Whether a column identifies the row rather than carrying data.
pub fn is_identifier_column(name: &str) -> bool {
    name == UID_COLUMN || name == REMOTE_ID_COLUMN
}
