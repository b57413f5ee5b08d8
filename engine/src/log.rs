//! The change log.
//!
//! Pending local changes are kept in three logs shared by every mirrored
//! table: inserts keyed by `(table, uid)`, field updates keyed by
//! `(table, uid, field)` and deletes keyed by `(table, uid)` with a unique
//! `(remote id, table)`. [`ChangeLog`] is the interface the capture rules
//! write through and the sync process reads and acknowledges through.

use crate::{
    error::Result,
    schema::{
        LOCAL_DELETE_TABLE, LOCAL_INSERT_TABLE, LOCAL_UPDATE_TABLE, NAME_LENGTH, REMOTE_ID_COLUMN,
        UID_COLUMN, UID_LENGTH,
    },
    Error, FieldName, RemoteId, TableName, Uid,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// "This uid was inserted locally and not yet pushed."
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertEntry {
    pub table_name: TableName,
    pub uid: Uid,
}

/// "This field of this row was modified locally and not yet pushed."
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEntry {
    pub table_name: TableName,
    pub uid: Uid,
    pub field_name: FieldName,
}

/// "This uid, known remotely as `id`, was deleted locally."
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteEntry {
    pub table_name: TableName,
    pub uid: Uid,
    pub id: Option<RemoteId>,
}

impl InsertEntry {
    pub fn new(table_name: impl Into<TableName>, uid: impl Into<Uid>) -> Self {
        Self {
            table_name: table_name.into(),
            uid: uid.into(),
        }
    }
}

impl UpdateEntry {
    pub fn new(
        table_name: impl Into<TableName>,
        uid: impl Into<Uid>,
        field_name: impl Into<FieldName>,
    ) -> Self {
        Self {
            table_name: table_name.into(),
            uid: uid.into(),
            field_name: field_name.into(),
        }
    }
}

impl DeleteEntry {
    pub fn new(
        table_name: impl Into<TableName>,
        uid: impl Into<Uid>,
        id: Option<RemoteId>,
    ) -> Self {
        Self {
            table_name: table_name.into(),
            uid: uid.into(),
            id,
        }
    }
}

/// An entry in any of the three logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LogEntry {
    Insert(InsertEntry),
    Update(UpdateEntry),
    Delete(DeleteEntry),
}

impl LogEntry {
    /// The mirrored table this entry belongs to.
    pub fn table_name(&self) -> &TableName {
        match self {
            LogEntry::Insert(e) => &e.table_name,
            LogEntry::Update(e) => &e.table_name,
            LogEntry::Delete(e) => &e.table_name,
        }
    }

    /// The row this entry belongs to.
    pub fn uid(&self) -> &Uid {
        match self {
            LogEntry::Insert(e) => &e.uid,
            LogEntry::Update(e) => &e.uid,
            LogEntry::Delete(e) => &e.uid,
        }
    }
}

/// Storage for pending local changes.
///
/// Writes must keep the key invariants: recording an insert or update that
/// is already present is a no-op, and recording a delete for a `(table, uid)`
/// that already has one replaces its remote id. Implementations report a
/// [`Error::ConstraintViolation`] when a delete would reuse a remote id held
/// by another row of the same table.
pub trait ChangeLog {
    /// Record a local insert.
    fn record_insert(&mut self, entry: InsertEntry) -> Result<()>;

    /// Record a dirty field (insert-or-replace).
    fn record_update(&mut self, entry: UpdateEntry) -> Result<()>;

    /// Record a local delete.
    fn record_delete(&mut self, entry: DeleteEntry) -> Result<()>;

    /// Remove the insert entry of a row. Returns how many were removed.
    fn clear_inserts(&mut self, table: &str, uid: &str) -> Result<usize>;

    /// Remove every update entry of a row. Returns how many were removed.
    fn clear_updates(&mut self, table: &str, uid: &str) -> Result<usize>;

    /// Remove the delete entry of a row. Returns how many were removed.
    fn clear_deletes(&mut self, table: &str, uid: &str) -> Result<usize>;

    /// Remove a single update entry. Returns whether it existed.
    fn remove_update(&mut self, table: &str, uid: &str, field: &str) -> Result<bool>;

    /// All insert entries of a table.
    fn inserts(&self, table: &str) -> Result<Vec<InsertEntry>>;

    /// All update entries of a table.
    fn updates(&self, table: &str) -> Result<Vec<UpdateEntry>>;

    /// All delete entries of a table.
    fn deletes(&self, table: &str) -> Result<Vec<DeleteEntry>>;

    /// Acknowledge an entry once its change has been pushed remotely.
    fn acknowledge(&mut self, entry: &LogEntry) -> Result<bool> {
        match entry {
            LogEntry::Insert(e) => Ok(self.clear_inserts(&e.table_name, &e.uid)? > 0),
            LogEntry::Update(e) => self.remove_update(&e.table_name, &e.uid, &e.field_name),
            LogEntry::Delete(e) => Ok(self.clear_deletes(&e.table_name, &e.uid)? > 0),
        }
    }
}

/// Version of the log snapshot format.
pub const LOG_SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// A serialisable point-in-time copy of a change log.
///
/// Entries are sorted so that equal logs serialise identically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogSnapshot {
    pub format_version: u32,
    pub inserts: Vec<InsertEntry>,
    pub updates: Vec<UpdateEntry>,
    pub deletes: Vec<DeleteEntry>,
}

impl LogSnapshot {
    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::InvalidSnapshot(e.to_string()))
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::InvalidSnapshot(e.to_string()))
    }
}

/// In-memory change log.
///
/// Delete entries are indexed by `(table, remote id)` so the uniqueness
/// check does not scan the log. Writes made inside [`transaction`] are
/// journaled and undone if the closure fails.
///
/// [`transaction`]: MemoryChangeLog::transaction
#[derive(Debug, Clone, Default)]
pub struct MemoryChangeLog {
    inserts: BTreeSet<(TableName, Uid)>,
    updates: BTreeSet<(TableName, Uid, FieldName)>,
    deletes: BTreeMap<(TableName, Uid), Option<RemoteId>>,
    remote_ids: BTreeMap<(TableName, RemoteId), Uid>,
    journal: Option<Vec<Undo>>,
}

/// Inverse of one log write.
#[derive(Debug, Clone)]
enum Undo {
    Insert {
        key: (TableName, Uid),
        present: bool,
    },
    Update {
        key: (TableName, Uid, FieldName),
        present: bool,
    },
    Delete {
        key: (TableName, Uid),
        previous: Option<Option<RemoteId>>,
    },
}

impl PartialEq for MemoryChangeLog {
    fn eq(&self, other: &Self) -> bool {
        self.inserts == other.inserts
            && self.updates == other.updates
            && self.deletes == other.deletes
    }
}

impl Eq for MemoryChangeLog {}

impl MemoryChangeLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of entries across the three logs.
    pub fn len(&self) -> usize {
        self.inserts.len() + self.updates.len() + self.deletes.len()
    }

    /// Whether the log holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run `f` as one unit: if it fails, every log write it made is undone.
    ///
    /// Transactions do not nest; an inner call joins the outer one.
    pub fn transaction<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        if self.journal.is_some() {
            return f(self);
        }

        self.journal = Some(Vec::new());
        let result = f(self);
        let journal = self.journal.take().unwrap_or_default();

        if result.is_err() {
            for undo in journal.into_iter().rev() {
                self.restore(undo);
            }
        }
        result
    }

    /// Export the whole log.
    pub fn export(&self) -> LogSnapshot {
        LogSnapshot {
            format_version: LOG_SNAPSHOT_FORMAT_VERSION,
            inserts: self
                .inserts
                .iter()
                .map(|(t, u)| InsertEntry::new(t.clone(), u.clone()))
                .collect(),
            updates: self
                .updates
                .iter()
                .map(|(t, u, f)| UpdateEntry::new(t.clone(), u.clone(), f.clone()))
                .collect(),
            deletes: self
                .deletes
                .iter()
                .map(|((t, u), id)| DeleteEntry::new(t.clone(), u.clone(), id.clone()))
                .collect(),
        }
    }

    /// Rebuild a log from a snapshot, enforcing the same constraints as live writes.
    pub fn import(snapshot: LogSnapshot) -> Result<Self> {
        if snapshot.format_version > LOG_SNAPSHOT_FORMAT_VERSION {
            return Err(Error::InvalidSnapshot(format!(
                "unsupported format version {} (max {})",
                snapshot.format_version, LOG_SNAPSHOT_FORMAT_VERSION
            )));
        }

        let mut log = Self::new();
        for entry in snapshot.inserts {
            log.record_insert(entry)?;
        }
        for entry in snapshot.updates {
            log.record_update(entry)?;
        }
        for entry in snapshot.deletes {
            log.record_delete(entry)?;
        }
        Ok(log)
    }

    fn journal(&mut self, undo: Undo) {
        if let Some(journal) = &mut self.journal {
            journal.push(undo);
        }
    }

    fn restore(&mut self, undo: Undo) {
        match undo {
            Undo::Insert { key, present: true } => {
                self.inserts.insert(key);
            }
            Undo::Insert { key, present: false } => {
                self.inserts.remove(&key);
            }
            Undo::Update { key, present: true } => {
                self.updates.insert(key);
            }
            Undo::Update { key, present: false } => {
                self.updates.remove(&key);
            }
            Undo::Delete {
                key,
                previous: Some(id),
            } => {
                self.put_delete(key, id);
            }
            Undo::Delete {
                key,
                previous: None,
            } => {
                self.take_delete(&key);
            }
        }
    }

    /// Set the delete entry of a row, keeping the remote id index in step.
    fn put_delete(
        &mut self,
        key: (TableName, Uid),
        id: Option<RemoteId>,
    ) -> Option<Option<RemoteId>> {
        let previous = self.take_delete(&key);
        if let Some(id) = &id {
            self.remote_ids
                .insert((key.0.clone(), id.clone()), key.1.clone());
        }
        self.deletes.insert(key, id);
        previous
    }

    fn take_delete(&mut self, key: &(TableName, Uid)) -> Option<Option<RemoteId>> {
        let previous = self.deletes.remove(key)?;
        if let Some(id) = &previous {
            self.remote_ids.remove(&(key.0.clone(), id.clone()));
        }
        Some(previous)
    }

    /// Update entries of one row, in field order.
    fn row_updates(&self, table: &str, uid: &str) -> Vec<(TableName, Uid, FieldName)> {
        let start = (table.to_string(), uid.to_string(), FieldName::new());
        self.updates
            .range(start..)
            .take_while(|(t, u, _)| t == table && u == uid)
            .cloned()
            .collect()
    }
}

/// Reject values that do not fit the log table columns.
fn check_length(log_table: &str, column: &str, value: &str, max: u32) -> Result<()> {
    if value.chars().count() > max as usize {
        return Err(Error::ConstraintViolation {
            table: log_table.to_string(),
            reason: format!("{column} '{value}' is longer than {max} characters"),
        });
    }
    Ok(())
}

fn check_row_key(log_table: &str, table: &str, uid: &str) -> Result<()> {
    check_length(log_table, "table_name", table, NAME_LENGTH)?;
    check_length(log_table, UID_COLUMN, uid, UID_LENGTH)
}

fn row_key(table: &str, uid: &str) -> (TableName, Uid) {
    (table.to_string(), uid.to_string())
}

impl ChangeLog for MemoryChangeLog {
    fn record_insert(&mut self, entry: InsertEntry) -> Result<()> {
        check_row_key(LOCAL_INSERT_TABLE, &entry.table_name, &entry.uid)?;

        let key = (entry.table_name, entry.uid);
        if self.inserts.insert(key.clone()) {
            self.journal(Undo::Insert {
                key,
                present: false,
            });
        }
        Ok(())
    }

    fn record_update(&mut self, entry: UpdateEntry) -> Result<()> {
        check_row_key(LOCAL_UPDATE_TABLE, &entry.table_name, &entry.uid)?;
        check_length(LOCAL_UPDATE_TABLE, "field_name", &entry.field_name, NAME_LENGTH)?;

        let key = (entry.table_name, entry.uid, entry.field_name);
        if self.updates.insert(key.clone()) {
            self.journal(Undo::Update {
                key,
                present: false,
            });
        }
        Ok(())
    }

    fn record_delete(&mut self, entry: DeleteEntry) -> Result<()> {
        check_row_key(LOCAL_DELETE_TABLE, &entry.table_name, &entry.uid)?;

        if let Some(id) = &entry.id {
            check_length(LOCAL_DELETE_TABLE, REMOTE_ID_COLUMN, id, NAME_LENGTH)?;

            let holder = self.remote_ids.get(&(entry.table_name.clone(), id.clone()));
            if holder.is_some_and(|uid| *uid != entry.uid) {
                return Err(Error::ConstraintViolation {
                    table: LOCAL_DELETE_TABLE.to_string(),
                    reason: format!(
                        "remote id '{}' of '{}' is already logged for another row",
                        id, entry.table_name
                    ),
                });
            }
        }

        let key = (entry.table_name, entry.uid);
        let previous = self.put_delete(key.clone(), entry.id);
        self.journal(Undo::Delete { key, previous });
        Ok(())
    }

    fn clear_inserts(&mut self, table: &str, uid: &str) -> Result<usize> {
        let key = row_key(table, uid);
        if !self.inserts.remove(&key) {
            return Ok(0);
        }
        self.journal(Undo::Insert { key, present: true });
        Ok(1)
    }

    fn clear_updates(&mut self, table: &str, uid: &str) -> Result<usize> {
        let keys = self.row_updates(table, uid);
        for key in &keys {
            self.updates.remove(key);
            self.journal(Undo::Update {
                key: key.clone(),
                present: true,
            });
        }
        Ok(keys.len())
    }

    fn clear_deletes(&mut self, table: &str, uid: &str) -> Result<usize> {
        let key = row_key(table, uid);
        match self.take_delete(&key) {
            Some(previous) => {
                self.journal(Undo::Delete {
                    key,
                    previous: Some(previous),
                });
                Ok(1)
            }
            None => Ok(0),
        }
    }

    fn remove_update(&mut self, table: &str, uid: &str, field: &str) -> Result<bool> {
        let key = (table.to_string(), uid.to_string(), field.to_string());
        if !self.updates.remove(&key) {
            return Ok(false);
        }
        self.journal(Undo::Update { key, present: true });
        Ok(true)
    }

    fn inserts(&self, table: &str) -> Result<Vec<InsertEntry>> {
        Ok(self
            .inserts
            .iter()
            .filter(|(t, _)| t == table)
            .map(|(t, u)| InsertEntry::new(t.clone(), u.clone()))
            .collect())
    }

    fn updates(&self, table: &str) -> Result<Vec<UpdateEntry>> {
        Ok(self
            .updates
            .iter()
            .filter(|(t, _, _)| t == table)
            .map(|(t, u, f)| UpdateEntry::new(t.clone(), u.clone(), f.clone()))
            .collect())
    }

    fn deletes(&self, table: &str) -> Result<Vec<DeleteEntry>> {
        Ok(self
            .deletes
            .iter()
            .filter(|((t, _), _)| t == table)
            .map(|((t, u), id)| DeleteEntry::new(t.clone(), u.clone(), id.clone()))
            .collect())
    }
}

/// Names of the log tables, in the order they are checked for provisioning.
pub const LOG_TABLES: [&str; 3] = [LOCAL_UPDATE_TABLE, LOCAL_INSERT_TABLE, LOCAL_DELETE_TABLE];
