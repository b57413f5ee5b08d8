//! Per-row view of pending changes.
//!
//! The log stores entries; the sync process usually wants to know, for each
//! row, what it has to do remotely. [`TableChanges`] folds the three logs of
//! one table into a [`RowState`] per uid.

use crate::{
    error::Result,
    log::{ChangeLog, DeleteEntry, InsertEntry, UpdateEntry},
    FieldName, RemoteId, TableName, Uid,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// What the sync process has to push for one row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum RowState {
    /// Created locally; `fields` were edited after the insert
    #[serde(rename_all = "camelCase")]
    PendingInsert { fields: BTreeSet<FieldName> },
    /// Edited locally
    #[serde(rename_all = "camelCase")]
    PendingUpdate { fields: BTreeSet<FieldName> },
    /// Deleted locally, known remotely as `remote_id`
    #[serde(rename_all = "camelCase")]
    PendingDelete { remote_id: Option<RemoteId> },
}

/// Pending changes of one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableChanges {
    pub table: TableName,
    pub inserts: Vec<InsertEntry>,
    pub updates: Vec<UpdateEntry>,
    pub deletes: Vec<DeleteEntry>,
    /// Folded state per uid; rows without entries are clean and absent
    pub rows: BTreeMap<Uid, RowState>,
}

impl TableChanges {
    /// Read the pending changes of a table from a log.
    pub fn read<L>(log: &L, table: &str) -> Result<Self>
    where
        L: ChangeLog + ?Sized,
    {
        Ok(Self::from_entries(
            table,
            log.inserts(table)?,
            log.updates(table)?,
            log.deletes(table)?,
        ))
    }

    /// Fold raw entries into per-row states.
    ///
    /// A delete takes precedence over anything else logged for the same uid,
    /// and an insert absorbs the uid's field edits.
    pub fn from_entries(
        table: impl Into<TableName>,
        inserts: Vec<InsertEntry>,
        updates: Vec<UpdateEntry>,
        deletes: Vec<DeleteEntry>,
    ) -> Self {
        let mut fields: BTreeMap<Uid, BTreeSet<FieldName>> = BTreeMap::new();
        for entry in &updates {
            fields
                .entry(entry.uid.clone())
                .or_default()
                .insert(entry.field_name.clone());
        }

        let mut rows = BTreeMap::new();
        for entry in &inserts {
            let dirty = fields.remove(&entry.uid).unwrap_or_default();
            rows.insert(entry.uid.clone(), RowState::PendingInsert { fields: dirty });
        }
        for (uid, dirty) in fields {
            rows.insert(uid, RowState::PendingUpdate { fields: dirty });
        }
        for entry in &deletes {
            rows.insert(
                entry.uid.clone(),
                RowState::PendingDelete {
                    remote_id: entry.id.clone(),
                },
            );
        }

        Self {
            table: table.into(),
            inserts,
            updates,
            deletes,
            rows,
        }
    }

    /// State of one row, `None` when clean.
    pub fn state(&self, uid: &str) -> Option<&RowState> {
        self.rows.get(uid)
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
