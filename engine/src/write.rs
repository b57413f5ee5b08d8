//! Write requests against mirrored tables.
//!
//! Every mutation goes through the store as a [`Write`], which names the
//! table, the mutation and, optionally, its origin. A write without an
//! explicit origin is classified from `lastActivityTime`.

use crate::{Origin, Row, TableName, Uid};
use serde::{Deserialize, Serialize};

/// The change a write makes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Mutation {
    /// Insert a new row
    Insert { row: Row },
    /// Overlay `changes` onto an existing row
    Update { uid: Uid, changes: Row },
    /// Remove a row
    Delete { uid: Uid },
}

/// A mutation of one mirrored table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Write {
    /// Target table
    pub table: TableName,
    /// Explicit origin, inferred when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<Origin>,
    /// The mutation
    pub mutation: Mutation,
}

impl Write {
    /// Insert a row.
    pub fn insert(table: impl Into<TableName>, row: Row) -> Self {
        Self::new(table, Mutation::Insert { row })
    }

    /// Update columns of an existing row.
    pub fn update(table: impl Into<TableName>, uid: impl Into<Uid>, changes: Row) -> Self {
        Self::new(
            table,
            Mutation::Update {
                uid: uid.into(),
                changes,
            },
        )
    }

    /// Delete a row.
    pub fn delete(table: impl Into<TableName>, uid: impl Into<Uid>) -> Self {
        Self::new(table, Mutation::Delete { uid: uid.into() })
    }

    fn new(table: impl Into<TableName>, mutation: Mutation) -> Self {
        Self {
            table: table.into(),
            origin: None,
            mutation,
        }
    }

    /// Tag the write with an explicit origin.
    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = Some(origin);
        self
    }

    /// Tag the write as made locally.
    pub fn local(self) -> Self {
        self.with_origin(Origin::Local)
    }

    /// Tag the write as applied by the sync process.
    pub fn sync_applied(self) -> Self {
        self.with_origin(Origin::SyncApplied)
    }
}

/// Result of applying a write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteResult {
    /// The uid of the affected row
    pub uid: Uid,
    /// The origin the write was classified with
    pub origin: Origin,
    /// Log changes made by the capture rules
    pub capture: crate::CaptureOutcome,
}
