//! Row state and write origin.

use crate::{
    error::Result,
    schema::{ACTIVITY_COLUMN, REMOTE_ID_COLUMN, UID_COLUMN},
    Error, RemoteId, Uid,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Origin of a write against a mirrored table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Origin {
    /// Made directly against the mirrored table
    Local,
    /// Made by the sync process while applying remote state
    SyncApplied,
}

impl Origin {
    /// Classify an insert from the inserted row alone.
    ///
    /// The sync process always stamps `lastActivityTime` on the rows it
    /// inserts, so a row without one was inserted locally.
    pub fn of_insert(new: &Row) -> Self {
        if new.last_activity_time().is_none() {
            Origin::Local
        } else {
            Origin::SyncApplied
        }
    }

    /// Classify an update from the row state before and after it.
    ///
    /// The sync process refreshes `lastActivityTime` on every write, so an
    /// unchanged value marks a local update.
    pub fn of_update(old: &Row, new: &Row) -> Self {
        if values_equal(old.get(ACTIVITY_COLUMN), new.get(ACTIVITY_COLUMN)) {
            Origin::Local
        } else {
            Origin::SyncApplied
        }
    }

    /// Whether this write should be captured.
    pub fn is_local(self) -> bool {
        self == Origin::Local
    }
}

/// Null-safe equality of two column values.
///
/// A missing column reads as null, two nulls are equal and null never
/// equals a non-null value.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    a == b
}

/// A row of a mirrored table, keyed by column name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row(Map<String, Value>);

impl Row {
    /// Create an empty row.
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Build a row from a JSON object.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(Error::InvalidRow(format!(
                "row must be a JSON object, got {}",
                json_type_name(&other)
            ))),
        }
    }

    /// Builder-style method to set a column.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(column, value);
        self
    }

    /// Get a column value, null when the column is absent.
    pub fn get(&self, column: &str) -> &Value {
        self.0.get(column).unwrap_or(&Value::Null)
    }

    /// Set a column value.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(column.into(), value.into());
    }

    /// Overlay another row's columns onto this one.
    pub fn merge(&mut self, changes: &Row) {
        for (column, value) in &changes.0 {
            self.0.insert(column.clone(), value.clone());
        }
    }

    /// Iterate over the columns present on the row.
    pub fn columns(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// The row's uid, if set to a non-empty string.
    pub fn uid(&self) -> Option<&str> {
        match self.get(UID_COLUMN) {
            Value::String(uid) if !uid.is_empty() => Some(uid),
            _ => None,
        }
    }

    /// Set the row's uid.
    pub fn set_uid(&mut self, uid: impl Into<Uid>) {
        self.set(UID_COLUMN, Value::String(uid.into()));
    }

    /// The remote identifier, rendered as a string, if the row has one.
    pub fn remote_id(&self) -> Option<RemoteId> {
        match self.get(REMOTE_ID_COLUMN) {
            Value::Null => None,
            Value::String(id) => Some(id.clone()),
            other => Some(other.to_string()),
        }
    }

    /// The `lastActivityTime` value, if non-null.
    pub fn last_activity_time(&self) -> Option<&Value> {
        match self.get(ACTIVITY_COLUMN) {
            Value::Null => None,
            value => Some(value),
        }
    }
}

impl From<Map<String, Value>> for Row {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<Row> for Value {
    fn from(row: Row) -> Self {
        Value::Object(row.0)
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_columns_read_as_null() {
        let row = Row::new().with("name", "Alice");
        assert_eq!(row.get("name"), &json!("Alice"));
        assert_eq!(row.get("email"), &Value::Null);
    }

    #[test]
    fn null_safe_equality() {
        assert!(values_equal(&Value::Null, &Value::Null));
        assert!(!values_equal(&Value::Null, &json!("")));
        assert!(!values_equal(&json!(0), &Value::Null));
        assert!(values_equal(&json!({"a": [1, 2]}), &json!({"a": [1, 2]})));

        let absent = Row::new();
        let explicit = Row::new().with("name", Value::Null);
        assert!(values_equal(absent.get("name"), explicit.get("name")));
    }

    #[test]
    fn empty_uid_is_unset() {
        assert_eq!(Row::new().uid(), None);
        assert_eq!(Row::new().with("uid", "").uid(), None);
        assert_eq!(Row::new().with("uid", 42).uid(), None);
        assert_eq!(Row::new().with("uid", "u-1").uid(), Some("u-1"));
    }

    #[test]
    fn remote_id_rendering() {
        assert_eq!(Row::new().remote_id(), None);
        assert_eq!(Row::new().with("id", Value::Null).remote_id(), None);
        assert_eq!(Row::new().with("id", "Z-1").remote_id(), Some("Z-1".into()));
        assert_eq!(Row::new().with("id", 1234).remote_id(), Some("1234".into()));
    }

    #[test]
    fn insert_origin_from_activity_time() {
        let local = Row::new().with("uid", "u-1");
        assert_eq!(Origin::of_insert(&local), Origin::Local);

        let synced = local.clone().with(ACTIVITY_COLUMN, "2024-01-01T00:00:00Z");
        assert_eq!(Origin::of_insert(&synced), Origin::SyncApplied);

        let explicit_null = local.with(ACTIVITY_COLUMN, Value::Null);
        assert_eq!(Origin::of_insert(&explicit_null), Origin::Local);
    }

    #[test]
    fn update_origin_from_activity_time() {
        let old = Row::new().with("uid", "u-1").with(ACTIVITY_COLUMN, 1000);
        let same = old.clone().with("name", "B");
        assert_eq!(Origin::of_update(&old, &same), Origin::Local);

        let refreshed = old.clone().with(ACTIVITY_COLUMN, 2000);
        assert_eq!(Origin::of_update(&old, &refreshed), Origin::SyncApplied);

        let never_synced = Row::new().with("uid", "u-2");
        assert_eq!(
            Origin::of_update(&never_synced, &never_synced.clone().with("name", "B")),
            Origin::Local
        );
        assert_eq!(
            Origin::of_update(&never_synced, &never_synced.clone().with(ACTIVITY_COLUMN, 1)),
            Origin::SyncApplied
        );
    }

    #[test]
    fn merge_overlays_changes() {
        let mut row = Row::new().with("uid", "u-1").with("name", "A");
        row.merge(&Row::new().with("name", "B").with("email", "b@example.com"));
        assert_eq!(row.get("name"), &json!("B"));
        assert_eq!(row.get("email"), &json!("b@example.com"));
        assert_eq!(row.uid(), Some("u-1"));
    }

    #[test]
    fn from_value_requires_object() {
        assert!(Row::from_value(json!({"uid": "u-1"})).is_ok());
        assert_eq!(
            Row::from_value(json!([1])),
            Err(Error::InvalidRow("row must be a JSON object, got array".into()))
        );
    }

    #[test]
    fn serialization_is_transparent() {
        let row = Row::new().with("uid", "u-1").with("name", "Alice");
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json, json!({"uid": "u-1", "name": "Alice"}));
        let parsed: Row = serde_json::from_value(json).unwrap();
        assert_eq!(row, parsed);
    }
}
