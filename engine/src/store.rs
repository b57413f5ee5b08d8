//! Store - an in-memory host for mirrored tables.
//!
//! The store plays the part of the storage engine: it holds mirrored tables
//! and the change log, runs the rules installed on a table around each
//! mutation, and applies a write together with its capture as one unit. If
//! capture fails, neither the row nor the log changes.

use crate::{
    error::Result,
    install::{self, is_log_table, InstallReport, RuleHost, SchemaProvisioner},
    log::{ChangeLog, LogEntry, LogSnapshot, MemoryChangeLog, LOG_TABLES},
    pending::TableChanges,
    rules::RuleKind,
    schema::UID_COLUMN,
    uid::assign_uid,
    CaptureOutcome, Error, Mutation, Origin, Row, RuleSet, TableDef, TableName, Uid, Write,
    WriteResult,
};
use std::collections::{BTreeMap, HashMap};

/// A mirrored table and its rows.
#[derive(Debug, Clone)]
pub struct MirroredTable {
    def: TableDef,
    rows: BTreeMap<Uid, Row>,
    rules: Option<RuleSet>,
}

impl MirroredTable {
    fn new(def: TableDef) -> Self {
        Self {
            def,
            rows: BTreeMap::new(),
            rules: None,
        }
    }

    /// The table definition.
    pub fn definition(&self) -> &TableDef {
        &self.def
    }

    /// Rules currently attached, if tracking is installed.
    pub fn rules(&self) -> Option<&RuleSet> {
        self.rules.as_ref()
    }

    /// Get a row by uid.
    pub fn get(&self, uid: &str) -> Option<&Row> {
        self.rows.get(uid)
    }

    /// All rows, ordered by uid.
    pub fn rows(&self) -> impl Iterator<Item = &Row> {
        self.rows.values()
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn has_rule(&self, kind: RuleKind) -> bool {
        self.rules.as_ref().is_some_and(|r| r.has(kind))
    }

    fn check_columns(&self, row: &Row) -> Result<()> {
        for (column, _) in row.columns() {
            if !self.def.has_column(column) {
                return Err(Error::InvalidColumn {
                    table: self.def.name.clone(),
                    column: column.clone(),
                });
            }
        }
        Ok(())
    }

    fn check_not_null(&self, row: &Row) -> Result<()> {
        for column in self.def.columns.iter().filter(|c| !c.nullable) {
            if row.get(&column.name).is_null() {
                return Err(Error::InvalidRow(format!(
                    "column '{}' of '{}' cannot be null",
                    column.name, self.def.name
                )));
            }
        }
        Ok(())
    }
}

/// The in-memory host store.
#[derive(Debug, Clone, Default)]
pub struct MirrorStore {
    /// Mirrored tables by name
    tables: HashMap<TableName, MirroredTable>,
    /// Provisioned log table definitions
    provisioned: BTreeMap<TableName, TableDef>,
    /// Pending local changes
    log: MemoryChangeLog,
}

impl MirrorStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or redefine a mirrored table.
    ///
    /// Redefining keeps existing rows and attached rules.
    pub fn define_table(&mut self, def: TableDef) -> Result<()> {
        def.validate_mirrored()?;
        if is_log_table(&def.name) {
            return Err(Error::InvalidDefinition {
                table: def.name,
                reason: "name is reserved for the tracking schema".into(),
            });
        }

        match self.tables.get_mut(&def.name) {
            Some(table) => table.def = def,
            None => {
                self.tables.insert(def.name.clone(), MirroredTable::new(def));
            }
        }
        Ok(())
    }

    /// Provision the tracking schema without attaching rules.
    pub fn ensure_schema(&mut self) -> Result<Vec<TableName>> {
        install::ensure_schema(self)
    }

    /// Install change tracking on a mirrored table.
    pub fn install_tracking(&mut self, def: &TableDef) -> Result<InstallReport> {
        install::install_tracking(self, def)
    }

    /// Get a mirrored table.
    pub fn table(&self, name: &str) -> Option<&MirroredTable> {
        self.tables.get(name)
    }

    /// Get a row by table and uid.
    pub fn get(&self, table: &str, uid: &str) -> Option<&Row> {
        self.tables.get(table).and_then(|t| t.get(uid))
    }

    /// Definitions of the provisioned log tables.
    pub fn provisioned(&self) -> impl Iterator<Item = &TableDef> {
        self.provisioned.values()
    }

    /// The change log.
    pub fn log(&self) -> &MemoryChangeLog {
        &self.log
    }

    /// Pending changes of a table, folded per row.
    pub fn pending_changes(&self, table: &str) -> Result<TableChanges> {
        TableChanges::read(&self.log, table)
    }

    /// Acknowledge a log entry once its change has been pushed.
    pub fn acknowledge(&mut self, entry: &LogEntry) -> Result<bool> {
        self.log.acknowledge(entry)
    }

    /// Export the change log.
    pub fn export_log(&self) -> LogSnapshot {
        self.log.export()
    }

    /// Replace the change log with a snapshot.
    pub fn import_log(&mut self, snapshot: LogSnapshot) -> Result<()> {
        self.log = MemoryChangeLog::import(snapshot)?;
        Ok(())
    }

    /// Insert a row, classifying its origin from `lastActivityTime`.
    pub fn insert(&mut self, table: &str, row: Row) -> Result<WriteResult> {
        self.apply(Write::insert(table, row))
    }

    /// Update a row, classifying its origin from `lastActivityTime`.
    pub fn update(&mut self, table: &str, uid: &str, changes: Row) -> Result<WriteResult> {
        self.apply(Write::update(table, uid, changes))
    }

    /// Delete a row as a local write.
    pub fn delete(&mut self, table: &str, uid: &str) -> Result<WriteResult> {
        self.apply(Write::delete(table, uid))
    }

    /// Apply a write and run the table's rules around it.
    pub fn apply(&mut self, write: Write) -> Result<WriteResult> {
        let Self {
            tables,
            provisioned,
            log,
        } = self;

        let table = tables
            .get_mut(&write.table)
            .ok_or_else(|| Error::TableNotFound(write.table.clone()))?;

        if table.rules.is_some() {
            for name in LOG_TABLES {
                if !provisioned.contains_key(name) {
                    return Err(Error::TrackingSchemaMissing(name.to_string()));
                }
            }
        }

        let result = log.transaction(|log| match write.mutation {
            Mutation::Insert { row } => apply_insert(table, log, row, write.origin),
            Mutation::Update { uid, changes } => {
                apply_update(table, log, uid, changes, write.origin)
            }
            Mutation::Delete { uid } => apply_delete(table, log, uid, write.origin),
        });

        if let Err(e) = &result {
            tracing::warn!(table = %table.def.name, error = %e, "write rejected");
        }
        result
    }
}

fn apply_insert(
    table: &mut MirroredTable,
    log: &mut MemoryChangeLog,
    mut row: Row,
    origin: Option<Origin>,
) -> Result<WriteResult> {
    if table.has_rule(RuleKind::AssignUid) {
        assign_uid(&mut row);
    }
    table.check_columns(&row)?;

    let uid = row
        .uid()
        .ok_or_else(|| Error::MissingUid(table.def.name.clone()))?
        .to_string();
    table.check_not_null(&row)?;
    if table.rows.contains_key(&uid) {
        return Err(Error::DuplicateUid {
            table: table.def.name.clone(),
            uid,
        });
    }

    let origin = origin.unwrap_or_else(|| Origin::of_insert(&row));
    let capture = match &table.rules {
        Some(rules) if rules.has(RuleKind::CaptureInsert) => {
            rules.capture.on_insert(log, &row, origin)?
        }
        _ => CaptureOutcome::default(),
    };

    table.rows.insert(uid.clone(), row);
    Ok(WriteResult {
        uid,
        origin,
        capture,
    })
}

fn apply_update(
    table: &mut MirroredTable,
    log: &mut MemoryChangeLog,
    uid: Uid,
    changes: Row,
    origin: Option<Origin>,
) -> Result<WriteResult> {
    table.check_columns(&changes)?;

    let old = table.rows.get(&uid).ok_or_else(|| Error::RowNotFound {
        table: table.def.name.clone(),
        uid: uid.clone(),
    })?;

    if changes.columns().any(|(c, _)| c == UID_COLUMN) && changes.uid() != Some(uid.as_str()) {
        return Err(Error::ImmutableColumn {
            column: UID_COLUMN.to_string(),
        });
    }

    let mut new = old.clone();
    new.merge(&changes);
    table.check_not_null(&new)?;

    let origin = origin.unwrap_or_else(|| Origin::of_update(old, &new));
    let capture = match &table.rules {
        Some(rules) if rules.has(RuleKind::CaptureUpdate) => {
            rules.capture.on_update(log, old, &new, origin)?
        }
        _ => CaptureOutcome::default(),
    };

    table.rows.insert(uid.clone(), new);
    Ok(WriteResult {
        uid,
        origin,
        capture,
    })
}

fn apply_delete(
    table: &mut MirroredTable,
    log: &mut MemoryChangeLog,
    uid: Uid,
    origin: Option<Origin>,
) -> Result<WriteResult> {
    let old = table.rows.get(&uid).ok_or_else(|| Error::RowNotFound {
        table: table.def.name.clone(),
        uid: uid.clone(),
    })?;

    let origin = origin.unwrap_or(Origin::Local);
    let capture = match &table.rules {
        Some(rules) if rules.has(RuleKind::CaptureDelete) => {
            rules.capture.on_delete(log, old, origin)?
        }
        _ => CaptureOutcome::default(),
    };

    table.rows.remove(&uid);
    Ok(WriteResult {
        uid,
        origin,
        capture,
    })
}

impl SchemaProvisioner for MirrorStore {
    fn ensure_or_update_table(&mut self, table: &TableDef) -> Result<()> {
        table.validate()?;
        if self.tables.contains_key(&table.name) {
            return Err(Error::InvalidDefinition {
                table: table.name.clone(),
                reason: "a mirrored table with this name already exists".into(),
            });
        }

        match self.provisioned.get(&table.name) {
            Some(existing) if existing == table => {}
            Some(_) => {
                tracing::debug!(table = %table.name, "updating provisioned table");
                self.provisioned.insert(table.name.clone(), table.clone());
            }
            None => {
                tracing::debug!(table = %table.name, "provisioning table");
                self.provisioned.insert(table.name.clone(), table.clone());
            }
        }
        Ok(())
    }
}

impl RuleHost for MirrorStore {
    fn replace_rules(&mut self, rules: RuleSet) -> Result<()> {
        let table = self
            .tables
            .get_mut(&rules.table)
            .ok_or_else(|| Error::TableNotFound(rules.table.clone()))?;

        if let Some(column) = rules
            .capture
            .tracked_columns
            .iter()
            .find(|c| !table.def.has_column(c))
        {
            return Err(Error::InvalidColumn {
                table: rules.table.clone(),
                column: column.clone(),
            });
        }

        table.rules = Some(rules);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::{DeleteEntry, InsertEntry, UpdateEntry};
    use crate::schema::{ColumnDef, ColumnType, ACTIVITY_COLUMN};
    use crate::uid::is_canonical_uid;
    use serde_json::json;

    fn contacts() -> TableDef {
        TableDef::new(
            "contacts",
            vec![
                ColumnDef::nullable("id", ColumnType::String { length: 100 }),
                ColumnDef::required("uid", ColumnType::String { length: 36 }),
                ColumnDef::nullable("name", ColumnType::Text),
                ColumnDef::nullable("email", ColumnType::Text),
                ColumnDef::nullable(ACTIVITY_COLUMN, ColumnType::Timestamp),
            ],
        )
    }

    fn tracked_store() -> MirrorStore {
        let mut store = MirrorStore::new();
        store.define_table(contacts()).unwrap();
        store.install_tracking(&contacts()).unwrap();
        store
    }

    #[test]
    fn untracked_table_writes_nothing() {
        let mut store = MirrorStore::new();
        store.define_table(contacts()).unwrap();

        let result = store
            .insert("contacts", Row::new().with("uid", "u-1").with("name", "A"))
            .unwrap();
        assert!(result.capture.is_empty());
        assert!(store.log().is_empty());
    }

    #[test]
    fn untracked_table_requires_uid() {
        let mut store = MirrorStore::new();
        store.define_table(contacts()).unwrap();

        let err = store
            .insert("contacts", Row::new().with("name", "A"))
            .unwrap_err();
        assert_eq!(err, Error::MissingUid("contacts".into()));
    }

    #[test]
    fn insert_assigns_uid_and_logs() {
        let mut store = tracked_store();
        let result = store
            .insert("contacts", Row::new().with("name", "Alice"))
            .unwrap();

        assert!(is_canonical_uid(&result.uid));
        assert_eq!(result.origin, Origin::Local);
        assert_eq!(
            store.log().inserts("contacts").unwrap(),
            vec![InsertEntry::new("contacts", result.uid.clone())]
        );
        assert_eq!(
            store.get("contacts", &result.uid).unwrap().get("name"),
            &json!("Alice")
        );
    }

    #[test]
    fn duplicate_uid_rejected() {
        let mut store = tracked_store();
        store
            .insert("contacts", Row::new().with("uid", "u-1"))
            .unwrap();
        let err = store
            .insert("contacts", Row::new().with("uid", "u-1"))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateUid { .. }));
        assert_eq!(store.log().inserts("contacts").unwrap().len(), 1);
    }

    #[test]
    fn unknown_column_rejected() {
        let mut store = tracked_store();
        let err = store
            .insert("contacts", Row::new().with("phone", "555"))
            .unwrap_err();
        assert_eq!(
            err,
            Error::InvalidColumn {
                table: "contacts".into(),
                column: "phone".into(),
            }
        );
        assert!(store.table("contacts").unwrap().is_empty());
    }

    #[test]
    fn uid_cannot_be_changed() {
        let mut store = tracked_store();
        store
            .insert("contacts", Row::new().with("uid", "u-1"))
            .unwrap();

        let err = store
            .update("contacts", "u-1", Row::new().with("uid", "u-2"))
            .unwrap_err();
        assert!(matches!(err, Error::ImmutableColumn { .. }));

        // Restating the same uid is allowed
        store
            .update("contacts", "u-1", Row::new().with("uid", "u-1").with("name", "B"))
            .unwrap();
    }

    #[test]
    fn missing_row() {
        let mut store = tracked_store();
        assert!(matches!(
            store.update("contacts", "nope", Row::new()),
            Err(Error::RowNotFound { .. })
        ));
        assert!(matches!(
            store.delete("contacts", "nope"),
            Err(Error::RowNotFound { .. })
        ));
        assert_eq!(
            store.insert("leads", Row::new()),
            Err(Error::TableNotFound("leads".into()))
        );
    }

    #[test]
    fn rules_without_schema_fail_closed() {
        let mut store = MirrorStore::new();
        store.define_table(contacts()).unwrap();
        store.replace_rules(RuleSet::for_table(&contacts())).unwrap();

        let err = store
            .insert("contacts", Row::new().with("name", "A"))
            .unwrap_err();
        assert_eq!(err, Error::TrackingSchemaMissing("local_update".into()));
        assert!(store.table("contacts").unwrap().is_empty());
    }

    #[test]
    fn failed_capture_rolls_back_write() {
        let mut store = tracked_store();
        store
            .insert("contacts", Row::new().with("uid", "u-1").with("id", "R1"))
            .unwrap();
        store
            .insert("contacts", Row::new().with("uid", "u-2").with("id", "R1"))
            .unwrap();
        store
            .update("contacts", "u-2", Row::new().with("name", "edited"))
            .unwrap();

        store.delete("contacts", "u-1").unwrap();
        let before = store.export_log();

        // Second delete reuses the remote id: the log constraint rejects it
        let err = store.delete("contacts", "u-2").unwrap_err();
        assert!(matches!(err, Error::ConstraintViolation { .. }));

        assert!(store.get("contacts", "u-2").is_some());
        assert_eq!(store.export_log(), before);
        assert_eq!(
            store.log().updates("contacts").unwrap(),
            vec![UpdateEntry::new("contacts", "u-2", "name")]
        );
    }

    #[test]
    fn capture_failing_midway_undoes_earlier_entries() {
        let long_column = "c".repeat(101);
        let def = TableDef::new(
            "contacts",
            vec![
                ColumnDef::required("uid", ColumnType::String { length: 36 }),
                ColumnDef::nullable("name", ColumnType::Text),
                ColumnDef::nullable(long_column.as_str(), ColumnType::Text),
            ],
        );
        let mut store = MirrorStore::new();
        store.define_table(def.clone()).unwrap();
        store.install_tracking(&def).unwrap();
        store
            .apply(Write::insert("contacts", Row::new().with("uid", "u-1")).sync_applied())
            .unwrap();

        // "name" is logged first, then the over-long field name is rejected
        let err = store
            .update(
                "contacts",
                "u-1",
                Row::new().with("name", "B").with(long_column.as_str(), "x"),
            )
            .unwrap_err();
        assert!(matches!(err, Error::ConstraintViolation { .. }));

        assert!(store.log().is_empty());
        assert!(store.get("contacts", "u-1").unwrap().get("name").is_null());
    }

    #[test]
    fn over_long_uid_is_rejected_by_capture() {
        let mut store = tracked_store();
        let uid = "u".repeat(37);

        let err = store
            .insert("contacts", Row::new().with("uid", uid.as_str()))
            .unwrap_err();
        assert!(matches!(err, Error::ConstraintViolation { .. }));
        assert!(store.get("contacts", &uid).is_none());

        // Untracked writes are not bound by the log columns
        store
            .apply(Write::insert("contacts", Row::new().with("uid", uid.as_str())).sync_applied())
            .unwrap();
        assert!(store.log().is_empty());
    }

    #[test]
    fn replace_rules_checks_columns() {
        let mut store = MirrorStore::new();
        store.define_table(contacts()).unwrap();

        let mut rules = RuleSet::for_table(&contacts());
        rules.capture.tracked_columns.push("phone".into());
        assert_eq!(
            store.replace_rules(rules),
            Err(Error::InvalidColumn {
                table: "contacts".into(),
                column: "phone".into(),
            })
        );
    }

    #[test]
    fn install_on_undefined_table_fails() {
        let mut store = MirrorStore::new();
        assert_eq!(
            store.install_tracking(&contacts()),
            Err(Error::TableNotFound("contacts".into()))
        );
    }

    #[test]
    fn log_table_names_are_reserved() {
        let mut store = MirrorStore::new();
        let def = TableDef::new(
            "local_insert",
            vec![ColumnDef::required("uid", ColumnType::Text)],
        );
        assert!(matches!(
            store.define_table(def),
            Err(Error::InvalidDefinition { .. })
        ));
    }

    #[test]
    fn explicit_origin_overrides_activity_time() {
        let mut store = tracked_store();

        // No activity time, but tagged as sync-applied
        store
            .apply(Write::insert("contacts", Row::new().with("uid", "u-1")).sync_applied())
            .unwrap();
        assert!(store.log().is_empty());

        // Activity time set, but tagged as local
        store
            .apply(
                Write::insert(
                    "contacts",
                    Row::new().with("uid", "u-2").with(ACTIVITY_COLUMN, 1000),
                )
                .local(),
            )
            .unwrap();
        assert_eq!(store.log().inserts("contacts").unwrap().len(), 1);
    }

    #[test]
    fn sync_applied_delete_does_not_log() {
        let mut store = tracked_store();
        store
            .insert(
                "contacts",
                Row::new()
                    .with("uid", "u-1")
                    .with("id", "R1")
                    .with(ACTIVITY_COLUMN, 1000),
            )
            .unwrap();
        store
            .update("contacts", "u-1", Row::new().with("name", "local edit"))
            .unwrap();

        store
            .apply(Write::delete("contacts", "u-1").sync_applied())
            .unwrap();
        assert!(store.log().is_empty());
        assert_eq!(store.log().deletes("contacts").unwrap(), Vec::<DeleteEntry>::new());
    }

    #[test]
    fn acknowledge_and_pending_view() {
        let mut store = tracked_store();
        let uid = store
            .insert("contacts", Row::new().with("name", "A"))
            .unwrap()
            .uid;

        let changes = store.pending_changes("contacts").unwrap();
        assert_eq!(changes.rows.len(), 1);

        assert!(store
            .acknowledge(&LogEntry::Insert(InsertEntry::new("contacts", uid)))
            .unwrap());
        assert!(store.pending_changes("contacts").unwrap().is_empty());
    }

    #[test]
    fn import_log_replaces_entries() {
        let mut store = tracked_store();
        store
            .insert("contacts", Row::new().with("uid", "u-1"))
            .unwrap();
        let snapshot = store.export_log();

        let mut other = tracked_store();
        other.import_log(snapshot).unwrap();
        assert_eq!(other.log(), store.log());
    }

    #[test]
    fn redefining_keeps_rows_and_rules() {
        let mut store = tracked_store();
        store
            .insert("contacts", Row::new().with("uid", "u-1"))
            .unwrap();

        let mut def = contacts();
        def.columns
            .push(ColumnDef::nullable("phone", ColumnType::Text));
        store.define_table(def).unwrap();

        let table = store.table("contacts").unwrap();
        assert_eq!(table.len(), 1);
        assert!(table.rules().is_some());
        assert!(table.definition().has_column("phone"));
    }
}
