//! # Mirror Engine
//!
//! Local change tracking for a mirrored copy of a remote database.
//!
//! An application keeps a local copy of entity tables that also live in a
//! remote system. Writes reach those tables from two sources: the sync
//! process, which applies remote state, and local users, who edit the copy
//! directly. This crate records the local writes in three shared log tables
//! so a later sync pass knows what to push back.
//!
//! ## Design Principles
//!
//! - **No IO**: the engine describes schemas and rules, hosts execute them
//! - **Deterministic**: rule names, tracked columns and log order are stable
//! - **Fail closed**: if a change cannot be logged, the write is rejected
//!
//! ## Core Concepts
//!
//! ### Tracking Schema
//!
//! Three log tables are shared by every mirrored table:
//! - `local_insert` - rows created locally, keyed by `(table_name, uid)`
//! - `local_update` - dirty fields, keyed by `(table_name, uid, field_name)`
//! - `local_delete` - rows deleted locally with their remote `id`
//!
//! ### Rules
//!
//! [`install_tracking`] attaches four rules to a mirrored table: a uid
//! assignment rule and three [`CaptureSpec`] rules for insert, update and
//! delete. Writes made by the sync process are told apart from local ones by
//! their [`Origin`], inferred from `lastActivityTime` unless given explicitly.
//!
//! ## Quick Start
//!
//! ```rust
//! use mirror_engine::{
//!     ChangeLog, ColumnDef, ColumnType, MirrorStore, Row, TableDef,
//! };
//!
//! // 1. Define a mirrored table
//! let contacts = TableDef::new(
//!     "contacts",
//!     vec![
//!         ColumnDef::nullable("id", ColumnType::String { length: 100 }),
//!         ColumnDef::required("uid", ColumnType::String { length: 36 }),
//!         ColumnDef::nullable("name", ColumnType::Text),
//!         ColumnDef::nullable("lastActivityTime", ColumnType::Timestamp),
//!     ],
//! );
//!
//! // 2. Install tracking
//! let mut store = MirrorStore::new();
//! store.define_table(contacts.clone()).unwrap();
//! let report = store.install_tracking(&contacts).unwrap();
//! assert_eq!(report.rules.len(), 4);
//!
//! // 3. A local insert gets a uid and is logged
//! let result = store.insert("contacts", Row::new().with("name", "Alice")).unwrap();
//! assert_eq!(store.log().inserts("contacts").unwrap().len(), 1);
//!
//! // 4. A local edit marks the field dirty
//! store
//!     .update("contacts", &result.uid, Row::new().with("name", "Alicia"))
//!     .unwrap();
//! assert_eq!(store.log().updates("contacts").unwrap()[0].field_name, "name");
//! ```
//!
//! ## Persistence
//!
//! Use [`MirrorStore::export_log`] and [`MirrorStore::import_log`] with
//! [`LogSnapshot`] to persist pending changes of the in-memory host.

pub mod capture;
pub mod error;
pub mod install;
pub mod log;
pub mod pending;
pub mod row;
pub mod rules;
pub mod schema;
pub mod store;
pub mod uid;
pub mod write;

// Re-export main types at crate root
pub use capture::{CaptureOutcome, CaptureSpec};
pub use error::Error;
pub use install::{
    ensure_schema, install_tracking, InstallPlan, InstallReport, RuleHost, SchemaProvisioner,
};
pub use log::{
    ChangeLog, DeleteEntry, InsertEntry, LogEntry, LogSnapshot, MemoryChangeLog, UpdateEntry,
    LOG_SNAPSHOT_FORMAT_VERSION,
};
pub use pending::{RowState, TableChanges};
pub use row::{Origin, Row};
pub use rules::{Event, Rule, RuleKind, RuleSet, Timing};
pub use schema::{ColumnDef, ColumnType, TableDef};
pub use store::{MirrorStore, MirroredTable};
pub use uid::{assign_uid, generate_uid};
pub use write::{Mutation, Write, WriteResult};

/// Type aliases for clarity
pub type TableName = String;
pub type Uid = String;
pub type RemoteId = String;
pub type FieldName = String;
