//! Error types for the Mirror engine.

use crate::{FieldName, TableName, Uid};
use thiserror::Error;

/// All possible errors from the Mirror engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Definition errors
    #[error("invalid table definition for '{table}': {reason}")]
    InvalidDefinition { table: TableName, reason: String },

    #[error("table '{table}' has no column '{column}'")]
    InvalidColumn { table: TableName, column: FieldName },

    #[error("table not found: {0}")]
    TableNotFound(TableName),

    // Write errors
    #[error("row not found in '{table}': {uid}")]
    RowNotFound { table: TableName, uid: Uid },

    #[error("row in '{0}' has no uid")]
    MissingUid(TableName),

    #[error("duplicate uid in '{table}': {uid}")]
    DuplicateUid { table: TableName, uid: Uid },

    #[error("identifier column '{column}' cannot be changed by an update")]
    ImmutableColumn { column: FieldName },

    #[error("invalid row: {0}")]
    InvalidRow(String),

    // Tracking errors
    #[error("tracking schema is not provisioned: missing log table '{0}'")]
    TrackingSchemaMissing(TableName),

    #[error("constraint violation on '{table}': {reason}")]
    ConstraintViolation { table: TableName, reason: String },

    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
