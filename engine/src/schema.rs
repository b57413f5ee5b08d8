//! Table definitions.
//!
//! A [`TableDef`] describes the desired structure of a table: its ordered
//! columns, primary key and unique constraints. The same type is used for
//! the mirrored entity tables handed to the installer and for the three log
//! tables making up the tracking schema.

use crate::{error::Result, Error, FieldName, TableName};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Column holding the stable, globally unique row identifier.
pub const UID_COLUMN: &str = "uid";

/// Column holding the identifier assigned by the remote system.
pub const REMOTE_ID_COLUMN: &str = "id";

/// Column the sync process refreshes on every write it applies.
pub const ACTIVITY_COLUMN: &str = "lastActivityTime";

/// Insert-log table name.
pub const LOCAL_INSERT_TABLE: &str = "local_insert";

/// Update-log table name.
pub const LOCAL_UPDATE_TABLE: &str = "local_update";

/// Delete-log table name.
pub const LOCAL_DELETE_TABLE: &str = "local_delete";

/// Length of a canonical hyphenated uid.
pub const UID_LENGTH: u32 = 36;

/// Maximum length of names and remote ids in the log tables.
pub const NAME_LENGTH: u32 = 100;

/// Column types supported in definitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ColumnType {
    /// Variable-length string with a maximum length
    String { length: u32 },
    Text,
    Int,
    Float,
    Bool,
    Timestamp,
    /// Arbitrary nested JSON
    Json,
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColumnType::String { length } => write!(f, "String({length})"),
            ColumnType::Text => write!(f, "Text"),
            ColumnType::Int => write!(f, "Int"),
            ColumnType::Float => write!(f, "Float"),
            ColumnType::Bool => write!(f, "Bool"),
            ColumnType::Timestamp => write!(f, "Timestamp"),
            ColumnType::Json => write!(f, "Json"),
        }
    }
}

/// Definition of a column in a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDef {
    /// Column name
    pub name: FieldName,
    /// Column type
    pub column_type: ColumnType,
    /// Whether the column accepts nulls
    pub nullable: bool,
}

impl ColumnDef {
    /// Create a non-nullable column.
    pub fn required(name: impl Into<FieldName>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: false,
        }
    }

    /// Create a nullable column.
    pub fn nullable(name: impl Into<FieldName>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: true,
        }
    }
}

/// Desired structure of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableDef {
    /// Table name
    pub name: TableName,
    /// Columns in declaration order
    pub columns: Vec<ColumnDef>,
    /// Primary key column names
    #[serde(default)]
    pub primary_key: Vec<FieldName>,
    /// Unique constraints, each a list of column names
    #[serde(default)]
    pub unique: Vec<Vec<FieldName>>,
}

impl TableDef {
    /// Create a table definition with no keys.
    pub fn new(name: impl Into<TableName>, columns: Vec<ColumnDef>) -> Self {
        Self {
            name: name.into(),
            columns,
            primary_key: Vec::new(),
            unique: Vec::new(),
        }
    }

    /// Builder-style method to set the primary key.
    pub fn with_primary_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<FieldName>,
    {
        self.primary_key = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Builder-style method to add a unique constraint.
    pub fn with_unique<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<FieldName>,
    {
        self.unique.push(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Get a column by name.
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Check whether the table has a column.
    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Column names in declaration order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// Validate the structural consistency of this definition.
    ///
    /// Names must be non-empty, columns unique, and every key column must
    /// refer to a declared column.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(self.invalid("table name is empty"));
        }
        if self.columns.is_empty() {
            return Err(self.invalid("table has no columns"));
        }

        let mut seen = HashSet::new();
        for column in &self.columns {
            if column.name.trim().is_empty() {
                return Err(self.invalid("column name is empty"));
            }
            if !seen.insert(column.name.as_str()) {
                return Err(self.invalid(format!("duplicate column '{}'", column.name)));
            }
        }

        let key_columns = self.primary_key.iter().chain(self.unique.iter().flatten());
        for key in key_columns {
            if !self.has_column(key) {
                return Err(Error::InvalidColumn {
                    table: self.name.clone(),
                    column: key.clone(),
                });
            }
        }

        Ok(())
    }

    /// Validate this definition as a mirrored entity table.
    ///
    /// Mirrored tables additionally need a `uid` column; the `id` and
    /// `lastActivityTime` columns are optional and read as null when absent.
    pub fn validate_mirrored(&self) -> Result<()> {
        self.validate()?;
        if !self.has_column(UID_COLUMN) {
            return Err(self.invalid(format!("missing required column '{UID_COLUMN}'")));
        }
        Ok(())
    }

    fn invalid(&self, reason: impl Into<String>) -> Error {
        Error::InvalidDefinition {
            table: self.name.clone(),
            reason: reason.into(),
        }
    }
}

/// Desired definition of the insert-log table.
pub fn local_insert_table() -> TableDef {
    TableDef::new(
        LOCAL_INSERT_TABLE,
        vec![
            ColumnDef::required("table_name", ColumnType::String { length: NAME_LENGTH }),
            ColumnDef::required(UID_COLUMN, ColumnType::String { length: UID_LENGTH }),
        ],
    )
    .with_primary_key(["table_name", UID_COLUMN])
}

/// Desired definition of the update-log table.
pub fn local_update_table() -> TableDef {
    TableDef::new(
        LOCAL_UPDATE_TABLE,
        vec![
            ColumnDef::required("table_name", ColumnType::String { length: NAME_LENGTH }),
            ColumnDef::required(UID_COLUMN, ColumnType::String { length: UID_LENGTH }),
            ColumnDef::required("field_name", ColumnType::String { length: NAME_LENGTH }),
        ],
    )
    .with_primary_key(["table_name", UID_COLUMN, "field_name"])
}

/// Desired definition of the delete-log table.
pub fn local_delete_table() -> TableDef {
    TableDef::new(
        LOCAL_DELETE_TABLE,
        vec![
            ColumnDef::required("table_name", ColumnType::String { length: NAME_LENGTH }),
            ColumnDef::required(UID_COLUMN, ColumnType::String { length: UID_LENGTH }),
            ColumnDef::nullable(REMOTE_ID_COLUMN, ColumnType::String { length: NAME_LENGTH }),
        ],
    )
    .with_primary_key(["table_name", UID_COLUMN])
    .with_unique([REMOTE_ID_COLUMN, "table_name"])
}

/// The three log tables making up the tracking schema.
pub fn tracking_tables() -> [TableDef; 3] {
    [
        local_update_table(),
        local_insert_table(),
        local_delete_table(),
    ]
}
