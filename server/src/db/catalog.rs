//! Catalog introspection.
//!
//! Reads the current structure of a table from `information_schema` so the
//! provisioner can diff it against a desired definition and the installer
//! can build the definition of a mirrored table that already exists.

use mirror_engine::{ColumnDef, ColumnType, TableDef};
use sqlx::{PgConnection, Row};

/// A column as reported by the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogColumn {
    pub name: String,
    pub data_type: String,
    pub max_length: Option<i32>,
    pub nullable: bool,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for CatalogColumn {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(CatalogColumn {
            name: row.try_get("column_name")?,
            data_type: row.try_get("data_type")?,
            max_length: row.try_get("max_length")?,
            nullable: row.try_get("nullable")?,
        })
    }
}

impl CatalogColumn {
    /// Map the catalog type onto a column type.
    ///
    /// Types without a direct counterpart read as `Text`.
    pub fn column_type(&self) -> ColumnType {
        match self.data_type.as_str() {
            "character varying" | "character" => match self.max_length {
                Some(length) if length > 0 => ColumnType::String {
                    length: length as u32,
                },
                _ => ColumnType::Text,
            },
            "uuid" => ColumnType::String { length: 36 },
            "smallint" | "integer" | "bigint" => ColumnType::Int,
            "real" | "double precision" | "numeric" => ColumnType::Float,
            "boolean" => ColumnType::Bool,
            "date" | "timestamp without time zone" | "timestamp with time zone" => {
                ColumnType::Timestamp
            }
            "json" | "jsonb" => ColumnType::Json,
            _ => ColumnType::Text,
        }
    }

    /// The column as a definition.
    pub fn to_column_def(&self) -> ColumnDef {
        ColumnDef {
            name: self.name.clone(),
            column_type: self.column_type(),
            nullable: self.nullable,
        }
    }
}

/// Columns of a table in the current schema, in ordinal order.
///
/// Returns an empty list when the table does not exist.
pub async fn table_columns(
    conn: &mut PgConnection,
    table: &str,
) -> Result<Vec<CatalogColumn>, sqlx::Error> {
    sqlx::query_as::<_, CatalogColumn>(
        r#"
        SELECT column_name::text AS column_name,
               data_type::text AS data_type,
               character_maximum_length::int4 AS max_length,
               (is_nullable = 'YES') AS nullable
        FROM information_schema.columns
        WHERE table_schema = current_schema() AND table_name = $1
        ORDER BY ordinal_position
        "#,
    )
    .bind(table)
    .fetch_all(conn)
    .await
}

/// Names of the unique indexes on a table.
pub async fn index_names(conn: &mut PgConnection, table: &str) -> Result<Vec<String>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT indexname::text AS indexname
        FROM pg_indexes
        WHERE schemaname = current_schema() AND tablename = $1
        "#,
    )
    .bind(table)
    .fetch_all(conn)
    .await?;

    rows.iter().map(|row| row.try_get("indexname")).collect()
}

/// Build the definition of an existing table, `None` if it does not exist.
pub async fn describe_table(
    conn: &mut PgConnection,
    table: &str,
) -> Result<Option<TableDef>, sqlx::Error> {
    let columns = table_columns(conn, table).await?;
    if columns.is_empty() {
        return Ok(None);
    }

    Ok(Some(TableDef::new(
        table,
        columns.iter().map(CatalogColumn::to_column_def).collect(),
    )))
}
