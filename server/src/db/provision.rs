//! Schema provisioning.
//!
//! Brings a table in line with a desired [`TableDef`]: creates it when
//! missing, otherwise adds missing columns, aligns types and nullability, and
//! creates missing unique indexes. Columns that are not in the definition are
//! left alone. Running it against an up-to-date table issues no statements.

use crate::db::catalog::{self, CatalogColumn};
use crate::db::sql::{column_sql, ident_list, quote_ident, sql_type};
use crate::error::Result;
use mirror_engine::TableDef;
use sqlx::PgConnection;

/// Name of the unique index backing a unique constraint.
pub fn unique_index_name(table: &str, columns: &[String]) -> String {
    format!("uniq_{}_{}", table, columns.join("_"))
}

/// Statements creating a table from scratch.
pub fn create_table_statements(table: &TableDef) -> Vec<String> {
    let mut parts: Vec<String> = table.columns.iter().map(column_sql).collect();
    if !table.primary_key.is_empty() {
        parts.push(format!("PRIMARY KEY ({})", ident_list(&table.primary_key)));
    }

    let mut statements = vec![format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quote_ident(&table.name),
        parts.join(", ")
    )];
    statements.extend(unique_index_statements(table, &[]));
    statements
}

/// Statements bringing an existing table in line with its definition.
pub fn alter_table_statements(
    table: &TableDef,
    existing: &[CatalogColumn],
    indexes: &[String],
) -> Vec<String> {
    let name = quote_ident(&table.name);
    let mut statements = Vec::new();

    for column in &table.columns {
        let Some(current) = existing.iter().find(|c| c.name == column.name) else {
            statements.push(format!("ALTER TABLE {name} ADD COLUMN {}", column_sql(column)));
            continue;
        };

        let ident = quote_ident(&column.name);
        if current.column_type() != column.column_type {
            let target = sql_type(column.column_type);
            statements.push(format!(
                "ALTER TABLE {name} ALTER COLUMN {ident} TYPE {target} USING {ident}::{target}"
            ));
        }
        if current.nullable != column.nullable {
            let action = if column.nullable { "DROP" } else { "SET" };
            statements.push(format!(
                "ALTER TABLE {name} ALTER COLUMN {ident} {action} NOT NULL"
            ));
        }
    }

    statements.extend(unique_index_statements(table, indexes));
    statements
}

fn unique_index_statements(table: &TableDef, indexes: &[String]) -> Vec<String> {
    table
        .unique
        .iter()
        .filter_map(|columns| {
            let index = unique_index_name(&table.name, columns);
            if indexes.contains(&index) {
                return None;
            }
            Some(format!(
                "CREATE UNIQUE INDEX IF NOT EXISTS {} ON {} ({})",
                quote_ident(&index),
                quote_ident(&table.name),
                ident_list(columns)
            ))
        })
        .collect()
}

/// Create or update a table to match `table`.
///
/// Returns the statements that were executed.
pub async fn ensure_or_update_table(
    conn: &mut PgConnection,
    table: &TableDef,
) -> Result<Vec<String>> {
    table.validate()?;

    let existing = catalog::table_columns(conn, &table.name).await?;
    let statements = if existing.is_empty() {
        tracing::info!(table = %table.name, "creating table");
        create_table_statements(table)
    } else {
        let indexes = catalog::index_names(conn, &table.name).await?;
        alter_table_statements(table, &existing, &indexes)
    };

    for statement in &statements {
        tracing::debug!(table = %table.name, %statement, "provisioning");
        sqlx::query(statement).execute(&mut *conn).await?;
    }
    Ok(statements)
}
