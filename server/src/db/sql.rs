//! SQL rendering helpers.

use mirror_engine::{ColumnDef, ColumnType};

/// Quote an identifier for Postgres.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a string literal for Postgres.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Comma-separated list of quoted identifiers.
pub fn ident_list<I, S>(names: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names
        .into_iter()
        .map(|n| quote_ident(n.as_ref()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// The Postgres type of a column.
pub fn sql_type(column_type: ColumnType) -> String {
    match column_type {
        ColumnType::String { length } => format!("varchar({length})"),
        ColumnType::Text => "text".to_string(),
        ColumnType::Int => "bigint".to_string(),
        ColumnType::Float => "double precision".to_string(),
        ColumnType::Bool => "boolean".to_string(),
        ColumnType::Timestamp => "timestamp".to_string(),
        ColumnType::Json => "jsonb".to_string(),
    }
}

/// A column as it appears in `CREATE TABLE` or `ADD COLUMN`.
pub fn column_sql(column: &ColumnDef) -> String {
    let mut sql = format!(
        "{} {}",
        quote_ident(&column.name),
        sql_type(column.column_type)
    );
    if !column.nullable {
        sql.push_str(" NOT NULL");
    }
    sql
}
