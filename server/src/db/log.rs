//! Queries against the log tables.

use mirror_engine::{DeleteEntry, InsertEntry, TableChanges, UpdateEntry};
use sqlx::{PgPool, Row};

/// Insert entries of a table.
pub async fn inserts(pool: &PgPool, table: &str) -> Result<Vec<InsertEntry>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT table_name, uid FROM local_insert
        WHERE table_name = $1
        ORDER BY uid
        "#,
    )
    .bind(table)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(InsertEntry::new(
                row.try_get::<String, _>("table_name")?,
                row.try_get::<String, _>("uid")?,
            ))
        })
        .collect()
}

/// Update entries of a table.
pub async fn updates(pool: &PgPool, table: &str) -> Result<Vec<UpdateEntry>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT table_name, uid, field_name FROM local_update
        WHERE table_name = $1
        ORDER BY uid, field_name
        "#,
    )
    .bind(table)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(UpdateEntry::new(
                row.try_get::<String, _>("table_name")?,
                row.try_get::<String, _>("uid")?,
                row.try_get::<String, _>("field_name")?,
            ))
        })
        .collect()
}

/// Delete entries of a table.
pub async fn deletes(pool: &PgPool, table: &str) -> Result<Vec<DeleteEntry>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT table_name, uid, id FROM local_delete
        WHERE table_name = $1
        ORDER BY uid
        "#,
    )
    .bind(table)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(DeleteEntry::new(
                row.try_get::<String, _>("table_name")?,
                row.try_get::<String, _>("uid")?,
                row.try_get::<Option<String>, _>("id")?,
            ))
        })
        .collect()
}

/// All pending changes of a table, folded per row.
pub async fn table_changes(pool: &PgPool, table: &str) -> Result<TableChanges, sqlx::Error> {
    Ok(TableChanges::from_entries(
        table,
        inserts(pool, table).await?,
        updates(pool, table).await?,
        deletes(pool, table).await?,
    ))
}

/// Remove an insert entry. Returns whether it existed.
pub async fn remove_insert(pool: &PgPool, table: &str, uid: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM local_insert WHERE table_name = $1 AND uid = $2")
        .bind(table)
        .bind(uid)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Remove one update entry. Returns whether it existed.
pub async fn remove_update(
    pool: &PgPool,
    table: &str,
    uid: &str,
    field: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "DELETE FROM local_update WHERE table_name = $1 AND uid = $2 AND field_name = $3",
    )
    .bind(table)
    .bind(uid)
    .bind(field)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Remove a delete entry. Returns whether it existed.
pub async fn remove_delete(pool: &PgPool, table: &str, uid: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM local_delete WHERE table_name = $1 AND uid = $2")
        .bind(table)
        .bind(uid)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
