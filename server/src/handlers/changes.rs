//! Changes handler - serves and acknowledges pending log entries.

use crate::db;
use crate::error::{AppError, Result};
use mirror_engine::{LogEntry, TableChanges};
use sqlx::PgPool;

/// All pending changes of a table.
pub async fn handle_changes(pool: &PgPool, table: &str) -> Result<TableChanges> {
    let changes = db::log::table_changes(pool, table).await?;
    tracing::debug!(
        table,
        inserts = changes.inserts.len(),
        updates = changes.updates.len(),
        deletes = changes.deletes.len(),
        "served pending changes"
    );
    Ok(changes)
}

/// Remove one log entry after its change was pushed remotely.
///
/// Acknowledging an entry that no longer exists is reported as not found.
pub async fn handle_acknowledge(pool: &PgPool, entry: &LogEntry) -> Result<()> {
    let removed = match entry {
        LogEntry::Insert(e) => db::log::remove_insert(pool, &e.table_name, &e.uid).await?,
        LogEntry::Update(e) => {
            db::log::remove_update(pool, &e.table_name, &e.uid, &e.field_name).await?
        }
        LogEntry::Delete(e) => db::log::remove_delete(pool, &e.table_name, &e.uid).await?,
    };

    if !removed {
        return Err(AppError::NotFound(format!(
            "no pending entry for '{}' in '{}'",
            entry.uid(),
            entry.table_name()
        )));
    }
    tracing::debug!(table = %entry.table_name(), uid = %entry.uid(), "acknowledged");
    Ok(())
}
