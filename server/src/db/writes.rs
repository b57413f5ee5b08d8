//! Writes against mirrored tables with an explicit origin.
//!
//! The sync process applies remote state inside a transaction opened with
//! [`begin_with_origin`]. The origin travels as the transaction-local
//! setting read by the capture functions, so it cannot leak into other
//! sessions and ends with the transaction.

use crate::db::catalog;
use crate::db::sql::{ident_list, quote_ident};
use crate::db::triggers::ORIGIN_SETTING;
use crate::error::{AppError, Result};
use mirror_engine::{
    install::is_log_table, schema::UID_COLUMN, Error, Mutation, Origin, Row, TableDef, Uid, Write,
};
use sqlx::{PgPool, Postgres, Transaction};

/// Value of the origin setting for an origin.
pub fn origin_value(origin: Origin) -> &'static str {
    match origin {
        Origin::Local => "local",
        Origin::SyncApplied => "sync_applied",
    }
}

/// Open a transaction, tagging its writes with `origin` when given.
pub async fn begin_with_origin(
    pool: &PgPool,
    origin: Option<Origin>,
) -> std::result::Result<Transaction<'static, Postgres>, sqlx::Error> {
    let mut tx = pool.begin().await?;
    if let Some(origin) = origin {
        sqlx::query("SELECT set_config($1, $2, true)")
            .bind(ORIGIN_SETTING)
            .bind(origin_value(origin))
            .execute(&mut *tx)
            .await?;
    }
    Ok(tx)
}

/// Open a transaction whose writes are never captured.
pub async fn begin_sync_applied(
    pool: &PgPool,
) -> std::result::Result<Transaction<'static, Postgres>, sqlx::Error> {
    begin_with_origin(pool, Some(Origin::SyncApplied)).await
}

/// The statement applying a mutation.
///
/// Row values are bound as one JSON object in `$1` and expanded with
/// `jsonb_populate_record`, so column types follow the table's own. The uid
/// of an update is `$2`; a delete, or an update without changes, binds only
/// the uid as `$1`. Uids are matched as text whatever the column type.
pub fn mutation_sql(table: &str, mutation: &Mutation) -> String {
    let t = quote_ident(table);
    let uid = quote_ident(UID_COLUMN);

    match mutation {
        Mutation::Insert { row } => {
            let columns: Vec<&String> = row.columns().map(|(c, _)| c).collect();
            if columns.is_empty() {
                return format!("INSERT INTO {t} DEFAULT VALUES RETURNING {uid}::text");
            }
            let list = ident_list(&columns);
            format!(
                "INSERT INTO {t} ({list}) SELECT {list} FROM jsonb_populate_record(NULL::{t}, $1) \
                 RETURNING {uid}::text"
            )
        }
        Mutation::Update { changes, .. } => {
            let assignments: Vec<String> = changes
                .columns()
                .map(|(c, _)| {
                    let c = quote_ident(c);
                    format!("{c} = r.{c}")
                })
                .collect();
            if assignments.is_empty() {
                return format!("SELECT {uid}::text FROM {t} WHERE {uid}::text = $1");
            }
            format!(
                "UPDATE {t} SET {} FROM jsonb_populate_record(NULL::{t}, $1) AS r \
                 WHERE {t}.{uid}::text = $2 RETURNING {t}.{uid}::text",
                assignments.join(", ")
            )
        }
        Mutation::Delete { .. } => {
            format!("DELETE FROM {t} WHERE {uid}::text = $1 RETURNING {uid}::text")
        }
    }
}

/// Check a mutation against the table definition.
pub fn check_mutation(def: &TableDef, mutation: &Mutation) -> mirror_engine::error::Result<()> {
    let (row, uid): (Option<&Row>, Option<&Uid>) = match mutation {
        Mutation::Insert { row } => (Some(row), None),
        Mutation::Update { uid, changes } => (Some(changes), Some(uid)),
        Mutation::Delete { uid } => (None, Some(uid)),
    };

    if let Some(row) = row {
        if let Some((column, _)) = row.columns().find(|(c, _)| !def.has_column(c)) {
            return Err(Error::InvalidColumn {
                table: def.name.clone(),
                column: column.clone(),
            });
        }
    }

    if let (Some(row), Some(uid)) = (row, uid) {
        if row.columns().any(|(c, _)| c == UID_COLUMN) && row.uid() != Some(uid.as_str()) {
            return Err(Error::ImmutableColumn {
                column: UID_COLUMN.to_string(),
            });
        }
    }
    Ok(())
}

/// Apply a write to a mirrored table and return the affected uid.
pub async fn apply_write(pool: &PgPool, write: &Write) -> Result<Uid> {
    if is_log_table(&write.table) {
        return Err(AppError::BadRequest(format!(
            "'{}' is a log table",
            write.table
        )));
    }

    let mut tx = begin_with_origin(pool, write.origin).await?;

    let def = catalog::describe_table(&mut *tx, &write.table)
        .await?
        .ok_or_else(|| Error::TableNotFound(write.table.clone()))?;
    check_mutation(&def, &write.mutation)?;

    let sql = mutation_sql(&write.table, &write.mutation);
    let query = sqlx::query_scalar::<_, String>(&sql);
    let (query, uid) = match &write.mutation {
        Mutation::Insert { row } if row.columns().next().is_none() => (query, None),
        Mutation::Insert { row } => (query.bind(serde_json::Value::from(row.clone())), None),
        Mutation::Update { uid, changes } if changes.columns().next().is_none() => {
            (query.bind(uid.clone()), Some(uid))
        }
        Mutation::Update { uid, changes } => (
            query
                .bind(serde_json::Value::from(changes.clone()))
                .bind(uid.clone()),
            Some(uid),
        ),
        Mutation::Delete { uid } => (query.bind(uid.clone()), Some(uid)),
    };

    let affected = query.fetch_optional(&mut *tx).await?;
    let affected = affected.ok_or_else(|| Error::RowNotFound {
        table: write.table.clone(),
        uid: uid.cloned().unwrap_or_default(),
    })?;

    tx.commit().await?;
    tracing::debug!(table = %write.table, uid = %affected, origin = ?write.origin, "write applied");
    Ok(affected)
}
