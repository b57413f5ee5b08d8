//! Tracking handler - installs change tracking on mirrored tables.

use crate::db::{catalog, provision, triggers};
use crate::error::{AppError, Result};
use mirror_engine::{install::is_log_table, schema::tracking_tables, InstallPlan, InstallReport};
use sqlx::{PgConnection, PgPool};

/// Provision the log tables and shared capture functions.
///
/// Must run inside a transaction; concurrent installers are serialized on
/// an advisory lock held until it ends.
pub async fn ensure_schema(conn: &mut PgConnection) -> Result<Vec<String>> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext('mirror_install'))")
        .execute(&mut *conn)
        .await?;

    let mut tables = Vec::with_capacity(3);
    for table in tracking_tables() {
        provision::ensure_or_update_table(conn, &table).await?;
        tables.push(table.name);
    }
    triggers::install_functions(conn).await?;
    Ok(tables)
}

/// Provision the tracking schema on its own, as done at startup.
pub async fn handle_ensure_schema(pool: &PgPool) -> Result<Vec<String>> {
    let mut tx = pool.begin().await?;
    let tables = ensure_schema(&mut tx).await?;
    tx.commit().await?;
    Ok(tables)
}

/// Install or reinstall tracking on an existing table.
///
/// The table's definition is read from the catalog. Schema provisioning and
/// trigger replacement run in one transaction, committed only once every
/// planned trigger is found on the table, so a failed install leaves the
/// previous triggers in place.
pub async fn handle_install(pool: &PgPool, table: &str) -> Result<InstallReport> {
    if is_log_table(table) {
        return Err(AppError::BadRequest(format!(
            "'{table}' is a log table and cannot be tracked"
        )));
    }

    let mut tx = pool.begin().await?;

    let def = catalog::describe_table(&mut tx, table)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("table '{table}'")))?;
    let plan = InstallPlan::for_table(&def)?;

    let log_tables = ensure_schema(&mut tx).await?;
    triggers::replace_triggers(&mut tx, &plan.rules).await?;

    let installed = triggers::trigger_names(&mut tx, table).await?;
    let missing = triggers::missing_rules(&plan.rules, &installed);
    if !missing.is_empty() {
        return Err(AppError::Internal(format!(
            "triggers missing after install on '{table}': {}",
            missing.join(", ")
        )));
    }
    tx.commit().await?;

    let report = InstallReport {
        table: def.name.clone(),
        log_tables,
        rules: plan.rules.names(),
        tracked_columns: plan.rules.capture.tracked_columns.clone(),
    };

    tracing::info!(
        table = %report.table,
        tracked = report.tracked_columns.len(),
        "installed change tracking"
    );
    Ok(report)
}

/// Install tracking on every configured table.
pub async fn install_configured(pool: &PgPool, tables: &[String]) -> Result<Vec<InstallReport>> {
    let mut reports = Vec::with_capacity(tables.len());
    for table in tables {
        reports.push(handle_install(pool, table).await?);
    }
    Ok(reports)
}
