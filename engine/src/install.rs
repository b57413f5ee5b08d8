//! Installing tracking on a mirrored table.
//!
//! Installation is split between two collaborators the host provides: a
//! [`SchemaProvisioner`] that creates or updates tables from a desired
//! definition, and a [`RuleHost`] that attaches rules to a table. Both must
//! be idempotent, so installing twice leaves the host unchanged.

use crate::{
    error::Result,
    rules::MAX_RULE_NAME_LENGTH,
    schema::{tracking_tables, LOCAL_DELETE_TABLE, LOCAL_INSERT_TABLE, LOCAL_UPDATE_TABLE},
    Error, RuleSet, TableDef, TableName,
};
use serde::{Deserialize, Serialize};

/// Creates or updates tables to match a desired definition.
pub trait SchemaProvisioner {
    /// Make the table match `table`, creating it if needed.
    fn ensure_or_update_table(&mut self, table: &TableDef) -> Result<()>;
}

/// Attaches rules to mirrored tables.
pub trait RuleHost {
    /// Attach `rules` to their table, replacing any rules with the same names.
    fn replace_rules(&mut self, rules: RuleSet) -> Result<()>;
}

/// Everything needed to install tracking on one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallPlan {
    /// Log tables to provision
    pub log_tables: Vec<TableDef>,
    /// Rules to attach
    pub rules: RuleSet,
}

impl InstallPlan {
    /// Validate a mirrored table definition and plan its installation.
    ///
    /// Tables whose rule names would not survive intact on the host are
    /// rejected.
    pub fn for_table(table: &TableDef) -> Result<Self> {
        table.validate_mirrored()?;

        let rules = RuleSet::for_table(table);
        if let Some(name) = rules.overlong_name() {
            return Err(Error::InvalidDefinition {
                table: table.name.clone(),
                reason: format!(
                    "rule name '{name}' is longer than {MAX_RULE_NAME_LENGTH} bytes"
                ),
            });
        }

        Ok(Self {
            log_tables: tracking_tables().to_vec(),
            rules,
        })
    }
}

/// Summary of a completed installation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallReport {
    /// Table tracking was installed on
    pub table: TableName,
    /// Log tables provisioned
    pub log_tables: Vec<TableName>,
    /// Rules attached, in installation order
    pub rules: Vec<String>,
    /// Columns tracked by the update rule
    pub tracked_columns: Vec<String>,
}

/// Provision the three log tables.
pub fn ensure_schema<P>(provisioner: &mut P) -> Result<Vec<TableName>>
where
    P: SchemaProvisioner + ?Sized,
{
    let mut provisioned = Vec::with_capacity(3);
    for table in tracking_tables() {
        provisioner.ensure_or_update_table(&table)?;
        provisioned.push(table.name);
    }
    Ok(provisioned)
}

/// Install change tracking on a mirrored table.
///
/// Provisions the shared log schema, then attaches or replaces the uid
/// assignment rule and the three capture rules. Any failure aborts the
/// install and is returned as is.
pub fn install_tracking<H>(host: &mut H, table: &TableDef) -> Result<InstallReport>
where
    H: SchemaProvisioner + RuleHost + ?Sized,
{
    let plan = InstallPlan::for_table(table)?;

    let mut log_tables = Vec::with_capacity(plan.log_tables.len());
    for log_table in &plan.log_tables {
        host.ensure_or_update_table(log_table)?;
        log_tables.push(log_table.name.clone());
    }

    let report = InstallReport {
        table: table.name.clone(),
        log_tables,
        rules: plan.rules.names(),
        tracked_columns: plan.rules.capture.tracked_columns.clone(),
    };

    host.replace_rules(plan.rules)?;

    tracing::info!(
        table = %report.table,
        rules = report.rules.len(),
        tracked = report.tracked_columns.len(),
        "installed change tracking"
    );
    Ok(report)
}

/// Whether a table name belongs to the tracking schema.
pub fn is_log_table(name: &str) -> bool {
    matches!(
        name,
        LOCAL_INSERT_TABLE | LOCAL_UPDATE_TABLE | LOCAL_DELETE_TABLE
    )
}
