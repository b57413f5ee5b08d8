//! Trigger installation.
//!
//! Capture logic lives in a handful of shared PL/pgSQL functions. Each
//! tracked table gets four triggers calling them, with the tracked columns
//! passed as trigger arguments, so no per-table procedure text is generated.
//!
//! The uid is compared and logged as text, so mirrored tables may declare
//! it as any character type or as `uuid`.
//!
//! The origin of a write is taken from the transaction-local setting
//! `mirror.origin` when present, and otherwise inferred from
//! `lastActivityTime` the same way the engine does.

use crate::db::sql::{quote_ident, quote_literal};
use mirror_engine::{
    rules::RuleKind,
    schema::{ACTIVITY_COLUMN, LOCAL_DELETE_TABLE, LOCAL_INSERT_TABLE, LOCAL_UPDATE_TABLE},
    RuleSet,
};
use sqlx::PgConnection;

/// Setting carrying an explicit write origin for the current transaction.
pub const ORIGIN_SETTING: &str = "mirror.origin";

/// Function behind each rule kind.
pub fn function_name(kind: RuleKind) -> &'static str {
    match kind {
        RuleKind::AssignUid => "mirror_assign_uid",
        RuleKind::CaptureInsert => "mirror_capture_insert",
        RuleKind::CaptureUpdate => "mirror_capture_update",
        RuleKind::CaptureDelete => "mirror_capture_delete",
    }
}

/// `CREATE OR REPLACE FUNCTION` statements for the shared capture functions.
pub fn function_statements() -> Vec<String> {
    let activity = quote_literal(ACTIVITY_COLUMN);
    let insert_log = quote_ident(LOCAL_INSERT_TABLE);
    let update_log = quote_ident(LOCAL_UPDATE_TABLE);
    let delete_log = quote_ident(LOCAL_DELETE_TABLE);

    vec![
        format!(
            r#"CREATE OR REPLACE FUNCTION mirror_origin(inferred text) RETURNS text
LANGUAGE sql STABLE AS $fn$
    SELECT coalesce(nullif(current_setting('{ORIGIN_SETTING}', true), ''), inferred)
$fn$"#
        ),
        r#"CREATE OR REPLACE FUNCTION mirror_assign_uid() RETURNS trigger
LANGUAGE plpgsql AS $fn$
BEGIN
    IF NEW.uid IS NULL OR NEW.uid::text = '' THEN
        NEW.uid := gen_random_uuid()::text;
    END IF;
    RETURN NEW;
END
$fn$"#
            .to_string(),
        format!(
            r#"CREATE OR REPLACE FUNCTION mirror_capture_insert() RETURNS trigger
LANGUAGE plpgsql AS $fn$
DECLARE
    inferred text := CASE WHEN (to_jsonb(NEW) ->> {activity}) IS NULL
                          THEN 'local' ELSE 'sync_applied' END;
BEGIN
    IF mirror_origin(inferred) <> 'local' THEN
        RETURN NULL;
    END IF;
    INSERT INTO {insert_log} (table_name, uid) VALUES (TG_TABLE_NAME, NEW.uid::text)
        ON CONFLICT DO NOTHING;
    DELETE FROM {delete_log} WHERE table_name = TG_TABLE_NAME AND uid = NEW.uid::text;
    DELETE FROM {update_log} WHERE table_name = TG_TABLE_NAME AND uid = NEW.uid::text;
    RETURN NULL;
END
$fn$"#
        ),
        format!(
            r#"CREATE OR REPLACE FUNCTION mirror_capture_update() RETURNS trigger
LANGUAGE plpgsql AS $fn$
DECLARE
    old_row jsonb := to_jsonb(OLD);
    new_row jsonb := to_jsonb(NEW);
    inferred text := CASE WHEN (old_row -> {activity}) IS NOT DISTINCT FROM (new_row -> {activity})
                          THEN 'local' ELSE 'sync_applied' END;
    col text;
BEGIN
    IF mirror_origin(inferred) <> 'local' THEN
        RETURN NULL;
    END IF;
    FOR i IN 0 .. TG_NARGS - 1 LOOP
        col := TG_ARGV[i];
        IF (old_row -> col) IS DISTINCT FROM (new_row -> col) THEN
            INSERT INTO {update_log} (table_name, uid, field_name)
                VALUES (TG_TABLE_NAME, NEW.uid::text, col)
                ON CONFLICT DO NOTHING;
        END IF;
    END LOOP;
    RETURN NULL;
END
$fn$"#
        ),
        format!(
            r#"CREATE OR REPLACE FUNCTION mirror_capture_delete() RETURNS trigger
LANGUAGE plpgsql AS $fn$
DECLARE
    remote_id text := to_jsonb(OLD) ->> 'id';
BEGIN
    IF mirror_origin('local') = 'local' AND remote_id IS NOT NULL THEN
        INSERT INTO {delete_log} (table_name, uid, id)
            VALUES (TG_TABLE_NAME, OLD.uid::text, remote_id)
            ON CONFLICT (table_name, uid) DO UPDATE SET id = EXCLUDED.id;
    END IF;
    DELETE FROM {insert_log} WHERE table_name = TG_TABLE_NAME AND uid = OLD.uid::text;
    DELETE FROM {update_log} WHERE table_name = TG_TABLE_NAME AND uid = OLD.uid::text;
    RETURN OLD;
END
$fn$"#
        ),
    ]
}

/// `DROP` then `CREATE` statements for every rule of a table.
pub fn trigger_statements(rules: &RuleSet) -> Vec<String> {
    let table = quote_ident(&rules.table);
    let mut statements = Vec::with_capacity(rules.rules.len() * 2);

    for rule in &rules.rules {
        let name = quote_ident(&rule.name);
        let args = match rule.kind {
            RuleKind::CaptureUpdate => rules
                .capture
                .tracked_columns
                .iter()
                .map(|c| quote_literal(c))
                .collect::<Vec<_>>()
                .join(", "),
            _ => String::new(),
        };

        statements.push(format!("DROP TRIGGER IF EXISTS {name} ON {table}"));
        statements.push(format!(
            "CREATE TRIGGER {name} {} {} ON {table} FOR EACH ROW EXECUTE FUNCTION {}({args})",
            rule.kind.timing(),
            rule.kind.event(),
            function_name(rule.kind),
        ));
    }
    statements
}

/// Create or replace the shared capture functions.
pub async fn install_functions(conn: &mut PgConnection) -> Result<(), sqlx::Error> {
    for statement in function_statements() {
        sqlx::query(&statement).execute(&mut *conn).await?;
    }
    Ok(())
}

/// Replace the triggers of a table with `rules`.
pub async fn replace_triggers(conn: &mut PgConnection, rules: &RuleSet) -> Result<(), sqlx::Error> {
    for statement in trigger_statements(rules) {
        tracing::debug!(table = %rules.table, %statement, "replacing trigger");
        sqlx::query(&statement).execute(&mut *conn).await?;
    }
    Ok(())
}

/// Names of the triggers currently attached to a table.
pub async fn trigger_names(conn: &mut PgConnection, table: &str) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        SELECT DISTINCT trigger_name::text
        FROM information_schema.triggers
        WHERE event_object_schema = current_schema() AND event_object_table = $1
        ORDER BY 1
        "#,
    )
    .bind(table)
    .fetch_all(conn)
    .await
}

/// Rules of the set that are not among the installed trigger names.
pub fn missing_rules<'a>(rules: &'a RuleSet, installed: &[String]) -> Vec<&'a str> {
    rules
        .rules
        .iter()
        .map(|rule| rule.name.as_str())
        .filter(|name| !installed.iter().any(|i| i == name))
        .collect()
}
