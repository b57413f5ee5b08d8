//! Pending change routes.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use mirror_engine::{DeleteEntry, InsertEntry, LogEntry, TableChanges, UpdateEntry};

use crate::auth::AuthUser;
use crate::error::Result;
use crate::handlers::{handle_acknowledge, handle_changes};
use crate::AppState;

/// Create change routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/changes/{table}", get(changes_handler))
        .route("/changes/{table}/inserts/{uid}", delete(ack_insert_handler))
        .route(
            "/changes/{table}/updates/{uid}/{field}",
            delete(ack_update_handler),
        )
        .route("/changes/{table}/deletes/{uid}", delete(ack_delete_handler))
}

/// GET /changes/{table} - Pending changes of a table.
async fn changes_handler(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(table): Path<String>,
) -> Result<Json<TableChanges>> {
    let changes = handle_changes(&state.pool, &table).await?;
    Ok(Json(changes))
}

/// DELETE /changes/{table}/inserts/{uid} - Acknowledge a pushed insert.
async fn ack_insert_handler(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path((table, uid)): Path<(String, String)>,
) -> Result<StatusCode> {
    let entry = LogEntry::Insert(InsertEntry::new(table, uid));
    handle_acknowledge(&state.pool, &entry).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /changes/{table}/updates/{uid}/{field} - Acknowledge a pushed field.
async fn ack_update_handler(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path((table, uid, field)): Path<(String, String, String)>,
) -> Result<StatusCode> {
    let entry = LogEntry::Update(UpdateEntry::new(table, uid, field));
    handle_acknowledge(&state.pool, &entry).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /changes/{table}/deletes/{uid} - Acknowledge a pushed delete.
async fn ack_delete_handler(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path((table, uid)): Path<(String, String)>,
) -> Result<StatusCode> {
    let entry = LogEntry::Delete(DeleteEntry::new(table, uid, None));
    handle_acknowledge(&state.pool, &entry).await?;
    Ok(StatusCode::NO_CONTENT)
}
