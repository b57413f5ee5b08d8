//! Tracking installation routes.

use axum::{
    extract::{Path, State},
    routing::put,
    Json, Router,
};
use mirror_engine::InstallReport;

use crate::auth::AuthUser;
use crate::error::Result;
use crate::handlers::handle_install;
use crate::AppState;

/// Create tracking routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/tracking/{table}", put(install_handler))
}

/// PUT /tracking/{table} - Install or reinstall tracking on a table.
async fn install_handler(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(table): Path<String>,
) -> Result<Json<InstallReport>> {
    let report = handle_install(&state.pool, &table).await?;
    Ok(Json(report))
}
