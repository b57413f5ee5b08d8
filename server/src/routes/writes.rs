//! Write routes.

use axum::{extract::State, routing::post, Json, Router};
use mirror_engine::Write;

use crate::auth::AuthUser;
use crate::error::Result;
use crate::handlers::{handle_write, WriteResponse};
use crate::AppState;

/// Create write routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/writes", post(write_handler))
}

/// POST /writes - Apply a write, tagged with its origin when given.
async fn write_handler(
    State(state): State<AppState>,
    _auth: AuthUser,
    Json(write): Json<Write>,
) -> Result<Json<WriteResponse>> {
    let response = handle_write(&state.pool, write).await?;
    Ok(Json(response))
}
