//! HTTP route definitions.

mod changes;
mod health;
mod tracking;
mod writes;

use crate::AppState;
use axum::Router;

/// Create all application routes.
pub fn create_routes() -> Router<AppState> {
    Router::new()
        .merge(health::routes())
        .merge(tracking::routes())
        .merge(changes::routes())
        .merge(writes::routes())
}
