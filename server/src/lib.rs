//! Mirror Server - Postgres host for local change tracking.
//!
//! Installs the tracking schema and capture triggers into a Postgres
//! database and exposes an admin HTTP surface for the sync process: install
//! tracking on a table, read its pending changes, acknowledge pushed entries
//! and apply writes with an explicit origin.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod routes;

use crate::config::Config;
use crate::db::Pool;
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: Pool,
    pub config: Arc<Config>,
}

/// Build the application router.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(routes::create_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
