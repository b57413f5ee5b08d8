//! Mirror Server - Postgres host for local change tracking.

use mirror_server::config::Config;
use mirror_server::{app, db, handlers, AppState};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mirror_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!("Starting Mirror Server on {}:{}", config.host, config.port);

    // Create database pool
    let pool = db::create_pool(&config.database_url, config.database_max_connections).await?;

    // Provision the tracking schema
    tracing::info!("Provisioning tracking schema...");
    handlers::handle_ensure_schema(&pool).await?;

    if !config.tracked_tables.is_empty() {
        let reports = handlers::install_configured(&pool, &config.tracked_tables).await?;
        tracing::info!("Tracking installed on {} table(s)", reports.len());
    }

    // Build application state
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
    };

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app(state)).await?;

    Ok(())
}
