//! Database connection pool management.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Type alias for the database pool.
pub type Pool = PgPool;

/// Create a new database connection pool.
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<Pool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}

/// Create a pool that connects on first use.
pub fn create_lazy_pool(database_url: &str) -> Result<Pool, sqlx::Error> {
    PgPoolOptions::new().max_connections(1).connect_lazy(database_url)
}
