//! Write handler - applies writes to mirrored tables.

use crate::db;
use crate::error::Result;
use mirror_engine::{Origin, Uid, Write};
use serde::Serialize;
use sqlx::PgPool;

/// Response for an applied write.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteResponse {
    /// The affected row
    pub uid: Uid,
    /// Explicit origin the write carried, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<Origin>,
}

/// Apply one write.
pub async fn handle_write(pool: &PgPool, write: Write) -> Result<WriteResponse> {
    let uid = db::writes::apply_write(pool, &write).await?;
    Ok(WriteResponse {
        uid,
        origin: write.origin,
    })
}
