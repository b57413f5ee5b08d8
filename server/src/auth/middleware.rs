//! Authentication middleware.
//!
//! Admin routes take a Bearer token. When `AUTH_SECRET` is configured the
//! token must match it; without a secret the routes are open.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use crate::error::AppError;
use crate::AppState;

/// Guard for admin routes: extracting it succeeds only for authorized callers.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser;

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok());

        let Some(secret) = state.config.auth_secret.as_deref() else {
            return Ok(AuthUser);
        };

        match auth_header.and_then(|h| h.strip_prefix("Bearer ")) {
            Some(token) if token == secret => Ok(AuthUser),
            Some(_) => {
                tracing::warn!("rejected request with invalid bearer token");
                Err(AppError::Unauthorized)
            }
            None => Err(AppError::Unauthorized),
        }
    }
}
