use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use subtle::ConstantTimeEq;
use taskmarket_core::MarketError;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

pub const ADMIN_KEY_HEADER: &str = "x-admin-key";

/// Extractor for requests carrying a valid `Authorization: Bearer` token
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser(pub Uuid);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or(ApiError::Unauthenticated("Missing authentication token"))?;
        let token = header
            .to_str()
            .ok()
            .and_then(|h| h.strip_prefix("Bearer "))
            .ok_or(ApiError::Unauthenticated("Invalid authentication token"))?;
        state
            .sessions
            .resolve(token.trim())
            .map(CurrentUser)
            .ok_or(ApiError::Unauthenticated("Invalid authentication token"))
    }
}

/// Extractor for admin routes; checks `x-admin-key` in constant time.
#[derive(Debug, Clone, Copy)]
pub struct Admin;

#[async_trait]
impl FromRequestParts<AppState> for Admin {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let expected = state.config.admin_key.as_bytes();
        if expected.is_empty() {
            return Err(MarketError::Forbidden("admin API is disabled".to_string()).into());
        }
        let provided = parts
            .headers
            .get(ADMIN_KEY_HEADER)
            .map(|v| v.as_bytes())
            .ok_or(ApiError::Unauthenticated("Missing admin key"))?;
        if bool::from(provided.ct_eq(expected)) {
            Ok(Admin)
        } else {
            tracing::warn!("rejected admin request with a bad key");
            Err(ApiError::Unauthenticated("Invalid admin key"))
        }
    }
}
