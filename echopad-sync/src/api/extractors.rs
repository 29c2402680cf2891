//! Bearer-token auth extractor, grounded on the teacher's
//! `api::distributed::AuthContext` `FromRequestParts` impl: pull the
//! `Authorization` header, verify with the Token Service, reject with
//! `401` on anything else.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::AppState;
use echopad_sync_core::error::SyncError;

#[derive(Clone, Debug)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub device_id: Uuid,
}

impl FromRequestParts<AppState> for AuthContext {
    type Rejection = axum::response::Response;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let into_response = |err: SyncError| {
            use axum::response::IntoResponse;
            ApiError::from(err).into_response()
        };

        let header = parts
            .headers
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| into_response(SyncError::MissingToken))?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| into_response(SyncError::MissingToken))?;

        let claims = state
            .tokens
            .verify_access(token)
            .ok_or_else(|| into_response(SyncError::InvalidToken))?;

        Ok(AuthContext { user_id: claims.sub, device_id: claims.device_id })
    }
}

/// Best-effort client IP, used as the rate-limit identifier for
/// unauthenticated actions (spec §4.3).
pub fn client_ip(headers: &axum::http::HeaderMap) -> String {
    headers
        .get("X-Real-IP")
        .or_else(|| headers.get("X-Forwarded-For"))
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(',').next().unwrap_or(v).trim().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
