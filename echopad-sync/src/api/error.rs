//! Maps `SyncError` to the `{error, code, details?}` envelope and HTTP
//! status from spec §6/§7's status-mapping table. Internal/infra errors
//! are logged at `error!` server-side with full detail and surface to
//! the client only as `INTERNAL_ERROR`, never leaking detail.
//!
//! `SyncError` lives in `echopad-sync-core` and `IntoResponse` lives in
//! `axum` — both foreign to this crate, so neither can be `impl`'d
//! directly against the other (orphan rule). `ApiError` is the local
//! newtype every handler actually returns; it wraps a `SyncError` and
//! is where `IntoResponse` is implemented.

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use echopad_sync_core::error::SyncError;
use serde::Serialize;

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Local wrapper around `SyncError` so `IntoResponse` can be implemented
/// on it without running into the orphan rule. Every handler in this
/// crate returns `Result<_, ApiError>`.
pub struct ApiError(pub SyncError);

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        ApiError(err)
    }
}

fn status_for(err: &SyncError) -> StatusCode {
    match err {
        SyncError::InvalidJson
        | SyncError::MissingFields
        | SyncError::MissingEmail
        | SyncError::InvalidEmail
        | SyncError::PasswordTooShort
        | SyncError::InvalidCursor
        | SyncError::InvalidChanges
        | SyncError::InvalidFileIds
        | SyncError::EmptyContent => StatusCode::BAD_REQUEST,
        SyncError::MissingToken | SyncError::InvalidToken | SyncError::InvalidCredentials | SyncError::Unauthorized => {
            StatusCode::UNAUTHORIZED
        }
        SyncError::VaultNotFound
        | SyncError::FileNotFound
        | SyncError::ContentNotFound
        | SyncError::KeyNotFound
        | SyncError::UserNotFound
        | SyncError::DeviceNotFound
        | SyncError::NotFound => StatusCode::NOT_FOUND,
        SyncError::EmailExists => StatusCode::CONFLICT,
        SyncError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        SyncError::CannotRevokeCurrent => StatusCode::BAD_REQUEST,
        SyncError::StorageQuotaExceeded => StatusCode::OK, // always surfaced in a 200 push body
        SyncError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = self.0;
        let status = status_for(&err);

        if let SyncError::Internal(ref inner) = err {
            tracing::error!(error = %inner, "internal error");
        }

        let message = if matches!(err, SyncError::Internal(_)) {
            "internal error".to_string()
        } else {
            err.to_string()
        };

        let body = ErrorBody { error: message, code: err.code(), details: None };
        let mut response = (status, Json(body)).into_response();

        if let SyncError::RateLimited { retry_after_secs } = err {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response
                    .headers_mut()
                    .insert(HeaderName::from_static("retry-after"), value);
            }
        }

        response
    }
}
