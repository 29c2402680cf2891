//! Domain error type shared by every service in this crate.
//!
//! Handlers in `echopad-sync` map each variant to the HTTP status and
//! `code` string from the wire protocol's error table. Variants carry no
//! reference to the HTTP layer so the core crate stays transport-agnostic.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("invalid JSON body")]
    InvalidJson,
    #[error("missing required fields")]
    MissingFields,
    #[error("missing email")]
    MissingEmail,
    #[error("invalid email address")]
    InvalidEmail,
    #[error("password must be at least 8 characters")]
    PasswordTooShort,
    #[error("email already registered")]
    EmailExists,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("missing bearer token")]
    MissingToken,
    #[error("invalid or expired token")]
    InvalidToken,
    #[error("unauthorized")]
    Unauthorized,
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
    #[error("vault not found")]
    VaultNotFound,
    #[error("file not found")]
    FileNotFound,
    #[error("content not found")]
    ContentNotFound,
    #[error("key not found")]
    KeyNotFound,
    #[error("user not found")]
    UserNotFound,
    #[error("device not found")]
    DeviceNotFound,
    #[error("cannot revoke the current device")]
    CannotRevokeCurrent,
    #[error("invalid cursor")]
    InvalidCursor,
    #[error("invalid changes payload")]
    InvalidChanges,
    #[error("invalid file id list")]
    InvalidFileIds,
    #[error("empty upload body")]
    EmptyContent,
    #[error("storage quota exceeded")]
    StorageQuotaExceeded,
    #[error("not found")]
    NotFound,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl SyncError {
    /// The stable `code` string returned in the `{error, code, details?}` envelope.
    pub fn code(&self) -> &'static str {
        match self {
            SyncError::InvalidJson => "INVALID_JSON",
            SyncError::MissingFields => "MISSING_FIELDS",
            SyncError::MissingEmail => "MISSING_EMAIL",
            SyncError::InvalidEmail => "INVALID_EMAIL",
            SyncError::PasswordTooShort => "PASSWORD_TOO_SHORT",
            SyncError::EmailExists => "EMAIL_EXISTS",
            SyncError::InvalidCredentials => "INVALID_CREDENTIALS",
            SyncError::MissingToken => "MISSING_TOKEN",
            SyncError::InvalidToken => "INVALID_TOKEN",
            SyncError::Unauthorized => "UNAUTHORIZED",
            SyncError::RateLimited { .. } => "RATE_LIMITED",
            SyncError::VaultNotFound => "VAULT_NOT_FOUND",
            SyncError::FileNotFound => "FILE_NOT_FOUND",
            SyncError::ContentNotFound => "CONTENT_NOT_FOUND",
            SyncError::KeyNotFound => "KEY_NOT_FOUND",
            SyncError::UserNotFound => "USER_NOT_FOUND",
            SyncError::DeviceNotFound => "DEVICE_NOT_FOUND",
            SyncError::CannotRevokeCurrent => "CANNOT_REVOKE_CURRENT",
            SyncError::InvalidCursor => "INVALID_CURSOR",
            SyncError::InvalidChanges => "INVALID_CHANGES",
            SyncError::InvalidFileIds => "INVALID_FILE_IDS",
            SyncError::EmptyContent => "EMPTY_CONTENT",
            SyncError::StorageQuotaExceeded => "STORAGE_QUOTA_EXCEEDED",
            SyncError::NotFound => "NOT_FOUND",
            SyncError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
