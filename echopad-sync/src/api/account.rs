//! Auth Service + device/account routes (spec §4.5, §6).

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use echopad_sync_core::error::SyncError;
use echopad_sync_core::model::{Device, DeviceType, User};
use echopad_sync_core::rate_limit::RateLimitOutcome;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::extractors::{client_ip, AuthContext};
use crate::api::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/salt", get(salt))
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/logout", post(logout))
        .route("/devices", get(list_devices))
        .route("/devices/{id}", delete(revoke_device))
        .route("/account", get(profile).delete(delete_account))
        .route("/account/usage", get(usage))
}

#[derive(Deserialize)]
pub struct SaltQuery {
    pub email: String,
}

#[derive(Serialize)]
pub struct SaltResponse {
    pub salt: String,
}

async fn salt(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
    Query(q): Query<SaltQuery>,
) -> Result<Json<SaltResponse>, ApiError> {
    let ip = client_ip(&headers);
    rate_limit(&state, "password_reset", &ip).await?;
    let salt = state.auth.salt(&q.email).await?;
    Ok(Json(SaltResponse { salt }))
}

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default = "default_device_name")]
    pub device_name: String,
    #[serde(default)]
    pub device_type: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    #[serde(default = "default_device_name")]
    pub device_name: String,
    #[serde(default)]
    pub device_type: Option<String>,
}

fn default_device_name() -> String {
    "unnamed device".to_string()
}

#[derive(Serialize)]
pub struct AuthResponse {
    pub user_id: Uuid,
    pub device_id: Uuid,
    pub access_token: String,
    pub refresh_token: String,
}

async fn register(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    let ip = client_ip(&headers);
    rate_limit(&state, "register", &ip).await?;

    let device_type = req.device_type.as_deref().map(DeviceType::from_str).unwrap_or(DeviceType::Desktop);
    let (user, device, tokens) = state.auth.register(&req.email, &req.password, &req.device_name, device_type).await?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            user_id: user.id,
            device_id: device.id,
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
        }),
    ))
}

async fn login(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let ip = client_ip(&headers);
    rate_limit(&state, "login", &ip).await?;

    let device_type = req.device_type.as_deref().map(DeviceType::from_str).unwrap_or(DeviceType::Desktop);
    let (user, device, tokens) = state.auth.login(&req.email, &req.password, &req.device_name, device_type).await?;

    Ok(Json(AuthResponse {
        user_id: user.id,
        device_id: device.id,
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
    }))
}

#[derive(Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Serialize)]
pub struct RefreshResponse {
    pub access_token: String,
    pub refresh_token: String,
}

async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<RefreshResponse>, ApiError> {
    let tokens = state.auth.refresh(&req.refresh_token).await?;
    Ok(Json(RefreshResponse { access_token: tokens.access_token, refresh_token: tokens.refresh_token }))
}

async fn logout(State(state): State<AppState>, auth: AuthContext) -> Result<StatusCode, ApiError> {
    state.auth.logout(auth.user_id, auth.device_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Serialize)]
pub struct DeviceResponse {
    pub id: Uuid,
    pub device_name: String,
    pub device_type: String,
    pub last_sync_at: Option<chrono::DateTime<chrono::Utc>>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub revoked_at: Option<chrono::DateTime<chrono::Utc>>,
    pub is_current: bool,
}

impl DeviceResponse {
    fn from(device: Device, current_device_id: Uuid) -> Self {
        Self {
            is_current: device.id == current_device_id,
            id: device.id,
            device_name: device.device_name,
            device_type: device.device_type,
            last_sync_at: device.last_sync_at,
            created_at: device.created_at,
            revoked_at: device.revoked_at,
        }
    }
}

async fn list_devices(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<Vec<DeviceResponse>>, ApiError> {
    let devices = state.auth.list_devices(auth.user_id).await?;
    Ok(Json(devices.into_iter().map(|d| DeviceResponse::from(d, auth.device_id)).collect()))
}

async fn revoke_device(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.auth.revoke_device(auth.user_id, auth.device_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Serialize)]
pub struct ProfileResponse {
    pub id: Uuid,
    pub email: String,
    pub salt: String,
    pub email_verified: bool,
    pub subscription_tier: String,
    pub storage_quota_bytes: i64,
    pub storage_used_bytes: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<User> for ProfileResponse {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            email: u.email,
            salt: u.salt,
            email_verified: u.email_verified,
            subscription_tier: u.subscription_tier,
            storage_quota_bytes: u.storage_quota_bytes,
            storage_used_bytes: u.storage_used_bytes,
            created_at: u.created_at,
        }
    }
}

async fn profile(State(state): State<AppState>, auth: AuthContext) -> Result<Json<ProfileResponse>, ApiError> {
    let user = state.auth.profile(auth.user_id).await?;
    Ok(Json(user.into()))
}

async fn delete_account(State(state): State<AppState>, auth: AuthContext) -> Result<StatusCode, ApiError> {
    state.auth.delete_account(auth.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Serialize)]
pub struct UsageResponse {
    pub storage_used_bytes: i64,
    pub storage_quota_bytes: i64,
}

async fn usage(State(state): State<AppState>, auth: AuthContext) -> Result<Json<UsageResponse>, ApiError> {
    let (used, quota) = state.auth.usage(auth.user_id).await?;
    Ok(Json(UsageResponse { storage_used_bytes: used, storage_quota_bytes: quota }))
}

async fn rate_limit(state: &AppState, action: &str, identifier: &str) -> Result<(), ApiError> {
    match state.rate_limiter.check(action, identifier).await.map_err(SyncError::Internal)? {
        RateLimitOutcome::Allowed => Ok(()),
        RateLimitOutcome::Limited { retry_after_secs } => Err(SyncError::RateLimited { retry_after_secs }.into()),
    }
}
