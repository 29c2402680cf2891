//! Vault Service routes (spec §4.7, §6).

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use echopad_sync_core::model::Vault;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::extractors::AuthContext;
use crate::api::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/vaults", get(list).post(create))
        .route("/vaults/{id}", get(get_vault).delete(delete_vault))
        .route("/vaults/{id}/key", get(get_key).put(put_key))
}

#[derive(Serialize)]
pub struct VaultResponse {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Vault> for VaultResponse {
    fn from(v: Vault) -> Self {
        Self { id: v.id, name: v.name, created_at: v.created_at, updated_at: v.updated_at }
    }
}

async fn list(State(state): State<AppState>, auth: AuthContext) -> Result<Json<Vec<VaultResponse>>, ApiError> {
    let vaults = state.vaults.list(auth.user_id).await?;
    Ok(Json(vaults.into_iter().map(Into::into).collect()))
}

#[derive(Deserialize)]
pub struct CreateVaultRequest {
    pub name: String,
    #[serde(default)]
    pub encrypted_key: Option<String>,
    #[serde(default)]
    pub key_nonce: Option<String>,
}

async fn create(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateVaultRequest>,
) -> Result<(StatusCode, Json<VaultResponse>), ApiError> {
    let initial_key = match (req.encrypted_key, req.key_nonce) {
        (Some(k), Some(n)) => Some((k, n)),
        _ => None,
    };
    let vault = state.vaults.create(auth.user_id, &req.name, initial_key).await?;
    Ok((StatusCode::CREATED, Json(vault.into())))
}

async fn get_vault(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<VaultResponse>, ApiError> {
    let vault = state.vaults.get(auth.user_id, id).await?;
    Ok(Json(vault.into()))
}

async fn delete_vault(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.vaults.delete(auth.user_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Serialize)]
pub struct VaultKeyResponse {
    pub encrypted_key: String,
    pub key_nonce: String,
}

async fn get_key(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<VaultKeyResponse>, ApiError> {
    let key = state.vaults.get_key(auth.user_id, id).await?;
    Ok(Json(VaultKeyResponse { encrypted_key: key.encrypted_key, key_nonce: key.key_nonce }))
}

#[derive(Deserialize)]
pub struct PutVaultKeyRequest {
    pub encrypted_key: String,
    pub key_nonce: String,
}

async fn put_key(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<PutVaultKeyRequest>,
) -> Result<StatusCode, ApiError> {
    state.vaults.put_key(auth.user_id, id, &req.encrypted_key, &req.key_nonce).await?;
    Ok(StatusCode::NO_CONTENT)
}
