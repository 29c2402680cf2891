//! Sync Engine routes — pull/push/confirm/status (spec §4.4, §6). Thin:
//! extract, call `SyncEngine`, map the result to the wire shape. Per-change
//! verdicts always ride in the `200` body (spec §7); only authorization,
//! rate-limiting, and infra failures surface as HTTP-level errors.

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use echopad_sync_core::error::SyncError;
use echopad_sync_core::model::{PullChange, SyncChange, SyncVerdict};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::extractors::AuthContext;
use crate::api::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/vaults/{id}/sync/pull", post(pull))
        .route("/vaults/{id}/sync/push", post(push))
        .route("/vaults/{id}/sync/confirm", post(confirm))
        .route("/vaults/{id}/sync/status", get(status))
}

#[derive(Deserialize)]
pub struct PullRequest {
    #[serde(default)]
    pub cursor: Option<String>,
    #[serde(default = "default_pull_limit")]
    pub limit: i64,
}

fn default_pull_limit() -> i64 {
    100
}

#[derive(Serialize)]
pub struct PullResponseBody {
    pub changes: Vec<PullChange>,
    pub has_more: bool,
    pub next_cursor: Option<String>,
}

async fn pull(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(vault_id): Path<Uuid>,
    Json(req): Json<PullRequest>,
) -> Result<Json<PullResponseBody>, ApiError> {
    let resp = state.sync.pull(auth.user_id, vault_id, req.cursor.as_deref(), req.limit).await?;
    Ok(Json(PullResponseBody { changes: resp.changes, has_more: resp.has_more, next_cursor: resp.next_cursor }))
}

#[derive(Deserialize)]
pub struct PushRequest {
    pub changes: Vec<SyncChange>,
}

#[derive(Serialize)]
pub struct PushResultEntry {
    pub encrypted_path: String,
    #[serde(flatten)]
    pub verdict: SyncVerdict,
}

#[derive(Serialize)]
pub struct PushResponseBody {
    pub results: Vec<PushResultEntry>,
}

async fn push(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(vault_id): Path<Uuid>,
    Json(req): Json<PushRequest>,
) -> Result<Json<PushResponseBody>, ApiError> {
    if req.changes.is_empty() {
        return Err(SyncError::InvalidChanges.into());
    }
    let outcomes = state.sync.push(auth.user_id, vault_id, req.changes).await?;
    Ok(Json(PushResponseBody {
        results: outcomes
            .into_iter()
            .map(|o| PushResultEntry { encrypted_path: o.encrypted_path, verdict: o.verdict })
            .collect(),
    }))
}

#[derive(Deserialize)]
pub struct ConfirmRequest {
    pub file_ids: Vec<Uuid>,
}

#[derive(Serialize)]
pub struct ConfirmResponseBody {
    pub confirmed: Vec<Uuid>,
    pub failed: Vec<Uuid>,
}

async fn confirm(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(vault_id): Path<Uuid>,
    Json(req): Json<ConfirmRequest>,
) -> Result<Json<ConfirmResponseBody>, ApiError> {
    if req.file_ids.is_empty() {
        return Err(SyncError::InvalidFileIds.into());
    }
    let resp = state.sync.confirm(auth.user_id, vault_id, &req.file_ids).await?;
    Ok(Json(ConfirmResponseBody { confirmed: resp.confirmed, failed: resp.failed }))
}

#[derive(Serialize)]
pub struct StatusResponseBody {
    pub file_count: i64,
    pub total_size_bytes: i64,
    pub last_modified: Option<i64>,
}

async fn status(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(vault_id): Path<Uuid>,
) -> Result<Json<StatusResponseBody>, ApiError> {
    let status = state.sync.status(auth.user_id, vault_id).await?;
    Ok(Json(StatusResponseBody {
        file_count: status.file_count,
        total_size_bytes: status.total_size_bytes,
        last_modified: status.last_modified,
    }))
}
