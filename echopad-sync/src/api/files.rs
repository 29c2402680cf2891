//! File Transfer routes — raw `application/octet-stream` upload/download,
//! distinct from the JSON routes elsewhere (spec §6, §4.6).

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, put};
use axum::Router;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::extractors::AuthContext;
use crate::api::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/vaults/{vault_id}/files/{file_id}/upload", put(upload))
        .route("/vaults/{vault_id}/files/{file_id}/download", get(download))
        .route("/vaults/{vault_id}/files/{file_id}", delete(delete_file))
}

async fn upload(
    State(state): State<AppState>,
    auth: AuthContext,
    Path((vault_id, file_id)): Path<(Uuid, Uuid)>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let result = state.files.upload(auth.user_id, vault_id, file_id, body.to_vec()).await?;

    let body = serde_json::json!({
        "encrypted_content_hash": result.encrypted_content_hash,
        "size_bytes": result.size_bytes,
        "version": result.version,
    });
    Ok((StatusCode::OK, axum::Json(body)).into_response())
}

async fn download(
    State(state): State<AppState>,
    auth: AuthContext,
    Path((vault_id, file_id)): Path<(Uuid, Uuid)>,
) -> Result<Response, ApiError> {
    let result = state.files.download(auth.user_id, vault_id, file_id).await?;

    let mut response = (StatusCode::OK, result.bytes).into_response();
    response.headers_mut().insert(
        "content-type",
        HeaderValue::from_static("application/octet-stream"),
    );
    if let Ok(hash) = HeaderValue::from_str(&result.content_hash) {
        response.headers_mut().insert("x-file-hash", hash);
    }
    if let Ok(version) = HeaderValue::from_str(&result.version.to_string()) {
        response.headers_mut().insert("x-file-version", version);
    }
    Ok(response)
}

async fn delete_file(
    State(state): State<AppState>,
    auth: AuthContext,
    Path((vault_id, file_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, ApiError> {
    state.files.delete(auth.user_id, vault_id, file_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
