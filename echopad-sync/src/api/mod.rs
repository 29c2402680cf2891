//! HTTP Dispatcher — route table, CORS, auth middleware, error mapping
//! (spec §4, "HTTP Dispatcher"). Assembled the same way the teacher's
//! `api::distributed::create_router` composes its `ApiState`, layered
//! middleware stack, and route table.

pub mod account;
pub mod error;
pub mod extractors;
pub mod files;
pub mod sync;
pub mod vaults;

use axum::http::{HeaderName, Method};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use echopad_sync_core::audit::AuditLog;
use echopad_sync_core::auth::AuthService;
use echopad_sync_core::file_transfer::FileTransferService;
use echopad_sync_core::rate_limit::RateLimiter;
use echopad_sync_core::sync::SyncEngine;
use echopad_sync_core::token::TokenService;
use echopad_sync_core::vault::VaultService;

#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    pub vaults: Arc<VaultService>,
    pub sync: Arc<SyncEngine>,
    pub files: Arc<FileTransferService>,
    pub tokens: Arc<TokenService>,
    pub rate_limiter: Arc<RateLimiter>,
    pub audit: Arc<AuditLog>,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([HeaderName::from_static("content-type"), HeaderName::from_static("authorization")]);

    Router::new()
        .route("/api/v1/health", get(health))
        .nest("/api/v1", account::router())
        .nest("/api/v1", vaults::router())
        .nest("/api/v1", sync::router())
        .nest("/api/v1", files::router())
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(CompressionLayer::new()).layer(cors))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({"status": "ok", "timestamp": chrono::Utc::now().to_rfc3339()}))
}
