//! Audit Log — best-effort recording of security-relevant events (spec §3).
//!
//! Grounded on `storage::distributed::DistributedDocumentStore::record_audit_event`
//! in the teacher repo: writes are fire-and-forget from the caller's point of
//! view. A failed audit write must never fail the request that triggered it,
//! so every error here is logged and swallowed rather than propagated.

use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

pub struct AuditLog {
    pool: PgPool,
}

impl AuditLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Record an event. Never returns an error to the caller — on failure
    /// it logs at `warn` and moves on.
    pub async fn record(
        &self,
        user_id: Option<Uuid>,
        device_id: Option<Uuid>,
        action: &str,
        details: Value,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
    ) {
        let result = sqlx::query(
            "INSERT INTO audit_log (user_id, device_id, action, details, ip_address, user_agent) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(user_id)
        .bind(device_id)
        .bind(action)
        .bind(details)
        .bind(ip_address)
        .bind(user_agent)
        .execute(&self.pool)
        .await;

        if let Err(err) = result {
            tracing::warn!(error = %err, action, "failed to write audit log entry");
        }
    }
}
