//! Data model for the sync core — see spec §3.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionTier {
    Free,
    Pro,
    Team,
}

impl SubscriptionTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionTier::Free => "free",
            SubscriptionTier::Pro => "pro",
            SubscriptionTier::Team => "team",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "pro" => SubscriptionTier::Pro,
            "team" => SubscriptionTier::Team,
            _ => SubscriptionTier::Free,
        }
    }

    /// Default quota in bytes for a freshly registered user on this tier.
    pub fn default_quota_bytes(&self) -> i64 {
        match self {
            SubscriptionTier::Free => 100 * 1024 * 1024,
            SubscriptionTier::Pro => 10 * 1024 * 1024 * 1024,
            SubscriptionTier::Team => 100 * 1024 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Desktop,
    Mobile,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Desktop => "desktop",
            DeviceType::Mobile => "mobile",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "mobile" => DeviceType::Mobile,
            _ => DeviceType::Desktop,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_digest: String,
    pub salt: String,
    pub created_at: DateTime<Utc>,
    pub email_verified: bool,
    pub subscription_tier: String,
    pub storage_quota_bytes: i64,
    pub storage_used_bytes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Device {
    pub id: Uuid,
    pub user_id: Uuid,
    pub device_name: String,
    pub device_type: String,
    pub public_key: Option<String>,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub device_id: Uuid,
    pub refresh_token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Vault {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct VaultKey {
    pub vault_id: Uuid,
    pub user_id: Uuid,
    pub encrypted_key: String,
    pub key_nonce: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct VaultFile {
    pub id: Uuid,
    pub vault_id: Uuid,
    pub encrypted_path: String,
    pub content_hash: String,
    pub encrypted_content_hash: String,
    pub size_bytes: i64,
    pub modified_at: i64,
    pub version: i64,
    pub storage_key: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RateBucket {
    pub action_name: String,
    pub identifier: String,
    pub count: i32,
    pub window_start: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AuditEntry {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub device_id: Option<Uuid>,
    pub action: String,
    pub details: serde_json::Value,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Cursor pagination token: `(updated_at, file_id)`, totally ordered
/// because `file_id` is unique across all files. See spec §4.4.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub updated_at_ms: i64,
    pub file_id: Uuid,
}

impl Cursor {
    pub fn parse(raw: &str) -> Option<Self> {
        let (ts, id) = raw.split_once('_')?;
        let updated_at_ms: i64 = ts.parse().ok()?;
        let file_id = Uuid::parse_str(id).ok()?;
        Some(Cursor {
            updated_at_ms,
            file_id,
        })
    }

    pub fn of(updated_at: DateTime<Utc>, file_id: Uuid) -> Self {
        Cursor {
            updated_at_ms: updated_at.timestamp_millis(),
            file_id,
        }
    }
}

impl std::fmt::Display for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", self.updated_at_ms, self.file_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncOperation {
    Create,
    Update,
    Delete,
}

impl SyncOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncOperation::Create => "create",
            SyncOperation::Update => "update",
            SyncOperation::Delete => "delete",
        }
    }
}

/// One entry of a `push` request body — spec §4.4.3. Modeled as a tagged
/// variant over the operation rather than separate request shapes per
/// operation (spec §9: "polymorphism of change").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncChange {
    pub encrypted_path: String,
    pub operation: SyncOperation,
    #[serde(default)]
    pub content_hash: String,
    #[serde(default)]
    pub size: i64,
    #[serde(default)]
    pub modified_at: i64,
    #[serde(default)]
    pub base_version: Option<i64>,
}

/// Per-change verdict returned from `push` — always carried in the `200`
/// body, never surfaced as an HTTP-level failure (spec §7).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SyncVerdict {
    Accepted {
        file_id: Option<Uuid>,
        new_version: Option<i64>,
        upload_url: Option<String>,
    },
    Conflict {
        reason: String,
    },
    Error {
        reason: String,
    },
}

/// One emitted row of a `pull` response — spec §4.4.2 step 5.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "lowercase")]
pub enum PullChange {
    Create { file: PullFile, download_url: String },
    Update { file: PullFile, download_url: String },
    Delete { file_id: Uuid, encrypted_path: String, download_url: Option<String> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullFile {
    pub file_id: Uuid,
    pub encrypted_path: String,
    pub content_hash: String,
    pub size_bytes: i64,
    pub modified_at: i64,
    pub version: i64,
}
