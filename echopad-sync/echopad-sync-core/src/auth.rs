//! Auth Service — register, login, refresh, logout, salt lookup (spec §4.5).
//!
//! Grounded on `auth::distributed`'s session/device handling in the teacher
//! repo. The source system this spec was distilled from hashed passwords
//! with unsalted SHA-256; spec §9 explicitly invites upgrading the digest
//! algorithm without changing the external contract, so this hashes with
//! Argon2id (`argon2`, already in the teacher's dependency graph for its
//! own credential store) instead. The `salt` column is unrelated to that
//! digest — it is an opaque value handed back to the client verbatim for
//! its own client-side key derivation, exactly as the source does.

use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde_json::json;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use crate::audit::AuditLog;
use crate::blob::BlobStore;
use crate::error::{SyncError, SyncResult};
use crate::model::{Device, DeviceType, SubscriptionTier, User};
use crate::token::TokenService;

const REFRESH_TOKEN_LIFETIME: Duration = Duration::days(30);

pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
}

pub struct AuthService {
    pool: PgPool,
    tokens: Arc<TokenService>,
    audit: Arc<AuditLog>,
    blobs: Arc<dyn BlobStore>,
}

fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.is_empty() {
        return false;
    }
    if local.chars().any(char::is_whitespace) || domain.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((host, tld)) = domain.rsplit_once('.') else {
        return false;
    };
    !host.is_empty() && !tld.is_empty() && !domain.contains('@')
}

fn sha256_hex(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    hex::encode(digest)
}

/// Deterministic pseudo-salt for unknown emails, to defeat enumeration
/// (spec §4.5, §9). A pure function of the email alone.
pub fn pseudo_salt(email: &str) -> String {
    sha256_hex(&format!("{email}echopad-fake-salt"))
}

fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {e}"))?;
    Ok(hash.to_string())
}

fn verify_password(password: &str, digest: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(digest) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

fn random_opaque_salt() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

impl AuthService {
    pub fn new(pool: PgPool, tokens: Arc<TokenService>, audit: Arc<AuditLog>, blobs: Arc<dyn BlobStore>) -> Self {
        Self { pool, tokens, audit, blobs }
    }

    /// `GET /auth/salt` — constant-time with respect to whether the email
    /// exists: an unknown email gets a deterministic pseudo-salt instead of
    /// a 404.
    pub async fn salt(&self, email: &str) -> SyncResult<String> {
        let email = email.to_lowercase();
        let row: Option<(String,)> = sqlx::query_as("SELECT salt FROM users WHERE email = $1")
            .bind(&email)
            .fetch_optional(&self.pool)
            .await
            .map_err(anyhow::Error::from)?;
        Ok(row.map(|(s,)| s).unwrap_or_else(|| pseudo_salt(&email)))
    }

    pub async fn register(
        &self,
        email: &str,
        password: &str,
        device_name: &str,
        device_type: DeviceType,
    ) -> SyncResult<(User, Device, AuthTokens)> {
        let email = email.to_lowercase();
        if !is_valid_email(&email) {
            return Err(SyncError::InvalidEmail);
        }
        if password.len() < 8 {
            return Err(SyncError::PasswordTooShort);
        }

        let existing: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM users WHERE email = $1")
            .bind(&email)
            .fetch_optional(&self.pool)
            .await
            .map_err(anyhow::Error::from)?;
        if existing.is_some() {
            return Err(SyncError::EmailExists);
        }

        let password_digest = hash_password(password).map_err(SyncError::Internal)?;
        let salt = random_opaque_salt();
        let tier = SubscriptionTier::Free;

        let user: User = sqlx::query_as(
            "INSERT INTO users (email, password_digest, salt, subscription_tier, storage_quota_bytes) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING id, email, password_digest, salt, created_at, email_verified, \
                       subscription_tier, storage_quota_bytes, storage_used_bytes",
        )
        .bind(&email)
        .bind(&password_digest)
        .bind(&salt)
        .bind(tier.as_str())
        .bind(tier.default_quota_bytes())
        .fetch_one(&self.pool)
        .await
        .map_err(anyhow::Error::from)?;

        let device = self.create_device(user.id, device_name, device_type).await?;
        let tokens = self.issue_and_store_session(user.id, device.id).await?;

        self.audit
            .record(
                Some(user.id),
                Some(device.id),
                "register",
                json!({"email": email}),
                None,
                None,
            )
            .await;

        Ok((user, device, tokens))
    }

    pub async fn login(
        &self,
        email: &str,
        password: &str,
        device_name: &str,
        device_type: DeviceType,
    ) -> SyncResult<(User, Device, AuthTokens)> {
        let email = email.to_lowercase();
        let user: Option<User> = sqlx::query_as(
            "SELECT id, email, password_digest, salt, created_at, email_verified, \
                    subscription_tier, storage_quota_bytes, storage_used_bytes \
             FROM users WHERE email = $1",
        )
        .bind(&email)
        .fetch_optional(&self.pool)
        .await
        .map_err(anyhow::Error::from)?;

        let Some(user) = user else {
            self.audit
                .record(None, None, "login_failed", json!({"email": email}), None, None)
                .await;
            return Err(SyncError::InvalidCredentials);
        };

        if !verify_password(password, &user.password_digest) {
            self.audit
                .record(
                    Some(user.id),
                    None,
                    "login_failed",
                    json!({"email": email}),
                    None,
                    None,
                )
                .await;
            return Err(SyncError::InvalidCredentials);
        }

        let device = self.create_device(user.id, device_name, device_type).await?;
        let tokens = self.issue_and_store_session(user.id, device.id).await?;

        self.audit
            .record(Some(user.id), Some(device.id), "login", json!({}), None, None)
            .await;

        Ok((user, device, tokens))
    }

    pub async fn refresh(&self, refresh_token: &str) -> SyncResult<AuthTokens> {
        let claims = TokenService::decode_unverified(refresh_token).ok_or(SyncError::InvalidToken)?;
        let hash = sha256_hex(refresh_token);

        let session: Option<(Uuid, Uuid, Uuid, DateTime<Utc>, Option<DateTime<Utc>>)> = sqlx::query_as(
            "SELECT id, user_id, device_id, expires_at, revoked_at FROM sessions WHERE refresh_token_hash = $1",
        )
        .bind(&hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(anyhow::Error::from)?;

        let Some((session_id, user_id, device_id, expires_at, revoked_at)) = session else {
            return Err(SyncError::InvalidToken);
        };

        if revoked_at.is_some() || expires_at <= Utc::now() || user_id != claims.sub || device_id != claims.device_id
        {
            return Err(SyncError::InvalidToken);
        }

        let mut tx = self.pool.begin().await.map_err(anyhow::Error::from)?;
        sqlx::query("UPDATE sessions SET revoked_at = now() WHERE id = $1")
            .bind(session_id)
            .execute(&mut *tx)
            .await
            .map_err(anyhow::Error::from)?;

        let access_token = self.tokens.issue_access(user_id, device_id).map_err(SyncError::Internal)?;
        let new_refresh = self.tokens.issue_refresh(user_id, device_id).map_err(SyncError::Internal)?;
        let new_hash = sha256_hex(&new_refresh);
        let new_expires_at = Utc::now() + REFRESH_TOKEN_LIFETIME;

        sqlx::query(
            "INSERT INTO sessions (user_id, device_id, refresh_token_hash, expires_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(user_id)
        .bind(device_id)
        .bind(&new_hash)
        .bind(new_expires_at)
        .execute(&mut *tx)
        .await
        .map_err(anyhow::Error::from)?;

        sqlx::query("UPDATE devices SET last_sync_at = now() WHERE id = $1")
            .bind(device_id)
            .execute(&mut *tx)
            .await
            .map_err(anyhow::Error::from)?;

        tx.commit().await.map_err(anyhow::Error::from)?;

        Ok(AuthTokens {
            access_token,
            refresh_token: new_refresh,
        })
    }

    pub async fn logout(&self, user_id: Uuid, device_id: Uuid) -> SyncResult<()> {
        sqlx::query(
            "UPDATE sessions SET revoked_at = now() \
             WHERE user_id = $1 AND device_id = $2 AND revoked_at IS NULL",
        )
        .bind(user_id)
        .bind(device_id)
        .execute(&self.pool)
        .await
        .map_err(anyhow::Error::from)?;

        self.audit.record(Some(user_id), Some(device_id), "logout", json!({}), None, None).await;
        Ok(())
    }

    async fn create_device(&self, user_id: Uuid, device_name: &str, device_type: DeviceType) -> SyncResult<Device> {
        let device: Device = sqlx::query_as(
            "INSERT INTO devices (user_id, device_name, device_type) VALUES ($1, $2, $3) \
             RETURNING id, user_id, device_name, device_type, public_key, last_sync_at, created_at, revoked_at",
        )
        .bind(user_id)
        .bind(device_name)
        .bind(device_type.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(anyhow::Error::from)?;
        Ok(device)
    }

    async fn issue_and_store_session(&self, user_id: Uuid, device_id: Uuid) -> SyncResult<AuthTokens> {
        let access_token = self.tokens.issue_access(user_id, device_id).map_err(SyncError::Internal)?;
        let refresh_token = self.tokens.issue_refresh(user_id, device_id).map_err(SyncError::Internal)?;
        let hash = sha256_hex(&refresh_token);
        let expires_at = Utc::now() + REFRESH_TOKEN_LIFETIME;

        sqlx::query(
            "INSERT INTO sessions (user_id, device_id, refresh_token_hash, expires_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(user_id)
        .bind(device_id)
        .bind(&hash)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(anyhow::Error::from)?;

        Ok(AuthTokens { access_token, refresh_token })
    }

    /// `GET /devices` — a user's own, non-revoked devices.
    pub async fn list_devices(&self, user_id: Uuid) -> SyncResult<Vec<Device>> {
        let devices: Vec<Device> = sqlx::query_as(
            "SELECT id, user_id, device_name, device_type, public_key, last_sync_at, created_at, revoked_at \
             FROM devices WHERE user_id = $1 ORDER BY created_at",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(anyhow::Error::from)?;
        Ok(devices)
    }

    /// `DELETE /devices/{id}` — revoke a device other than the caller's
    /// current one, and invalidate its sessions (spec §3: "revocation
    /// invalidates all sessions for the device").
    pub async fn revoke_device(&self, user_id: Uuid, current_device_id: Uuid, target_device_id: Uuid) -> SyncResult<()> {
        if target_device_id == current_device_id {
            return Err(SyncError::CannotRevokeCurrent);
        }

        let owned: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM devices WHERE id = $1 AND user_id = $2")
            .bind(target_device_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(anyhow::Error::from)?;
        if owned.is_none() {
            return Err(SyncError::DeviceNotFound);
        }

        let mut tx = self.pool.begin().await.map_err(anyhow::Error::from)?;
        sqlx::query("UPDATE devices SET revoked_at = now() WHERE id = $1")
            .bind(target_device_id)
            .execute(&mut *tx)
            .await
            .map_err(anyhow::Error::from)?;
        sqlx::query(
            "UPDATE sessions SET revoked_at = now() WHERE device_id = $1 AND revoked_at IS NULL",
        )
        .bind(target_device_id)
        .execute(&mut *tx)
        .await
        .map_err(anyhow::Error::from)?;
        tx.commit().await.map_err(anyhow::Error::from)?;

        self.audit
            .record(Some(user_id), Some(target_device_id), "device_revoked", json!({}), None, None)
            .await;
        Ok(())
    }

    /// `GET /account` — the caller's own profile.
    pub async fn profile(&self, user_id: Uuid) -> SyncResult<User> {
        let user: Option<User> = sqlx::query_as(
            "SELECT id, email, password_digest, salt, created_at, email_verified, \
                    subscription_tier, storage_quota_bytes, storage_used_bytes \
             FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(anyhow::Error::from)?;
        user.ok_or(SyncError::UserNotFound)
    }

    /// `GET /account/usage` — `(used, quota)` in bytes.
    pub async fn usage(&self, user_id: Uuid) -> SyncResult<(i64, i64)> {
        let row: Option<(i64, i64)> =
            sqlx::query_as("SELECT storage_used_bytes, storage_quota_bytes FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(anyhow::Error::from)?;
        row.ok_or(SyncError::UserNotFound)
    }

    /// `DELETE /account` — hard-delete cascade. Best-effort blob cleanup
    /// for every file across every vault the user owns, then the `users`
    /// row delete cascades devices/sessions/vaults/vault_files/vault_keys
    /// via `ON DELETE CASCADE`.
    pub async fn delete_account(&self, user_id: Uuid) -> SyncResult<()> {
        self.profile(user_id).await?;

        let storage_keys: Vec<(String,)> = sqlx::query_as(
            "SELECT vf.storage_key FROM vault_files vf \
             JOIN vaults v ON v.id = vf.vault_id WHERE v.user_id = $1",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(anyhow::Error::from)?;

        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(anyhow::Error::from)?;

        for (key,) in storage_keys {
            if let Err(err) = self.blobs.delete(&key).await {
                tracing::warn!(error = %err, key, "failed to delete blob during account deletion");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_validation_matches_spec_pattern() {
        assert!(is_valid_email("a@x.y"));
        assert!(is_valid_email("foo.bar@example.com"));
        assert!(!is_valid_email("no-at-sign"));
        assert!(!is_valid_email("@missing-local.com"));
        assert!(!is_valid_email("missing-domain@"));
        assert!(!is_valid_email("no-tld@example"));
        assert!(!is_valid_email("has space@example.com"));
    }

    #[test]
    fn pseudo_salt_is_pure_function_of_email() {
        assert_eq!(pseudo_salt("a@x.y"), pseudo_salt("a@x.y"));
        assert_ne!(pseudo_salt("a@x.y"), pseudo_salt("b@x.y"));
    }

    #[test]
    fn password_hash_round_trips_and_rejects_wrong_password() {
        let digest = hash_password("password1").unwrap();
        assert!(verify_password("password1", &digest));
        assert!(!verify_password("wrong-password", &digest));
    }
}
