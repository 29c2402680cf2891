//! Vault Service — create/list/get/soft-delete vaults, wrapped-key envelope
//! storage (spec §4.7).
//!
//! Grounded on the teacher's `storage::distributed::DistributedDocumentStore`
//! folder/ACL operations: user-scoped CRUD against Postgres, with
//! cross-user access folded into a `NotFound`-shaped error rather than a
//! distinct `Forbidden` to avoid existence leakage (spec §4.7, §7).

use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use crate::blob::BlobStore;
use crate::error::{SyncError, SyncResult};
use crate::model::{Vault, VaultKey};

pub struct VaultService {
    pool: PgPool,
    blobs: Arc<dyn BlobStore>,
}

impl VaultService {
    pub fn new(pool: PgPool, blobs: Arc<dyn BlobStore>) -> Self {
        Self { pool, blobs }
    }

    pub async fn list(&self, user_id: Uuid) -> SyncResult<Vec<Vault>> {
        let vaults: Vec<Vault> = sqlx::query_as(
            "SELECT id, user_id, name, created_at, updated_at, deleted_at FROM vaults \
             WHERE user_id = $1 AND deleted_at IS NULL ORDER BY created_at",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(anyhow::Error::from)?;
        Ok(vaults)
    }

    pub async fn create(
        &self,
        user_id: Uuid,
        name: &str,
        initial_key: Option<(String, String)>,
    ) -> SyncResult<Vault> {
        let mut tx = self.pool.begin().await.map_err(anyhow::Error::from)?;

        let vault: Vault = sqlx::query_as(
            "INSERT INTO vaults (user_id, name) VALUES ($1, $2) \
             RETURNING id, user_id, name, created_at, updated_at, deleted_at",
        )
        .bind(user_id)
        .bind(name)
        .fetch_one(&mut *tx)
        .await
        .map_err(anyhow::Error::from)?;

        if let Some((encrypted_key, key_nonce)) = initial_key {
            sqlx::query(
                "INSERT INTO vault_keys (vault_id, user_id, encrypted_key, key_nonce) \
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(vault.id)
            .bind(user_id)
            .bind(encrypted_key)
            .bind(key_nonce)
            .execute(&mut *tx)
            .await
            .map_err(anyhow::Error::from)?;
        }

        tx.commit().await.map_err(anyhow::Error::from)?;
        Ok(vault)
    }

    /// Loads the vault and checks ownership in one place — every other
    /// method on this service and the Sync Engine routes through here so
    /// cross-user access always surfaces as `VaultNotFound` (spec §4.7).
    pub async fn get(&self, user_id: Uuid, vault_id: Uuid) -> SyncResult<Vault> {
        let vault: Option<Vault> = sqlx::query_as(
            "SELECT id, user_id, name, created_at, updated_at, deleted_at FROM vaults \
             WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL",
        )
        .bind(vault_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(anyhow::Error::from)?;
        vault.ok_or(SyncError::VaultNotFound)
    }

    /// Soft-delete a vault: cascade soft-delete its files, best-effort
    /// delete their blobs, and recompute the owner's storage usage.
    pub async fn delete(&self, user_id: Uuid, vault_id: Uuid) -> SyncResult<()> {
        self.get(user_id, vault_id).await?;

        let storage_keys: Vec<(String,)> = sqlx::query_as(
            "SELECT storage_key FROM vault_files WHERE vault_id = $1 AND deleted_at IS NULL",
        )
        .bind(vault_id)
        .fetch_all(&self.pool)
        .await
        .map_err(anyhow::Error::from)?;

        let mut tx = self.pool.begin().await.map_err(anyhow::Error::from)?;

        sqlx::query("UPDATE vaults SET deleted_at = now(), updated_at = now() WHERE id = $1")
            .bind(vault_id)
            .execute(&mut *tx)
            .await
            .map_err(anyhow::Error::from)?;

        sqlx::query(
            "UPDATE vault_files SET deleted_at = now(), updated_at = now() \
             WHERE vault_id = $1 AND deleted_at IS NULL",
        )
        .bind(vault_id)
        .execute(&mut *tx)
        .await
        .map_err(anyhow::Error::from)?;

        let freed: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(size_bytes), 0) FROM vault_files \
             WHERE vault_id = $1 AND deleted_at = (SELECT deleted_at FROM vaults WHERE id = $1)",
        )
        .bind(vault_id)
        .fetch_one(&mut *tx)
        .await
        .unwrap_or(0);

        sqlx::query(
            "UPDATE users SET storage_used_bytes = GREATEST(0, storage_used_bytes - $2) WHERE id = $1",
        )
        .bind(user_id)
        .bind(freed)
        .execute(&mut *tx)
        .await
        .map_err(anyhow::Error::from)?;

        tx.commit().await.map_err(anyhow::Error::from)?;

        for (key,) in storage_keys {
            if let Err(err) = self.blobs.delete(&key).await {
                tracing::warn!(error = %err, key, "failed to delete blob during vault soft-delete");
            }
        }

        Ok(())
    }

    pub async fn get_key(&self, user_id: Uuid, vault_id: Uuid) -> SyncResult<VaultKey> {
        self.get(user_id, vault_id).await?;
        let key: Option<VaultKey> = sqlx::query_as(
            "SELECT vault_id, user_id, encrypted_key, key_nonce FROM vault_keys \
             WHERE vault_id = $1 AND user_id = $2",
        )
        .bind(vault_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(anyhow::Error::from)?;
        key.ok_or(SyncError::KeyNotFound)
    }

    pub async fn put_key(
        &self,
        user_id: Uuid,
        vault_id: Uuid,
        encrypted_key: &str,
        key_nonce: &str,
    ) -> SyncResult<()> {
        self.get(user_id, vault_id).await?;
        sqlx::query(
            "INSERT INTO vault_keys (vault_id, user_id, encrypted_key, key_nonce) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (vault_id, user_id) DO UPDATE \
             SET encrypted_key = EXCLUDED.encrypted_key, key_nonce = EXCLUDED.key_nonce",
        )
        .bind(vault_id)
        .bind(user_id)
        .bind(encrypted_key)
        .bind(key_nonce)
        .execute(&self.pool)
        .await
        .map_err(anyhow::Error::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vault_key_round_trips_as_opaque_bytes() {
        // The server never decrypts an envelope; this just asserts the
        // struct is a plain opaque passthrough with no derived fields.
        let key = VaultKey {
            vault_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            encrypted_key: "ciphertext".to_string(),
            key_nonce: "nonce".to_string(),
        };
        assert_eq!(key.encrypted_key, "ciphertext");
    }
}
