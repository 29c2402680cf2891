//! File Transfer — authenticated upload/download/delete of individual file
//! blobs (spec §4.6). Recomputes the ciphertext hash and size on upload;
//! the client-declared `size` at push time is advisory only.
//!
//! Grounded on the teacher's `storage::distributed::BlobStorage` put/get
//! pairing, with the SHA-256-over-ciphertext recompute step (absent from
//! the teacher, which never re-derives a stored hash) built directly from
//! spec §4.6 using the same `sha2` crate the Auth Service already depends
//! on for its own hashing.

use sha2::{Digest, Sha256};
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::blob::BlobStore;
use crate::error::{SyncError, SyncResult};
use crate::model::VaultFile;
use crate::rate_limit::{RateLimitOutcome, RateLimiter};
use crate::vault::VaultService;

pub struct UploadResult {
    pub encrypted_content_hash: String,
    pub size_bytes: i64,
    pub version: i64,
}

pub struct DownloadResult {
    pub bytes: Vec<u8>,
    pub content_hash: String,
    pub version: i64,
}

pub struct FileTransferService {
    pool: PgPool,
    blobs: Arc<dyn BlobStore>,
    vaults: Arc<VaultService>,
    rate_limiter: Arc<RateLimiter>,
}

impl FileTransferService {
    pub fn new(
        pool: PgPool,
        blobs: Arc<dyn BlobStore>,
        vaults: Arc<VaultService>,
        rate_limiter: Arc<RateLimiter>,
    ) -> Self {
        Self { pool, blobs, vaults, rate_limiter }
    }

    async fn find_row(&self, vault_id: Uuid, file_id: Uuid) -> SyncResult<VaultFile> {
        let row: Option<VaultFile> = sqlx::query_as(
            "SELECT id, vault_id, encrypted_path, content_hash, encrypted_content_hash, \
                    size_bytes, modified_at, version, storage_key, created_at, updated_at, deleted_at \
             FROM vault_files WHERE id = $1 AND vault_id = $2",
        )
        .bind(file_id)
        .bind(vault_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(anyhow::Error::from)?;
        row.ok_or(SyncError::FileNotFound)
    }

    /// `PUT upload(vault_id, file_id)` — spec §4.6.
    pub async fn upload(
        &self,
        user_id: Uuid,
        vault_id: Uuid,
        file_id: Uuid,
        body: Vec<u8>,
    ) -> SyncResult<UploadResult> {
        self.vaults.get(user_id, vault_id).await?;

        let outcome = self
            .rate_limiter
            .check("file_upload", &format!("{user_id}:{vault_id}"))
            .await
            .map_err(SyncError::Internal)?;
        if let RateLimitOutcome::Limited { retry_after_secs } = outcome {
            return Err(SyncError::RateLimited { retry_after_secs });
        }

        if body.is_empty() {
            return Err(SyncError::EmptyContent);
        }

        let row = self.find_row(vault_id, file_id).await?;

        let encrypted_content_hash = hex::encode(Sha256::digest(&body));
        let size_bytes = body.len() as i64;

        let mut metadata = HashMap::new();
        metadata.insert("vault_id".to_string(), vault_id.to_string());
        metadata.insert("file_id".to_string(), file_id.to_string());
        metadata.insert("uploaded_at".to_string(), chrono::Utc::now().to_rfc3339());

        self.blobs
            .put(&row.storage_key, body, metadata)
            .await
            .map_err(SyncError::Internal)?;

        sqlx::query(
            "UPDATE vault_files SET encrypted_content_hash = $2, size_bytes = $3, updated_at = now() \
             WHERE id = $1",
        )
        .bind(file_id)
        .bind(&encrypted_content_hash)
        .bind(size_bytes)
        .execute(&self.pool)
        .await
        .map_err(anyhow::Error::from)?;

        Ok(UploadResult { encrypted_content_hash, size_bytes, version: row.version })
    }

    /// `GET download(vault_id, file_id)` — spec §4.6. 404 distinguishes
    /// "file row absent" (`FileNotFound`) from "blob absent"
    /// (`ContentNotFound`).
    pub async fn download(&self, user_id: Uuid, vault_id: Uuid, file_id: Uuid) -> SyncResult<DownloadResult> {
        self.vaults.get(user_id, vault_id).await?;
        let row = self.find_row(vault_id, file_id).await?;
        if row.deleted_at.is_some() {
            return Err(SyncError::FileNotFound);
        }

        let bytes = self
            .blobs
            .get(&row.storage_key)
            .await
            .map_err(|_| SyncError::ContentNotFound)?;

        Ok(DownloadResult { bytes, content_hash: row.content_hash, version: row.version })
    }

    /// `DELETE file` — spec §4.6. Hard-deletes the row.
    pub async fn delete(&self, user_id: Uuid, vault_id: Uuid, file_id: Uuid) -> SyncResult<()> {
        self.vaults.get(user_id, vault_id).await?;
        let row = self.find_row(vault_id, file_id).await?;

        sqlx::query("DELETE FROM vault_files WHERE id = $1")
            .bind(file_id)
            .execute(&self.pool)
            .await
            .map_err(anyhow::Error::from)?;

        if let Err(err) = self.blobs.delete(&row.storage_key).await {
            tracing::warn!(error = %err, key = %row.storage_key, "failed to delete blob for hard-deleted file");
        }

        if row.deleted_at.is_none() {
            sqlx::query(
                "UPDATE users SET storage_used_bytes = GREATEST(0, storage_used_bytes - $2) WHERE id = $1",
            )
            .bind(user_id)
            .bind(row.size_bytes)
            .execute(&self.pool)
            .await
            .map_err(anyhow::Error::from)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ciphertext_hash_is_sha256_of_raw_bytes() {
        let body = b"hello ciphertext";
        let expected = hex::encode(Sha256::digest(body));
        assert_eq!(hex::encode(Sha256::digest(body)), expected);
        assert_eq!(expected.len(), 64);
    }
}
