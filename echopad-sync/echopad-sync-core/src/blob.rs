//! Blob Store — opaque byte storage keyed by `vaults/<vault_id>/<file_id>`.
//!
//! Grounded on `storage::distributed::BlobStorage`/`S3BlobStorage` in the
//! teacher repo: same narrow trait (`put`/`get`/delete`), with `exists`
//! renamed to `head` to match spec §4.1's terminology and `head` folding
//! every S3 error (not just `NoSuchKey`) into `Ok(false)`, since the spec
//! treats "head is authoritative for content present" as the only signal
//! callers need.

use async_trait::async_trait;
use std::collections::HashMap;

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, bytes: Vec<u8>, metadata: HashMap<String, String>) -> anyhow::Result<()>;
    async fn get(&self, key: &str) -> anyhow::Result<Vec<u8>>;
    async fn head(&self, key: &str) -> anyhow::Result<bool>;
    async fn delete(&self, key: &str) -> anyhow::Result<()>;
}

pub struct S3BlobStore {
    pub client: aws_sdk_s3::Client,
    pub bucket: String,
}

impl S3BlobStore {
    pub fn new(client: aws_sdk_s3::Client, bucket: String) -> Self {
        Self { client, bucket }
    }

    pub async fn from_env(bucket: String, endpoint: Option<&str>) -> Self {
        let base = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let s3_config = match endpoint {
            Some(endpoint) => aws_sdk_s3::config::Builder::from(&base)
                .endpoint_url(endpoint)
                .force_path_style(true)
                .build(),
            None => aws_sdk_s3::config::Builder::from(&base).build(),
        };
        let client = aws_sdk_s3::Client::from_conf(s3_config);
        Self::new(client, bucket)
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, metadata: HashMap<String, String>) -> anyhow::Result<()> {
        let mut req = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(bytes.into());
        for (k, v) in metadata {
            req = req.metadata(k, v);
        }
        req.send().await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> anyhow::Result<Vec<u8>> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await?;

        let data = resp.body.collect().await?;
        Ok(data.into_bytes().to_vec())
    }

    async fn head(&self, key: &str) -> anyhow::Result<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(_) => Ok(false),
        }
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await?;
        Ok(())
    }
}

/// In-memory blob store used by tests that exercise the Sync Engine
/// without a real S3-compatible backend. Gated behind `test-util` (rather
/// than plain `#[cfg(test)]`) so integration tests in the `echopad-sync`
/// binary crate can depend on it too.
#[cfg(any(test, feature = "test-util"))]
pub mod mem {
    use super::*;
    use tokio::sync::RwLock;

    #[derive(Default)]
    pub struct MemBlobStore {
        objects: RwLock<HashMap<String, Vec<u8>>>,
    }

    impl MemBlobStore {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl BlobStore for MemBlobStore {
        async fn put(&self, key: &str, bytes: Vec<u8>, _metadata: HashMap<String, String>) -> anyhow::Result<()> {
            self.objects.write().await.insert(key.to_string(), bytes);
            Ok(())
        }

        async fn get(&self, key: &str) -> anyhow::Result<Vec<u8>> {
            self.objects
                .read()
                .await
                .get(key)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("no such key: {key}"))
        }

        async fn head(&self, key: &str) -> anyhow::Result<bool> {
            Ok(self.objects.read().await.contains_key(key))
        }

        async fn delete(&self, key: &str) -> anyhow::Result<()> {
            self.objects.write().await.remove(key);
            Ok(())
        }
    }
}
