//! Object storage backend abstraction (S3/MinIO/local filesystem/memory).

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore as ObjectBackend;
use serde::{Deserialize, Serialize};

use crate::error::{BundleStoreError, Result};

/// Configuration for the object storage backend.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ObjectStoreConfig {
    /// In-memory storage (for testing)
    #[default]
    Memory,

    /// Local filesystem storage
    Local {
        /// Path to the storage directory
        path: PathBuf,
    },

    /// S3-compatible storage (AWS S3, MinIO, etc.)
    ///
    /// Several nodes pointed at the same bucket can read each other's
    /// bundles.
    S3 {
        /// S3 endpoint URL (e.g., "http://localhost:9000" for MinIO)
        endpoint: String,
        access_key: String,
        secret_key: String,
        bucket: String,
        /// Optional region (defaults to "us-east-1")
        region: Option<String>,
    },
}

/// Wrapper around the configured object storage backend.
///
/// Blob bytes live under `data/<blake3>`, bundle indexes under
/// `bundles/<address>`.
#[derive(Debug, Clone)]
pub(crate) struct Storage {
    inner: Arc<dyn ObjectBackend>,
}

impl Storage {
    /// Create a new storage backend from configuration.
    pub async fn new(config: ObjectStoreConfig) -> Result<Self> {
        let inner: Arc<dyn ObjectBackend> = match &config {
            ObjectStoreConfig::Memory => Arc::new(InMemory::new()),

            ObjectStoreConfig::Local { path } => {
                tokio::fs::create_dir_all(path).await?;
                Arc::new(
                    LocalFileSystem::new_with_prefix(path)
                        .map_err(|e| BundleStoreError::InvalidConfig(e.to_string()))?,
                )
            }

            ObjectStoreConfig::S3 {
                endpoint,
                access_key,
                secret_key,
                bucket,
                region,
            } => {
                let store = AmazonS3Builder::new()
                    .with_endpoint(endpoint)
                    .with_access_key_id(access_key)
                    .with_secret_access_key(secret_key)
                    .with_bucket_name(bucket)
                    .with_region(region.as_deref().unwrap_or("us-east-1"))
                    .with_allow_http(endpoint.starts_with("http://"))
                    .build()
                    .map_err(|e| BundleStoreError::InvalidConfig(e.to_string()))?;

                // fail fast on a missing bucket
                {
                    use futures::TryStreamExt;
                    let prefix = ObjectPath::from("");
                    let mut stream = store.list(Some(&prefix));
                    match stream.try_next().await {
                        Ok(_) => {}
                        Err(object_store::Error::NotFound { .. }) => {
                            return Err(BundleStoreError::BucketNotFound(bucket.clone()));
                        }
                        Err(e) => return Err(e.into()),
                    }
                }

                Arc::new(store)
            }
        };

        Ok(Self { inner })
    }

    fn data_path(hash: &str) -> ObjectPath {
        ObjectPath::from(format!("data/{}", hash))
    }

    fn index_path(address: &str) -> ObjectPath {
        ObjectPath::from(format!("bundles/{}", address))
    }

    async fn put(&self, path: ObjectPath, data: Bytes) -> Result<()> {
        self.inner.put(&path, data.into()).await?;
        Ok(())
    }

    async fn get(&self, path: ObjectPath) -> Result<Option<Bytes>> {
        match self.inner.get(&path).await {
            Ok(result) => Ok(Some(result.bytes().await?)),
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, path: ObjectPath) -> Result<bool> {
        match self.inner.head(&path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn put_data(&self, hash: &str, data: Bytes) -> Result<()> {
        self.put(Self::data_path(hash), data).await
    }

    pub async fn get_data(&self, hash: &str) -> Result<Option<Bytes>> {
        self.get(Self::data_path(hash)).await
    }

    pub async fn put_index(&self, address: &str, index: Bytes) -> Result<()> {
        self.put(Self::index_path(address), index).await
    }

    pub async fn get_index(&self, address: &str) -> Result<Option<Bytes>> {
        self.get(Self::index_path(address)).await
    }

    pub async fn has_index(&self, address: &str) -> Result<bool> {
        self.exists(Self::index_path(address)).await
    }
}

#[cfg(test)]
impl Storage {
    pub fn memory() -> Self {
        Self {
            inner: Arc::new(InMemory::new()),
        }
    }
}
