//! ObjectStore - content-addressed bundles backed by SQLite + object storage.

use std::collections::BTreeMap;
use std::path::Path;

use bytes::Bytes;
use tracing::{debug, info};

use crate::address::ContentAddress;
use crate::database::Database;
use crate::error::{BundleStoreError, Result};
use crate::storage::{ObjectStoreConfig, Storage};

/// A directory-like set of named byte blobs, uploaded as one unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bundle {
    entries: BTreeMap<String, Bytes>,
}

impl Bundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a named blob, returning any blob previously stored under the name.
    pub fn insert(&mut self, name: impl Into<String>, data: impl Into<Bytes>) -> Option<Bytes> {
        self.entries.insert(name.into(), data.into())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Bytes> {
        self.entries.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Result of walking into a bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundleEntry {
    /// Ordered filenames at the bundle root
    Listing(Vec<String>),
    /// Bytes of a single file
    File(Bytes),
}

/// Canonical bundle index: filename -> BLAKE3 hex of the blob.
type BundleIndex = BTreeMap<String, String>;

/// Content-addressed bundle store.
///
/// Blob bytes and bundle indexes are kept in object storage so several
/// nodes sharing a bucket can read each other's bundles; SQLite tracks what
/// this node uploaded and pinned.
#[derive(Debug, Clone)]
pub struct ObjectStore {
    db: Database,
    storage: Storage,
}

impl ObjectStore {
    /// Create a new ObjectStore with the given configuration.
    ///
    /// # Arguments
    /// * `db_path` - Path to the SQLite database file
    /// * `config` - Object storage configuration (S3, MinIO, local, or memory)
    pub async fn new(db_path: &Path, config: ObjectStoreConfig) -> Result<Self> {
        let db = Database::new(db_path).await?;
        let storage = Storage::new(config).await?;
        Ok(Self { db, storage })
    }

    /// Create a new ObjectStore backed by the local filesystem
    /// (db at `data_dir/bundles.db`, objects at `data_dir/objects/`).
    pub async fn new_local(data_dir: &Path) -> Result<Self> {
        let db_path = data_dir.join("bundles.db");
        let config = ObjectStoreConfig::Local {
            path: data_dir.join("objects"),
        };
        Self::new(&db_path, config).await
    }

    /// Create an ObjectStore with an in-memory database.
    pub async fn in_memory(config: ObjectStoreConfig) -> Result<Self> {
        let db = Database::in_memory().await?;
        let storage = Storage::new(config).await?;
        Ok(Self { db, storage })
    }

    /// Create a fully ephemeral ObjectStore. Useful for testing.
    pub async fn new_ephemeral() -> Result<Self> {
        Self::in_memory(ObjectStoreConfig::Memory).await
    }

    /// Upload a bundle and return its content address.
    pub async fn upload(&self, bundle: Bundle) -> Result<ContentAddress> {
        if bundle.is_empty() {
            return Err(BundleStoreError::InvalidBundle("bundle is empty".into()));
        }

        let mut index = BundleIndex::new();
        for (name, data) in bundle.entries {
            if name.is_empty() || name.contains('/') {
                return Err(BundleStoreError::InvalidBundle(format!(
                    "invalid entry name '{}'",
                    name
                )));
            }
            let hash = blake3::hash(&data).to_hex().to_string();
            let size = data.len();
            self.storage.put_data(&hash, data).await?;
            self.db.insert_blob(&hash, size as i64).await?;
            debug!(name = %name, hash = %hash, size, "stored bundle entry");
            index.insert(name, hash);
        }

        let canonical = serde_json::to_vec(&index)
            .map_err(|e| BundleStoreError::InvalidBundle(e.to_string()))?;
        let address = ContentAddress::of(&canonical);
        let key = address.to_string();

        self.storage.put_index(&key, Bytes::from(canonical)).await?;
        self.db.insert_bundle(&key, index.len() as i64).await?;

        info!(address = %address, entries = index.len(), "bundle uploaded");
        Ok(address)
    }

    async fn index(&self, address: &ContentAddress) -> Result<BundleIndex> {
        let raw = self
            .storage
            .get_index(&address.to_string())
            .await?
            .ok_or_else(|| BundleStoreError::NotFound(address.to_string()))?;
        serde_json::from_slice(&raw).map_err(|e| BundleStoreError::CorruptIndex(*address, e))
    }

    /// Walk into a bundle: an empty subpath (or `/`) lists the bundle,
    /// a filename returns that file's bytes.
    pub async fn get(&self, address: &ContentAddress, subpath: &str) -> Result<BundleEntry> {
        let index = self.index(address).await?;
        let name = subpath.trim_matches('/');
        if name.is_empty() {
            return Ok(BundleEntry::Listing(index.into_keys().collect()));
        }

        let hash = index
            .get(name)
            .ok_or_else(|| BundleStoreError::NotFound(format!("{}/{}", address, name)))?;
        let data = self
            .storage
            .get_data(hash)
            .await?
            .ok_or_else(|| BundleStoreError::MissingBlob(*address, hash.clone()))?;
        Ok(BundleEntry::File(data))
    }

    /// Read one file of a bundle.
    pub async fn get_file(&self, address: &ContentAddress, name: &str) -> Result<Bytes> {
        match self.get(address, name).await? {
            BundleEntry::File(data) => Ok(data),
            BundleEntry::Listing(_) => Err(BundleStoreError::NotFound(format!(
                "{}/{} is not a file",
                address, name
            ))),
        }
    }

    /// Whether a bundle with this address is readable from storage.
    pub async fn has(&self, address: &ContentAddress) -> Result<bool> {
        self.storage.has_index(&address.to_string()).await
    }

    /// Pin a bundle so it is kept by this node. Fails if the bundle is unknown.
    pub async fn pin(&self, address: &ContentAddress) -> Result<()> {
        if !self.has(address).await? {
            return Err(BundleStoreError::NotFound(address.to_string()));
        }
        self.db.insert_pin(&address.to_string()).await?;
        debug!(address = %address, "bundle pinned");
        Ok(())
    }

    pub async fn unpin(&self, address: &ContentAddress) -> Result<bool> {
        self.db.delete_pin(&address.to_string()).await
    }

    pub async fn is_pinned(&self, address: &ContentAddress) -> Result<bool> {
        self.db.has_pin(&address.to_string()).await
    }

    pub async fn pins(&self) -> Result<Vec<ContentAddress>> {
        self.db
            .list_pins()
            .await?
            .iter()
            .map(|s| s.parse().map_err(BundleStoreError::from))
            .collect()
    }

    /// Bundles uploaded by this node, newest first.
    pub async fn bundles(&self) -> Result<Vec<ContentAddress>> {
        self.db
            .list_bundles()
            .await?
            .iter()
            .map(|s| s.parse().map_err(BundleStoreError::from))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bundle() -> Bundle {
        let mut bundle = Bundle::new();
        bundle.insert("post.json", Bytes::from_static(b"{\"body\":\"hi\"}"));
        bundle.insert("meta.json", Bytes::from_static(b"{\"next\":\"\"}"));
        bundle.insert("photo.png", Bytes::from_static(b"\x89PNG"));
        bundle
    }

    #[tokio::test]
    async fn test_upload_and_walk() {
        let store = ObjectStore::new_ephemeral().await.unwrap();
        let address = store.upload(sample_bundle()).await.unwrap();

        let listing = store.get(&address, "").await.unwrap();
        assert_eq!(
            listing,
            BundleEntry::Listing(vec![
                "meta.json".to_string(),
                "photo.png".to_string(),
                "post.json".to_string(),
            ])
        );
        assert_eq!(store.get(&address, "/").await.unwrap(), listing);

        let meta = store.get_file(&address, "meta.json").await.unwrap();
        assert_eq!(meta, Bytes::from_static(b"{\"next\":\"\"}"));

        assert!(matches!(
            store.get(&address, "missing.txt").await,
            Err(BundleStoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_identical_content_same_address() {
        let store = ObjectStore::new_ephemeral().await.unwrap();
        let a = store.upload(sample_bundle()).await.unwrap();
        let b = store.upload(sample_bundle()).await.unwrap();
        assert_eq!(a, b);

        let mut other = sample_bundle();
        other.insert("extra.txt", Bytes::from_static(b"x"));
        let c = store.upload(other).await.unwrap();
        assert_ne!(a, c);

        assert_eq!(store.bundles().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_rejects_invalid_bundles() {
        let store = ObjectStore::new_ephemeral().await.unwrap();
        assert!(matches!(
            store.upload(Bundle::new()).await,
            Err(BundleStoreError::InvalidBundle(_))
        ));

        let mut nested = Bundle::new();
        nested.insert("dir/file.txt", Bytes::from_static(b"x"));
        assert!(matches!(
            store.upload(nested).await,
            Err(BundleStoreError::InvalidBundle(_))
        ));
    }

    #[tokio::test]
    async fn test_pin_requires_known_bundle() {
        let store = ObjectStore::new_ephemeral().await.unwrap();
        let unknown = ContentAddress::of(b"never uploaded");
        assert!(store.pin(&unknown).await.is_err());
        assert!(!store.is_pinned(&unknown).await.unwrap());

        let address = store.upload(sample_bundle()).await.unwrap();
        store.pin(&address).await.unwrap();
        assert!(store.is_pinned(&address).await.unwrap());
        assert_eq!(store.pins().await.unwrap(), vec![address]);

        assert!(store.unpin(&address).await.unwrap());
        assert!(!store.is_pinned(&address).await.unwrap());
    }

    #[tokio::test]
    async fn test_local_store_persists() {
        let temp_dir = tempfile::tempdir().unwrap();
        let address = {
            let store = ObjectStore::new_local(temp_dir.path()).await.unwrap();
            store.upload(sample_bundle()).await.unwrap()
        };

        let reopened = ObjectStore::new_local(temp_dir.path()).await.unwrap();
        assert!(reopened.has(&address).await.unwrap());
        let post = reopened.get_file(&address, "post.json").await.unwrap();
        assert_eq!(post, Bytes::from_static(b"{\"body\":\"hi\"}"));
    }
}
