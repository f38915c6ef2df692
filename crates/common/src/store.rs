//! The content-addressed store as seen by the feed engine.

use async_trait::async_trait;
use bytes::Bytes;
use object_store::{Bundle, BundleEntry, BundleStoreError, ContentAddress, ObjectStore};

#[async_trait]
pub trait BundleStore: Send + Sync + std::fmt::Debug + 'static {
    async fn upload(&self, bundle: Bundle) -> Result<ContentAddress, BundleStoreError>;

    /// A listing for an empty subpath, file bytes otherwise.
    async fn get(
        &self,
        address: &ContentAddress,
        subpath: &str,
    ) -> Result<BundleEntry, BundleStoreError>;

    async fn pin(&self, address: &ContentAddress) -> Result<(), BundleStoreError>;

    async fn get_file(
        &self,
        address: &ContentAddress,
        name: &str,
    ) -> Result<Bytes, BundleStoreError> {
        match self.get(address, name).await? {
            BundleEntry::File(bytes) => Ok(bytes),
            BundleEntry::Listing(_) => Err(BundleStoreError::NotFound(format!(
                "{}/{}",
                address, name
            ))),
        }
    }
}

#[async_trait]
impl BundleStore for ObjectStore {
    async fn upload(&self, bundle: Bundle) -> Result<ContentAddress, BundleStoreError> {
        ObjectStore::upload(self, bundle).await
    }

    async fn get(
        &self,
        address: &ContentAddress,
        subpath: &str,
    ) -> Result<BundleEntry, BundleStoreError> {
        ObjectStore::get(self, address, subpath).await
    }

    async fn pin(&self, address: &ContentAddress) -> Result<(), BundleStoreError> {
        ObjectStore::pin(self, address).await
    }

    async fn get_file(
        &self,
        address: &ContentAddress,
        name: &str,
    ) -> Result<Bytes, BundleStoreError> {
        ObjectStore::get_file(self, address, name).await
    }
}
