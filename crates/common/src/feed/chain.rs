//! Reading posts back and walking a channel's chain.

use std::collections::HashSet;

use bytes::Bytes;
use object_store::{BundleEntry, BundleStoreError, ContentAddress};

use super::post::{Meta, Post, META_FILE, POST_FILE};
use crate::crypto::{envelope, EnvelopeError, Identity};
use crate::store::BundleStore;

#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("store error: {0}")]
    Store(#[from] BundleStoreError),
    #[error("decryption failed: {0}")]
    Decryption(#[from] EnvelopeError),
    #[error("invalid {0}: {1}")]
    Json(&'static str, serde_json::Error),
    #[error("chain loops back to {0}")]
    Cycle(ContentAddress),
}

/// Names of the files in a post bundle.
pub async fn list(
    store: &dyn BundleStore,
    address: &ContentAddress,
) -> Result<Vec<String>, ChainError> {
    match store.get(address, "").await? {
        BundleEntry::Listing(names) => Ok(names),
        BundleEntry::File(_) => Ok(Vec::new()),
    }
}

pub async fn read_meta(
    store: &dyn BundleStore,
    address: &ContentAddress,
) -> Result<Meta, ChainError> {
    let raw = store.get_file(address, META_FILE).await?;
    serde_json::from_slice(&raw).map_err(|e| ChainError::Json(META_FILE, e))
}

/// Read any file of a bundle, decrypting it when it is an envelope.
pub async fn read_file(
    store: &dyn BundleStore,
    address: &ContentAddress,
    name: &str,
    identities: &[Identity],
) -> Result<Bytes, ChainError> {
    let raw = store.get_file(address, name).await?;
    Ok(envelope::decrypt(identities, &raw)?.into())
}

pub async fn read_post(
    store: &dyn BundleStore,
    address: &ContentAddress,
    identities: &[Identity],
) -> Result<Post, ChainError> {
    let raw = read_file(store, address, POST_FILE, identities).await?;
    serde_json::from_slice(&raw).map_err(|e| ChainError::Json(POST_FILE, e))
}

/// Walk back from `head` following `next`, newest first, reading at most
/// `limit` bundles. Only metadata is read, so no keys are needed.
pub async fn walk(
    store: &dyn BundleStore,
    head: &ContentAddress,
    limit: usize,
) -> Result<Vec<(ContentAddress, Meta)>, ChainError> {
    let mut seen = HashSet::new();
    let mut entries = Vec::new();
    let mut cursor = Some(*head);

    while let Some(address) = cursor {
        if entries.len() >= limit {
            break;
        }
        if !seen.insert(address) {
            return Err(ChainError::Cycle(address));
        }
        let meta = read_meta(store, &address).await?;
        cursor = meta.next;
        entries.push((address, meta));
    }
    Ok(entries)
}
