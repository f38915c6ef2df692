//! Error types for the bundle store.

use crate::address::{AddressError, ContentAddress};

/// Errors that can occur when working with the bundle store.
#[derive(Debug, thiserror::Error)]
pub enum BundleStoreError {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Object storage error
    #[error("object storage error: {0}")]
    ObjectStore(#[from] object_store::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Migration error
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error(transparent)]
    Address(#[from] AddressError),

    /// Bundle index could not be decoded
    #[error("corrupt bundle index for {0}: {1}")]
    CorruptIndex(ContentAddress, serde_json::Error),

    /// Bundle or file within a bundle not found
    #[error("not found: {0}")]
    NotFound(String),

    /// A blob referenced by an index is missing from storage
    #[error("bundle {0} references missing blob {1}")]
    MissingBlob(ContentAddress, String),

    /// Invalid bundle contents
    #[error("invalid bundle: {0}")]
    InvalidBundle(String),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// S3 bucket not found - must be created before use
    #[error("S3 bucket '{0}' does not exist. Create it before starting the node.")]
    BucketNotFound(String),
}

/// Result type alias for bundle store operations.
pub type Result<T> = std::result::Result<T, BundleStoreError>;
