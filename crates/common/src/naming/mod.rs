//! Mutable names pointing at channel heads.
//!
//! A name is derived from an Ed25519 naming key (`dcn1` + hex of the public
//! key). Publishing signs a [`NameRecord`] that maps the name to a content
//! address; resolvers verify the signature before trusting the value.
//! Propagation is eventually consistent, so the owner of a channel never
//! resolves its own name to find the previous head.

mod jobs;
mod memory;
mod record;

use std::fmt::Debug;

use async_trait::async_trait;
use object_store::ContentAddress;
use serde::{Deserialize, Serialize};

pub use jobs::{NameJob, NameJobDispatcher, NameJobReceiver, NameWorker};
pub use memory::MemoryNameService;
pub use record::{name_for, owner_of, NameRecord, NAME_PREFIX};

/// Handle returned by [`NameService::generate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameKey {
    pub label: String,
    /// Stable external name others follow
    pub name: String,
    /// Opaque handle to the private naming key
    pub key_handle: String,
}

/// Whether a resolve may be answered from a local cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolveHint {
    #[default]
    Fresh,
    Cached,
}

#[derive(Debug, thiserror::Error)]
pub enum NamingError {
    #[error("unknown naming key '{0}'")]
    UnknownKey(String),
    #[error("name '{0}' has not been published")]
    NotPublished(String),
    #[error("name '{0}' is unreachable: {1}")]
    Unreachable(String, String),
    #[error("invalid name '{0}'")]
    InvalidName(String),
    #[error("record for '{0}' failed verification")]
    BadSignature(String),
    #[error("record for '{name}' has sequence {got}, expected more than {current}")]
    StaleSequence {
        name: String,
        got: u64,
        current: u64,
    },
    #[error("naming backend error: {0}")]
    Backend(String),
}

impl NamingError {
    /// Errors a poller should treat as "try again next tick".
    pub fn is_soft(&self) -> bool {
        matches!(
            self,
            NamingError::NotPublished(_) | NamingError::Unreachable(_, _)
        )
    }
}

#[async_trait]
pub trait NameService: Send + Sync + Debug + 'static {
    /// Create a naming key for a new channel.
    async fn generate(&self, label: &str) -> Result<NameKey, NamingError>;

    /// Point the key's name at `address`. May be slow.
    async fn publish(
        &self,
        key_handle: &str,
        address: &ContentAddress,
    ) -> Result<NameRecord, NamingError>;

    async fn resolve(&self, name: &str, hint: ResolveHint) -> Result<ContentAddress, NamingError>;

    async fn remove(&self, key_handle: &str) -> Result<(), NamingError>;

    async fn keys(&self) -> Result<Vec<NameKey>, NamingError>;
}
