//! Local directory: channels this node owns, the follow list, the peer
//! address book and the received-message log.

mod memory;

use std::fmt::Debug;

use async_trait::async_trait;
use object_store::ContentAddress;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::crypto::PublicKey;

pub use memory::{MemoryDirectory, MemoryDirectoryError};

pub const DEFAULT_PAGE_LIMIT: u32 = 10;

/// A self-owned channel. `latest` is the locally cached head and is
/// authoritative for the owner even before the name has propagated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub name: String,
    pub key_handle: String,
    pub external_name: String,
    pub latest: Option<ContentAddress>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Follow {
    pub id: Uuid,
    pub display_name: String,
    pub external_name: String,
    pub latest_address: Option<ContentAddress>,
    pub is_self: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    pub id: Uuid,
    pub display_name: String,
    /// Canonical text form of the peer's recipient key
    pub recipient: String,
    pub peer_id: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewPeer {
    pub display_name: String,
    pub recipient: PublicKey,
    pub peer_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub sender: Option<String>,
    pub body: String,
    #[serde(with = "time::serde::rfc3339")]
    pub received_at: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub skip: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    DEFAULT_PAGE_LIMIT
}

impl Default for Page {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

impl Page {
    pub fn new(skip: u32, limit: u32) -> Self {
        Self { skip, limit }
    }

    /// Everything, for callers that scan the whole table.
    pub fn all() -> Self {
        Self {
            skip: 0,
            limit: u32::MAX,
        }
    }

    pub fn apply<T>(&self, items: impl Iterator<Item = T>) -> Vec<T> {
        items
            .skip(self.skip as usize)
            .take(self.limit as usize)
            .collect()
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DirectoryError<T> {
    #[error("unhandled directory provider error: {0}")]
    Provider(#[from] T),
    #[error("channel '{0}' already exists")]
    ChannelExists(String),
    #[error("channel '{0}' not found")]
    ChannelNotFound(String),
    #[error("already following '{0}'")]
    FollowExists(String),
    #[error("follow {0} not found")]
    FollowNotFound(Uuid),
    #[error("peer {0} not found")]
    PeerNotFound(Uuid),
}

#[async_trait]
pub trait DirectoryProvider: Send + Sync + Debug + Clone + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Register a channel and mirror it into the follow list as a self
    /// follow, so head lookups are uniform across own and followed names.
    async fn create_channel(
        &self,
        name: &str,
        key_handle: &str,
        external_name: &str,
    ) -> Result<Channel, DirectoryError<Self::Error>>;

    async fn channel(&self, name: &str) -> Result<Option<Channel>, DirectoryError<Self::Error>>;

    async fn channels(&self) -> Result<Vec<Channel>, DirectoryError<Self::Error>>;

    /// Drop a channel and soft delete its self follow.
    async fn remove_channel(&self, name: &str) -> Result<Channel, DirectoryError<Self::Error>>;

    /// Advance the cached head of a channel and its self follow.
    async fn set_channel_head(
        &self,
        name: &str,
        address: &ContentAddress,
    ) -> Result<(), DirectoryError<Self::Error>>;

    /// Follow an external name. Following a name that was previously
    /// unfollowed restores the old row, keeping its id and last head.
    async fn add_follow(
        &self,
        display_name: &str,
        external_name: &str,
    ) -> Result<Follow, DirectoryError<Self::Error>>;

    async fn follow(&self, id: Uuid) -> Result<Option<Follow>, DirectoryError<Self::Error>>;

    /// Active follows in insertion order.
    async fn follows(&self, page: Page) -> Result<Vec<Follow>, DirectoryError<Self::Error>>;

    async fn active_follows(&self) -> Result<Vec<Follow>, DirectoryError<Self::Error>> {
        self.follows(Page::all()).await
    }

    async fn remove_follow(&self, id: Uuid) -> Result<(), DirectoryError<Self::Error>>;

    async fn set_follow_head(
        &self,
        id: Uuid,
        address: &ContentAddress,
    ) -> Result<Follow, DirectoryError<Self::Error>>;

    async fn add_peer(&self, peer: NewPeer) -> Result<Peer, DirectoryError<Self::Error>>;

    async fn peers(&self, page: Page) -> Result<Vec<Peer>, DirectoryError<Self::Error>>;

    async fn remove_peer(&self, id: Uuid) -> Result<(), DirectoryError<Self::Error>>;

    async fn append_message(
        &self,
        sender: Option<&str>,
        body: &str,
    ) -> Result<Message, DirectoryError<Self::Error>>;

    /// Received messages, newest first.
    async fn messages(&self, page: Page) -> Result<Vec<Message>, DirectoryError<Self::Error>>;
}
