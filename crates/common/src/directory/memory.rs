use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use object_store::ContentAddress;
use time::OffsetDateTime;
use uuid::Uuid;

use super::{
    Channel, DirectoryError, DirectoryProvider, Follow, Message, NewPeer, Page, Peer,
};
use crate::crypto::encode_recipient;

/// In-memory directory
#[derive(Debug, Clone, Default)]
pub struct MemoryDirectory {
    inner: Arc<RwLock<MemoryDirectoryInner>>,
}

#[derive(Debug, Default)]
struct MemoryDirectoryInner {
    channels: HashMap<String, Channel>,
    /// Insertion ordered; removed rows stay with `deleted` set
    follows: Vec<(Follow, bool)>,
    peers: Vec<(Peer, bool)>,
    messages: Vec<Message>,
    /// Number of writes to follow heads, for tests
    follow_head_writes: usize,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryDirectoryError {
    #[error("memory directory error: {0}")]
    Internal(String),
}

type Result<T> = std::result::Result<T, DirectoryError<MemoryDirectoryError>>;

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryDirectoryInner>> {
        self.inner.read().map_err(|e| {
            DirectoryError::Provider(MemoryDirectoryError::Internal(format!(
                "failed to acquire read lock: {}",
                e
            )))
        })
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryDirectoryInner>> {
        self.inner.write().map_err(|e| {
            DirectoryError::Provider(MemoryDirectoryError::Internal(format!(
                "failed to acquire write lock: {}",
                e
            )))
        })
    }

    /// How many times a follow head has been written.
    pub fn follow_head_writes(&self) -> usize {
        self.inner
            .read()
            .map(|inner| inner.follow_head_writes)
            .unwrap_or_default()
    }
}

impl MemoryDirectoryInner {
    fn upsert_follow(&mut self, display_name: &str, external_name: &str, is_self: bool) -> Follow {
        if let Some((follow, deleted)) = self
            .follows
            .iter_mut()
            .find(|(f, _)| f.external_name == external_name)
        {
            *deleted = false;
            follow.display_name = display_name.to_string();
            follow.is_self = is_self;
            return follow.clone();
        }

        let follow = Follow {
            id: Uuid::new_v4(),
            display_name: display_name.to_string(),
            external_name: external_name.to_string(),
            latest_address: None,
            is_self,
            created_at: OffsetDateTime::now_utc(),
        };
        self.follows.push((follow.clone(), false));
        follow
    }

    fn active_follow_mut(&mut self, id: Uuid) -> Option<&mut Follow> {
        self.follows
            .iter_mut()
            .find(|(f, deleted)| f.id == id && !deleted)
            .map(|(f, _)| f)
    }
}

#[async_trait]
impl DirectoryProvider for MemoryDirectory {
    type Error = MemoryDirectoryError;

    async fn create_channel(
        &self,
        name: &str,
        key_handle: &str,
        external_name: &str,
    ) -> Result<Channel> {
        let mut inner = self.write()?;
        if inner.channels.contains_key(name) {
            return Err(DirectoryError::ChannelExists(name.to_string()));
        }

        let channel = Channel {
            name: name.to_string(),
            key_handle: key_handle.to_string(),
            external_name: external_name.to_string(),
            latest: None,
            created_at: OffsetDateTime::now_utc(),
        };
        inner.channels.insert(name.to_string(), channel.clone());
        inner.upsert_follow(name, external_name, true);
        Ok(channel)
    }

    async fn channel(&self, name: &str) -> Result<Option<Channel>> {
        Ok(self.read()?.channels.get(name).cloned())
    }

    async fn channels(&self) -> Result<Vec<Channel>> {
        let mut channels: Vec<_> = self.read()?.channels.values().cloned().collect();
        channels.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.name.cmp(&b.name)));
        Ok(channels)
    }

    async fn remove_channel(&self, name: &str) -> Result<Channel> {
        let mut inner = self.write()?;
        let channel = inner
            .channels
            .remove(name)
            .ok_or_else(|| DirectoryError::ChannelNotFound(name.to_string()))?;
        for (follow, deleted) in inner.follows.iter_mut() {
            if follow.is_self && follow.external_name == channel.external_name {
                *deleted = true;
            }
        }
        Ok(channel)
    }

    async fn set_channel_head(&self, name: &str, address: &ContentAddress) -> Result<()> {
        let mut inner = self.write()?;
        let channel = inner
            .channels
            .get_mut(name)
            .ok_or_else(|| DirectoryError::ChannelNotFound(name.to_string()))?;
        channel.latest = Some(*address);
        let external_name = channel.external_name.clone();

        for (follow, _) in inner.follows.iter_mut() {
            if follow.is_self && follow.external_name == external_name {
                follow.latest_address = Some(*address);
            }
        }
        Ok(())
    }

    async fn add_follow(&self, display_name: &str, external_name: &str) -> Result<Follow> {
        let mut inner = self.write()?;
        let active = inner
            .follows
            .iter()
            .any(|(f, deleted)| f.external_name == external_name && !deleted);
        if active {
            return Err(DirectoryError::FollowExists(external_name.to_string()));
        }
        Ok(inner.upsert_follow(display_name, external_name, false))
    }

    async fn follow(&self, id: Uuid) -> Result<Option<Follow>> {
        Ok(self
            .read()?
            .follows
            .iter()
            .find(|(f, deleted)| f.id == id && !deleted)
            .map(|(f, _)| f.clone()))
    }

    async fn follows(&self, page: Page) -> Result<Vec<Follow>> {
        let inner = self.read()?;
        Ok(page.apply(
            inner
                .follows
                .iter()
                .filter(|(_, deleted)| !deleted)
                .map(|(f, _)| f.clone()),
        ))
    }

    async fn remove_follow(&self, id: Uuid) -> Result<()> {
        let mut inner = self.write()?;
        let (_, deleted) = inner
            .follows
            .iter_mut()
            .find(|(f, deleted)| f.id == id && !*deleted)
            .ok_or(DirectoryError::FollowNotFound(id))?;
        *deleted = true;
        Ok(())
    }

    async fn set_follow_head(&self, id: Uuid, address: &ContentAddress) -> Result<Follow> {
        let mut inner = self.write()?;
        let follow = inner
            .active_follow_mut(id)
            .ok_or(DirectoryError::FollowNotFound(id))?;
        follow.latest_address = Some(*address);
        let follow = follow.clone();
        inner.follow_head_writes += 1;
        Ok(follow)
    }

    async fn add_peer(&self, peer: NewPeer) -> Result<Peer> {
        let peer = Peer {
            id: Uuid::new_v4(),
            display_name: peer.display_name,
            recipient: encode_recipient(&peer.recipient),
            peer_id: peer.peer_id,
            created_at: OffsetDateTime::now_utc(),
        };
        self.write()?.peers.push((peer.clone(), false));
        Ok(peer)
    }

    async fn peers(&self, page: Page) -> Result<Vec<Peer>> {
        let inner = self.read()?;
        Ok(page.apply(
            inner
                .peers
                .iter()
                .filter(|(_, deleted)| !deleted)
                .map(|(p, _)| p.clone()),
        ))
    }

    async fn remove_peer(&self, id: Uuid) -> Result<()> {
        let mut inner = self.write()?;
        let (_, deleted) = inner
            .peers
            .iter_mut()
            .find(|(p, deleted)| p.id == id && !*deleted)
            .ok_or(DirectoryError::PeerNotFound(id))?;
        *deleted = true;
        Ok(())
    }

    async fn append_message(&self, sender: Option<&str>, body: &str) -> Result<Message> {
        let message = Message {
            id: Uuid::new_v4(),
            sender: sender.map(str::to_string),
            body: body.to_string(),
            received_at: OffsetDateTime::now_utc(),
        };
        self.write()?.messages.push(message.clone());
        Ok(message)
    }

    async fn messages(&self, page: Page) -> Result<Vec<Message>> {
        let inner = self.read()?;
        Ok(page.apply(inner.messages.iter().rev().cloned()))
    }
}
