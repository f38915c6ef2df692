//! The feed engine: publishing chained post bundles and following other
//! channels' heads.

pub mod chain;
mod notify;
mod poller;
mod post;
mod publisher;

use crate::directory::{Channel, DirectoryError, DirectoryProvider};
use crate::naming::{NameService, NamingError};

pub use chain::ChainError;
pub use notify::{notification_channel, Alert, NotificationSink, Notifications, SinkClosed};
pub use poller::{
    FollowPoller, PollError, PollerConfig, PollerHandle, PollerRegistry, TickReport,
    DEFAULT_POLL_INTERVAL, MAX_POLL_INTERVAL, MIN_POLL_INTERVAL,
};
pub use post::{Meta, Post, DEFAULT_POST_TYPE, META_FILE, POST_FILE, RESERVED_FILENAMES};
pub use publisher::{
    Attachment, FeedPublisher, PostRecord, PublishError, PublishLock, PublishRequest,
    PublisherConfig, DEFAULT_CHANNEL,
};

#[derive(Debug, thiserror::Error)]
pub enum ChannelError<T> {
    #[error(transparent)]
    Naming(#[from] NamingError),
    #[error(transparent)]
    Directory(#[from] DirectoryError<T>),
}

/// Create a naming key for `name` and register the channel.
///
/// The key is removed again if the channel cannot be registered.
pub async fn create_channel<D: DirectoryProvider>(
    directory: &D,
    names: &dyn NameService,
    name: &str,
) -> Result<Channel, ChannelError<D::Error>> {
    let key = names.generate(name).await?;
    match directory
        .create_channel(name, &key.key_handle, &key.name)
        .await
    {
        Ok(channel) => {
            tracing::info!(channel = %name, external_name = %key.name, "created channel");
            Ok(channel)
        }
        Err(e) => {
            if let Err(cleanup) = names.remove(&key.key_handle).await {
                tracing::warn!(channel = %name, "failed to remove unused naming key: {}", cleanup);
            }
            Err(e.into())
        }
    }
}

/// The channel called `name`, created on first use.
pub async fn ensure_channel<D: DirectoryProvider>(
    directory: &D,
    names: &dyn NameService,
    name: &str,
) -> Result<Channel, ChannelError<D::Error>> {
    match directory.channel(name).await? {
        Some(channel) => Ok(channel),
        None => create_channel(directory, names, name).await,
    }
}

/// Drop a channel and its naming key.
pub async fn remove_channel<D: DirectoryProvider>(
    directory: &D,
    names: &dyn NameService,
    name: &str,
) -> Result<Channel, ChannelError<D::Error>> {
    let channel = directory.remove_channel(name).await?;
    if let Err(e) = names.remove(&channel.key_handle).await {
        tracing::warn!(channel = %name, "failed to remove naming key: {}", e);
    }
    Ok(channel)
}
