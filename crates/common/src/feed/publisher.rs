//! Publishing posts onto a channel.
//!
//! Every publish reads the previous head from the local channel cache,
//! uploads the new bundle and advances the cache while holding one
//! process-wide [`PublishLock`]. That lock is what keeps two concurrent
//! publishes from chaining onto the same predecessor. The name update runs
//! afterwards on the name worker and never fails a publish.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use object_store::{Bundle, BundleStoreError, ContentAddress};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::{Mutex, MutexGuard};

use super::post::{Meta, Post, DEFAULT_POST_TYPE, META_FILE, POST_FILE, RESERVED_FILENAMES};
use crate::crypto::{
    encode_recipient, envelope, parse_recipient, EnvelopeError, PublicKey, Recipient,
    RecipientParseError,
};
use crate::directory::{Channel, DirectoryProvider};
use crate::identity::{IdentityCell, KeyNotReady};
use crate::naming::{NameJob, NameJobDispatcher};
use crate::store::BundleStore;

pub const DEFAULT_CHANNEL: &str = "default";
pub const DEFAULT_UPLOAD_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error(transparent)]
    KeyNotReady(#[from] KeyNotReady),
    #[error(transparent)]
    RecipientParse(#[from] RecipientParseError),
    #[error("attachment name '{0}' conflicts with a reserved or repeated filename")]
    FilenameConflict(String),
    #[error("invalid attachment name '{0}'")]
    InvalidFilename(String),
    #[error("channel '{0}' not found")]
    ChannelNotFound(String),
    #[error("encryption failed: {0}")]
    Encryption(#[from] EnvelopeError),
    #[error("failed to serialize post: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("upload failed: {0}")]
    Upload(#[from] BundleStoreError),
    #[error("upload timed out after {0:?}")]
    UploadTimeout(Duration),
    #[error("{stage} persistence failed: {message}")]
    Persistence {
        stage: &'static str,
        message: String,
    },
}

impl PublishError {
    /// The stage of the publish pipeline that failed.
    pub fn stage(&self) -> &'static str {
        match self {
            PublishError::KeyNotReady(_) => "identity",
            PublishError::RecipientParse(_) => "recipients",
            PublishError::FilenameConflict(_) | PublishError::InvalidFilename(_) => "attachments",
            PublishError::ChannelNotFound(_) => "channel",
            PublishError::Encryption(_) | PublishError::Serialization(_) => "encrypt",
            PublishError::Upload(_) | PublishError::UploadTimeout(_) => "upload",
            PublishError::Persistence { stage, .. } => *stage,
        }
    }
}

/// One named attachment stream.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub name: String,
    pub data: Bytes,
}

impl Attachment {
    pub fn new(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PublishRequest {
    /// Target channel; the configured default when `None`
    pub channel: Option<String>,
    pub body: String,
    pub post_type: Option<String>,
    pub attachments: Vec<Attachment>,
    /// Recipient keys in text form. Empty publishes a public post.
    pub recipients: Vec<String>,
    /// Start a new chain instead of linking to the cached head
    pub genesis: bool,
}

impl PublishRequest {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            ..Default::default()
        }
    }

    pub fn channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    pub fn recipients(mut self, recipients: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.recipients = recipients.into_iter().map(Into::into).collect();
        self
    }

    pub fn attachment(mut self, name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        self.attachments.push(Attachment::new(name, data));
        self
    }

    pub fn genesis(mut self) -> Self {
        self.genesis = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRecord {
    pub cid: ContentAddress,
    /// External name of the channel the post was published on
    pub name: String,
}

/// Serializes every publish critical section in the process.
#[derive(Debug, Clone, Default)]
pub struct PublishLock(Arc<Mutex<()>>);

impl PublishLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self) -> MutexGuard<'_, ()> {
        self.0.lock().await
    }
}

#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Armor encrypted files as text
    pub armor: bool,
    pub default_channel: String,
    pub upload_timeout: Duration,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            armor: false,
            default_channel: DEFAULT_CHANNEL.to_string(),
            upload_timeout: DEFAULT_UPLOAD_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FeedPublisher<D: DirectoryProvider> {
    directory: D,
    store: Arc<dyn BundleStore>,
    identity: IdentityCell,
    names: NameJobDispatcher,
    lock: PublishLock,
    config: PublisherConfig,
}

impl<D: DirectoryProvider> FeedPublisher<D> {
    pub fn new(
        directory: D,
        store: Arc<dyn BundleStore>,
        identity: IdentityCell,
        names: NameJobDispatcher,
        lock: PublishLock,
        config: PublisherConfig,
    ) -> Self {
        Self {
            directory,
            store,
            identity,
            names,
            lock,
            config,
        }
    }

    pub fn config(&self) -> &PublisherConfig {
        &self.config
    }

    pub async fn publish(&self, request: PublishRequest) -> Result<PostRecord, PublishError> {
        let keyring = self.identity.current()?;
        let recipients = effective_recipients(&request.recipients, keyring.recipient())?;
        check_attachment_names(&request.attachments)?;

        let channel_name = request
            .channel
            .clone()
            .unwrap_or_else(|| self.config.default_channel.clone());

        let post = Post {
            body: request.body,
            post_type: request
                .post_type
                .unwrap_or_else(|| DEFAULT_POST_TYPE.to_string()),
            attachments: request.attachments.iter().map(|a| a.name.clone()).collect(),
        };
        let mut bundle = Bundle::new();
        bundle.insert(POST_FILE, self.seal(&recipients, &serde_json::to_vec(&post)?)?);
        for attachment in &request.attachments {
            bundle.insert(
                attachment.name.clone(),
                self.seal(&recipients, &attachment.data)?,
            );
        }

        let _guard = self.lock.acquire().await;

        let channel = self.channel(&channel_name).await?;
        let next = if request.genesis { None } else { channel.latest };
        let meta = Meta {
            to: recipients.iter().map(encode_recipient).collect(),
            next,
            created_at: OffsetDateTime::now_utc(),
        };
        bundle.insert(META_FILE, serde_json::to_vec(&meta)?);

        let cid = tokio::time::timeout(self.config.upload_timeout, self.store.upload(bundle))
            .await
            .map_err(|_| PublishError::UploadTimeout(self.config.upload_timeout))??;

        self.directory
            .set_channel_head(&channel.name, &cid)
            .await
            .map_err(|e| PublishError::Persistence {
                stage: "head-cache",
                message: e.to_string(),
            })?;

        tracing::info!(
            channel = %channel.name,
            cid = %cid,
            previous = ?next.map(|n| n.to_string()),
            recipients = recipients.len(),
            "published post"
        );

        if let Err(e) = self.names.dispatch(NameJob {
            channel: channel.name.clone(),
            key_handle: channel.key_handle.clone(),
            address: cid,
        }) {
            tracing::warn!(channel = %channel.name, cid = %cid, "name publish not queued: {}", e);
        }

        Ok(PostRecord {
            cid,
            name: channel.external_name,
        })
    }

    async fn channel(&self, name: &str) -> Result<Channel, PublishError> {
        self.directory
            .channel(name)
            .await
            .map_err(|e| PublishError::Persistence {
                stage: "channel",
                message: e.to_string(),
            })?
            .ok_or_else(|| PublishError::ChannelNotFound(name.to_string()))
    }

    /// Plaintext for a public post, an envelope otherwise.
    fn seal(&self, recipients: &[PublicKey], data: &[u8]) -> Result<Bytes, PublishError> {
        if recipients.is_empty() {
            return Ok(Bytes::copy_from_slice(data));
        }
        let recipients: Vec<Recipient> = recipients.iter().copied().map(Recipient::Key).collect();
        Ok(envelope::encrypt(&recipients, data, self.config.armor)?.into())
    }
}

/// Requested recipients plus the author, or nobody for a public post.
fn effective_recipients(
    requested: &[String],
    author: PublicKey,
) -> Result<Vec<PublicKey>, RecipientParseError> {
    if requested.is_empty() {
        return Ok(Vec::new());
    }

    let mut seen = HashSet::new();
    let mut recipients = Vec::with_capacity(requested.len() + 1);
    for raw in requested {
        let key = parse_recipient(raw)?;
        if seen.insert(key) {
            recipients.push(key);
        }
    }
    if seen.insert(author) {
        recipients.push(author);
    }
    Ok(recipients)
}

fn check_attachment_names(attachments: &[Attachment]) -> Result<(), PublishError> {
    let mut seen = HashSet::new();
    for attachment in attachments {
        let name = attachment.name.as_str();
        if name.is_empty() || name.contains('/') || name == "." || name == ".." {
            return Err(PublishError::InvalidFilename(name.to_string()));
        }
        if RESERVED_FILENAMES.contains(&name) || !seen.insert(name) {
            return Err(PublishError::FilenameConflict(name.to_string()));
        }
    }
    Ok(())
}
