use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use common::crypto::{encode_recipient, PublicKey};
use common::feed::{
    self, Alert, FeedPublisher, FollowPoller, PollerConfig, PollerRegistry, PublishLock,
    PublisherConfig, DEFAULT_CHANNEL,
};
use common::directory::Follow;
use common::identity::{IdentityCell, IdentityError, IdentityStore, Keyring};
use common::naming::{NameJobDispatcher, NameService, NameWorker};
use common::store::BundleStore;
use object_store::ObjectStore;

use crate::database::{Database, DatabaseSetupError, SqliteNameRegistry};
use crate::service_config::Config;
use crate::state::IDENTITY_FILE_NAME;

/// Shared handles used by every request handler and background task.
#[derive(Clone, Debug)]
pub struct State {
    database: Database,
    store: Arc<ObjectStore>,
    names: Arc<SqliteNameRegistry>,
    identity: IdentityCell,
    identity_store: IdentityStore,
    /// Held across an identity file change and the matching cell update.
    identity_lock: Arc<Mutex<()>>,
    publisher: FeedPublisher<Database>,
    pollers: PollerRegistry,
    poller_config: PollerConfig,
}

/// Logs every delivered follow update.
#[derive(Debug)]
struct LogAlert;

impl Alert for LogAlert {
    fn alert(&self, follow: &Follow) {
        tracing::info!(
            follow = %follow.display_name,
            cid = ?follow.latest_address.map(|a| a.to_string()),
            "followed channel updated"
        );
    }
}

impl State {
    /// Build the state and the name worker that drains its publish queue.
    pub async fn from_config(config: &Config) -> Result<(Self, NameWorker), StateSetupError> {
        let database = match &config.sqlite_path {
            Some(path) => {
                let url = url::Url::parse(&format!("sqlite://{}", path.display()))?;
                Database::connect(&url).await?
            }
            None => Database::in_memory().await?,
        };

        let store = match &config.sqlite_path {
            Some(path) => {
                let bookkeeping = bookkeeping_path(path);
                ObjectStore::new(&bookkeeping, config.object_store.clone()).await?
            }
            None => ObjectStore::in_memory(config.object_store.clone()).await?,
        };
        let store = Arc::new(store);

        let names = Arc::new(SqliteNameRegistry::new(
            database.clone(),
            config.name_peers.clone(),
        ));
        feed::ensure_channel(&database, names.as_ref(), DEFAULT_CHANNEL)
            .await
            .map_err(|e| StateSetupError::Channel(e.to_string()))?;

        let identity_store = IdentityStore::new(config.app_dir.join(IDENTITY_FILE_NAME));
        let identity = IdentityCell::new();
        if let Some(passphrase) = &config.unlock {
            let keyring = identity_store.get_or_create(passphrase.as_deref())?;
            tracing::info!(
                recipient = %encode_recipient(&keyring.recipient()),
                "identity unlocked at startup"
            );
            identity.unlock(keyring);
        }

        let (dispatcher, receiver) = NameJobDispatcher::new();
        let worker = NameWorker::new(names.clone() as Arc<dyn NameService>, receiver);

        let publisher = FeedPublisher::new(
            database.clone(),
            store.clone() as Arc<dyn BundleStore>,
            identity.clone(),
            dispatcher,
            PublishLock::new(),
            PublisherConfig {
                armor: config.armor,
                ..Default::default()
            },
        );

        let state = Self {
            database,
            store,
            names,
            identity,
            identity_store,
            identity_lock: Arc::new(Mutex::new(())),
            publisher,
            pollers: PollerRegistry::new(),
            poller_config: PollerConfig::default().with_interval(config.poll_interval),
        };
        Ok((state, worker))
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn store(&self) -> &Arc<ObjectStore> {
        &self.store
    }

    pub fn names(&self) -> &Arc<SqliteNameRegistry> {
        &self.names
    }

    pub fn identity(&self) -> &IdentityCell {
        &self.identity
    }

    pub fn publisher(&self) -> &FeedPublisher<Database> {
        &self.publisher
    }

    pub fn pollers(&self) -> &PollerRegistry {
        &self.pollers
    }

    /// A fresh poller over the follow list.
    pub fn poller(&self) -> FollowPoller<Database> {
        FollowPoller::new(
            self.database.clone(),
            self.names.clone() as Arc<dyn NameService>,
            self.store.clone() as Arc<dyn BundleStore>,
            self.poller_config.clone(),
        )
    }

    pub fn alert(&self) -> Arc<dyn Alert> {
        Arc::new(LogAlert)
    }

    /// Open (or create) the identity file and make it current.
    pub fn unlock(&self, passphrase: Option<&str>) -> Result<PublicKey, IdentityError> {
        let _guard = self.identity_lock.lock();
        let keyring = self.identity_store.get_or_create(passphrase)?;
        let recipient = keyring.recipient();
        self.identity.unlock(keyring);
        Ok(recipient)
    }

    /// Add a new current key, keeping every older one for decryption.
    pub fn rotate(&self, passphrase: Option<&str>) -> Result<PublicKey, IdentityError> {
        let _guard = self.identity_lock.lock();
        let keyring: Keyring = self.identity_store.rotate(passphrase)?;
        let recipient = keyring.recipient();
        self.identity.unlock(keyring);
        Ok(recipient)
    }
}

/// Store bookkeeping sits next to the directory database.
fn bookkeeping_path(sqlite_path: &Path) -> std::path::PathBuf {
    sqlite_path.with_file_name("objects.sqlite")
}

#[derive(Debug, thiserror::Error)]
pub enum StateSetupError {
    #[error("failed to setup the database: {0}")]
    DatabaseSetupError(#[from] DatabaseSetupError),
    #[error("failed to setup the object store: {0}")]
    ObjectStore(#[from] object_store::BundleStoreError),
    #[error("invalid database path: {0}")]
    DatabaseUrl(#[from] url::ParseError),
    #[error("failed to prepare the default channel: {0}")]
    Channel(String),
    #[error("failed to unlock identity: {0}")]
    Identity(#[from] IdentityError),
}
