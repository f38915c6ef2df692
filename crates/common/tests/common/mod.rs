//! Shared harness for feed integration tests
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use common::directory::{Channel, MemoryDirectory};
use common::feed::{
    create_channel, FeedPublisher, FollowPoller, PollerConfig, PublishLock, PublisherConfig,
};
use common::identity::{IdentityCell, Keyring};
use common::naming::{
    MemoryNameService, NameJobDispatcher, NameService, NameWorker, ResolveHint,
};
use common::prelude::ContentAddress;
use common::store::BundleStore;
use object_store::ObjectStore;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub struct TestFeed {
    pub directory: MemoryDirectory,
    pub store: Arc<ObjectStore>,
    pub names: MemoryNameService,
    pub identity: IdentityCell,
    pub keyring: Keyring,
    pub publisher: FeedPublisher<MemoryDirectory>,
    pub channel: Channel,
    _shutdown: watch::Sender<()>,
    _worker: JoinHandle<()>,
}

/// One identity with an unlocked keyring and a `default` channel.
pub async fn setup() -> TestFeed {
    setup_with(MemoryNameService::new(), PublisherConfig::default()).await
}

pub async fn setup_with(names: MemoryNameService, config: PublisherConfig) -> TestFeed {
    let store = Arc::new(ObjectStore::new_ephemeral().await.unwrap());
    setup_sharing(store, names, config).await
}

/// A second identity on the same store and naming network.
pub async fn setup_sharing(
    store: Arc<ObjectStore>,
    names: MemoryNameService,
    config: PublisherConfig,
) -> TestFeed {
    let directory = MemoryDirectory::new();
    let keyring = Keyring::generate();
    let identity = IdentityCell::unlocked(keyring.clone());

    let (dispatcher, receiver) = NameJobDispatcher::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let worker = tokio::spawn(
        NameWorker::new(Arc::new(names.clone()), receiver).run(shutdown_rx),
    );

    let channel = create_channel(&directory, &names, &config.default_channel)
        .await
        .unwrap();

    let publisher = FeedPublisher::new(
        directory.clone(),
        store.clone() as Arc<dyn BundleStore>,
        identity.clone(),
        dispatcher,
        PublishLock::new(),
        config,
    );

    TestFeed {
        directory,
        store,
        names,
        identity,
        keyring,
        publisher,
        channel,
        _shutdown: shutdown_tx,
        _worker: worker,
    }
}

impl TestFeed {
    pub fn poller(&self, config: PollerConfig) -> FollowPoller<MemoryDirectory> {
        FollowPoller::new(
            self.directory.clone(),
            Arc::new(self.names.clone()),
            self.store.clone() as Arc<dyn BundleStore>,
            config,
        )
    }

    pub fn store(&self) -> &dyn BundleStore {
        self.store.as_ref()
    }
}

/// Poller settings for real-time tests.
pub fn fast_poller() -> PollerConfig {
    PollerConfig {
        interval: Duration::from_millis(50),
        resolve_timeout: Duration::from_millis(500),
        pin_timeout: Duration::from_millis(500),
        ..Default::default()
    }
}

/// Wait until `name` resolves to `expected` through the name worker.
pub async fn wait_for_name(names: &MemoryNameService, name: &str, expected: ContentAddress) {
    let wait = async {
        loop {
            if let Ok(current) = names.resolve(name, ResolveHint::Fresh).await {
                if current == expected {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(5), wait)
        .await
        .expect("name never resolved to the expected head");
}
