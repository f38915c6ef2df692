//! Follow polling
//!
//! A [`FollowPoller`] periodically resolves every followed name and
//! compares it with the last head it saw. A changed head is pinned
//! (best effort), persisted, and only then handed to the subscriber. A name
//! that fails to resolve is skipped until the next tick.
//!
//! Each subscription owns one spawned poller through a [`PollerHandle`].
//! Stopping or dropping the handle ends the poller before its next tick.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use uuid::Uuid;

use super::notify::{NotificationSink, SinkClosed};
use crate::directory::{DirectoryProvider, Follow};
use crate::naming::{NameService, ResolveHint};
use crate::store::BundleStore;

pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub interval: Duration,
    pub resolve_timeout: Duration,
    pub pin_timeout: Duration,
    pub hint: ResolveHint,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            resolve_timeout: Duration::from_secs(20),
            pin_timeout: Duration::from_secs(30),
            hint: ResolveHint::Fresh,
        }
    }
}

impl PollerConfig {
    /// Poll interval clamped to the supported range.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval.clamp(MIN_POLL_INTERVAL, MAX_POLL_INTERVAL);
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("failed to load follows: {0}")]
    Directory(String),
    #[error(transparent)]
    SinkClosed(#[from] SinkClosed),
}

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub checked: usize,
    pub unchanged: usize,
    pub updated: usize,
    pub failed: usize,
}

#[derive(Debug, Clone)]
pub struct FollowPoller<D: DirectoryProvider> {
    directory: D,
    names: Arc<dyn NameService>,
    store: Arc<dyn BundleStore>,
    config: PollerConfig,
}

impl<D: DirectoryProvider> FollowPoller<D> {
    pub fn new(
        directory: D,
        names: Arc<dyn NameService>,
        store: Arc<dyn BundleStore>,
        config: PollerConfig,
    ) -> Self {
        Self {
            directory,
            names,
            store,
            config,
        }
    }

    /// Check every followed name once.
    ///
    /// Self-owned follows are skipped: the local head cache is already
    /// authoritative for them.
    pub async fn tick(&self, sink: &NotificationSink) -> Result<TickReport, PollError> {
        let follows = self
            .directory
            .active_follows()
            .await
            .map_err(|e| PollError::Directory(e.to_string()))?;

        let mut report = TickReport::default();
        for follow in follows.into_iter().filter(|f| !f.is_self) {
            report.checked += 1;
            match self.check(follow).await {
                Check::Unchanged => report.unchanged += 1,
                Check::Failed => report.failed += 1,
                Check::Updated(follow) => {
                    sink.send(follow).await?;
                    report.updated += 1;
                }
            }
        }
        Ok(report)
    }

    async fn check(&self, follow: Follow) -> Check {
        let resolve = self.names.resolve(&follow.external_name, self.config.hint);
        let resolved = match tokio::time::timeout(self.config.resolve_timeout, resolve).await {
            Ok(Ok(address)) => address,
            Ok(Err(e)) => {
                tracing::warn!(follow = %follow.external_name, "resolve failed: {}", e);
                return Check::Failed;
            }
            Err(_) => {
                tracing::warn!(follow = %follow.external_name, "resolve timed out");
                return Check::Failed;
            }
        };

        if follow.latest_address == Some(resolved) {
            return Check::Unchanged;
        }

        match tokio::time::timeout(self.config.pin_timeout, self.store.pin(&resolved)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(cid = %resolved, "pin failed: {}", e),
            Err(_) => tracing::warn!(cid = %resolved, "pin timed out"),
        }

        match self.directory.set_follow_head(follow.id, &resolved).await {
            Ok(updated) => {
                tracing::info!(
                    follow = %updated.external_name,
                    cid = %resolved,
                    "follow head advanced"
                );
                Check::Updated(updated)
            }
            Err(e) => {
                tracing::error!(follow = %follow.external_name, "failed to persist head: {}", e);
                Check::Failed
            }
        }
    }

    /// Run the poller on its own task until the handle is stopped or
    /// dropped, or the subscriber goes away.
    pub fn spawn(self, sink: NotificationSink) -> PollerHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(());
        let id = Uuid::new_v4();

        let task = tokio::spawn(async move {
            let mut ticker = interval(self.config.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => break,
                    _ = sink.closed() => break,
                    _ = ticker.tick() => {}
                }

                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => break,
                    result = self.tick(&sink) => match result {
                        Ok(report) => tracing::debug!(poller = %id, ?report, "poll tick finished"),
                        Err(PollError::SinkClosed(_)) => break,
                        Err(e) => tracing::warn!(poller = %id, "poll tick failed: {}", e),
                    },
                }
            }
            tracing::debug!(poller = %id, "poller stopped");
        });

        PollerHandle {
            id,
            shutdown: shutdown_tx,
            task,
        }
    }
}

enum Check {
    Unchanged,
    Updated(Follow),
    Failed,
}

/// Owning handle of a spawned poller. Dropping it stops the poller.
#[derive(Debug)]
pub struct PollerHandle {
    id: Uuid,
    shutdown: watch::Sender<()>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Ask the poller to stop; no tick starts after this returns.
    pub fn stop(&self) {
        let _ = self.shutdown.send(());
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub async fn join(self) {
        if let Err(e) = self.task.await {
            tracing::warn!(poller = %self.id, "poller task failed: {}", e);
        }
    }
}

/// Running pollers keyed by subscription id.
#[derive(Debug, Clone, Default)]
pub struct PollerRegistry {
    pollers: Arc<Mutex<HashMap<Uuid, PollerHandle>>>,
}

impl PollerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, handle: PollerHandle) -> Uuid {
        let id = handle.id();
        let mut pollers = self.pollers.lock();
        pollers.retain(|_, handle| !handle.is_finished());
        pollers.insert(id, handle);
        id
    }

    /// Stop and forget one poller. Returns whether it was registered.
    pub fn stop(&self, id: Uuid) -> bool {
        match self.pollers.lock().remove(&id) {
            Some(handle) => {
                handle.stop();
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.pollers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop every poller and wait for them to finish.
    pub async fn shutdown(&self) {
        let handles: Vec<_> = self.pollers.lock().drain().map(|(_, h)| h).collect();
        for handle in &handles {
            handle.stop();
        }
        for handle in handles {
            handle.join().await;
        }
    }
}
