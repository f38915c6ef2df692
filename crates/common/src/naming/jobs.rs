//! Background name publishing
//!
//! Publishing a name can take a long time, so the feed publisher only
//! queues a [`NameJob`] after the head is cached locally. A single
//! [`NameWorker`] drains the queue in order, which keeps a slow publish of
//! an older head from landing after a newer one.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use object_store::ContentAddress;
use tokio::sync::watch;

use super::NameService;

pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameJob {
    pub channel: String,
    pub key_handle: String,
    pub address: ContentAddress,
}

/// Cloneable sending half of the name job queue
#[derive(Debug, Clone)]
pub struct NameJobDispatcher {
    tx: flume::Sender<NameJob>,
}

impl NameJobDispatcher {
    pub fn new() -> (Self, NameJobReceiver) {
        let (tx, rx) = flume::unbounded();
        (Self { tx }, NameJobReceiver { rx })
    }

    /// Queue a job. Fails only once the worker has gone away.
    pub fn dispatch(&self, job: NameJob) -> Result<()> {
        tracing::debug!(channel = %job.channel, cid = %job.address, "queueing name publish");
        self.tx
            .send(job)
            .map_err(|_| anyhow::anyhow!("name job receiver has been dropped"))
    }
}

#[derive(Debug)]
pub struct NameJobReceiver {
    rx: flume::Receiver<NameJob>,
}

impl NameJobReceiver {
    pub fn try_recv(&self) -> Option<NameJob> {
        self.rx.try_recv().ok()
    }

    /// Next job plus everything already queued behind it, keeping only the
    /// newest job per naming key. `None` once every dispatcher is dropped.
    async fn next_batch(&self) -> Option<Vec<NameJob>> {
        let first = self.rx.recv_async().await.ok()?;
        let mut batch = vec![first];
        while let Ok(job) = self.rx.try_recv() {
            batch.retain(|queued| queued.key_handle != job.key_handle);
            batch.push(job);
        }
        Some(batch)
    }
}

#[derive(Debug)]
pub struct NameWorker {
    names: Arc<dyn NameService>,
    receiver: NameJobReceiver,
    publish_timeout: Duration,
}

impl NameWorker {
    pub fn new(names: Arc<dyn NameService>, receiver: NameJobReceiver) -> Self {
        Self {
            names,
            receiver,
            publish_timeout: DEFAULT_PUBLISH_TIMEOUT,
        }
    }

    pub fn with_publish_timeout(mut self, timeout: Duration) -> Self {
        self.publish_timeout = timeout;
        self
    }

    /// Process jobs until shutdown or until every dispatcher is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<()>) {
        loop {
            let batch = tokio::select! {
                _ = shutdown.changed() => {
                    tracing::debug!("name worker shutting down");
                    break;
                }
                batch = self.receiver.next_batch() => match batch {
                    Some(batch) => batch,
                    None => break,
                },
            };

            for job in batch {
                self.process(job).await;
            }
        }
    }

    async fn process(&self, job: NameJob) {
        let publish = self.names.publish(&job.key_handle, &job.address);
        match tokio::time::timeout(self.publish_timeout, publish).await {
            Ok(Ok(record)) => tracing::info!(
                channel = %job.channel,
                cid = %job.address,
                sequence = record.sequence,
                "published channel head"
            ),
            Ok(Err(e)) => tracing::warn!(
                channel = %job.channel,
                cid = %job.address,
                "failed to publish channel head: {}",
                e
            ),
            Err(_) => tracing::warn!(
                channel = %job.channel,
                cid = %job.address,
                "timed out publishing channel head"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::naming::{MemoryNameService, ResolveHint};

    #[tokio::test]
    async fn test_worker_publishes_in_order() {
        let names = MemoryNameService::new();
        let key = names.generate("main").await.unwrap();
        let (dispatcher, receiver) = NameJobDispatcher::new();

        for seed in [b"1", b"2", b"3"] {
            dispatcher
                .dispatch(NameJob {
                    channel: "main".into(),
                    key_handle: key.key_handle.clone(),
                    address: ContentAddress::of(seed),
                })
                .unwrap();
        }
        drop(dispatcher);

        let (_tx, shutdown) = watch::channel(());
        NameWorker::new(Arc::new(names.clone()), receiver)
            .run(shutdown)
            .await;

        assert_eq!(
            names.resolve(&key.name, ResolveHint::Fresh).await.unwrap(),
            ContentAddress::of(b"3")
        );
    }

    #[tokio::test]
    async fn test_batch_coalesces_per_key() {
        let (dispatcher, receiver) = NameJobDispatcher::new();
        let job = |handle: &str, seed: &[u8]| NameJob {
            channel: handle.into(),
            key_handle: handle.into(),
            address: ContentAddress::of(seed),
        };
        dispatcher.dispatch(job("a", b"1")).unwrap();
        dispatcher.dispatch(job("b", b"1")).unwrap();
        dispatcher.dispatch(job("a", b"2")).unwrap();

        let batch = receiver.next_batch().await.unwrap();
        assert_eq!(batch, vec![job("b", b"1"), job("a", b"2")]);
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_worker() {
        let names = MemoryNameService::new();
        let key = names.generate("main").await.unwrap();
        let (dispatcher, receiver) = NameJobDispatcher::new();
        dispatcher
            .dispatch(NameJob {
                channel: "ghost".into(),
                key_handle: "missing".into(),
                address: ContentAddress::of(b"x"),
            })
            .unwrap();
        dispatcher
            .dispatch(NameJob {
                channel: "main".into(),
                key_handle: key.key_handle.clone(),
                address: ContentAddress::of(b"y"),
            })
            .unwrap();
        drop(dispatcher);

        let (_tx, shutdown) = watch::channel(());
        NameWorker::new(Arc::new(names.clone()), receiver)
            .run(shutdown)
            .await;
        assert!(names.latest_record(&key.name).is_some());
    }
}
