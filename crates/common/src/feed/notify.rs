//! Delivery of follow updates to one live subscriber.

use std::fmt::Debug;
use std::sync::Arc;

use futures::Stream;
use tokio::sync::mpsc;

use crate::directory::Follow;

/// The subscriber is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("notification subscriber went away")]
pub struct SinkClosed;

/// Side channel for a desktop style alert, fired after delivery.
pub trait Alert: Send + Sync + Debug + 'static {
    fn alert(&self, follow: &Follow);
}

/// Single slot channel: a send waits until the previous update was read.
pub fn notification_channel() -> (NotificationSink, Notifications) {
    let (tx, rx) = mpsc::channel(1);
    (
        NotificationSink { tx, alert: None },
        Notifications { rx },
    )
}

#[derive(Debug, Clone)]
pub struct NotificationSink {
    tx: mpsc::Sender<Follow>,
    alert: Option<Arc<dyn Alert>>,
}

impl NotificationSink {
    pub fn with_alert(mut self, alert: Arc<dyn Alert>) -> Self {
        self.alert = Some(alert);
        self
    }

    pub async fn send(&self, follow: Follow) -> Result<(), SinkClosed> {
        let alert_copy = self.alert.as_ref().map(|_| follow.clone());
        self.tx.send(follow).await.map_err(|_| SinkClosed)?;
        if let (Some(alert), Some(follow)) = (&self.alert, alert_copy) {
            alert.alert(&follow);
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Resolves once the subscriber has dropped its end.
    pub async fn closed(&self) {
        self.tx.closed().await
    }
}

#[derive(Debug)]
pub struct Notifications {
    rx: mpsc::Receiver<Follow>,
}

impl Notifications {
    pub async fn recv(&mut self) -> Option<Follow> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Follow> {
        self.rx.try_recv().ok()
    }

    pub fn into_stream(self) -> impl Stream<Item = Follow> + Send + 'static {
        futures::stream::unfold(self.rx, |mut rx| async move {
            rx.recv().await.map(|follow| (follow, rx))
        })
    }
}
