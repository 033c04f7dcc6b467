use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::{no_feed::NoFeed, supabase_feed::SupabaseFeed};
use crate::config::{BackendConfig, RealtimeConfig};
use crate::models::Session;
use crate::store::Store;

/// What kind of change a feed notification reports.
///
/// Consumers treat every kind the same way (refetch everything); the kind
/// is kept for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
    /// The feed lost its connection and is back; changes may have been missed.
    Reconnected,
    Other,
}

impl ChangeKind {
    pub fn from_postgres(kind: &str) -> Self {
        match kind {
            "INSERT" => ChangeKind::Insert,
            "UPDATE" => ChangeKind::Update,
            "DELETE" => ChangeKind::Delete,
            _ => ChangeKind::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Insert => "insert",
            ChangeKind::Update => "update",
            ChangeKind::Delete => "delete",
            ChangeKind::Reconnected => "reconnected",
            ChangeKind::Other => "other",
        }
    }
}

/// One notification from a change feed. Carries no guarantee about the
/// changed row beyond its table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub table: String,
    pub record_id: Option<String>,
}

/// A live subscription to a table's changes. Dropping it stops delivery.
pub struct Subscription {
    channel: String,
    events: mpsc::UnboundedReceiver<ChangeEvent>,
    worker: Option<JoinHandle<()>>,
    leave: Option<oneshot::Sender<()>>,
}

impl Subscription {
    /// A subscription fed directly through `events`, with no background worker.
    pub fn new(channel: impl Into<String>, events: mpsc::UnboundedReceiver<ChangeEvent>) -> Self {
        Self {
            channel: channel.into(),
            events,
            worker: None,
            leave: None,
        }
    }

    /// A subscription driven by `worker`, which is asked to leave via `leave`.
    pub fn with_worker(
        channel: impl Into<String>,
        events: mpsc::UnboundedReceiver<ChangeEvent>,
        worker: JoinHandle<()>,
        leave: oneshot::Sender<()>,
    ) -> Self {
        Self {
            channel: channel.into(),
            events,
            worker: Some(worker),
            leave: Some(leave),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Next notification. Pends forever once the feed has nothing more to say.
    pub async fn recv(&mut self) -> ChangeEvent {
        match self.events.recv().await {
            Some(event) => event,
            None => std::future::pending().await,
        }
    }

    pub fn try_recv(&mut self) -> Option<ChangeEvent> {
        self.events.try_recv().ok()
    }

    /// Leaves the channel, giving the worker a moment to say goodbye.
    pub async fn unsubscribe(mut self) {
        info!("Unsubscribing from channel '{}'", self.channel);
        if let Some(leave) = self.leave.take() {
            let _ = leave.send(());
        }
        if let Some(worker) = self.worker.take() {
            if tokio::time::timeout(Duration::from_secs(2), worker)
                .await
                .is_err()
            {
                debug!("Feed worker for '{}' did not stop in time", self.channel);
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.abort();
        }
    }
}

/// A push channel notifying of writes to a table.
pub trait ChangeFeed: Send + Sync {
    fn get_name(&self) -> &str;

    /// Starts listening for any change on `table`. Must not block; delivery
    /// begins once the underlying connection is up.
    fn subscribe(&self, session: &Session, table: &str) -> Subscription;
}

/// Creates the change feed for the configured backend.
pub fn create_change_feed(
    backend: &BackendConfig,
    realtime: &RealtimeConfig,
    store: &Arc<dyn Store>,
) -> Arc<dyn ChangeFeed> {
    if !realtime.enabled {
        info!("Realtime is disabled. Using NoFeed.");
        return Arc::new(NoFeed::new());
    }

    if let Some(feed) = store.change_feed() {
        info!("Using change feed '{}' provided by the store", feed.get_name());
        return feed;
    }

    match backend {
        BackendConfig::Supabase(cfg) => {
            info!("Using Supabase realtime at '{}'", cfg.url);
            Arc::new(SupabaseFeed::new(cfg, realtime))
        }
        BackendConfig::Memory(_) => {
            info!("Store '{}' has no change feed. Using NoFeed.", store.get_name());
            Arc::new(NoFeed::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: ChangeKind) -> ChangeEvent {
        ChangeEvent {
            kind,
            table: "bookmarks".to_string(),
            record_id: None,
        }
    }

    /// Test that events sent on the channel come out of the subscription in order.
    #[tokio::test]
    async fn test_subscription_delivers_in_order() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut subscription = Subscription::new("test", rx);
        tx.send(event(ChangeKind::Insert)).unwrap();
        tx.send(event(ChangeKind::Delete)).unwrap();

        assert_eq!(subscription.recv().await.kind, ChangeKind::Insert);
        assert_eq!(subscription.try_recv().unwrap().kind, ChangeKind::Delete);
        assert!(subscription.try_recv().is_none());
    }

    /// Test that unsubscribing signals the worker to leave.
    #[tokio::test]
    async fn test_unsubscribe_signals_worker() {
        let (_tx, rx) = mpsc::unbounded_channel();
        let (leave_tx, leave_rx) = oneshot::channel();
        let (done_tx, done_rx) = oneshot::channel();
        let worker = tokio::spawn(async move {
            let _ = leave_rx.await;
            let _ = done_tx.send(());
        });

        Subscription::with_worker("test", rx, worker, leave_tx)
            .unsubscribe()
            .await;
        assert!(done_rx.await.is_ok());
    }

    #[test]
    fn test_postgres_kinds() {
        assert_eq!(ChangeKind::from_postgres("INSERT"), ChangeKind::Insert);
        assert_eq!(ChangeKind::from_postgres("UPDATE"), ChangeKind::Update);
        assert_eq!(ChangeKind::from_postgres("DELETE"), ChangeKind::Delete);
        assert_eq!(ChangeKind::from_postgres("TRUNCATE"), ChangeKind::Other);
    }
}
