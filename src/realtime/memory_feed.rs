use std::sync::Mutex;

use tokio::sync::mpsc;
use tracing::debug;

use super::base::{ChangeEvent, ChangeFeed, Subscription};
use crate::models::Session;

/// In-process fan-out of change events. Every subscriber on a table sees
/// every change to it, whoever made it.
#[derive(Default)]
pub struct MemoryFeed {
    subscribers: Mutex<Vec<(String, mpsc::UnboundedSender<ChangeEvent>)>>,
}

impl MemoryFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers `event` to everyone watching its table. Closed subscriptions
    /// are dropped along the way.
    pub fn publish(&self, event: ChangeEvent) {
        let mut subscribers = match self.subscribers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        subscribers.retain(|(table, tx)| {
            if *table != event.table {
                return !tx.is_closed();
            }
            tx.send(event.clone()).is_ok()
        });
        debug!(
            kind = event.kind.as_str(),
            table = %event.table,
            subscribers = subscribers.len(),
            "change published"
        );
    }

    pub fn subscriber_count(&self) -> usize {
        match self.subscribers.lock() {
            Ok(guard) => guard.iter().filter(|(_, tx)| !tx.is_closed()).count(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

impl ChangeFeed for MemoryFeed {
    fn get_name(&self) -> &str {
        "memory"
    }

    fn subscribe(&self, _session: &Session, table: &str) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        match self.subscribers.lock() {
            Ok(mut guard) => guard.push((table.to_string(), tx)),
            Err(poisoned) => poisoned.into_inner().push((table.to_string(), tx)),
        }
        Subscription::new(format!("memory:{}", table), rx)
    }
}
