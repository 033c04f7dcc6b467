use tokio::sync::mpsc;

use super::base::{ChangeFeed, Subscription};
use crate::models::Session;

/// A feed that never reports anything. Used when realtime is turned off:
/// the list then only changes through this client's own actions.
pub struct NoFeed;

impl NoFeed {
    pub fn new() -> Self {
        NoFeed
    }
}

impl Default for NoFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeFeed for NoFeed {
    fn get_name(&self) -> &str {
        "none"
    }

    fn subscribe(&self, _session: &Session, table: &str) -> Subscription {
        // The sender is dropped right away, so `recv` pends forever.
        let (_tx, rx) = mpsc::unbounded_channel();
        Subscription::new(format!("none:{}", table), rx)
    }
}
