//! Shared application state.
//!
//! The backend bundle built once from configuration: the auth provider,
//! the bookmark store and the change feed the event loop subscribes to.

use std::sync::Arc;

use crate::auth::{create_auth_provider, AuthProvider};
use crate::config::ConfigV1;
use crate::realtime::{create_change_feed, ChangeFeed};
use crate::store::{create_store, Store};

#[derive(Clone)]
pub struct AppState {
    /// Application configuration loaded at startup.
    pub config: Arc<ConfigV1>,
    /// Identity provider; the source of every session change.
    pub auth: Arc<dyn AuthProvider>,
    /// Where bookmarks are read from and written to.
    pub store: Arc<dyn Store>,
    /// Notifies about writes to the bookmarks table by anyone.
    pub feed: Arc<dyn ChangeFeed>,
}

impl AppState {
    pub fn new(config: Arc<ConfigV1>) -> Self {
        let auth = create_auth_provider(&config.backend);
        let store = create_store(&config.backend);
        let feed = create_change_feed(&config.backend, &config.realtime, &store);
        Self {
            config,
            auth,
            store,
            feed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::config_from_yaml;

    /// Test that a memory backend gets its own feed unless realtime is off.
    #[test]
    fn test_memory_backend_wiring() {
        let yaml = r#"
version: "1.0.0"
backend:
  type: memory
  user_id: "alice"
"#;
        let state = AppState::new(Arc::new(config_from_yaml(yaml).unwrap()));
        assert_eq!(state.auth.get_name(), "local");
        assert_eq!(state.store.get_name(), "memory");
        assert_eq!(state.feed.get_name(), "memory");

        let disabled = format!("{}realtime:\n  enabled: false\n", yaml);
        let state = AppState::new(Arc::new(config_from_yaml(&disabled).unwrap()));
        assert_eq!(state.feed.get_name(), "none");
    }

    #[test]
    fn test_supabase_backend_wiring() {
        let yaml = r#"
version: "1.0.0"
backend:
  type: supabase
  url: "https://abcd.supabase.co"
  anon_key: "anon"
"#;
        let state = AppState::new(Arc::new(config_from_yaml(yaml).unwrap()));
        assert_eq!(state.auth.get_name(), "supabase");
        assert_eq!(state.store.get_name(), "postgrest");
        assert_eq!(state.feed.get_name(), "supabase-realtime");
    }
}
