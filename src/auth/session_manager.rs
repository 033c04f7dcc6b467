//! Tracks the current session and keeps it in step with the auth provider.

use std::sync::Arc;

use chrono::Utc;
use futures::future::BoxFuture;
use tokio::sync::broadcast::{
    self,
    error::{RecvError, TryRecvError},
};
use tracing::{debug, error, info, warn};

use super::base::{AuthEvent, AuthProvider, SignIn};
use crate::error::BackendError;
use crate::models::Session;

/// Delay before retrying a token refresh that failed for a transient reason.
const REFRESH_RETRY_SECS: i64 = 30;

/// A fresh session is never refreshed sooner than this, however short-lived its token.
const MIN_REFRESH_DELAY_SECS: i64 = 10;

/// Holds the current session. The held value only ever changes through
/// `next_change`, i.e. through events published by the provider; sign-in and
/// sign-out requests never touch it directly.
///
/// Requests to the provider are handed back as futures for the caller to
/// drive, so waiting on the network never holds up whoever owns the manager.
pub struct SessionManager {
    provider: Arc<dyn AuthProvider>,
    events: broadcast::Receiver<AuthEvent>,
    current: Option<Session>,
    refresh_at: Option<i64>,
}

impl SessionManager {
    /// Subscribes to the provider straight away so no change published
    /// during `initialize` is missed.
    pub fn new(provider: Arc<dyn AuthProvider>) -> Self {
        let events = provider.subscribe();
        Self {
            provider,
            events,
            current: None,
            refresh_at: None,
        }
    }

    /// Restores a persisted session. A failure is indistinguishable from
    /// having no session at all.
    pub async fn initialize(&mut self) -> Option<Session> {
        let restored = match self.provider.get_session().await {
            Ok(session) => session,
            Err(e) => {
                warn!("Could not restore session, starting signed out: {}", e);
                None
            }
        };
        match &restored {
            Some(session) => info!("Restored session for '{}'", session.display_name()),
            None => debug!("No session to restore"),
        }
        self.replace(restored)
    }

    /// Waits for the next auth-state change and replaces the held session
    /// with it wholesale. Returns `None` once the provider is gone.
    pub async fn next_change(&mut self) -> Option<Option<Session>> {
        loop {
            match self.events.recv().await {
                Ok(event) => return Some(self.apply(event)),
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Missed {} auth events, waiting for the next one", skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Like `next_change`, but only takes a change that is already queued.
    pub fn try_next_change(&mut self) -> Option<Option<Session>> {
        loop {
            match self.events.try_recv() {
                Ok(event) => return Some(self.apply(event)),
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!("Missed {} auth events", skipped);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    fn apply(&mut self, event: AuthEvent) -> Option<Session> {
        debug!(event = event.name(), "session replaced");
        self.replace(event.session().cloned())
    }

    fn replace(&mut self, session: Option<Session>) -> Option<Session> {
        let earliest = Utc::now().timestamp() + MIN_REFRESH_DELAY_SECS;
        self.refresh_at = session
            .as_ref()
            .and_then(Session::refresh_due_at)
            .map(|due| due.max(earliest));
        self.current = session;
        self.current.clone()
    }

    /// Starts a sign-in. Fire-and-forget: the session itself arrives later
    /// through `next_change`.
    pub fn sign_in(&self, provider: Option<&str>) -> BoxFuture<'static, Option<SignIn>> {
        let provider = provider
            .unwrap_or_else(|| self.provider.default_oauth_provider())
            .to_string();
        let auth = self.provider.clone();
        Box::pin(async move {
            match auth.sign_in_with_provider(&provider).await {
                Ok(outcome) => Some(outcome),
                Err(e) => {
                    error!("Sign-in with '{}' failed: {}", provider, e);
                    None
                }
            }
        })
    }

    pub fn complete_sign_in(&self, redirect_url: &str) -> BoxFuture<'static, ()> {
        let redirect_url = redirect_url.to_string();
        let auth = self.provider.clone();
        Box::pin(async move {
            if let Err(e) = auth.complete_sign_in(&redirect_url).await {
                error!("Completing sign-in failed: {}", e);
            }
        })
    }

    /// `None` when there is nobody to sign out.
    pub fn sign_out(&self) -> Option<BoxFuture<'static, ()>> {
        let Some(session) = self.current.clone() else {
            debug!("Sign-out requested without a session");
            return None;
        };
        let auth = self.provider.clone();
        Some(Box::pin(async move {
            if let Err(e) = auth.sign_out(&session).await {
                error!("Sign-out failed: {}", e);
            }
        }))
    }

    /// Unix time at which the access token should next be refreshed.
    pub fn refresh_deadline(&self) -> Option<i64> {
        self.current.as_ref()?;
        self.refresh_at
    }

    /// Refreshes the access token. The new session arrives as an event; a
    /// rejected refresh token makes the provider sign out instead. Until
    /// one of those happens the refresh is retried periodically, so the
    /// next attempt is scheduled before this one is even sent.
    pub fn refresh(&mut self) -> Option<BoxFuture<'static, ()>> {
        let session = self.current.clone()?;
        self.refresh_at = Some(Utc::now().timestamp() + REFRESH_RETRY_SECS);
        debug!("Refreshing session for '{}'", session.display_name());
        let auth = self.provider.clone();
        Some(Box::pin(async move {
            match auth.refresh_session(&session).await {
                Ok(()) => {}
                Err(BackendError::Unauthorized(message)) => {
                    warn!("Session refresh rejected: {}", message)
                }
                Err(other) => warn!(
                    "Session refresh failed, retrying in {}s: {}",
                    REFRESH_RETRY_SECS, other
                ),
            }
        }))
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::local_provider::LocalAuthProvider;
    use crate::config::MemoryBackendConfig;
    use crate::error::BackendResult;
    use crate::models::SessionUser;
    use async_trait::async_trait;

    fn local_provider() -> Arc<dyn AuthProvider> {
        Arc::new(LocalAuthProvider::new(&MemoryBackendConfig {
            user_id: "local-user".to_string(),
            email: None,
            table: "bookmarks".to_string(),
            seed: vec![],
        }))
    }

    /// A provider whose restore and refresh always fail.
    struct BrokenProvider {
        events: broadcast::Sender<AuthEvent>,
    }

    #[async_trait]
    impl AuthProvider for BrokenProvider {
        fn get_name(&self) -> &str {
            "broken"
        }
        fn default_oauth_provider(&self) -> &str {
            "none"
        }
        fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
            self.events.subscribe()
        }
        async fn get_session(&self) -> BackendResult<Option<Session>> {
            Err(BackendError::Network("connection refused".to_string()))
        }
        async fn sign_in_with_provider(&self, _provider: &str) -> BackendResult<SignIn> {
            Err(BackendError::Network("connection refused".to_string()))
        }
        async fn refresh_session(&self, _session: &Session) -> BackendResult<()> {
            Err(BackendError::Network("connection refused".to_string()))
        }
        async fn sign_out(&self, _session: &Session) -> BackendResult<()> {
            Ok(())
        }
    }

    /// Test that a failing restore leaves the manager signed out.
    #[tokio::test]
    async fn test_initialize_error_means_no_session() {
        let (events, _) = broadcast::channel(4);
        let mut manager = SessionManager::new(Arc::new(BrokenProvider { events }));
        assert!(manager.initialize().await.is_none());
        assert!(manager.current.is_none());
        assert!(manager.sign_in(None).await.is_none());
        assert!(manager.sign_out().is_none());
    }

    /// Test that the held session follows provider events.
    #[tokio::test]
    async fn test_session_follows_events() {
        let mut manager = SessionManager::new(local_provider());
        assert!(manager.initialize().await.is_none());

        // Signing in does not change the held session until the event is consumed.
        assert_eq!(manager.sign_in(None).await, Some(SignIn::Started));
        assert!(manager.current.is_none());

        let change = manager.next_change().await.unwrap();
        assert_eq!(change.unwrap().owner_id(), "local-user");
        assert_eq!(manager.current.as_ref().unwrap().owner_id(), "local-user");

        manager.sign_out().unwrap().await;
        assert!(manager.current.is_some());
        assert_eq!(manager.next_change().await, Some(None));
        assert!(manager.current.is_none());
    }

    fn session_expiring_at(expires_at: i64) -> Session {
        Session {
            access_token: "a".to_string(),
            refresh_token: "r".to_string(),
            token_type: "bearer".to_string(),
            expires_at: Some(expires_at),
            user: SessionUser {
                id: "u".to_string(),
                email: None,
            },
        }
    }

    /// Test that a transient refresh failure schedules a retry.
    #[tokio::test]
    async fn test_refresh_failure_schedules_retry() {
        let (events, _) = broadcast::channel(4);
        let sender = events.clone();
        let mut manager = SessionManager::new(Arc::new(BrokenProvider { events }));

        sender
            .send(AuthEvent::SignedIn(session_expiring_at(
                Utc::now().timestamp() + 3600,
            )))
            .unwrap();
        manager.next_change().await.unwrap();
        let due = manager.refresh_deadline().unwrap();

        manager.refresh().unwrap().await;
        let retry = manager.refresh_deadline().unwrap();
        assert!(retry < due);
        assert!(retry >= Utc::now().timestamp());
    }

    /// Test that the next attempt is scheduled as soon as a refresh starts,
    /// so a refresh still waiting on the network is not started twice.
    #[tokio::test]
    async fn test_refresh_reschedules_before_sending() {
        let (events, _) = broadcast::channel(4);
        let sender = events.clone();
        let mut manager = SessionManager::new(Arc::new(BrokenProvider { events }));

        let now = Utc::now().timestamp();
        sender
            .send(AuthEvent::SignedIn(session_expiring_at(now - 5)))
            .unwrap();
        manager.next_change().await.unwrap();

        let _pending = manager.refresh().unwrap();
        assert!(manager.refresh_deadline().unwrap() >= now + REFRESH_RETRY_SECS);
    }

    /// Test that a token living shorter than the refresh margin does not
    /// make every new session due immediately.
    #[tokio::test]
    async fn test_short_lived_token_waits_before_refresh() {
        let (events, _) = broadcast::channel(4);
        let sender = events.clone();
        let mut manager = SessionManager::new(Arc::new(BrokenProvider { events }));

        let now = Utc::now().timestamp();
        sender
            .send(AuthEvent::TokenRefreshed(session_expiring_at(now + 30)))
            .unwrap();
        manager.next_change().await.unwrap();

        assert!(manager.refresh_deadline().unwrap() >= now + MIN_REFRESH_DELAY_SECS);
    }

    #[test]
    fn test_no_deadline_without_session() {
        let manager = SessionManager::new(local_provider());
        assert!(manager.refresh_deadline().is_none());
    }
}
