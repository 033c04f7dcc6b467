use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::debug;

use super::base::{AuthEvent, AuthProvider, SignIn, AUTH_EVENT_CAPACITY};
use crate::config::MemoryBackendConfig;
use crate::error::BackendResult;
use crate::models::{Session, SessionUser};

/// A provider that signs in a fixed identity without talking to anyone.
///
/// Nothing is persisted, so every run starts signed out.
pub struct LocalAuthProvider {
    user: SessionUser,
    events: broadcast::Sender<AuthEvent>,
}

impl LocalAuthProvider {
    pub fn new(config: &MemoryBackendConfig) -> Self {
        let (events, _) = broadcast::channel(AUTH_EVENT_CAPACITY);
        Self {
            user: SessionUser {
                id: config.user_id.clone(),
                email: config.email.clone(),
            },
            events,
        }
    }

    fn session(&self) -> Session {
        Session {
            access_token: format!("local-{}", uuid::Uuid::new_v4()),
            refresh_token: String::new(),
            token_type: "bearer".to_string(),
            expires_at: None,
            user: self.user.clone(),
        }
    }

    fn publish(&self, event: AuthEvent) {
        debug!(event = event.name(), "local auth state changed");
        // No receivers simply means nobody is listening yet.
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl AuthProvider for LocalAuthProvider {
    fn get_name(&self) -> &str {
        "local"
    }

    fn default_oauth_provider(&self) -> &str {
        "local"
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    async fn get_session(&self) -> BackendResult<Option<Session>> {
        Ok(None)
    }

    async fn sign_in_with_provider(&self, _provider: &str) -> BackendResult<SignIn> {
        self.publish(AuthEvent::SignedIn(self.session()));
        Ok(SignIn::Started)
    }

    async fn refresh_session(&self, session: &Session) -> BackendResult<()> {
        self.publish(AuthEvent::TokenRefreshed(session.clone()));
        Ok(())
    }

    async fn sign_out(&self, _session: &Session) -> BackendResult<()> {
        self.publish(AuthEvent::SignedOut);
        Ok(())
    }
}
