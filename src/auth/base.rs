use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::info;
use url::Url;

use super::gotrue_provider::GoTrueProvider;
use super::local_provider::LocalAuthProvider;
use crate::config::BackendConfig;
use crate::error::{BackendError, BackendResult};
use crate::models::Session;

/// Capacity of the auth-state broadcast channel.
pub const AUTH_EVENT_CAPACITY: usize = 16;

/// An auth-state change published by a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn(Session),
    TokenRefreshed(Session),
    SignedOut,
}

impl AuthEvent {
    /// The session this event leaves behind; `None` after a sign-out.
    pub fn session(&self) -> Option<&Session> {
        match self {
            AuthEvent::SignedIn(s) | AuthEvent::TokenRefreshed(s) => Some(s),
            AuthEvent::SignedOut => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AuthEvent::SignedIn(_) => "signed_in",
            AuthEvent::TokenRefreshed(_) => "token_refreshed",
            AuthEvent::SignedOut => "signed_out",
        }
    }
}

/// What the caller has to do after asking to sign in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignIn {
    /// Open this URL in a browser; the provider redirects back with credentials.
    Redirect(Url),
    /// Nothing to do; the outcome arrives as an `AuthEvent`.
    Started,
}

/// An identity provider. Every state change it makes is announced on the
/// channel returned by `subscribe`; none of the methods hand a session back
/// to the caller directly except `get_session`.
#[async_trait::async_trait]
pub trait AuthProvider: Send + Sync {
    fn get_name(&self) -> &str;

    /// Provider used by `sign_in_with_provider` when the user names none.
    fn default_oauth_provider(&self) -> &str;

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;

    /// The session restored from persisted credentials, if any.
    async fn get_session(&self) -> BackendResult<Option<Session>>;

    async fn sign_in_with_provider(&self, provider: &str) -> BackendResult<SignIn>;

    /// Finish a redirect flow from the URL the provider redirected to.
    async fn complete_sign_in(&self, _redirect_url: &str) -> BackendResult<()> {
        Err(BackendError::Config(format!(
            "provider '{}' does not use redirect callbacks",
            self.get_name()
        )))
    }

    async fn refresh_session(&self, session: &Session) -> BackendResult<()>;

    async fn sign_out(&self, session: &Session) -> BackendResult<()>;
}

/// Create the auth provider matching the configured backend.
pub fn create_auth_provider(config: &BackendConfig) -> Arc<dyn AuthProvider> {
    match config {
        BackendConfig::Supabase(cfg) => {
            info!("Using Supabase auth at '{}'", cfg.url);
            Arc::new(GoTrueProvider::new(cfg))
        }
        BackendConfig::Memory(cfg) => {
            info!("Using local auth for user '{}'", cfg.user_id);
            Arc::new(LocalAuthProvider::new(cfg))
        }
    }
}
