use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::Path;

use async_trait::async_trait;
#[allow(unused_imports)]
use cached::proc_macro::cached;
use chrono::Utc;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use url::Url;

use super::base::{AuthEvent, AuthProvider, SignIn, AUTH_EVENT_CAPACITY};
use crate::config::SupabaseConfig;
use crate::error::{BackendError, BackendResult};
use crate::models::{Session, SessionUser};
use crate::utils::http::{ensure_success, with_credentials};

/// Supabase Auth (GoTrue) over its REST API.
///
/// Sign-in uses the implicit OAuth flow: the provider redirects the browser
/// back with the tokens in the URL fragment, and that URL is handed to
/// `complete_sign_in`. The resulting session is persisted to
/// `session_file` so the next run starts signed in.
pub struct GoTrueProvider {
    config: SupabaseConfig,
    client: reqwest::Client,
    events: broadcast::Sender<AuthEvent>,
}

/// Body of a successful token grant.
#[derive(Deserialize, Debug)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: SessionUser,
}

impl TokenResponse {
    fn into_session(self, now: i64) -> Session {
        Session {
            expires_at: self.expires_at.or(self.expires_in.map(|secs| now + secs)),
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            token_type: self.token_type.unwrap_or_else(|| "bearer".to_string()),
            user: self.user,
        }
    }
}

/// The claims we read from an access token. The signature is not checked:
/// the token is only ever sent back to the service that issued it.
#[derive(Deserialize, Debug)]
struct AccessClaims {
    exp: Option<i64>,
}

fn access_claims(token: &str) -> BackendResult<AccessClaims> {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    decode::<AccessClaims>(token, &DecodingKey::from_secret(&[]), &validation)
        .map(|data| data.claims)
        .map_err(|e| BackendError::Decode(format!("Invalid access token: {}", e)))
}

/// Tokens carried by the provider redirect.
#[derive(Debug, PartialEq, Eq)]
struct RedirectTokens {
    access_token: String,
    refresh_token: String,
    token_type: Option<String>,
    expires_at: Option<i64>,
}

/// Reads the redirect parameters from the fragment, or from the query when
/// the fragment is empty.
fn parse_redirect(redirect_url: &str, now: i64) -> BackendResult<RedirectTokens> {
    let url = Url::parse(redirect_url)
        .map_err(|e| BackendError::Decode(format!("Invalid redirect URL: {}", e)))?;
    let raw = match url.fragment() {
        Some(fragment) if !fragment.is_empty() => fragment,
        _ => url.query().unwrap_or(""),
    };
    let mut params: HashMap<String, String> = url::form_urlencoded::parse(raw.as_bytes())
        .into_owned()
        .collect();

    if let Some(description) = params
        .remove("error_description")
        .or_else(|| params.remove("error"))
    {
        return Err(BackendError::Unauthorized(description));
    }

    let access_token = params
        .remove("access_token")
        .ok_or_else(|| BackendError::Decode("Redirect carries no access_token".to_string()))?;
    let refresh_token = params
        .remove("refresh_token")
        .ok_or_else(|| BackendError::Decode("Redirect carries no refresh_token".to_string()))?;

    let expires_at = params
        .get("expires_at")
        .and_then(|v| v.parse::<i64>().ok())
        .or_else(|| {
            params
                .get("expires_in")
                .and_then(|v| v.parse::<i64>().ok())
                .map(|secs| now + secs)
        })
        .or_else(|| access_claims(&access_token).ok().and_then(|c| c.exp));

    Ok(RedirectTokens {
        access_token,
        refresh_token,
        token_type: params.remove("token_type"),
        expires_at,
    })
}

/// Looks up the user behind an access token. Cached for 60 seconds per token.
#[cfg_attr(not(test), cached(time = 60, result = true))]
async fn fetch_user(
    base_url: String,
    anon_key: String,
    access_token: String,
) -> Result<SessionUser, BackendError> {
    let client = reqwest::Client::new();
    let url = format!("{}/auth/v1/user", base_url);
    debug!("Fetching user from {}", url);

    let response = with_credentials(client.get(&url), &anon_key, &access_token)
        .send()
        .await?;
    let user = ensure_success(response).await?.json::<SessionUser>().await?;
    Ok(user)
}

async fn load_persisted(path: &Path) -> BackendResult<Option<Session>> {
    match tokio::fs::read_to_string(path).await {
        Ok(body) => Ok(Some(serde_json::from_str(&body)?)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn persist(path: &Path, session: &Session) -> BackendResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let body = serde_json::to_string_pretty(session)?;
    tokio::fs::write(path, body).await?;
    Ok(())
}

async fn clear_persisted(path: &Path) -> BackendResult<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

impl GoTrueProvider {
    pub fn new(config: &SupabaseConfig) -> Self {
        info!(
            "Creating GoTrue provider for '{}', session file '{}'",
            config.url,
            config.session_file.display()
        );
        let (events, _) = broadcast::channel(AUTH_EVENT_CAPACITY);
        Self {
            config: config.clone(),
            client: reqwest::Client::new(),
            events,
        }
    }

    fn base_url(&self) -> &str {
        self.config.url.trim_end_matches('/')
    }

    fn publish(&self, event: AuthEvent) {
        info!(event = event.name(), "auth state changed");
        let _ = self.events.send(event);
    }

    async fn persist_or_warn(&self, session: &Session) {
        if let Err(e) = persist(&self.config.session_file, session).await {
            warn!("Failed to persist session: {}", e);
        }
    }

    async fn clear_or_warn(&self) {
        if let Err(e) = clear_persisted(&self.config.session_file).await {
            warn!("Failed to remove persisted session: {}", e);
        }
    }

    /// Trades a refresh token for a fresh session.
    /// GoTrue answers an invalid or revoked refresh token with 400 `invalid_grant`
    /// (or 401/403), reported as `Unauthorized`. Other statuses, rate limits
    /// included, stay `Rejected` so the caller can try again later.
    async fn exchange_refresh_token(&self, refresh_token: &str) -> BackendResult<Session> {
        let url = format!("{}/auth/v1/token", self.base_url());
        let response = with_credentials(
            self.client.post(&url),
            &self.config.anon_key,
            &self.config.anon_key,
        )
        .query(&[("grant_type", "refresh_token")])
        .json(&json!({ "refresh_token": refresh_token }))
        .send()
        .await?;

        let response = ensure_success(response).await.map_err(|e| match e {
            BackendError::Rejected {
                status: 400,
                message,
            } => BackendError::Unauthorized(message),
            other => other,
        })?;
        let grant = response.json::<TokenResponse>().await?;
        Ok(grant.into_session(Utc::now().timestamp()))
    }
}

#[async_trait]
impl AuthProvider for GoTrueProvider {
    fn get_name(&self) -> &str {
        "supabase"
    }

    fn default_oauth_provider(&self) -> &str {
        &self.config.oauth_provider
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    /// Restores the persisted session, refreshing it first when its access token is due.
    async fn get_session(&self) -> BackendResult<Option<Session>> {
        let Some(mut session) = load_persisted(&self.config.session_file).await? else {
            debug!("No persisted session");
            return Ok(None);
        };

        if session.expires_at.is_none() {
            session.expires_at = access_claims(&session.access_token).ok().and_then(|c| c.exp);
        }
        if !session.is_refresh_due(Utc::now().timestamp()) {
            return Ok(Some(session));
        }

        debug!("Persisted session is due for refresh");
        match self.exchange_refresh_token(&session.refresh_token).await {
            Ok(fresh) => {
                self.persist_or_warn(&fresh).await;
                Ok(Some(fresh))
            }
            Err(BackendError::Unauthorized(message)) => {
                warn!("Persisted session could not be refreshed: {}", message);
                self.clear_or_warn().await;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn sign_in_with_provider(&self, provider: &str) -> BackendResult<SignIn> {
        let mut params = vec![("provider", provider)];
        if let Some(redirect_to) = self.config.redirect_to.as_deref() {
            params.push(("redirect_to", redirect_to));
        }
        let url = Url::parse_with_params(&format!("{}/auth/v1/authorize", self.base_url()), &params)
            .map_err(|e| BackendError::Config(format!("Invalid Supabase URL: {}", e)))?;
        debug!("Starting OAuth flow with provider '{}'", provider);
        Ok(SignIn::Redirect(url))
    }

    async fn complete_sign_in(&self, redirect_url: &str) -> BackendResult<()> {
        let now = Utc::now().timestamp();
        let tokens = parse_redirect(redirect_url, now)?;
        let user = fetch_user(
            self.base_url().to_string(),
            self.config.anon_key.clone(),
            tokens.access_token.clone(),
        )
        .await?;

        let session = Session {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            token_type: tokens.token_type.unwrap_or_else(|| "bearer".to_string()),
            expires_at: tokens.expires_at,
            user,
        };
        self.persist_or_warn(&session).await;
        self.publish(AuthEvent::SignedIn(session));
        Ok(())
    }

    async fn refresh_session(&self, session: &Session) -> BackendResult<()> {
        match self.exchange_refresh_token(&session.refresh_token).await {
            Ok(fresh) => {
                self.persist_or_warn(&fresh).await;
                self.publish(AuthEvent::TokenRefreshed(fresh));
                Ok(())
            }
            Err(BackendError::Unauthorized(message)) => {
                self.clear_or_warn().await;
                self.publish(AuthEvent::SignedOut);
                Err(BackendError::Unauthorized(message))
            }
            Err(e) => Err(e),
        }
    }

    /// Revokes the session remotely, then forgets it locally.
    /// A session the server no longer knows is still forgotten; any other
    /// failure leaves the local session in place.
    async fn sign_out(&self, session: &Session) -> BackendResult<()> {
        let url = format!("{}/auth/v1/logout", self.base_url());
        let outcome = match with_credentials(
            self.client.post(&url),
            &self.config.anon_key,
            &session.access_token,
        )
        .send()
        .await
        {
            Ok(response) => ensure_success(response).await.map(|_| ()),
            Err(e) => Err(e.into()),
        };

        match outcome {
            Ok(()) | Err(BackendError::Unauthorized(_)) => {}
            Err(BackendError::Rejected { status: 404, .. }) => {}
            Err(e) => return Err(e),
        }

        self.clear_or_warn().await;
        self.publish(AuthEvent::SignedOut);
        Ok(())
    }
}
