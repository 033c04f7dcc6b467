use std::fmt;

use serde::{Deserialize, Serialize};

/// Seconds before expiry at which an access token is considered due for refresh.
pub const REFRESH_MARGIN_SECS: i64 = 60;

/// The authenticated identity as returned by the auth service.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SessionUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// An authenticated session: the user plus the credentials used on every request.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Unix timestamp (seconds) at which `access_token` expires.
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: SessionUser,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

impl Session {
    /// The owner identifier stamped on records created by this session.
    pub fn owner_id(&self) -> &str {
        &self.user.id
    }

    /// A short human label for the signed-in identity.
    pub fn display_name(&self) -> &str {
        self.user.email.as_deref().unwrap_or(&self.user.id)
    }

    /// Whether the access token is within the refresh margin of expiring at `now`.
    pub fn is_refresh_due(&self, now: i64) -> bool {
        matches!(self.refresh_due_at(), Some(due) if due <= now)
    }

    /// When the access token should be refreshed, if it expires at all.
    pub fn refresh_due_at(&self) -> Option<i64> {
        self.expires_at.map(|exp| exp - REFRESH_MARGIN_SECS)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .field("user", &self.user)
            .finish()
    }
}
