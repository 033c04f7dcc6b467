use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// A bookmark row as stored remotely.
///
/// `id` and `created_at` are assigned by the backend. `id` is kept opaque:
/// tables keyed by a UUID and tables keyed by a bigint both deserialize into it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Bookmark {
    #[serde(deserialize_with = "opaque_id")]
    pub id: String,
    pub title: String,
    pub url: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

impl Bookmark {
    /// Applies the editable fields of a record returned by an update,
    /// leaving identity, owner and timestamp as they are.
    pub fn merge(&mut self, updated: &Bookmark) {
        self.title = updated.title.clone();
        self.url = updated.url.clone();
    }
}

/// The payload of an insert. Only built from non-empty inputs.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct NewBookmark {
    pub title: String,
    pub url: String,
    pub user_id: String,
}

impl NewBookmark {
    /// Returns `None` when either title or url is empty.
    pub fn new(title: &str, url: &str, user_id: &str) -> Option<Self> {
        if title.is_empty() || url.is_empty() {
            return None;
        }
        Some(Self {
            title: title.to_string(),
            url: url.to_string(),
            user_id: user_id.to_string(),
        })
    }
}

/// The replace-style field update sent for an edit.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct BookmarkChanges {
    pub title: String,
    pub url: String,
}

impl BookmarkChanges {
    /// Returns `None` when either title or url is empty.
    pub fn new(title: &str, url: &str) -> Option<Self> {
        if title.is_empty() || url.is_empty() {
            return None;
        }
        Some(Self {
            title: title.to_string(),
            url: url.to_string(),
        })
    }
}

fn opaque_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "bookmark id must be a string or a number, got {}",
            other
        ))),
    }
}
