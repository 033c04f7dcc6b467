use std::path::PathBuf;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The backend the client talks to, selected via a "type" tag in the YAML.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
#[serde(tag = "type")]
pub enum BackendConfig {
    #[serde(rename = "supabase")]
    Supabase(SupabaseConfig),
    #[serde(rename = "memory")]
    Memory(MemoryBackendConfig),
}

impl BackendConfig {
    /// Name of the bookmarks table.
    pub fn table(&self) -> &str {
        match self {
            BackendConfig::Supabase(cfg) => &cfg.table,
            BackendConfig::Memory(cfg) => &cfg.table,
        }
    }
}

/// Connection details for a hosted Supabase project.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct SupabaseConfig {
    /// Project URL, e.g. https://abcd.supabase.co
    pub url: String,
    /// The public anon key sent as `apikey` on every request.
    pub anon_key: String,
    #[serde(default = "default_table")]
    pub table: String,
    /// OAuth provider used by `login` when none is given.
    #[serde(default = "default_oauth_provider")]
    pub oauth_provider: String,
    /// Where the provider sends the browser after sign-in.
    #[serde(default)]
    pub redirect_to: Option<String>,
    /// Where the session is persisted between runs.
    #[serde(default = "default_session_file")]
    pub session_file: PathBuf,
}

/// An in-process backend with a fixed identity. Useful offline and in tests.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct MemoryBackendConfig {
    pub user_id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default = "default_table")]
    pub table: String,
    /// Rows inserted for `user_id` at startup, oldest first.
    #[serde(default)]
    pub seed: Vec<SeedBookmark>,
}

#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct SeedBookmark {
    pub title: String,
    pub url: String,
}

fn default_table() -> String {
    "bookmarks".to_string()
}

fn default_oauth_provider() -> String {
    "google".to_string()
}

fn default_session_file() -> PathBuf {
    PathBuf::from("./.smartmark-session.json")
}
