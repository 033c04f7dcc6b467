use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Settings for the change-feed subscription.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct RealtimeConfig {
    /// When false, no feed is opened and the list only changes through local actions.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_channel")]
    pub channel: String,
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            channel: default_channel(),
            heartbeat_secs: default_heartbeat_secs(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_channel() -> String {
    "realtime-bookmarks".to_string()
}

fn default_heartbeat_secs() -> u64 {
    25
}
