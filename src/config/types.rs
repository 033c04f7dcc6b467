use std::path::Path;

use figment::providers::{Env, Format, Yaml};
use figment::Figment;
use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};

use super::backend::BackendConfig;
use super::logging::LoggingConfig;
use super::realtime::RealtimeConfig;

/// Environment variable naming an alternative config file.
pub const CONFIG_PATH_ENV: &str = "SMARTMARK_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "./config.yaml";
const ENV_PREFIX: &str = "SMARTMARK_";

/// A top-level enum for versioned configurations.
#[derive(Deserialize, Serialize, JsonSchema)]
#[serde(tag = "version")]
pub enum Config {
    #[serde(rename = "1.0.0")]
    ConfigV1(ConfigV1),
}

/// Main config for v1.0.0.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct ConfigV1 {
    #[serde(default)]
    pub logging: LoggingConfig,
    pub backend: BackendConfig,
    #[serde(default)]
    pub realtime: RealtimeConfig,
}

/// Load config from `$SMARTMARK_CONFIG` (default "./config.yaml"), with
/// `SMARTMARK_`-prefixed environment variables layered on top.
/// Nested keys are separated by a double underscore, e.g. `SMARTMARK_BACKEND__ANON_KEY`.
pub fn load_config() -> Result<ConfigV1, figment::Error> {
    let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    load_config_from(Path::new(&path))
}

pub fn load_config_from(path: &Path) -> Result<ConfigV1, figment::Error> {
    let figment = Figment::new().merge(Yaml::file(path)).merge(
        Env::prefixed(ENV_PREFIX)
            .ignore(&["config"])
            .split("__"),
    );
    extract(figment)
}

/// Parse a config from an in-memory YAML document.
pub fn config_from_yaml(yaml: &str) -> Result<ConfigV1, figment::Error> {
    extract(Figment::new().merge(Yaml::string(yaml)))
}

fn extract(figment: Figment) -> Result<ConfigV1, figment::Error> {
    // Migrations between config versions go here once there is more than one.
    match figment.extract::<Config>()? {
        Config::ConfigV1(c) => Ok(c),
    }
}

/// The JSON schema for the configuration, pretty printed.
pub fn schema_json() -> String {
    let schema = schema_for!(Config);
    serde_json::to_string_pretty(&schema).unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e))
}
