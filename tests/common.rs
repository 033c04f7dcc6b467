#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use figment::{
    providers::{Format, Yaml},
    Figment,
};
use smartmark::app::{App, Command};
use smartmark::auth::local_provider::LocalAuthProvider;
use smartmark::auth::AuthProvider;
use smartmark::config::{Config, ConfigV1, MemoryBackendConfig};
use smartmark::realtime::ChangeFeed;
use smartmark::store::{MemoryStore, Store};
use tokio::sync::mpsc;

/// Two seeded rows: "A" is inserted first, so it is the older one.
pub const MEMORY_CONFIG: &str = r#"
version: "1.0.0"
logging:
  level: "debug"
  format: "console"
backend:
  type: "memory"
  user_id: "alice"
  email: "alice@example.com"
  seed:
    - title: "A"
      url: "https://a.example"
    - title: "B"
      url: "https://b.example"
"#;

pub fn load(yaml: &str) -> ConfigV1 {
    let config: Config = Figment::new()
        .merge(Yaml::string(yaml))
        .extract()
        .expect("test config should parse");
    match config {
        Config::ConfigV1(c) => c,
    }
}

pub fn memory_backend(config: &ConfigV1) -> MemoryBackendConfig {
    match &config.backend {
        smartmark::config::BackendConfig::Memory(cfg) => cfg.clone(),
        other => panic!("expected a memory backend, got {:?}", other),
    }
}

/// An app over an in-memory store, plus the store itself for inspection.
pub fn memory_app(yaml: &str) -> (App, Arc<MemoryStore>) {
    memory_app_with_auth(yaml, |backend| Arc::new(LocalAuthProvider::new(backend)))
}

/// Like `memory_app`, with the auth provider built by `auth`.
pub fn memory_app_with_auth<F>(yaml: &str, auth: F) -> (App, Arc<MemoryStore>)
where
    F: FnOnce(&MemoryBackendConfig) -> Arc<dyn AuthProvider>,
{
    let config = load(yaml);
    let backend = memory_backend(&config);
    let store = Arc::new(MemoryStore::new(&backend));
    let feed: Arc<dyn ChangeFeed> = store.change_feed().expect("memory store has a feed");
    let app = App::from_parts(auth(&backend), store.clone(), feed, &backend.table);
    (app, store)
}

/// Like `memory_app`, but already signed in with the initial fetch applied.
pub async fn signed_in_memory_app(yaml: &str) -> (App, Arc<MemoryStore>) {
    let (mut app, store) = memory_app(yaml);
    app.start().await;
    app.handle_command(Command::Login(None));
    app.settle().await;
    assert!(app.state().session.is_some(), "login should sign in");
    (app, store)
}

pub async fn run_commands(app: &mut App, lines: &[&str]) {
    for line in lines {
        let command: Command = line.parse().expect("test command should parse");
        app.handle_command(command);
    }
}

pub fn titles(app: &App) -> Vec<String> {
    app.state()
        .bookmarks
        .iter()
        .map(|b| b.title.clone())
        .collect()
}

/// Waits for a rendered screen matching `predicate`, failing after a few seconds.
pub async fn wait_for_output<P>(outputs: &mut mpsc::UnboundedReceiver<String>, predicate: P) -> String
where
    P: Fn(&str) -> bool,
{
    let deadline = tokio::time::sleep(Duration::from_secs(5));
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            output = outputs.recv() => {
                let output = output.expect("app stopped rendering");
                if predicate(&output) {
                    return output;
                }
            }
            _ = &mut deadline => panic!("timed out waiting for output"),
        }
    }
}
