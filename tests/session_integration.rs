mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{
    load, memory_app_with_auth, memory_backend, signed_in_memory_app, titles, wait_for_output,
    MEMORY_CONFIG,
};
use smartmark::app::Command;
use smartmark::auth::local_provider::LocalAuthProvider;
use smartmark::auth::{AuthEvent, AuthProvider, SignIn};
use smartmark::error::BackendResult;
use smartmark::models::{NewBookmark, Session};
use smartmark::realtime::{ChangeEvent, ChangeKind};
use smartmark::store::Operation;
use tokio::sync::{broadcast, mpsc};

/// Signs in like the local provider, but never hears back when signing out.
struct UnansweredSignOut(LocalAuthProvider);

#[async_trait]
impl AuthProvider for UnansweredSignOut {
    fn get_name(&self) -> &str {
        "unanswered-sign-out"
    }

    fn default_oauth_provider(&self) -> &str {
        self.0.default_oauth_provider()
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.0.subscribe()
    }

    async fn get_session(&self) -> BackendResult<Option<Session>> {
        self.0.get_session().await
    }

    async fn sign_in_with_provider(&self, provider: &str) -> BackendResult<SignIn> {
        self.0.sign_in_with_provider(provider).await
    }

    async fn refresh_session(&self, session: &Session) -> BackendResult<()> {
        self.0.refresh_session(session).await
    }

    async fn sign_out(&self, _session: &Session) -> BackendResult<()> {
        std::future::pending().await
    }
}

fn local_provider() -> Arc<LocalAuthProvider> {
    Arc::new(LocalAuthProvider::new(&memory_backend(&load(MEMORY_CONFIG))))
}

/// Test that commands keep being handled while a sign-out is still waiting on the provider.
#[tokio::test]
async fn test_loop_stays_responsive_during_sign_out() {
    let (mut app, _store) = memory_app_with_auth(MEMORY_CONFIG, |backend| {
        Arc::new(UnansweredSignOut(LocalAuthProvider::new(backend)))
    });
    let (commands, commands_rx) = mpsc::channel(8);
    let (outputs_tx, mut outputs) = mpsc::unbounded_channel();

    let handle = tokio::spawn(async move {
        app.run(commands_rx, move |screen| {
            let _ = outputs_tx.send(screen);
        })
        .await;
    });

    wait_for_output(&mut outputs, |s| s.contains("Type `login`")).await;
    commands.send(Command::Login(None)).await.unwrap();
    wait_for_output(&mut outputs, |s| s.contains("2. A")).await;

    commands.send(Command::Logout).await.unwrap();
    commands.send(Command::Show).await.unwrap();
    let screen = wait_for_output(&mut outputs, |s| s.contains("1. B")).await;
    assert!(screen.contains("alice@example.com"));

    commands.send(Command::Quit).await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("quit should stop the loop")
        .unwrap();
}

/// Test that a refreshed token resubscribes the feed and refetches the list.
#[tokio::test]
async fn test_token_refresh_resubscribes_and_refetches() {
    let provider = local_provider();
    let auth = provider.clone();
    let (mut app, store) = memory_app_with_auth(MEMORY_CONFIG, move |_| auth);
    app.start().await;
    app.handle_command(Command::Login(None));
    app.settle().await;
    assert_eq!(titles(&app), vec!["B", "A"]);

    // A failing fetch empties the list, which shows the refresh caused one.
    store.fail_next(Operation::Select);
    let session = app.state().session.clone().unwrap();
    provider.refresh_session(&session).await.unwrap();
    app.settle().await;

    assert!(app.state().session.is_some());
    assert!(app.state().bookmarks.is_empty());
    assert!(app.is_subscribed());
    assert_eq!(store.feed().subscriber_count(), 1);

    // The replacement subscription delivers changes.
    let remote = NewBookmark::new("C", "https://c.example", "alice").unwrap();
    store.insert_as("bookmarks", &remote);
    app.settle().await;
    assert_eq!(titles(&app), vec!["C", "B", "A"]);
}

/// Test that a feed coming back after a disconnect triggers a refetch.
#[tokio::test]
async fn test_reconnect_refetches() {
    let (mut app, store) = signed_in_memory_app(MEMORY_CONFIG).await;

    store.fail_next(Operation::Select);
    app.on_change(ChangeEvent {
        kind: ChangeKind::Reconnected,
        table: "bookmarks".to_string(),
        record_id: None,
    });
    app.settle().await;
    assert!(app.state().bookmarks.is_empty());

    app.on_change(ChangeEvent {
        kind: ChangeKind::Reconnected,
        table: "bookmarks".to_string(),
        record_id: None,
    });
    app.settle().await;
    assert_eq!(titles(&app), vec!["B", "A"]);
}
