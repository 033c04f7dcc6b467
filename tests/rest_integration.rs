mod common;

use std::sync::Arc;

use common::{load, memory_backend, run_commands, titles};
use mockito::{Matcher, Server};
use serde_json::json;
use smartmark::app::App;
use smartmark::auth::local_provider::LocalAuthProvider;
use smartmark::config::SupabaseConfig;
use smartmark::realtime::no_feed::NoFeed;
use smartmark::store::postgrest_store::PostgrestStore;

const AUTH_CONFIG: &str = r#"
version: "1.0.0"
backend:
  type: "memory"
  user_id: "user-1"
"#;

fn row(id: &str, title: &str, created_at: &str) -> serde_json::Value {
    json!({
        "id": id,
        "title": title,
        "url": format!("https://{}.example", title.to_lowercase()),
        "user_id": "user-1",
        "created_at": created_at,
    })
}

/// An app that signs in locally but keeps its bookmarks behind a mocked PostgREST.
async fn rest_app(server: &Server) -> App {
    let backend = memory_backend(&load(AUTH_CONFIG));
    let store = PostgrestStore::new(&SupabaseConfig {
        url: server.url(),
        anon_key: "anon-key".to_string(),
        table: "bookmarks".to_string(),
        oauth_provider: "google".to_string(),
        redirect_to: None,
        session_file: "unused-session.json".into(),
    });
    let mut app = App::from_parts(
        Arc::new(LocalAuthProvider::new(&backend)),
        Arc::new(store),
        Arc::new(NoFeed::new()),
        "bookmarks",
    );
    app.start().await;
    run_commands(&mut app, &["login"]).await;
    app.settle().await;
    app
}

async fn mock_select(server: &mut Server, rows: serde_json::Value) -> mockito::Mock {
    server
        .mock("GET", "/rest/v1/bookmarks")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("select".into(), "*".into()),
            Matcher::UrlEncoded("order".into(), "created_at.desc".into()),
        ]))
        .match_header("apikey", "anon-key")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(rows.to_string())
        .create_async()
        .await
}

/// Test that the initial fetch shows the newer of two rows first.
#[tokio::test]
async fn test_initial_fetch_order() {
    let mut server = Server::new_async().await;
    let select = mock_select(
        &mut server,
        json!([
            row("2", "B", "2024-05-02T00:00:00Z"),
            row("1", "A", "2024-05-01T00:00:00Z"),
        ]),
    )
    .await;

    let app = rest_app(&server).await;
    select.assert_async().await;
    assert_eq!(titles(&app), vec!["B", "A"]);
}

/// Test that an added row is prepended as returned, even when it sorts older.
#[tokio::test]
async fn test_add_prepends_returned_row() {
    let mut server = Server::new_async().await;
    mock_select(&mut server, json!([row("2", "B", "2024-05-02T00:00:00Z")])).await;
    let insert = server
        .mock("POST", "/rest/v1/bookmarks")
        .match_query(Matcher::UrlEncoded("select".into(), "*".into()))
        .match_body(Matcher::Json(json!([
            {"title": "Old", "url": "https://old.example", "user_id": "user-1"}
        ])))
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(json!([row("3", "Old", "2020-01-01T00:00:00Z")]).to_string())
        .create_async()
        .await;

    let mut app = rest_app(&server).await;
    run_commands(&mut app, &["title Old", "url https://old.example", "add"]).await;
    app.settle().await;

    insert.assert_async().await;
    // No feed here, so nothing re-sorts the list.
    assert_eq!(titles(&app), vec!["Old", "B"]);
}

/// Test that a rejected delete leaves the row in place.
#[tokio::test]
async fn test_rejected_delete_keeps_row() {
    let mut server = Server::new_async().await;
    mock_select(&mut server, json!([row("2", "B", "2024-05-02T00:00:00Z")])).await;
    let delete = server
        .mock("DELETE", "/rest/v1/bookmarks")
        .match_query(Matcher::UrlEncoded("id".into(), "eq.2".into()))
        .with_status(500)
        .with_body(r#"{"message":"database unavailable"}"#)
        .create_async()
        .await;

    let mut app = rest_app(&server).await;
    run_commands(&mut app, &["delete 1"]).await;
    app.settle().await;

    delete.assert_async().await;
    assert_eq!(titles(&app), vec!["B"]);
}

/// Test that an update merges the returned fields and leaves editing mode.
#[tokio::test]
async fn test_update_merges_returned_row() {
    let mut server = Server::new_async().await;
    mock_select(&mut server, json!([row("2", "B", "2024-05-02T00:00:00Z")])).await;
    let update = server
        .mock("PATCH", "/rest/v1/bookmarks")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("id".into(), "eq.2".into()),
            Matcher::UrlEncoded("select".into(), "*".into()),
        ]))
        .match_body(Matcher::Json(json!({"title": "B2", "url": "https://b.example"})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!([row("2", "B2", "2024-05-02T00:00:00Z")]).to_string())
        .create_async()
        .await;

    let mut app = rest_app(&server).await;
    run_commands(&mut app, &["edit 1", "edit-title B2", "save"]).await;
    app.settle().await;

    update.assert_async().await;
    let state = app.state();
    assert!(state.editing.is_none());
    assert_eq!(state.bookmarks[0].id, "2");
    assert_eq!(state.bookmarks[0].title, "B2");
    assert_eq!(state.bookmarks[0].user_id, "user-1");
}

/// Test that a failing fetch leaves an empty list behind.
#[tokio::test]
async fn test_failed_fetch_shows_empty_list() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/rest/v1/bookmarks")
        .match_query(Matcher::Any)
        .with_status(503)
        .create_async()
        .await;

    let app = rest_app(&server).await;
    assert!(app.state().session.is_some());
    assert!(app.state().bookmarks.is_empty());
}
