use async_trait::async_trait;
use tracing::debug;

use super::base::Store;
use crate::config::SupabaseConfig;
use crate::error::BackendResult;
use crate::models::{Bookmark, BookmarkChanges, NewBookmark, Session};
use crate::utils::http::{ensure_success, with_credentials};

/// The Supabase data API (PostgREST). Row visibility is whatever the
/// table's row-level security policies allow for the caller's token.
pub struct PostgrestStore {
    base_url: String,
    anon_key: String,
    client: reqwest::Client,
}

impl PostgrestStore {
    pub fn new(config: &SupabaseConfig) -> Self {
        Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            anon_key: config.anon_key.clone(),
            client: reqwest::Client::new(),
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn request(
        &self,
        method: reqwest::Method,
        session: &Session,
        table: &str,
    ) -> reqwest::RequestBuilder {
        with_credentials(
            self.client.request(method, self.table_url(table)),
            &self.anon_key,
            &session.access_token,
        )
    }
}

fn id_filter(id: &str) -> String {
    format!("eq.{}", id)
}

#[async_trait]
impl Store for PostgrestStore {
    fn get_name(&self) -> &str {
        "postgrest"
    }

    async fn select(&self, session: &Session, table: &str) -> BackendResult<Vec<Bookmark>> {
        debug!(table, "selecting bookmarks");
        let response = self
            .request(reqwest::Method::GET, session, table)
            .query(&[("select", "*"), ("order", "created_at.desc")])
            .send()
            .await?;
        Ok(ensure_success(response).await?.json().await?)
    }

    async fn insert(
        &self,
        session: &Session,
        table: &str,
        record: &NewBookmark,
    ) -> BackendResult<Vec<Bookmark>> {
        debug!(table, "inserting bookmark");
        let response = self
            .request(reqwest::Method::POST, session, table)
            .query(&[("select", "*")])
            .header("Prefer", "return=representation")
            .json(&[record])
            .send()
            .await?;
        Ok(ensure_success(response).await?.json().await?)
    }

    async fn update(
        &self,
        session: &Session,
        table: &str,
        id: &str,
        changes: &BookmarkChanges,
    ) -> BackendResult<Vec<Bookmark>> {
        debug!(table, bookmark_id = id, "updating bookmark");
        let response = self
            .request(reqwest::Method::PATCH, session, table)
            .query(&[("id", id_filter(id).as_str()), ("select", "*")])
            .header("Prefer", "return=representation")
            .json(changes)
            .send()
            .await?;
        Ok(ensure_success(response).await?.json().await?)
    }

    async fn delete(&self, session: &Session, table: &str, id: &str) -> BackendResult<()> {
        debug!(table, bookmark_id = id, "deleting bookmark");
        let response = self
            .request(reqwest::Method::DELETE, session, table)
            .query(&[("id", id_filter(id).as_str())])
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }
}
