use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::{memory_store::MemoryStore, postgrest_store::PostgrestStore};
use crate::config::BackendConfig;
use crate::error::BackendResult;
use crate::models::{Bookmark, BookmarkChanges, NewBookmark, Session};
use crate::realtime::ChangeFeed;

/// The four requests a store answers. Used to tag failures in logs and to
/// pick which request to fail in tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Select,
    Insert,
    Update,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Select => "select",
            Operation::Insert => "insert",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Remote bookmark persistence. Every call is made on behalf of `session`;
/// which rows it may see or touch is decided by the store, not the caller.
#[async_trait]
pub trait Store: Send + Sync {
    fn get_name(&self) -> &str;

    /// All visible rows, newest first.
    async fn select(&self, session: &Session, table: &str) -> BackendResult<Vec<Bookmark>>;

    /// Returns the inserted rows with their assigned id and timestamp.
    async fn insert(
        &self,
        session: &Session,
        table: &str,
        record: &NewBookmark,
    ) -> BackendResult<Vec<Bookmark>>;

    /// Returns the updated rows; empty when no visible row has `id`.
    async fn update(
        &self,
        session: &Session,
        table: &str,
        id: &str,
        changes: &BookmarkChanges,
    ) -> BackendResult<Vec<Bookmark>>;

    async fn delete(&self, session: &Session, table: &str, id: &str) -> BackendResult<()>;

    /// A change feed bundled with the store, for stores that can notify
    /// about their own writes.
    fn change_feed(&self) -> Option<Arc<dyn ChangeFeed>> {
        None
    }
}

/// Creates the store for the configured backend.
pub fn create_store(config: &BackendConfig) -> Arc<dyn Store> {
    match config {
        BackendConfig::Supabase(cfg) => {
            info!("Using PostgREST store at '{}'", cfg.url);
            Arc::new(PostgrestStore::new(cfg))
        }
        BackendConfig::Memory(cfg) => {
            info!("Using in-memory store with {} seeded rows", cfg.seed.len());
            Arc::new(MemoryStore::new(cfg))
        }
    }
}
