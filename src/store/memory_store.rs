use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use super::base::{Operation, Store};
use crate::config::MemoryBackendConfig;
use crate::error::{BackendError, BackendResult};
use crate::models::{Bookmark, BookmarkChanges, NewBookmark, Session};
use crate::realtime::{ChangeEvent, ChangeFeed, ChangeKind, MemoryFeed};

/// An in-process stand-in for the hosted database.
///
/// Rows are only visible to, and only writable by, their owner, the way a
/// `user_id = auth.uid()` row-level security policy would behave. Every
/// successful write is announced on the bundled feed to all subscribers.
pub struct MemoryStore {
    inner: Mutex<Inner>,
    feed: Arc<MemoryFeed>,
}

#[derive(Default)]
struct Inner {
    tables: HashMap<String, Vec<Bookmark>>,
    last_created_at: Option<DateTime<Utc>>,
    failures: Vec<Operation>,
}

impl Inner {
    /// Timestamps never repeat, even for writes within the same clock tick.
    fn next_created_at(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let next = match self.last_created_at {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_created_at = Some(next);
        next
    }

    fn take_failure(&mut self, operation: Operation) -> BackendResult<()> {
        match self.failures.iter().position(|op| *op == operation) {
            Some(index) => {
                self.failures.remove(index);
                Err(BackendError::Network(format!(
                    "injected {} failure",
                    operation
                )))
            }
            None => Ok(()),
        }
    }

    fn insert_row(&mut self, table: &str, record: &NewBookmark) -> Bookmark {
        let row = Bookmark {
            id: Uuid::new_v4().to_string(),
            title: record.title.clone(),
            url: record.url.clone(),
            user_id: record.user_id.clone(),
            created_at: self.next_created_at(),
        };
        self.tables
            .entry(table.to_string())
            .or_default()
            .push(row.clone());
        row
    }
}

impl MemoryStore {
    pub fn new(config: &MemoryBackendConfig) -> Self {
        let store = Self {
            inner: Mutex::new(Inner::default()),
            feed: Arc::new(MemoryFeed::new()),
        };
        {
            let mut inner = store.lock();
            for seed in &config.seed {
                if let Some(record) = NewBookmark::new(&seed.title, &seed.url, &config.user_id) {
                    inner.insert_row(&config.table, &record);
                }
            }
        }
        info!(
            "Created in-memory store with {} rows in '{}'",
            config.seed.len(),
            config.table
        );
        store
    }

    /// Makes the next call of `operation` fail with a network error.
    pub fn fail_next(&self, operation: Operation) {
        self.lock().failures.push(operation);
    }

    /// Inserts a row as another client would, bypassing failure injection.
    /// The change is announced like any other write.
    pub fn insert_as(&self, table: &str, record: &NewBookmark) -> Bookmark {
        let row = self.lock().insert_row(table, record);
        self.publish(ChangeKind::Insert, table, &row.id);
        row
    }

    /// Every row of `table`, ignoring ownership.
    pub fn rows(&self, table: &str) -> Vec<Bookmark> {
        self.lock().tables.get(table).cloned().unwrap_or_default()
    }

    pub fn feed(&self) -> Arc<MemoryFeed> {
        self.feed.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn publish(&self, kind: ChangeKind, table: &str, id: &str) {
        self.feed.publish(ChangeEvent {
            kind,
            table: table.to_string(),
            record_id: Some(id.to_string()),
        });
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn get_name(&self) -> &str {
        "memory"
    }

    async fn select(&self, session: &Session, table: &str) -> BackendResult<Vec<Bookmark>> {
        let mut inner = self.lock();
        inner.take_failure(Operation::Select)?;
        let mut rows: Vec<Bookmark> = inner
            .tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| row.user_id == session.owner_id())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        debug!(table, rows = rows.len(), "selected bookmarks");
        Ok(rows)
    }

    async fn insert(
        &self,
        session: &Session,
        table: &str,
        record: &NewBookmark,
    ) -> BackendResult<Vec<Bookmark>> {
        let row = {
            let mut inner = self.lock();
            inner.take_failure(Operation::Insert)?;
            if record.user_id != session.owner_id() {
                return Err(BackendError::Unauthorized(
                    "new row violates row-level security policy".to_string(),
                ));
            }
            inner.insert_row(table, record)
        };
        self.publish(ChangeKind::Insert, table, &row.id);
        Ok(vec![row])
    }

    async fn update(
        &self,
        session: &Session,
        table: &str,
        id: &str,
        changes: &BookmarkChanges,
    ) -> BackendResult<Vec<Bookmark>> {
        let updated: Vec<Bookmark> = {
            let mut inner = self.lock();
            inner.take_failure(Operation::Update)?;
            inner
                .tables
                .get_mut(table)
                .map(|rows| {
                    rows.iter_mut()
                        .filter(|row| row.id == id && row.user_id == session.owner_id())
                        .map(|row| {
                            row.title = changes.title.clone();
                            row.url = changes.url.clone();
                            row.clone()
                        })
                        .collect()
                })
                .unwrap_or_default()
        };
        if !updated.is_empty() {
            self.publish(ChangeKind::Update, table, id);
        }
        Ok(updated)
    }

    async fn delete(&self, session: &Session, table: &str, id: &str) -> BackendResult<()> {
        let removed = {
            let mut inner = self.lock();
            inner.take_failure(Operation::Delete)?;
            match inner.tables.get_mut(table) {
                Some(rows) => {
                    let before = rows.len();
                    rows.retain(|row| !(row.id == id && row.user_id == session.owner_id()));
                    before != rows.len()
                }
                None => false,
            }
        };
        // Like a filtered DELETE, a row that is not visible is simply not deleted.
        if removed {
            self.publish(ChangeKind::Delete, table, id);
        }
        Ok(())
    }

    fn change_feed(&self) -> Option<Arc<dyn ChangeFeed>> {
        Some(self.feed.clone())
    }
}
