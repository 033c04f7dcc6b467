use std::sync::Arc;

use tracing::{debug, error};

use super::reducer::Action;
use crate::models::{BookmarkChanges, NewBookmark, Session};
use crate::store::{Operation, Store};

/// Runs the bookmark requests against the store and turns each outcome
/// into an [`Action`] for the reducer. Failures end here, at a log line.
#[derive(Clone)]
pub struct BookmarkViewModel {
    store: Arc<dyn Store>,
    table: String,
}

impl BookmarkViewModel {
    pub fn new(store: Arc<dyn Store>, table: impl Into<String>) -> Self {
        Self {
            store,
            table: table.into(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Fetches every visible row.
    pub async fn refresh(self, session: Session) -> Action {
        let owner = session.owner_id().to_string();
        match self.store.select(&session, &self.table).await {
            Ok(records) => {
                debug!(table = %self.table, rows = records.len(), "bookmarks fetched");
                Action::BookmarksLoaded { owner, records }
            }
            Err(e) => {
                error!(
                    table = %self.table,
                    operation = Operation::Select.as_str(),
                    "Fetching bookmarks failed: {}",
                    e
                );
                Action::RefreshFailed {
                    owner,
                    error: e.to_string(),
                }
            }
        }
    }

    pub async fn add(self, session: Session, record: NewBookmark) -> Action {
        match self.store.insert(&session, &self.table, &record).await {
            Ok(records) => Action::BookmarkAdded {
                owner: session.owner_id().to_string(),
                records,
            },
            Err(e) => self.failed(Operation::Insert, None, e.to_string()),
        }
    }

    pub async fn delete(self, session: Session, id: String) -> Action {
        match self.store.delete(&session, &self.table, &id).await {
            Ok(()) => Action::BookmarkDeleted {
                owner: session.owner_id().to_string(),
                id,
            },
            Err(e) => self.failed(Operation::Delete, Some(&id), e.to_string()),
        }
    }

    pub async fn update(self, session: Session, id: String, changes: BookmarkChanges) -> Action {
        match self.store.update(&session, &self.table, &id, &changes).await {
            Ok(records) => Action::BookmarkUpdated {
                owner: session.owner_id().to_string(),
                id,
                records,
            },
            Err(e) => self.failed(Operation::Update, Some(&id), e.to_string()),
        }
    }

    fn failed(&self, operation: Operation, id: Option<&str>, error: String) -> Action {
        error!(
            table = %self.table,
            operation = operation.as_str(),
            bookmark_id = id.unwrap_or("-"),
            "Bookmark {} failed: {}",
            operation,
            error
        );
        Action::MutationFailed { operation, error }
    }
}
