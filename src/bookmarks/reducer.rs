//! The bookmark screen as explicit state plus a pure reducer.
//!
//! Everything the screen shows lives in [`BookmarkState`] and only changes
//! through [`reduce`]. Side effects (requests, subscriptions) are started by
//! the event loop, whose results come back here as [`Action`]s.

use std::collections::HashSet;

use crate::models::{Bookmark, Session};
use crate::store::Operation;

/// The inputs of the "new bookmark" form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Draft {
    pub title: String,
    pub url: String,
}

/// The single row being edited and its unsaved values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditState {
    pub id: String,
    pub title: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookmarkState {
    pub session: Option<Session>,
    pub bookmarks: Vec<Bookmark>,
    pub draft: Draft,
    pub editing: Option<EditState>,
}

impl BookmarkState {
    /// Owner id of the current session.
    pub fn owner(&self) -> Option<&str> {
        self.session.as_ref().map(Session::owner_id)
    }

    pub fn find(&self, id: &str) -> Option<&Bookmark> {
        self.bookmarks.iter().find(|b| b.id == id)
    }

    fn owned_by(&self, owner: &str) -> bool {
        self.owner() == Some(owner)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// The auth provider reported a new session, or none.
    SessionChanged(Option<Session>),
    DraftTitleChanged(String),
    DraftUrlChanged(String),
    /// A full fetch made for `owner` returned.
    BookmarksLoaded {
        owner: String,
        records: Vec<Bookmark>,
    },
    /// A full fetch made for `owner` failed.
    RefreshFailed {
        owner: String,
        error: String,
    },
    BookmarkAdded {
        owner: String,
        records: Vec<Bookmark>,
    },
    BookmarkUpdated {
        owner: String,
        id: String,
        records: Vec<Bookmark>,
    },
    BookmarkDeleted {
        owner: String,
        id: String,
    },
    EditStarted(String),
    EditTitleChanged(String),
    EditUrlChanged(String),
    EditCancelled,
    /// An add, update or delete was rejected. Leaves the state as it was.
    MutationFailed {
        operation: Operation,
        error: String,
    },
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::SessionChanged(_) => "session_changed",
            Action::DraftTitleChanged(_) => "draft_title_changed",
            Action::DraftUrlChanged(_) => "draft_url_changed",
            Action::BookmarksLoaded { .. } => "bookmarks_loaded",
            Action::RefreshFailed { .. } => "refresh_failed",
            Action::BookmarkAdded { .. } => "bookmark_added",
            Action::BookmarkUpdated { .. } => "bookmark_updated",
            Action::BookmarkDeleted { .. } => "bookmark_deleted",
            Action::EditStarted(_) => "edit_started",
            Action::EditTitleChanged(_) => "edit_title_changed",
            Action::EditUrlChanged(_) => "edit_url_changed",
            Action::EditCancelled => "edit_cancelled",
            Action::MutationFailed { .. } => "mutation_failed",
        }
    }
}

pub fn reduce(mut state: BookmarkState, action: Action) -> BookmarkState {
    match action {
        Action::SessionChanged(session) => {
            if session.is_none() {
                state.bookmarks.clear();
                state.draft = Draft::default();
                state.editing = None;
            }
            state.session = session;
        }
        Action::DraftTitleChanged(title) => state.draft.title = title,
        Action::DraftUrlChanged(url) => state.draft.url = url,
        Action::BookmarksLoaded { owner, mut records } => {
            if state.owned_by(&owner) {
                // Stable, so rows with equal timestamps keep the store's order.
                records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
                let mut seen = HashSet::new();
                records.retain(|b| seen.insert(b.id.clone()));
                state.bookmarks = records;
            }
        }
        Action::RefreshFailed { owner, .. } => {
            if state.owned_by(&owner) {
                state.bookmarks.clear();
            }
        }
        Action::BookmarkAdded { owner, records } => {
            if state.owned_by(&owner) {
                state
                    .bookmarks
                    .retain(|existing| !records.iter().any(|added| added.id == existing.id));
                let mut merged = records;
                merged.append(&mut state.bookmarks);
                state.bookmarks = merged;
                state.draft = Draft::default();
            }
        }
        Action::BookmarkUpdated { owner, id, records } => {
            if state.owned_by(&owner) {
                if let Some(updated) = records.first() {
                    if let Some(local) = state.bookmarks.iter_mut().find(|b| b.id == id) {
                        local.merge(updated);
                    }
                }
                state.editing = None;
            }
        }
        Action::BookmarkDeleted { owner, id } => {
            if state.owned_by(&owner) {
                state.bookmarks.retain(|b| b.id != id);
                if state.editing.as_ref().map(|e| e.id == id).unwrap_or(false) {
                    state.editing = None;
                }
            }
        }
        Action::EditStarted(id) => {
            let editing = state.find(&id).map(|bookmark| EditState {
                id: bookmark.id.clone(),
                title: bookmark.title.clone(),
                url: bookmark.url.clone(),
            });
            if editing.is_some() {
                state.editing = editing;
            }
        }
        Action::EditTitleChanged(title) => {
            if let Some(editing) = state.editing.as_mut() {
                editing.title = title;
            }
        }
        Action::EditUrlChanged(url) => {
            if let Some(editing) = state.editing.as_mut() {
                editing.url = url;
            }
        }
        Action::EditCancelled => state.editing = None,
        Action::MutationFailed { .. } => {}
    }
    state
}
