use std::fmt;

use super::reducer::{BookmarkState, Draft};

/// One line of the list. `editing` holds the unsaved values when this is
/// the row being edited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub number: usize,
    pub title: String,
    pub url: String,
    pub editing: Option<Draft>,
}

/// What the screen shows for a given state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum View {
    /// Nobody is signed in: only the sign-in affordance is offered.
    SignIn { provider: String },
    Bookmarks {
        user: String,
        draft: Draft,
        rows: Vec<Row>,
    },
}

impl View {
    pub fn render(state: &BookmarkState, provider: &str) -> Self {
        let Some(session) = state.session.as_ref() else {
            return View::SignIn {
                provider: provider.to_string(),
            };
        };
        let rows = state
            .bookmarks
            .iter()
            .enumerate()
            .map(|(i, bookmark)| Row {
                number: i + 1,
                title: bookmark.title.clone(),
                url: bookmark.url.clone(),
                editing: state
                    .editing
                    .as_ref()
                    .filter(|e| e.id == bookmark.id)
                    .map(|e| Draft {
                        title: e.title.clone(),
                        url: e.url.clone(),
                    }),
            })
            .collect();
        View::Bookmarks {
            user: session.display_name().to_string(),
            draft: state.draft.clone(),
            rows,
        }
    }

    pub fn is_sign_in(&self) -> bool {
        matches!(self, View::SignIn { .. })
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            View::SignIn { provider } => {
                writeln!(f, "Smart Bookmark")?;
                writeln!(f, "Save and manage your favorite links securely.")?;
                write!(f, "Type `login` to continue with {}.", provider)
            }
            View::Bookmarks { user, draft, rows } => {
                writeln!(f, "Smart Bookmark ({})", user)?;
                writeln!(f, "New: title={:?} url={:?}", draft.title, draft.url)?;
                if rows.is_empty() {
                    return write!(f, "No bookmarks yet.");
                }
                for (i, row) in rows.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    match &row.editing {
                        Some(edit) => write!(
                            f,
                            "{:>3}. [editing] title={:?} url={:?}",
                            row.number, edit.title, edit.url
                        )?,
                        None => write!(f, "{:>3}. {} <{}>", row.number, row.title, row.url)?,
                    }
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bookmarks::reducer::{reduce, Action};
    use crate::models::{Bookmark, Session, SessionUser};
    use chrono::Utc;

    #[test]
    fn test_signed_out_renders_sign_in() {
        let view = View::render(&BookmarkState::default(), "google");
        assert!(view.is_sign_in());
        assert!(view.to_string().contains("continue with google"));
    }

    /// Test that the edited row shows its draft and the others their values.
    #[test]
    fn test_editing_row_shows_draft() {
        let session = Session {
            access_token: "t".to_string(),
            refresh_token: String::new(),
            token_type: "bearer".to_string(),
            expires_at: None,
            user: SessionUser {
                id: "alice".to_string(),
                email: Some("alice@example.com".to_string()),
            },
        };
        let row = |id: &str, title: &str| Bookmark {
            id: id.to_string(),
            title: title.to_string(),
            url: format!("https://{}", id),
            user_id: "alice".to_string(),
            created_at: Utc::now(),
        };
        let mut state = reduce(BookmarkState::default(), Action::SessionChanged(Some(session)));
        state.bookmarks = vec![row("b", "B"), row("a", "A")];
        state = reduce(state, Action::EditStarted("a".to_string()));
        state = reduce(state, Action::EditTitleChanged("A2".to_string()));

        let rendered = View::render(&state, "google").to_string();
        assert!(rendered.contains("Smart Bookmark (alice@example.com)"));
        assert!(rendered.contains("  1. B <https://b>"));
        assert!(rendered.contains("  2. [editing] title=\"A2\" url=\"https://a\""));
    }
}
