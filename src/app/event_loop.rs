//! The single loop that owns the bookmark state.
//!
//! Auth changes, change-feed notifications, completed requests, terminal
//! commands and the token-refresh timer are all handled here, one at a
//! time. Nothing here waits on the network: bookmark requests run in
//! `in_flight` and their results are only applied when the loop picks them
//! up, while auth requests and feed teardown run in `auth_tasks` and report
//! back through the session manager.

use std::future::{pending, Future};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::command::{Command, RowRef};
use crate::auth::{AuthProvider, SessionManager, SignIn};
use crate::bookmarks::{reduce, Action, BookmarkState, BookmarkViewModel, View};
use crate::models::{BookmarkChanges, NewBookmark, Session};
use crate::realtime::{ChangeEvent, ChangeFeed, Subscription};
use crate::state::AppState;
use crate::store::Store;
use crate::utils::log_throttle::LogThrottle;

const FEED_LOG_WINDOW: Duration = Duration::from_secs(10);

/// Whether the loop should keep going after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct App {
    state: BookmarkState,
    sessions: SessionManager,
    view_model: BookmarkViewModel,
    feed: Arc<dyn ChangeFeed>,
    subscription: Option<Subscription>,
    in_flight: FuturesUnordered<BoxFuture<'static, Action>>,
    /// Auth and feed side effects; each may leave a notice for the user.
    auth_tasks: FuturesUnordered<BoxFuture<'static, Option<String>>>,
    oauth_provider: String,
    notices: Vec<String>,
    throttle: LogThrottle,
}

impl App {
    pub fn new(state: &AppState) -> Self {
        Self::from_parts(
            state.auth.clone(),
            state.store.clone(),
            state.feed.clone(),
            state.config.backend.table(),
        )
    }

    pub fn from_parts(
        auth: Arc<dyn AuthProvider>,
        store: Arc<dyn Store>,
        feed: Arc<dyn ChangeFeed>,
        table: &str,
    ) -> Self {
        info!(
            "Creating app for table '{}' with auth '{}', store '{}' and feed '{}'",
            table,
            auth.get_name(),
            store.get_name(),
            feed.get_name()
        );
        Self {
            state: BookmarkState::default(),
            oauth_provider: auth.default_oauth_provider().to_string(),
            sessions: SessionManager::new(auth),
            view_model: BookmarkViewModel::new(store, table),
            feed,
            subscription: None,
            in_flight: FuturesUnordered::new(),
            auth_tasks: FuturesUnordered::new(),
            notices: Vec::new(),
            throttle: LogThrottle::new(FEED_LOG_WINDOW),
        }
    }

    /// Restores a persisted session, if there is one, and starts syncing it.
    pub async fn start(&mut self) {
        if let Some(session) = self.sessions.initialize().await {
            self.on_session_changed(Some(session));
        }
    }

    pub fn state(&self) -> &BookmarkState {
        &self.state
    }

    pub fn view(&self) -> View {
        View::render(&self.state, &self.oauth_provider)
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_some()
    }

    /// Messages for the user produced since the last call.
    pub fn take_notices(&mut self) -> Vec<String> {
        std::mem::take(&mut self.notices)
    }

    pub fn handle_command(&mut self, command: Command) -> Flow {
        debug!(?command, "command received");
        match command {
            Command::Quit => return Flow::Quit,
            Command::Show => {}
            Command::Login(provider) => self.login(provider.as_deref()),
            Command::Callback(url) => {
                if self.state.session.is_some() {
                    self.notices.push("Already signed in.".to_string());
                } else {
                    let task = self.sessions.complete_sign_in(&url);
                    self.spawn_auth(async move {
                        task.await;
                        None
                    });
                }
            }
            Command::Logout => {
                if let Some(task) = self.sessions.sign_out() {
                    self.spawn_auth(async move {
                        task.await;
                        None
                    });
                }
            }
            Command::Title(title) => self.while_signed_in(Action::DraftTitleChanged(title)),
            Command::Url(url) => self.while_signed_in(Action::DraftUrlChanged(url)),
            Command::Add => self.add(),
            Command::Edit(row) => {
                if let Some(id) = self.resolve(&row) {
                    self.dispatch(Action::EditStarted(id));
                }
            }
            Command::EditTitle(title) => self.dispatch(Action::EditTitleChanged(title)),
            Command::EditUrl(url) => self.dispatch(Action::EditUrlChanged(url)),
            Command::Save => self.save(),
            Command::Cancel => self.dispatch(Action::EditCancelled),
            Command::Delete(row) => {
                if let Some(id) = self.resolve(&row) {
                    self.delete(id);
                }
            }
        }
        Flow::Continue
    }

    /// Swaps the feed subscription over to `session` and reloads, or tears
    /// everything down when there is no session any more.
    pub fn on_session_changed(&mut self, session: Option<Session>) {
        if let Some(subscription) = self.subscription.take() {
            self.spawn_auth(async move {
                subscription.unsubscribe().await;
                None
            });
        }
        info!(
            event_name = "app.session.changed",
            event_domain = "auth",
            signed_in = session.is_some(),
            "session changed"
        );
        self.dispatch(Action::SessionChanged(session.clone()));

        if let Some(session) = session {
            self.refresh(&session);
            self.subscription = Some(self.feed.subscribe(&session, self.view_model.table()));
        }
    }

    /// Every notification means "something changed": reload everything.
    pub fn on_change(&mut self, event: ChangeEvent) {
        let Some(session) = self.state.session.clone() else {
            debug!("Ignoring change notification while signed out");
            return;
        };
        if let Some(suppressed_count) = self.throttle.should_emit("app.feed.refetch") {
            info!(
                event_name = "app.feed.refetch",
                event_domain = "realtime",
                kind = event.kind.as_str(),
                table = %event.table,
                suppressed_count,
                "change notification, refetching bookmarks"
            );
        }
        self.refresh(&session);
    }

    pub fn apply(&mut self, action: Action) {
        self.dispatch(action);
    }

    /// Drives queued auth changes, pending feed notifications, auth tasks
    /// and in-flight requests until nothing is left to do.
    pub async fn settle(&mut self) {
        loop {
            let mut progressed = false;
            while let Some(change) = self.sessions.try_next_change() {
                self.on_session_changed(change);
                progressed = true;
            }
            while let Some(event) = self.subscription.as_mut().and_then(Subscription::try_recv) {
                self.on_change(event);
                progressed = true;
            }
            if let Some(action) = self.in_flight.next().await {
                self.apply(action);
                progressed = true;
            }
            if let Some(notice) = self.auth_tasks.next().await {
                self.notices.extend(notice);
                progressed = true;
            }
            if !progressed {
                return;
            }
        }
    }

    /// Runs until `quit` or until the command channel closes. `output`
    /// receives the rendered screen after every change plus any notices.
    pub async fn run<F>(&mut self, mut commands: mpsc::Receiver<Command>, mut output: F)
    where
        F: FnMut(String),
    {
        self.start().await;
        output(self.view().to_string());

        loop {
            let deadline = self.sessions.refresh_deadline();
            let before = self.state.clone();

            tokio::select! {
                Some(change) = self.sessions.next_change() => {
                    self.on_session_changed(change);
                }
                event = next_event(&mut self.subscription) => {
                    self.on_change(event);
                }
                Some(action) = self.in_flight.next() => {
                    self.apply(action);
                }
                Some(notice) = self.auth_tasks.next() => {
                    self.notices.extend(notice);
                }
                _ = sleep_until(deadline) => {
                    if let Some(task) = self.sessions.refresh() {
                        self.spawn_auth(async move {
                            task.await;
                            None
                        });
                    }
                }
                command = commands.recv() => {
                    let Some(command) = command else {
                        info!("Input closed, stopping");
                        return;
                    };
                    let show = command == Command::Show;
                    if self.handle_command(command) == Flow::Quit {
                        return;
                    }
                    if show {
                        output(self.view().to_string());
                    }
                }
            }

            for notice in self.take_notices() {
                output(notice);
            }
            if self.state != before {
                output(self.view().to_string());
            }
        }
    }

    fn login(&mut self, provider: Option<&str>) {
        if self.state.session.is_some() {
            self.notices.push("Already signed in.".to_string());
            return;
        }
        let task = self.sessions.sign_in(provider);
        self.spawn_auth(async move {
            match task.await {
                Some(SignIn::Redirect(url)) => Some(format!(
                    "Open this address to sign in:\n  {}\nthen paste the address you land on with `callback <url>`.",
                    url
                )),
                Some(SignIn::Started) | None => None,
            }
        });
    }

    fn spawn_auth<F>(&mut self, task: F)
    where
        F: Future<Output = Option<String>> + Send + 'static,
    {
        self.auth_tasks.push(Box::pin(task));
    }

    fn dispatch(&mut self, action: Action) {
        debug!(action = action.name(), "dispatch");
        self.state = reduce(std::mem::take(&mut self.state), action);
    }

    fn while_signed_in(&mut self, action: Action) {
        if self.state.session.is_some() {
            self.dispatch(action);
        }
    }

    fn refresh(&mut self, session: &Session) {
        let view_model = self.view_model.clone();
        self.in_flight
            .push(Box::pin(view_model.refresh(session.clone())));
    }

    fn add(&mut self) {
        let Some(session) = self.state.session.clone() else {
            return;
        };
        let draft = &self.state.draft;
        let Some(record) = NewBookmark::new(&draft.title, &draft.url, session.owner_id()) else {
            debug!("Not adding a bookmark without both title and url");
            return;
        };
        let view_model = self.view_model.clone();
        self.in_flight.push(Box::pin(view_model.add(session, record)));
    }

    fn save(&mut self) {
        let Some(session) = self.state.session.clone() else {
            return;
        };
        let Some(editing) = self.state.editing.as_ref() else {
            debug!("Nothing is being edited");
            return;
        };
        let Some(changes) = BookmarkChanges::new(&editing.title, &editing.url) else {
            debug!("Not saving a bookmark without both title and url");
            return;
        };
        let id = editing.id.clone();
        let view_model = self.view_model.clone();
        self.in_flight
            .push(Box::pin(view_model.update(session, id, changes)));
    }

    fn delete(&mut self, id: String) {
        let Some(session) = self.state.session.clone() else {
            return;
        };
        let view_model = self.view_model.clone();
        self.in_flight.push(Box::pin(view_model.delete(session, id)));
    }

    /// Maps a row reference to a bookmark id currently on screen.
    fn resolve(&mut self, row: &RowRef) -> Option<String> {
        if self.state.session.is_none() {
            return None;
        }
        let found = match row {
            RowRef::Number(n) => n.checked_sub(1).and_then(|i| self.state.bookmarks.get(i)),
            RowRef::Id(id) => self.state.find(id),
        };
        match found {
            Some(bookmark) => Some(bookmark.id.clone()),
            None => {
                warn!("No bookmark matches {:?}", row);
                self.notices.push("No such bookmark.".to_string());
                None
            }
        }
    }
}

async fn next_event(subscription: &mut Option<Subscription>) -> ChangeEvent {
    match subscription {
        Some(subscription) => subscription.recv().await,
        None => pending().await,
    }
}

async fn sleep_until(deadline: Option<i64>) {
    match deadline {
        Some(at) => {
            let wait = (at - Utc::now().timestamp()).max(0) as u64;
            tokio::time::sleep(Duration::from_secs(wait)).await;
        }
        None => pending().await,
    }
}
