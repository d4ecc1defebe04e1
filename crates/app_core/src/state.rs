//! Navigation store: current path, preview selection and route
//!
//! Only the navigator and preview controller write to the store (the
//! writers are crate-private); everything else reads snapshots or
//! subscribes to changes.

use crate::navigation::{NavigationEntry, NavigationHistory, PreviewSelection};
use crate::path::RemotePath;
use app_net::AuthRedirect;
use parking_lot::Mutex;
use tokio::sync::watch;

/// Which screen the client is on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Route {
    #[default]
    Files,
    Login,
}

/// Everything observers need to render the navigation state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NavigationSnapshot {
    pub route: Route,
    pub path: RemotePath,
    pub preview: Option<PreviewSelection>,
    pub can_go_back: bool,
    pub can_go_forward: bool,
}

/// Single source of truth for where the user is
pub struct NavigationStore {
    history: Mutex<NavigationHistory>,
    route: Mutex<Route>,
    tx: watch::Sender<NavigationSnapshot>,
}

impl NavigationStore {
    pub fn new(start: RemotePath) -> Self {
        let history = NavigationHistory::new(NavigationEntry::directory(start.clone()));
        let (tx, _) = watch::channel(NavigationSnapshot {
            path: start,
            ..Default::default()
        });
        Self {
            history: Mutex::new(history),
            route: Mutex::new(Route::Files),
            tx,
        }
    }

    pub fn snapshot(&self) -> NavigationSnapshot {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<NavigationSnapshot> {
        self.tx.subscribe()
    }

    pub fn current_path(&self) -> RemotePath {
        self.tx.borrow().path.clone()
    }

    pub fn preview(&self) -> Option<PreviewSelection> {
        self.tx.borrow().preview.clone()
    }

    pub fn route(&self) -> Route {
        *self.route.lock()
    }

    pub(crate) fn push(&self, entry: NavigationEntry) {
        let mut history = self.history.lock();
        history.navigate_to(entry);
        self.publish(&history);
    }

    pub(crate) fn replace_preview(&self, preview: Option<PreviewSelection>) {
        let mut history = self.history.lock();
        history.replace_preview(preview);
        self.publish(&history);
    }

    pub(crate) fn go_back(&self) -> bool {
        let mut history = self.history.lock();
        let moved = history.go_back();
        if moved {
            self.publish(&history);
        }
        moved
    }

    pub(crate) fn go_forward(&self) -> bool {
        let mut history = self.history.lock();
        let moved = history.go_forward();
        if moved {
            self.publish(&history);
        }
        moved
    }

    pub(crate) fn set_route(&self, route: Route) {
        *self.route.lock() = route;
        self.tx.send_if_modified(|snapshot| {
            let changed = snapshot.route != route;
            snapshot.route = route;
            changed
        });
    }

    // Called with the history lock held so snapshots are published in order
    fn publish(&self, history: &NavigationHistory) {
        let entry = history.current();
        let route = *self.route.lock();
        self.tx.send_replace(NavigationSnapshot {
            route,
            path: entry.path.clone(),
            preview: entry.preview.clone(),
            can_go_back: history.can_go_back(),
            can_go_forward: history.can_go_forward(),
        });
    }
}

impl Default for NavigationStore {
    fn default() -> Self {
        Self::new(RemotePath::root())
    }
}

impl AuthRedirect for NavigationStore {
    fn redirect_to_login(&self) {
        tracing::info!("Switching to login screen");
        self.set_route(Route::Login);
    }
}
