//! Directory navigator
//!
//! Owns the directory listing for the current path. Navigation itself only
//! touches the store; the watcher task started by [`Navigator::watch`]
//! notices path changes (or a bumped reload signal) and reloads.

use crate::navigation::NavigationEntry;
use crate::path::{Breadcrumb, RemotePath};
use crate::sort::{SortColumn, SortOrder, SortState};
use crate::state::NavigationStore;
use crate::AppError;
use app_net::{Dispatcher, Url};
use app_proto::{endpoint, FileRequest, FileStat, ReadDirResponse};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Listing for one directory
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DirectoryState {
    pub path: RemotePath,
    /// Entries in server order
    pub listing: Vec<FileStat>,
    pub loading: bool,
    /// Why the latest reload did not replace the listing
    pub failure: Option<ReloadFailure>,
}

impl DirectoryState {
    /// Whether the latest reload of `path` has finished, either way
    pub fn settled_for(&self, path: &RemotePath) -> bool {
        !self.loading && (self.path == *path || self.failure_for(path).is_some())
    }

    /// Failure message for `path`, if its latest reload failed
    pub fn failure_for(&self, path: &RemotePath) -> Option<&str> {
        self.failure
            .as_ref()
            .filter(|failure| failure.path == *path)
            .map(|failure| failure.message.as_str())
    }
}

/// A reload that was refused or did not complete
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadFailure {
    pub path: RemotePath,
    pub message: String,
}

/// What happened to a reload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// The listing was replaced
    Applied,
    /// A newer reload or navigation superseded this one; nothing changed
    Stale,
    /// The server refused; the previous listing is kept
    Rejected(String),
}

fn read_dir_tag(path: &RemotePath) -> String {
    format!("read_dir:{}", path)
}

pub struct Navigator {
    dispatcher: Arc<Dispatcher>,
    store: Arc<NavigationStore>,
    directory: watch::Sender<DirectoryState>,
    reload_signal: watch::Sender<u64>,
    generation: AtomicU64,
    sort: Mutex<SortState>,
}

impl Navigator {
    pub fn new(dispatcher: Arc<Dispatcher>, store: Arc<NavigationStore>) -> Self {
        let (directory, _) = watch::channel(DirectoryState::default());
        let (reload_signal, _) = watch::channel(0);
        Self {
            dispatcher,
            store,
            directory,
            reload_signal,
            generation: AtomicU64::new(0),
            sort: Mutex::new(SortState::default()),
        }
    }

    pub fn store(&self) -> &Arc<NavigationStore> {
        &self.store
    }

    pub fn current_path(&self) -> RemotePath {
        self.store.current_path()
    }

    pub fn directory(&self) -> DirectoryState {
        self.directory.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<DirectoryState> {
        self.directory.subscribe()
    }

    /// Go to `path` with no preview open
    pub fn navigate(&self, path: RemotePath) {
        tracing::debug!("Navigate to '{}'", path);
        self.store.push(NavigationEntry::directory(path));
    }

    pub fn go_back(&self) -> bool {
        self.store.go_back()
    }

    pub fn go_forward(&self) -> bool {
        self.store.go_forward()
    }

    /// Go to the parent of the current path
    pub fn go_up(&self) -> bool {
        match self.current_path().parent() {
            Some(parent) => {
                self.navigate(parent);
                true
            }
            None => false,
        }
    }

    /// Reload the current path without touching navigation state
    pub fn refresh(&self) {
        self.reload_signal.send_modify(|signal| *signal += 1);
    }

    /// Fetch the listing for `path` and publish it if still wanted
    pub async fn reload(&self, path: &RemotePath) -> Result<ReloadOutcome, AppError> {
        let ticket = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.directory.send_modify(|state| {
            state.loading = true;
            state.failure = None;
        });

        let tag = read_dir_tag(path);
        let request = FileRequest::new(path.as_string());
        let result = self
            .dispatcher
            .call_tagged(endpoint::READ_DIR, &request, &tag)
            .await;

        let newest = ticket == self.generation.load(Ordering::SeqCst);
        if !newest || self.store.current_path() != *path {
            tracing::debug!("Dropping stale listing for '{}'", path);
            if newest {
                self.directory.send_modify(|state| state.loading = false);
            }
            return Ok(ReloadOutcome::Stale);
        }

        let envelope = match result {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!("Failed to read '{}': {}", path, e);
                let e = AppError::from(e);
                self.fail(path, e.user_message());
                return Err(e);
            }
        };

        if !envelope.is_success() {
            tracing::warn!("Server refused to list '{}': {}", path, envelope.message);
            self.fail(path, envelope.message.clone());
            return Ok(ReloadOutcome::Rejected(envelope.message));
        }

        let response: ReadDirResponse = match envelope.decode() {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Malformed listing for '{}': {}", path, e);
                let e = AppError::from(e);
                self.fail(path, e.user_message());
                return Err(e);
            }
        };

        tracing::debug!("Loaded {} entries for '{}'", response.files.len(), path);
        self.directory.send_replace(DirectoryState {
            path: path.clone(),
            listing: response.files,
            loading: false,
            failure: None,
        });
        Ok(ReloadOutcome::Applied)
    }

    // The old listing stays up
    fn fail(&self, path: &RemotePath, message: String) {
        self.directory.send_modify(|state| {
            state.loading = false;
            state.failure = Some(ReloadFailure {
                path: path.clone(),
                message,
            });
        });
    }

    /// Listing of `path`, from the cache when it holds that directory
    ///
    /// Never publishes; the navigator's own state is left alone.
    pub async fn listing_for(&self, path: &RemotePath) -> Result<Vec<FileStat>, AppError> {
        {
            let dir = self.directory.borrow();
            if dir.path == *path && !dir.listing.is_empty() {
                return Ok(dir.listing.clone());
            }
        }

        let envelope = self
            .dispatcher
            .call_tagged(endpoint::READ_DIR, &FileRequest::new(path.as_string()), &read_dir_tag(path))
            .await?;
        if !envelope.is_success() {
            return Err(AppError::Api(envelope.message));
        }
        Ok(envelope.decode::<ReadDirResponse>()?.files)
    }

    /// Spawn the task that reloads on path changes and refresh signals
    ///
    /// Preview-only changes never trigger a fetch.
    pub fn watch(self: &Arc<Self>) -> JoinHandle<()> {
        let navigator = Arc::clone(self);
        let mut nav_rx = self.store.subscribe();
        let mut signal_rx = self.reload_signal.subscribe();

        tokio::spawn(async move {
            let mut loaded: Option<RemotePath> = None;
            loop {
                let path = nav_rx.borrow_and_update().path.clone();
                if loaded.as_ref() != Some(&path) {
                    loaded = Some(path.clone());
                    navigator.spawn_reload(path);
                }

                tokio::select! {
                    changed = nav_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    changed = signal_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        signal_rx.borrow_and_update();
                        // A listing already in flight may predate the change
                        // being refreshed for, so it is not joined.
                        if let Some(path) = loaded.take() {
                            navigator.dispatcher.cancel(&read_dir_tag(&path));
                        }
                    }
                }
            }
            tracing::debug!("Navigator watch task finished");
        })
    }

    // Runs the reload on its own task so a slow listing never delays the
    // reaction to the next navigation.
    fn spawn_reload(self: &Arc<Self>, path: RemotePath) {
        let navigator = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = navigator.reload(&path).await {
                if !e.is_cancelled() {
                    tracing::warn!("Reload of '{}' failed: {}", path, e);
                }
            }
        });
    }

    pub fn breadcrumbs(&self) -> Vec<Breadcrumb> {
        self.current_path().breadcrumbs()
    }

    /// Navigate to the `index`-th breadcrumb (0 = root)
    pub fn open_breadcrumb(&self, index: usize) -> bool {
        let path = self.current_path();
        if index > path.depth() {
            return false;
        }
        self.navigate(path.prefix(index));
        true
    }

    pub fn click_sort(&self, column: SortColumn) -> Option<(SortColumn, SortOrder)> {
        self.sort.lock().click(column)
    }

    pub fn sort_state(&self) -> Option<(SortColumn, SortOrder)> {
        self.sort.lock().active()
    }

    /// The current listing in display order
    pub fn sorted_listing(&self) -> Vec<FileStat> {
        let sort = *self.sort.lock();
        sort.apply(&self.directory.borrow().listing)
    }

    /// Delete an entry of the current directory
    pub async fn delete(&self, name: &str) -> Result<bool, AppError> {
        self.mutate(endpoint::DELETE, name).await
    }

    /// Create a directory inside the current directory
    pub async fn create_dir(&self, name: &str) -> Result<bool, AppError> {
        self.mutate(endpoint::CREATE_DIR, name).await
    }

    async fn mutate(&self, endpoint: &str, name: &str) -> Result<bool, AppError> {
        let target = self.current_path().join(name);
        let envelope = self
            .dispatcher
            .call(endpoint, &FileRequest::new(target.as_string()))
            .await?;

        if envelope.is_success() {
            tracing::info!("{} '{}'", endpoint, target);
            self.refresh();
        } else {
            tracing::warn!("{} '{}' refused: {}", endpoint, target, envelope.message);
        }
        Ok(envelope.is_success())
    }

    pub fn download_link(&self, name: &str) -> Result<Url, AppError> {
        let target = self.current_path().join(name);
        Ok(self.dispatcher.download_link(&target.as_string())?)
    }

    pub fn compressed_download_link(&self, name: &str) -> Result<Url, AppError> {
        let target = self.current_path().join(name);
        Ok(self.dispatcher.compressed_download_link(&target.as_string())?)
    }
}
