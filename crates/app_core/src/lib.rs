//! WebFiler Core Client Logic
//!
//! This crate contains:
//! - Configuration
//! - Error types
//! - Navigation store and history
//! - Directory navigator with sorting
//! - Preview controller and image carousel
//! - Upload tracking
//! - Debounced search
//! - Session calls

pub mod carousel;
pub mod config;
pub mod error;
pub mod navigation;
pub mod navigator;
pub mod path;
pub mod preview;
pub mod search;
pub mod session;
pub mod sort;
pub mod state;
pub mod timer;
pub mod upload;

#[cfg(test)]
mod testing;

pub use carousel::{CarouselKey, ImageCarousel, PreviewCallback, ThumbnailStrip};
pub use config::{AppConfig, DownloadConfig, PreviewConfig, ServerConfig, TimingConfig};
pub use error::AppError;
pub use navigation::{NavigationEntry, NavigationHistory, PreviewSelection};
pub use navigator::{DirectoryState, Navigator, ReloadFailure, ReloadOutcome};
pub use path::{Breadcrumb, RemotePath};
pub use preview::{classify, render_archive_tree, PreviewContent, PreviewController, PreviewKind};
pub use search::{highlight, SearchEngine, SearchState, Segment};
pub use session::Session;
pub use sort::{SortColumn, SortOrder, SortState};
pub use state::{NavigationSnapshot, NavigationStore, Route};
pub use timer::DelayedAction;
pub use upload::{format_speed, SpeedWindow, UploadHandle, UploadId, UploadTask, UploadTracker};

use app_net::{Dispatcher, HttpTransport, Transport};
use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Every client component, wired to one dispatcher and one navigation store
pub struct FileClient {
    config: Arc<RwLock<AppConfig>>,
    config_path: PathBuf,
    store: Arc<NavigationStore>,
    dispatcher: Arc<Dispatcher>,
    navigator: Arc<Navigator>,
    preview: PreviewController,
    uploads: UploadTracker,
    search: SearchEngine,
    session: Session,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl FileClient {
    /// Client talking to `config.server.base_url` over HTTP
    pub fn new(config: AppConfig) -> Result<Self, AppError> {
        let transport = HttpTransport::new(config.base_url()?)?;
        Self::with_transport(config, Arc::new(transport))
    }

    pub fn with_transport(config: AppConfig, transport: Arc<dyn Transport>) -> Result<Self, AppError> {
        let store = Arc::new(NavigationStore::default());
        let dispatcher = Arc::new(Dispatcher::new(
            transport,
            config.base_url()?,
            config.server.tag_policy,
            store.clone(),
        ));
        let navigator = Arc::new(Navigator::new(dispatcher.clone(), store.clone()));
        let preview = PreviewController::new(dispatcher.clone(), navigator.clone(), &config);
        let uploads = UploadTracker::new(dispatcher.clone(), config.timing.speed_window());
        uploads.attach_navigator(&navigator);
        let search = SearchEngine::new(dispatcher.clone(), config.timing.search_debounce());
        let session = Session::new(dispatcher.clone(), store.clone());

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_path: AppConfig::config_path(),
            store,
            dispatcher,
            navigator,
            preview,
            uploads,
            search,
            session,
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Save configuration changes to `path` instead of the default location
    pub fn with_config_path(mut self, path: PathBuf) -> Self {
        self.config_path = path;
        self
    }

    /// Start following navigation; the current directory loads right away
    pub fn start(&self) {
        let mut tasks = self.tasks.lock();
        if tasks.is_empty() {
            tasks.push(self.navigator.watch());
            tasks.push(self.track_recent_folders());
            tracing::info!("File client started at {}", self.dispatcher.base_url());
        }
    }

    /// Stop the background tasks and abort everything in flight
    pub fn shutdown(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        let cancelled = self.dispatcher.cancel_all();
        for task in self.uploads.tasks() {
            self.uploads.cancel(task.id);
        }
        tracing::info!("File client stopped ({} requests cancelled)", cancelled);
    }

    pub fn store(&self) -> &Arc<NavigationStore> {
        &self.store
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn navigator(&self) -> &Arc<Navigator> {
        &self.navigator
    }

    pub fn preview(&self) -> &PreviewController {
        &self.preview
    }

    pub fn uploads(&self) -> &UploadTracker {
        &self.uploads
    }

    pub fn search(&self) -> &SearchEngine {
        &self.search
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn config(&self) -> AppConfig {
        self.config.read().clone()
    }

    /// Apply `change` to the configuration and save it
    pub fn update_config<F>(&self, change: F) -> Result<(), AppError>
    where
        F: FnOnce(&mut AppConfig),
    {
        let snapshot = {
            let mut config = self.config.write();
            change(&mut config);
            config.clone()
        };
        snapshot.save_to(&self.config_path)
    }

    /// Put every directory that loads at the front of `recent_folders`
    fn track_recent_folders(&self) -> JoinHandle<()> {
        let config = Arc::clone(&self.config);
        let config_path = self.config_path.clone();
        let mut rx = self.navigator.subscribe();

        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let folder = {
                    let dir = rx.borrow_and_update();
                    if dir.loading || dir.path.is_root() {
                        continue;
                    }
                    dir.path.as_string()
                };

                let snapshot = {
                    let mut config = config.write();
                    config.remember_folder(&folder).then(|| config.clone())
                };
                if let Some(snapshot) = snapshot {
                    if let Err(e) = snapshot.save_to(&config_path) {
                        tracing::warn!("Failed to save recent folders: {}", e);
                    }
                }
            }
        })
    }

    /// Log in and reload the listing that the login screen replaced
    pub async fn login(&self, name: &str, password: &str) -> Result<bool, AppError> {
        let ok = self.session.login(name, password).await?;
        if ok {
            self.navigator.refresh();
        }
        Ok(ok)
    }
}

/// Global client (for the shell and other front ends)
static CLIENT: OnceCell<Arc<FileClient>> = OnceCell::new();

/// Initialize the global client
pub fn init(config: AppConfig) -> anyhow::Result<Arc<FileClient>> {
    let client = Arc::new(FileClient::new(config)?);
    CLIENT
        .set(client.clone())
        .map_err(|_| anyhow::anyhow!("FileClient already initialized"))?;
    Ok(client)
}

/// Get the global client
pub fn client() -> Option<Arc<FileClient>> {
    CLIENT.get().cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{file_server, names};
    use app_net::mock::{settle, MockTransport};

    fn client_with(mock: &Arc<MockTransport>, dir: &tempfile::TempDir) -> FileClient {
        FileClient::with_transport(AppConfig::default(), mock.clone())
            .unwrap()
            .with_config_path(dir.path().join("config.toml"))
    }

    #[tokio::test]
    async fn test_start_loads_root_and_shutdown_stops() {
        let mock = Arc::new(MockTransport::new(file_server));
        let dir = tempfile::tempdir().unwrap();
        let client = client_with(&mock, &dir);

        client.start();
        settle().await;
        assert_eq!(
            names(&client.navigator().directory().listing),
            vec!["docs", "a.txt", "cat.png", "dog.jpg"]
        );

        client.shutdown();
        client.navigator().navigate(RemotePath::new("docs"));
        settle().await;
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_update_config_saves() {
        let mock = Arc::new(MockTransport::new(file_server));
        let dir = tempfile::tempdir().unwrap();
        let client = client_with(&mock, &dir);

        client
            .update_config(|config| {
                config.enable_aria2();
                config.remember_folder("docs");
            })
            .unwrap();

        let saved = AppConfig::load_from(&dir.path().join("config.toml")).unwrap();
        assert!(saved.download.aria2_enabled);
        assert_eq!(saved.recent_folders, vec!["docs"]);
        assert_eq!(client.config(), saved);
    }

    #[tokio::test]
    async fn test_loaded_folders_are_remembered() {
        let mock = Arc::new(MockTransport::new(file_server));
        let dir = tempfile::tempdir().unwrap();
        let client = client_with(&mock, &dir);
        client.start();
        settle().await;
        assert!(client.config().recent_folders.is_empty());

        client.navigator().navigate(RemotePath::new("docs"));
        settle().await;
        client.navigator().navigate(RemotePath::new("docs/old"));
        settle().await;
        client.navigator().go_back();
        settle().await;

        assert_eq!(client.config().recent_folders, vec!["docs", "docs/old"]);
        let saved = AppConfig::load_from(&dir.path().join("config.toml")).unwrap();
        assert_eq!(saved.recent_folders, vec!["docs", "docs/old"]);
        client.shutdown();
    }

    #[tokio::test]
    async fn test_login_after_redirect_reloads() {
        let mock = Arc::new(MockTransport::new(file_server));
        let dir = tempfile::tempdir().unwrap();
        let client = client_with(&mock, &dir);
        client.start();
        settle().await;

        client.store().set_route(Route::Login);
        assert!(client.login("admin", "pw").await.unwrap());
        settle().await;

        assert_eq!(client.session().route(), Route::Files);
        let reads = mock
            .calls()
            .iter()
            .filter(|(e, _)| e == app_proto::endpoint::READ_DIR)
            .count();
        assert_eq!(reads, 2);
        client.shutdown();
    }

    #[test]
    fn test_bad_base_url_is_a_config_error() {
        let mut config = AppConfig::default();
        config.server.base_url = "::nope::".into();
        let mock = Arc::new(MockTransport::new(file_server));
        let err = FileClient::with_transport(config, mock).err().unwrap();
        assert!(err.is_fatal());
    }
}
