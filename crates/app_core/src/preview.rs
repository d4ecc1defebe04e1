//! Preview controller
//!
//! Opens files for preview, classifies them and loads what each viewer
//! needs. Directories are handed to the navigator.

use crate::carousel::{ImageCarousel, PreviewCallback, ThumbnailStrip};
use crate::config::AppConfig;
use crate::navigation::{NavigationEntry, PreviewSelection};
use crate::navigator::Navigator;
use crate::path::RemotePath;
use crate::AppError;
use app_net::{Dispatcher, Url};
use app_proto::{endpoint, ArchiveNode, FileRequest, FileStat, ProtoError, SearchResult};
use mime_guess::mime;
use parking_lot::Mutex;
use std::sync::Arc;

/// Dispatcher tag shared by preview fetches; a new preview replaces the old
const PREVIEW_TAG: &str = "preview";

/// Coarse content type of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewKind {
    Image,
    Text,
    Video,
    Archive,
    Unsupported,
}

/// Decide how to preview `file`
///
/// Text is only offered below `text_size_limit` bytes.
pub fn classify(file: &FileStat, text_size_limit: u64) -> PreviewKind {
    if file.is_dir() {
        return PreviewKind::Unsupported;
    }
    if file.is_image() {
        return PreviewKind::Image;
    }
    if file.is_archive() {
        return PreviewKind::Archive;
    }

    let Some(guess) = mime_guess::from_path(&file.name).first() else {
        return PreviewKind::Unsupported;
    };
    let top = guess.type_();
    if top == mime::VIDEO {
        PreviewKind::Video
    } else if top == mime::TEXT && file.size < text_size_limit {
        PreviewKind::Text
    } else {
        PreviewKind::Unsupported
    }
}

/// Loaded preview, ready to render
#[derive(Debug)]
pub enum PreviewContent {
    Image(ImageCarousel),
    Text(String),
    Video { url: Url },
    Archive(ArchiveNode),
    Unsupported { download: Url },
}

impl PreviewContent {
    pub fn kind(&self) -> PreviewKind {
        match self {
            PreviewContent::Image(_) => PreviewKind::Image,
            PreviewContent::Text(_) => PreviewKind::Text,
            PreviewContent::Video { .. } => PreviewKind::Video,
            PreviewContent::Archive(_) => PreviewKind::Archive,
            PreviewContent::Unsupported { .. } => PreviewKind::Unsupported,
        }
    }
}

/// Indented, read-only rendering of an archive tree
pub fn render_archive_tree(root: &ArchiveNode) -> Vec<String> {
    root.walk()
        .into_iter()
        .map(|(depth, file)| {
            let suffix = if file.is_dir() { "/" } else { "" };
            format!("{}{}{}", "  ".repeat(depth), file.name, suffix)
        })
        .collect()
}

pub struct PreviewController {
    dispatcher: Arc<Dispatcher>,
    navigator: Arc<Navigator>,
    text_size_limit: u64,
    thumbnails: ThumbnailStrip,
    on_previewing: Mutex<Option<PreviewCallback>>,
}

impl PreviewController {
    pub fn new(dispatcher: Arc<Dispatcher>, navigator: Arc<Navigator>, config: &AppConfig) -> Self {
        Self {
            dispatcher,
            navigator,
            text_size_limit: config.preview.text_size_limit,
            thumbnails: ThumbnailStrip::new(&config.timing),
            on_previewing: Mutex::new(None),
        }
    }

    /// Register the "now previewing" callback handed to image carousels
    pub fn set_previewing_callback(&self, callback: PreviewCallback) {
        *self.on_previewing.lock() = Some(callback);
    }

    pub fn thumbnails(&self) -> &ThumbnailStrip {
        &self.thumbnails
    }

    pub fn current(&self) -> Option<PreviewSelection> {
        self.navigator.store().preview()
    }

    pub fn classify(&self, file: &FileStat) -> PreviewKind {
        classify(file, self.text_size_limit)
    }

    /// Open a directory entry: directories are entered, files previewed
    pub fn select(&self, file: &FileStat) {
        let current = self.navigator.current_path();
        if file.is_dir() {
            self.navigator.navigate(current.join(&file.name));
            return;
        }

        tracing::debug!("Preview '{}' in '{}'", file.name, current);
        self.navigator.store().push(NavigationEntry {
            path: current.clone(),
            preview: Some(PreviewSelection {
                file: file.clone(),
                directory: current,
            }),
        });
    }

    /// Open a search hit: directories are entered, files previewed in
    /// their parent directory
    pub fn open_search_result(&self, result: &SearchResult) {
        let path = RemotePath::new(&result.file_path);
        if result.is_dir {
            self.navigator.navigate(path);
            return;
        }

        let directory = path.parent().unwrap_or_default();
        // The hit carries no metadata beyond its name
        let file = FileStat::file(&result.file_name, 0);
        self.navigator.store().push(NavigationEntry {
            path: directory.clone(),
            preview: Some(PreviewSelection { file, directory }),
        });
    }

    /// Leave preview mode; the cached listing is shown again
    pub fn close(&self) -> bool {
        self.dispatcher.cancel(PREVIEW_TAG);
        self.thumbnails.reset();
        if self.current().is_none() {
            return false;
        }
        self.navigator.store().replace_preview(None);
        true
    }

    /// Load the content for `selection`
    pub async fn load(&self, selection: &PreviewSelection) -> Result<PreviewContent, AppError> {
        let file_path = selection.file_path().as_string();

        match self.classify(&selection.file) {
            PreviewKind::Image => {
                let listing = self.navigator.listing_for(&selection.directory).await?;
                let carousel = ImageCarousel::new(&listing, &selection.file.name)
                    .ok_or_else(|| AppError::NotFound(file_path.clone()))?;
                let callback = self.on_previewing.lock().clone();
                Ok(PreviewContent::Image(match callback {
                    Some(callback) => carousel.with_callback(callback),
                    None => carousel,
                }))
            }
            PreviewKind::Text => {
                let body = serde_json::to_value(FileRequest::new(file_path)).map_err(ProtoError::from)?;
                self.dispatcher.cancel(PREVIEW_TAG);
                let raw = self.dispatcher.raw_call(endpoint::READ, body, PREVIEW_TAG).await?;
                if let Some(envelope) = self.dispatcher.rejected_envelope(&raw) {
                    return Err(AppError::Api(envelope.message));
                }
                if !raw.is_success() {
                    return Err(AppError::Api(format!("HTTP {}", raw.status)));
                }
                Ok(PreviewContent::Text(raw.text()))
            }
            PreviewKind::Video => Ok(PreviewContent::Video {
                url: self.dispatcher.download_link(&file_path)?,
            }),
            PreviewKind::Archive => {
                self.dispatcher.cancel(PREVIEW_TAG);
                let envelope = self
                    .dispatcher
                    .call_tagged(endpoint::READ_ZIP_ENTRIES, &FileRequest::new(file_path), PREVIEW_TAG)
                    .await?;
                if !envelope.is_success() {
                    return Err(AppError::Api(envelope.message));
                }
                Ok(PreviewContent::Archive(envelope.decode()?))
            }
            PreviewKind::Unsupported => Ok(PreviewContent::Unsupported {
                download: self.dispatcher.download_link(&file_path)?,
            }),
        }
    }
}
