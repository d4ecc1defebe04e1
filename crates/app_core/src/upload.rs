//! Upload tracker: multipart uploads with progress and speed estimation

use crate::navigator::Navigator;
use crate::path::RemotePath;
use crate::AppError;
use app_net::{Dispatcher, MultipartForm, UploadProgress};
use app_proto::{endpoint, upload_field};
use bytes::Bytes;
use bytesize::ByteSize;
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::Instant;

pub type UploadId = u64;

/// Progress samples over a trailing time window
#[derive(Debug, Clone)]
pub struct SpeedWindow {
    span_ms: u64,
    samples: VecDeque<(u64, u64)>,
}

impl SpeedWindow {
    pub fn new(span: Duration) -> Self {
        Self {
            span_ms: span.as_millis() as u64,
            samples: VecDeque::new(),
        }
    }

    /// Record `uploaded` bytes at `time_ms`, dropping samples that fell out
    /// of the window
    pub fn push(&mut self, time_ms: u64, uploaded: u64) {
        self.samples.push_back((time_ms, uploaded));
        while let Some(&(oldest, _)) = self.samples.front() {
            if oldest + self.span_ms >= time_ms {
                break;
            }
            self.samples.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Bytes per second between the oldest and newest samples
    pub fn bytes_per_sec(&self) -> f64 {
        let (Some(&(t0, u0)), Some(&(t1, u1))) = (self.samples.front(), self.samples.back()) else {
            return 0.0;
        };
        if self.samples.len() < 2 || t1 == t0 {
            return 0.0;
        }
        u1.saturating_sub(u0) as f64 / ((t1 - t0) as f64 / 1000.0)
    }
}

/// Human-readable rate, e.g. `976.6 KiB/s`
pub fn format_speed(bytes_per_sec: f64) -> String {
    format!("{}/s", ByteSize::b(bytes_per_sec.max(0.0) as u64))
}

/// Snapshot of one upload for rendering
#[derive(Debug, Clone, PartialEq)]
pub struct UploadTask {
    pub id: UploadId,
    pub label: String,
    pub total: u64,
    pub uploaded: u64,
    pub bytes_per_sec: f64,
}

impl UploadTask {
    /// Completed fraction in `0.0..=1.0`
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.uploaded as f64 / self.total as f64).min(1.0)
    }

    pub fn speed(&self) -> String {
        format_speed(self.bytes_per_sec)
    }
}

struct TaskEntry {
    label: String,
    total: u64,
    uploaded: u64,
    window: SpeedWindow,
    abort: Option<AbortHandle>,
}

/// A started upload
pub struct UploadHandle {
    pub id: UploadId,
    /// Resolves with the server's success flag
    pub join: JoinHandle<Result<bool, AppError>>,
}

struct TrackerInner {
    dispatcher: Arc<Dispatcher>,
    tasks: Mutex<BTreeMap<UploadId, TaskEntry>>,
    next_id: AtomicU64,
    epoch: Instant,
    window: Duration,
    navigator: Mutex<Option<Weak<Navigator>>>,
}

/// Tracks concurrent uploads; cheap to clone
#[derive(Clone)]
pub struct UploadTracker {
    inner: Arc<TrackerInner>,
}

impl UploadTracker {
    pub fn new(dispatcher: Arc<Dispatcher>, window: Duration) -> Self {
        Self {
            inner: Arc::new(TrackerInner {
                dispatcher,
                tasks: Mutex::new(BTreeMap::new()),
                next_id: AtomicU64::new(1),
                epoch: Instant::now(),
                window,
                navigator: Mutex::new(None),
            }),
        }
    }

    /// Refresh this navigator's listing after each successful upload
    pub fn attach_navigator(&self, navigator: &Arc<Navigator>) {
        *self.inner.navigator.lock() = Some(Arc::downgrade(navigator));
    }

    /// Upload `data` as `name` into `directory`
    pub fn start(&self, directory: &RemotePath, name: &str, data: Bytes) -> UploadHandle {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let target = directory.join(name);
        let total = data.len() as u64;

        self.inner.tasks.lock().insert(
            id,
            TaskEntry {
                label: target.as_string(),
                total,
                uploaded: 0,
                window: SpeedWindow::new(self.inner.window),
                abort: None,
            },
        );

        let form = MultipartForm::new()
            .text(upload_field::FILENAME, &target.as_string())
            .file(upload_field::FILE, name, data);
        let tracker = self.clone();
        let progress_tracker = self.clone();
        let on_progress = Arc::new(move |p: UploadProgress| {
            progress_tracker.on_progress(id, p.loaded, p.total);
        });

        tracing::info!("Upload {} started: '{}' ({})", id, target, ByteSize::b(total));
        let join = tokio::spawn(async move {
            let result = tracker
                .inner
                .dispatcher
                .upload_multipart(endpoint::UPLOAD, form, on_progress)
                .await;
            tracker.inner.tasks.lock().remove(&id);

            let envelope = result.map_err(|e| {
                tracing::warn!("Upload {} failed: {}", id, e);
                AppError::from(e)
            })?;
            if envelope.is_success() {
                tracing::info!("Upload {} finished: '{}'", id, target);
                tracker.refresh_navigator();
            } else {
                tracing::warn!("Upload {} refused: {}", id, envelope.message);
            }
            Ok(envelope.is_success())
        });

        // The task may already be gone if it finished before we got here
        if let Some(entry) = self.inner.tasks.lock().get_mut(&id) {
            entry.abort = Some(join.abort_handle());
        }
        UploadHandle { id, join }
    }

    /// Record transport progress for `id`; ignored once the task is gone
    pub fn on_progress(&self, id: UploadId, loaded: u64, total: u64) {
        let now = self.inner.epoch.elapsed().as_millis() as u64;
        let mut tasks = self.inner.tasks.lock();
        if let Some(entry) = tasks.get_mut(&id) {
            entry.uploaded = loaded;
            entry.total = total;
            entry.window.push(now, loaded);
        }
    }

    /// Abort the transfer and forget the task
    pub fn cancel(&self, id: UploadId) -> bool {
        let entry = self.inner.tasks.lock().remove(&id);
        match entry {
            Some(entry) => {
                if let Some(abort) = entry.abort {
                    abort.abort();
                }
                tracing::info!("Upload {} cancelled", id);
                true
            }
            None => false,
        }
    }

    pub fn has(&self, id: UploadId) -> bool {
        self.inner.tasks.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.inner.tasks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.tasks.lock().is_empty()
    }

    /// Snapshot of every tracked upload, oldest first
    pub fn tasks(&self) -> Vec<UploadTask> {
        self.inner
            .tasks
            .lock()
            .iter()
            .map(|(&id, entry)| UploadTask {
                id,
                label: entry.label.clone(),
                total: entry.total,
                uploaded: entry.uploaded,
                bytes_per_sec: entry.window.bytes_per_sec(),
            })
            .collect()
    }

    fn refresh_navigator(&self) {
        let navigator = self.inner.navigator.lock().as_ref().and_then(Weak::upgrade);
        if let Some(navigator) = navigator {
            navigator.refresh();
        }
    }
}
