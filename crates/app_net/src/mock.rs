//! In-memory transport for tests
//!
//! Responses come from a handler closure. A gated mock parks every request
//! until the test releases it, which makes in-flight states observable.

use crate::transport::{MultipartForm, ProgressFn, RawResponse, Transport, UploadProgress};
use crate::{NetError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::oneshot;

type Handler = Box<dyn Fn(&str, &Value) -> RawResponse + Send + Sync>;

struct Pending {
    endpoint: String,
    body: Value,
    release: oneshot::Sender<()>,
}

struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct MockTransport {
    handler: Handler,
    gated: bool,
    calls: Mutex<Vec<(String, Value)>>,
    pending: Mutex<Vec<Pending>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl MockTransport {
    /// Answer every request immediately
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&str, &Value) -> RawResponse + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            gated: false,
            calls: Mutex::new(Vec::new()),
            pending: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    /// Hold every request until released
    pub fn gated<F>(handler: F) -> Self
    where
        F: Fn(&str, &Value) -> RawResponse + Send + Sync + 'static,
    {
        Self {
            gated: true,
            ..Self::new(handler)
        }
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Highest number of requests that were ever in flight together
    pub fn max_concurrent(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn release_all(&self) -> usize {
        self.release_where(|_, _| true)
    }

    /// Release parked requests matching `pred`
    pub fn release_where<P>(&self, pred: P) -> usize
    where
        P: Fn(&str, &Value) -> bool,
    {
        let released: Vec<Pending> = {
            let mut pending = self.pending.lock();
            let (matched, rest): (Vec<_>, Vec<_>) = pending
                .drain(..)
                .partition(|p| pred(&p.endpoint, &p.body));
            *pending = rest;
            matched
        };

        let count = released.len();
        for p in released {
            let _ = p.release.send(());
        }
        count
    }

    fn enter(&self, endpoint: &str, body: &Value) -> ActiveGuard<'_> {
        self.calls.lock().push((endpoint.to_string(), body.clone()));
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        ActiveGuard(&self.active)
    }

    async fn wait(&self, endpoint: &str, body: &Value) -> Result<()> {
        if !self.gated {
            return Ok(());
        }
        let (tx, rx) = oneshot::channel();
        self.pending.lock().push(Pending {
            endpoint: endpoint.to_string(),
            body: body.clone(),
            release: tx,
        });
        rx.await
            .map_err(|_| NetError::Transport("mock transport dropped the request".into()))
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn post_json(&self, endpoint: &str, body: &Value) -> Result<RawResponse> {
        let _active = self.enter(endpoint, body);
        self.wait(endpoint, body).await?;
        Ok((self.handler)(endpoint, body))
    }

    async fn post_multipart(
        &self,
        endpoint: &str,
        form: MultipartForm,
        progress: ProgressFn,
    ) -> Result<RawResponse> {
        let mut fields = serde_json::Map::new();
        for (name, value) in &form.fields {
            fields.insert(name.clone(), Value::String(value.clone()));
        }
        let body = Value::Object(fields);
        let total = form.data.len() as u64;

        let _active = self.enter(endpoint, &body);
        progress(UploadProgress {
            loaded: total / 2,
            total,
        });
        self.wait(endpoint, &body).await?;
        progress(UploadProgress {
            loaded: total,
            total,
        });
        Ok((self.handler)(endpoint, &body))
    }
}

/// Let spawned tasks run until they park
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}
