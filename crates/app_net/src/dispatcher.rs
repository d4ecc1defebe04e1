//! Request dispatcher with per-tag in-flight bookkeeping
//!
//! Every request carries a tag. While a request under a tag is in flight,
//! the dispatcher either lets new callers share it ([`TagPolicy::Coalesce`])
//! or aborts it in favour of the newcomer ([`TagPolicy::Preempt`]). Either way
//! there is at most one network operation per tag at any time.
//!
//! Every parsed envelope goes through the auth check: `status != 0` with the
//! message `"auth error"` triggers the [`AuthRedirect`] hook, once per
//! network response, whoever issued the request.

use crate::transport::{MultipartForm, ProgressFn, RawResponse, Transport};
use crate::{NetError, Result};
use app_proto::{endpoint, Envelope};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::AbortHandle;

/// What happens when a request arrives under a tag that is already in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TagPolicy {
    /// Attach to the in-flight request and share its response
    #[default]
    #[serde(rename = "coalesce")]
    Coalesce,
    /// Abort the in-flight request; its callers get `NetError::Cancelled`
    #[serde(rename = "preempt")]
    Preempt,
}

/// Hook invoked when the server reports an expired session
pub trait AuthRedirect: Send + Sync {
    fn redirect_to_login(&self);
}

type SharedResponse = Shared<BoxFuture<'static, Result<RawResponse>>>;
type SlotMap = HashMap<String, RequestSlot>;

struct RequestSlot {
    id: u64,
    abort: AbortHandle,
    response: SharedResponse,
}

/// Frees a slot when its request task ends, however it ends
struct SlotGuard {
    slots: Arc<Mutex<SlotMap>>,
    tag: String,
    id: u64,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        let mut slots = self.slots.lock();
        if slots.get(&self.tag).is_some_and(|slot| slot.id == self.id) {
            slots.remove(&self.tag);
        }
    }
}

/// Outbound request dispatcher
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    base_url: Url,
    policy: TagPolicy,
    slots: Arc<Mutex<SlotMap>>,
    next_slot_id: AtomicU64,
    auth: Arc<dyn AuthRedirect>,
}

impl Dispatcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        base_url: Url,
        policy: TagPolicy,
        auth: Arc<dyn AuthRedirect>,
    ) -> Self {
        tracing::debug!("Dispatcher created for {} ({:?})", base_url, policy);
        Self {
            transport,
            base_url,
            policy,
            slots: Arc::new(Mutex::new(HashMap::new())),
            next_slot_id: AtomicU64::new(1),
            auth,
        }
    }

    pub fn policy(&self) -> TagPolicy {
        self.policy
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Send a JSON request of its own and parse the envelope
    ///
    /// Untagged calls never share or displace another request, so writes
    /// such as delete or login always reach the server. They still hold a
    /// private slot while in flight and are covered by [`Self::cancel_all`].
    pub async fn call<B>(&self, endpoint: &str, body: &B) -> Result<Envelope>
    where
        B: Serialize + ?Sized,
    {
        let id = self.next_slot_id.fetch_add(1, Ordering::Relaxed);
        let tag = format!("{}#{}", endpoint, id);
        self.call_tagged(endpoint, body, &tag).await
    }

    /// Send a JSON request under `tag` and parse the envelope
    ///
    /// Application failures (`status != 0`) are returned as values; only
    /// transport and decode problems are errors.
    pub async fn call_tagged<B>(&self, endpoint: &str, body: &B, tag: &str) -> Result<Envelope>
    where
        B: Serialize + ?Sized,
    {
        let body = serde_json::to_value(body).map_err(|e| NetError::Encode(e.to_string()))?;
        let raw = self.raw_call(endpoint, body, tag).await?;
        let envelope = raw.envelope()?;
        self.intercept_auth(&raw, &envelope);
        Ok(envelope)
    }

    /// Send a JSON request under `tag` and return the transport response as is
    pub async fn raw_call(
        &self,
        endpoint: &str,
        body: serde_json::Value,
        tag: &str,
    ) -> Result<RawResponse> {
        let (response, preempted) = self.acquire(endpoint, body, tag);

        // Aborted outside the slot lock
        if let Some(slot) = preempted {
            slot.abort.abort();
        }

        response.await
    }

    /// Issue a multipart upload, reporting progress through `on_progress`
    ///
    /// Uploads are not tagged; cancelling one means dropping (or aborting
    /// the task running) this future.
    pub async fn upload_multipart(
        &self,
        endpoint: &str,
        form: MultipartForm,
        on_progress: ProgressFn,
    ) -> Result<Envelope> {
        let raw = self
            .transport
            .post_multipart(endpoint, form, on_progress)
            .await?;
        let envelope = raw.envelope()?;
        self.intercept_auth(&raw, &envelope);
        Ok(envelope)
    }

    /// Abort the request in flight under `tag`, if any
    pub fn cancel(&self, tag: &str) -> bool {
        let slot = self.slots.lock().remove(tag);
        match slot {
            Some(slot) => {
                tracing::debug!("Cancelled request under tag '{}'", tag);
                slot.abort.abort();
                true
            }
            None => false,
        }
    }

    /// Abort every request in flight (component teardown)
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<RequestSlot> = self.slots.lock().drain().map(|(_, s)| s).collect();
        for slot in &drained {
            slot.abort.abort();
        }
        if !drained.is_empty() {
            tracing::debug!("Cancelled {} in-flight requests", drained.len());
        }
        drained.len()
    }

    pub fn in_flight(&self, tag: &str) -> bool {
        self.slots.lock().contains_key(tag)
    }

    pub fn in_flight_count(&self) -> usize {
        self.slots.lock().len()
    }

    /// `GET /file/read?file=<path>`
    pub fn download_link(&self, path: &str) -> Result<Url> {
        self.link(endpoint::READ, path)
    }

    /// `GET /file/read_compression?file=<path>`
    pub fn compressed_download_link(&self, path: &str) -> Result<Url> {
        self.link(endpoint::READ_COMPRESSION, path)
    }

    fn link(&self, endpoint: &str, path: &str) -> Result<Url> {
        let mut url = self
            .base_url
            .join(endpoint)
            .map_err(|e| NetError::InvalidUrl(e.to_string()))?;
        url.query_pairs_mut().append_pair("file", path);
        Ok(url)
    }

    /// Inspect a raw response that may carry a failure envelope instead of
    /// the expected payload. The auth rule applies to what is found.
    pub fn rejected_envelope(&self, raw: &RawResponse) -> Option<Envelope> {
        let is_json = raw
            .content_type
            .as_deref()
            .is_some_and(|ct| ct.starts_with("application/json"));
        if !is_json {
            return None;
        }
        let envelope = raw.envelope().ok().filter(|e| !e.is_success())?;
        self.intercept_auth(raw, &envelope);
        Some(envelope)
    }

    fn intercept_auth(&self, raw: &RawResponse, envelope: &Envelope) {
        if envelope.is_auth_error() && raw.claim_auth_redirect() {
            tracing::warn!("Session rejected by server, redirecting to login");
            self.auth.redirect_to_login();
        }
    }

    /// Find or create the slot for `tag`. Returns the response to wait on and,
    /// under the preempt policy, the slot that was displaced.
    fn acquire(
        &self,
        endpoint: &str,
        body: serde_json::Value,
        tag: &str,
    ) -> (SharedResponse, Option<RequestSlot>) {
        let mut slots = self.slots.lock();

        let preempted = match self.policy {
            TagPolicy::Coalesce => {
                if let Some(slot) = slots.get(tag) {
                    tracing::debug!("Joining in-flight request under tag '{}'", tag);
                    return (slot.response.clone(), None);
                }
                None
            }
            TagPolicy::Preempt => {
                let prev = slots.remove(tag);
                if prev.is_some() {
                    tracing::debug!("Preempting in-flight request under tag '{}'", tag);
                }
                prev
            }
        };

        let id = self.next_slot_id.fetch_add(1, Ordering::Relaxed);
        let guard = SlotGuard {
            slots: Arc::clone(&self.slots),
            tag: tag.to_string(),
            id,
        };
        let transport = Arc::clone(&self.transport);
        let endpoint = endpoint.to_string();
        let displaced = preempted.as_ref().map(|slot| slot.response.clone());

        // The lock is still held here, so the task cannot release the slot
        // before it is inserted.
        let task = tokio::spawn(async move {
            let _guard = guard;
            // A preempted request must be gone before the next one goes out
            if let Some(displaced) = displaced {
                let _ = displaced.await;
            }
            transport.post_json(&endpoint, &body).await
        });
        let abort = task.abort_handle();

        let response = async move {
            match task.await {
                Ok(result) => result,
                Err(e) if e.is_cancelled() => Err(NetError::Cancelled),
                Err(e) => Err(NetError::Transport(format!("request task failed: {}", e))),
            }
        }
        .boxed()
        .shared();

        slots.insert(
            tag.to_string(),
            RequestSlot {
                id,
                abort,
                response: response.clone(),
            },
        );

        (response, preempted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{settle, MockTransport};
    use crate::UploadProgress;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct CountingRedirect(AtomicUsize);

    impl AuthRedirect for CountingRedirect {
        fn redirect_to_login(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl CountingRedirect {
        fn count(&self) -> usize {
            self.0.load(Ordering::SeqCst)
        }
    }

    fn echo(_: &str, body: &serde_json::Value) -> RawResponse {
        RawResponse::from_json(&json!({"status": 0, "data": body, "message": ""}))
    }

    fn setup(
        mock: MockTransport,
        policy: TagPolicy,
    ) -> (Arc<Dispatcher>, Arc<MockTransport>, Arc<CountingRedirect>) {
        let mock = Arc::new(mock);
        let redirect = Arc::new(CountingRedirect::default());
        let dispatcher = Dispatcher::new(
            mock.clone(),
            Url::parse("http://localhost:7001/").unwrap(),
            policy,
            redirect.clone(),
        );
        (Arc::new(dispatcher), mock, redirect)
    }

    fn spawn_raw(
        d: &Arc<Dispatcher>,
        body: serde_json::Value,
        tag: &'static str,
    ) -> tokio::task::JoinHandle<Result<RawResponse>> {
        let d = Arc::clone(d);
        tokio::spawn(async move { d.raw_call("/x", body, tag).await })
    }

    #[tokio::test]
    async fn test_coalesce_shares_one_request() {
        let (d, mock, _) = setup(MockTransport::gated(echo), TagPolicy::Coalesce);

        let a = spawn_raw(&d, json!({"n": 1}), "t");
        settle().await;
        let b = spawn_raw(&d, json!({"n": 2}), "t");
        settle().await;

        assert_eq!(mock.call_count(), 1);
        assert!(d.in_flight("t"));

        mock.release_all();
        let ra = a.await.unwrap().unwrap();
        let rb = b.await.unwrap().unwrap();

        // Both callers see the first request's result, each with its own copy
        assert_eq!(ra.envelope().unwrap().data, json!({"n": 1}));
        assert_eq!(rb.envelope().unwrap().data, json!({"n": 1}));
        assert!(!d.in_flight("t"));
        assert_eq!(mock.max_concurrent(), 1);
    }

    #[tokio::test]
    async fn test_slot_freed_after_settle() {
        let (d, mock, _) = setup(MockTransport::new(echo), TagPolicy::Coalesce);

        d.raw_call("/x", json!({"n": 1}), "t").await.unwrap();
        assert!(!d.in_flight("t"));

        let second = d.raw_call("/x", json!({"n": 2}), "t").await.unwrap();
        assert_eq!(second.envelope().unwrap().data, json!({"n": 2}));
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_distinct_tags_are_independent() {
        let (d, mock, _) = setup(MockTransport::gated(echo), TagPolicy::Coalesce);

        let a = spawn_raw(&d, json!({"n": 1}), "a");
        let b = spawn_raw(&d, json!({"n": 2}), "b");
        settle().await;
        assert_eq!(mock.call_count(), 2);
        assert_eq!(d.in_flight_count(), 2);

        mock.release_all();
        assert_eq!(a.await.unwrap().unwrap().envelope().unwrap().data, json!({"n": 1}));
        assert_eq!(b.await.unwrap().unwrap().envelope().unwrap().data, json!({"n": 2}));
    }

    #[tokio::test]
    async fn test_preempt_cancels_previous() {
        let (d, mock, _) = setup(MockTransport::gated(echo), TagPolicy::Preempt);

        let a = spawn_raw(&d, json!({"n": 1}), "t");
        settle().await;
        let b = spawn_raw(&d, json!({"n": 2}), "t");
        settle().await;

        assert_eq!(mock.max_concurrent(), 1);
        mock.release_all();

        assert_eq!(a.await.unwrap().unwrap_err(), NetError::Cancelled);
        let rb = b.await.unwrap().unwrap();
        assert_eq!(rb.envelope().unwrap().data, json!({"n": 2}));
        assert!(!d.in_flight("t"));
    }

    #[tokio::test]
    async fn test_cancel_tag() {
        let (d, _mock, _) = setup(MockTransport::gated(echo), TagPolicy::Coalesce);

        let a = spawn_raw(&d, json!({"n": 1}), "search");
        settle().await;

        assert!(d.cancel("search"));
        assert!(!d.cancel("search"));
        assert_eq!(a.await.unwrap().unwrap_err(), NetError::Cancelled);
        assert_eq!(d.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_auth_error_redirects_once_per_response() {
        let reply = |_: &str, _: &serde_json::Value| {
            RawResponse::from_json(&json!({"status": 1, "data": {"any": true}, "message": "auth error"}))
        };
        let (d, mock, redirect) = setup(MockTransport::gated(reply), TagPolicy::Coalesce);

        let first = {
            let d = d.clone();
            tokio::spawn(async move { d.call_tagged("/file/read_dir", &json!({}), "t").await })
        };
        let second = {
            let d = d.clone();
            tokio::spawn(async move { d.call_tagged("/file/read_dir", &json!({}), "t").await })
        };
        settle().await;
        mock.release_all();

        assert!(first.await.unwrap().unwrap().is_auth_error());
        assert!(second.await.unwrap().unwrap().is_auth_error());
        assert_eq!(mock.call_count(), 1);
        assert_eq!(redirect.count(), 1);

        // A fresh response triggers again
        let third = {
            let d = d.clone();
            tokio::spawn(async move { d.call("/auth/logout", &json!({})).await })
        };
        settle().await;
        mock.release_all();
        third.await.unwrap().unwrap();
        assert_eq!(redirect.count(), 2);
    }

    #[tokio::test]
    async fn test_application_failure_is_a_value() {
        let reply = |_: &str, _: &serde_json::Value| {
            RawResponse::from_json(&json!({"status": 1, "data": {}, "message": "not found"}))
        };
        let (d, _mock, redirect) = setup(MockTransport::new(reply), TagPolicy::Coalesce);

        let env = d.call("/file/delete", &json!({"file": "x"})).await.unwrap();
        assert!(!env.is_success());
        assert_eq!(env.message, "not found");
        assert_eq!(redirect.count(), 0);
    }

    #[tokio::test]
    async fn test_untagged_calls_are_never_shared() {
        let (d, mock, _) = setup(MockTransport::gated(echo), TagPolicy::Coalesce);

        let first = {
            let d = d.clone();
            tokio::spawn(async move { d.call("/file/delete", &json!({"file": "a"})).await })
        };
        let second = {
            let d = d.clone();
            tokio::spawn(async move { d.call("/file/delete", &json!({"file": "b"})).await })
        };
        settle().await;
        assert_eq!(mock.call_count(), 2);
        assert_eq!(d.in_flight_count(), 2);

        mock.release_all();
        assert_eq!(first.await.unwrap().unwrap().data, json!({"file": "a"}));
        assert_eq!(second.await.unwrap().unwrap().data, json!({"file": "b"}));
        assert_eq!(d.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_all_covers_untagged_calls() {
        let (d, _mock, _) = setup(MockTransport::gated(echo), TagPolicy::Coalesce);

        let pending = {
            let d = d.clone();
            tokio::spawn(async move { d.call("/auth/logout", &json!({})).await })
        };
        settle().await;
        assert_eq!(d.cancel_all(), 1);
        assert!(matches!(pending.await.unwrap(), Err(NetError::Cancelled)));
    }

    #[tokio::test]
    async fn test_upload_reports_progress() {
        let (d, mock, redirect) = setup(MockTransport::new(echo), TagPolicy::Coalesce);
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let sink = seen.clone();
        let form = MultipartForm::new()
            .text("filename", "docs/a.bin")
            .file("file", "a.bin", vec![0u8; 100]);
        let env = d
            .upload_multipart(
                endpoint::UPLOAD,
                form,
                Arc::new(move |p: UploadProgress| sink.lock().push(p)),
            )
            .await
            .unwrap();

        assert!(env.is_success());
        assert_eq!(mock.call_count(), 1);
        assert_eq!(redirect.count(), 0);
        let seen = seen.lock();
        assert_eq!(seen.last(), Some(&UploadProgress { loaded: 100, total: 100 }));
    }

    #[tokio::test]
    async fn test_rejected_envelope_on_raw_call() {
        let reply = |_: &str, body: &serde_json::Value| {
            if body["file"] == "notes.txt" {
                RawResponse::new(200, Some("text/plain".into()), "plain body")
            } else {
                RawResponse::from_json(&json!({"status": 1, "data": {}, "message": "auth error"}))
            }
        };
        let (d, _mock, redirect) = setup(MockTransport::new(reply), TagPolicy::Coalesce);

        let text = d.raw_call("/file/read", json!({"file": "notes.txt"}), "p").await.unwrap();
        assert!(d.rejected_envelope(&text).is_none());

        let denied = d.raw_call("/file/read", json!({"file": "x"}), "p").await.unwrap();
        assert!(d.rejected_envelope(&denied).unwrap().is_auth_error());
        assert!(d.rejected_envelope(&denied).is_some());
        assert_eq!(redirect.count(), 1);
    }

    #[test]
    fn test_download_links() {
        let (d, _, _) = setup(MockTransport::new(echo), TagPolicy::Coalesce);

        assert_eq!(
            d.download_link("docs/a b.txt").unwrap().as_str(),
            "http://localhost:7001/file/read?file=docs%2Fa+b.txt"
        );
        assert_eq!(
            d.compressed_download_link("pics").unwrap().as_str(),
            "http://localhost:7001/file/read_compression?file=pics"
        );
    }
}
