//! Debounced file-name search

use crate::timer::DelayedAction;
use app_net::Dispatcher;
use app_proto::{endpoint, SearchRequest, SearchResult};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

const SEARCH_TAG: &str = "search";

/// One piece of a highlighted name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    Literal(&'a str),
    Highlight(&'a str),
}

/// Split `name` around exact, case-sensitive occurrences of `keyword`
///
/// Matches are taken left to right without overlap. Literal segments may be
/// empty (a name that starts with the keyword begins with an empty literal).
pub fn highlight<'a>(name: &'a str, keyword: &'a str) -> Vec<Segment<'a>> {
    if keyword.is_empty() {
        return vec![Segment::Literal(name)];
    }

    let mut segments = Vec::new();
    for (i, literal) in name.split(keyword).enumerate() {
        if i > 0 {
            segments.push(Segment::Highlight(keyword));
        }
        segments.push(Segment::Literal(literal));
    }
    segments
}

/// Observable search state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchState {
    pub keyword: String,
    pub results: Vec<SearchResult>,
    /// Waiting out the debounce window
    pub pending: bool,
    /// Waiting on the server
    pub loading: bool,
    pub error: Option<String>,
}

impl SearchState {
    pub fn is_busy(&self) -> bool {
        self.pending || self.loading
    }
}

struct SearchInner {
    dispatcher: Arc<Dispatcher>,
    debounce: DelayedAction,
    delay: Duration,
    generation: AtomicU64,
    state: watch::Sender<SearchState>,
}

/// Search box logic; cheap to clone
#[derive(Clone)]
pub struct SearchEngine {
    inner: Arc<SearchInner>,
}

impl SearchEngine {
    pub fn new(dispatcher: Arc<Dispatcher>, delay: Duration) -> Self {
        let (state, _) = watch::channel(SearchState::default());
        Self {
            inner: Arc::new(SearchInner {
                dispatcher,
                debounce: DelayedAction::new(),
                delay,
                generation: AtomicU64::new(0),
                state,
            }),
        }
    }

    pub fn state(&self) -> SearchState {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SearchState> {
        self.inner.state.subscribe()
    }

    /// Feed the latest keyword; the query goes out once input pauses
    pub fn set_keyword(&self, keyword: &str) {
        let ticket = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let keyword = keyword.to_string();

        if keyword.is_empty() {
            self.inner.debounce.disarm();
            self.inner.dispatcher.cancel(SEARCH_TAG);
            self.inner.state.send_replace(SearchState::default());
            return;
        }

        self.inner.state.send_modify(|state| {
            state.keyword = keyword.clone();
            state.pending = true;
        });

        let inner = Arc::clone(&self.inner);
        self.inner
            .debounce
            .arm(self.inner.delay, async move { inner.run(ticket, keyword).await });
    }

    /// Wait until no query is pending or in flight
    pub async fn settled(&self) -> SearchState {
        let mut rx = self.subscribe();
        let state = match rx.wait_for(|state| !state.is_busy()).await {
            Ok(state) => state.clone(),
            Err(_) => self.state(),
        };
        state
    }
}

impl SearchInner {
    fn is_current(&self, ticket: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == ticket
    }

    async fn run(&self, ticket: u64, keyword: String) {
        if !self.is_current(ticket) {
            return;
        }
        self.state.send_modify(|state| {
            state.pending = false;
            state.loading = true;
        });

        self.dispatcher.cancel(SEARCH_TAG);
        let request = SearchRequest {
            keyword: keyword.clone(),
        };
        let result = self
            .dispatcher
            .call_tagged(endpoint::SEARCH, &request, SEARCH_TAG)
            .await;

        if !self.is_current(ticket) {
            tracing::debug!("Dropping superseded results for '{}'", keyword);
            return;
        }

        let outcome = match result {
            Ok(envelope) if envelope.is_success() => envelope
                .decode::<Vec<SearchResult>>()
                .map_err(|e| e.to_string()),
            Ok(envelope) => Err(envelope.message),
            Err(e) => Err(e.to_string()),
        };

        self.state.send_modify(|state| {
            state.loading = false;
            match outcome {
                Ok(results) => {
                    tracing::debug!("{} results for '{}'", results.len(), keyword);
                    state.results = results;
                    state.error = None;
                }
                Err(message) => {
                    tracing::warn!("Search for '{}' failed: {}", keyword, message);
                    state.results.clear();
                    state.error = Some(message);
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::NavigationStore;
    use crate::testing::{dispatcher, ok};
    use app_net::mock::{settle, MockTransport};
    use app_net::RawResponse;
    use serde_json::{json, Value};

    fn search_server(_: &str, body: &Value) -> RawResponse {
        let keyword = body["keyword"].as_str().unwrap_or_default();
        ok(json!([
            {"file_name": format!("{}.txt", keyword), "file_path": format!("docs/{}.txt", keyword), "is_dir": false}
        ]))
    }

    fn setup(mock: MockTransport) -> (SearchEngine, Arc<MockTransport>) {
        let mock = Arc::new(mock);
        let store = Arc::new(NavigationStore::default());
        let engine = SearchEngine::new(dispatcher(&mock, &store), Duration::from_millis(300));
        (engine, mock)
    }

    async fn advance(ms: u64) {
        tokio::time::advance(Duration::from_millis(ms)).await;
        settle().await;
    }

    #[test]
    fn test_highlight_repeated_keyword() {
        let segments = highlight("report_final_report.txt", "report");
        assert_eq!(
            segments,
            vec![
                Segment::Literal(""),
                Segment::Highlight("report"),
                Segment::Literal("_final_"),
                Segment::Highlight("report"),
                Segment::Literal(".txt"),
            ]
        );
    }

    #[test]
    fn test_highlight_edge_cases() {
        assert_eq!(highlight("abc", ""), vec![Segment::Literal("abc")]);
        assert_eq!(highlight("abc", "x"), vec![Segment::Literal("abc")]);
        // Case-sensitive
        assert_eq!(highlight("Report", "report"), vec![Segment::Literal("Report")]);
        // Left to right, no overlap
        assert_eq!(
            highlight("aaa", "aa"),
            vec![Segment::Literal(""), Segment::Highlight("aa"), Segment::Literal("a")]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_sends_last_keyword_only() {
        let (engine, mock) = setup(MockTransport::new(search_server));

        engine.set_keyword("r");
        advance(100).await;
        engine.set_keyword("re");
        advance(100).await;
        engine.set_keyword("report");
        assert!(engine.state().pending);

        advance(299).await;
        assert_eq!(mock.call_count(), 0);

        advance(1).await;
        assert_eq!(mock.calls(), vec![(endpoint::SEARCH.to_string(), json!({"keyword": "report"}))]);

        let state = engine.state();
        assert!(!state.is_busy());
        assert_eq!(state.results[0].file_name, "report.txt");
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_then_loading() {
        let (engine, mock) = setup(MockTransport::gated(search_server));

        engine.set_keyword("a");
        let state = engine.state();
        assert!(state.pending && !state.loading);

        advance(300).await;
        let state = engine.state();
        assert!(!state.pending && state.loading);

        mock.release_all();
        settle().await;
        assert!(!engine.state().is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_query_never_lands() {
        let (engine, mock) = setup(MockTransport::gated(search_server));

        engine.set_keyword("old");
        advance(300).await;
        assert_eq!(mock.pending_count(), 1);

        engine.set_keyword("new");
        advance(300).await;
        assert_eq!(mock.call_count(), 2);

        mock.release_all();
        settle().await;

        let state = engine.state();
        assert_eq!(state.keyword, "new");
        assert_eq!(state.results.len(), 1);
        assert_eq!(state.results[0].file_name, "new.txt");
    }

    #[tokio::test(start_paused = true)]
    async fn test_clearing_cancels_everything() {
        let (engine, mock) = setup(MockTransport::gated(search_server));

        engine.set_keyword("abc");
        advance(300).await;
        assert!(engine.state().loading);

        engine.set_keyword("");
        assert_eq!(engine.state(), SearchState::default());

        mock.release_all();
        settle().await;
        assert!(engine.state().results.is_empty());

        // A pending debounce is dropped too
        engine.set_keyword("xyz");
        engine.set_keyword("");
        advance(1000).await;
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_failure_is_reported() {
        let (engine, _mock) = setup(MockTransport::new(|_, _| crate::testing::fail("index not ready")));

        engine.set_keyword("x");
        let state = engine.settled().await;
        assert_eq!(state.error.as_deref(), Some("index not ready"));
        assert!(state.results.is_empty());
    }
}
