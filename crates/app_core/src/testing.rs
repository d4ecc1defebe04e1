//! Shared fixtures for the crate's tests

use crate::state::NavigationStore;
use app_net::mock::MockTransport;
use app_net::{Dispatcher, RawResponse, TagPolicy, Url};
use app_proto::endpoint;
use serde_json::{json, Value};
use std::sync::Arc;

pub(crate) fn stat(name: &str, is_dir: bool, size: u64) -> Value {
    json!({"name": name, "is_dir": is_dir, "is_file": !is_dir, "size": size})
}

pub(crate) fn ok(data: Value) -> RawResponse {
    RawResponse::from_json(&json!({"status": 0, "data": data, "message": ""}))
}

pub(crate) fn fail(message: &str) -> RawResponse {
    RawResponse::from_json(&json!({"status": 1, "data": {}, "message": message}))
}

/// A small fake file server
///
/// The root holds a directory, a text file and two images; every other
/// directory holds a single file named after it.
pub(crate) fn file_server(path: &str, body: &Value) -> RawResponse {
    match path {
        endpoint::READ_DIR => {
            let dir = body["file"].as_str().unwrap_or_default();
            let files = if dir.is_empty() {
                vec![
                    stat("docs", true, 0),
                    stat("a.txt", false, 12),
                    stat("cat.png", false, 2048),
                    stat("dog.jpg", false, 4096),
                ]
            } else {
                vec![stat(&format!("{}.txt", dir.replace('/', "_")), false, 1)]
            };
            ok(json!({ "files": files }))
        }
        endpoint::READ => RawResponse::new(200, Some("text/plain".into()), "hello preview"),
        _ => ok(json!({})),
    }
}

pub(crate) fn dispatcher(mock: &Arc<MockTransport>, store: &Arc<NavigationStore>) -> Arc<Dispatcher> {
    Arc::new(Dispatcher::new(
        mock.clone(),
        Url::parse("http://localhost:7001/").unwrap(),
        TagPolicy::Coalesce,
        store.clone(),
    ))
}

pub(crate) fn names(listing: &[app_proto::FileStat]) -> Vec<&str> {
    listing.iter().map(|f| f.name.as_str()).collect()
}
