//! Transport abstraction and the reqwest-backed implementation

use crate::{NetError, Result};
use app_proto::Envelope;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use reqwest::header::CONTENT_TYPE;
use reqwest::Url;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Size of the body chunks handed to the connection during uploads.
/// Progress is reported once per chunk.
const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// A transport-level response, before any envelope parsing
///
/// Cloning is cheap (the body is reference counted), so every caller that
/// shares one request gets its own replayable copy.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
    /// Shared by all copies of one network response
    auth_handled: Arc<AtomicBool>,
}

impl RawResponse {
    pub fn new(status: u16, content_type: Option<String>, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            content_type,
            body: body.into(),
            auth_handled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Build a `200 application/json` response
    pub fn from_json(value: &serde_json::Value) -> Self {
        Self::new(
            200,
            Some("application/json".to_string()),
            value.to_string().into_bytes(),
        )
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body decoded as UTF-8, replacing invalid sequences
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Parse the body as a response envelope
    pub fn envelope(&self) -> Result<Envelope> {
        Envelope::from_slice(&self.body).map_err(NetError::from)
    }

    /// Returns true for the first caller only, across all clones
    pub(crate) fn claim_auth_redirect(&self) -> bool {
        !self.auth_handled.swap(true, Ordering::AcqRel)
    }
}

/// Upload progress as reported by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadProgress {
    pub loaded: u64,
    pub total: u64,
}

/// Progress callback; invoked at whatever cadence the transport chooses
pub type ProgressFn = Arc<dyn Fn(UploadProgress) + Send + Sync>;

/// A multipart body with text fields and a single file part
#[derive(Debug, Clone, Default)]
pub struct MultipartForm {
    pub fields: Vec<(String, String)>,
    pub file_field: String,
    pub file_name: String,
    pub mime: Option<String>,
    pub data: Bytes,
}

impl MultipartForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.fields.push((name.to_string(), value.to_string()));
        self
    }

    pub fn file(mut self, field: &str, file_name: &str, data: impl Into<Bytes>) -> Self {
        self.file_field = field.to_string();
        self.file_name = file_name.to_string();
        self.data = data.into();
        self
    }

    pub fn with_mime(mut self, mime: &str) -> Self {
        self.mime = Some(mime.to_string());
        self
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Network seam used by the dispatcher
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// POST a JSON body
    async fn post_json(&self, endpoint: &str, body: &serde_json::Value) -> Result<RawResponse>;

    /// POST a multipart body, reporting upload progress
    async fn post_multipart(
        &self,
        endpoint: &str,
        form: MultipartForm,
        progress: ProgressFn,
    ) -> Result<RawResponse>;
}

/// reqwest-backed transport
///
/// Keeps a cookie store so the session cookie set by `/auth/login` is sent
/// with every later request.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpTransport {
    pub fn new(base_url: Url) -> Result<Self> {
        let client = reqwest::Client::builder().cookie_store(true).build()?;
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> Result<Url> {
        self.base_url
            .join(endpoint)
            .map_err(|e| NetError::InvalidUrl(format!("{}: {}", endpoint, e)))
    }

    async fn read_response(resp: reqwest::Response) -> Result<RawResponse> {
        let status = resp.status().as_u16();
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = resp.bytes().await?;
        Ok(RawResponse::new(status, content_type, body))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post_json(&self, endpoint: &str, body: &serde_json::Value) -> Result<RawResponse> {
        let url = self.url(endpoint)?;
        tracing::debug!("POST {}", url);

        let resp = self.client.post(url).json(body).send().await?;
        Self::read_response(resp).await
    }

    async fn post_multipart(
        &self,
        endpoint: &str,
        form: MultipartForm,
        progress: ProgressFn,
    ) -> Result<RawResponse> {
        let url = self.url(endpoint)?;
        let MultipartForm {
            fields,
            file_field,
            file_name,
            mime,
            data,
        } = form;

        let total = data.len() as u64;
        tracing::debug!("POST {} (multipart, {} bytes)", url, total);

        let chunks: Vec<Bytes> = (0..data.len())
            .step_by(UPLOAD_CHUNK_SIZE)
            .map(|start| data.slice(start..(start + UPLOAD_CHUNK_SIZE).min(data.len())))
            .collect();

        let mut loaded = 0u64;
        let stream = futures::stream::iter(chunks).map(move |chunk| {
            loaded += chunk.len() as u64;
            progress(UploadProgress { loaded, total });
            Ok::<Bytes, std::io::Error>(chunk)
        });

        let mime = mime.unwrap_or_else(|| {
            mime_guess::from_path(&file_name)
                .first_or_octet_stream()
                .to_string()
        });
        let part = reqwest::multipart::Part::stream_with_length(
            reqwest::Body::wrap_stream(stream),
            total,
        )
        .file_name(file_name)
        .mime_str(&mime)?;

        let mut multipart = reqwest::multipart::Form::new();
        for (name, value) in fields {
            multipart = multipart.text(name, value);
        }
        multipart = multipart.part(file_field, part);

        let resp = self.client.post(url).multipart(multipart).send().await?;
        Self::read_response(resp).await
    }
}
