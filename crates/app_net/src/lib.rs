//! WebFiler Request Dispatch Layer
//!
//! Provides:
//! - Transport: the seam between the client and the network (reqwest in production)
//! - Dispatcher: per-tag request coalescing/preemption and auth-failure interception
//! - Multipart uploads with progress reporting
//! - Download link construction

mod dispatcher;
mod transport;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use dispatcher::{AuthRedirect, Dispatcher, TagPolicy};
pub use transport::{
    HttpTransport, MultipartForm, ProgressFn, RawResponse, Transport, UploadProgress,
};
pub use reqwest::Url;

use thiserror::Error;

/// Network layer errors
///
/// Cloneable so a single outcome can be handed to every caller that shares
/// one in-flight request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Decode error: {0}")]
    Decode(String),
}

impl NetError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, NetError::Cancelled)
    }
}

impl From<reqwest::Error> for NetError {
    fn from(e: reqwest::Error) -> Self {
        NetError::Transport(e.to_string())
    }
}

impl From<app_proto::ProtoError> for NetError {
    fn from(e: app_proto::ProtoError) -> Self {
        NetError::Decode(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, NetError>;
