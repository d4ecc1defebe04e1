//! Wire protocol definitions for Client <-> File server communication
//!
//! This crate defines the shared data structures for the JSON API:
//! the response envelope, file metadata, and the per-endpoint request and
//! response bodies. Everything is validated when it is decoded.

mod file;

pub use file::{ArchiveNode, FileKind, FileStat, SearchResult};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Message the server sends when the session is missing or expired
pub const AUTH_ERROR_MESSAGE: &str = "auth error";

/// Endpoint paths, relative to the server base URL
pub mod endpoint {
    pub const LOGIN: &str = "/auth/login";
    pub const LOGOUT: &str = "/auth/logout";
    pub const RESET_PASSWORD: &str = "/auth/reset_password";

    pub const READ_DIR: &str = "/file/read_dir";
    pub const DELETE: &str = "/file/delete";
    pub const CREATE_DIR: &str = "/file/create_dir";
    pub const UPLOAD: &str = "/file/upload";
    pub const READ: &str = "/file/read";
    pub const READ_COMPRESSION: &str = "/file/read_compression";
    pub const READ_ZIP_ENTRIES: &str = "/file/read_zip_entries";
    pub const SEARCH: &str = "/file/search";
}

/// Protocol errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtoError {
    #[error("Unknown response status: {0}")]
    UnknownStatus(u8),

    #[error("Invalid file entry '{name}': is_dir={is_dir}, is_file={is_file}")]
    InvalidFileStat {
        name: String,
        is_dir: bool,
        is_file: bool,
    },

    #[error("Malformed payload: {0}")]
    Malformed(String),

    #[error("Request failed: {0}")]
    Rejected(String),
}

impl From<serde_json::Error> for ProtoError {
    fn from(e: serde_json::Error) -> Self {
        ProtoError::Malformed(e.to_string())
    }
}

/// Envelope status: 0 on success, 1 on failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Status {
    Success,
    Error,
}

impl TryFrom<u8> for Status {
    type Error = ProtoError;

    fn try_from(value: u8) -> Result<Self, ProtoError> {
        match value {
            0 => Ok(Status::Success),
            1 => Ok(Status::Error),
            other => Err(ProtoError::UnknownStatus(other)),
        }
    }
}

impl From<Status> for u8 {
    fn from(status: Status) -> Self {
        match status {
            Status::Success => 0,
            Status::Error => 1,
        }
    }
}

/// Response envelope wrapping every JSON endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub status: Status,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default)]
    pub message: String,
}

impl Envelope {
    pub fn success(data: serde_json::Value) -> Self {
        Self {
            status: Status::Success,
            data,
            message: String::new(),
        }
    }

    pub fn failure(message: &str) -> Self {
        Self {
            status: Status::Error,
            data: serde_json::Value::Null,
            message: message.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    /// Does this envelope signal an expired or missing session?
    pub fn is_auth_error(&self) -> bool {
        self.status != Status::Success && self.message == AUTH_ERROR_MESSAGE
    }

    /// Decode the payload of a successful envelope
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, ProtoError> {
        if !self.is_success() {
            return Err(ProtoError::Rejected(self.message.clone()));
        }
        Ok(serde_json::from_value(self.data.clone())?)
    }

    /// Parse an envelope from a response body
    pub fn from_slice(body: &[u8]) -> Result<Self, ProtoError> {
        Ok(serde_json::from_slice(body)?)
    }
}

/// `POST /auth/login`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub name: String,
    pub password: String,
}

/// `POST /auth/reset_password`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetPasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

/// Body shared by every endpoint that takes a single path
/// (`read_dir`, `delete`, `create_dir`, `read`, `read_zip_entries`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRequest {
    pub file: String,
}

impl FileRequest {
    pub fn new(file: impl Into<String>) -> Self {
        Self { file: file.into() }
    }
}

/// `POST /file/read_dir` response data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadDirResponse {
    pub files: Vec<FileStat>,
}

/// `POST /file/search`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub keyword: String,
}

/// Empty request body (`{}`)
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Empty {}

/// Multipart field names for `POST /file/upload`
pub mod upload_field {
    pub const FILENAME: &str = "filename";
    pub const FILE: &str = "file";
}
