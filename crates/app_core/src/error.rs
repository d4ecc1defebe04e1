//! Application error types

use thiserror::Error;

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    // ===== Recoverable Errors (notify user, continue) =====
    #[error("Network error: {0}")]
    Net(#[from] app_net::NetError),

    #[error("Protocol error: {0}")]
    Proto(#[from] app_proto::ProtoError),

    #[error("Server rejected request: {0}")]
    Api(String),

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    // ===== Fatal Errors (application termination) =====
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Initialization failed: {0}")]
    Init(String),
}

impl AppError {
    /// Is this error recoverable?
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AppError::Net(_)
                | AppError::Proto(_)
                | AppError::Api(_)
                | AppError::Io(_)
                | AppError::NotFound(_)
        )
    }

    /// Is this a fatal error?
    pub fn is_fatal(&self) -> bool {
        !self.is_recoverable()
    }

    /// Was the underlying request cancelled rather than failed?
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AppError::Net(e) if e.is_cancelled())
    }

    /// Get a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            AppError::Net(app_net::NetError::Cancelled) => "Request cancelled".to_string(),
            AppError::Net(_) => "Cannot reach the server".to_string(),
            AppError::Api(msg) => msg.clone(),
            AppError::NotFound(what) => format!("Not found: {}", what),
            _ => self.to_string(),
        }
    }
}

impl From<toml::de::Error> for AppError {
    fn from(e: toml::de::Error) -> Self {
        AppError::Config(e.to_string())
    }
}

impl From<toml::ser::Error> for AppError {
    fn from(e: toml::ser::Error) -> Self {
        AppError::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let cancelled = AppError::from(app_net::NetError::Cancelled);
        assert!(cancelled.is_cancelled());
        assert!(cancelled.is_recoverable());
        assert_eq!(cancelled.user_message(), "Request cancelled");

        let api = AppError::Api("password error".into());
        assert!(!api.is_cancelled());
        assert_eq!(api.user_message(), "password error");

        assert!(AppError::Config("bad".into()).is_fatal());
    }
}
