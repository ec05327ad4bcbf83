//! Error types for chore-sync
//!
//! Every error is scoped to one request or one connection; none of them
//! terminate the server process.

use hyper::StatusCode;

use crate::sync::ConnectionId;

/// Main error type for sync operations
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Write body is not a JSON object. No state was mutated.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Payload too large: limit is {0} bytes")]
    PayloadTooLarge(usize),

    /// A direct or broadcast send to a connection failed.
    #[error("Send failure on connection {0}")]
    SendFailure(ConnectionId),

    /// Filesystem error while persisting the document.
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SyncError {
    /// Convert error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::SendFailure(_) | Self::Storage(_) | Self::Config(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Convert to status code and body tuple for HTTP response
    pub fn into_status_code_and_body(self) -> (StatusCode, String) {
        let status = self.status_code();
        let body = self.to_string();
        (status, body)
    }

    /// True when the caller sent something we refuse to store
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidPayload(err.to_string())
    }
}

/// Result type alias for sync operations
pub type Result<T> = std::result::Result<T, SyncError>;
