//! Wire shapes for the WebSocket transport
//!
//! ## Protocol
//!
//! Messages (client → server):
//! - `{"action": "put", "data": {...}}` - replace the whole document
//!
//! Messages (server → client):
//! - `{"type": "ack", "version": N}` - to the submitter of a put
//! - `{"type": "data-changed", "version": N}` - to every other connection
//! - `{"type": "error", "message": "..."}` - to the sender of a bad message

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::types::{Result, SyncError};

/// The synchronized application state: a JSON object, otherwise opaque
pub type Document = Map<String, Value>;

/// Reserved top-level key the version is stamped under
pub const VERSION_KEY: &str = "_version";

/// Write version, in wall-clock milliseconds since the epoch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(pub u64);

impl Version {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Message sent from server to client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Direct acknowledgement of the receiver's own put
    Ack { version: Version },
    /// Someone else replaced the document
    DataChanged { version: Version },
    /// The receiver sent something we could not apply
    Error { message: String },
}

impl ServerMessage {
    pub fn invalid_payload() -> Self {
        Self::Error {
            message: "Invalid payload".to_string(),
        }
    }

    pub fn payload_too_large() -> Self {
        Self::Error {
            message: "Payload too large".to_string(),
        }
    }

    pub fn write_failed() -> Self {
        Self::Error {
            message: "Write failed".to_string(),
        }
    }
}

/// Message received from client
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ClientMessage {
    /// Replace the whole document
    Put { data: Document },
}

impl ClientMessage {
    /// Decode one socket frame
    ///
    /// Invalid JSON and unrecognized shapes are both `InvalidPayload`.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        serde_json::from_slice(raw).map_err(|e| SyncError::InvalidPayload(e.to_string()))
    }
}
