//! Sync protocol handler
//!
//! Ties [`Store`] and [`BroadcastHub`] together for both transports. Every
//! write, whether an HTTP PUT or a socket `put`, runs through [`SyncHandler::commit`]:
//! the store's write lock is held across persist *and* broadcast, so file
//! contents, versions and notification order agree.

use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, error, warn};

use super::hub::{BroadcastHub, ConnectionId, Registration};
use super::messages::{ClientMessage, Document, ServerMessage, Version};
use super::store::{parse_document, Store};
use crate::config::DEFAULT_MAX_BODY_BYTES;
use crate::types::{Result, SyncError};

/// Where a write came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOrigin {
    /// Request/response caller; not a hub member, so nobody is excluded
    Http,
    /// A registered socket, which gets an ack instead of `data-changed`
    Socket(ConnectionId),
}

impl WriteOrigin {
    fn excluded(self) -> Option<ConnectionId> {
        match self {
            Self::Http => None,
            Self::Socket(id) => Some(id),
        }
    }
}

/// Request/message router shared by both transports
pub struct SyncHandler {
    store: Store,
    hub: Arc<BroadcastHub>,
    max_payload_bytes: usize,
}

impl SyncHandler {
    pub fn new(store: Store, hub: Arc<BroadcastHub>) -> Self {
        Self {
            store,
            hub,
            max_payload_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    /// Cap the size of write bodies and socket messages
    pub fn with_max_payload_bytes(mut self, limit: usize) -> Self {
        self.max_payload_bytes = limit;
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }

    pub fn max_payload_bytes(&self) -> usize {
        self.max_payload_bytes
    }

    /// Read path: the stored bytes, verbatim
    pub async fn read_document(&self) -> Bytes {
        self.store.read().await
    }

    /// Write path for a raw body
    pub async fn write_raw(&self, raw: &[u8], origin: WriteOrigin) -> Result<Version> {
        if raw.len() > self.max_payload_bytes {
            return Err(SyncError::PayloadTooLarge(self.max_payload_bytes));
        }
        let document = parse_document(raw)?;
        self.commit(document, origin).await
    }

    /// Persist `document`, then notify every other connection
    pub async fn commit(&self, document: Document, origin: WriteOrigin) -> Result<Version> {
        let mut writer = self.store.writer().await;
        let version = writer.write_document(document).await?;
        let notified = self.hub.broadcast(version, origin.excluded());
        drop(writer);

        debug!(
            "Committed version {} from {:?}, notified {} connection(s)",
            version, origin, notified
        );
        Ok(version)
    }

    /// Handle one inbound socket message from `connection`
    ///
    /// Bad messages get an `error` reply and the connection stays usable.
    /// Only a failed reply (the connection is gone) is returned as an error.
    pub async fn handle_socket_message(
        &self,
        connection: &Registration,
        raw: &[u8],
    ) -> Result<()> {
        let reply = if raw.len() > self.max_payload_bytes {
            debug!("Oversized message ({} bytes) from {}", raw.len(), connection.id());
            ServerMessage::payload_too_large()
        } else {
            match ClientMessage::parse(raw) {
                Ok(ClientMessage::Put { data }) => {
                    match self.commit(data, WriteOrigin::Socket(connection.id())).await {
                        Ok(version) => ServerMessage::Ack { version },
                        Err(e) => {
                            error!("Write from {} failed: {}", connection.id(), e);
                            ServerMessage::write_failed()
                        }
                    }
                }
                Err(e) => {
                    warn!("Invalid message from {}: {}", connection.id(), e);
                    ServerMessage::invalid_payload()
                }
            }
        };

        connection.send(reply).await
    }
}
