//! Broadcast hub
//!
//! Tracks live WebSocket connections and fans out change notifications.
//!
//! Each connection owns a bounded outbox drained by its writer task. A
//! broadcast never waits on a connection: it snapshots the set and does a
//! `try_send` per outbox. A full or closed outbox evicts that connection,
//! which drops the hub's sender and lets the writer close the socket.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};
use uuid::Uuid;

use super::messages::{ServerMessage, Version};
use crate::types::{Result, SyncError};

/// Sending half of a connection's outbox
pub type Outbox = mpsc::Sender<ServerMessage>;

/// Identity of one live connection
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConnectionId({})", self.0)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = self.0.simple().to_string();
        f.write_str(&id[..8])
    }
}

/// Connection set plus fan-out
pub struct BroadcastHub {
    connections: DashMap<ConnectionId, Outbox>,
    outbox_capacity: usize,
}

impl BroadcastHub {
    /// Create a hub whose connections queue at most `outbox_capacity` messages
    pub fn new(outbox_capacity: usize) -> Self {
        Self {
            connections: DashMap::new(),
            outbox_capacity: outbox_capacity.max(1),
        }
    }

    /// Add a connection. Returns false (and changes nothing) if already present.
    pub fn register(&self, id: ConnectionId, outbox: Outbox) -> bool {
        match self.connections.entry(id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(outbox);
                debug!("Hub: registered {}, count={}", id, self.connections.len());
                true
            }
        }
    }

    /// Remove a connection. Safe to call repeatedly and from error paths.
    pub fn unregister(&self, id: ConnectionId) -> bool {
        let removed = self.connections.remove(&id).is_some();
        if removed {
            debug!("Hub: unregistered {}, count={}", id, self.connections.len());
        }
        removed
    }

    /// Create an outbox, register it, and hand back the RAII registration
    pub fn connect(self: &Arc<Self>) -> (Registration, mpsc::Receiver<ServerMessage>) {
        let (outbox, inbox) = mpsc::channel(self.outbox_capacity);
        let id = ConnectionId::new();
        self.register(id, outbox);
        let registration = Registration {
            id,
            hub: Arc::clone(self),
        };
        (registration, inbox)
    }

    /// Send `data-changed` to every connection except `excluding`
    ///
    /// Returns how many connections accepted the message. Failing
    /// connections are evicted; the rest still receive it.
    pub fn broadcast(&self, version: Version, excluding: Option<ConnectionId>) -> usize {
        let targets: Vec<(ConnectionId, Outbox)> = self
            .connections
            .iter()
            .filter(|entry| Some(*entry.key()) != excluding)
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();

        let message = ServerMessage::DataChanged { version };
        let mut delivered = 0;
        for (id, outbox) in targets {
            match outbox.try_send(message.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!("Hub: outbox of {} is full, evicting", id);
                    self.unregister(id);
                }
                Err(TrySendError::Closed(_)) => {
                    debug!("Hub: {} is gone, evicting", id);
                    self.unregister(id);
                }
            }
        }

        debug!("Hub: version {} delivered to {} connection(s)", version, delivered);
        delivered
    }

    /// Queue a message for one connection, waiting for outbox space
    pub async fn send_to(&self, id: ConnectionId, message: ServerMessage) -> Result<()> {
        // Clone out of the map so no shard lock is held across the await
        let outbox = self
            .connections
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or(SyncError::SendFailure(id))?;

        if outbox.send(message).await.is_err() {
            self.unregister(id);
            return Err(SyncError::SendFailure(id));
        }
        Ok(())
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    /// Drop every connection (server stop)
    pub fn clear(&self) {
        let count = self.connections.len();
        self.connections.clear();
        debug!("Hub: cleared {} connection(s)", count);
    }
}

/// Membership of one connection in a [`BroadcastHub`]
///
/// Dropping it unregisters, so cleanup runs on every exit path.
pub struct Registration {
    id: ConnectionId,
    hub: Arc<BroadcastHub>,
}

impl Registration {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Reply to this connection only
    pub async fn send(&self, message: ServerMessage) -> Result<()> {
        self.hub.send_to(self.id, message).await
    }

    pub fn is_registered(&self) -> bool {
        self.hub.contains(self.id)
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.hub.unregister(self.id);
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hub(capacity: usize) -> Arc<BroadcastHub> {
        Arc::new(BroadcastHub::new(capacity))
    }

    #[test]
    fn test_register_is_idempotent() {
        let hub = hub(4);
        let (tx, _rx) = mpsc::channel(4);
        let id = ConnectionId::new();

        assert!(hub.register(id, tx.clone()));
        assert!(!hub.register(id, tx));
        assert_eq!(hub.connection_count(), 1);
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let hub = hub(4);
        let (tx, _rx) = mpsc::channel(4);
        let id = ConnectionId::new();

        assert!(!hub.unregister(id));
        hub.register(id, tx);
        assert!(hub.unregister(id));
        assert!(!hub.unregister(id));
        assert_eq!(hub.connection_count(), 0);
    }

    #[test]
    fn test_broadcast_skips_excluded() {
        let hub = hub(4);
        let (a, mut a_rx) = hub.connect();
        let (_b, mut b_rx) = hub.connect();

        assert_eq!(hub.broadcast(Version(42), Some(a.id())), 1);

        assert!(a_rx.try_recv().is_err());
        assert_eq!(
            b_rx.try_recv().unwrap(),
            ServerMessage::DataChanged { version: Version(42) }
        );
    }

    #[test]
    fn test_broadcast_without_exclusion_reaches_all() {
        let hub = hub(4);
        let (_a, mut a_rx) = hub.connect();
        let (_b, mut b_rx) = hub.connect();

        assert_eq!(hub.broadcast(Version(1), None), 2);
        assert!(a_rx.try_recv().is_ok());
        assert!(b_rx.try_recv().is_ok());
    }

    #[test]
    fn test_closed_connection_is_evicted() {
        let hub = hub(4);
        let (dead, dead_rx) = hub.connect();
        let (_live, mut live_rx) = hub.connect();
        drop(dead_rx);

        assert_eq!(hub.broadcast(Version(1), None), 1);
        assert!(!dead.is_registered());
        assert_eq!(hub.connection_count(), 1);
        assert_eq!(
            live_rx.try_recv().unwrap(),
            ServerMessage::DataChanged { version: Version(1) }
        );
    }

    #[test]
    fn test_full_outbox_is_evicted() {
        let hub = hub(1);
        let (slow, _slow_rx) = hub.connect();
        let (_fast, mut fast_rx) = hub.connect();

        assert_eq!(hub.broadcast(Version(1), None), 2);
        fast_rx.try_recv().unwrap();

        assert_eq!(hub.broadcast(Version(2), None), 1);
        assert!(!slow.is_registered());
        assert_eq!(
            fast_rx.try_recv().unwrap(),
            ServerMessage::DataChanged { version: Version(2) }
        );
    }

    #[test]
    fn test_broadcasts_arrive_in_order() {
        let hub = hub(16);
        let (_a, mut rx) = hub.connect();

        for v in 1..=5 {
            hub.broadcast(Version(v), None);
        }
        for v in 1..=5 {
            assert_eq!(
                rx.try_recv().unwrap(),
                ServerMessage::DataChanged { version: Version(v) }
            );
        }
    }

    #[test]
    fn test_dropping_registration_unregisters() {
        let hub = hub(4);
        let (registration, mut rx) = hub.connect();
        let id = registration.id();
        assert!(hub.contains(id));

        drop(registration);
        assert!(!hub.contains(id));
        assert_eq!(hub.broadcast(Version(1), None), 0);
        // Hub's sender is gone, so the writer side sees end-of-stream
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_clear_empties_set() {
        let hub = hub(4);
        let (_a, _a_rx) = hub.connect();
        let (_b, _b_rx) = hub.connect();
        hub.clear();
        assert_eq!(hub.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_direct_send() {
        let hub = hub(4);
        let (registration, mut rx) = hub.connect();

        registration
            .send(ServerMessage::Ack { version: Version(3) })
            .await
            .unwrap();
        assert_eq!(rx.recv().await, Some(ServerMessage::Ack { version: Version(3) }));
    }

    #[tokio::test]
    async fn test_direct_send_failure_unregisters() {
        let hub = hub(4);
        let (registration, rx) = hub.connect();
        drop(rx);

        let err = registration.send(ServerMessage::invalid_payload()).await.unwrap_err();
        assert!(matches!(err, SyncError::SendFailure(id) if id == registration.id()));
        assert!(!registration.is_registered());
    }
}
