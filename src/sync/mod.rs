//! Synchronization core
//!
//! - **Store**: the on-disk document and the only place a version is minted
//! - **Hub**: live WebSocket connections and change fan-out
//! - **Protocol**: the single choke point where a write is persisted, then announced
//!
//! Transports (HTTP and WebSocket adapters in `crate::server`) only decode
//! bytes into calls on [`SyncHandler`] and encode the results back.

pub mod hub;
pub mod messages;
pub mod protocol;
pub mod store;

pub use hub::{BroadcastHub, ConnectionId, Registration};
pub use messages::{ClientMessage, Document, ServerMessage, Version, VERSION_KEY};
pub use protocol::{SyncHandler, WriteOrigin};
pub use store::{parse_document, Store, StoreWriter};
