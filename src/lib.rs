//! Chore sync - single-document JSON sync server
//!
//! Keeps one JSON document on disk and keeps every connected client in step
//! with it.
//!
//! ## Surfaces
//!
//! - **REST**: `GET /data` and `PUT /data` for whole-document reads and writes
//! - **WebSocket**: `put` writes answered with `ack`, `data-changed` pushes to peers
//! - **Static**: serves the web client from the static root
//!
//! Every write, whatever its transport, stamps a fresh `_version` and tells
//! every other live socket about it.

pub mod config;
pub mod routes;
pub mod server;
pub mod sync;
pub mod types;

pub use config::Args;
pub use server::{AppState, Server};
pub use types::{Result, SyncError};
