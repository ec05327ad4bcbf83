//! Transport adapters
//!
//! - REST listener: `/data`, `/version`, `/health`, static files, and `/ws` upgrades
//! - WebSocket listener: upgrades on any path (clients that dial `PORT + 1`)

pub mod http;
pub mod websocket;

pub use http::{shutdown_signal, AppState, Server};
