//! Shared types for chore-sync

pub mod error;

pub use error::{Result, SyncError};
