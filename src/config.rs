//! Configuration for chore-sync
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

/// Default REST port; the dedicated WebSocket listener sits one above it
pub const DEFAULT_PORT: u16 = 8780;

/// Default per-connection outbound queue depth
pub const DEFAULT_OUTBOX_CAPACITY: usize = 64;

/// Default cap on PUT bodies and socket messages (16 MiB)
pub const DEFAULT_MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// chore-sync - shared state server for the chore tracker
#[derive(Parser, Debug, Clone)]
#[command(name = "chore-sync")]
#[command(about = "Single-document JSON sync server (REST + WebSocket push)")]
pub struct Args {
    /// Address both listeners bind to
    #[arg(long, env = "BIND_HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,

    /// Port for the REST API, static files and the /ws upgrade path
    #[arg(long, env = "PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Port for the dedicated WebSocket listener (default: PORT + 1)
    #[arg(long, env = "WS_PORT")]
    pub ws_port: Option<u16>,

    /// Path to the JSON data file
    #[arg(long = "data", env = "DATA_FILE", default_value = "chore-data.json")]
    pub data_file: PathBuf,

    /// Directory to serve static files from
    /// Unset: the working directory, if it contains index.html
    /// Empty string: static serving disabled
    #[arg(long, env = "STATIC_DIR")]
    pub static_dir: Option<String>,

    /// Outbound messages queued per WebSocket client before it is evicted
    #[arg(long, env = "OUTBOX_CAPACITY", default_value_t = DEFAULT_OUTBOX_CAPACITY)]
    pub outbox_capacity: usize,

    /// Largest accepted PUT body or WebSocket message, in bytes
    #[arg(long, env = "MAX_BODY_BYTES", default_value_t = DEFAULT_MAX_BODY_BYTES)]
    pub max_body_bytes: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    pub log_json: bool,
}

impl Args {
    /// Effective WebSocket port
    ///
    /// An ephemeral REST port (0) gets an ephemeral WebSocket port too.
    pub fn ws_port(&self) -> Option<u16> {
        match self.ws_port {
            Some(port) => Some(port),
            None if self.port == 0 => Some(0),
            None => self.port.checked_add(1),
        }
    }

    /// Socket address of the REST listener
    pub fn http_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Socket address of the dedicated WebSocket listener
    pub fn ws_addr(&self) -> Option<SocketAddr> {
        self.ws_port().map(|port| SocketAddr::new(self.host, port))
    }

    /// Resolve the static file root
    ///
    /// Unset falls back to the process working directory, not the binary's location.
    pub fn static_root(&self) -> Option<PathBuf> {
        match self.static_dir.as_deref() {
            Some("") => None,
            Some(dir) => Some(PathBuf::from(dir)),
            None => {
                let cwd = std::env::current_dir().ok()?;
                cwd.join("index.html").is_file().then_some(cwd)
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.ws_port().is_none() {
            return Err(format!(
                "PORT {} leaves no room for the WebSocket port; set WS_PORT",
                self.port
            ));
        }

        if self.port != 0 && self.ws_port == Some(self.port) {
            return Err("WS_PORT must differ from PORT".to_string());
        }

        if self.outbox_capacity == 0 {
            return Err("OUTBOX_CAPACITY must be at least 1".to_string());
        }

        if self.max_body_bytes == 0 {
            return Err("MAX_BODY_BYTES must be at least 1".to_string());
        }

        Ok(())
    }
}
