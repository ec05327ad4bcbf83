//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo for async handling, one task per connection.

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::config::Args;
use crate::routes;
use crate::server::websocket;
use crate::sync::{BroadcastHub, Store, SyncHandler};
use crate::types::{Result, SyncError};

/// Shared application state
pub struct AppState {
    pub args: Args,
    /// Store + hub behind the protocol handler
    pub sync: Arc<SyncHandler>,
    /// Static file root (None disables static serving)
    pub static_root: Option<PathBuf>,
}

impl AppState {
    /// Open the store and create an empty hub
    pub async fn new(args: Args) -> Self {
        let store = Store::open(args.data_file.clone()).await;
        let hub = Arc::new(BroadcastHub::new(args.outbox_capacity));
        let sync = SyncHandler::new(store, hub).with_max_payload_bytes(args.max_body_bytes);
        let static_root = args.static_root();

        Self {
            args,
            sync: Arc::new(sync),
            static_root,
        }
    }
}

/// Which listener a connection arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Listener {
    Rest,
    Socket,
}

/// Bound listeners, ready to serve
pub struct Server {
    state: Arc<AppState>,
    rest: TcpListener,
    socket: Option<TcpListener>,
}

impl Server {
    /// Bind the REST listener and, if configured, the WebSocket listener
    pub async fn bind(state: Arc<AppState>) -> Result<Self> {
        let rest = bind_listener(state.args.http_addr()).await?;
        let socket = match state.args.ws_addr() {
            Some(addr) => Some(bind_listener(addr).await?),
            None => None,
        };

        Ok(Self {
            state,
            rest,
            socket,
        })
    }

    /// Actual REST address (resolves port 0)
    pub fn rest_addr(&self) -> Result<SocketAddr> {
        Ok(self.rest.local_addr()?)
    }

    /// Actual WebSocket listener address
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// Serve until `shutdown` resolves, then drop every hub connection
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let Server {
            state,
            rest,
            socket,
        } = self;

        let rest_loop = accept_loop(rest, Arc::clone(&state), Listener::Rest);
        let socket_loop = async {
            match socket {
                Some(listener) => accept_loop(listener, Arc::clone(&state), Listener::Socket).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            _ = rest_loop => {}
            _ = socket_loop => {}
            _ = shutdown => {
                info!("Shutdown requested");
            }
        }

        state.sync.hub().clear();
        info!("Server stopped");
        Ok(())
    }
}

/// Resolves on Ctrl-C
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        // Without a signal handler, run until the process is killed
        warn!("Failed to install Ctrl-C handler: {}", e);
        std::future::pending::<()>().await;
    }
}

async fn bind_listener(addr: SocketAddr) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|e| SyncError::Config(format!("cannot bind {}: {}", addr, e)))
}

async fn accept_loop(listener: TcpListener, state: Arc<AppState>, kind: Listener) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move {
                            let response = match kind {
                                Listener::Rest => handle_request(state, addr, req).await,
                                Listener::Socket => {
                                    websocket::handle_listener_request(&state.sync, req, addr)
                                }
                            };
                            Ok::<_, Infallible>(response)
                        }
                    });

                    if let Err(err) = http1::Builder::new()
                        .title_case_headers(true)
                        .serve_connection(io, service)
                        .with_upgrades()
                        .await
                    {
                        debug!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Route incoming HTTP requests
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> Response<Full<Bytes>> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    info!("[{}] {} {}", addr, method, path);

    let response = match (method, path.as_str()) {
        // CORS preflight
        (Method::OPTIONS, _) => routes::preflight_response(),

        (Method::GET, "/data") => routes::get_data(&state.sync).await,
        (Method::PUT, "/data") => routes::put_data(&state.sync, req.into_body()).await,

        (Method::GET, "/version") => routes::version_info(),
        (Method::GET, "/health") => routes::health_check(&state.sync),

        // Same protocol as the dedicated listener, for clients on one port
        (Method::GET, "/ws") if hyper_tungstenite::is_upgrade_request(&req) => {
            websocket::handle_upgrade(Arc::clone(&state.sync), req, addr)
        }

        (Method::GET, p) => routes::serve_static(state.static_root.as_deref(), p).await,

        _ => routes::not_found_response(),
    };

    routes::with_cors(response)
}
