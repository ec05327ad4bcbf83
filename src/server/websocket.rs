//! WebSocket upgrade and connection handling
//!
//! Each upgraded socket gets a hub registration and two halves:
//! - writer task: drains the connection's outbox into the sink
//! - reader loop: feeds text/binary frames to the protocol handler
//!
//! Dropping the registration (reader exit) or eviction by the hub ends the
//! outbox stream, which makes the writer close the socket.

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use hyper_tungstenite::{HyperWebsocket, WebSocketStream};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::routes;
use crate::sync::{ServerMessage, SyncHandler};

type Socket = WebSocketStream<TokioIo<hyper::upgrade::Upgraded>>;

/// Slack above the payload limit before tungstenite itself drops a connection
const FRAME_HEADROOM: usize = 64 * 1024;

/// Socket limits sized so oversized messages reach the protocol handler
///
/// The handler answers those with an error reply instead of a dropped
/// connection. Only messages beyond the headroom are cut off by tungstenite.
pub fn socket_config(max_payload_bytes: usize) -> WebSocketConfig {
    let limit = max_payload_bytes.saturating_add(FRAME_HEADROOM);
    let mut config = WebSocketConfig::default();
    config.max_message_size = Some(limit);
    config.max_frame_size = Some(limit);
    config
}

/// Request on the dedicated WebSocket listener: any path may upgrade
pub fn handle_listener_request(
    sync: &Arc<SyncHandler>,
    req: Request<Incoming>,
    addr: SocketAddr,
) -> Response<Full<Bytes>> {
    if !hyper_tungstenite::is_upgrade_request(&req) {
        debug!("[{}] Non-upgrade request on WebSocket listener", addr);
        return routes::with_cors(routes::text_response(
            StatusCode::UPGRADE_REQUIRED,
            "WebSocket upgrade required\n",
        ));
    }
    handle_upgrade(Arc::clone(sync), req, addr)
}

/// Complete the handshake and spawn the connection task
pub fn handle_upgrade(
    sync: Arc<SyncHandler>,
    req: Request<Incoming>,
    addr: SocketAddr,
) -> Response<Full<Bytes>> {
    let config = socket_config(sync.max_payload_bytes());
    match hyper_tungstenite::upgrade(req, Some(config)) {
        Ok((response, websocket)) => {
            tokio::spawn(async move {
                if let Err(e) = serve_connection(sync, websocket, addr).await {
                    error!("[{}] WebSocket upgrade failed: {:?}", addr, e);
                }
            });

            // Convert the upgrade response
            let (parts, _) = response.into_parts();
            Response::from_parts(parts, Full::new(Bytes::new()))
        }
        Err(e) => {
            error!("[{}] WebSocket upgrade error: {:?}", addr, e);
            routes::text_response(
                StatusCode::BAD_REQUEST,
                format!("WebSocket upgrade failed: {e}\n"),
            )
        }
    }
}

async fn serve_connection(
    sync: Arc<SyncHandler>,
    websocket: HyperWebsocket,
    addr: SocketAddr,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    let ws = websocket.await?;
    let (registration, outbox) = sync.hub().connect();
    let id = registration.id();

    info!(
        "[{}] Connection {} opened ({} connected)",
        addr,
        id,
        sync.hub().connection_count()
    );

    let (sink, mut stream) = ws.split();
    tokio::spawn(write_outbox(sink, outbox, addr));

    while let Some(frame) = stream.next().await {
        let raw: Vec<u8> = match frame {
            Ok(Message::Text(text)) => text.into_bytes(),
            Ok(Message::Binary(data)) => data,
            Ok(Message::Close(_)) => break,
            // Ping/Pong are answered by tungstenite
            Ok(_) => continue,
            Err(e) => {
                debug!("[{}] Read error on {}: {}", addr, id, e);
                break;
            }
        };

        if let Err(e) = sync.handle_socket_message(&registration, &raw).await {
            debug!("[{}] Dropping {}: {}", addr, id, e);
            break;
        }
    }

    drop(registration);
    info!(
        "[{}] Connection {} closed ({} connected)",
        addr,
        id,
        sync.hub().connection_count()
    );
    Ok(())
}

/// Drain the outbox into the socket until every sender is gone
async fn write_outbox(
    mut sink: futures_util::stream::SplitSink<Socket, Message>,
    mut outbox: mpsc::Receiver<ServerMessage>,
    addr: SocketAddr,
) {
    while let Some(message) = outbox.recv().await {
        let text = match serde_json::to_string(&message) {
            Ok(text) => text,
            Err(e) => {
                error!("[{}] Failed to serialize {:?}: {}", addr, message, e);
                continue;
            }
        };
        if let Err(e) = sink.send(Message::Text(text)).await {
            warn!("[{}] Socket write failed: {}", addr, e);
            return;
        }
    }

    let _ = sink.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_config_leaves_room_above_payload_limit() {
        let config = socket_config(1024);
        assert_eq!(config.max_message_size, Some(1024 + FRAME_HEADROOM));
        assert_eq!(config.max_frame_size, Some(1024 + FRAME_HEADROOM));
    }

    #[test]
    fn test_socket_config_follows_large_limits() {
        // Above tungstenite's 16 MiB frame default
        let limit = 32 * 1024 * 1024;
        let config = socket_config(limit);
        assert!(config.max_frame_size.unwrap() > limit);
        assert!(config.max_message_size.unwrap() > limit);
    }

    #[test]
    fn test_socket_config_saturates() {
        let config = socket_config(usize::MAX);
        assert_eq!(config.max_message_size, Some(usize::MAX));
    }
}
