//! Health and version endpoints
//!
//! - `/version` - git commit the binary was built from
//! - `/health` - liveness plus the number of live WebSocket clients

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;

use super::json_response;
use crate::sync::SyncHandler;

/// Response for /version
#[derive(Debug, Serialize)]
pub struct VersionResponse {
    /// Short git hash, the field existing clients read
    pub version: &'static str,
    pub commit_full: &'static str,
    pub build_time: &'static str,
    pub package: &'static str,
    pub service: &'static str,
}

/// Response for /health
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub connections: usize,
    pub service: &'static str,
}

/// Build info captured by build.rs
pub fn version_info() -> Response<Full<Bytes>> {
    let response = VersionResponse {
        version: option_env!("GIT_COMMIT_SHORT").unwrap_or("unknown"),
        commit_full: option_env!("GIT_COMMIT_FULL").unwrap_or("unknown"),
        build_time: option_env!("BUILD_TIMESTAMP").unwrap_or("unknown"),
        package: env!("CARGO_PKG_VERSION"),
        service: "chore-sync",
    };

    let body = serde_json::to_string(&response)
        .unwrap_or_else(|_| r#"{"version":"unknown"}"#.to_string());
    json_response(StatusCode::OK, body)
}

/// Liveness probe
pub fn health_check(sync: &SyncHandler) -> Response<Full<Bytes>> {
    let response = HealthResponse {
        status: "ok",
        connections: sync.hub().connection_count(),
        service: "chore-sync",
    };

    let body = serde_json::to_string(&response)
        .unwrap_or_else(|_| r#"{"status":"ok"}"#.to_string());
    json_response(StatusCode::OK, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{BroadcastHub, Store};
    use http_body_util::BodyExt;
    use serde_json::Value;
    use std::sync::Arc;

    async fn body_json(response: Response<Full<Bytes>>) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_version_info_has_version_string() {
        let response = version_info();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert!(body["version"].is_string());
        assert_eq!(body["service"], "chore-sync");
    }

    #[tokio::test]
    async fn test_health_counts_connections() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = Store::open(dir.path().join("data.json")).await;
        let sync = SyncHandler::new(store, Arc::new(BroadcastHub::new(4)));
        let (_a, _a_rx) = sync.hub().connect();

        let body = body_json(health_check(&sync)).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["connections"], 1);
    }
}
