//! Document endpoints
//!
//! - `GET /data` - the stored document, verbatim
//! - `PUT /data` - replace it; responds `{"version": N}`

use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::{Response, StatusCode};
use tracing::{error, info, warn};

use super::{error_response, json_response, text_response};
use crate::sync::{SyncHandler, WriteOrigin};
use crate::types::SyncError;

/// Handle GET /data
pub async fn get_data(sync: &SyncHandler) -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, sync.read_document().await)
}

/// Handle PUT /data
pub async fn put_data<B>(sync: &SyncHandler, body: B) -> Response<Full<Bytes>>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let limit = sync.max_payload_bytes();
    let body = match Limited::new(body, limit).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            warn!("PUT /data body exceeds {} bytes", limit);
            return error_response(SyncError::PayloadTooLarge(limit));
        }
        Err(e) => {
            warn!("PUT /data body error: {}", e);
            return text_response(StatusCode::BAD_REQUEST, "Failed to read request body");
        }
    };

    match sync.write_raw(&body, WriteOrigin::Http).await {
        Ok(version) => {
            info!("PUT /data stored version {}", version);
            let body = serde_json::json!({ "version": version });
            json_response(StatusCode::OK, body.to_string())
        }
        Err(e) if e.is_client_error() => {
            warn!("PUT /data rejected: {}", e);
            error_response(e)
        }
        Err(e) => {
            error!("PUT /data failed: {}", e);
            error_response(e)
        }
    }
}
