//! HTTP route handlers
//!
//! Shared response builders live here. Every response leaves the router
//! through [`with_cors`].

pub mod data;
pub mod health;
pub mod static_files;

pub use data::{get_data, put_data};
pub use health::{health_check, version_info};
pub use static_files::{guess_content_type, serve_static};

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{self, HeaderValue};
use hyper::{Response, StatusCode};

use crate::types::SyncError;

/// Permissive cross-origin headers attached to every response
pub const CORS_HEADERS: [(&str, &str); 3] = [
    ("Access-Control-Allow-Origin", "*"),
    ("Access-Control-Allow-Methods", "GET, PUT, OPTIONS"),
    ("Access-Control-Allow-Headers", "Content-Type"),
];

/// Add the CORS headers to a response
pub fn with_cors(mut response: Response<Full<Bytes>>) -> Response<Full<Bytes>> {
    let headers = response.headers_mut();
    for (name, value) in CORS_HEADERS {
        headers.insert(name, HeaderValue::from_static(value));
    }
    response
}

/// Response with a fixed content type
pub fn bytes_response(
    status: StatusCode,
    content_type: &'static str,
    body: impl Into<Bytes>,
) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

pub fn json_response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    bytes_response(status, "application/json", body)
}

pub fn text_response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    bytes_response(status, "text/plain; charset=utf-8", body)
}

/// Plain-text error response: status from the error, body is its reason
pub fn error_response(err: SyncError) -> Response<Full<Bytes>> {
    let (status, body) = err.into_status_code_and_body();
    text_response(status, body)
}

/// CORS preflight response
pub fn preflight_response() -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = StatusCode::NO_CONTENT;
    response
}

/// Not found response
pub fn not_found_response() -> Response<Full<Bytes>> {
    text_response(StatusCode::NOT_FOUND, "Not found\n")
}
