//! Static file serving
//!
//! Serves the client app (index.html, manifest, service worker, fonts,
//! icons) so devices only need to visit `http://<host>:<port>`.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{bytes_response, not_found_response};

/// Handle GET for any path not claimed by another route
pub async fn serve_static(root: Option<&Path>, path: &str) -> Response<Full<Bytes>> {
    let Some(root) = root else {
        return not_found_response();
    };

    let Some(file) = resolve(root, path).await else {
        debug!("Static: no file for {}", path);
        return not_found_response();
    };

    match tokio::fs::read(&file).await {
        Ok(content) => bytes_response(StatusCode::OK, guess_content_type(&file), content),
        Err(e) => {
            debug!("Static: failed to read {}: {}", file.display(), e);
            not_found_response()
        }
    }
}

/// Map a request path to a regular file inside `root`
///
/// `/` maps to `index.html`. The path is percent-decoded, and the
/// canonical target must stay under the canonical root.
async fn resolve(root: &Path, path: &str) -> Option<PathBuf> {
    let relative = match path.trim_start_matches('/') {
        "" => "index.html",
        rest => rest,
    };
    let decoded = urlencoding::decode(relative).ok()?;

    let root = tokio::fs::canonicalize(root).await.ok()?;
    let requested = tokio::fs::canonicalize(root.join(decoded.as_ref())).await.ok()?;
    if !requested.starts_with(&root) {
        return None;
    }

    let metadata = tokio::fs::metadata(&requested).await.ok()?;
    metadata.is_file().then_some(requested)
}

/// Guess MIME type from file extension
pub fn guess_content_type(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match extension.as_deref() {
        Some("html") | Some("htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js") | Some("mjs") => "application/javascript; charset=utf-8",
        Some("json") => "application/json",
        Some("webmanifest") => "application/manifest+json",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("ico") => "image/x-icon",
        Some("webp") => "image/webp",
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("ttf") => "font/ttf",
        Some("wasm") => "application/wasm",
        Some("xml") => "application/xml",
        Some("txt") => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}
