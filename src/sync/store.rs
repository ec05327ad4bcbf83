//! Document store
//!
//! Owns the JSON file on disk and mints versions. Reads are lock-free and
//! never fail; writes go through an exclusive [`StoreWriter`] so versions and
//! file contents advance together.

use bytes::Bytes;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use super::messages::{Document, Version, VERSION_KEY};
use crate::types::{Result, SyncError};

/// Bytes served when no document has been written yet
const EMPTY_DOCUMENT: &[u8] = b"{}";

/// Single-document JSON store
pub struct Store {
    path: PathBuf,
    /// Last minted version; the lock doubles as the write lock
    last_version: Mutex<Version>,
}

impl Store {
    /// Open the store at `path`, seeding the version clock from the file
    ///
    /// A missing or unreadable file is fine: the store starts empty.
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let seed = match tokio::fs::read(&path).await {
            Ok(raw) => stored_version(&raw).unwrap_or_else(|| {
                warn!(
                    "No readable {} in {}, version clock starts at zero",
                    VERSION_KEY,
                    path.display()
                );
                Version::default()
            }),
            Err(_) => Version::default(),
        };
        debug!("Store opened at {} (last version {})", path.display(), seed);

        Self {
            path,
            last_version: Mutex::new(seed),
        }
    }

    /// Raw persisted bytes, or `{}` if nothing is stored
    pub async fn read(&self) -> Bytes {
        match tokio::fs::read(&self.path).await {
            Ok(raw) => Bytes::from(raw),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Bytes::from_static(EMPTY_DOCUMENT)
            }
            Err(e) => {
                warn!(
                    "Failed to read {}, serving empty document: {}",
                    self.path.display(),
                    e
                );
                Bytes::from_static(EMPTY_DOCUMENT)
            }
        }
    }

    /// Take the write lock
    pub async fn writer(&self) -> StoreWriter<'_> {
        StoreWriter {
            path: &self.path,
            last_version: self.last_version.lock().await,
        }
    }

    /// Parse `raw` and replace the document with it
    pub async fn write(&self, raw: &[u8]) -> Result<Version> {
        self.writer().await.write(raw).await
    }

    /// Most recently minted version (zero before the first write)
    pub async fn last_version(&self) -> Version {
        *self.last_version.lock().await
    }
}

/// Exclusive write access to a [`Store`]
///
/// Held by the protocol handler across persist and broadcast.
pub struct StoreWriter<'a> {
    path: &'a Path,
    last_version: MutexGuard<'a, Version>,
}

impl StoreWriter<'_> {
    /// Parse `raw` as a document and persist it
    pub async fn write(&mut self, raw: &[u8]) -> Result<Version> {
        let document = parse_document(raw)?;
        self.write_document(document).await
    }

    /// Stamp `document` with a fresh version and overwrite the file
    ///
    /// The version is only committed once the file is in place.
    pub async fn write_document(&mut self, mut document: Document) -> Result<Version> {
        let version = next_version(*self.last_version, now_millis());
        document.insert(VERSION_KEY.to_string(), Value::from(version.as_u64()));

        let bytes = serde_json::to_vec(&document)
            .map_err(|e| SyncError::Internal(format!("document serialization: {}", e)))?;
        persist(self.path, &bytes).await?;

        *self.last_version = version;
        debug!("Persisted version {} ({} bytes)", version, bytes.len());
        Ok(version)
    }
}

/// Parse a write body
///
/// Anything other than a JSON object is rejected.
pub fn parse_document(raw: &[u8]) -> Result<Document> {
    match serde_json::from_slice::<Value>(raw)? {
        Value::Object(document) => Ok(document),
        other => Err(SyncError::InvalidPayload(format!(
            "expected a JSON object, got {}",
            json_kind(&other)
        ))),
    }
}

/// Wall-clock milliseconds, bumped past `last` when the clock has not moved on
fn next_version(last: Version, now_ms: u64) -> Version {
    Version(now_ms.max(last.as_u64().saturating_add(1)))
}

fn now_millis() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
}

fn stored_version(raw: &[u8]) -> Option<Version> {
    serde_json::from_slice::<Value>(raw)
        .ok()
        .and_then(|value| value.get(VERSION_KEY).and_then(Value::as_u64))
        .map(Version)
}

/// Write to a sibling temp file, then rename over the document
async fn persist(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = temp_path(path);
    tokio::fs::write(&tmp, bytes).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e);
    }
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    async fn open_temp() -> (TempDir, Store) {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path().join("data.json")).await;
        (dir, store)
    }

    fn read_json(bytes: &[u8]) -> Value {
        serde_json::from_slice(bytes).unwrap()
    }

    #[tokio::test]
    async fn test_read_missing_is_empty_object() {
        let (_dir, store) = open_temp().await;
        assert_eq!(&store.read().await[..], b"{}");
        assert_eq!(store.last_version().await, Version(0));
    }

    #[tokio::test]
    async fn test_write_then_read_adds_version() {
        let (_dir, store) = open_temp().await;
        let version = store.write(br#"{"chores":[],"owner":"sam"}"#).await.unwrap();

        let stored = read_json(&store.read().await);
        assert_eq!(
            stored,
            json!({"chores": [], "owner": "sam", "_version": version.as_u64()})
        );
        assert_eq!(store.last_version().await, version);
    }

    #[tokio::test]
    async fn test_versions_strictly_increase() {
        let (_dir, store) = open_temp().await;
        let mut last = Version(0);
        for i in 0..20 {
            let version = store.write(format!(r#"{{"n":{}}}"#, i).as_bytes()).await.unwrap();
            assert!(version > last, "{} should exceed {}", version, last);
            last = version;
        }
    }

    #[tokio::test]
    async fn test_invalid_write_leaves_document_unchanged() {
        let (_dir, store) = open_temp().await;
        store.write(br#"{"a":1}"#).await.unwrap();
        let before = store.read().await;
        let version_before = store.last_version().await;

        assert!(matches!(
            store.write(b"not json").await,
            Err(SyncError::InvalidPayload(_))
        ));
        assert!(matches!(
            store.write(b"[1,2]").await,
            Err(SyncError::InvalidPayload(_))
        ));

        assert_eq!(store.read().await, before);
        assert_eq!(store.last_version().await, version_before);
    }

    #[tokio::test]
    async fn test_write_replaces_whole_document() {
        let (_dir, store) = open_temp().await;
        store.write(br#"{"a":1,"b":2}"#).await.unwrap();
        let version = store.write(br#"{"c":3}"#).await.unwrap();

        assert_eq!(
            read_json(&store.read().await),
            json!({"c": 3, "_version": version.as_u64()})
        );
    }

    #[tokio::test]
    async fn test_client_version_field_is_overwritten() {
        let (_dir, store) = open_temp().await;
        let version = store.write(br#"{"_version": 1}"#).await.unwrap();
        assert!(version.as_u64() > 1);
        assert_eq!(read_json(&store.read().await)["_version"], json!(version.as_u64()));
    }

    #[tokio::test]
    async fn test_reads_are_idempotent() {
        let (_dir, store) = open_temp().await;
        store.write(br#"{"x":[1,2,3]}"#).await.unwrap();
        assert_eq!(store.read().await, store.read().await);
    }

    #[tokio::test]
    async fn test_reopen_seeds_version_clock() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.json");
        let future = Version(u64::MAX / 2);
        std::fs::write(&path, format!(r#"{{"_version":{}}}"#, future)).unwrap();

        let store = Store::open(&path).await;
        assert_eq!(store.last_version().await, future);
        let version = store.write(b"{}").await.unwrap();
        assert_eq!(version, Version(future.as_u64() + 1));
    }

    #[tokio::test]
    async fn test_write_failure_is_storage_error() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path().join("missing-dir").join("data.json")).await;

        let err = store.write(br#"{"a":1}"#).await.unwrap_err();
        assert!(matches!(err, SyncError::Storage(_)));
        assert_eq!(store.last_version().await, Version(0));
        assert_eq!(&store.read().await[..], b"{}");
    }

    #[tokio::test]
    async fn test_open_unparseable_file_starts_at_zero() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.json");
        std::fs::write(&path, b"{ truncated").unwrap();

        let store = Store::open(&path).await;
        assert_eq!(store.last_version().await, Version(0));
        // Reads still serve the bytes on disk
        assert_eq!(&store.read().await[..], b"{ truncated");

        let version = store.write(br#"{"a":1}"#).await.unwrap();
        assert!(version > Version(0));
    }

    #[test]
    fn test_stored_version() {
        assert_eq!(stored_version(br#"{"_version":7}"#), Some(Version(7)));
        assert_eq!(stored_version(br#"{"chores":[]}"#), None);
        assert_eq!(stored_version(b"not json"), None);
    }

    #[test]
    fn test_next_version() {
        assert_eq!(next_version(Version(0), 1_000), Version(1_000));
        assert_eq!(next_version(Version(1_000), 1_000), Version(1_001));
        assert_eq!(next_version(Version(5_000), 1_000), Version(5_001));
    }

    #[test]
    fn test_temp_path_is_sibling() {
        let tmp = temp_path(Path::new("/var/lib/chores/data.json"));
        assert_eq!(tmp, PathBuf::from("/var/lib/chores/data.json.tmp"));
    }
}
