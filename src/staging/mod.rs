//! Object storage for staged artefacts (§3, §4.7).
//!
//! A staging object is addressed by a key derived from the owning request's
//! `id`, optionally suffixed with a mime-type extension (§4.7's object-key
//! policy). Staging is exclusively owned by its request: no two requests share
//! staging space.

pub mod in_memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::request::RequestId;

pub use in_memory::InMemoryStaging;

/// Metadata about a staged object, without its bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceInfo {
    pub name: String,
    pub size: u64,
    pub content_type: String,
    pub last_modified: DateTime<Utc>,
}

/// An object store keyed by staging object name (§4.7's `"{request.id}.{ext}"`
/// policy). Implementations of the real backends are out of scope; only the
/// contract and an in-memory reference implementation live here.
#[async_trait]
pub trait Staging: Send + Sync {
    /// Stores `data` under `key`, recording `content_type` for later `stat`/`get_url`.
    async fn create(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<()>;

    /// Reads the full contents of `key`. Fails with `NotFound` if absent.
    async fn read(&self, key: &str) -> Result<Vec<u8>>;

    /// Deletes `key`. Fails with `NotFound` if absent.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Lists every stored key's metadata.
    async fn list(&self) -> Result<Vec<ResourceInfo>>;

    /// Metadata for a single key, without reading its bytes.
    async fn stat(&self, key: &str) -> Result<ResourceInfo>;

    /// An externally resolvable URL for `key` (used by the frontend's download
    /// redirect and the PROCESSED `url` field).
    async fn get_url(&self, key: &str) -> Result<String>;

    /// Deletes every stored object. Used by tests and by operators resetting a
    /// deployment; never called by the broker, worker, or GC.
    async fn wipe(&self) -> Result<()>;
}

/// Derives the request id a staging key belongs to, by stripping a trailing
/// `.{ext}` suffix if present. Used by the GC's dangling-object sweep (§4.7):
/// an object's key never causes a live request to look dangling just because it
/// carries an extension.
pub fn request_id_for_key(key: &str) -> Option<RequestId> {
    let stem = key.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(key);
    stem.parse().ok()
}

/// Builds the staging key for a request's result, per §4.7's object-key policy.
pub fn staging_key(id: RequestId, mime_type: &str) -> String {
    match extension_for_mime_type(mime_type) {
        Some(ext) => format!("{id}.{ext}"),
        None => id.to_string(),
    }
}

fn extension_for_mime_type(mime_type: &str) -> Option<&'static str> {
    match mime_type {
        "text" | "text/plain" => Some("txt"),
        "application/json" => Some("json"),
        "application/octet-stream" => Some("bin"),
        "application/x-grib" => Some("grib"),
        "application/x-netcdf" => Some("nc"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_id_for_key_strips_known_extension() {
        let id = RequestId::new_v4();
        let key = staging_key(id, "text");
        assert_eq!(request_id_for_key(&key), Some(id));
    }

    #[test]
    fn request_id_for_key_handles_bare_id() {
        let id = RequestId::new_v4();
        let key = staging_key(id, "application/unknown");
        assert_eq!(key, id.to_string());
        assert_eq!(request_id_for_key(&key), Some(id));
    }
}
