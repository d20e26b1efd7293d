//! Abstract durable key-value store over `Request` objects (§4.1).

pub mod in_memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::request::{AnyRequest, RequestFilter, RequestId, SortKey, SortOrder};

pub use in_memory::InMemoryRequestStore;

/// Which requests a `revoke` call targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevokeTarget {
    One(RequestId),
    All,
}

/// A durable store of `Request` records, keyed by `id`.
///
/// `add` and `revoke` are atomic compare-and-set on `id`; `update` is
/// last-writer-wins; listing is eventually consistent under concurrent writers.
/// Implementations that talk to an unavailable backend surface
/// `Error::ServiceUnavailable`, which the broker and worker treat as retriable.
#[async_trait]
pub trait RequestStore: Send + Sync {
    /// Inserts a new record. Fails with `Conflict` if `r.id()` is already present.
    async fn add(&self, request: AnyRequest) -> Result<()>;

    /// Returns the record for `id`, or `None` if absent.
    async fn get(&self, id: RequestId) -> Result<Option<AnyRequest>>;

    /// Filters, then optionally sorts and limits. `sort` names at most one key and
    /// direction; the caller is responsible for not asking for both directions at
    /// once (there's only one `SortOrder` slot to begin with).
    async fn get_many(
        &self,
        filter: RequestFilter,
        sort: Option<(SortKey, SortOrder)>,
        limit: Option<usize>,
    ) -> Result<Vec<AnyRequest>>;

    /// Replaces the record for `request.id()`, bumping `last_modified` to now.
    /// Fails with `NotFound` if absent.
    async fn update(&self, request: AnyRequest) -> Result<()>;

    /// Deletes `id`. Fails with `NotFound` if absent.
    async fn remove(&self, id: RequestId) -> Result<()>;

    /// Atomically deletes request(s) owned by `user` whose status is WAITING or
    /// QUEUED. `RevokeTarget::All` deletes every matching request owned by `user`
    /// and returns the count; `RevokeTarget::One` returns 1 on success or fails
    /// distinguishing `NotFound` (no such id), `Unauthorized` (no authenticated
    /// user), and `Forbidden` (exists but owned by someone else, or not in a
    /// revocable status).
    async fn revoke(&self, user: Uuid, target: RevokeTarget) -> Result<usize>;

    /// Bulk-deletes terminal requests with `last_modified < cutoff`. Returns the
    /// count removed.
    async fn remove_old(&self, cutoff: DateTime<Utc>) -> Result<usize>;

    /// All non-terminal requests (`status ∉ {PROCESSED, FAILED}`).
    async fn get_active(&self) -> Result<Vec<AnyRequest>>;
}
