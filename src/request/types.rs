//! Core types for the request-lifecycle engine.
//!
//! Each request progresses through the state machine in one direction at a time,
//! enforced at compile time via the typestate pattern: `Request<T>` only exposes the
//! transitions valid for `T`, so a caller cannot accidentally process a `Waiting`
//! request or re-complete a `Processed` one.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::user::User;

/// Marker trait for valid request states.
pub trait RequestState: Send + Sync {}

/// A request to be processed by the brokering system.
///
/// The generic parameter `T` marks which node of the state machine the request is
/// currently at; `data` carries the fields common to every state.
#[derive(Debug, Clone)]
pub struct Request<T: RequestState> {
    pub state: T,
    pub data: RequestData,
}

/// One of the two operations a request can perform against a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verb {
    Retrieve,
    Archive,
}

/// Fields shared across every state of a request's lifetime.
#[derive(Debug, Clone)]
pub struct RequestData {
    pub id: RequestId,
    pub timestamp: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    pub user: User,
    pub verb: Verb,
    pub collection: String,
    pub user_request: Value,
    pub user_message: String,
    pub url: Option<String>,
    pub content_length: Option<u64>,
    pub content_type: Option<String>,
    pub md5: Option<String>,
}

impl RequestData {
    /// Builds the data for a freshly submitted request. `status` is determined by
    /// the caller (§3: ARCHIVE begins UPLOADING unless `url` is already populated).
    pub fn new(
        user: User,
        verb: Verb,
        collection: impl Into<String>,
        user_request: Value,
        url: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            timestamp: now,
            last_modified: now,
            user,
            verb,
            collection: collection.into(),
            user_request,
            user_message: String::new(),
            url,
            content_length: None,
            content_type: None,
            md5: None,
        }
    }

    /// Appends a line to the append-only trace log surfaced to the caller.
    pub fn append_message(&mut self, line: impl AsRef<str>) {
        if !self.user_message.is_empty() {
            self.user_message.push('\n');
        }
        self.user_message.push_str(line.as_ref());
    }
}

/// Opaque identifier assigned at creation; immutable thereafter.
pub type RequestId = Uuid;

// ============================================================================
// States
// ============================================================================

/// Newly created, or returned here after an upload completes. Eligible for
/// admission by the broker.
#[derive(Debug, Clone, Copy)]
pub struct Waiting {}
impl RequestState for Waiting {}

/// An ARCHIVE request with no pre-existing URL: waiting on the frontend to finish
/// the upload before it can be considered for admission.
#[derive(Debug, Clone, Copy)]
pub struct Uploading {}
impl RequestState for Uploading {}

/// Admitted by the broker, sitting in the queue awaiting a worker.
#[derive(Debug, Clone)]
pub struct Queued {
    pub queued_at: DateTime<Utc>,
}
impl RequestState for Queued {}

/// Claimed by a worker and actively being dispatched against a data source.
#[derive(Debug, Clone)]
pub struct Processing {
    pub started_at: DateTime<Utc>,
}
impl RequestState for Processing {}

/// Terminal: the data source produced (or, for ARCHIVE, stored) a result.
#[derive(Debug, Clone)]
pub struct Processed {
    pub completed_at: DateTime<Utc>,
}
impl RequestState for Processed {}

/// Terminal: no data source matched and succeeded.
#[derive(Debug, Clone)]
pub struct Failed {
    pub failed_at: DateTime<Utc>,
}
impl RequestState for Failed {}

/// The status tag used for storage filtering, queue envelopes, and API responses
/// where the concrete state type isn't in scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Waiting,
    Uploading,
    Queued,
    Processing,
    Processed,
    Failed,
}

// ============================================================================
// Unified representation
// ============================================================================

/// A request in any state, for storage and for listing/filtering where the caller
/// doesn't know (or care) which node of the state machine it currently occupies.
#[derive(Debug, Clone)]
pub enum AnyRequest {
    Waiting(Request<Waiting>),
    Uploading(Request<Uploading>),
    Queued(Request<Queued>),
    Processing(Request<Processing>),
    Processed(Request<Processed>),
    Failed(Request<Failed>),
}

impl AnyRequest {
    pub fn id(&self) -> RequestId {
        self.data().id
    }

    pub fn data(&self) -> &RequestData {
        match self {
            AnyRequest::Waiting(r) => &r.data,
            AnyRequest::Uploading(r) => &r.data,
            AnyRequest::Queued(r) => &r.data,
            AnyRequest::Processing(r) => &r.data,
            AnyRequest::Processed(r) => &r.data,
            AnyRequest::Failed(r) => &r.data,
        }
    }

    pub fn status(&self) -> Status {
        match self {
            AnyRequest::Waiting(_) => Status::Waiting,
            AnyRequest::Uploading(_) => Status::Uploading,
            AnyRequest::Queued(_) => Status::Queued,
            AnyRequest::Processing(_) => Status::Processing,
            AnyRequest::Processed(_) => Status::Processed,
            AnyRequest::Failed(_) => Status::Failed,
        }
    }

    /// PROCESSED and FAILED are terminal (§3, §4.2): only the GC may delete them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, AnyRequest::Processed(_) | AnyRequest::Failed(_))
    }

    /// `active = status ∉ {PROCESSED, FAILED}` (§4.4.1's resolution of the source's
    /// ambiguous `get_active_requests()`).
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    pub fn as_waiting(&self) -> Option<&Request<Waiting>> {
        match self {
            AnyRequest::Waiting(r) => Some(r),
            _ => None,
        }
    }

    pub fn into_waiting(self) -> Option<Request<Waiting>> {
        match self {
            AnyRequest::Waiting(r) => Some(r),
            _ => None,
        }
    }

    pub fn into_queued(self) -> Option<Request<Queued>> {
        match self {
            AnyRequest::Queued(r) => Some(r),
            _ => None,
        }
    }

    pub fn into_processing(self) -> Option<Request<Processing>> {
        match self {
            AnyRequest::Processing(r) => Some(r),
            _ => None,
        }
    }
}

impl From<Request<Waiting>> for AnyRequest {
    fn from(r: Request<Waiting>) -> Self {
        AnyRequest::Waiting(r)
    }
}

impl From<Request<Uploading>> for AnyRequest {
    fn from(r: Request<Uploading>) -> Self {
        AnyRequest::Uploading(r)
    }
}

impl From<Request<Queued>> for AnyRequest {
    fn from(r: Request<Queued>) -> Self {
        AnyRequest::Queued(r)
    }
}

impl From<Request<Processing>> for AnyRequest {
    fn from(r: Request<Processing>) -> Self {
        AnyRequest::Processing(r)
    }
}

impl From<Request<Processed>> for AnyRequest {
    fn from(r: Request<Processed>) -> Self {
        AnyRequest::Processed(r)
    }
}

impl From<Request<Failed>> for AnyRequest {
    fn from(r: Request<Failed>) -> Self {
        AnyRequest::Failed(r)
    }
}

/// A sort key for `RequestStore::get_many` (§4.1): any scalar field, either
/// direction, never both at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Timestamp,
    LastModified,
    ContentLength,
    Id,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// A filter passed to `RequestStore::get_many`; every field is optional and
/// unset fields match everything (§4.1: "any subset of {status, user,
/// collection, content_length, id}").
#[derive(Debug, Clone, Default)]
pub struct RequestFilter {
    pub status: Option<Status>,
    pub user: Option<Uuid>,
    pub collection: Option<String>,
    pub id: Option<RequestId>,
    pub content_length: Option<u64>,
    pub verb: Option<Verb>,
}

impl RequestFilter {
    pub fn matches(&self, r: &AnyRequest) -> bool {
        if let Some(status) = self.status {
            if r.status() != status {
                return false;
            }
        }
        if let Some(user) = self.user {
            if r.data().user.id() != user {
                return false;
            }
        }
        if let Some(collection) = &self.collection {
            if &r.data().collection != collection {
                return false;
            }
        }
        if let Some(id) = self.id {
            if r.id() != id {
                return false;
            }
        }
        if let Some(content_length) = self.content_length {
            if r.data().content_length != Some(content_length) {
                return false;
            }
        }
        if let Some(verb) = self.verb {
            if r.data().verb != verb {
                return false;
            }
        }
        true
    }
}

pub type Attributes = HashMap<String, String>;
