//! The request entity and its typestate-enforced lifecycle (§3, §4.2).

mod transitions;
mod types;

pub use transitions::force_failed;
pub use types::{
    Attributes, AnyRequest, Failed, Processed, Processing, Queued, Request, RequestData,
    RequestFilter, RequestId, RequestState, SortKey, SortOrder, Status, Uploading, Verb, Waiting,
};
