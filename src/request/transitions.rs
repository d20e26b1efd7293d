//! State transitions for the request lifecycle (§4.2).
//!
//! These methods are pure: they consume `self` and produce the next state plus a
//! bumped `last_modified`, but do not talk to a store or queue. Callers (the
//! broker, the worker, the frontend adapter) persist the result themselves — this
//! keeps `request` a dependency-free leaf that `store`, `queue`, `broker`, and
//! `worker` all build on rather than the other way around.

use chrono::Utc;

use super::types::{AnyRequest, Failed, Processed, Processing, Queued, Request, Uploading, Waiting};

impl Request<Uploading> {
    /// Upload finished: the frontend populated `url` (and `md5`, if checked) on
    /// `data` before calling this.
    pub fn upload_complete(mut self) -> Request<Waiting> {
        self.data.last_modified = Utc::now();
        Request {
            data: self.data,
            state: Waiting {},
        }
    }
}

impl Request<Waiting> {
    /// The broker admitted this request under the current quota evaluation.
    pub fn admit(mut self) -> Request<Queued> {
        let now = Utc::now();
        self.data.last_modified = now;
        Request {
            data: self.data,
            state: Queued { queued_at: now },
        }
    }
}

impl Request<Queued> {
    /// A worker dequeued the message and is about to dispatch it.
    pub fn dequeue(mut self) -> Request<Processing> {
        let now = Utc::now();
        self.data.last_modified = now;
        Request {
            data: self.data,
            state: Processing { started_at: now },
        }
    }

    /// Stuck-request recovery (§4.4 step 5): the broker observed this request
    /// active with an empty queue and is resetting it back to WAITING.
    pub fn reset_to_waiting(mut self) -> Request<Waiting> {
        self.data.append_message("request appears stuck; re-queuing");
        self.data.last_modified = Utc::now();
        Request {
            data: self.data,
            state: Waiting {},
        }
    }

    /// The broker admitted this request but the queue rejected the enqueue
    /// (§4.4 step 6): revert so the request is not lost.
    pub fn revert_to_waiting(mut self) -> Request<Waiting> {
        self.data.last_modified = Utc::now();
        Request {
            data: self.data,
            state: Waiting {},
        }
    }
}

impl Request<Processing> {
    /// A data source matched and dispatched successfully.
    pub fn complete_success(mut self) -> Request<Processed> {
        let now = Utc::now();
        self.data.last_modified = now;
        Request {
            data: self.data,
            state: Processed { completed_at: now },
        }
    }

    /// No data source matched and succeeded; `reason` is the aggregated
    /// rejection/failure trace (§4.5.1 steps 3-4).
    pub fn complete_failure(mut self, reason: impl AsRef<str>) -> Request<Failed> {
        self.data.append_message(reason);
        let now = Utc::now();
        self.data.last_modified = now;
        Request {
            data: self.data,
            state: Failed { failed_at: now },
        }
    }

    /// Worker shutdown mid-processing (§4.5 cancellation, §5): reschedule for
    /// redelivery rather than lose the work.
    pub fn reschedule(mut self) -> Request<Queued> {
        self.data.append_message("worker shutting down; request rescheduled");
        let now = Utc::now();
        self.data.last_modified = now;
        Request {
            data: self.data,
            state: Queued { queued_at: now },
        }
    }

    /// A worker observed this request as PROCESSING on dequeue (a prior worker
    /// crashed mid-flight): §4.5 step 2 marks it FAILED rather than retrying, since
    /// at-most-once execution per message can't tell whether the prior attempt's
    /// side effects already landed.
    pub fn fail_as_crashed(self) -> Request<Failed> {
        self.complete_failure("worker crashed while processing this request")
    }

    /// Stuck-request recovery (§4.4 step 5): the broker found this request active
    /// with an empty queue, meaning the worker that claimed it is gone.
    pub fn reset_to_waiting(mut self) -> Request<Waiting> {
        self.data.append_message("request appears stuck; re-queuing");
        self.data.last_modified = Utc::now();
        Request {
            data: self.data,
            state: Waiting {},
        }
    }
}

/// Forces any request, regardless of its current state, straight to FAILED.
/// Used only by the worker when it dequeues a message for a request whose store
/// record is not QUEUED (§4.5 step 2) — that mismatch already means a prior
/// worker crashed mid-flight, an invariant violation the ordinary typestate
/// transitions have no path for since they each start from one specific state.
pub fn force_failed(request: AnyRequest, message: impl AsRef<str>) -> Request<Failed> {
    let mut data = match request {
        AnyRequest::Waiting(r) => r.data,
        AnyRequest::Uploading(r) => r.data,
        AnyRequest::Queued(r) => r.data,
        AnyRequest::Processing(r) => r.data,
        AnyRequest::Processed(r) => r.data,
        AnyRequest::Failed(r) => r.data,
    };
    data.append_message(message);
    let now = Utc::now();
    data.last_modified = now;
    Request {
        data,
        state: Failed { failed_at: now },
    }
}
