//! A durable at-least-once message channel carrying request ids (§4.3).

pub mod in_memory;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::request::RequestId;

pub use in_memory::InMemoryQueue;

/// The envelope a consumer receives from `dequeue`: enough to look up the live
/// record in the store, plus a `message_id` used to `ack`/`nack`/`keep_alive` it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueMessage {
    pub message_id: Uuid,
    pub request_id: RequestId,
}

/// Exactly one consumer receives each delivered message between `dequeue` and
/// `ack`/`nack`. Unacknowledged messages become eligible for redelivery after a
/// bounded visibility timeout. Worker prefetch is exactly one: a worker never
/// holds more than one undelivered message at a time.
#[async_trait]
pub trait Queue: Send + Sync {
    /// Appends a new message for `request_id`.
    async fn enqueue(&self, request_id: RequestId) -> Result<()>;

    /// Delivers the oldest eligible message, if any, marking it in-flight.
    async fn dequeue(&self) -> Result<Option<QueueMessage>>;

    /// Confirms successful processing; removes the message permanently.
    async fn ack(&self, message_id: Uuid) -> Result<()>;

    /// Returns the message to the queue for immediate redelivery.
    async fn nack(&self, message_id: Uuid) -> Result<()>;

    /// Approximate count of messages not yet ack'd (pending + in-flight).
    async fn count(&self) -> Result<usize>;

    /// Extends the visibility timeout of an in-flight message, for consumers
    /// doing long-running work between `dequeue` and `ack`/`nack`.
    async fn keep_alive(&self, message_id: Uuid) -> Result<()>;

    /// Cooperative liveness check; fails with `ServiceUnavailable` if the queue
    /// backend is unreachable.
    async fn heartbeat(&self) -> Result<()>;

    /// Releases backend resources. No further operations are valid afterwards.
    async fn close(&self) -> Result<()>;
}
