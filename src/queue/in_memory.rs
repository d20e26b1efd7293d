//! In-memory reference implementation of `Queue`.
//!
//! Visibility timeouts are checked lazily on `dequeue` and `count` rather than
//! with a background sweeper: an in-flight message past its deadline is treated
//! as abandoned and moved back to the front of the pending list before either
//! call does its real work.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::request::RequestId;

use super::{Queue, QueueMessage};

struct InFlight {
    message: QueueMessage,
    delivered_at: chrono::DateTime<Utc>,
}

struct State {
    pending: VecDeque<QueueMessage>,
    in_flight: Vec<InFlight>,
    closed: bool,
}

pub struct InMemoryQueue {
    state: Arc<Mutex<State>>,
    visibility_timeout: Duration,
}

impl InMemoryQueue {
    pub fn new(visibility_timeout: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                pending: VecDeque::new(),
                in_flight: Vec::new(),
                closed: false,
            })),
            visibility_timeout,
        }
    }

    /// Moves any in-flight message past the visibility timeout back to pending.
    fn reclaim_expired(&self, state: &mut State) {
        let now = Utc::now();
        let timeout = chrono::Duration::from_std(self.visibility_timeout)
            .unwrap_or_else(|_| chrono::Duration::seconds(30));
        let expired: Vec<usize> = state
            .in_flight
            .iter()
            .enumerate()
            .filter(|(_, f)| now - f.delivered_at >= timeout)
            .map(|(i, _)| i)
            .collect();
        for i in expired.into_iter().rev() {
            let reclaimed = state.in_flight.remove(i);
            state.pending.push_front(reclaimed.message);
        }
    }
}

impl Default for InMemoryQueue {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[async_trait]
impl Queue for InMemoryQueue {
    async fn enqueue(&self, request_id: RequestId) -> Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(Error::ServiceUnavailable("queue is closed".to_string()));
        }
        state.pending.push_back(QueueMessage {
            message_id: Uuid::new_v4(),
            request_id,
        });
        Ok(())
    }

    async fn dequeue(&self) -> Result<Option<QueueMessage>> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(Error::ServiceUnavailable("queue is closed".to_string()));
        }
        self.reclaim_expired(&mut state);
        let Some(message) = state.pending.pop_front() else {
            return Ok(None);
        };
        state.in_flight.push(InFlight {
            message,
            delivered_at: Utc::now(),
        });
        Ok(Some(message))
    }

    async fn ack(&self, message_id: Uuid) -> Result<()> {
        let mut state = self.state.lock();
        let before = state.in_flight.len();
        state.in_flight.retain(|f| f.message.message_id != message_id);
        if state.in_flight.len() == before {
            return Err(Error::NotFound(format!("no in-flight message {message_id}")));
        }
        Ok(())
    }

    async fn nack(&self, message_id: Uuid) -> Result<()> {
        let mut state = self.state.lock();
        let Some(pos) = state
            .in_flight
            .iter()
            .position(|f| f.message.message_id == message_id)
        else {
            return Err(Error::NotFound(format!("no in-flight message {message_id}")));
        };
        let reclaimed = state.in_flight.remove(pos);
        state.pending.push_front(reclaimed.message);
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        let mut state = self.state.lock();
        self.reclaim_expired(&mut state);
        Ok(state.pending.len() + state.in_flight.len())
    }

    async fn keep_alive(&self, message_id: Uuid) -> Result<()> {
        let mut state = self.state.lock();
        let now = Utc::now();
        let Some(f) = state
            .in_flight
            .iter_mut()
            .find(|f| f.message.message_id == message_id)
        else {
            return Err(Error::NotFound(format!("no in-flight message {message_id}")));
        };
        f.delivered_at = now;
        Ok(())
    }

    async fn heartbeat(&self) -> Result<()> {
        if self.state.lock().closed {
            return Err(Error::ServiceUnavailable("queue is closed".to_string()));
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.state.lock().closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dequeue_then_ack_removes_message() {
        let queue = InMemoryQueue::default();
        let id = RequestId::new_v4();
        queue.enqueue(id).await.unwrap();

        let msg = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(msg.request_id, id);
        assert_eq!(queue.count().await.unwrap(), 1);

        queue.ack(msg.message_id).await.unwrap();
        assert_eq!(queue.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn nack_makes_message_immediately_redeliverable() {
        let queue = InMemoryQueue::default();
        let id = RequestId::new_v4();
        queue.enqueue(id).await.unwrap();

        let msg = queue.dequeue().await.unwrap().unwrap();
        queue.nack(msg.message_id).await.unwrap();

        let redelivered = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(redelivered.request_id, id);
    }

    #[tokio::test]
    async fn expired_visibility_timeout_redelivers() {
        let queue = InMemoryQueue::new(Duration::from_millis(10));
        let id = RequestId::new_v4();
        queue.enqueue(id).await.unwrap();
        queue.dequeue().await.unwrap().unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        let redelivered = queue.dequeue().await.unwrap();
        assert!(redelivered.is_some());
    }

    #[tokio::test]
    async fn keep_alive_prevents_redelivery() {
        let queue = InMemoryQueue::new(Duration::from_millis(30));
        let id = RequestId::new_v4();
        queue.enqueue(id).await.unwrap();
        let msg = queue.dequeue().await.unwrap().unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.keep_alive(msg.message_id).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(queue.dequeue().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn closed_queue_rejects_new_operations() {
        let queue = InMemoryQueue::default();
        queue.close().await.unwrap();
        assert!(matches!(
            queue.enqueue(RequestId::new_v4()).await,
            Err(Error::ServiceUnavailable(_))
        ));
        assert!(matches!(queue.heartbeat().await, Err(Error::ServiceUnavailable(_))));
    }
}
