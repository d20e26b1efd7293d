//! The periodic admission scheduler (§4.4).

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, instrument, warn};

use crate::collection::Collection;
use crate::error::Result;
use crate::queue::Queue;
use crate::request::{AnyRequest, RequestFilter, SortKey, SortOrder, Status};
use crate::store::RequestStore;

#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub interval: Duration,
    pub max_queue_size: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_queue_size: 100,
        }
    }
}

pub struct Broker<S: RequestStore, Q: Queue> {
    store: Arc<S>,
    queue: Arc<Q>,
    collections: Arc<HashMap<String, Collection>>,
    config: BrokerConfig,
}

impl<S: RequestStore + 'static, Q: Queue + 'static> Broker<S, Q> {
    pub fn new(store: Arc<S>, queue: Arc<Q>, collections: Arc<HashMap<String, Collection>>, config: BrokerConfig) -> Self {
        Self {
            store,
            queue,
            collections,
            config,
        }
    }

    /// Runs the admission loop until `shutdown` resolves.
    #[instrument(skip_all)]
    pub async fn run(&self, shutdown: impl Future<Output = ()>) -> Result<()> {
        tokio::pin!(shutdown);
        let mut interval = tokio::time::interval(self.config.interval);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("broker shutting down");
                    return Ok(());
                }
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        warn!(error = %e, "broker tick failed, retrying next interval");
                    }
                }
            }
        }
    }

    /// One scan/admit cycle (§4.4's numbered steps).
    #[instrument(skip(self))]
    pub async fn tick(&self) -> Result<()> {
        if self.queue.heartbeat().await.is_err() {
            warn!("queue heartbeat failed; skipping this tick");
            return Ok(());
        }

        let queue_count = self.queue.count().await?;
        if queue_count >= self.config.max_queue_size {
            debug!(queue_count, max = self.config.max_queue_size, "queue full; skipping this tick");
            return Ok(());
        }

        let mut waiting = self
            .store
            .get_many(
                RequestFilter {
                    status: Some(Status::Waiting),
                    ..Default::default()
                },
                Some((SortKey::Timestamp, SortOrder::Ascending)),
                None,
            )
            .await?;

        let active = self.store.get_active().await?;
        // Only QUEUED/PROCESSING requests count against quota (§4.4.1): the
        // candidates themselves, and any still-WAITING siblings, are not yet
        // admitted and must not count against their own admission.
        let active: Vec<AnyRequest> = active
            .into_iter()
            .filter(|r| matches!(r.status(), Status::Queued | Status::Processing))
            .collect();
        let mut active = self.recover_stuck_requests(queue_count, active, &mut waiting).await?;

        debug!(waiting = waiting.len(), active = active.len(), "evaluating admission");

        let mut admitted = 0usize;
        let mut remaining_capacity = self.config.max_queue_size.saturating_sub(queue_count);

        for request in waiting {
            if remaining_capacity == 0 {
                break;
            }
            let collection = self.collections.get(&request.data().collection);
            let admit = match collection {
                Some(collection) => quota_admits(collection, &request, &active),
                None => {
                    warn!(collection = %request.data().collection, "unknown collection; rejecting admission");
                    false
                }
            };
            if !admit {
                continue;
            }

            let Some(waiting_request) = request.into_waiting() else {
                continue;
            };
            let id = waiting_request.data.id;
            let queued = AnyRequest::Queued(waiting_request.admit());

            self.store.update(queued.clone()).await?;
            if let Err(e) = self.queue.enqueue(id).await {
                warn!(request_id = %id, error = %e, "enqueue failed; reverting to WAITING");
                if let AnyRequest::Queued(q) = queued {
                    self.store.update(AnyRequest::Waiting(q.revert_to_waiting())).await?;
                }
                continue;
            }

            info!(request_id = %id, "admitted request to queue");
            active.push(queued);
            admitted += 1;
            remaining_capacity -= 1;
        }

        debug!(admitted, "tick complete");
        Ok(())
    }

    /// §4.4 step 5: if the queue is empty but active requests exist, they were
    /// orphaned by a crashed worker (QUEUED messages the worker never claimed, or
    /// PROCESSING requests whose worker died). Reset them to WAITING, prepend to
    /// the waiting list in their original order, and treat `active` as empty.
    ///
    /// UPLOADING requests are deliberately excluded: they are owned by the
    /// frontend's upload flow, not by the broker or worker, so an empty queue says
    /// nothing about whether they're stuck.
    async fn recover_stuck_requests(
        &self,
        queue_count: usize,
        active: Vec<AnyRequest>,
        waiting: &mut Vec<AnyRequest>,
    ) -> Result<Vec<AnyRequest>> {
        if queue_count != 0 {
            return Ok(active);
        }

        let mut recovered = Vec::new();
        let mut still_active = Vec::new();
        for request in active {
            match request {
                AnyRequest::Queued(q) => {
                    error!(request_id = %q.data.id, "request appears stuck; re-queuing");
                    let waiting_request = AnyRequest::Waiting(q.reset_to_waiting());
                    self.store.update(waiting_request.clone()).await?;
                    recovered.push(waiting_request);
                }
                AnyRequest::Processing(p) => {
                    error!(request_id = %p.data.id, "request appears stuck; re-queuing");
                    let waiting_request = AnyRequest::Waiting(p.reset_to_waiting());
                    self.store.update(waiting_request.clone()).await?;
                    recovered.push(waiting_request);
                }
                other => still_active.push(other),
            }
        }

        if !recovered.is_empty() {
            recovered.sort_by_key(|r| r.data().timestamp);
            recovered.append(waiting);
            *waiting = recovered;
        }

        Ok(still_active)
    }
}

/// §4.4.1's quota evaluation for a single candidate against the active set.
fn quota_admits(collection: &Collection, candidate: &AnyRequest, active: &[AnyRequest]) -> bool {
    let same_collection = |r: &&AnyRequest| r.data().collection == candidate.data().collection;

    if let Some(total) = collection.limits.total {
        let count = active.iter().filter(same_collection).count();
        if count >= total {
            return false;
        }
    }

    let user = &candidate.data().user;
    if let Some(cap) = collection.limits.per_user_cap(user.realm(), &user.roles) {
        let count = active
            .iter()
            .filter(same_collection)
            .filter(|r| r.data().user.id() == user.id())
            .count();
        if count >= cap {
            return false;
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde_json::json;

    use super::*;
    use crate::collection::CollectionLimits;
    use crate::coercion::CoercionConfig;
    use crate::queue::InMemoryQueue;
    use crate::request::{Request, RequestData, Verb, Waiting};
    use crate::store::InMemoryRequestStore;
    use crate::user::User;

    fn debug_collection(limits: CollectionLimits) -> Collection {
        Collection {
            name: "debug".to_string(),
            datasources: Vec::new(),
            roles: HashMap::new(),
            limits,
            coercion: CoercionConfig::default(),
        }
    }

    fn waiting(user: &User, collection: &str) -> AnyRequest {
        AnyRequest::Waiting(Request {
            data: RequestData::new(user.clone(), Verb::Retrieve, collection, json!({}), None),
            state: Waiting {},
        })
    }

    #[tokio::test]
    async fn admits_under_quota_and_enqueues() {
        let store = Arc::new(InMemoryRequestStore::new());
        let queue = Arc::new(InMemoryQueue::default());
        let mut collections = HashMap::new();
        collections.insert("debug".to_string(), debug_collection(CollectionLimits::default()));

        let user = User::new("alice", "ecmwf");
        let request = waiting(&user, "debug");
        store.add(request).await.unwrap();

        let broker = Broker::new(store.clone(), queue.clone(), Arc::new(collections), BrokerConfig::default());
        broker.tick().await.unwrap();

        assert_eq!(queue.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn per_user_quota_rejects_second_concurrent_request() {
        let store = Arc::new(InMemoryRequestStore::new());
        let queue = Arc::new(InMemoryQueue::default());
        let limits = CollectionLimits {
            total: None,
            per_user: Some(1),
            per_role: HashMap::new(),
        };
        let mut collections = HashMap::new();
        collections.insert("debug".to_string(), debug_collection(limits));

        let user = User::new("alice", "ecmwf");
        let first = waiting(&user, "debug");
        let second = waiting(&user, "debug");
        store.add(first).await.unwrap();
        store.add(second).await.unwrap();

        let broker = Broker::new(store.clone(), queue.clone(), Arc::new(collections), BrokerConfig::default());
        broker.tick().await.unwrap();

        assert_eq!(queue.count().await.unwrap(), 1, "only one of the two should be admitted");
    }

    #[tokio::test]
    async fn stuck_processing_request_is_reset_to_waiting_when_queue_is_empty() {
        let store = Arc::new(InMemoryRequestStore::new());
        let queue = Arc::new(InMemoryQueue::default());
        let collections = HashMap::new();

        let user = User::new("alice", "ecmwf");
        let waiting_req = waiting(&user, "debug").into_waiting().unwrap();
        let processing = AnyRequest::Processing(waiting_req.admit().dequeue());
        store.add(processing).await.unwrap();

        let broker = Broker::new(store.clone(), queue.clone(), Arc::new(collections), BrokerConfig::default());
        broker.tick().await.unwrap();

        let active = store.get_active().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].status(), Status::Waiting);
    }
}
