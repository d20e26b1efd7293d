//! The periodic storage reclamation sweep (§4.7).

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crate::error::Result;
use crate::request::RequestId;
use crate::staging::{request_id_for_key, Staging};
use crate::store::RequestStore;

#[derive(Debug, Clone)]
pub struct GcConfig {
    pub interval: Duration,
    pub age: Duration,
    /// Retained for parity with the configuration surface; no metric store exists
    /// in this crate (telemetry aggregation is out of scope), so this is unused.
    pub metric_age: Duration,
    pub threshold_bytes: u64,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3600),
            age: Duration::from_secs(60 * 60 * 24),
            metric_age: Duration::from_secs(60 * 60 * 24 * 7),
            threshold_bytes: 10 * 1024 * 1024 * 1024,
        }
    }
}

pub struct Gc<S: RequestStore, T: Staging> {
    store: Arc<S>,
    staging: Arc<T>,
    config: GcConfig,
}

impl<S: RequestStore + 'static, T: Staging + 'static> Gc<S, T> {
    pub fn new(store: Arc<S>, staging: Arc<T>, config: GcConfig) -> Self {
        Self { store, staging, config }
    }

    #[instrument(skip_all)]
    pub async fn run(&self, shutdown: impl Future<Output = ()>) -> Result<()> {
        tokio::pin!(shutdown);
        let mut interval = tokio::time::interval(self.config.interval);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("gc shutting down");
                    return Ok(());
                }
                _ = interval.tick() => {
                    if let Err(e) = self.sweep().await {
                        warn!(error = %e, "gc sweep failed, retrying next interval");
                    }
                }
            }
        }
    }

    /// One full sweep: §4.7's three numbered steps, run in order.
    #[instrument(skip(self))]
    pub async fn sweep(&self) -> Result<()> {
        let removed_requests = self.remove_old_requests().await?;
        let removed_dangling = self.remove_dangling_data().await?;
        let removed_by_size = self.remove_by_size().await?;
        debug!(removed_requests, removed_dangling, removed_by_size, "gc sweep complete");
        Ok(())
    }

    /// §4.7 step 1: delete terminal requests with `last_modified < now() - age`.
    async fn remove_old_requests(&self) -> Result<usize> {
        let cutoff = Utc::now() - chrono_duration(self.config.age);
        let removed = self.store.remove_old(cutoff).await?;
        if removed > 0 {
            info!(removed, cutoff = %cutoff, "removed old terminal requests");
        }
        Ok(removed)
    }

    /// §4.7 step 2: delete staging objects whose owning request id is absent from
    /// the store. Tolerates objects appearing mid-scan (a worker finishing
    /// concurrently): only objects that were already dangling at `list()` time are
    /// ever touched.
    async fn remove_dangling_data(&self) -> Result<usize> {
        let objects = self.staging.list().await?;
        let mut removed = 0;
        for object in objects {
            let Some(request_id) = request_id_for_key(&object.name) else {
                warn!(key = %object.name, "staging object key does not encode a request id; skipping");
                continue;
            };
            if self.store.get(request_id).await?.is_some() {
                continue;
            }
            match self.staging.delete(&object.name).await {
                Ok(()) => removed += 1,
                Err(crate::error::Error::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        if removed > 0 {
            info!(removed, "removed dangling staging objects");
        }
        Ok(removed)
    }

    /// §4.7 step 3: if total staged bytes exceed the threshold, evict the oldest
    /// objects (by `last_modified`) along with their owning requests until back
    /// under threshold.
    async fn remove_by_size(&self) -> Result<usize> {
        let mut objects = self.staging.list().await?;
        let total: u64 = objects.iter().map(|o| o.size).sum();
        if total <= self.config.threshold_bytes {
            return Ok(0);
        }

        objects.sort_by_key(|o| o.last_modified);

        let mut remaining = total;
        let mut removed = 0;
        for object in objects {
            if remaining <= self.config.threshold_bytes {
                break;
            }
            let Some(request_id) = request_id_for_key(&object.name) else {
                continue;
            };

            match self.staging.delete(&object.name).await {
                Ok(()) => {}
                Err(crate::error::Error::NotFound(_)) => continue,
                Err(e) => return Err(e),
            }
            self.delete_owning_request(request_id).await?;

            remaining = remaining.saturating_sub(object.size);
            removed += 1;
        }

        if removed > 0 {
            warn!(removed, threshold = self.config.threshold_bytes, "evicted objects under size pressure");
        }
        Ok(removed)
    }

    async fn delete_owning_request(&self, id: RequestId) -> Result<()> {
        match self.store.remove(id).await {
            Ok(()) | Err(crate::error::Error::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

fn chrono_duration(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or(chrono::Duration::zero())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::request::{AnyRequest, Request, RequestData, Verb, Waiting};
    use crate::staging::InMemoryStaging;
    use crate::store::InMemoryRequestStore;
    use crate::user::User;

    fn processed_request() -> AnyRequest {
        let data = RequestData::new(User::new("alice", "ecmwf"), Verb::Retrieve, "debug", json!({}), None);
        AnyRequest::Processed(
            Request { data, state: Waiting {} }
                .admit()
                .dequeue()
                .complete_success(),
        )
    }

    #[tokio::test]
    async fn remove_old_requests_deletes_stale_terminal_only() {
        let store = Arc::new(InMemoryRequestStore::new());
        let staging = Arc::new(InMemoryStaging::new("https://example.test"));
        let request = processed_request();
        let id = request.data().id;
        store.add(request).await.unwrap();

        let gc = Gc::new(store.clone(), staging, GcConfig {
            age: Duration::from_secs(0),
            ..GcConfig::default()
        });
        let removed = gc.remove_old_requests().await.unwrap();
        assert_eq!(removed, 1);
        assert!(store.get(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn remove_dangling_data_deletes_objects_with_no_owning_request() {
        let store = Arc::new(InMemoryRequestStore::new());
        let staging = Arc::new(InMemoryStaging::new("https://example.test"));
        let orphan_id = uuid::Uuid::new_v4();
        staging.create(&orphan_id.to_string(), b"stale".to_vec(), "text").await.unwrap();

        let gc = Gc::new(store, staging.clone(), GcConfig::default());
        let removed = gc.remove_dangling_data().await.unwrap();
        assert_eq!(removed, 1);
        assert!(staging.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn remove_dangling_data_keeps_objects_with_live_owning_request() {
        let store = Arc::new(InMemoryRequestStore::new());
        let staging = Arc::new(InMemoryStaging::new("https://example.test"));
        let request = processed_request();
        let id = request.data().id;
        store.add(request).await.unwrap();
        staging.create(&id.to_string(), b"live".to_vec(), "text").await.unwrap();

        let gc = Gc::new(store, staging.clone(), GcConfig::default());
        let removed = gc.remove_dangling_data().await.unwrap();
        assert_eq!(removed, 0);
        assert_eq!(staging.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn remove_by_size_evicts_oldest_first_and_deletes_owning_request() {
        let store = Arc::new(InMemoryRequestStore::new());
        let staging = Arc::new(InMemoryStaging::new("https://example.test"));

        let old = processed_request();
        let old_id = old.data().id;
        store.add(old).await.unwrap();
        staging.create(&old_id.to_string(), vec![0u8; 800], "text").await.unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;

        let recent = processed_request();
        let recent_id = recent.data().id;
        store.add(recent).await.unwrap();
        staging.create(&recent_id.to_string(), vec![0u8; 800], "text").await.unwrap();

        let gc = Gc::new(store.clone(), staging.clone(), GcConfig {
            threshold_bytes: 1000,
            ..GcConfig::default()
        });
        let removed = gc.remove_by_size().await.unwrap();

        assert_eq!(removed, 1);
        assert!(store.get(old_id).await.unwrap().is_none(), "oldest request should be evicted");
        assert!(store.get(recent_id).await.unwrap().is_some());
    }
}
