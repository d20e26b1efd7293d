//! In-memory reference implementation of `RequestStore`.
//!
//! Suitable for tests and single-process deployments; nothing here survives a
//! restart. Mirrors the concurrency control of the reference in-memory
//! implementation in this codebase's sibling modules: a single `parking_lot`
//! lock guarding a plain `HashMap`, atomic by virtue of the lock's scope rather
//! than per-field synchronization.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::request::{AnyRequest, RequestFilter, RequestId, SortKey, SortOrder, Status};

use super::{RequestStore, RevokeTarget};

#[derive(Clone, Default)]
pub struct InMemoryRequestStore {
    requests: Arc<RwLock<HashMap<RequestId, AnyRequest>>>,
}

impl InMemoryRequestStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn compare_by_sort_key(a: &AnyRequest, b: &AnyRequest, key: SortKey) -> std::cmp::Ordering {
    match key {
        SortKey::Timestamp => a.data().timestamp.cmp(&b.data().timestamp),
        SortKey::LastModified => a.data().last_modified.cmp(&b.data().last_modified),
        SortKey::ContentLength => a.data().content_length.cmp(&b.data().content_length),
        SortKey::Id => a.id().cmp(&b.id()),
    }
}

#[async_trait]
impl RequestStore for InMemoryRequestStore {
    async fn add(&self, request: AnyRequest) -> Result<()> {
        let mut requests = self.requests.write();
        if requests.contains_key(&request.id()) {
            return Err(Error::Conflict(format!(
                "request {} already exists",
                request.id()
            )));
        }
        requests.insert(request.id(), request);
        Ok(())
    }

    async fn get(&self, id: RequestId) -> Result<Option<AnyRequest>> {
        Ok(self.requests.read().get(&id).cloned())
    }

    async fn get_many(
        &self,
        filter: RequestFilter,
        sort: Option<(SortKey, SortOrder)>,
        limit: Option<usize>,
    ) -> Result<Vec<AnyRequest>> {
        let requests = self.requests.read();
        let mut matching: Vec<AnyRequest> = requests
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();

        if let Some((key, order)) = sort {
            matching.sort_by(|a, b| {
                let ordering = compare_by_sort_key(a, b, key);
                match order {
                    SortOrder::Ascending => ordering,
                    SortOrder::Descending => ordering.reverse(),
                }
            });
        }

        if let Some(limit) = limit {
            matching.truncate(limit);
        }
        Ok(matching)
    }

    async fn update(&self, mut request: AnyRequest) -> Result<()> {
        let mut requests = self.requests.write();
        if !requests.contains_key(&request.id()) {
            return Err(Error::NotFound(format!("request {} not found", request.id())));
        }
        bump_last_modified(&mut request);
        requests.insert(request.id(), request);
        Ok(())
    }

    async fn remove(&self, id: RequestId) -> Result<()> {
        let mut requests = self.requests.write();
        requests
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(format!("request {id} not found")))
    }

    async fn revoke(&self, user: Uuid, target: RevokeTarget) -> Result<usize> {
        let mut requests = self.requests.write();

        let revocable = |r: &AnyRequest| matches!(r.status(), Status::Waiting | Status::Queued);

        match target {
            RevokeTarget::All => {
                let ids: Vec<RequestId> = requests
                    .values()
                    .filter(|r| r.data().user.id() == user && revocable(r))
                    .map(|r| r.id())
                    .collect();
                for id in &ids {
                    requests.remove(id);
                }
                Ok(ids.len())
            }
            RevokeTarget::One(id) => {
                let Some(existing) = requests.get(&id) else {
                    return Err(Error::NotFound(format!("request {id} not found")));
                };
                if existing.data().user.id() != user {
                    return Err(Error::Forbidden(format!(
                        "request {id} is not owned by the requesting user"
                    )));
                }
                if !revocable(existing) {
                    return Err(Error::Forbidden(format!(
                        "request {id} is not in a revocable status"
                    )));
                }
                requests.remove(&id);
                Ok(1)
            }
        }
    }

    async fn remove_old(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut requests = self.requests.write();
        let ids: Vec<RequestId> = requests
            .values()
            .filter(|r| r.is_terminal() && r.data().last_modified < cutoff)
            .map(|r| r.id())
            .collect();
        for id in &ids {
            requests.remove(id);
        }
        Ok(ids.len())
    }

    async fn get_active(&self) -> Result<Vec<AnyRequest>> {
        Ok(self
            .requests
            .read()
            .values()
            .filter(|r| r.is_active())
            .cloned()
            .collect())
    }
}

fn bump_last_modified(request: &mut AnyRequest) {
    let now = Utc::now();
    match request {
        AnyRequest::Waiting(r) => r.data.last_modified = now,
        AnyRequest::Uploading(r) => r.data.last_modified = now,
        AnyRequest::Queued(r) => r.data.last_modified = now,
        AnyRequest::Processing(r) => r.data.last_modified = now,
        AnyRequest::Processed(r) => r.data.last_modified = now,
        AnyRequest::Failed(r) => r.data.last_modified = now,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::request::{Request, RequestData, Verb, Waiting};
    use crate::user::User;

    fn waiting(user: &User, collection: &str) -> AnyRequest {
        AnyRequest::Waiting(Request {
            data: RequestData::new(user.clone(), Verb::Retrieve, collection, json!({}), None),
            state: Waiting {},
        })
    }

    #[tokio::test]
    async fn add_rejects_duplicate_id() {
        let store = InMemoryRequestStore::new();
        let user = User::new("alice", "ecmwf");
        let request = waiting(&user, "debug");
        let id = request.id();
        store.add(request).await.unwrap();

        let duplicate = AnyRequest::Waiting(Request {
            data: RequestData {
                id,
                ..RequestData::new(user, Verb::Retrieve, "debug", json!({}), None)
            },
            state: Waiting {},
        });
        assert!(matches!(store.add(duplicate).await, Err(Error::Conflict(_))));
    }

    #[tokio::test]
    async fn update_bumps_last_modified_and_rejects_missing() {
        let store = InMemoryRequestStore::new();
        let user = User::new("alice", "ecmwf");
        let request = waiting(&user, "debug");
        let created_at = request.data().last_modified;
        store.add(request.clone()).await.unwrap();

        store.update(request.clone()).await.unwrap();
        let updated = store.get(request.id()).await.unwrap().unwrap();
        assert!(updated.data().last_modified >= created_at);

        let missing = waiting(&user, "debug");
        assert!(matches!(store.update(missing).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn revoke_all_only_targets_owner_and_revocable_status() {
        let store = InMemoryRequestStore::new();
        let alice = User::new("alice", "ecmwf");
        let bob = User::new("bob", "ecmwf");

        store.add(waiting(&alice, "debug")).await.unwrap();
        store.add(waiting(&alice, "debug")).await.unwrap();
        store.add(waiting(&bob, "debug")).await.unwrap();

        let removed = store.revoke(alice.id(), RevokeTarget::All).await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.get_active().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn revoke_one_forbids_non_owner() {
        let store = InMemoryRequestStore::new();
        let alice = User::new("alice", "ecmwf");
        let bob = User::new("bob", "ecmwf");
        let request = waiting(&alice, "debug");
        let id = request.id();
        store.add(request).await.unwrap();

        assert!(matches!(
            store.revoke(bob.id(), RevokeTarget::One(id)).await,
            Err(Error::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn remove_old_only_deletes_stale_terminal_requests() {
        let store = InMemoryRequestStore::new();
        let user = User::new("alice", "ecmwf");
        store.add(waiting(&user, "debug")).await.unwrap();

        let cutoff = Utc::now() + chrono::Duration::days(1);
        let removed = store.remove_old(cutoff).await.unwrap();
        assert_eq!(removed, 0, "non-terminal requests are never swept by remove_old");
    }

    #[tokio::test]
    async fn get_many_filters_by_verb_and_content_length() {
        let store = InMemoryRequestStore::new();
        let user = User::new("alice", "ecmwf");

        let mut retrieve = RequestData::new(user.clone(), Verb::Retrieve, "debug", json!({}), None);
        retrieve.content_length = Some(10);
        let archive = RequestData::new(user.clone(), Verb::Archive, "debug", json!({}), Some("https://x/y".into()));
        let retrieve_id = retrieve.id;
        store.add(AnyRequest::Waiting(Request { data: retrieve, state: Waiting {} })).await.unwrap();
        store.add(AnyRequest::Waiting(Request { data: archive, state: Waiting {} })).await.unwrap();

        let by_verb = store
            .get_many(RequestFilter { verb: Some(Verb::Archive), ..Default::default() }, None, None)
            .await
            .unwrap();
        assert_eq!(by_verb.len(), 1);
        assert_eq!(by_verb[0].data().verb, Verb::Archive);

        let by_content_length = store
            .get_many(RequestFilter { content_length: Some(10), ..Default::default() }, None, None)
            .await
            .unwrap();
        assert_eq!(by_content_length.len(), 1);
        assert_eq!(by_content_length[0].id(), retrieve_id);
    }

    #[tokio::test]
    async fn get_many_sorts_by_content_length_and_id() {
        let store = InMemoryRequestStore::new();
        let user = User::new("alice", "ecmwf");

        let mut small = RequestData::new(user.clone(), Verb::Retrieve, "debug", json!({}), None);
        small.content_length = Some(5);
        let mut large = RequestData::new(user.clone(), Verb::Retrieve, "debug", json!({}), None);
        large.content_length = Some(50);
        store.add(AnyRequest::Waiting(Request { data: large.clone(), state: Waiting {} })).await.unwrap();
        store.add(AnyRequest::Waiting(Request { data: small.clone(), state: Waiting {} })).await.unwrap();

        let ascending = store
            .get_many(RequestFilter::default(), Some((SortKey::ContentLength, SortOrder::Ascending)), None)
            .await
            .unwrap();
        assert_eq!(ascending[0].data().content_length, Some(5));
        assert_eq!(ascending[1].data().content_length, Some(50));

        let by_id = store
            .get_many(RequestFilter::default(), Some((SortKey::Id, SortOrder::Ascending)), None)
            .await
            .unwrap();
        let mut expected_ids = vec![small.id, large.id];
        expected_ids.sort();
        assert_eq!(by_id.iter().map(|r| r.id()).collect::<Vec<_>>(), expected_ids);
    }
}
