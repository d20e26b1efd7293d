//! End-to-end scenarios wiring the broker, worker, and GC against the in-memory
//! backends (§8's concrete scenarios).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;

use brokercore::broker::{Broker, BrokerConfig};
use brokercore::coercion::CoercionConfig;
use brokercore::collection::{Collection, CollectionLimits};
use brokercore::datasource::{DataSourceConfig, MatchRule};
use brokercore::gc::{Gc, GcConfig};
use brokercore::queue::{InMemoryQueue, Queue};
use brokercore::request::{AnyRequest, Request, RequestData, Status, Verb, Waiting};
use brokercore::staging::{InMemoryStaging, Staging};
use brokercore::store::{InMemoryRequestStore, RequestStore};
use brokercore::user::User;
use brokercore::worker::{Worker, WorkerConfig};

fn echo_collection(limits: CollectionLimits) -> Collection {
    Collection {
        name: "debug".to_string(),
        datasources: vec![DataSourceConfig {
            kind: "echo".to_string(),
            match_rules: HashMap::new(),
            options: json!({}),
        }],
        roles: HashMap::new(),
        limits,
        coercion: CoercionConfig::default(),
    }
}

/// Scenario A: happy RETRIEVE. A WAITING request reaches PROCESSED with a
/// resolvable download URL carrying the echoed bytes, after one broker tick and
/// one worker tick.
#[tokio::test]
async fn scenario_a_happy_retrieve() {
    let store = Arc::new(InMemoryRequestStore::new());
    let queue = Arc::new(InMemoryQueue::default());
    let staging = Arc::new(InMemoryStaging::new("https://staging.local"));
    let mut collections = HashMap::new();
    collections.insert("debug".to_string(), echo_collection(CollectionLimits::default()));
    let collections = Arc::new(collections);

    let user = User::new("alice", "ecmwf");
    let data = RequestData::new(user, Verb::Retrieve, "debug", json!("hello"), None);
    let id = data.id;
    store.add(AnyRequest::Waiting(Request { data, state: Waiting {} })).await.unwrap();

    let broker = Broker::new(store.clone(), queue.clone(), collections.clone(), BrokerConfig::default());
    broker.tick().await.unwrap();
    assert_eq!(store.get(id).await.unwrap().unwrap().status(), Status::Queued);

    let worker = Worker::new(store.clone(), queue.clone(), staging.clone(), collections, WorkerConfig::default());
    worker_tick_until_idle(&worker).await;

    let finished = store.get(id).await.unwrap().unwrap();
    assert_eq!(finished.status(), Status::Processed);
    let url = finished.data().url.clone().expect("processed request carries a download url");

    let key = url.rsplit('/').next().unwrap().to_string();
    let bytes = staging.read(&key).await.unwrap();
    assert_eq!(bytes, b"hello");
}

async fn worker_tick_until_idle<S, Q, T>(worker: &Worker<S, Q, T>)
where
    S: RequestStore + 'static,
    Q: brokercore::queue::Queue + 'static,
    T: brokercore::staging::Staging + 'static,
{
    for _ in 0..3 {
        worker.tick().await.unwrap();
    }
}

/// Scenario B: quota rejection. A per-user cap of 1 admits only one of two
/// concurrently WAITING requests for the same user; the second is admitted once
/// the first leaves the active set.
#[tokio::test]
async fn scenario_b_quota_then_later_admission() {
    let store = Arc::new(InMemoryRequestStore::new());
    let queue = Arc::new(InMemoryQueue::default());
    let limits = CollectionLimits {
        total: None,
        per_user: Some(1),
        per_role: HashMap::new(),
    };
    let mut collections = HashMap::new();
    collections.insert("debug".to_string(), echo_collection(limits));
    let collections = Arc::new(collections);

    let user = User::new("alice", "ecmwf");
    let first = RequestData::new(user.clone(), Verb::Retrieve, "debug", json!("first"), None);
    let second = RequestData::new(user.clone(), Verb::Retrieve, "debug", json!("second"), None);
    let first_id = first.id;
    let second_id = second.id;
    store.add(AnyRequest::Waiting(Request { data: first, state: Waiting {} })).await.unwrap();
    store.add(AnyRequest::Waiting(Request { data: second, state: Waiting {} })).await.unwrap();

    let broker = Broker::new(store.clone(), queue.clone(), collections.clone(), BrokerConfig::default());
    broker.tick().await.unwrap();

    assert_eq!(store.get(first_id).await.unwrap().unwrap().status(), Status::Queued);
    assert_eq!(store.get(second_id).await.unwrap().unwrap().status(), Status::Waiting);

    // Drain the first request to PROCESSED, freeing the quota.
    let staging = Arc::new(InMemoryStaging::new("https://staging.local"));
    let worker = Worker::new(store.clone(), queue.clone(), staging, collections.clone(), WorkerConfig::default());
    worker.tick().await.unwrap();
    assert_eq!(store.get(first_id).await.unwrap().unwrap().status(), Status::Processed);

    broker.tick().await.unwrap();
    assert_eq!(store.get(second_id).await.unwrap().unwrap().status(), Status::Queued);
}

/// Scenario C: stuck-request recovery. A PROCESSING request with an empty queue
/// (a crashed worker never ack'd it) is reset to WAITING on the next broker tick.
#[tokio::test]
async fn scenario_c_stuck_request_recovery() {
    let store = Arc::new(InMemoryRequestStore::new());
    let queue = Arc::new(InMemoryQueue::default());
    let collections = Arc::new(HashMap::new());

    let user = User::new("alice", "ecmwf");
    let data = RequestData::new(user, Verb::Retrieve, "debug", json!("hello"), None);
    let id = data.id;
    let processing = Request { data, state: Waiting {} }.admit().dequeue();
    store.add(AnyRequest::Processing(processing)).await.unwrap();

    assert_eq!(queue.count().await.unwrap(), 0);

    let broker = Broker::new(store.clone(), queue, collections, BrokerConfig::default());
    broker.tick().await.unwrap();

    let recovered = store.get(id).await.unwrap().unwrap();
    assert_eq!(recovered.status(), Status::Waiting);
    assert!(recovered.data().user_message.contains("stuck"));
}

/// Scenario D: revoke during QUEUED. The record disappears from the store; a
/// worker that later dequeues the stale message finds nothing and acks it away.
#[tokio::test]
async fn scenario_d_revoke_during_queued() {
    let store = Arc::new(InMemoryRequestStore::new());
    let queue = Arc::new(InMemoryQueue::default());
    let staging = Arc::new(InMemoryStaging::new("https://staging.local"));
    let collections = Arc::new(HashMap::new());

    let user = User::new("alice", "ecmwf");
    let data = RequestData::new(user.clone(), Verb::Retrieve, "debug", json!("hello"), None);
    let id = data.id;
    let queued = Request { data, state: Waiting {} }.admit();
    store.add(AnyRequest::Queued(queued)).await.unwrap();
    queue.enqueue(id).await.unwrap();

    store
        .revoke(user.id(), brokercore::store::RevokeTarget::One(id))
        .await
        .unwrap();
    assert!(store.get(id).await.unwrap().is_none());

    let worker = Worker::new(store, queue.clone(), staging, collections, WorkerConfig::default());
    worker.tick().await.unwrap();

    assert_eq!(queue.count().await.unwrap(), 0, "the stale message is ack'd away");
}

/// Scenario E: date match rule. `"> 30d"` passes a date 31 days in the past,
/// rejects one 5 days in the past, and a range passes only when both endpoints
/// clear the cutoff.
#[tokio::test]
async fn scenario_e_date_match_rule() {
    let mut match_rules = HashMap::new();
    match_rules.insert("date".to_string(), MatchRule::DatePredicates(vec!["> 30d".to_string()]));
    let collection = Collection {
        name: "archive".to_string(),
        datasources: vec![DataSourceConfig {
            kind: "echo".to_string(),
            match_rules,
            options: json!({}),
        }],
        roles: HashMap::new(),
        limits: CollectionLimits::default(),
        coercion: CoercionConfig::default(),
    };

    let old_enough = (Utc::now() - chrono::Duration::days(31)).format("%Y%m%d").to_string();
    let mut request = RequestData::new(
        User::new("alice", "ecmwf"),
        Verb::Retrieve,
        "archive",
        json!({"date": old_enough}),
        None,
    );
    let matched = collection.dispatch(&mut request, None).await.unwrap();
    assert!(matched.is_some(), "a date 31 days old should clear a 30-day cutoff");

    let too_recent = (Utc::now() - chrono::Duration::days(5)).format("%Y%m%d").to_string();
    let mut request = RequestData::new(
        User::new("alice", "ecmwf"),
        Verb::Retrieve,
        "archive",
        json!({"date": too_recent}),
        None,
    );
    let matched = collection.dispatch(&mut request, None).await.unwrap();
    assert!(matched.is_none(), "a date 5 days old should not clear a 30-day cutoff");

    let range_start = (Utc::now() - chrono::Duration::days(200)).format("%Y%m%d").to_string();
    let range_end = (Utc::now() - chrono::Duration::days(40)).format("%Y%m%d").to_string();
    let mut request = RequestData::new(
        User::new("alice", "ecmwf"),
        Verb::Retrieve,
        "archive",
        json!({"date": format!("{range_start}/to/{range_end}")}),
        None,
    );
    let matched = collection.dispatch(&mut request, None).await.unwrap();
    assert!(matched.is_some(), "a range with both endpoints past cutoff should match");
}

/// Scenario F: GC size sweep. When staged bytes exceed the threshold, the oldest
/// objects are evicted along with their owning requests until back under it;
/// newer objects survive.
#[tokio::test]
async fn scenario_f_gc_size_sweep() {
    let store = Arc::new(InMemoryRequestStore::new());
    let staging = Arc::new(InMemoryStaging::new("https://staging.local"));

    let mut ids = Vec::new();
    for _ in 0..5 {
        let data = RequestData::new(User::new("alice", "ecmwf"), Verb::Retrieve, "debug", json!({}), None);
        let id = data.id;
        let processed = Request { data, state: Waiting {} }.admit().dequeue().complete_success();
        store.add(AnyRequest::Processed(processed)).await.unwrap();
        staging.create(&id.to_string(), vec![0u8; 1024], "application/octet-stream").await.unwrap();
        ids.push(id);
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    let gc = Gc::new(store.clone(), staging.clone(), GcConfig {
        threshold_bytes: 3 * 1024,
        ..GcConfig::default()
    });
    gc.sweep().await.unwrap();

    let remaining_total: u64 = staging.list().await.unwrap().iter().map(|o| o.size).sum();
    assert!(remaining_total <= 3 * 1024);

    assert!(store.get(ids[0]).await.unwrap().is_none(), "oldest request evicted");
    assert!(store.get(ids[1]).await.unwrap().is_none(), "second-oldest request evicted");
    assert!(store.get(ids[4]).await.unwrap().is_some(), "newest request survives");
}
