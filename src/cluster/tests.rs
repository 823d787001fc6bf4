// Written by Paul Clevett
// (C)Copyright Wolf Software Systems Ltd
// https://wolf.uk.com

use super::*;
use crate::gateway::mock::{MockReply, MockTransport};
use crate::gateway::Navigator;
use crate::storage::{ACCESS_TOKEN_KEY, KeyValueStore, MemoryStore};
use reqwest::Method;
use serde_json::{json, Value};
use tokio::time::sleep;

const NODES: &str = "/nodes/";
const COMPLETE: &str = "/ha/node/1/complete-data";

struct Fixture {
    transport: Arc<MockTransport>,
    navigator: Arc<Navigator>,
    session: Arc<SessionState>,
    cache: Arc<ClusterCache>,
}

fn fixture_with(token: Option<&str>, options: CacheOptions) -> Fixture {
    let store = Arc::new(MemoryStore::new());
    if let Some(t) = token {
        store.set(ACCESS_TOKEN_KEY, t).unwrap();
    }
    let session = Arc::new(SessionState::rehydrate(store));
    let navigator = Arc::new(Navigator::new());
    let transport = MockTransport::new();
    let gateway = Arc::new(Gateway::standard(transport.clone(), session.clone(), navigator.clone(), "/login"));
    let cache = ClusterCache::new(gateway, session.clone(), options);
    Fixture { transport, navigator, session, cache }
}

fn fixture() -> Fixture {
    let f = fixture_with(Some("T1"), CacheOptions::default());
    f.transport.on(Method::GET, NODES, MockReply::json(200, json!([
        {"id": 1, "name": "pve-a", "is_online": true}
    ])));
    f
}

fn complete_data(sid: &str) -> Value {
    json!({
        "ha_resources": [{"sid": sid, "type": "vm", "state": "started"}],
        "ha_groups": [{"group": "prod", "nodes": "pve-a:2,pve-b:1"}],
        "guests": [{"vmid": 100, "name": "db01", "type": "qemu"}],
        "cluster_nodes": [{"node_id": 1, "name": "pve-a", "status": "online"}],
        "cluster_status": {"cluster_name": "lab", "quorum": true, "nodes": 2}
    })
}

#[tokio::test(start_paused = true)]
async fn fresh_snapshot_is_reused() {
    let f = fixture();
    f.transport.on(Method::GET, COMPLETE, MockReply::json(200, complete_data("vm:100")));

    assert_eq!(f.cache.fetch_cluster_data(false, false).await, FetchOutcome::Updated);
    let first = f.cache.snapshot();
    assert_eq!(first.ha_resources[0].sid, "vm:100");
    assert_eq!(first.available_guests[0].vmid, "100");
    assert!(first.cluster_status.as_ref().unwrap().quorum);
    assert!(first.last_updated.is_some());

    sleep(Duration::from_secs(10)).await;
    assert_eq!(f.cache.fetch_cluster_data(false, false).await, FetchOutcome::Fresh);
    assert_eq!(f.transport.count(Method::GET, COMPLETE), 1);
    assert_eq!(f.cache.snapshot(), first);
}

#[tokio::test(start_paused = true)]
async fn stale_or_forced_fetch_goes_to_network() {
    let f = fixture();
    f.transport.on(Method::GET, COMPLETE, MockReply::json(200, complete_data("vm:100")));

    f.cache.fetch_cluster_data(false, false).await;
    assert_eq!(f.cache.fetch_cluster_data(true, false).await, FetchOutcome::Updated);
    assert_eq!(f.transport.count(Method::GET, COMPLETE), 2);

    sleep(Duration::from_secs(61)).await;
    assert_eq!(f.cache.fetch_cluster_data(false, false).await, FetchOutcome::Updated);
    assert_eq!(f.transport.count(Method::GET, COMPLETE), 3);
}

#[tokio::test]
async fn no_credential_means_no_traffic() {
    let f = fixture_with(None, CacheOptions::default());
    assert_eq!(f.cache.fetch_cluster_data(true, false).await, FetchOutcome::NoCredential);
    assert_eq!(f.transport.total(), 0);
    assert_eq!(f.cache.snapshot(), ClusterSnapshot::default());
}

#[tokio::test]
async fn empty_inventory_leaves_snapshot_alone() {
    let f = fixture_with(Some("T1"), CacheOptions::default());
    f.transport.on(Method::GET, NODES, MockReply::json(200, json!([])));

    assert_eq!(f.cache.fetch_cluster_data(true, false).await, FetchOutcome::NoCoordinator);
    assert_eq!(f.transport.total(), 1);
    assert_eq!(f.cache.snapshot(), ClusterSnapshot::default());
    assert!(!f.cache.is_fetching());
    assert!(!f.cache.is_loading());
}

#[tokio::test]
async fn failed_node_lookup_is_no_coordinator() {
    let f = fixture_with(Some("T1"), CacheOptions::default());
    f.transport.on(Method::GET, NODES, MockReply::fail("connection reset"));

    assert_eq!(f.cache.fetch_cluster_data(true, false).await, FetchOutcome::NoCoordinator);
    assert_eq!(f.cache.snapshot().error, None);
}

#[tokio::test]
async fn failures_keep_previous_data() {
    let f = fixture();
    f.transport.on(Method::GET, COMPLETE, MockReply::json(200, complete_data("vm:100")));
    f.cache.fetch_cluster_data(true, false).await;
    let good = f.cache.snapshot();

    f.transport.replace(Method::GET, COMPLETE, MockReply::json(500, json!({"detail": "pvesh timed out"})));
    assert_eq!(f.cache.fetch_cluster_data(true, false).await, FetchOutcome::Failed(FailureKind::Http));
    let after = f.cache.snapshot();
    assert_eq!(after.error.as_deref(), Some(FAILED_TO_LOAD));
    assert_eq!(after.ha_resources, good.ha_resources);
    assert_eq!(after.cluster_status, good.cluster_status);
    assert_eq!(after.last_updated, good.last_updated);

    f.transport.replace(Method::GET, COMPLETE, MockReply::fail("connection refused"));
    assert_eq!(f.cache.fetch_cluster_data(true, false).await, FetchOutcome::Failed(FailureKind::Network));
    let after = f.cache.snapshot();
    assert_eq!(after.error.as_deref(), Some(NETWORK_ERROR));
    assert_eq!(after.available_guests, good.available_guests);

    f.transport.replace(Method::GET, COMPLETE, MockReply::raw(200, "<html>gateway</html>"));
    assert_eq!(f.cache.fetch_cluster_data(true, false).await, FetchOutcome::Failed(FailureKind::Http));
    assert_eq!(f.cache.snapshot().error.as_deref(), Some(FAILED_TO_LOAD));

    f.transport.replace(Method::GET, COMPLETE, MockReply::json(200, complete_data("vm:200")));
    assert_eq!(f.cache.fetch_cluster_data(true, false).await, FetchOutcome::Updated);
    let recovered = f.cache.snapshot();
    assert_eq!(recovered.error, None);
    assert_eq!(recovered.ha_resources[0].sid, "vm:200");
}

#[tokio::test]
async fn failure_does_not_refresh_staleness() {
    let f = fixture();
    f.transport.on(Method::GET, COMPLETE, MockReply::status(502));
    f.cache.fetch_cluster_data(false, false).await;
    // never succeeded, so the next call still goes out
    f.cache.fetch_cluster_data(false, false).await;
    assert_eq!(f.transport.count(Method::GET, COMPLETE), 2);
}

#[tokio::test(start_paused = true)]
async fn slower_older_fetch_is_discarded() {
    let f = fixture();
    f.transport.on(Method::GET, COMPLETE, MockReply::json(200, complete_data("vm:old")).after(Duration::from_secs(5)));
    f.transport.on(Method::GET, COMPLETE, MockReply::json(200, complete_data("vm:new")));

    let (older, newer) = tokio::join!(
        f.cache.fetch_cluster_data(true, false),
        async {
            sleep(Duration::from_secs(1)).await;
            f.cache.fetch_cluster_data(true, false).await
        }
    );
    assert_eq!(newer, FetchOutcome::Updated);
    assert_eq!(older, FetchOutcome::Superseded);
    assert_eq!(f.cache.snapshot().ha_resources[0].sid, "vm:new");
}

#[tokio::test(start_paused = true)]
async fn background_fetch_does_not_touch_loading() {
    let f = fixture();
    f.transport.on(Method::GET, COMPLETE, MockReply::json(200, complete_data("vm:100")).after(Duration::from_secs(5)));

    let probe = async {
        sleep(Duration::from_secs(1)).await;
        (f.cache.is_loading(), f.cache.is_fetching())
    };
    let (outcome, (loading, fetching)) = tokio::join!(f.cache.fetch_cluster_data(true, true), probe);
    assert_eq!(outcome, FetchOutcome::Updated);
    assert!(!loading);
    assert!(fetching);

    let probe = async {
        sleep(Duration::from_secs(1)).await;
        f.cache.is_loading()
    };
    let (_, loading) = tokio::join!(f.cache.fetch_cluster_data(true, false), probe);
    assert!(loading);
    assert!(!f.cache.is_loading());
    assert!(!f.cache.is_fetching());
}

#[tokio::test]
async fn rejected_credential_during_fetch_ends_session() {
    let f = fixture();
    f.transport.on(Method::GET, COMPLETE, MockReply::status(401));

    assert_eq!(f.cache.fetch_cluster_data(true, false).await, FetchOutcome::Failed(FailureKind::Http));
    assert!(!f.session.is_authenticated());
    assert_eq!(f.navigator.count("/login"), 1);

    assert_eq!(f.cache.fetch_cluster_data(true, false).await, FetchOutcome::NoCredential);
    assert_eq!(f.transport.count(Method::GET, COMPLETE), 1);
}

#[tokio::test]
async fn coordinator_policy() {
    let inventory = json!([
        {"id": 1, "name": "pve-a", "is_online": false},
        {"id": 5, "name": "pbs-1", "is_online": true, "node_type": "pbs"},
        {"id": 2, "name": "pve-b", "is_online": true}
    ]);

    let f = fixture_with(Some("T1"), CacheOptions::default());
    f.transport.on(Method::GET, NODES, MockReply::json(200, inventory.clone()));
    f.transport.on(Method::GET, COMPLETE, MockReply::json(200, complete_data("vm:100")));
    assert_eq!(f.cache.fetch_cluster_data(true, false).await, FetchOutcome::Updated);

    let options = CacheOptions { coordinator: CoordinatorPolicy::FirstOnline, ..CacheOptions::default() };
    let f = fixture_with(Some("T1"), options);
    f.transport.on(Method::GET, NODES, MockReply::json(200, inventory));
    f.transport.on(Method::GET, "/ha/node/2/complete-data", MockReply::json(200, complete_data("vm:100")));
    assert_eq!(f.cache.fetch_cluster_data(true, false).await, FetchOutcome::Updated);
    assert_eq!(f.transport.count(Method::GET, COMPLETE), 0);
}

#[test]
fn first_online_falls_back_to_first() {
    let nodes: Vec<Node> = serde_json::from_value(json!([
        {"id": 7, "name": "pve-a"}, {"id": 8, "name": "pve-b"}
    ])).unwrap();
    assert_eq!(pick_coordinator(&nodes, CoordinatorPolicy::FirstOnline).map(|n| n.id), Some(7));
    assert!(pick_coordinator(&[], CoordinatorPolicy::First).is_none());
}

#[tokio::test(start_paused = true)]
async fn restarting_refresh_keeps_one_timer() {
    let f = fixture();
    f.transport.on(Method::GET, COMPLETE, MockReply::json(200, complete_data("vm:100")));

    f.cache.start_background_refresh(Duration::from_secs(30));
    f.cache.start_background_refresh(Duration::from_secs(30));
    assert!(f.cache.is_refreshing());

    sleep(Duration::from_secs(95)).await;
    assert_eq!(f.transport.count(Method::GET, COMPLETE), 3);
    assert!(!f.cache.is_loading());
    f.cache.shutdown();
}

#[tokio::test(start_paused = true)]
async fn stopped_refresh_stays_quiet() {
    let f = fixture();
    f.transport.on(Method::GET, COMPLETE, MockReply::json(200, complete_data("vm:100")));

    f.cache.start_background_refresh(Duration::from_secs(30));
    sleep(Duration::from_secs(35)).await;
    assert_eq!(f.transport.count(Method::GET, COMPLETE), 1);

    f.cache.stop_background_refresh();
    f.cache.stop_background_refresh();
    assert!(!f.cache.is_refreshing());
    sleep(Duration::from_secs(120)).await;
    assert_eq!(f.transport.count(Method::GET, COMPLETE), 1);
}

#[tokio::test(start_paused = true)]
async fn tick_skipped_while_fetch_in_flight() {
    let f = fixture();
    f.transport.on(Method::GET, COMPLETE, MockReply::json(200, complete_data("vm:slow")).after(Duration::from_secs(40)));
    f.transport.on(Method::GET, COMPLETE, MockReply::json(200, complete_data("vm:100")));

    f.cache.start_background_refresh(Duration::from_secs(30));
    let (outcome, _) = tokio::join!(
        f.cache.fetch_cluster_data(true, false),
        sleep(Duration::from_secs(65))
    );
    assert_eq!(outcome, FetchOutcome::Updated);
    // foreground at 0s, tick at 30s skipped, tick at 60s fetched
    assert_eq!(f.transport.count(Method::GET, COMPLETE), 2);
    assert_eq!(f.cache.snapshot().ha_resources[0].sid, "vm:100");
    f.cache.shutdown();
}

#[tokio::test(start_paused = true)]
async fn dropping_cache_cancels_refresh() {
    let f = fixture();
    f.transport.on(Method::GET, COMPLETE, MockReply::json(200, complete_data("vm:100")));

    f.cache.start_background_refresh(Duration::from_secs(30));
    let weak = Arc::downgrade(&f.cache);
    let transport = f.transport.clone();
    drop(f);

    sleep(Duration::from_secs(100)).await;
    assert!(weak.upgrade().is_none());
    assert_eq!(transport.total(), 0);
}

#[tokio::test]
async fn subscribers_see_every_write() {
    let f = fixture();
    f.transport.on(Method::GET, COMPLETE, MockReply::json(200, complete_data("vm:100")));
    let rx = f.cache.subscribe();

    f.cache.fetch_cluster_data(true, false).await;
    f.transport.replace(Method::GET, COMPLETE, MockReply::status(500));
    f.cache.fetch_cluster_data(true, false).await;
    assert_eq!(*rx.borrow(), 2);
}

#[test]
fn analysis_and_history_are_stored_without_requests() {
    let f = fixture_with(Some("T1"), CacheOptions::default());
    assert!(f.cache.analysis().is_none());

    f.cache.set_analysis_result(json!({"recommendations": [{"vmid": 100, "target": "pve-b"}]}));
    let analysis = f.cache.analysis().unwrap();
    assert_eq!(analysis.data["recommendations"][0]["vmid"], json!(100));

    let records: Vec<MigrationRecord> = serde_json::from_value(json!([{"id": 1, "status": "completed"}])).unwrap();
    f.cache.set_migration_history(records.clone());
    assert_eq!(f.cache.migration_history(), records);
    assert_eq!(f.transport.total(), 0);
}

#[tokio::test(start_paused = true)]
async fn out_of_range_interval_is_clamped() {
    let f = fixture();
    f.transport.on(Method::GET, COMPLETE, MockReply::json(200, complete_data("vm:100")));

    f.cache.start_background_refresh(Duration::from_secs(u64::MAX));
    sleep(Duration::from_secs(5)).await;
    assert!(f.cache.is_refreshing());
    assert_eq!(f.transport.total(), 0);

    sleep(Duration::from_secs(24 * 60 * 60)).await;
    assert_eq!(f.transport.count(Method::GET, COMPLETE), 1);

    f.cache.start_background_refresh(Duration::ZERO);
    sleep(Duration::from_millis(1500)).await;
    assert_eq!(f.transport.count(Method::GET, COMPLETE), 2);
    f.cache.shutdown();
}
