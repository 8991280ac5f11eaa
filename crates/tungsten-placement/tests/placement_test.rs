//! Placement engine scenarios: guard rails, candidate exhaustion, and
//! double-placement avoidance, driven with a recording activator stub.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use tungsten_api::{
    GatewayRegistration, OperationContext, WriterGroupInfo, WriterGroupPlacement,
    WriterGroupState,
};
use tungsten_core::SyncJob;
use tungsten_placement::{PlacementEngine, WriterGroupActivator, WriterGroupSync};
use tungsten_registry::GatewayRegistry;
use tungsten_store::{DocumentStore, MemoryStore, ShutdownSignal};

/// Records every activation attempt; optionally fails them all
struct RecordingActivator {
    attempts: Mutex<Vec<WriterGroupPlacement>>,
    fail_all: bool,
}

impl RecordingActivator {
    fn succeeding() -> Arc<Self> {
        Arc::new(Self {
            attempts: Mutex::new(Vec::new()),
            fail_all: false,
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            attempts: Mutex::new(Vec::new()),
            fail_all: true,
        })
    }

    fn attempts(&self) -> Vec<WriterGroupPlacement> {
        self.attempts.lock().clone()
    }
}

#[async_trait]
impl WriterGroupActivator for RecordingActivator {
    async fn activate(
        &self,
        placement: &WriterGroupPlacement,
        _credential: &str,
    ) -> anyhow::Result<()> {
        self.attempts.lock().push(placement.clone());
        if self.fail_all {
            anyhow::bail!("agent refused the workload")
        }
        Ok(())
    }
}

struct Fixture {
    groups: Arc<MemoryStore<WriterGroupInfo>>,
    gateways: Arc<GatewayRegistry>,
    signal: ShutdownSignal,
}

fn fixture() -> Fixture {
    Fixture {
        groups: Arc::new(MemoryStore::new()),
        gateways: Arc::new(GatewayRegistry::new(Arc::new(MemoryStore::new()))),
        signal: ShutdownSignal::never(),
    }
}

impl Fixture {
    fn engine(&self, activator: Arc<RecordingActivator>) -> PlacementEngine {
        PlacementEngine::with_seed(
            self.groups.clone(),
            self.gateways.clone(),
            activator,
            7,
        )
    }

    async fn add_group(&self, mutate: impl FnOnce(&mut WriterGroupInfo)) -> String {
        let mut group = WriterGroupInfo {
            name: "line1-telemetry".to_string(),
            site_id: "site-1".to_string(),
            state: WriterGroupState::Pending,
            primary_key: Some("key-1".to_string()),
            ..Default::default()
        };
        mutate(&mut group);
        let group = group.with_computed_id();
        self.groups.add(group.clone()).await.unwrap();
        group.writer_group_id
    }

    async fn add_gateway(&self, device: &str, publisher: Option<&str>, connected: bool) {
        self.gateways
            .register_reported(
                GatewayRegistration {
                    device_id: device.to_string(),
                    site_id: "site-1".to_string(),
                    connected,
                    publisher_module_id: publisher.map(|p| p.to_string()),
                    ..Default::default()
                },
                &OperationContext::new("test"),
            )
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn connected_group_places_without_activation_calls() {
    let f = fixture();
    let activator = RecordingActivator::succeeding();
    let id = f.add_group(|g| g.connected = true).await;
    f.add_gateway("gw-1", Some("publisher"), true).await;

    let engine = f.engine(activator.clone());
    assert!(engine.place_writer_group(&id, &f.signal).await);

    // Already placed: the activator must never have been asked
    assert!(activator.attempts().is_empty());
}

#[tokio::test]
async fn disabled_group_is_nothing_to_do() {
    let f = fixture();
    let activator = RecordingActivator::succeeding();
    let id = f.add_group(|g| g.state = WriterGroupState::Disabled).await;

    let engine = f.engine(activator.clone());
    assert!(engine.place_writer_group(&id, &f.signal).await);
    assert!(activator.attempts().is_empty());
}

#[tokio::test]
async fn exhausted_candidates_fail_gracefully() {
    let f = fixture();
    let activator = RecordingActivator::failing();
    let id = f.add_group(|_| {}).await;
    f.add_gateway("gw-1", Some("publisher"), true).await;
    f.add_gateway("gw-2", Some("publisher"), true).await;
    f.add_gateway("gw-3", Some("publisher"), true).await;

    let engine = f.engine(activator.clone());
    assert!(!engine.place_writer_group(&id, &f.signal).await);

    // Every candidate was attempted exactly once, no retry within a sweep
    let attempts = activator.attempts();
    assert_eq!(attempts.len(), 3);
    let mut publishers: Vec<String> =
        attempts.iter().map(|p| p.publisher_id.clone()).collect();
    publishers.sort();
    publishers.dedup();
    assert_eq!(publishers.len(), 3);
}

#[tokio::test]
async fn first_success_wins() {
    let f = fixture();
    let activator = RecordingActivator::succeeding();
    let id = f.add_group(|_| {}).await;
    f.add_gateway("gw-1", Some("publisher"), true).await;
    f.add_gateway("gw-2", Some("publisher"), true).await;
    f.add_gateway("gw-3", Some("publisher"), true).await;

    let engine = f.engine(activator.clone());
    assert!(engine.place_writer_group(&id, &f.signal).await);
    assert_eq!(activator.attempts().len(), 1);
}

#[tokio::test]
async fn missing_site_fails_fast() {
    let f = fixture();
    let activator = RecordingActivator::succeeding();
    let id = f.add_group(|g| g.site_id = String::new()).await;

    let engine = f.engine(activator.clone());
    assert!(!engine.place_writer_group(&id, &f.signal).await);
    assert!(activator.attempts().is_empty());
}

#[tokio::test]
async fn unprovisioned_group_is_skipped() {
    let f = fixture();
    let activator = RecordingActivator::succeeding();
    let id = f.add_group(|g| g.primary_key = None).await;
    f.add_gateway("gw-1", Some("publisher"), true).await;

    let engine = f.engine(activator.clone());
    assert!(!engine.place_writer_group(&id, &f.signal).await);
    assert!(activator.attempts().is_empty());
}

#[tokio::test]
async fn empty_candidate_pool_defers() {
    let f = fixture();
    let activator = RecordingActivator::succeeding();
    let id = f.add_group(|_| {}).await;
    // One gateway exists but is disconnected, another in a different site
    f.add_gateway("gw-1", Some("publisher"), false).await;
    f.gateways
        .register_reported(
            GatewayRegistration {
                device_id: "gw-other".to_string(),
                site_id: "site-2".to_string(),
                connected: true,
                publisher_module_id: Some("publisher".to_string()),
                ..Default::default()
            },
            &OperationContext::new("test"),
        )
        .await
        .unwrap();

    let engine = f.engine(activator.clone());
    assert!(!engine.place_writer_group(&id, &f.signal).await);
    assert!(activator.attempts().is_empty());
}

#[tokio::test]
async fn gateways_without_publisher_are_skipped() {
    let f = fixture();
    let activator = RecordingActivator::succeeding();
    let id = f.add_group(|_| {}).await;
    f.add_gateway("gw-bare", None, true).await;
    f.add_gateway("gw-full", Some("publisher"), true).await;

    let engine = f.engine(activator.clone());
    assert!(engine.place_writer_group(&id, &f.signal).await);

    let attempts = activator.attempts();
    assert_eq!(attempts.len(), 1);
    assert_eq!(
        attempts[0].publisher_id,
        tungsten_common::identity::agent_id("pub", "gw-full", "publisher")
    );
}

#[tokio::test]
async fn missing_group_never_throws() {
    let f = fixture();
    let activator = RecordingActivator::succeeding();
    let engine = f.engine(activator);

    // Store error (not found) is converted to false, not propagated
    assert!(!engine.place_writer_group("wg-missing", &f.signal).await);
}

#[tokio::test]
async fn sweep_only_offers_unplaced_groups() {
    let f = fixture();
    let activator = RecordingActivator::succeeding();
    f.add_gateway("gw-1", Some("publisher"), true).await;

    let pending = f.add_group(|_| {}).await;
    f.add_group(|g| {
        g.name = "already-placed".to_string();
        g.connected = true;
    })
    .await;
    f.add_group(|g| {
        g.name = "switched-off".to_string();
        g.state = WriterGroupState::Disabled;
    })
    .await;

    let engine = Arc::new(f.engine(activator.clone()));
    let sync = WriterGroupSync::new(f.groups.clone(), engine);
    sync.run_once(&f.signal).await.unwrap();

    let attempts = activator.attempts();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].writer_group_id, pending);
}
