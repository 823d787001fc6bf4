// Written by Paul Clevett
// (C)Copyright Wolf Software Systems Ltd
// https://wolf.uk.com

//! Cluster State Cache — consolidated HA/cluster snapshot for the panel
//!
//! The snapshot is fetched from a coordinator node, reused while fresh, and
//! kept when a refresh fails (the error is recorded next to the old data).
//! Every fetch attempt takes a sequence number; a result is only written if
//! no newer attempt has written already, so a slow response can never
//! overwrite a fresher one.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::api::ha::{self, ClusterNode, ClusterStatus, CompleteData, Guest, HaGroup, HaResource};
use crate::api::load_balancer::MigrationRecord;
use crate::api::nodes::{self, Node};
use crate::config::{CoordinatorPolicy, PanelConfig};
use crate::error::GatewayError;
use crate::gateway::Gateway;
use crate::session::SessionState;

mod refresh;

pub const FAILED_TO_LOAD: &str = "Failed to load HA data";
pub const NETWORK_ERROR: &str = "Network error loading HA data";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterSnapshot {
    pub ha_resources: Vec<HaResource>,
    pub ha_groups: Vec<HaGroup>,
    pub available_guests: Vec<Guest>,
    pub cluster_nodes: Vec<ClusterNode>,
    pub cluster_status: Option<ClusterStatus>,
    /// Only moves forward on a successful fetch
    pub last_updated: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

/// Load-balancer analysis handed to the cache by whoever ran it
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisResult {
    pub data: serde_json::Value,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The backend answered with a non-OK status or an unusable body
    Http,
    /// No response at all
    Network,
}

/// What a call to [`ClusterCache::fetch_cluster_data`] ended up doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Snapshot younger than the staleness window; nothing sent
    Fresh,
    NoCredential,
    NoCoordinator,
    Updated,
    Failed(FailureKind),
    /// A newer attempt already wrote; this result was dropped
    Superseded,
}

#[derive(Debug, Clone)]
pub struct CacheOptions {
    pub stale_after: Duration,
    pub coordinator: CoordinatorPolicy,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            stale_after: Duration::from_secs(60),
            coordinator: CoordinatorPolicy::First,
        }
    }
}

impl CacheOptions {
    pub fn from_config(config: &PanelConfig) -> Self {
        Self {
            stale_after: config.stale_after(),
            coordinator: config.coordinator,
        }
    }
}

#[derive(Default)]
struct Inner {
    snapshot: ClusterSnapshot,
    /// Highest sequence number written to `snapshot`
    applied_seq: u64,
    /// Monotonic time of the last successful write, for the staleness gate
    fetched_at: Option<Instant>,
}

/// Holds a counter up for as long as it lives
struct Hold<'a>(&'a AtomicUsize);

impl<'a> Hold<'a> {
    fn new(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for Hold<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct ClusterCache {
    gateway: Arc<Gateway>,
    session: Arc<SessionState>,
    options: CacheOptions,
    inner: RwLock<Inner>,
    analysis: RwLock<Option<AnalysisResult>>,
    migration_history: RwLock<Vec<MigrationRecord>>,
    next_seq: AtomicU64,
    /// Foreground fetches only; drives the busy indicator
    loading: AtomicUsize,
    /// Every fetch, foreground or background
    in_flight: AtomicUsize,
    poller: Mutex<Option<JoinHandle<()>>>,
    changes: watch::Sender<u64>,
}

impl ClusterCache {
    pub fn new(gateway: Arc<Gateway>, session: Arc<SessionState>, options: CacheOptions) -> Arc<Self> {
        let (changes, _) = watch::channel(0);
        Arc::new(Self {
            gateway,
            session,
            options,
            inner: RwLock::new(Inner::default()),
            analysis: RwLock::new(None),
            migration_history: RwLock::new(Vec::new()),
            next_seq: AtomicU64::new(0),
            loading: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            poller: Mutex::new(None),
            changes,
        })
    }

    pub fn snapshot(&self) -> ClusterSnapshot {
        self.inner.read().snapshot.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst) > 0
    }

    pub fn is_fetching(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }

    /// Bumped every time the snapshot is written
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    fn is_fresh(&self) -> bool {
        self.inner.read().fetched_at
            .is_some_and(|at| at.elapsed() < self.options.stale_after)
    }

    /// Refresh the snapshot.
    ///
    /// `force` skips the staleness check. `background` leaves the loading
    /// indicator alone so views keep showing the current data quietly.
    /// Never fails: problems end up in the snapshot's `error` field.
    pub async fn fetch_cluster_data(&self, force: bool, background: bool) -> FetchOutcome {
        if !force && self.is_fresh() {
            debug!("Cluster snapshot still fresh, skipping fetch");
            return FetchOutcome::Fresh;
        }
        if self.session.token().is_none() {
            debug!("No credential, skipping cluster fetch");
            return FetchOutcome::NoCredential;
        }

        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let _in_flight = Hold::new(&self.in_flight);

        let Some(node_id) = self.resolve_coordinator().await else {
            return FetchOutcome::NoCoordinator;
        };

        let _loading = (!background).then(|| Hold::new(&self.loading));
        let result = ha::complete_data(&self.gateway, node_id).await;
        self.apply(seq, result)
    }

    /// Pick the node that answers consolidated cluster queries. Looked up on
    /// every fetch; the inventory can change between refreshes.
    async fn resolve_coordinator(&self) -> Option<u64> {
        let nodes = match nodes::list_nodes(&self.gateway).await {
            Ok(nodes) => nodes,
            Err(e) => {
                warn!("Cannot list nodes to find the HA coordinator: {}", e);
                return None;
            }
        };
        let picked = pick_coordinator(&nodes, self.options.coordinator);
        match picked {
            Some(node) => debug!("Using node {} ({}) as HA coordinator", node.id, node.name),
            None => debug!("Node inventory is empty, no HA coordinator"),
        }
        picked.map(|n| n.id)
    }

    fn apply(&self, seq: u64, result: Result<CompleteData, GatewayError>) -> FetchOutcome {
        let mut inner = self.inner.write();
        if seq <= inner.applied_seq {
            debug!("Dropping cluster fetch #{} (#{} already applied)", seq, inner.applied_seq);
            return FetchOutcome::Superseded;
        }
        inner.applied_seq = seq;

        let outcome = match result {
            Ok(data) => {
                let snap = &mut inner.snapshot;
                snap.ha_resources = data.ha_resources;
                snap.ha_groups = data.ha_groups;
                snap.available_guests = data.guests;
                snap.cluster_nodes = data.cluster_nodes;
                snap.cluster_status = data.cluster_status;
                snap.error = None;
                snap.last_updated = Some(Utc::now());
                inner.fetched_at = Some(Instant::now());
                FetchOutcome::Updated
            }
            Err(GatewayError::Transport(cause)) => {
                warn!("Cluster fetch #{} got no response: {}", seq, cause);
                inner.snapshot.error = Some(NETWORK_ERROR.to_string());
                FetchOutcome::Failed(FailureKind::Network)
            }
            Err(e) => {
                warn!("Cluster fetch #{} failed: {}", seq, e);
                inner.snapshot.error = Some(FAILED_TO_LOAD.to_string());
                FetchOutcome::Failed(FailureKind::Http)
            }
        };
        drop(inner);

        self.changes.send_modify(|generation| *generation += 1);
        outcome
    }

    /// Store a load-balancer analysis. No request, no staleness check.
    pub fn set_analysis_result(&self, data: impl Into<serde_json::Value>) {
        *self.analysis.write() = Some(AnalysisResult {
            data: data.into(),
            captured_at: Utc::now(),
        });
    }

    pub fn analysis(&self) -> Option<AnalysisResult> {
        self.analysis.read().clone()
    }

    pub fn set_migration_history(&self, records: Vec<MigrationRecord>) {
        *self.migration_history.write() = records;
    }

    pub fn migration_history(&self) -> Vec<MigrationRecord> {
        self.migration_history.read().clone()
    }
}

fn pick_coordinator(nodes: &[Node], policy: CoordinatorPolicy) -> Option<&Node> {
    match policy {
        CoordinatorPolicy::First => nodes.first(),
        CoordinatorPolicy::FirstOnline => nodes.iter()
            .find(|n| n.is_online && !n.is_backup_server())
            .or_else(|| nodes.first()),
    }
}

#[cfg(test)]
mod tests;
