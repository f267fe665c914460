//! Dashboard controller: the single owner of the window, the counters and
//! the connectivity flag.
//!
//! All three live in one [`DashboardState`] behind one `RwLock`, so every
//! read sees either all or none of a mutation. Cloning a [`Dashboard`] is
//! cheap and shares the state.

pub mod runtime;

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, warn};

use crate::config::WindowConfig;
use crate::ingest::{FeedEvent, Snapshot};
use crate::model::{AggregateCounters, ConnectivityState, TestResultEvent};
use crate::store::{InitOutcome, MachineTally, MetricsAggregator, ResultWindow, SeedOutcome};
use crate::trend::{self, TrendPoint};

pub use self::runtime::RunningDashboard;

#[derive(Debug)]
struct DashboardState {
    window: ResultWindow,
    aggregator: MetricsAggregator,
    connectivity: ConnectivityState,
}

/// Everything the presentation layer draws, taken from one consistent read.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardView {
    pub window: Vec<TestResultEvent>,
    pub counters: AggregateCounters,
    pub trend: Vec<TrendPoint>,
    pub connectivity: ConnectivityState,
    pub pass_rate_pct: f64,
    pub machines: Vec<MachineTally>,
}

/// What happened when a snapshot was folded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotApplied {
    pub seed: SeedOutcome,
    /// `None` when the counters half of the snapshot was unavailable.
    pub counters: Option<InitOutcome>,
}

#[derive(Clone)]
pub struct Dashboard {
    state: Arc<RwLock<DashboardState>>,
    capacity: usize,
    trend_points: usize,
    revision: Arc<watch::Sender<u64>>,
}

impl Dashboard {
    pub fn new(capacity: usize, trend_points: usize) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            state: Arc::new(RwLock::new(DashboardState {
                window: ResultWindow::new(capacity),
                aggregator: MetricsAggregator::new(),
                connectivity: ConnectivityState::Disconnected,
            })),
            capacity,
            trend_points,
            revision: Arc::new(revision),
        }
    }

    pub fn from_config(config: &WindowConfig) -> Self {
        Self::new(config.capacity, config.trend_points)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Receiver that changes on every mutation.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    fn bump(&self) {
        self.revision.send_modify(|r| *r += 1);
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Fold in the startup snapshot. Failed halves count as empty; live
    /// events already ingested stay newer and stay counted.
    pub async fn apply_snapshot(&self, snapshot: Snapshot) -> SnapshotApplied {
        for error in &snapshot.errors {
            warn!(error = %error, "snapshot fetch failed, continuing without it");
        }
        let received = snapshot.events.len();
        let dropped = snapshot.dropped;

        let applied = {
            let mut state = self.state.write().await;
            let seed = state.window.seed(snapshot.events);
            let counters = snapshot.counters.map(|c| state.aggregator.initialize(c));
            SnapshotApplied { seed, counters }
        };
        self.bump();

        info!(
            received,
            dropped,
            seed = ?applied.seed,
            counters = ?applied.counters,
            "snapshot applied"
        );
        applied
    }

    /// Accept one live result into the counters and the window under one
    /// write lock.
    pub async fn ingest(&self, event: TestResultEvent) {
        {
            let mut state = self.state.write().await;
            state.aggregator.observe(&event);
            if let Some(evicted) = state.window.push(event) {
                debug!(barcode = %evicted.barcode, "evicted oldest result");
            }
        }
        self.bump();
    }

    pub async fn set_connectivity(&self, connectivity: ConnectivityState) {
        let changed = {
            let mut state = self.state.write().await;
            let changed = state.connectivity != connectivity;
            state.connectivity = connectivity;
            changed
        };
        if changed {
            info!(%connectivity, "live feed connectivity changed");
            self.bump();
        }
    }

    /// Apply one message from the live feed.
    pub async fn apply_feed_event(&self, event: FeedEvent) {
        match event {
            FeedEvent::Connected { .. } => self.set_connectivity(ConnectivityState::Connected).await,
            FeedEvent::Result(result) => self.ingest(result).await,
            FeedEvent::Disconnected { .. } => {
                self.set_connectivity(ConnectivityState::Disconnected).await
            }
        }
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Newest-first copy of the window.
    pub async fn window(&self) -> Vec<TestResultEvent> {
        self.state.read().await.window.current()
    }

    pub async fn counters(&self) -> AggregateCounters {
        self.state.read().await.aggregator.counters()
    }

    /// Cumulative yield series over the current window.
    pub async fn trend_series(&self) -> Vec<TrendPoint> {
        let state = self.state.read().await;
        trend::compute(state.window.iter(), self.trend_points)
    }

    pub async fn connectivity(&self) -> ConnectivityState {
        self.state.read().await.connectivity
    }

    pub async fn latest_for_machine(&self, machine_id: &str) -> Option<TestResultEvent> {
        self.state
            .read()
            .await
            .window
            .latest_for_machine(machine_id)
            .cloned()
    }

    pub async fn view(&self) -> DashboardView {
        let state = self.state.read().await;
        let counters = state.aggregator.counters();
        DashboardView {
            window: state.window.current(),
            counters,
            trend: trend::compute(state.window.iter(), self.trend_points),
            connectivity: state.connectivity,
            pass_rate_pct: counters.pass_rate_pct(),
            machines: state.window.machine_tallies(),
        }
    }
}

impl Default for Dashboard {
    fn default() -> Self {
        Self::from_config(&WindowConfig::default())
    }
}
