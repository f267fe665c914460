//! Shared fakes for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use linesight::dashboard::{Dashboard, DashboardView};
use linesight::ingest::{FeedEvent, LiveFeed, ResultsBatch, SnapshotSource, SourceError};
use linesight::model::{AggregateCounters, TestResultEvent, TestStatus};
use tokio::sync::{mpsc, watch, Mutex};
use tokio_util::sync::CancellationToken;

pub fn result(barcode: &str, status: TestStatus) -> TestResultEvent {
    TestResultEvent {
        barcode: barcode.to_string(),
        machine_id: "JIG-01".to_string(),
        product_id: "PROD-X".to_string(),
        measured_value: if status == TestStatus::Pass { 92.0 } else { 41.0 },
        status,
        timestamp: Utc.with_ymd_and_hms(2024, 6, 1, 9, 30, 0).unwrap(),
    }
}

pub fn barcodes(window: &[TestResultEvent]) -> Vec<String> {
    window.iter().map(|e| e.barcode.clone()).collect()
}

/// Wait until `pred` holds for the dashboard view, failing after 5 seconds.
pub async fn wait_until(dashboard: &Dashboard, pred: impl Fn(&DashboardView) -> bool) {
    let mut changes = dashboard.subscribe();
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if pred(&dashboard.view().await) {
                return;
            }
            changes.changed().await.expect("dashboard dropped");
        }
    })
    .await
    .expect("timed out waiting for dashboard state");
}

/// Snapshot source that holds its answer until released.
pub struct GatedSnapshot {
    events: Vec<TestResultEvent>,
    counters: Option<AggregateCounters>,
    release: watch::Receiver<bool>,
}

impl GatedSnapshot {
    /// `counters: None` makes the metrics request fail.
    pub fn new(
        events: Vec<TestResultEvent>,
        counters: Option<AggregateCounters>,
    ) -> (Self, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        (
            Self {
                events,
                counters,
                release: rx,
            },
            tx,
        )
    }

    pub fn ready(events: Vec<TestResultEvent>, counters: Option<AggregateCounters>) -> Self {
        let (source, release) = Self::new(events, counters);
        release.send_replace(true);
        source
    }

    async fn released(&self) {
        let mut release = self.release.clone();
        let _ = release.wait_for(|open| *open).await;
    }
}

#[async_trait]
impl SnapshotSource for GatedSnapshot {
    async fn fetch_results(&self, limit: usize) -> Result<ResultsBatch, SourceError> {
        self.released().await;
        Ok(ResultsBatch {
            events: self.events.iter().take(limit).cloned().collect(),
            dropped: 0,
        })
    }

    async fn fetch_counters(&self) -> Result<AggregateCounters, SourceError> {
        self.released().await;
        self.counters.ok_or_else(|| SourceError::Status {
            url: "http://fake/metrics".to_string(),
            status: 503,
        })
    }
}

/// Snapshot source whose requests always fail.
pub struct FailingSnapshot;

#[async_trait]
impl SnapshotSource for FailingSnapshot {
    async fn fetch_results(&self, _limit: usize) -> Result<ResultsBatch, SourceError> {
        Err(SourceError::Body {
            url: "http://fake/results".to_string(),
            reason: "connection reset".to_string(),
        })
    }

    async fn fetch_counters(&self) -> Result<AggregateCounters, SourceError> {
        Err(SourceError::Status {
            url: "http://fake/metrics".to_string(),
            status: 500,
        })
    }
}

/// Live feed driven by the test through a channel. Stays "connected" until
/// the test drops its sender or the dashboard cancels.
pub struct ManualFeed {
    inbox: Mutex<Option<mpsc::Receiver<FeedEvent>>>,
    closed: Arc<AtomicBool>,
}

impl ManualFeed {
    pub fn new() -> (Self, mpsc::Sender<FeedEvent>, Arc<AtomicBool>) {
        let (tx, rx) = mpsc::channel(64);
        let closed = Arc::new(AtomicBool::new(false));
        (
            Self {
                inbox: Mutex::new(Some(rx)),
                closed: closed.clone(),
            },
            tx,
            closed,
        )
    }
}

#[async_trait]
impl LiveFeed for ManualFeed {
    async fn run(&self, sink: mpsc::Sender<FeedEvent>, cancel: CancellationToken) {
        let Some(mut inbox) = self.inbox.lock().await.take() else {
            return;
        };
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = inbox.recv() => next,
            };
            match next {
                Some(event) => {
                    if sink.send(event).await.is_err() {
                        break;
                    }
                }
                None => break,
            }
        }
        self.closed.store(true, Ordering::SeqCst);
    }
}
