//! Task wiring: one snapshot attempt, one live feed, and a dispatcher that
//! applies feed messages to the [`Dashboard`] in arrival order.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::Dashboard;
use crate::ingest::{LiveFeed, SnapshotSource};
use crate::model::ConnectivityState;

/// Buffered feed messages between the connection and the dispatcher.
const FEED_CHANNEL_CAPACITY: usize = 256;

/// A started dashboard. Dropping it cancels every task; call
/// [`RunningDashboard::shutdown`] to also wait for the connection to close.
pub struct RunningDashboard {
    dashboard: Dashboard,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Dashboard {
    /// Spawn the snapshot fetch, the live feed and the dispatcher.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        &self,
        snapshot_source: Arc<dyn SnapshotSource>,
        feed: Arc<dyn LiveFeed>,
    ) -> RunningDashboard {
        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel(FEED_CHANNEL_CAPACITY);
        let limit = self.capacity;

        let snapshot_task = {
            let dashboard = self.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let snapshot = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return,
                    snapshot = snapshot_source.load_snapshot(limit) => snapshot,
                };
                if cancel.is_cancelled() {
                    return;
                }
                dashboard.apply_snapshot(snapshot).await;
            })
        };

        let feed_task = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                feed.run(tx, cancel).await;
                debug!("live feed task finished");
            })
        };

        let dispatch_task = {
            let dashboard = self.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                loop {
                    let message = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        message = rx.recv() => message,
                    };
                    let Some(message) = message else { break };
                    // Queued messages are discarded once shutdown begins.
                    if cancel.is_cancelled() {
                        break;
                    }
                    dashboard.apply_feed_event(message).await;
                }
                rx.close();
                debug!("feed dispatcher finished");
            })
        };

        info!(limit, "dashboard started");
        RunningDashboard {
            dashboard: self.clone(),
            cancel,
            tasks: vec![snapshot_task, feed_task, dispatch_task],
        }
    }
}

impl RunningDashboard {
    pub fn dashboard(&self) -> &Dashboard {
        &self.dashboard
    }

    /// Token that is cancelled when this dashboard shuts down.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop processing, close the live connection and wait for every task.
    /// Connectivity reads DISCONNECTED afterwards.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                if e.is_panic() {
                    error!(error = %e, "dashboard task panicked");
                }
            }
        }
        self.dashboard
            .set_connectivity(ConnectivityState::Disconnected)
            .await;
        info!("dashboard stopped");
    }
}

impl Drop for RunningDashboard {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
