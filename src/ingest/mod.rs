//! Event source adapter: turns the one-shot snapshot and the live push feed
//! into validated [`TestResultEvent`]s plus connectivity transitions.

pub mod live;
pub mod snapshot;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::model::{AggregateCounters, TestResultEvent};

pub use self::live::WsLiveFeed;
pub use self::snapshot::HttpSnapshotSource;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("malformed body from {url}: {reason}")]
    Body { url: String, reason: String },
    #[error("live feed error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Validated records from one results request.
#[derive(Debug, Default)]
pub struct ResultsBatch {
    /// Newest first, as delivered by the origin.
    pub events: Vec<TestResultEvent>,
    /// Records rejected by validation.
    pub dropped: usize,
}

/// Everything the startup fetch produced. Failures are carried, not raised:
/// a failed half is simply empty.
#[derive(Debug, Default)]
pub struct Snapshot {
    pub events: Vec<TestResultEvent>,
    pub counters: Option<AggregateCounters>,
    pub dropped: usize,
    pub errors: Vec<SourceError>,
}

impl Snapshot {
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}

/// One-shot historical retrieval.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Fetch up to `limit` recent results, newest first.
    async fn fetch_results(&self, limit: usize) -> Result<ResultsBatch, SourceError>;

    /// Fetch the server-side aggregate counters.
    async fn fetch_counters(&self) -> Result<AggregateCounters, SourceError>;

    /// Run both requests concurrently. Never fails; see [`Snapshot::errors`].
    async fn load_snapshot(&self, limit: usize) -> Snapshot {
        let (results, counters) = tokio::join!(self.fetch_results(limit), self.fetch_counters());

        let mut snapshot = Snapshot::default();
        match results {
            Ok(batch) => {
                snapshot.events = batch.events;
                snapshot.dropped = batch.dropped;
            }
            Err(e) => snapshot.errors.push(e),
        }
        match counters {
            Ok(c) => snapshot.counters = Some(c),
            Err(e) => snapshot.errors.push(e),
        }
        snapshot
    }
}

/// What the live feed reports to its consumer, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// Handshake completed.
    Connected { connection_id: Uuid },
    /// One validated result.
    Result(TestResultEvent),
    /// Connection attempt failed, or an open connection closed or errored.
    Disconnected { connection_id: Uuid, reason: String },
}

/// Persistent push channel of results.
#[async_trait]
pub trait LiveFeed: Send + Sync {
    /// Drive the feed until it ends for good or `cancel` fires. The
    /// connection is closed before returning on every path.
    async fn run(&self, sink: mpsc::Sender<FeedEvent>, cancel: CancellationToken);
}
