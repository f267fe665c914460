//! linesight -- live manufacturing test-result dashboard core.
//!
//! Merges a one-shot historical snapshot with a live WebSocket feed into one
//! bounded window of recent results, keeps running pass/fail counters over
//! everything seen, and derives the cumulative yield trend for charting.

pub mod api;
pub mod config;
pub mod dashboard;
pub mod ingest;
pub mod model;
pub mod store;
pub mod trend;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;

use crate::api::state::AppState;
use crate::config::LinesightConfig;
use crate::dashboard::{Dashboard, DashboardView};
use crate::ingest::{HttpSnapshotSource, LiveFeed, SnapshotSource, WsLiveFeed};

/// Build the HTTP snapshot source and the WebSocket feed for `config`.
pub fn sources(config: &LinesightConfig) -> Result<(Arc<dyn SnapshotSource>, Arc<dyn LiveFeed>)> {
    let snapshot: Arc<dyn SnapshotSource> = Arc::new(
        HttpSnapshotSource::new(&config.upstream)
            .context("failed to build snapshot HTTP client")?,
    );
    let feed: Arc<dyn LiveFeed> = Arc::new(WsLiveFeed::new(
        config.upstream.live_url.clone(),
        config.reconnect.clone(),
    ));
    Ok((snapshot, feed))
}

/// Start the core against the configured upstream and serve the read API
/// until Ctrl-C.
pub async fn serve(config: LinesightConfig) -> Result<()> {
    let (snapshot, feed) = sources(&config)?;
    let dashboard = Dashboard::from_config(&config.window);

    // Dropping `running` on any early return below cancels the feed.
    let running = dashboard.start(snapshot, feed);

    let addr: SocketAddr = config
        .api
        .listen_address
        .parse()
        .with_context(|| format!("invalid api.listen_address: {}", config.api.listen_address))?;
    let app = api::router(AppState::new(dashboard));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, upstream = %config.upstream.base_url, "linesight listening");

    let stop = running.cancellation();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = shutdown_signal() => {}
                _ = stop.cancelled() => {}
            }
        })
        .await?;

    running.shutdown().await;
    Ok(())
}

/// One-shot fetch of the snapshot into a fresh dashboard.
///
/// Fails only when neither half of the snapshot could be retrieved.
pub async fn snapshot_view(config: &LinesightConfig) -> Result<DashboardView> {
    let source = HttpSnapshotSource::new(&config.upstream)
        .context("failed to build snapshot HTTP client")?;
    let snapshot = source.load_snapshot(config.window.capacity).await;

    if snapshot.errors.len() == 2 {
        let reasons: Vec<String> = snapshot.errors.iter().map(|e| e.to_string()).collect();
        anyhow::bail!("snapshot unavailable: {}", reasons.join("; "));
    }

    let dashboard = Dashboard::from_config(&config.window);
    dashboard.apply_snapshot(snapshot).await;
    Ok(dashboard.view().await)
}

/// Hand a fresh view to `on_change` after every change seen on `changes`
/// until `shutdown` resolves. `shutdown` is polled before each update.
pub async fn follow<S, F>(
    dashboard: &Dashboard,
    mut changes: watch::Receiver<u64>,
    shutdown: S,
    mut on_change: F,
) -> Result<()>
where
    S: Future<Output = ()>,
    F: FnMut(&DashboardView) -> Result<()>,
{
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => return Ok(()),
            changed = changes.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                on_change(&dashboard.view().await)?;
            }
        }
    }
}

/// Resolves on Ctrl-C. If the signal cannot be installed, never resolves.
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
