//! Live result feed over WebSocket.
//!
//! One JSON result per frame. Frames that fail validation are logged and
//! dropped; they never end the connection. Reconnection is opt-in through
//! [`ReconnectConfig`].

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use rand::Rng;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{FeedEvent, LiveFeed};
use crate::config::ReconnectConfig;
use crate::model::TestResultEvent;

/// How one connection attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    /// Shutdown requested, or nobody is listening any more.
    Stopped,
    /// The transport failed or closed. `handshake` tells whether it had
    /// connected first.
    Lost { handshake: bool },
}

/// Doubling retry delay with +/-20% jitter.
#[derive(Debug)]
struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    fn new(config: &ReconnectConfig) -> Self {
        let initial = Duration::from_millis(config.initial_delay_ms);
        Self {
            initial,
            max: Duration::from_millis(config.max_delay_ms),
            current: initial,
        }
    }

    fn reset(&mut self) {
        self.current = self.initial;
    }

    fn next_delay(&mut self) -> Duration {
        let base = self.current;
        self.current = (self.current * 2).min(self.max);
        let factor = rand::thread_rng().gen_range(0.8..=1.2);
        base.mul_f64(factor)
    }
}

/// [`LiveFeed`] over a WebSocket connection.
pub struct WsLiveFeed {
    url: String,
    reconnect: ReconnectConfig,
}

impl WsLiveFeed {
    pub fn new(url: impl Into<String>, reconnect: ReconnectConfig) -> Self {
        Self {
            url: url.into(),
            reconnect,
        }
    }

    async fn run_session(
        &self,
        connection_id: Uuid,
        sink: &mpsc::Sender<FeedEvent>,
        cancel: &CancellationToken,
    ) -> SessionEnd {
        let connect = tokio::select! {
            biased;
            _ = cancel.cancelled() => return SessionEnd::Stopped,
            result = tokio_tungstenite::connect_async(self.url.as_str()) => result,
        };

        let mut ws = match connect {
            Ok((ws, _response)) => ws,
            Err(e) => {
                warn!(%connection_id, url = %self.url, error = %e, "live feed connect failed");
                let lost = FeedEvent::Disconnected {
                    connection_id,
                    reason: e.to_string(),
                };
                if sink.send(lost).await.is_err() {
                    return SessionEnd::Stopped;
                }
                return SessionEnd::Lost { handshake: false };
            }
        };

        info!(%connection_id, url = %self.url, "live feed connected");
        if sink.send(FeedEvent::Connected { connection_id }).await.is_err() {
            let _ = ws.close(None).await;
            return SessionEnd::Stopped;
        }

        let mut dropped = 0usize;
        let reason = loop {
            let frame = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    if let Err(e) = ws.close(None).await {
                        debug!(%connection_id, error = %e, "close handshake did not complete");
                    }
                    info!(%connection_id, dropped, "live feed closed on shutdown");
                    return SessionEnd::Stopped;
                }
                frame = ws.next() => frame,
            };

            let payload = match frame {
                Some(Ok(Message::Text(text))) => text.into_bytes(),
                Some(Ok(Message::Binary(bytes))) => bytes.to_vec(),
                Some(Ok(Message::Close(close))) => {
                    break match close {
                        Some(frame) => format!("closed by server ({}: {})", frame.code, frame.reason),
                        None => "closed by server".to_string(),
                    };
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => break e.to_string(),
                None => break "stream ended".to_string(),
            };

            match TestResultEvent::from_slice(&payload) {
                Ok(event) => {
                    debug!(
                        %connection_id,
                        barcode = %event.barcode,
                        status = %event.status,
                        "live result received"
                    );
                    if sink.send(FeedEvent::Result(event)).await.is_err() {
                        let _ = ws.close(None).await;
                        return SessionEnd::Stopped;
                    }
                }
                Err(e) => {
                    dropped += 1;
                    warn!(%connection_id, error = %e, dropped, "dropping malformed live frame");
                }
            }
        };

        warn!(%connection_id, %reason, dropped, "live feed disconnected");
        let lost = FeedEvent::Disconnected {
            connection_id,
            reason,
        };
        if sink.send(lost).await.is_err() {
            return SessionEnd::Stopped;
        }
        SessionEnd::Lost { handshake: true }
    }
}

#[async_trait]
impl LiveFeed for WsLiveFeed {
    async fn run(&self, sink: mpsc::Sender<FeedEvent>, cancel: CancellationToken) {
        let mut backoff = Backoff::new(&self.reconnect);

        loop {
            let connection_id = Uuid::new_v4();
            match self.run_session(connection_id, &sink, &cancel).await {
                SessionEnd::Stopped => return,
                SessionEnd::Lost { handshake } => {
                    if !self.reconnect.enabled {
                        info!(url = %self.url, "live feed ended, reconnect disabled");
                        return;
                    }
                    if handshake {
                        backoff.reset();
                    }
                    let delay = backoff.next_delay();
                    info!(url = %self.url, delay_ms = delay.as_millis() as u64, "reconnecting live feed");
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }
}
