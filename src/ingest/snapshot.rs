//! Startup snapshot over HTTP: the recent results list and the server-side
//! counters.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::{ResultsBatch, SnapshotSource, SourceError};
use crate::config::UpstreamConfig;
use crate::model::{AggregateCounters, TestResultEvent};

/// Body of the metrics endpoint. Extra fields such as `pass_rate` are ignored.
#[derive(Debug, Deserialize)]
struct MetricsPayload {
    total_tests: u64,
    pass_count: u64,
    fail_count: u64,
}

impl MetricsPayload {
    /// `None` when `pass_count + fail_count` does not fit the counters.
    fn into_counters(self) -> Option<AggregateCounters> {
        let counters = AggregateCounters::checked_from_parts(self.pass_count, self.fail_count)?;
        if self.total_tests != counters.total {
            warn!(
                total_tests = self.total_tests,
                pass_count = self.pass_count,
                fail_count = self.fail_count,
                "server totals disagree, using pass_count + fail_count"
            );
        }
        Some(counters)
    }
}

/// Validate a results body record by record. A bad record is dropped and
/// counted; only a body that is not an array fails the batch.
pub fn parse_results_batch(url: &str, body: Value) -> Result<ResultsBatch, SourceError> {
    let Value::Array(records) = body else {
        return Err(SourceError::Body {
            url: url.to_string(),
            reason: "expected a JSON array of results".to_string(),
        });
    };

    let mut batch = ResultsBatch::default();
    for (position, record) in records.into_iter().enumerate() {
        match TestResultEvent::from_value(record) {
            Ok(event) => batch.events.push(event),
            Err(e) => {
                warn!(%url, position, error = %e, "dropping malformed snapshot record");
                batch.dropped += 1;
            }
        }
    }
    Ok(batch)
}

/// Parse the metrics body into counters.
pub fn parse_counters(url: &str, body: Value) -> Result<AggregateCounters, SourceError> {
    let payload: MetricsPayload = serde_json::from_value(body).map_err(|e| SourceError::Body {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    payload.into_counters().ok_or_else(|| SourceError::Body {
        url: url.to_string(),
        reason: "pass_count + fail_count overflows".to_string(),
    })
}

/// [`SnapshotSource`] backed by the results API.
pub struct HttpSnapshotSource {
    client: Client,
    results_url: String,
    metrics_url: String,
}

impl HttpSnapshotSource {
    pub fn new(config: &UpstreamConfig) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|source| SourceError::Http {
                url: config.base_url.clone(),
                source,
            })?;
        Ok(Self {
            client,
            results_url: config.results_url(),
            metrics_url: config.metrics_url(),
        })
    }

    async fn get_json(&self, url: &str, query: &[(&str, String)]) -> Result<Value, SourceError> {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|source| SourceError::Http {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response.json::<Value>().await.map_err(|e| SourceError::Body {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl SnapshotSource for HttpSnapshotSource {
    async fn fetch_results(&self, limit: usize) -> Result<ResultsBatch, SourceError> {
        let query = [("skip", "0".to_string()), ("limit", limit.to_string())];
        let body = self.get_json(&self.results_url, &query).await?;
        let batch = parse_results_batch(&self.results_url, body)?;
        debug!(
            url = %self.results_url,
            accepted = batch.events.len(),
            dropped = batch.dropped,
            "fetched snapshot results"
        );
        Ok(batch)
    }

    async fn fetch_counters(&self) -> Result<AggregateCounters, SourceError> {
        let body = self.get_json(&self.metrics_url, &[]).await?;
        let counters = parse_counters(&self.metrics_url, body)?;
        debug!(url = %self.metrics_url, ?counters, "fetched snapshot counters");
        Ok(counters)
    }
}
