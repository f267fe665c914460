//! Core data model: test results, aggregate counters, and feed connectivity.
//!
//! Every [`TestResultEvent`] that exists in the process has passed through
//! [`TestResultEvent::from_slice`] or [`TestResultEvent::from_value`], so the
//! store and aggregator never see a structurally invalid record.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation failure for a single inbound record.
#[derive(Debug, Error)]
pub enum EventError {
    #[error("malformed result payload: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unparseable timestamp {value:?}")]
    Timestamp { value: String },
}

/// Outcome of a single test on the line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TestStatus {
    #[serde(rename = "PASS")]
    Pass,
    #[serde(rename = "FAIL")]
    Fail,
}

impl TestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestStatus::Pass => "PASS",
            TestStatus::Fail => "FAIL",
        }
    }
}

impl std::fmt::Display for TestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One completed test on the production line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestResultEvent {
    pub barcode: String,
    pub machine_id: String,
    pub product_id: String,
    pub measured_value: f64,
    pub status: TestStatus,
    /// Display only. Arrival order decides window position.
    pub timestamp: DateTime<Utc>,
}

/// Wire shape accepted from both the snapshot and the live feed.
#[derive(Debug, Deserialize)]
struct RawResult {
    barcode: String,
    #[serde(alias = "machineId")]
    machine_id: String,
    #[serde(alias = "productId")]
    product_id: String,
    #[serde(alias = "measuredValue")]
    measured_value: f64,
    status: TestStatus,
    timestamp: String,
}

impl TestResultEvent {
    /// Parse and validate a single JSON document (a live feed frame).
    pub fn from_slice(bytes: &[u8]) -> Result<Self, EventError> {
        let raw: RawResult = serde_json::from_slice(bytes)?;
        raw.try_into()
    }

    /// Validate one element of a snapshot batch.
    pub fn from_value(value: serde_json::Value) -> Result<Self, EventError> {
        let raw: RawResult = serde_json::from_value(value)?;
        raw.try_into()
    }
}

impl TryFrom<RawResult> for TestResultEvent {
    type Error = EventError;

    fn try_from(raw: RawResult) -> Result<Self, Self::Error> {
        let timestamp = parse_timestamp(&raw.timestamp)?;
        Ok(Self {
            barcode: raw.barcode,
            machine_id: raw.machine_id,
            product_id: raw.product_id,
            measured_value: raw.measured_value,
            status: raw.status,
            timestamp,
        })
    }
}

/// Accepts RFC 3339 as well as the naive ISO-8601 form the processing
/// service emits (`2023-10-27T10:00:00.123456`), which is taken as UTC.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, EventError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(naive.and_utc());
        }
    }
    Err(EventError::Timestamp {
        value: value.to_string(),
    })
}

/// Running totals over every accepted event, not bounded by the window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateCounters {
    pub total: u64,
    pub pass_count: u64,
    pub fail_count: u64,
}

impl AggregateCounters {
    /// Build counters whose total is consistent by construction.
    ///
    /// Panics if `pass_count + fail_count` overflows; use
    /// [`AggregateCounters::checked_from_parts`] for values read off the wire.
    pub fn from_parts(pass_count: u64, fail_count: u64) -> Self {
        Self::checked_from_parts(pass_count, fail_count)
            .unwrap_or_else(|| panic!("counter overflow: {pass_count} + {fail_count}"))
    }

    /// `None` when the total does not fit in a `u64`.
    pub fn checked_from_parts(pass_count: u64, fail_count: u64) -> Option<Self> {
        Some(Self {
            total: pass_count.checked_add(fail_count)?,
            pass_count,
            fail_count,
        })
    }

    /// Field-wise sum, `None` on overflow.
    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        Some(Self {
            total: self.total.checked_add(rhs.total)?,
            pass_count: self.pass_count.checked_add(rhs.pass_count)?,
            fail_count: self.fail_count.checked_add(rhs.fail_count)?,
        })
    }

    /// Counters for exactly one result.
    pub fn single(status: TestStatus) -> Self {
        match status {
            TestStatus::Pass => Self::from_parts(1, 0),
            TestStatus::Fail => Self::from_parts(0, 1),
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.pass_count.checked_add(self.fail_count) == Some(self.total)
    }

    /// Pass rate over all counted results, 0 when nothing has been counted.
    pub fn pass_rate_pct(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.pass_count as f64 / self.total as f64 * 100.0
    }
}

/// Health of the live feed only; the snapshot fetch never changes it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectivityState {
    Connected,
    #[default]
    Disconnected,
}

impl std::fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectivityState::Connected => f.write_str("CONNECTED"),
            ConnectivityState::Disconnected => f.write_str("DISCONNECTED"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_json() -> serde_json::Value {
        json!({
            "barcode": "123456789",
            "machine_id": "JIG-01",
            "product_id": "PROD-X",
            "measured_value": 85.2,
            "status": "PASS",
            "timestamp": "2023-10-27T10:00:00Z"
        })
    }

    #[test]
    fn test_parse_live_frame() {
        let bytes = serde_json::to_vec(&sample_json()).unwrap();
        let event = TestResultEvent::from_slice(&bytes).unwrap();

        assert_eq!(event.barcode, "123456789");
        assert_eq!(event.machine_id, "JIG-01");
        assert_eq!(event.product_id, "PROD-X");
        assert_eq!(event.measured_value, 85.2);
        assert_eq!(event.status, TestStatus::Pass);
        assert_eq!(event.timestamp.to_rfc3339(), "2023-10-27T10:00:00+00:00");
    }

    #[test]
    fn test_naive_timestamp_is_utc() {
        let mut value = sample_json();
        value["timestamp"] = json!("2023-10-27T10:00:00.250000");
        let event = TestResultEvent::from_value(value).unwrap();
        assert_eq!(
            event.timestamp.to_rfc3339(),
            "2023-10-27T10:00:00.250+00:00"
        );
    }

    #[test]
    fn test_snapshot_row_with_extra_fields() {
        let mut value = sample_json();
        value["id"] = json!(42);
        value["status"] = json!("FAIL");
        let event = TestResultEvent::from_value(value).unwrap();
        assert_eq!(event.status, TestStatus::Fail);
    }

    #[test]
    fn test_camel_case_aliases() {
        let value = json!({
            "barcode": "B-1",
            "machineId": "JIG-02",
            "productId": "PROD-Y",
            "measuredValue": 12.0,
            "status": "FAIL",
            "timestamp": "2024-01-01T00:00:00+02:00"
        });
        let event = TestResultEvent::from_value(value).unwrap();
        assert_eq!(event.machine_id, "JIG-02");
        assert_eq!(event.timestamp.to_rfc3339(), "2023-12-31T22:00:00+00:00");
    }

    #[test]
    fn test_rejects_unknown_status() {
        let mut value = sample_json();
        value["status"] = json!("pass");
        assert!(matches!(
            TestResultEvent::from_value(value),
            Err(EventError::Malformed(_))
        ));
    }

    #[test]
    fn test_rejects_missing_field() {
        let mut value = sample_json();
        value.as_object_mut().unwrap().remove("machine_id");
        assert!(TestResultEvent::from_value(value).is_err());
    }

    #[test]
    fn test_rejects_bad_timestamp() {
        let mut value = sample_json();
        value["timestamp"] = json!("yesterday");
        assert!(matches!(
            TestResultEvent::from_value(value),
            Err(EventError::Timestamp { .. })
        ));
    }

    #[test]
    fn test_rejects_non_json_frame() {
        assert!(TestResultEvent::from_slice(b"not json").is_err());
    }

    #[test]
    fn test_counters_helpers() {
        let c = AggregateCounters::from_parts(3, 1);
        assert_eq!(c.total, 4);
        assert!(c.is_consistent());
        assert_eq!(c.pass_rate_pct(), 75.0);
        assert_eq!(AggregateCounters::default().pass_rate_pct(), 0.0);

        let sum = c.checked_add(AggregateCounters::from_parts(1, 1));
        assert_eq!(sum, Some(AggregateCounters::from_parts(4, 2)));
        assert_eq!(
            AggregateCounters::single(TestStatus::Fail),
            AggregateCounters::from_parts(0, 1)
        );
    }

    #[test]
    fn test_counters_overflow_is_detected() {
        assert!(AggregateCounters::checked_from_parts(u64::MAX, 1).is_none());

        let near_max = AggregateCounters::from_parts(u64::MAX - 1, 0);
        assert!(near_max.checked_add(AggregateCounters::from_parts(1, 0)).is_some());
        assert!(near_max.checked_add(AggregateCounters::from_parts(2, 0)).is_none());
    }

    #[test]
    fn test_connectivity_wire_names() {
        assert_eq!(
            serde_json::to_string(&ConnectivityState::Connected).unwrap(),
            "\"CONNECTED\""
        );
        assert_eq!(ConnectivityState::default(), ConnectivityState::Disconnected);
    }
}
