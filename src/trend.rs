//! Cumulative yield series for the trend chart.
//!
//! Pure function of the window contents: no state, recomputed on every read.

use serde::Serialize;

use crate::model::{TestResultEvent, TestStatus};

/// Number of points the chart shows when no configuration overrides it.
pub const DEFAULT_TREND_POINTS: usize = 20;

/// One sample of cumulative yield.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrendPoint {
    /// Position in the oldest-first walk over the whole window.
    pub index: usize,
    pub pass_yield_pct: f64,
    pub fail_yield_pct: f64,
}

/// Walk the window oldest to newest, emitting the running pass/fail yield
/// after each result, and keep the last `max_points` samples.
///
/// `window` is newest first, as stored.
pub fn compute<'a, I>(window: I, max_points: usize) -> Vec<TrendPoint>
where
    I: IntoIterator<Item = &'a TestResultEvent>,
    I::IntoIter: DoubleEndedIterator,
{
    let mut pass = 0u64;
    let mut fail = 0u64;

    let mut points: Vec<TrendPoint> = window
        .into_iter()
        .rev()
        .enumerate()
        .map(|(index, event)| {
            match event.status {
                TestStatus::Pass => pass += 1,
                TestStatus::Fail => fail += 1,
            }
            let seen = (pass + fail) as f64;
            TrendPoint {
                index,
                pass_yield_pct: round1(pass as f64 / seen * 100.0),
                fail_yield_pct: round1(fail as f64 / seen * 100.0),
            }
        })
        .collect();

    let excess = points.len().saturating_sub(max_points);
    points.drain(..excess);
    points
}

/// Round half away from zero to one decimal place.
fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    /// Build a newest-first window from an oldest-first status list.
    fn window(oldest_first: &[TestStatus]) -> Vec<TestResultEvent> {
        oldest_first
            .iter()
            .rev()
            .enumerate()
            .map(|(i, status)| TestResultEvent {
                barcode: format!("B{i}"),
                machine_id: "JIG-01".to_string(),
                product_id: "PROD-X".to_string(),
                measured_value: 81.0,
                status: *status,
                timestamp: Utc::now(),
            })
            .collect()
    }

    fn yields(points: &[TrendPoint]) -> Vec<(f64, f64)> {
        points
            .iter()
            .map(|p| (p.pass_yield_pct, p.fail_yield_pct))
            .collect()
    }

    #[test]
    fn test_three_pass_then_fail() {
        use TestStatus::*;
        let w = window(&[Pass, Pass, Pass, Fail]);
        let points = compute(&w, DEFAULT_TREND_POINTS);
        assert_eq!(
            yields(&points),
            vec![(100.0, 0.0), (100.0, 0.0), (100.0, 0.0), (75.0, 25.0)]
        );
        assert_eq!(
            points.iter().map(|p| p.index).collect::<Vec<_>>(),
            vec![0, 1, 2, 3]
        );
    }

    #[test]
    fn test_empty_window() {
        assert!(compute(&Vec::<TestResultEvent>::new(), DEFAULT_TREND_POINTS).is_empty());
    }

    #[test]
    fn test_short_window_is_not_padded() {
        let w = window(&[TestStatus::Fail; 7]);
        let points = compute(&w, DEFAULT_TREND_POINTS);
        assert_eq!(points.len(), 7);
        assert!(points.iter().all(|p| p.fail_yield_pct == 100.0));
    }

    #[test]
    fn test_keeps_most_recent_points() {
        let mut statuses = vec![TestStatus::Pass; 45];
        statuses.extend([TestStatus::Fail; 5]);
        let w = window(&statuses);
        let points = compute(&w, 20);

        assert_eq!(points.len(), 20);
        assert_eq!(points.first().unwrap().index, 30);
        assert_eq!(points.last().unwrap().index, 49);
        // 45 of 50 passed overall.
        assert_eq!(points.last().unwrap().pass_yield_pct, 90.0);
        assert_eq!(points.last().unwrap().fail_yield_pct, 10.0);
    }

    #[test]
    fn test_rounds_to_one_decimal() {
        use TestStatus::*;
        // 1 of 3 passed: 33.333.. / 66.666..
        let w = window(&[Pass, Fail, Fail]);
        let last = *compute(&w, 20).last().unwrap();
        assert_eq!(last.pass_yield_pct, 33.3);
        assert_eq!(last.fail_yield_pct, 66.7);
    }

    #[test]
    fn test_yield_bounds_hold() {
        let statuses: Vec<TestStatus> = (0..50u32)
            .map(|i| {
                if (i * 7 + 3) % 5 < 2 {
                    TestStatus::Fail
                } else {
                    TestStatus::Pass
                }
            })
            .collect();
        for len in 1..=statuses.len() {
            let w = window(&statuses[..len]);
            for p in compute(&w, 20) {
                assert!((0.0..=100.0).contains(&p.pass_yield_pct));
                assert!((0.0..=100.0).contains(&p.fail_yield_pct));
                assert!((p.pass_yield_pct + p.fail_yield_pct - 100.0).abs() <= 0.1);
            }
        }
    }

    #[test]
    fn test_repeat_calls_match() {
        use TestStatus::*;
        let w = window(&[Fail, Pass, Pass, Fail, Pass]);
        assert_eq!(compute(&w, 20), compute(&w, 20));
    }
}
