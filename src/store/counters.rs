use crate::model::{AggregateCounters, TestResultEvent};

/// What [`MetricsAggregator::initialize`] did with the server totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    /// No live events had been counted; the totals became the counters.
    Set,
    /// Live events were already counted; the totals were added on top.
    AddedToLive,
    /// Totals were already applied earlier.
    Ignored,
    /// The totals could not be added without overflowing; counters unchanged.
    Overflow,
}

/// Running pass/fail totals across the whole observed history.
#[derive(Debug, Clone, Default)]
pub struct MetricsAggregator {
    counters: AggregateCounters,
    initialized: bool,
    observed: u64,
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold in the server-side totals, at most once. Arriving after live
    /// events were observed adds rather than overwrites so none are lost.
    pub fn initialize(&mut self, totals: AggregateCounters) -> InitOutcome {
        if self.initialized {
            return InitOutcome::Ignored;
        }
        self.initialized = true;

        let merged = AggregateCounters::checked_from_parts(totals.pass_count, totals.fail_count)
            .and_then(|totals| self.counters.checked_add(totals));
        let Some(merged) = merged else {
            tracing::error!(
                ?totals,
                counters = ?self.counters,
                "server totals overflow the counters, ignoring them"
            );
            return InitOutcome::Overflow;
        };
        self.counters = merged;
        self.check_invariant();

        if self.observed == 0 {
            InitOutcome::Set
        } else {
            InitOutcome::AddedToLive
        }
    }

    /// Count one accepted event.
    pub fn observe(&mut self, event: &TestResultEvent) {
        self.observed += 1;
        match self.counters.checked_add(AggregateCounters::single(event.status)) {
            Some(counters) => self.counters = counters,
            None => {
                tracing::error!(counters = ?self.counters, "counters saturated, result not counted");
                return;
            }
        }
        self.check_invariant();
    }

    pub fn counters(&self) -> AggregateCounters {
        self.counters
    }

    fn check_invariant(&self) {
        if !self.counters.is_consistent() {
            tracing::error!(counters = ?self.counters, "aggregate counters out of balance");
            debug_assert!(false, "total != pass_count + fail_count");
        }
    }
}
