use std::collections::{BTreeMap, VecDeque};

use serde::Serialize;

use crate::model::{TestResultEvent, TestStatus};

/// Window size used when no configuration overrides it.
pub const DEFAULT_CAPACITY: usize = 50;

/// What [`ResultWindow::seed`] did with the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedOutcome {
    /// Nothing had been pushed yet; the snapshot became the window.
    Applied,
    /// Live events were already present; the snapshot went below them.
    MergedBelowLive,
    /// A snapshot was already applied earlier.
    Ignored,
}

/// Pass/fail tally for one machine over the current window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MachineTally {
    pub machine_id: String,
    pub pass_count: u64,
    pub fail_count: u64,
}

/// Newest-first ring of the most recent results, evicting strictly by
/// arrival order.
#[derive(Debug, Clone)]
pub struct ResultWindow {
    entries: VecDeque<TestResultEvent>,
    capacity: usize,
    seeded: bool,
    pushed: u64,
}

impl ResultWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity + 1),
            capacity,
            seeded: false,
            pushed: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Apply the historical snapshot (newest first) at most once.
    ///
    /// Anything pushed before the snapshot resolved counts as newer than
    /// every snapshot entry, so the snapshot is appended beneath it and the
    /// result truncated to capacity. On an untouched window this is a plain
    /// replace.
    pub fn seed(&mut self, events: Vec<TestResultEvent>) -> SeedOutcome {
        if self.seeded {
            return SeedOutcome::Ignored;
        }
        self.seeded = true;

        let outcome = if self.pushed == 0 {
            self.entries.clear();
            SeedOutcome::Applied
        } else {
            SeedOutcome::MergedBelowLive
        };

        let room = self.capacity.saturating_sub(self.entries.len());
        self.entries.extend(events.into_iter().take(room));
        outcome
    }

    /// Prepend one live event, returning the entry evicted from the tail if
    /// the window was full.
    pub fn push(&mut self, event: TestResultEvent) -> Option<TestResultEvent> {
        self.pushed += 1;
        self.entries.push_front(event);
        if self.entries.len() > self.capacity {
            self.entries.pop_back()
        } else {
            None
        }
    }

    /// Owned newest-first copy of the window.
    pub fn current(&self) -> Vec<TestResultEvent> {
        self.entries.iter().cloned().collect()
    }

    /// Newest-first iteration without copying.
    pub fn iter(&self) -> std::collections::vec_deque::Iter<'_, TestResultEvent> {
        self.entries.iter()
    }

    /// Most recent in-window result produced by `machine_id`.
    pub fn latest_for_machine(&self, machine_id: &str) -> Option<&TestResultEvent> {
        self.entries.iter().find(|e| e.machine_id == machine_id)
    }

    /// Per-machine pass/fail counts over the window, ordered by machine id.
    pub fn machine_tallies(&self) -> Vec<MachineTally> {
        let mut tallies: BTreeMap<&str, (u64, u64)> = BTreeMap::new();
        for event in &self.entries {
            let entry = tallies.entry(event.machine_id.as_str()).or_default();
            match event.status {
                TestStatus::Pass => entry.0 += 1,
                TestStatus::Fail => entry.1 += 1,
            }
        }
        tallies
            .into_iter()
            .map(|(machine_id, (pass_count, fail_count))| MachineTally {
                machine_id: machine_id.to_string(),
                pass_count,
                fail_count,
            })
            .collect()
    }
}

impl Default for ResultWindow {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
