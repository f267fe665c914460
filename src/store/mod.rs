//! Stateful half of the core: the bounded result window and the running
//! counters. Neither type synchronises itself; the dashboard controller
//! holds both under one lock.

pub mod counters;
pub mod window;

pub use self::counters::{InitOutcome, MetricsAggregator};
pub use self::window::{MachineTally, ResultWindow, SeedOutcome, DEFAULT_CAPACITY};
