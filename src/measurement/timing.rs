//! Per-operation timing instrumentation.
//!
//! Every instrument-facing operation is wrapped by [`timed`] or
//! [`try_timed`] so the orchestrator can build timing breakdowns without
//! the drivers hand-rolling stopwatch code. The wrappers use a monotonic
//! clock and never swallow or alter errors from the wrapped operation.

use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Instant;

/// An operation's value paired with its elapsed wall-clock seconds.
pub type Timed<T> = (T, f64);

/// Runs `op` and returns its value together with the elapsed seconds.
pub fn timed<T>(op: impl FnOnce() -> T) -> Timed<T> {
    let start = Instant::now();
    let value = op();
    (value, start.elapsed().as_secs_f64())
}

/// Runs a fallible `op`, timing the successful path. An error passes
/// through untouched.
pub fn try_timed<T, E>(op: impl FnOnce() -> Result<T, E>) -> Result<Timed<T>, E> {
    let start = Instant::now();
    let value = op()?;
    Ok((value, start.elapsed().as_secs_f64()))
}

/// Elapsed seconds per named operation, accumulated over one test set.
///
/// Skipped steps are recorded as an explicit 0.0 rather than omitting the
/// key, so downstream statistics see a well-formed key set.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(transparent)]
pub struct TimingRecord(BTreeMap<String, f64>);

impl TimingRecord {
    /// Empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the elapsed seconds of one operation.
    pub fn record(&mut self, operation: &str, seconds: f64) {
        self.0.insert(operation.to_string(), seconds);
    }

    /// Records an operation that was skipped this set.
    pub fn record_skipped(&mut self, operation: &str) {
        self.record(operation, 0.0);
    }

    /// Elapsed seconds of `operation`, if recorded.
    pub fn get(&self, operation: &str) -> Option<f64> {
        self.0.get(operation).copied()
    }

    /// Iterates over `(operation, seconds)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(name, seconds)| (name.as_str(), *seconds))
    }

    /// Sum over every recorded operation.
    pub fn total(&self) -> f64 {
        self.0.values().sum()
    }
}
