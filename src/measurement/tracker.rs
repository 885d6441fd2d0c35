//! Configuration-change tracking.
//!
//! Full reconfiguration (generator waveform reload plus analyzer setup
//! recall) is slow; between test sets that only step power or frequency it
//! is pure overhead. The tracker compares the current test-set
//! configuration against the last committed one and decides which
//! reconfiguration steps are redundant.
//!
//! The tracker is an explicit value owned by the orchestrator and passed
//! into the per-set sequencing — no hidden shared state.

/// Absolute tolerance treating floating-point-adjacent frequencies as
/// unchanged.
pub const FREQUENCY_TOLERANCE_HZ: f64 = 1e-3;

/// Per-test-set measurement configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct MeasurementConfig {
    /// Center frequency in Hz.
    pub center_frequency_hz: f64,
    /// Generator output power in dBm.
    pub power_dbm: f64,
    /// Generator waveform file, if any.
    pub waveform_file: Option<String>,
    /// Analyzer setup file, if any.
    pub setup_file: Option<String>,
    /// Whether the set also measures ACLR.
    pub measure_aclr: bool,
}

/// Decides when reconfiguration and retuning may be skipped.
#[derive(Debug, Default)]
pub struct ConfigChangeTracker {
    previous_files: Option<(Option<String>, Option<String>)>,
    previous_frequency_hz: Option<f64>,
}

impl ConfigChangeTracker {
    /// Tracker with no committed state; the first set always reconfigures.
    pub fn new() -> Self {
        Self::default()
    }

    /// True when the full generator/analyzer reconfiguration must run: on
    /// the first call, and whenever the waveform or setup file selection
    /// differs from the last committed configuration.
    pub fn should_reconfigure(&self, current: &MeasurementConfig) -> bool {
        match &self.previous_files {
            None => true,
            Some((waveform, setup)) => {
                *waveform != current.waveform_file || *setup != current.setup_file
            }
        }
    }

    /// True when the frequency moved by more than the tolerance since the
    /// last committed tune. Independent of the reconfiguration decision.
    pub fn should_retune(&self, frequency_hz: f64) -> bool {
        match self.previous_frequency_hz {
            None => true,
            Some(previous) => (previous - frequency_hz).abs() > FREQUENCY_TOLERANCE_HZ,
        }
    }

    /// Commits a completed reconfiguration. Also pins the frequency: the
    /// configuration sequences tune both instruments themselves, so a
    /// reconfigure never leaves a stale frequency behind.
    pub fn note_reconfigured(&mut self, current: &MeasurementConfig) {
        self.previous_files = Some((
            current.waveform_file.clone(),
            current.setup_file.clone(),
        ));
        self.previous_frequency_hz = Some(current.center_frequency_hz);
    }

    /// Commits a completed frequency-only retune.
    pub fn note_retuned(&mut self, frequency_hz: f64) {
        self.previous_frequency_hz = Some(frequency_hz);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(waveform: Option<&str>, setup: Option<&str>, frequency_hz: f64) -> MeasurementConfig {
        MeasurementConfig {
            center_frequency_hz: frequency_hz,
            power_dbm: -10.0,
            waveform_file: waveform.map(str::to_string),
            setup_file: setup.map(str::to_string),
            measure_aclr: true,
        }
    }

    #[test]
    fn first_call_always_reconfigures() {
        let tracker = ConfigChangeTracker::new();
        assert!(tracker.should_reconfigure(&config(None, None, 6e9)));
        assert!(tracker.should_retune(6e9));
    }

    #[test]
    fn identical_config_skips_on_second_call() {
        let mut tracker = ConfigChangeTracker::new();
        let current = config(Some("a.wv"), Some("a.dfl"), 6e9);
        tracker.note_reconfigured(&current);
        assert!(!tracker.should_reconfigure(&current));
        assert!(!tracker.should_retune(6e9));
    }

    #[test]
    fn file_change_forces_reconfigure() {
        let mut tracker = ConfigChangeTracker::new();
        tracker.note_reconfigured(&config(Some("a.wv"), Some("a.dfl"), 6e9));
        assert!(tracker.should_reconfigure(&config(Some("b.wv"), Some("a.dfl"), 6e9)));
        assert!(tracker.should_reconfigure(&config(Some("a.wv"), Some("b.dfl"), 6e9)));
        assert!(tracker.should_reconfigure(&config(None, Some("a.dfl"), 6e9)));
    }

    #[test]
    fn retune_tolerance_boundary_is_one_millihertz() {
        let mut tracker = ConfigChangeTracker::new();
        tracker.note_retuned(6e9);
        assert!(!tracker.should_retune(6e9));
        assert!(tracker.should_retune(6e9 + 2e-3));
        assert!(!tracker.should_retune(6e9 + 5e-4));
    }

    #[test]
    fn frequency_change_alone_does_not_reconfigure() {
        let mut tracker = ConfigChangeTracker::new();
        tracker.note_reconfigured(&config(Some("a.wv"), Some("a.dfl"), 6e9));
        let moved = config(Some("a.wv"), Some("a.dfl"), 6.1e9);
        assert!(!tracker.should_reconfigure(&moved));
        assert!(tracker.should_retune(moved.center_frequency_hz));
    }
}
