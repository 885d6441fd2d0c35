//! Consumed test-matrix schema.
//!
//! The orchestrator is driven by a JSON document with one test list per
//! measurement family. Frequencies may be a scalar, a list, or a linear
//! range; power may be a scalar or a list:
//!
//! ```json
//! {
//!   "nr5g": [{
//!     "run": true,
//!     "center_frequency_ghz": [6.123, 6.223],
//!     "power_dbm": [-20, -10, 0],
//!     "measure_aclr": true,
//!     "waveform_file": "/var/user/5GNR/5GNR_UL_10MHz_256QAM_30kHz_24RB_0RBO.wv",
//!     "setup_file": "C:/r_s/instr/user/5GNR_UL_10MHz_256QAM_30kHz_24RB_0RBO.dfl"
//!   }],
//!   "spur_search": [{
//!     "run": true,
//!     "fundamental_frequency_ghz": {"range": {"start_ghz": 2.4, "stop_ghz": 2.481, "step_mhz": 20}},
//!     "rbw_mhz": 0.02,
//!     "spur_limit_dbm": -122,
//!     "power_dbm": -70
//!   }],
//!   "STN": [{"run": true, "center_frequency_ghz": 2.44, "iterations": 5}]
//! }
//! ```

use crate::error::{BenchError, BenchResult};
use serde::Deserialize;
use std::fs::File;
use std::path::Path;

/// Full test matrix, one list per measurement family.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TestMatrix {
    /// 5G-NR EVM/ACLR tests.
    #[serde(default)]
    pub nr5g: Vec<EvmTestEntry>,
    /// LTE EVM/ACLR tests.
    #[serde(default)]
    pub lte: Vec<EvmTestEntry>,
    /// Spurious-emission searches.
    #[serde(default)]
    pub spur_search: Vec<SpurTestEntry>,
    /// Sub-thermal-noise sweeps.
    #[serde(default, rename = "STN")]
    pub stn: Vec<StnTestEntry>,
}

impl TestMatrix {
    /// Loads the matrix from a JSON file.
    pub fn from_path(path: &Path) -> BenchResult<Self> {
        let file = File::open(path)?;
        serde_json::from_reader(file)
            .map_err(|e| BenchError::Configuration(format!("test matrix {}: {e}", path.display())))
    }
}

/// One EVM/ACLR test definition (NR5G or LTE family).
#[derive(Debug, Clone, Deserialize)]
pub struct EvmTestEntry {
    /// Whether this entry is enabled.
    #[serde(default)]
    pub run: bool,
    /// Center frequencies in GHz.
    pub center_frequency_ghz: FrequencySpec,
    /// Generator power steps in dBm.
    pub power_dbm: PowerSpec,
    /// Whether to measure ACLR after EVM.
    #[serde(default = "default_true")]
    pub measure_aclr: bool,
    /// Generator waveform file path.
    #[serde(default)]
    pub waveform_file: Option<String>,
    /// Analyzer setup file path.
    #[serde(default)]
    pub setup_file: Option<String>,
}

/// One spur-search test definition.
#[derive(Debug, Clone, Deserialize)]
pub struct SpurTestEntry {
    /// Whether this entry is enabled.
    #[serde(default)]
    pub run: bool,
    /// Fundamental frequencies in GHz.
    pub fundamental_frequency_ghz: FrequencySpec,
    /// Resolution bandwidth in MHz.
    #[serde(default = "default_rbw_mhz")]
    pub rbw_mhz: f64,
    /// Detection threshold in dBm.
    #[serde(default = "default_spur_limit_dbm")]
    pub spur_limit_dbm: f64,
    /// Stimulus power in dBm.
    #[serde(default = "default_spur_power_dbm")]
    pub power_dbm: f64,
}

/// One sub-thermal-noise test definition.
#[derive(Debug, Clone, Deserialize)]
pub struct StnTestEntry {
    /// Whether this entry is enabled.
    #[serde(default)]
    pub run: bool,
    /// Capture frequencies in GHz.
    pub center_frequency_ghz: FrequencySpec,
    /// Noise-marker iterations per frequency.
    #[serde(default = "default_iterations")]
    pub iterations: u32,
}

fn default_true() -> bool {
    true
}

fn default_rbw_mhz() -> f64 {
    0.01
}

fn default_spur_limit_dbm() -> f64 {
    -95.0
}

fn default_spur_power_dbm() -> f64 {
    -70.0
}

fn default_iterations() -> u32 {
    5
}

/// Frequency input: scalar, explicit list, or linear range.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum FrequencySpec {
    /// A single frequency in GHz.
    Scalar(f64),
    /// An explicit list of frequencies in GHz.
    List(Vec<f64>),
    /// A linear range description.
    Range {
        /// Range bounds and step.
        range: FrequencyRange,
    },
}

/// Linear frequency range with endpoints included.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct FrequencyRange {
    /// First frequency in GHz.
    pub start_ghz: f64,
    /// Last frequency in GHz.
    pub stop_ghz: f64,
    /// Nominal step in MHz; the actual spacing is stretched so the stop
    /// frequency is always sampled.
    pub step_mhz: f64,
}

impl FrequencySpec {
    /// Expands to a concrete list of frequencies in GHz.
    pub fn expand_ghz(&self) -> BenchResult<Vec<f64>> {
        match self {
            FrequencySpec::Scalar(value) => Ok(vec![*value]),
            FrequencySpec::List(values) => {
                if values.is_empty() {
                    Err(BenchError::Configuration(
                        "empty frequency list".to_string(),
                    ))
                } else {
                    Ok(values.clone())
                }
            }
            FrequencySpec::Range { range } => range.expand(),
        }
    }
}

impl FrequencyRange {
    /// Linearly spaced samples with `floor((stop-start)/(step/1000)) + 1`
    /// points, endpoints included.
    fn expand(&self) -> BenchResult<Vec<f64>> {
        if !(self.start_ghz.is_finite() && self.stop_ghz.is_finite() && self.step_mhz.is_finite()) {
            return Err(BenchError::Configuration(format!(
                "non-finite range parameters: {self:?}"
            )));
        }
        if self.start_ghz > self.stop_ghz {
            return Err(BenchError::Configuration(format!(
                "range start {} GHz exceeds stop {} GHz",
                self.start_ghz, self.stop_ghz
            )));
        }
        if self.step_mhz <= 0.0 {
            return Err(BenchError::Configuration(format!(
                "invalid range step: {} MHz",
                self.step_mhz
            )));
        }
        let points = ((self.stop_ghz - self.start_ghz) / (self.step_mhz / 1000.0)) as usize + 1;
        if points == 1 {
            return Ok(vec![self.start_ghz]);
        }
        let spacing = (self.stop_ghz - self.start_ghz) / (points - 1) as f64;
        Ok((0..points)
            .map(|i| self.start_ghz + spacing * i as f64)
            .collect())
    }
}

/// Power input: scalar or list, in dBm.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PowerSpec {
    /// A single power level.
    Scalar(f64),
    /// An explicit list of power levels.
    List(Vec<f64>),
}

impl PowerSpec {
    /// Expands to a concrete list of power levels in dBm.
    pub fn expand(&self) -> BenchResult<Vec<f64>> {
        match self {
            PowerSpec::Scalar(value) => Ok(vec![*value]),
            PowerSpec::List(values) => {
                if values.is_empty() {
                    Err(BenchError::Configuration("empty power list".to_string()))
                } else {
                    Ok(values.clone())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_all_families() {
        let matrix: TestMatrix = serde_json::from_value(json!({
            "nr5g": [{
                "run": true,
                "center_frequency_ghz": [6.123, 6.223],
                "power_dbm": [-20, -10],
                "waveform_file": "5GNR_UL_10MHz_256QAM_30kHz_24RB_0RBO.wv",
                "setup_file": "5GNR_UL_10MHz_256QAM_30kHz_24RB_0RBO.dfl"
            }],
            "lte": [],
            "spur_search": [{
                "run": true,
                "fundamental_frequency_ghz": 2.44
            }],
            "STN": [{
                "run": false,
                "center_frequency_ghz": {"range": {"start_ghz": 2.4, "stop_ghz": 2.481, "step_mhz": 5}}
            }]
        }))
        .unwrap();
        assert_eq!(matrix.nr5g.len(), 1);
        assert!(matrix.nr5g[0].measure_aclr, "measure_aclr defaults on");
        assert_eq!(matrix.spur_search[0].rbw_mhz, 0.01);
        assert_eq!(matrix.spur_search[0].spur_limit_dbm, -95.0);
        assert_eq!(matrix.stn[0].iterations, 5);
        assert!(!matrix.stn[0].run);
    }

    #[test]
    fn range_expansion_includes_both_endpoints() {
        let range = FrequencyRange {
            start_ghz: 2.4,
            stop_ghz: 2.481,
            step_mhz: 20.0,
        };
        let frequencies = range.expand().unwrap();
        assert_eq!(frequencies.len(), 5);
        assert!((frequencies[0] - 2.4).abs() < 1e-12);
        assert!((frequencies[4] - 2.481).abs() < 1e-12);
        let spacing = frequencies[1] - frequencies[0];
        for pair in frequencies.windows(2) {
            assert!((pair[1] - pair[0] - spacing).abs() < 1e-12);
        }
    }

    #[test]
    fn degenerate_range_is_one_point() {
        let range = FrequencyRange {
            start_ghz: 2.4,
            stop_ghz: 2.4,
            step_mhz: 5.0,
        };
        assert_eq!(range.expand().unwrap(), vec![2.4]);
    }

    #[test]
    fn invalid_ranges_are_rejected() {
        assert!(FrequencyRange {
            start_ghz: 2.5,
            stop_ghz: 2.4,
            step_mhz: 5.0
        }
        .expand()
        .is_err());
        assert!(FrequencyRange {
            start_ghz: 2.4,
            stop_ghz: 2.5,
            step_mhz: 0.0
        }
        .expand()
        .is_err());
    }

    #[test]
    fn empty_lists_are_rejected() {
        assert!(FrequencySpec::List(vec![]).expand_ghz().is_err());
        assert!(PowerSpec::List(vec![]).expand().is_err());
        assert_eq!(FrequencySpec::Scalar(2.44).expand_ghz().unwrap(), vec![2.44]);
    }
}
