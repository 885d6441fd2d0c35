//! Result records handed to the reporting layer.
//!
//! Every test set yields exactly one record, successful or error-flagged —
//! never zero, never two. Records are created as placeholders at test-set
//! start, populated progressively, and appended once at the set boundary.
//! Field names are the boundary contract with the downstream reporting
//! layer and mirror the produced result schema.

use crate::measurement::stn::SampleStats;
use crate::measurement::timing::TimingRecord;
use crate::measurement::tracker::MeasurementConfig;
use crate::waveform::{Duplexing, LinkDirection, SignalFamily, WaveformDescriptor};
use serde::{Serialize, Serializer};

/// Serializes non-finite floats (NaN from a failed EVM read-back) as JSON
/// null instead of failing the whole document.
fn finite_or_null<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if value.is_finite() {
        serializer.serialize_f64(*value)
    } else {
        serializer.serialize_none()
    }
}

/// One detected spurious emission, outside the fundamental guard band.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Spur {
    /// Spur frequency in Hz.
    pub frequency_hz: f64,
    /// Spur level in dBm.
    pub power_dbm: f64,
}

/// One noise-marker iteration of an STN set.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct MarkerSample {
    /// Marker level in dBm; `None` when the iteration failed.
    pub marker: Option<f64>,
    /// Elapsed seconds of the iteration.
    pub meas_time: f64,
}

/// Record of one EVM/ACLR test set (NR5G or LTE).
#[derive(Clone, Debug, Serialize)]
pub struct EvmRecord {
    /// Global test-set number.
    pub test_set: u32,
    /// Center frequency in Hz.
    pub center_frequency_hz: f64,
    /// Generator power in dBm.
    pub power_dbm: f64,
    /// Allocated resource blocks.
    pub resource_blocks: u32,
    /// Resource block offset.
    pub resource_block_offset: u32,
    /// Channel bandwidth in MHz.
    pub channel_bandwidth_mhz: u32,
    /// Modulation token in the family spelling.
    pub modulation_type: String,
    /// Subcarrier spacing in kHz.
    pub subcarrier_spacing_khz: u32,
    /// Duplexing scheme.
    pub duplexing: Duplexing,
    /// Link direction.
    pub link_direction: LinkDirection,
    /// Generator waveform file, if any.
    pub waveform_file: Option<String>,
    /// Analyzer setup file, if any.
    pub setup_file: Option<String>,
    /// Human-readable configuration summary.
    pub config: String,
    /// Averaged EVM in dB; NaN when the read-back was malformed.
    #[serde(serialize_with = "finite_or_null")]
    pub evm: f64,
    /// Channel power in dBm.
    pub ch_pwr: Option<f64>,
    /// Adjacent channel power, lower.
    pub acp_lower: Option<f64>,
    /// Adjacent channel power, upper.
    pub acp_upper: Option<f64>,
    /// Alternate channel power, lower.
    pub alt_lower: Option<f64>,
    /// Alternate channel power, upper.
    pub alt_upper: Option<f64>,
    /// Elapsed seconds per operation.
    pub timings: TimingRecord,
    /// Failure description when the set did not complete.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EvmRecord {
    /// Empty record carrying the set's configuration and descriptor
    /// parameters, ready to be populated by the sequencing.
    pub fn placeholder(
        test_set: u32,
        family: SignalFamily,
        descriptor: &WaveformDescriptor,
        config: &MeasurementConfig,
    ) -> Self {
        Self {
            test_set,
            center_frequency_hz: config.center_frequency_hz,
            power_dbm: config.power_dbm,
            resource_blocks: descriptor.resource_blocks,
            resource_block_offset: descriptor.resource_block_offset,
            channel_bandwidth_mhz: descriptor.bandwidth_mhz,
            modulation_type: descriptor.modulation.token(family).to_string(),
            subcarrier_spacing_khz: descriptor.subcarrier_spacing_khz,
            duplexing: descriptor.duplexing,
            link_direction: descriptor.link_direction,
            waveform_file: config.waveform_file.clone(),
            setup_file: config.setup_file.clone(),
            config: String::new(),
            evm: f64::NAN,
            ch_pwr: None,
            acp_lower: None,
            acp_upper: None,
            alt_lower: None,
            alt_upper: None,
            timings: TimingRecord::new(),
            error: None,
        }
    }
}

/// Record of one spur-search test set.
#[derive(Clone, Debug, Serialize)]
pub struct SpurRecord {
    /// Global test-set number.
    pub test_set: u32,
    /// Fundamental frequency in Hz.
    pub fundamental_frequency_hz: f64,
    /// Resolution bandwidth in Hz.
    pub rbw_hz: f64,
    /// Detection threshold in dBm.
    pub spur_limit_dbm: f64,
    /// Stimulus power in dBm.
    pub power_dbm: f64,
    /// Detected spurs, fundamental guard band already excluded.
    pub spurs: Vec<Spur>,
    /// Human-readable configuration summary.
    pub config: String,
    /// Elapsed seconds per operation.
    pub timings: TimingRecord,
    /// Failure description, or a note that nothing was detected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SpurRecord {
    /// Empty record for one fundamental frequency.
    pub fn placeholder(
        test_set: u32,
        fundamental_frequency_hz: f64,
        rbw_hz: f64,
        spur_limit_dbm: f64,
        power_dbm: f64,
    ) -> Self {
        let config = format!(
            "{:.3}GHz_Spur_RBW{:.3}MHz_Limit{:.2}dBm",
            fundamental_frequency_hz / 1e9,
            rbw_hz / 1e6,
            spur_limit_dbm
        );
        Self {
            test_set,
            fundamental_frequency_hz,
            rbw_hz,
            spur_limit_dbm,
            power_dbm,
            spurs: Vec::new(),
            config,
            timings: TimingRecord::new(),
            error: None,
        }
    }
}

/// Record of one sub-thermal-noise test set.
#[derive(Clone, Debug, Serialize)]
pub struct StnRecord {
    /// Global test-set number.
    pub test_set: u32,
    /// Capture frequency in Hz.
    pub center_frequency_hz: f64,
    /// Nominal sweep time in seconds.
    pub sweep_time: f64,
    /// Requested marker iterations.
    pub iterations: u32,
    /// Human-readable configuration summary.
    pub config: String,
    /// Per-iteration marker samples.
    pub markers: Vec<MarkerSample>,
    /// Spread statistics over the valid markers (>= 2 required).
    pub stats: Option<SampleStats>,
    /// Elapsed seconds per operation.
    pub timings: TimingRecord,
    /// Configuration plus iteration time for the whole set.
    pub total_test_time: f64,
    /// Failure description when no iteration succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StnRecord {
    /// Empty record for one capture frequency.
    pub fn placeholder(
        test_set: u32,
        center_frequency_hz: f64,
        sweep_time: f64,
        iterations: u32,
    ) -> Self {
        let config = format!(
            "{:.3}GHz_STN_{sweep_time:.1}sec",
            center_frequency_hz / 1e9
        );
        Self {
            test_set,
            center_frequency_hz,
            sweep_time,
            iterations,
            config,
            markers: Vec::new(),
            stats: None,
            timings: TimingRecord::new(),
            total_test_time: 0.0,
            error: None,
        }
    }
}

/// One record per test set, tagged by measurement family.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type")]
pub enum MeasurementResult {
    /// 5G-NR EVM/ACLR set.
    #[serde(rename = "NR5G")]
    Nr5g(EvmRecord),
    /// LTE EVM/ACLR set.
    #[serde(rename = "LTE")]
    Lte(EvmRecord),
    /// Spurious-emission search set.
    #[serde(rename = "SpurSearch")]
    SpurSearch(SpurRecord),
    /// Sub-thermal-noise marker set.
    #[serde(rename = "STN")]
    Stn(StnRecord),
}

impl MeasurementResult {
    /// Wraps an EVM record in the variant matching its family.
    pub fn from_evm(family: SignalFamily, record: EvmRecord) -> Self {
        match family {
            SignalFamily::Nr5g => MeasurementResult::Nr5g(record),
            SignalFamily::Lte => MeasurementResult::Lte(record),
        }
    }

    /// Global test-set number of this record.
    pub fn test_set(&self) -> u32 {
        match self {
            MeasurementResult::Nr5g(r) | MeasurementResult::Lte(r) => r.test_set,
            MeasurementResult::SpurSearch(r) => r.test_set,
            MeasurementResult::Stn(r) => r.test_set,
        }
    }

    /// Type tag as it appears in the produced records.
    pub fn type_label(&self) -> &'static str {
        match self {
            MeasurementResult::Nr5g(_) => "NR5G",
            MeasurementResult::Lte(_) => "LTE",
            MeasurementResult::SpurSearch(_) => "SpurSearch",
            MeasurementResult::Stn(_) => "STN",
        }
    }

    /// Per-operation timings of this set.
    pub fn timings(&self) -> &TimingRecord {
        match self {
            MeasurementResult::Nr5g(r) | MeasurementResult::Lte(r) => &r.timings,
            MeasurementResult::SpurSearch(r) => &r.timings,
            MeasurementResult::Stn(r) => &r.timings,
        }
    }

    /// Failure description, if the set did not complete cleanly.
    pub fn error(&self) -> Option<&str> {
        match self {
            MeasurementResult::Nr5g(r) | MeasurementResult::Lte(r) => r.error.as_deref(),
            MeasurementResult::SpurSearch(r) => r.error.as_deref(),
            MeasurementResult::Stn(r) => r.error.as_deref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nan_evm_serializes_as_null() {
        let descriptor = WaveformDescriptor::family_default(SignalFamily::Nr5g);
        let config = MeasurementConfig {
            center_frequency_hz: 6e9,
            power_dbm: -10.0,
            waveform_file: None,
            setup_file: None,
            measure_aclr: true,
        };
        let record = EvmRecord::placeholder(1, SignalFamily::Nr5g, &descriptor, &config);
        let value = serde_json::to_value(MeasurementResult::from_evm(SignalFamily::Nr5g, record))
            .unwrap();
        assert_eq!(value["type"], "NR5G");
        assert!(value["evm"].is_null());
        assert!(value.get("error").is_none());
    }

    #[test]
    fn spur_config_summary_names_the_search() {
        let record = SpurRecord::placeholder(3, 2.44e9, 20_000.0, -122.0, -70.0);
        assert_eq!(record.config, "2.440GHz_Spur_RBW0.020MHz_Limit-122.00dBm");
    }
}
