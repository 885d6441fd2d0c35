//! Sub-thermal-noise marker measurements.
//!
//! Measures the analyzer noise floor with the generator muted: a fixed
//! 1 GHz span around the target frequency, narrow resolution and video
//! bandwidths, preamp gain staging, noise correction, and a noise-marker
//! function sitting on the capture frequency. Each iteration runs one
//! triggered sweep and reads the marker.

use crate::error::{BenchError, BenchResult};
use crate::instrument::registry::{lock_session, Role, SharedSession};
use crate::measurement::timing::{try_timed, Timed};
use log::{debug, info};
use serde::Serialize;
use std::fmt;

const SPAN_HZ: f64 = 1e9;
const SWEEP_POINTS: u32 = 2001;
const RESOLUTION_BW_HZ: f64 = 10e3;
const VIDEO_BW_HZ: f64 = 10e3;
const SWEEP_TIME_S: f64 = 0.005;
const PREAMP_GAIN_DB: u32 = 30;

/// Nominal per-sweep capture time reported with each set, in seconds.
const NOMINAL_SWEEP_TIME_S: f64 = 1.0;

/// Driver for the noise-floor marker sweep.
pub struct StnDriver {
    vsa: SharedSession,
    frequency_hz: f64,
    sweep_time_s: f64,
}

impl StnDriver {
    /// Builds the driver and mutes the generator: the noise floor is
    /// measured with no stimulus applied.
    pub fn new(vsa: SharedSession, vsg: SharedSession, frequency_hz: f64) -> BenchResult<Self> {
        info!("STN driver ready at {:.3} GHz", frequency_hz / 1e9);
        lock_session(&vsg, Role::Vsg)?.write("OUTP:STAT OFF")?;
        Ok(Self {
            vsa,
            frequency_hz,
            sweep_time_s: NOMINAL_SWEEP_TIME_S,
        })
    }

    /// Current capture frequency in Hz.
    pub fn frequency_hz(&self) -> f64 {
        self.frequency_hz
    }

    /// Nominal sweep time reported with each set, in seconds.
    pub fn sweep_time_s(&self) -> f64 {
        self.sweep_time_s
    }

    /// Configures the spectrum capture and the noise marker.
    pub fn configure_analyzer(&mut self) -> BenchResult<Timed<()>> {
        try_timed(|| self.analyzer_setup())
    }

    fn analyzer_setup(&mut self) -> BenchResult<()> {
        info!("Configuring analyzer for noise-floor capture");
        let mut vsa = lock_session(&self.vsa, Role::Vsa)?;
        vsa.query_opc("*RST")?;
        vsa.query_opc(":INST:SEL \"Spectrum\"")?;
        vsa.write(&format!(":SENS:FREQ:CENT {}", self.frequency_hz))?;
        vsa.write(&format!(":SENS:FREQ:SPAN {SPAN_HZ:.0}"))?;
        vsa.write(":INP:GAIN:STAT ON")?;
        vsa.write(&format!(":INP:GAIN:VAL {PREAMP_GAIN_DB}"))?;
        vsa.write(":INP:ATT:AUTO OFF")?;
        vsa.write(":INP:ATT 0")?;
        vsa.write(&format!(":SENS:SWE:WIND:POIN {SWEEP_POINTS}"))?;
        vsa.write("DISP:WIND1:SUBW:TRAC1:MODE WRIT")?;
        vsa.write(":SENS:WIND1:DET:FUNC RMS")?;
        vsa.write(&format!("SENS:BAND:RES {RESOLUTION_BW_HZ:.0}"))?;
        vsa.write(&format!("SENS:BAND:VID {VIDEO_BW_HZ:.0}"))?;
        vsa.write("SENS:SWE:TIME:AUTO OFF")?;
        vsa.write(&format!("SENS:SWE:TIME {SWEEP_TIME_S}"))?;
        vsa.write("SENS:SWE:TYPE AUTO")?;
        vsa.write(":SENS:SWE:OPT AUTO")?;
        vsa.query_opc("DISP:WIND1:SUBW:TRAC1:Y:SCAL:AUTO ONCE")?;
        vsa.write("SENS:POW:NCOR ON")?;
        vsa.query_opc("INIT:IMM")?;
        vsa.query_opc("DISP:WIND1:SUBW:TRAC1:Y:SCAL:AUTO ONCE")?;
        // The noise marker rides on the capture frequency.
        vsa.write(":CALC1:DELT1:FUNC:PNO:STAT OFF")?;
        vsa.write(":CALC1:MARK1:FUNC:NOIS:STAT ON")?;
        vsa.write(&format!(":CALC1:MARK1:X {}", self.frequency_hz))?;
        let drained = vsa.drain_error_queue()?;
        debug!("Analyzer error queue after setup: {drained}");
        Ok(())
    }

    /// Moves the capture and marker frequency. Failures here are fatal for
    /// the test set — every later marker read would be mis-tuned.
    pub fn set_frequency(&mut self, frequency_hz: f64) -> BenchResult<()> {
        if !(frequency_hz.is_finite() && frequency_hz > 0.0) {
            return Err(BenchError::Validation(format!(
                "invalid capture frequency: {frequency_hz}"
            )));
        }
        info!("Setting noise capture to {:.3} GHz", frequency_hz / 1e9);
        {
            let mut vsa = lock_session(&self.vsa, Role::Vsa)?;
            vsa.write(&format!(":SENS:FREQ:CENT {frequency_hz}"))?;
            vsa.write(&format!(":CALC1:MARK1:X {frequency_hz}"))?;
            vsa.query("*OPC?")?;
        }
        self.frequency_hz = frequency_hz;
        Ok(())
    }

    /// Runs one triggered sweep and reads the noise-marker result in dBm.
    pub fn measure_noise_marker(&mut self) -> BenchResult<Timed<f64>> {
        try_timed(|| {
            let mut vsa = lock_session(&self.vsa, Role::Vsa)?;
            vsa.write("INIT:CONT OFF")?;
            vsa.query_opc("INIT:IMM")?;
            let marker = vsa.query_float(":CALC:MARK:FUNC:NOIS:RES?")?;
            info!("Noise marker: {marker:.2} dBm");
            Ok(marker)
        })
    }
}

/// Spread statistics over a set of marker samples.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct SampleStats {
    /// Smallest sample.
    pub min: f64,
    /// Largest sample.
    pub max: f64,
    /// Arithmetic mean.
    pub avg: f64,
    /// Population standard deviation.
    pub std_dev: f64,
    /// Spread between largest and smallest sample.
    pub delta: f64,
}

impl SampleStats {
    /// Population statistics over `samples`; `None` when empty. Callers
    /// wanting a meaningful spread should pass at least two samples.
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let n = samples.len() as f64;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut sum = 0.0;
        for &sample in samples {
            min = min.min(sample);
            max = max.max(sample);
            sum += sample;
        }
        let avg = sum / n;
        let variance = samples
            .iter()
            .map(|sample| (sample - avg).powi(2))
            .sum::<f64>()
            / n;
        Some(Self {
            min,
            max,
            avg,
            std_dev: variance.sqrt(),
            delta: max - min,
        })
    }
}

impl fmt::Display for SampleStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Min:{:.3} Max:{:.3} Avg:{:.3} StdDev:{:.3} Delta:{:.3}",
            self.min, self.max, self.avg, self.std_dev, self.delta
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_over_two_markers() {
        let stats = SampleStats::from_samples(&[-90.0, -92.0]).unwrap();
        assert_eq!(stats.min, -92.0);
        assert_eq!(stats.max, -90.0);
        assert_eq!(stats.avg, -91.0);
        assert_eq!(stats.delta, 2.0);
        assert!((stats.std_dev - 1.0).abs() < 1e-12);
    }

    #[test]
    fn stats_require_at_least_one_sample() {
        assert!(SampleStats::from_samples(&[]).is_none());
        let single = SampleStats::from_samples(&[-95.5]).unwrap();
        assert_eq!(single.avg, -95.5);
        assert_eq!(single.delta, 0.0);
    }

    #[test]
    fn stats_format_matches_log_style() {
        let stats = SampleStats::from_samples(&[-90.0, -92.0]).unwrap();
        assert_eq!(
            stats.to_string(),
            "Min:-92.000 Max:-90.000 Avg:-91.000 StdDev:1.000 Delta:2.000"
        );
    }
}
