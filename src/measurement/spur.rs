//! Spurious-emission search driver.
//!
//! The analyzer sweeps two ranges bracketing the fundamental and reports
//! every peak crossing a swept threshold line; the generator plays a fixed
//! four-carrier waveform as the spur-generation stimulus. Peaks inside the
//! fundamental guard band are the carrier itself and are dropped before
//! results are returned.

use crate::error::BenchResult;
use crate::instrument::registry::{lock_session, Role, SharedSession};
use crate::measurement::result::Spur;
use crate::measurement::timing::{try_timed, Timed};
use log::{debug, info, warn};

/// Guard band around the fundamental; detected peaks inside it are the
/// carrier, not spurs.
pub const EXCLUSION_WINDOW_HZ: f64 = 10e6;

/// Notch half-width between the two sweep ranges.
const RANGE_GAP_HZ: f64 = 1e6;

const SWEEP_POINTS: u32 = 100_001;
const AVERAGE_COUNT: u32 = 5;
const REFERENCE_LEVEL_DBM: f64 = -30.0;
const PREAMP_GAIN_DB: u32 = 30;

/// Fixed four-carrier stimulus: (carrier index, offset Hz, level dBm).
const STIMULUS_CARRIERS: [(u32, i64, i32); 4] = [
    (1, -1_000_000_000, -45),
    (2, -500_000_000, -20),
    (3, 600_000_000, -25),
    (4, 1_000_000_000, -50),
];

/// Driver for the swept spur search.
pub struct SpurSearchDriver {
    vsa: SharedSession,
    vsg: SharedSession,
    fundamental_hz: f64,
    rbw_hz: f64,
    spur_limit_dbm: f64,
    power_dbm: f64,
}

impl SpurSearchDriver {
    /// Builds a driver over the shared bench sessions.
    pub fn new(
        vsa: SharedSession,
        vsg: SharedSession,
        fundamental_hz: f64,
        rbw_hz: f64,
        spur_limit_dbm: f64,
        power_dbm: f64,
    ) -> Self {
        info!(
            "Spur search ready: fundamental {:.3} GHz, RBW {:.3} MHz, limit {spur_limit_dbm:.2} dBm, stimulus {power_dbm:.2} dBm",
            fundamental_hz / 1e9,
            rbw_hz / 1e6,
        );
        Self {
            vsa,
            vsg,
            fundamental_hz,
            rbw_hz,
            spur_limit_dbm,
            power_dbm,
        }
    }

    /// Fundamental frequency the search is centered on, in Hz.
    pub fn fundamental_hz(&self) -> f64 {
        self.fundamental_hz
    }

    /// Resolution bandwidth of the sweep, in Hz.
    pub fn rbw_hz(&self) -> f64 {
        self.rbw_hz
    }

    /// Detection threshold, in dBm.
    pub fn spur_limit_dbm(&self) -> f64 {
        self.spur_limit_dbm
    }

    /// Stimulus power, in dBm.
    pub fn power_dbm(&self) -> f64 {
        self.power_dbm
    }

    /// Configures the swept peak search on the analyzer.
    ///
    /// The sweep splits into two ranges symmetric about the fundamental,
    /// `[f/2, f-1 MHz]` and `[f+1 MHz, 2f]`; the marker search limits span
    /// both so the peak table covers the full span outside the notch.
    pub fn configure_analyzer(&mut self) -> BenchResult<Timed<()>> {
        try_timed(|| self.analyzer_setup())
    }

    fn analyzer_setup(&mut self) -> BenchResult<()> {
        let range1_start = self.fundamental_hz / 2.0;
        let range1_stop = self.fundamental_hz - RANGE_GAP_HZ;
        let range2_start = self.fundamental_hz + RANGE_GAP_HZ;
        let range2_stop = 2.0 * self.fundamental_hz;
        let mut vsa = lock_session(&self.vsa, Role::Vsa)?;
        vsa.query_opc("*RST")?;
        vsa.write("INIT:CONT OFF")?;
        vsa.write(&format!("SENS:FREQ:STAR {range1_start:.0}"))?;
        vsa.write(&format!("SENS:FREQ:STOP {range1_stop:.0}"))?;
        vsa.write(":DISP:WIND1:SUBW:TRAC1:MODE AVER")?;
        vsa.write(&format!(":SENS:AVER:COUN {AVERAGE_COUNT}"))?;
        vsa.write(":SENS:WIND1:DET1:FUNC RMS")?;
        vsa.write(":SENS:LIST:RANG1:FILT:TYPE NORM")?;
        vsa.write(&format!(":SENS:BAND:RES {:.0}", self.rbw_hz))?;
        vsa.write(":SENS:SWE:TIME:AUTO ON")?;
        vsa.write("SENS:SWE:TYPE FFT")?;
        vsa.write("SENS:SWE:OPT SPE")?;
        vsa.write(&format!("SENS:SWE:WIND1:POIN {SWEEP_POINTS}"))?;
        vsa.write(&format!("DISP:WIND1:TRAC:Y:SCAL:RLEV {REFERENCE_LEVEL_DBM}"))?;
        vsa.write("SENS:INP:ATT:AUTO OFF")?;
        vsa.write(":INP:ATT 0")?;
        vsa.write("INP:GAIN:STAT ON")?;
        vsa.write(&format!("INP:GAIN:VAL {PREAMP_GAIN_DB}"))?;
        vsa.write("SENS:POW:NCOR ON")?;
        vsa.write("CALC1:MARK1:FUNC:FPE:STAT ON")?;
        vsa.write(&format!("CALC1:MARK1:X:SLIM:LEFT {range1_start:.0}"))?;
        vsa.write(&format!("CALC1:MARK1:X:SLIM:RIGH {range2_stop:.0}"))?;
        vsa.write(&format!("CALC1:THR {}", self.spur_limit_dbm))?;
        vsa.write("CALC1:MARK1:X:SLIM:STAT ON")?;
        vsa.write("CALC1:THR:STAT ON")?;
        info!(
            "Spur sweep ranges: {:.3}-{:.3} GHz and {:.3}-{:.3} GHz",
            range1_start / 1e9,
            range1_stop / 1e9,
            range2_start / 1e9,
            range2_stop / 1e9,
        );
        Ok(())
    }

    /// Points the generator at `frequency_hz` and plays the four-carrier
    /// stimulus at `power_dbm`.
    pub fn configure_generator(
        &mut self,
        frequency_hz: f64,
        power_dbm: f64,
    ) -> BenchResult<Timed<()>> {
        try_timed(|| {
            let mut vsg = lock_session(&self.vsg, Role::Vsg)?;
            vsg.query_opc("*RST")?;
            vsg.write(&format!("SOUR:FREQ:CW {frequency_hz:.0}"))?;
            vsg.write(&format!("SOUR:POW:LEV:IMM:AMPL {power_dbm:.2}"))?;
            vsg.write("SOURce1:BB:ARBitrary:MCARrier:CARRier1:MODE ARB")?;
            vsg.write("SOURce1:BB:ARBitrary:MCARrier:CARRier1:COUNt 4")?;
            for (carrier, offset_hz, level_dbm) in STIMULUS_CARRIERS {
                vsg.write(&format!(
                    "SOURce1:BB:ARBitrary:MCARrier:CARRier{carrier}:FREQuency {offset_hz}"
                ))?;
                vsg.write(&format!(
                    "SOURce1:BB:ARBitrary:MCARrier:CARRier{carrier}:POWer {level_dbm}"
                ))?;
                vsg.write(&format!(
                    "SOURce1:BB:ARBitrary:MCARrier:CARRier{carrier}:STATe 1"
                ))?;
            }
            vsg.query_opc("SOURce1:BB:ARBitrary:MCARrier:CLOad")?;
            vsg.write("SOURce1:BB:ARBitrary:TRIGger:OUTPut1:MODE REST")?;
            vsg.write("SOURce1:BB:ARBitrary:STATe 1")?;
            vsg.write("OUTPut1:STATe 1")?;
            self.power_dbm = power_dbm;
            info!(
                "Spur stimulus playing: {:.3} GHz at {power_dbm:.2} dBm",
                frequency_hz / 1e9
            );
            Ok(())
        })
    }

    /// Moves both instruments to a new fundamental without reconfiguring
    /// the search.
    pub fn retune(&mut self, frequency_hz: f64) -> BenchResult<Timed<()>> {
        try_timed(|| {
            info!("Tuning spur search to {:.3} GHz", frequency_hz / 1e9);
            lock_session(&self.vsa, Role::Vsa)?
                .write(&format!("SENS:FREQ:CENT {frequency_hz:.0}"))?;
            lock_session(&self.vsg, Role::Vsg)?
                .write(&format!("SOUR:FREQ:CW {frequency_hz:.0}"))?;
            self.fundamental_hz = frequency_hz;
            Ok(())
        })
    }

    /// Runs one averaged sweep over the configured ranges.
    pub fn measure(&mut self) -> BenchResult<Timed<()>> {
        try_timed(|| {
            let mut vsa = lock_session(&self.vsa, Role::Vsa)?;
            vsa.write(":INIT:CONT OFF")?;
            vsa.query_opc("INIT:IMM")?;
            info!("Spur sweep complete");
            Ok(())
        })
    }

    /// Reads the detected-peak table, filtered to exclude the fundamental.
    ///
    /// The peak count and the parallel frequency/level lists must agree; a
    /// mismatch discards the whole call rather than returning misaligned
    /// data.
    pub fn results(&mut self) -> BenchResult<Timed<Vec<Spur>>> {
        try_timed(|| self.collect_spurs())
    }

    fn collect_spurs(&mut self) -> BenchResult<Vec<Spur>> {
        let mut vsa = lock_session(&self.vsa, Role::Vsa)?;
        let count_raw = vsa.query(":CALC:MARK:FUNC:FPE:COUN?")?;
        let expected: usize = match count_raw.trim().parse() {
            Ok(count) => count,
            Err(_) => {
                warn!("Peak count not numeric: `{count_raw}`; discarding results");
                return Ok(Vec::new());
            }
        };
        if expected == 0 {
            info!("No peaks above threshold");
            return Ok(Vec::new());
        }
        vsa.write("DISP:WIND1:SUBW:TRAC1:Y:SCAL:AUTO ONCE")?;
        let frequency_list = vsa.query(":CALC:MARK:FUNC:FPE:X?")?;
        let level_list = vsa.query(":CALC:MARK:FUNC:FPE:Y?")?;
        drop(vsa);
        let frequencies = parse_float_list(&frequency_list);
        let levels = parse_float_list(&level_list);
        if frequencies.len() != expected || levels.len() != expected {
            warn!(
                "Peak list mismatch: expected {expected}, got {} frequencies and {} levels; discarding results",
                frequencies.len(),
                levels.len()
            );
            return Ok(Vec::new());
        }
        let mut spurs = Vec::new();
        for (frequency_hz, power_dbm) in frequencies.into_iter().zip(levels) {
            if (frequency_hz - self.fundamental_hz).abs() > EXCLUSION_WINDOW_HZ {
                info!("Spur: {:.6} GHz, {power_dbm:.2} dBm", frequency_hz / 1e9);
                spurs.push(Spur {
                    frequency_hz,
                    power_dbm,
                });
            } else {
                debug!(
                    "Dropping peak at {:.6} GHz inside the fundamental guard band",
                    frequency_hz / 1e9
                );
            }
        }
        if spurs.is_empty() {
            info!("No spurs after fundamental filtering");
        }
        Ok(spurs)
    }
}

fn parse_float_list(raw: &str) -> Vec<f64> {
    raw.split(',')
        .filter_map(|field| {
            let field = field.trim();
            if field.is_empty() {
                None
            } else {
                field.parse::<f64>().ok()
            }
        })
        .collect()
}
