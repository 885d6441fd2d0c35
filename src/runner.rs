//! Test-set orchestration across measurement families.
//!
//! Families run in a fixed order (NR5G, LTE, spur search, STN) with one
//! global test-set counter. Every test set yields exactly one result
//! record: failures inside a set are caught at the set boundary and
//! recorded on the record's `error` field together with whatever timings
//! were collected, then the run moves on. A failure while initializing a
//! family (driver construction, instrument unreachable) aborts that
//! family's remaining sets but not the other families.

use crate::error::BenchResult;
use crate::instrument::registry::{Role, SessionRegistry};
use crate::matrix::{EvmTestEntry, SpurTestEntry, StnTestEntry, TestMatrix};
use crate::measurement::evm::EvmDriver;
use crate::measurement::result::{
    EvmRecord, MarkerSample, MeasurementResult, Spur, SpurRecord, StnRecord,
};
use crate::measurement::spur::SpurSearchDriver;
use crate::measurement::stn::{SampleStats, StnDriver};
use crate::measurement::timing::TimingRecord;
use crate::measurement::tracker::{ConfigChangeTracker, MeasurementConfig};
use crate::waveform::SignalFamily;
use log::{error, info};
use std::sync::Arc;

/// Runs a test matrix against the bench.
pub struct Runner {
    registry: SessionRegistry,
    tracker: ConfigChangeTracker,
    next_test_set: u32,
    results: Vec<MeasurementResult>,
}

impl Runner {
    /// Creates a runner around an instrument registry.
    pub fn new(registry: SessionRegistry) -> Self {
        Self {
            registry,
            tracker: ConfigChangeTracker::new(),
            next_test_set: 1,
            results: Vec::new(),
        }
    }

    /// Runs every enabled test across all families, then closes the
    /// instrument sessions. Returns one record per executed test set.
    pub fn run(mut self, matrix: &TestMatrix) -> Vec<MeasurementResult> {
        self.run_evm_family(SignalFamily::Nr5g, &matrix.nr5g);
        self.run_evm_family(SignalFamily::Lte, &matrix.lte);
        self.run_spur_family(&matrix.spur_search);
        self.run_stn_family(&matrix.stn);
        self.registry.close_all();
        self.results
    }

    fn next_set(&mut self) -> u32 {
        let number = self.next_test_set;
        self.next_test_set += 1;
        number
    }

    fn run_evm_family(&mut self, family: SignalFamily, entries: &[EvmTestEntry]) {
        for entry in entries.iter().filter(|entry| entry.run) {
            let frequencies = match entry.center_frequency_ghz.expand_ghz() {
                Ok(frequencies) => frequencies,
                Err(err) => {
                    error!("{family} test entry rejected: {err}");
                    continue;
                }
            };
            let powers = match entry.power_dbm.expand() {
                Ok(powers) => powers,
                Err(err) => {
                    error!("{family} test entry rejected: {err}");
                    continue;
                }
            };
            let mut driver =
                match self.build_evm_driver(family, entry, frequencies[0], powers[0]) {
                    Ok(driver) => driver,
                    Err(err) => {
                        error!("{family} initialization failed, skipping entry: {err}");
                        continue;
                    }
                };
            for &frequency_ghz in &frequencies {
                for &power_dbm in &powers {
                    let test_set = self.next_set();
                    let config = MeasurementConfig {
                        center_frequency_hz: frequency_ghz * 1e9,
                        power_dbm,
                        waveform_file: entry.waveform_file.clone(),
                        setup_file: entry.setup_file.clone(),
                        measure_aclr: entry.measure_aclr,
                    };
                    let record = self.run_evm_set(family, &mut driver, &config, test_set);
                    self.results.push(MeasurementResult::from_evm(family, record));
                }
            }
        }
    }

    fn build_evm_driver(
        &mut self,
        family: SignalFamily,
        entry: &EvmTestEntry,
        first_frequency_ghz: f64,
        first_power_dbm: f64,
    ) -> BenchResult<EvmDriver> {
        let vsa = self.registry.session(Role::Vsa)?;
        let vsg = self.registry.session(Role::Vsg)?;
        EvmDriver::new(
            family,
            vsa,
            vsg,
            first_frequency_ghz * 1e9,
            first_power_dbm,
            entry.waveform_file.clone(),
            entry.setup_file.clone(),
        )
    }

    fn run_evm_set(
        &mut self,
        family: SignalFamily,
        driver: &mut EvmDriver,
        config: &MeasurementConfig,
        test_set: u32,
    ) -> EvmRecord {
        info!(
            "=== Test set {test_set} ({family}): {:.3} GHz, {} dBm ===",
            config.center_frequency_hz / 1e9,
            config.power_dbm
        );
        let mut timings = TimingRecord::new();
        let mut record = EvmRecord::placeholder(test_set, family, driver.descriptor(), config);
        if let Err(err) = self.execute_evm_set(driver, config, &mut timings, &mut record) {
            error!("{family} test set {test_set} failed: {err}");
            record.error = Some(err.to_string());
        }
        record.timings = timings;
        record
    }

    fn execute_evm_set(
        &mut self,
        driver: &mut EvmDriver,
        config: &MeasurementConfig,
        timings: &mut TimingRecord,
        record: &mut EvmRecord,
    ) -> BenchResult<()> {
        let frequency_hz = config.center_frequency_hz;
        if self.tracker.should_reconfigure(config) {
            info!("Waveform or setup selection changed; reconfiguring generator and analyzer");
            let ((), seconds) = driver.configure_generator()?;
            timings.record("configure_generator", seconds);
            let ((), seconds) = driver.configure_analyzer(frequency_hz)?;
            timings.record("configure_analyzer", seconds);
            self.tracker.note_reconfigured(config);
        } else {
            info!("Configuration unchanged; skipping generator/analyzer setup");
            timings.record_skipped("configure_generator");
            timings.record_skipped("configure_analyzer");
        }
        if self.tracker.should_retune(frequency_hz) {
            let ((), seconds) = driver.retune(frequency_hz)?;
            timings.record("retune", seconds);
            self.tracker.note_retuned(frequency_hz);
        } else {
            info!("Frequency unchanged; skipping retune");
            timings.record_skipped("retune");
        }
        driver.set_generator_power(config.power_dbm)?;
        let (summary, seconds) = driver.config_summary()?;
        timings.record("config_summary", seconds);
        record.config = summary;
        let ((), seconds) = driver.sweep()?;
        timings.record("sweep", seconds);
        let (evm, seconds) = driver.measure_evm()?;
        timings.record("measure_evm", seconds);
        record.evm = evm;
        if config.measure_aclr {
            let (aclr, seconds) = driver.measure_aclr()?;
            timings.record("measure_aclr", seconds);
            if let Some(aclr) = aclr {
                record.ch_pwr = Some(aclr.ch_pwr);
                record.acp_lower = Some(aclr.acp_lower);
                record.acp_upper = Some(aclr.acp_upper);
                record.alt_lower = Some(aclr.alt_lower);
                record.alt_upper = Some(aclr.alt_upper);
            }
        } else {
            timings.record_skipped("measure_aclr");
        }
        Ok(())
    }

    fn run_spur_family(&mut self, entries: &[SpurTestEntry]) {
        for entry in entries.iter().filter(|entry| entry.run) {
            let frequencies = match entry.fundamental_frequency_ghz.expand_ghz() {
                Ok(frequencies) => frequencies,
                Err(err) => {
                    error!("Spur search test entry rejected: {err}");
                    continue;
                }
            };
            let (vsa, vsg) = match (
                self.registry.session(Role::Vsa),
                self.registry.session(Role::Vsg),
            ) {
                (Ok(vsa), Ok(vsg)) => (vsa, vsg),
                (Err(err), _) | (_, Err(err)) => {
                    error!("Spur search initialization failed, aborting family: {err}");
                    return;
                }
            };
            for &fundamental_ghz in &frequencies {
                let test_set = self.next_set();
                let mut driver = SpurSearchDriver::new(
                    Arc::clone(&vsa),
                    Arc::clone(&vsg),
                    fundamental_ghz * 1e9,
                    entry.rbw_mhz * 1e6,
                    entry.spur_limit_dbm,
                    entry.power_dbm,
                );
                let record = run_spur_set(&mut driver, test_set);
                self.results.push(MeasurementResult::SpurSearch(record));
            }
        }
    }

    fn build_stn_driver(&mut self, frequency_hz: f64) -> BenchResult<StnDriver> {
        let vsa = self.registry.session(Role::Vsa)?;
        let vsg = self.registry.session(Role::Vsg)?;
        StnDriver::new(vsa, vsg, frequency_hz)
    }

    fn run_stn_family(&mut self, entries: &[StnTestEntry]) {
        // One driver serves every STN set; later sets only move the
        // capture frequency.
        let mut driver: Option<StnDriver> = None;
        for entry in entries.iter().filter(|entry| entry.run) {
            let frequencies = match entry.center_frequency_ghz.expand_ghz() {
                Ok(frequencies) => frequencies,
                Err(err) => {
                    error!("STN test entry rejected: {err}");
                    continue;
                }
            };
            for &frequency_ghz in &frequencies {
                let frequency_hz = frequency_ghz * 1e9;
                let test_set = self.next_set();
                let needs_retune = driver.is_some();
                if driver.is_none() {
                    match self.build_stn_driver(frequency_hz) {
                        Ok(fresh) => driver = Some(fresh),
                        Err(err) => {
                            error!("STN initialization failed, aborting family: {err}");
                            return;
                        }
                    }
                }
                let Some(active) = driver.as_mut() else {
                    return;
                };
                if needs_retune {
                    if let Err(err) = active.set_frequency(frequency_hz) {
                        error!("STN test set {test_set} failed: {err}");
                        let mut record = StnRecord::placeholder(
                            test_set,
                            frequency_hz,
                            active.sweep_time_s(),
                            entry.iterations,
                        );
                        record.error = Some(err.to_string());
                        self.results.push(MeasurementResult::Stn(record));
                        continue;
                    }
                }
                let record = run_stn_set(active, frequency_hz, entry.iterations, test_set);
                self.results.push(MeasurementResult::Stn(record));
            }
        }
    }
}

fn run_spur_set(driver: &mut SpurSearchDriver, test_set: u32) -> SpurRecord {
    info!(
        "=== Test set {test_set} (SpurSearch): fundamental {:.3} GHz ===",
        driver.fundamental_hz() / 1e9
    );
    let mut timings = TimingRecord::new();
    let mut record = SpurRecord::placeholder(
        test_set,
        driver.fundamental_hz(),
        driver.rbw_hz(),
        driver.spur_limit_dbm(),
        driver.power_dbm(),
    );
    let fundamental_hz = driver.fundamental_hz();
    let power_dbm = driver.power_dbm();
    let outcome = (|| -> BenchResult<Vec<Spur>> {
        let ((), seconds) = driver.configure_generator(fundamental_hz, power_dbm)?;
        timings.record("configure_generator", seconds);
        let ((), seconds) = driver.configure_analyzer()?;
        timings.record("configure_analyzer", seconds);
        let ((), seconds) = driver.measure()?;
        timings.record("measure", seconds);
        let (spurs, seconds) = driver.results()?;
        timings.record("results", seconds);
        Ok(spurs)
    })();
    match outcome {
        Ok(spurs) => {
            if spurs.is_empty() {
                record.error = Some("No spurs detected".to_string());
            }
            record.spurs = spurs;
        }
        Err(err) => {
            error!("SpurSearch test set {test_set} failed: {err}");
            record.error = Some(err.to_string());
        }
    }
    record.timings = timings;
    record
}

fn run_stn_set(
    driver: &mut StnDriver,
    frequency_hz: f64,
    iterations: u32,
    test_set: u32,
) -> StnRecord {
    info!(
        "=== Test set {test_set} (STN): {:.3} GHz, {iterations} iterations ===",
        frequency_hz / 1e9
    );
    let mut timings = TimingRecord::new();
    let mut record =
        StnRecord::placeholder(test_set, frequency_hz, driver.sweep_time_s(), iterations);
    let mut total_seconds = 0.0;
    match driver.configure_analyzer() {
        Ok(((), seconds)) => {
            timings.record("configure_analyzer", seconds);
            total_seconds += seconds;
        }
        Err(err) => {
            error!("STN test set {test_set} failed: {err}");
            record.error = Some(err.to_string());
            record.timings = timings;
            return record;
        }
    }
    for iteration in 1..=iterations {
        let key = format!("noise_marker_{iteration}");
        match driver.measure_noise_marker() {
            Ok((marker, seconds)) => {
                info!("STN iteration {iteration}: {marker:.2} dBm in {seconds:.3} s");
                record.markers.push(MarkerSample {
                    marker: Some(marker),
                    meas_time: seconds,
                });
                timings.record(&key, seconds);
                total_seconds += seconds;
            }
            Err(err) => {
                // One failed sweep loses its sample, not the set.
                error!("STN iteration {iteration} failed: {err}");
                record.markers.push(MarkerSample {
                    marker: None,
                    meas_time: 0.0,
                });
                timings.record_skipped(&key);
            }
        }
    }
    let valid: Vec<f64> = record.markers.iter().filter_map(|m| m.marker).collect();
    if valid.len() >= 2 {
        record.stats = SampleStats::from_samples(&valid);
        if let Some(stats) = &record.stats {
            info!("STN stats: {stats}");
        }
    }
    if valid.is_empty() {
        record.error = Some("No successful measurements".to_string());
    }
    record.total_test_time = total_seconds;
    record.timings = timings;
    record
}
