//! Result persistence: JSON records plus flat CSV sheets.
//!
//! The JSON file is the boundary contract with the downstream reporting
//! layer — one record per test set, exactly as produced by the runner. The
//! CSV sheets are derived views: a flat per-row sheet (spur sets exploded
//! one row per spur, STN sets one row per iteration) and a timing summary
//! with count/total/mean/median per operation.

use crate::error::{BenchError, BenchResult};
use crate::measurement::result::MeasurementResult;
use log::info;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

/// Writes the result records as a pretty-printed JSON array.
pub fn write_json(path: &Path, results: &[MeasurementResult]) -> BenchResult<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, results)
        .map_err(|e| BenchError::Report(format!("writing {}: {e}", path.display())))?;
    info!("Results written to {}", path.display());
    Ok(())
}

const SHEET_HEADER: [&str; 18] = [
    "test_set",
    "type",
    "center_frequency_ghz",
    "power_dbm",
    "config",
    "evm_db",
    "ch_pwr_dbm",
    "acp_lower_db",
    "acp_upper_db",
    "alt_lower_db",
    "alt_upper_db",
    "spur_frequency_mhz",
    "spur_power_dbm",
    "iteration",
    "marker_dbm",
    "stats_avg_dbm",
    "total_time_s",
    "error",
];

fn fmt_value(value: f64) -> String {
    if value.is_finite() {
        format!("{value:.3}")
    } else {
        String::new()
    }
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map(fmt_value).unwrap_or_default()
}

/// Sum of the measurement-phase timings, setup steps excluded.
fn measurement_time(result: &MeasurementResult) -> f64 {
    result
        .timings()
        .iter()
        .filter(|(operation, _)| !operation.starts_with("configure"))
        .map(|(_, seconds)| seconds)
        .sum()
}

/// Writes the flat per-row result sheet.
pub fn write_sheet(path: &Path, results: &[MeasurementResult]) -> BenchResult<()> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| BenchError::Report(format!("creating {}: {e}", path.display())))?;
    writer
        .write_record(SHEET_HEADER)
        .map_err(|e| BenchError::Report(e.to_string()))?;
    for result in results {
        for row in sheet_rows(result) {
            writer
                .write_record(&row)
                .map_err(|e| BenchError::Report(e.to_string()))?;
        }
    }
    writer
        .flush()
        .map_err(|e| BenchError::Report(e.to_string()))?;
    info!("Result sheet written to {}", path.display());
    Ok(())
}

fn sheet_rows(result: &MeasurementResult) -> Vec<Vec<String>> {
    let mut base: Vec<String> = vec![String::new(); SHEET_HEADER.len()];
    base[0] = result.test_set().to_string();
    base[1] = result.type_label().to_string();
    base[17] = result.error().unwrap_or_default().to_string();
    match result {
        MeasurementResult::Nr5g(record) | MeasurementResult::Lte(record) => {
            base[2] = fmt_value(record.center_frequency_hz / 1e9);
            base[3] = fmt_value(record.power_dbm);
            base[4] = record.config.clone();
            base[5] = fmt_value(record.evm);
            base[6] = fmt_opt(record.ch_pwr);
            base[7] = fmt_opt(record.acp_lower);
            base[8] = fmt_opt(record.acp_upper);
            base[9] = fmt_opt(record.alt_lower);
            base[10] = fmt_opt(record.alt_upper);
            base[16] = fmt_value(measurement_time(result));
            vec![base]
        }
        MeasurementResult::SpurSearch(record) => {
            base[2] = fmt_value(record.fundamental_frequency_hz / 1e9);
            base[3] = fmt_value(record.power_dbm);
            base[4] = record.config.clone();
            base[16] = fmt_value(measurement_time(result));
            if record.spurs.is_empty() {
                return vec![base];
            }
            record
                .spurs
                .iter()
                .map(|spur| {
                    let mut row = base.clone();
                    row[11] = fmt_value(spur.frequency_hz / 1e6);
                    row[12] = fmt_value(spur.power_dbm);
                    row
                })
                .collect()
        }
        MeasurementResult::Stn(record) => {
            base[2] = fmt_value(record.center_frequency_hz / 1e9);
            base[4] = record.config.clone();
            base[15] = fmt_opt(record.stats.map(|stats| stats.avg));
            base[16] = fmt_value(record.total_test_time);
            if record.markers.is_empty() {
                return vec![base];
            }
            record
                .markers
                .iter()
                .enumerate()
                .map(|(index, sample)| {
                    let mut row = base.clone();
                    row[13] = (index + 1).to_string();
                    row[14] = fmt_opt(sample.marker);
                    row
                })
                .collect()
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Writes per-operation timing statistics across all test sets.
pub fn write_timing_stats(path: &Path, results: &[MeasurementResult]) -> BenchResult<()> {
    let mut per_operation: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for result in results {
        for (operation, seconds) in result.timings().iter() {
            per_operation.entry(operation).or_default().push(seconds);
        }
    }
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| BenchError::Report(format!("creating {}: {e}", path.display())))?;
    writer
        .write_record(["operation", "count", "total_s", "mean_s", "median_s"])
        .map_err(|e| BenchError::Report(e.to_string()))?;
    writer
        .write_record([
            "test_sets".to_string(),
            results.len().to_string(),
            String::new(),
            String::new(),
            String::new(),
        ])
        .map_err(|e| BenchError::Report(e.to_string()))?;
    for (operation, samples) in &per_operation {
        writer
            .write_record([
                (*operation).to_string(),
                samples.len().to_string(),
                format!("{:.3}", samples.iter().sum::<f64>()),
                format!("{:.3}", mean(samples)),
                format!("{:.3}", median(samples)),
            ])
            .map_err(|e| BenchError::Report(e.to_string()))?;
    }
    writer
        .flush()
        .map_err(|e| BenchError::Report(e.to_string()))?;
    info!("Timing statistics written to {}", path.display());
    Ok(())
}
