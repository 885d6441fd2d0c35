//! CLI entry point for the RF bench.
//!
//! Loads the bench settings and a JSON test matrix, runs every enabled
//! test set against the instruments, and writes the result records plus
//! derived CSV sheets.
//!
//! # Usage
//!
//! ```bash
//! rf_bench --config config/bench.toml --matrix test_inputs.json --output-dir results/
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use rf_bench::config::Settings;
use rf_bench::instrument::registry::SessionRegistry;
use rf_bench::matrix::TestMatrix;
use rf_bench::report;
use rf_bench::runner::Runner;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rf_bench")]
#[command(about = "VSA/VSG RF measurement sweeps over SCPI", long_about = None)]
struct Cli {
    /// Bench settings file (VSA/VSG endpoints)
    #[arg(long, default_value = "config/bench.toml")]
    config: PathBuf,

    /// Test matrix JSON file
    #[arg(long, default_value = "test_inputs.json")]
    matrix: PathBuf,

    /// Directory for result records and sheets
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::from_path(&cli.config)
        .with_context(|| format!("loading bench settings from {}", cli.config.display()))?;
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(settings.log_level.clone()),
    )
    .init();
    log::info!(
        "Bench: VSA at {}, VSG at {}",
        settings.bench.vsa,
        settings.bench.vsg
    );

    let matrix = TestMatrix::from_path(&cli.matrix)
        .with_context(|| format!("loading test matrix from {}", cli.matrix.display()))?;

    let registry = SessionRegistry::new(settings.bench.clone());
    let results = Runner::new(registry).run(&matrix);

    std::fs::create_dir_all(&cli.output_dir)
        .with_context(|| format!("creating {}", cli.output_dir.display()))?;
    report::write_json(&cli.output_dir.join("results_output.json"), &results)?;
    report::write_sheet(&cli.output_dir.join("results_output.csv"), &results)?;
    report::write_timing_stats(&cli.output_dir.join("results_timing_stats.csv"), &results)?;

    let failed = results.iter().filter(|r| r.error().is_some()).count();
    log::info!(
        "{} test sets complete, {failed} flagged with errors",
        results.len()
    );
    Ok(())
}
