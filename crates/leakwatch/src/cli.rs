//! Command line definition.

use crate::scenarios::Scenario;
use anyhow::{Context, Result};
use clap::Parser;
use leakwatch_tester::TesterConfig;
use std::path::PathBuf;

/// Memory leak tester for async workloads
#[derive(Parser, Debug)]
#[command(name = "leakwatch")]
#[command(version)]
#[command(
    long_about = "Runs a built-in workload scenario repeatedly, samples heap usage at a fixed \
                  iteration cadence and reports whether the heap shows sustained growth. \
                  Prints the result as JSON. Exit status is 0 without a leak, 2 when a leak \
                  is detected and 1 on error."
)]
pub struct Cli {
    /// TOML configuration file; flags below override its values
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Workload scenario to exercise
    #[arg(short, long, value_enum, default_value_t = Scenario::Leak)]
    pub scenario: Scenario,

    /// Iterations per run
    #[arg(short = 'n', long)]
    pub iterations: Option<u32>,

    /// Iterations between samples
    #[arg(short, long)]
    pub interval: Option<u32>,

    /// Leak threshold in MB
    #[arg(short, long)]
    pub threshold: Option<f64>,

    /// Log every iteration and sample
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Skip explicit reclamation before samples
    #[arg(long, default_value_t = false)]
    pub no_gc: bool,
}

impl Cli {
    /// Resolve the tester configuration: file (or defaults), then flags.
    pub fn tester_config(&self) -> Result<TesterConfig> {
        let mut config = match &self.config {
            Some(path) => TesterConfig::load(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => TesterConfig::default(),
        };

        if let Some(iterations) = self.iterations {
            config = config.with_iterations(iterations);
        }
        if let Some(interval) = self.interval {
            config = config.with_snapshot_interval(interval);
        }
        if let Some(threshold) = self.threshold {
            config = config.with_leak_threshold_mb(threshold);
        }
        if self.verbose {
            config = config.with_verbose(true);
        }
        if self.no_gc {
            config = config.with_gc(false);
        }

        config.validate().context("invalid command line options")?;
        Ok(config)
    }
}
