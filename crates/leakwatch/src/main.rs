//! leakwatch: memory leak tester
//!
//! Main entry point. Installs the counting allocator, sets up logging,
//! runs the selected workload scenario and prints the result as JSON.

mod cli;
mod scenarios;

use anyhow::{Context, Result};
use clap::Parser;
use leakwatch_memory::{MemoryStats, ProcessMeasurementProvider, TrackingAllocator, heap_stats};
use leakwatch_tester::{CancelToken, Event, EventKind, LeakTester};
use std::process::ExitCode;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// Counting allocator over mimalloc, so heap figures reflect real allocations
#[global_allocator]
static GLOBAL: TrackingAllocator = TrackingAllocator;

/// Exit status when a leak is detected
const EXIT_LEAK: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<ExitCode> {
    let cli = cli::Cli::parse();
    init_logging(cli.verbose);

    let config = cli.tester_config()?;
    let provider = Arc::new(ProcessMeasurementProvider::new());
    let tester =
        LeakTester::with_provider(config.clone(), provider.clone()).context("starting tester")?;

    let failed_cases = Arc::new(Mutex::new(Vec::new()));
    {
        let failed_cases = failed_cases.clone();
        tester.subscribe(EventKind::Error, move |event| {
            if let Event::Error {
                case: Some(case), ..
            } = event
            {
                failed_cases
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(case.clone());
            }
        });
    }

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, stopping after the current iteration");
                cancel.cancel();
            }
        });
    }

    info!("leakwatch starting '{}' scenario", cli.scenario);
    let cases = scenarios::build(cli.scenario, &config);
    let result = tester.run_tests_with_cancel(&cases, &cancel).await;

    let heap = heap_stats();
    info!(
        "Heap: {} live, {} peak; {}",
        MemoryStats::format_bytes(heap.live() as u64),
        MemoryStats::format_bytes(heap.peak() as u64),
        provider.reclaim_stats().format()
    );

    let failed_cases = failed_cases.lock().unwrap_or_else(PoisonError::into_inner);
    if !failed_cases.is_empty() {
        warn!("Failed cases: {}", failed_cases.join(", "));
    }

    println!(
        "{}",
        serde_json::to_string_pretty(&result).context("serializing result")?
    );

    if result.has_leak {
        Ok(ExitCode::from(EXIT_LEAK))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

/// Log to stderr so stdout carries only the JSON result.
fn init_logging(verbose: bool) {
    let default_filter = if verbose {
        "leakwatch=debug,leakwatch_tester=info,leakwatch_memory=info"
    } else {
        "leakwatch=info,leakwatch_tester=warn,leakwatch_memory=warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();
}
