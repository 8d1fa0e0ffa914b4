#![doc = include_str!("../README.md")]

mod config;
mod telemetry;

use anyhow::Context;
use bates::{BatchReport, Dispatcher, FileExplorer, ManifestAnnotator, WorkerPool};
use clap::Parser;
use config::{CliArgs, EndorseConfig};
use std::time::{Duration, Instant};
use telemetry::init_telemetry;

// Using mimalloc to keep allocation cheap in the parent while many worker
// round-trips are in flight.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = EndorseConfig::try_from(args)?;

    init_telemetry()?;
    log_startup_info(&config);

    std::fs::create_dir_all(&config.output_dir)
        .with_context(|| format!("cannot create {}", config.output_dir.display()))?;

    let files = FileExplorer::new(&config.input_dir, &config.extension).files()?;
    if files.is_empty() {
        tracing::warn!(
            "No .{} files found under {}",
            config.extension,
            config.input_dir.display()
        );
        return Ok(());
    }
    tracing::info!("Endorsing {} files", files.len());

    let dispatcher = Dispatcher::new(config.dispatch.clone());

    if config.mode.runs_async() {
        let options = config.options.clone();
        let pool = WorkerPool::new(
            move || ManifestAnnotator::new(options.clone()),
            config.pool,
        );
        let start = Instant::now();
        let report = dispatcher.run_async(&pool, &files).await?;
        let elapsed = start.elapsed();
        pool.close();
        print_report("async", &report, elapsed);
    }

    if config.mode.runs_sync() {
        let annotator = ManifestAnnotator::new(config.options.clone());
        let start = Instant::now();
        let report = tokio::task::block_in_place(|| dispatcher.run_sync(&annotator, &files))?;
        print_report("sync", &report, start.elapsed());
    }

    Ok(())
}

fn log_startup_info(config: &EndorseConfig) {
    if cfg!(debug_assertions) {
        tracing::info!("Starting with full config: {:#?}", config);
    } else {
        tracing::info!(
            "Starting from {} with {} workers",
            config.dispatch.starting_bates,
            config.pool.capacity
        );
    }
}

fn print_report(path: &str, report: &BatchReport, elapsed: Duration) {
    println!(
        "{path}: {} pages from {} of {} files in {:.3}s",
        report.pages,
        report.succeeded(),
        report.files,
        elapsed.as_secs_f64()
    );
    for failure in &report.failures {
        tracing::warn!("{}: {}", failure.source.display(), failure.error);
    }
}
