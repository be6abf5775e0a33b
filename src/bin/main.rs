use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::Parser;
use colored::Colorize;
use env_logger::Env;
use log::info;
use rand::Rng;

use queue_pipeline::{PipelineConfig, PipelineReport, StageConfig, Transform};

/// Push work items through a multi-stage bounded-queue pipeline.
#[derive(Parser, Debug)]
#[command(name = "queue-pipeline", version)]
struct Args {
    /// TOML file describing the stages (defaults to download/resize/upload).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of items to submit.
    #[arg(short = 'n', long)]
    items: Option<usize>,

    /// Capacity of each inter-stage queue.
    #[arg(long)]
    capacity: Option<usize>,

    /// Simulated per-item latency upper bound for every stage, in milliseconds.
    #[arg(long)]
    delay_ms: Option<u64>,
}

/// The work item. Identity is all the pipeline needs; `hops` lets the summary
/// check that every item visited every stage.
#[derive(Debug)]
struct Parcel {
    id: usize,
    hops: usize,
}

fn load_config(args: &Args) -> Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    if let Some(items) = args.items {
        config.items = items;
    }
    if let Some(capacity) = args.capacity {
        config.capacity = capacity;
    }
    if let Some(delay_ms) = args.delay_ms {
        for stage in &mut config.stages {
            stage.delay_ms = delay_ms;
        }
    }
    config.validate().context("invalid pipeline configuration")?;
    Ok(config)
}

fn stage_transform(stage: &StageConfig) -> Transform<Parcel> {
    let delay_ms = stage.delay_ms;
    Arc::new(move |mut parcel: Parcel| {
        if delay_ms > 0 {
            let pause = rand::thread_rng().gen_range(0..=delay_ms);
            thread::sleep(Duration::from_millis(pause));
        }
        parcel.hops += 1;
        parcel
    })
}

fn print_summary(config: &PipelineConfig, report: &PipelineReport<Parcel>, elapsed: Duration) {
    println!("\n{}", "=== Pipeline Summary ===".bold());
    for stage in &report.stages {
        println!(
            "  {:<12} workers: {:>3}  processed: {:>6}  polled: {:>6}",
            stage.name.cyan(),
            stage.workers,
            stage.processed,
            stage.polled
        );
    }

    let line = format!(
        "Processed {} items after polling {} times",
        report.processed(),
        report.polled()
    );
    if report.processed() == config.items {
        println!("\n{}", line.green());
    } else {
        println!("\n{}", line.red());
    }
    println!("Elapsed: {:.2?}", elapsed);
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = load_config(&args)?;

    let mut pipeline = config
        .builder(stage_transform)
        .build()
        .context("starting pipeline")?;

    let started = Instant::now();
    let submitted = pipeline.submit((0..config.items).map(|id| Parcel { id, hops: 0 }))?;
    info!("submitted {submitted} items");

    let report = pipeline.shutdown_and_drain().context("draining pipeline")?;
    let elapsed = started.elapsed();

    let stages = config.stages.len();
    if let Some(parcel) = report.outputs.iter().find(|parcel| parcel.hops != stages) {
        bail!(
            "item {} visited {} of {} stages",
            parcel.id,
            parcel.hops,
            stages
        );
    }

    print_summary(&config, &report, elapsed);
    Ok(())
}
