// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! CLI tool to run the pull/run benchmark matrix and write the report.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use snapbench_benchmark::{build_drivers, BenchmarkFramework, BenchmarkReport, JsonReporter};
use snapbench_core::matrix::load_matrix;
use snapbench_core::{BenchConfig, ConfigLoader};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "run_benchmarks")]
#[command(about = "Benchmark container image pull and run across snapshotters")]
struct Args {
    /// Commit identifier the report is keyed by
    commit_id: String,

    /// Image matrix: `shortName,imageRef[,indexDigest[,readyLine]]` per line
    matrix: PathBuf,

    /// Optional YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Iterations per driver (overrides the configuration)
    #[arg(short, long)]
    iterations: Option<u32>,

    /// Report output file (overrides the configuration)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn load_config(args: &Args) -> anyhow::Result<BenchConfig> {
    let mut config = match &args.config {
        Some(path) => ConfigLoader::load_file(path)
            .with_context(|| format!("loading configuration {}", path.display()))?,
        None => BenchConfig::default(),
    };

    if let Some(iterations) = args.iterations {
        anyhow::ensure!(iterations >= 1, "--iterations must be at least 1");
        config.iterations = iterations;
    }
    if let Some(output) = &args.output {
        config.output_file = output.clone();
    }
    Ok(config)
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = load_config(&args)?;
    let images = load_matrix(&args.matrix)
        .with_context(|| format!("loading image matrix {}", args.matrix.display()))?;

    tracing::info!(
        commit = %args.commit_id,
        images = images.len(),
        iterations = config.iterations,
        output = %config.output_file.display(),
        "Starting benchmark run"
    );

    let reporter = JsonReporter::new(&config.output_file);
    let mut framework =
        BenchmarkFramework::new(args.commit_id.clone()).with_drivers(build_drivers(&config, &images));
    let report = framework.execute();

    let path = reporter
        .save(&report)
        .with_context(|| format!("writing report {}", config.output_file.display()))?;

    println!();
    println!("Benchmark report saved to: {}", path.display());
    println!();
    print_summary(&report);

    Ok(())
}

fn print_summary(report: &BenchmarkReport) {
    println!("Summary ({})", report.commit_id);
    println!("-------");
    println!();

    for driver in &report.drivers {
        println!("{}", driver.summary_line());
    }
}
