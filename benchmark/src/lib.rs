// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Snapbench Benchmarking Framework
//!
//! Runs named benchmark drivers (image pull and container run, per
//! snapshotter backend) one after another and records per-iteration
//! wall-clock durations into a single JSON report keyed by commit.
//!
//! # Drivers
//!
//! - **OverlayFSPull / SociRPull**: fresh runtime daemon per iteration, pull timed
//! - **OverlayFSRun / SociRun**: image pulled once, one container run timed per iteration

pub mod harness;
pub mod metrics;
pub mod reporter;
pub mod scenarios;

pub use harness::{
    BenchmarkFramework, BenchmarkTestDriver, DriverState, IterationTimer, PhaseError, PhaseResult,
    Scenario,
};
pub use metrics::{
    BenchmarkReport, DriverReport, DriverStatus, IterationResult, LatencyMetrics, Phase,
    PhaseFailure, SystemInfo,
};
pub use reporter::{JsonReporter, ReporterError};
pub use scenarios::build_drivers;
