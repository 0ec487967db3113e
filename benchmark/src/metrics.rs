// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Report types for benchmark results.
//!
//! A report is keyed by commit identifier and driver name. Each driver entry
//! keeps every iteration record in order, pass or fail, plus a latency
//! summary over the passing ones.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sysinfo::System;

/// Driver phase, as recorded on a failure marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Before,
    Test,
    After,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Before => write!(f, "before"),
            Phase::Test => write!(f, "test"),
            Phase::After => write!(f, "after"),
        }
    }
}

/// Explicit failure marker on a driver entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseFailure {
    pub phase: Phase,
    pub message: String,
}

impl PhaseFailure {
    pub fn new(phase: Phase, message: impl Into<String>) -> Self {
        Self {
            phase,
            message: message.into(),
        }
    }
}

/// Outcome of one timed iteration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationResult {
    pub driver: String,
    /// 1-based iteration index.
    pub iteration: u32,
    pub elapsed_ns: u64,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IterationResult {
    pub fn passed(driver: &str, iteration: u32, elapsed: Duration) -> Self {
        Self {
            driver: driver.to_string(),
            iteration,
            elapsed_ns: duration_ns(elapsed),
            passed: true,
            error: None,
        }
    }

    pub fn failed(driver: &str, iteration: u32, elapsed: Duration, error: impl Into<String>) -> Self {
        Self {
            driver: driver.to_string(),
            iteration,
            elapsed_ns: duration_ns(elapsed),
            passed: false,
            error: Some(error.into()),
        }
    }

    pub fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.elapsed_ns)
    }
}

fn duration_ns(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

/// Latency metrics with statistical analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyMetrics {
    /// Number of samples the summary covers
    pub count: usize,
    pub min_ns: u64,
    pub max_ns: u64,
    pub mean_ns: f64,
    /// Median (p50) latency in nanoseconds
    pub median_ns: u64,
    pub p95_ns: u64,
    pub p99_ns: u64,
    pub std_dev_ns: f64,
}

/// Value at `percentile` of an ascending, non-empty slice, by nearest rank.
fn nearest_rank(sorted: &[u64], percentile: f64) -> u64 {
    let rank = (percentile / 100.0 * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

impl LatencyMetrics {
    /// Summarise iteration times given in nanoseconds; `None` when empty.
    pub fn from_samples(mut samples: Vec<u64>) -> Option<Self> {
        samples.sort_unstable();
        let (&min_ns, &max_ns) = (samples.first()?, samples.last()?);

        let count = samples.len();
        let mean_ns = samples.iter().map(|&ns| ns as f64).sum::<f64>() / count as f64;
        let spread = samples
            .iter()
            .map(|&ns| (ns as f64 - mean_ns).powi(2))
            .sum::<f64>()
            / count as f64;

        Some(Self {
            count,
            min_ns,
            max_ns,
            mean_ns,
            median_ns: nearest_rank(&samples, 50.0),
            p95_ns: nearest_rank(&samples, 95.0),
            p99_ns: nearest_rank(&samples, 99.0),
            std_dev_ns: spread.sqrt(),
        })
    }
}

/// Render nanoseconds in the largest unit that keeps the value at least 1.
pub fn format_ns(ns: u64) -> String {
    const UNITS: [(u64, &str); 3] = [(1_000_000_000, "s"), (1_000_000, "ms"), (1_000, "μs")];
    UNITS
        .iter()
        .find(|&&(scale, _)| ns >= scale)
        .map(|&(scale, unit)| format!("{:.2}{unit}", ns as f64 / scale as f64))
        .unwrap_or_else(|| format!("{ns}ns"))
}

/// Overall outcome of a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverStatus {
    /// Every iteration passed and no phase failed.
    Passed,
    /// All phases ran, but some iterations failed.
    Degraded,
    /// `before` or `after` failed.
    Failed,
}

impl std::fmt::Display for DriverStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DriverStatus::Passed => write!(f, "passed"),
            DriverStatus::Degraded => write!(f, "degraded"),
            DriverStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Everything recorded for one driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverReport {
    pub name: String,
    /// Configured iteration budget
    pub iterations: u32,
    pub status: DriverStatus,
    pub results: Vec<IterationResult>,
    /// Summary over passing iterations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency: Option<LatencyMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<PhaseFailure>,
}

impl DriverReport {
    pub fn from_results(
        name: impl Into<String>,
        iterations: u32,
        results: Vec<IterationResult>,
        failure: Option<PhaseFailure>,
    ) -> Self {
        let passing: Vec<u64> = results
            .iter()
            .filter(|r| r.passed)
            .map(|r| r.elapsed_ns)
            .collect();
        let all_passed = passing.len() == results.len();

        let status = match (&failure, all_passed) {
            (Some(_), _) => DriverStatus::Failed,
            (None, true) => DriverStatus::Passed,
            (None, false) => DriverStatus::Degraded,
        };

        Self {
            name: name.into(),
            iterations,
            status,
            latency: LatencyMetrics::from_samples(passing),
            results,
            failure,
        }
    }

    pub fn passed_count(&self) -> usize {
        self.results.iter().filter(|r| r.passed).count()
    }

    pub fn failed_count(&self) -> usize {
        self.results.len() - self.passed_count()
    }

    /// Elapsed durations of every iteration, in order.
    pub fn durations(&self) -> Vec<Duration> {
        self.results.iter().map(IterationResult::elapsed).collect()
    }

    /// One-line human-readable summary.
    pub fn summary_line(&self) -> String {
        let mut line = format!(
            "{}: {} ({}/{} passed)",
            self.name,
            self.status,
            self.passed_count(),
            self.results.len()
        );
        if let Some(latency) = &self.latency {
            line.push_str(&format!(
                ", median={}, p95={}, min={}, max={}",
                format_ns(latency.median_ns),
                format_ns(latency.p95_ns),
                format_ns(latency.min_ns),
                format_ns(latency.max_ns)
            ));
        }
        if let Some(failure) = &self.failure {
            line.push_str(&format!(", {} failed: {}", failure.phase, failure.message));
        }
        line
    }
}

/// System information captured at benchmark time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemInfo {
    pub os: String,
    pub os_version: String,
    pub kernel_version: Option<String>,
    pub cpu_model: String,
    pub cpu_cores: usize,
    /// Total system memory in bytes
    pub memory_bytes: u64,
    pub hostname: String,
}

fn or_unknown(value: Option<String>) -> String {
    value.unwrap_or_else(|| "unknown".to_string())
}

impl SystemInfo {
    /// Describe the host the benchmark runs on.
    pub fn collect() -> Self {
        let mut sys = System::new();
        sys.refresh_cpu();
        sys.refresh_memory();
        let cpus = sys.cpus();

        Self {
            os: or_unknown(System::name()),
            os_version: or_unknown(System::os_version()),
            kernel_version: System::kernel_version(),
            cpu_model: or_unknown(cpus.first().map(|cpu| cpu.brand().trim().to_string())),
            cpu_cores: cpus.len(),
            memory_bytes: sys.total_memory(),
            hostname: or_unknown(System::host_name()),
        }
    }
}

/// Complete report for one commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkReport {
    pub commit_id: String,
    pub benchmark_suite: String,
    /// Framework version
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub system_info: SystemInfo,
    /// Driver entries in execution order
    pub drivers: Vec<DriverReport>,
}

impl BenchmarkReport {
    pub fn new(commit_id: impl Into<String>) -> Self {
        Self {
            commit_id: commit_id.into(),
            benchmark_suite: "snapbench".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: Utc::now(),
            system_info: SystemInfo::collect(),
            drivers: Vec::new(),
        }
    }

    pub fn add_driver(&mut self, driver: DriverReport) {
        self.drivers.push(driver);
    }

    pub fn driver(&self, name: &str) -> Option<&DriverReport> {
        self.drivers.iter().find(|d| d.name == name)
    }

    pub fn durations(&self, name: &str) -> Option<Vec<Duration>> {
        self.driver(name).map(DriverReport::durations)
    }

    pub fn failed_drivers(&self) -> impl Iterator<Item = &DriverReport> {
        self.drivers
            .iter()
            .filter(|d| d.status == DriverStatus::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_metrics_from_samples() {
        let samples = vec![100, 200, 300, 400, 500, 600, 700, 800, 900, 1000];
        let metrics = LatencyMetrics::from_samples(samples).unwrap();

        assert_eq!(metrics.count, 10);
        assert_eq!(metrics.min_ns, 100);
        assert_eq!(metrics.max_ns, 1000);
        assert_eq!(metrics.median_ns, 500);
        assert_eq!(metrics.p95_ns, 1000);
        assert_eq!(metrics.p99_ns, 1000);
        assert!((metrics.mean_ns - 550.0).abs() < 0.01);
    }

    #[test]
    fn test_percentiles_use_nearest_rank() {
        let samples: Vec<u64> = (1..=20).rev().collect();
        let metrics = LatencyMetrics::from_samples(samples).unwrap();
        assert_eq!(metrics.median_ns, 10);
        assert_eq!(metrics.p95_ns, 19);
        assert_eq!(metrics.p99_ns, 20);

        let single = LatencyMetrics::from_samples(vec![42]).unwrap();
        assert_eq!((single.median_ns, single.p95_ns, single.p99_ns), (42, 42, 42));
        assert_eq!(single.std_dev_ns, 0.0);
    }

    #[test]
    fn test_latency_metrics_empty() {
        assert!(LatencyMetrics::from_samples(Vec::new()).is_none());
    }

    #[test]
    fn test_format_ns() {
        assert_eq!(format_ns(500), "500ns");
        assert_eq!(format_ns(1_000), "1.00μs");
        assert_eq!(format_ns(1500), "1.50μs");
        assert_eq!(format_ns(1_500_000), "1.50ms");
        assert_eq!(format_ns(1_500_000_000), "1.50s");
    }

    #[test]
    fn test_driver_status() {
        let ok = IterationResult::passed("d", 1, Duration::from_millis(5));
        let bad = IterationResult::failed("d", 2, Duration::from_millis(1), "pull failed");

        let passed = DriverReport::from_results("d", 1, vec![ok.clone()], None);
        assert_eq!(passed.status, DriverStatus::Passed);

        let degraded = DriverReport::from_results("d", 2, vec![ok.clone(), bad], None);
        assert_eq!(degraded.status, DriverStatus::Degraded);
        // Summary only covers passing iterations
        assert_eq!(degraded.latency.as_ref().unwrap().count, 1);

        let failed = DriverReport::from_results(
            "d",
            1,
            Vec::new(),
            Some(PhaseFailure::new(Phase::Before, "daemon never became ready")),
        );
        assert_eq!(failed.status, DriverStatus::Failed);
        assert!(failed.latency.is_none());
        assert!(failed.summary_line().contains("before failed"));
    }

    #[test]
    fn test_system_info_collect() {
        let info = SystemInfo::collect();
        assert!(!info.os.is_empty());
        assert!(info.memory_bytes > 0);
    }

    #[test]
    fn test_report_serialization() {
        let mut report = BenchmarkReport::new("abc123");
        report.add_driver(DriverReport::from_results(
            "OverlayFSPullAlpine",
            1,
            vec![IterationResult::passed(
                "OverlayFSPullAlpine",
                1,
                Duration::from_millis(900),
            )],
            None,
        ));

        let json = serde_json::to_string_pretty(&report).unwrap();
        assert!(json.contains("abc123"));
        assert!(json.contains("OverlayFSPullAlpine"));
        assert!(json.contains("\"passed\""));
    }
}
