// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! JSON report output.

use crate::metrics::BenchmarkReport;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur during report generation.
#[derive(Debug, Error)]
pub enum ReporterError {
    #[error("Failed to write report {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read report {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize report: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Writes a report to one configured file.
#[derive(Debug, Clone)]
pub struct JsonReporter {
    output_file: PathBuf,
}

impl JsonReporter {
    pub fn new(output_file: impl AsRef<Path>) -> Self {
        Self {
            output_file: output_file.as_ref().to_path_buf(),
        }
    }

    pub fn output_file(&self) -> &Path {
        &self.output_file
    }

    /// Save a report, replacing any previous file.
    ///
    /// Returns the path written.
    pub fn save(&self, report: &BenchmarkReport) -> Result<PathBuf, ReporterError> {
        let write_err = |source| ReporterError::Write {
            path: self.output_file.clone(),
            source,
        };

        if let Some(parent) = self.output_file.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(write_err)?;
            }
        }

        let file = File::create(&self.output_file).map_err(write_err)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, report)?;
        writer.flush().map_err(write_err)?;

        tracing::info!(path = %self.output_file.display(), drivers = report.drivers.len(), "Report written");
        Ok(self.output_file.clone())
    }

    /// Load an existing report from a file.
    pub fn load(path: impl AsRef<Path>) -> Result<BenchmarkReport, ReporterError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| ReporterError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let report = serde_json::from_reader(std::io::BufReader::new(file))?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{DriverReport, IterationResult};
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_reporter_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let reporter = JsonReporter::new(temp_dir.path().join("results").join("output.json"));

        let name = "OverlayFSRunAlpine";
        let durations = [
            Duration::from_millis(120),
            Duration::from_millis(118),
            Duration::from_millis(125),
        ];
        let results = durations
            .iter()
            .zip(1..)
            .map(|(d, i)| IterationResult::passed(name, i, *d))
            .collect();

        let mut report = BenchmarkReport::new("c1");
        report.add_driver(DriverReport::from_results(name, 3, results, None));

        let path = reporter.save(&report).unwrap();
        assert!(path.exists());

        let loaded = JsonReporter::load(&path).unwrap();
        assert_eq!(loaded.commit_id, "c1");
        assert_eq!(loaded.durations(name).unwrap(), durations.to_vec());
    }

    #[test]
    fn test_save_replaces_previous_report() {
        let temp_dir = TempDir::new().unwrap();
        let reporter = JsonReporter::new(temp_dir.path().join("output.json"));

        reporter.save(&BenchmarkReport::new("first")).unwrap();
        reporter.save(&BenchmarkReport::new("second")).unwrap();

        let loaded = JsonReporter::load(reporter.output_file()).unwrap();
        assert_eq!(loaded.commit_id, "second");
    }

    #[test]
    fn test_unwritable_destination() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("file");
        fs::write(&blocker, b"x").unwrap();

        let reporter = JsonReporter::new(blocker.join("output.json"));
        let err = reporter.save(&BenchmarkReport::new("c1")).unwrap_err();
        assert!(matches!(err, ReporterError::Write { .. }));
    }

    #[test]
    fn test_load_missing_file() {
        let err = JsonReporter::load("/nonexistent/output.json").unwrap_err();
        assert!(matches!(err, ReporterError::Read { .. }));
    }
}
