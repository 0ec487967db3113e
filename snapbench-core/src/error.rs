// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Error taxonomy for the benchmark harness.
//!
//! Every failure mode is an explicit enum variant. Nothing here is retried:
//! a failure is measured once, reported and the run moves on.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Top-level error type for snapbench.
#[derive(Debug, Error)]
pub enum BenchError {
    // =========================================================================
    // Configuration Errors - Fatal at Startup
    // =========================================================================
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    // =========================================================================
    // Daemon Lifecycle Errors
    // =========================================================================
    #[error("Failed to start daemon: {0}")]
    Start(#[from] StartError),

    #[error(transparent)]
    ReadinessTimeout(#[from] ReadinessTimeoutError),

    // =========================================================================
    // Benchmarked Operation Errors - Surfaced Verbatim
    // =========================================================================
    #[error("Pull failed: {0}")]
    Pull(#[from] PullError),

    #[error("Run failed: {0}")]
    Run(#[from] RunError),
}

/// Malformed command-line arguments, configuration files or matrix rows.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("Configuration parse error: {message}")]
    Parse { message: String },

    #[error("Invalid field value: {field} = {value} - {reason}")]
    InvalidFieldValue {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("Malformed matrix row {line} in {path}: expected 2 to 4 columns, found {found}")]
    MalformedRow {
        path: PathBuf,
        line: usize,
        found: usize,
    },

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Process or filesystem setup failure while starting a daemon.
#[derive(Debug, Error)]
pub enum StartError {
    #[error("Cannot create output directory {path}: {source}")]
    OutputDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot create output file {path}: {source}")]
    OutputFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// A daemon never exposed its control socket within the attempt budget.
#[derive(Debug, Error)]
#[error("{path} did not appear after {attempts} attempts at {interval:?} spacing")]
pub struct ReadinessTimeoutError {
    pub path: PathBuf,
    pub attempts: u32,
    pub interval: Duration,
}

/// Registry, credential or unpack failure from the runtime client.
#[derive(Debug, Error)]
pub enum PullError {
    #[error("Cannot read registry secret {path}: {source}")]
    Credentials {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} for {image_ref} exited with {status}: {stderr}")]
    Command {
        command: String,
        image_ref: String,
        status: String,
        stderr: String,
    },

    #[error("Cannot invoke {command} for {image_ref}: {source}")]
    Invoke {
        command: String,
        image_ref: String,
        #[source]
        source: std::io::Error,
    },
}

/// Container or task lifecycle failure, or a non-zero exit.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("{step} of container {container_id} failed with {status}: {stderr}")]
    Lifecycle {
        step: &'static str,
        container_id: String,
        status: String,
        stderr: String,
    },

    #[error("Cannot invoke {step} for container {container_id}: {source}")]
    Invoke {
        step: &'static str,
        container_id: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Container {container_id} exited with status {code}")]
    NonZeroExit { container_id: String, code: i32 },

    #[error("Container {container_id} was terminated by a signal")]
    Signaled { container_id: String },

    #[error("Container {container_id} exited with {status} before printing {ready_line:?}: {stderr}")]
    ReadyLineMissing {
        container_id: String,
        ready_line: String,
        status: String,
        stderr: String,
    },

    #[error("Container {container_id} did not print {ready_line:?} within {timeout:?}")]
    ReadyLineTimeout {
        container_id: String,
        ready_line: String,
        timeout: Duration,
    },
}

/// Result type alias using BenchError.
pub type BenchResult<T> = Result<T, BenchError>;
