// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Snapbench Core Library
//!
//! Daemon lifecycle, bounded readiness polling and the container runtime
//! adapter used to benchmark image pull and container run latency across
//! snapshotter backends.

pub mod config;
pub mod error;
pub mod matrix;
pub mod process;
pub mod runtime;
pub mod types;

// Re-export commonly used types
pub use config::{BenchConfig, ConfigLoader};
pub use error::{
    BenchError, BenchResult, ConfigError, PullError, ReadinessTimeoutError, RunError, StartError,
};
pub use process::{DaemonSpec, ExternalProcess, ProcessSpec, ReadinessWaiter};
pub use runtime::{Image, PullAuth, RuntimeApi, RuntimeClient};
pub use types::{Backend, ImageDescriptor, Platform};
