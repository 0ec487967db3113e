// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! YAML configuration parser with strict validation.
//!
//! A `BenchConfig` is built once at startup and handed by reference to the
//! framework and every scenario. Omitted fields fall back to the paths the
//! benchmark host is provisioned with.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::types::Platform;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default = "default_output_file")]
    output_file: String,
    #[serde(default = "default_log_dir")]
    log_dir: String,
    #[serde(default = "default_platform")]
    platform: String,
    #[serde(default = "default_namespace")]
    namespace: String,
    #[serde(default = "default_iterations")]
    iterations: u32,
    #[serde(default = "default_stop_grace_ms")]
    stop_grace_ms: u64,
    #[serde(default = "default_ready_line_timeout_ms")]
    ready_line_timeout_ms: u64,
    #[serde(default)]
    readiness: RawReadinessConfig,
    #[serde(default)]
    runtime: RawRuntimeConfig,
    #[serde(default)]
    lazy_pull: RawLazyPullConfig,
    #[serde(default)]
    tools: RawToolsConfig,
    #[serde(default)]
    registry: RawRegistryConfig,
}

fn default_output_file() -> String {
    "./output.json".to_string()
}

fn default_log_dir() -> String {
    "./output".to_string()
}

fn default_platform() -> String {
    "linux/amd64".to_string()
}

fn default_namespace() -> String {
    "BENCHMARK_TESTING".to_string()
}

fn default_iterations() -> u32 {
    10
}

fn default_stop_grace_ms() -> u64 {
    5000
}

fn default_ready_line_timeout_ms() -> u64 {
    300_000
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            output_file: default_output_file(),
            log_dir: default_log_dir(),
            platform: default_platform(),
            namespace: default_namespace(),
            iterations: default_iterations(),
            stop_grace_ms: default_stop_grace_ms(),
            ready_line_timeout_ms: default_ready_line_timeout_ms(),
            readiness: RawReadinessConfig::default(),
            runtime: RawRuntimeConfig::default(),
            lazy_pull: RawLazyPullConfig::default(),
            tools: RawToolsConfig::default(),
            registry: RawRegistryConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawReadinessConfig {
    interval_ms: u64,
    max_attempts: u32,
}

impl Default for RawReadinessConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            max_attempts: 10,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawRuntimeConfig {
    binary: String,
    address: String,
    root: String,
    state: String,
    config: String,
}

impl Default for RawRuntimeConfig {
    fn default() -> Self {
        Self {
            binary: "containerd".to_string(),
            address: "/tmp/containerd-grpc/containerd.sock".to_string(),
            root: "/tmp/lib/containerd".to_string(),
            state: "/tmp/containerd".to_string(),
            config: "./containerd-config.toml".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawLazyPullConfig {
    binary: String,
    address: String,
    root: String,
    config: String,
    snapshotter: String,
}

impl Default for RawLazyPullConfig {
    fn default() -> Self {
        Self {
            binary: "soci-snapshotter-grpc".to_string(),
            address: "/run/soci-snapshotter-grpc/soci-snapshotter-grpc.sock".to_string(),
            root: "/var/lib/soci-snapshotter-grpc".to_string(),
            config: "./soci-snapshotter-config.toml".to_string(),
            snapshotter: "soci".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawToolsConfig {
    ctr: String,
    soci: String,
}

impl Default for RawToolsConfig {
    fn default() -> Self {
        Self {
            ctr: "ctr".to_string(),
            soci: "soci".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawRegistryConfig {
    secret_file: Option<String>,
    username: String,
}

impl Default for RawRegistryConfig {
    fn default() -> Self {
        Self {
            secret_file: None,
            username: "AWS".to_string(),
        }
    }
}

/// Bounded readiness polling parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessConfig {
    pub interval: Duration,
    pub max_attempts: u32,
}

/// Runtime daemon invocation and the paths it owns.
#[derive(Debug, Clone)]
pub struct RuntimeDaemonConfig {
    pub binary: PathBuf,
    pub address: PathBuf,
    pub root: PathBuf,
    pub state: PathBuf,
    pub config: PathBuf,
}

/// Lazy-pull snapshotter daemon invocation and the paths it owns.
#[derive(Debug, Clone)]
pub struct LazyPullConfig {
    pub binary: PathBuf,
    pub address: PathBuf,
    pub root: PathBuf,
    pub config: PathBuf,
    /// Name the runtime knows the pluggable snapshotter by.
    pub snapshotter: String,
}

/// Client binaries used to drive the runtime daemon.
#[derive(Debug, Clone)]
pub struct ToolsConfig {
    pub ctr: PathBuf,
    pub soci: PathBuf,
}

/// Private registry access.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub secret_file: Option<PathBuf>,
    pub username: String,
}

/// Complete validated configuration.
#[derive(Debug, Clone)]
pub struct BenchConfig {
    /// Where the JSON report is written after all drivers complete.
    pub output_file: PathBuf,
    /// Directory receiving daemon stdout/stderr captures.
    pub log_dir: PathBuf,
    pub platform: Platform,
    pub namespace: String,
    /// Iterations per driver.
    pub iterations: u32,
    /// How long `stop` waits after SIGTERM before escalating to SIGKILL.
    pub stop_grace: Duration,
    /// Upper bound on waiting for a container's ready line.
    pub ready_line_timeout: Duration,
    pub readiness: ReadinessConfig,
    pub runtime: RuntimeDaemonConfig,
    pub lazy_pull: LazyPullConfig,
    pub tools: ToolsConfig,
    pub registry: RegistryConfig,
}

impl Default for BenchConfig {
    fn default() -> Self {
        BenchConfig::from_raw(RawConfig::default(), Platform::default())
    }
}

impl BenchConfig {
    fn from_raw(raw: RawConfig, platform: Platform) -> Self {
        BenchConfig {
            output_file: PathBuf::from(raw.output_file),
            log_dir: PathBuf::from(raw.log_dir),
            platform,
            namespace: raw.namespace,
            iterations: raw.iterations,
            stop_grace: Duration::from_millis(raw.stop_grace_ms),
            ready_line_timeout: Duration::from_millis(raw.ready_line_timeout_ms),
            readiness: ReadinessConfig {
                interval: Duration::from_millis(raw.readiness.interval_ms),
                max_attempts: raw.readiness.max_attempts,
            },
            runtime: RuntimeDaemonConfig {
                binary: PathBuf::from(raw.runtime.binary),
                address: PathBuf::from(raw.runtime.address),
                root: PathBuf::from(raw.runtime.root),
                state: PathBuf::from(raw.runtime.state),
                config: PathBuf::from(raw.runtime.config),
            },
            lazy_pull: LazyPullConfig {
                binary: PathBuf::from(raw.lazy_pull.binary),
                address: PathBuf::from(raw.lazy_pull.address),
                root: PathBuf::from(raw.lazy_pull.root),
                config: PathBuf::from(raw.lazy_pull.config),
                snapshotter: raw.lazy_pull.snapshotter,
            },
            tools: ToolsConfig {
                ctr: PathBuf::from(raw.tools.ctr),
                soci: PathBuf::from(raw.tools.soci),
            },
            registry: RegistryConfig {
                secret_file: raw.registry.secret_file.map(PathBuf::from),
                username: raw.registry.username,
            },
        }
    }
}

/// Configuration loader with strict validation.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load and validate configuration from a YAML file.
    pub fn load_file(path: impl AsRef<Path>) -> Result<BenchConfig, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;

        Self::load_string(&content)
    }

    /// Load and validate configuration from a YAML string.
    pub fn load_string(content: &str) -> Result<BenchConfig, ConfigError> {
        let raw: RawConfig = serde_yaml::from_str(content).map_err(|e| ConfigError::Parse {
            message: format!("YAML parse error: {}", e),
        })?;

        Self::validate(raw)
    }

    fn validate(raw: RawConfig) -> Result<BenchConfig, ConfigError> {
        if raw.iterations == 0 {
            return Err(ConfigError::InvalidFieldValue {
                field: "iterations",
                value: raw.iterations.to_string(),
                reason: "Each driver must run at least one iteration".to_string(),
            });
        }

        if raw.readiness.max_attempts == 0 {
            return Err(ConfigError::InvalidFieldValue {
                field: "readiness.max_attempts",
                value: raw.readiness.max_attempts.to_string(),
                reason: "At least one readiness attempt is required".to_string(),
            });
        }

        if raw.readiness.interval_ms == 0 {
            return Err(ConfigError::InvalidFieldValue {
                field: "readiness.interval_ms",
                value: raw.readiness.interval_ms.to_string(),
                reason: "Readiness interval must be non-zero".to_string(),
            });
        }

        if raw.ready_line_timeout_ms == 0 {
            return Err(ConfigError::InvalidFieldValue {
                field: "ready_line_timeout_ms",
                value: raw.ready_line_timeout_ms.to_string(),
                reason: "Ready line timeout must be non-zero".to_string(),
            });
        }

        if raw.namespace.trim().is_empty() {
            return Err(ConfigError::InvalidFieldValue {
                field: "namespace",
                value: raw.namespace,
                reason: "Namespace cannot be empty".to_string(),
            });
        }

        if raw.lazy_pull.snapshotter.trim().is_empty() {
            return Err(ConfigError::InvalidFieldValue {
                field: "lazy_pull.snapshotter",
                value: raw.lazy_pull.snapshotter,
                reason: "Snapshotter name cannot be empty".to_string(),
            });
        }

        let platform = Platform::new(raw.platform.clone())?;

        Ok(BenchConfig::from_raw(raw, platform))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BenchConfig::default();
        assert_eq!(config.iterations, 10);
        assert_eq!(config.namespace, "BENCHMARK_TESTING");
        assert_eq!(config.platform.as_str(), "linux/amd64");
        assert_eq!(config.readiness.interval, Duration::from_secs(1));
        assert_eq!(config.readiness.max_attempts, 10);
        assert_eq!(
            config.runtime.address,
            PathBuf::from("/tmp/containerd-grpc/containerd.sock")
        );
        assert_eq!(config.lazy_pull.snapshotter, "soci");
        assert_eq!(config.registry.username, "AWS");
        assert!(config.registry.secret_file.is_none());
    }

    #[test]
    fn test_partial_override() {
        let yaml = r#"
iterations: 3
runtime:
  address: /tmp/bench/containerd.sock
registry:
  secret_file: /etc/snapbench/ecr-secret
"#;
        let config = ConfigLoader::load_string(yaml).unwrap();
        assert_eq!(config.iterations, 3);
        assert_eq!(
            config.runtime.address,
            PathBuf::from("/tmp/bench/containerd.sock")
        );
        // Untouched fields in the same section keep their defaults
        assert_eq!(config.runtime.root, PathBuf::from("/tmp/lib/containerd"));
        assert_eq!(
            config.registry.secret_file,
            Some(PathBuf::from("/etc/snapbench/ecr-secret"))
        );
    }

    #[test]
    fn test_zero_iterations_rejected() {
        let result = ConfigLoader::load_string("iterations: 0");
        assert!(matches!(
            result,
            Err(ConfigError::InvalidFieldValue {
                field: "iterations",
                ..
            })
        ));
    }

    #[test]
    fn test_zero_readiness_attempts_rejected() {
        let yaml = "readiness:\n  max_attempts: 0\n";
        assert!(ConfigLoader::load_string(yaml).is_err());
    }

    #[test]
    fn test_invalid_platform_rejected() {
        let result = ConfigLoader::load_string("platform: amd64");
        assert!(matches!(
            result,
            Err(ConfigError::InvalidFieldValue {
                field: "platform",
                ..
            })
        ));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result = ConfigLoader::load_string("iteratoins: 5");
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_missing_file() {
        let result = ConfigLoader::load_file("/nonexistent/snapbench.yaml");
        assert!(matches!(result, Err(ConfigError::NotFound { .. })));
    }

    #[test]
    fn test_example_file_matches_defaults() {
        let config = ConfigLoader::load_string(include_str!("../../snapbench.example.yaml")).unwrap();
        let defaults = BenchConfig::default();

        assert_eq!(config.iterations, defaults.iterations);
        assert_eq!(config.readiness, defaults.readiness);
        assert_eq!(config.runtime.address, defaults.runtime.address);
        assert_eq!(config.lazy_pull.snapshotter, defaults.lazy_pull.snapshotter);
        assert_eq!(config.stop_grace, defaults.stop_grace);
        assert_eq!(config.ready_line_timeout, Duration::from_secs(300));
        assert!(config.registry.secret_file.is_none());
    }
}
