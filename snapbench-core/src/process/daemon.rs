//! Launch recipes for the two daemons a benchmark drives.

use crate::config::BenchConfig;
use crate::error::BenchResult;

use super::handle::{ExternalProcess, ProcessSpec};
use super::readiness::{Poller, ReadinessCondition, ReadinessWaiter};

/// A process to spawn plus the condition that marks it usable.
#[derive(Debug, Clone)]
pub struct DaemonSpec {
    pub process: ProcessSpec,
    pub readiness: ReadinessCondition,
}

impl DaemonSpec {
    /// The container runtime daemon (containerd).
    ///
    /// Owns its root, state and socket paths; all three are removed on stop.
    pub fn runtime(config: &BenchConfig) -> Self {
        let runtime = &config.runtime;
        let process = ProcessSpec::new("containerd", &runtime.binary)
            .arg("-a")
            .arg(&runtime.address)
            .arg("--root")
            .arg(&runtime.root)
            .arg("--state")
            .arg(&runtime.state)
            .arg("-c")
            .arg(&runtime.config)
            .output_dir(&config.log_dir)
            .cleanup_path(&runtime.root)
            .cleanup_path(&runtime.state)
            .cleanup_path(&runtime.address)
            .stop_grace(config.stop_grace);

        Self {
            process,
            readiness: ReadinessCondition::path_exists(&runtime.address, &config.readiness),
        }
    }

    /// The lazy-pulling snapshotter daemon.
    ///
    /// Given the runtime daemon's address so it can serve as a pluggable
    /// snapshotter backend. Owns its root and socket paths.
    pub fn lazy_pull(config: &BenchConfig) -> Self {
        let lazy = &config.lazy_pull;
        let process = ProcessSpec::new("soci-snapshotter", &lazy.binary)
            .arg("--address")
            .arg(&lazy.address)
            .arg("--root")
            .arg(&lazy.root)
            .arg("--image-service-address")
            .arg(&config.runtime.address)
            .arg("--config")
            .arg(&lazy.config)
            .output_dir(&config.log_dir)
            .cleanup_path(&lazy.root)
            .cleanup_path(&lazy.address)
            .stop_grace(config.stop_grace);

        Self {
            process,
            readiness: ReadinessCondition::path_exists(&lazy.address, &config.readiness),
        }
    }

    /// Spawn the daemon and block until its control socket appears.
    ///
    /// On a readiness timeout the process is torn down before the error is
    /// returned; the caller never receives an unusable handle.
    pub fn start<P: Poller>(self, waiter: &ReadinessWaiter<P>) -> BenchResult<ExternalProcess> {
        let mut process = ExternalProcess::start(self.process)?;

        match waiter.wait(&self.readiness) {
            Ok(attempts) => {
                tracing::info!(
                    daemon = %process.name(),
                    pid = ?process.pid(),
                    attempts = attempts,
                    "Daemon ready"
                );
                Ok(process)
            }
            Err(e) => {
                tracing::error!(
                    daemon = %process.name(),
                    stderr_log = %process.stderr_path().display(),
                    error = %e,
                    "Daemon never became ready"
                );
                process.stop();
                Err(e.into())
            }
        }
    }
}
