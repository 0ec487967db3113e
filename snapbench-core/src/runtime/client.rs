//! Runtime client: a runtime daemon plus an optional lazy-pull backend.
//!
//! Composes a started runtime daemon, an optional lazy-pull daemon and a
//! `RuntimeApi` into the two operations a benchmark times: pull and run.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use uuid::Uuid;

use crate::config::BenchConfig;
use crate::error::{BenchResult, PullError, RunError};
use crate::process::{DaemonSpec, ExternalProcess, Poller, ReadinessWaiter};
use crate::types::{Backend, ImageDescriptor, Platform};

use super::api::{Image, PullRequest, RuntimeApi};
use super::credentials::PullAuth;
use super::ctr::CtrCli;

/// Snapshotter the runtime unpacks into when no lazy backend is attached.
pub const DEFAULT_SNAPSHOTTER: &str = "overlayfs";

const DEFAULT_READY_LINE_TIMEOUT: Duration = Duration::from_secs(300);

/// Lazy-pulling snapshotter attached to a runtime client.
#[derive(Debug)]
pub struct LazyPullBackend {
    /// `None` when the snapshotter daemon is managed outside the harness.
    daemon: Option<ExternalProcess>,
    snapshotter: String,
}

impl LazyPullBackend {
    pub fn new(daemon: Option<ExternalProcess>, snapshotter: impl Into<String>) -> Self {
        Self {
            daemon,
            snapshotter: snapshotter.into(),
        }
    }

    pub fn snapshotter(&self) -> &str {
        &self.snapshotter
    }
}

/// Produces container ids that never repeat within a process.
///
/// `<prefix>-<sequence>-<random suffix>`: the sequence orders iterations in
/// runtime logs, the suffix keeps separate processes from colliding.
#[derive(Debug)]
pub struct ContainerIdGenerator {
    prefix: String,
    next: AtomicU64,
}

impl ContainerIdGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }

    pub fn next_id(&self) -> String {
        let seq = self.next.fetch_add(1, Ordering::Relaxed);
        let suffix = Uuid::new_v4().simple().to_string();
        format!("{}-{:04}-{}", self.prefix, seq, &suffix[..8])
    }
}

impl Default for ContainerIdGenerator {
    fn default() -> Self {
        Self::new("snapbench-run")
    }
}

/// Pull and run façade over one runtime daemon.
pub struct RuntimeClient<A: RuntimeApi = CtrCli> {
    api: A,
    /// `None` when attached to a runtime daemon started elsewhere.
    runtime: Option<ExternalProcess>,
    lazy_pull: Option<LazyPullBackend>,
    platform: Platform,
    auth: PullAuth,
    ids: ContainerIdGenerator,
    ready_line_timeout: Duration,
}

impl RuntimeClient<CtrCli> {
    /// Start the runtime daemon (and the lazy-pull daemon for
    /// `Backend::Lazy`) and wait until both control sockets exist.
    ///
    /// The lazy-pull daemon registers with the runtime, so it is started
    /// second. If it fails, the already-running runtime daemon is stopped
    /// when its handle drops on the error path.
    pub fn start<P: Poller>(
        config: &BenchConfig,
        backend: Backend,
        waiter: &ReadinessWaiter<P>,
    ) -> BenchResult<Self> {
        let runtime = DaemonSpec::runtime(config).start(waiter)?;

        let lazy_pull = match backend {
            Backend::OverlayFs => None,
            Backend::Lazy => {
                let daemon = DaemonSpec::lazy_pull(config).start(waiter)?;
                Some(LazyPullBackend::new(
                    Some(daemon),
                    config.lazy_pull.snapshotter.clone(),
                ))
            }
        };

        Ok(Self {
            api: CtrCli::new(config),
            runtime: Some(runtime),
            lazy_pull,
            platform: config.platform.clone(),
            auth: auth_from_config(config),
            ids: ContainerIdGenerator::default(),
            ready_line_timeout: config.ready_line_timeout,
        })
    }
}

/// Registry auth implied by the configuration.
pub fn auth_from_config(config: &BenchConfig) -> PullAuth {
    match &config.registry.secret_file {
        Some(path) => PullAuth::secret_file(path, config.registry.username.clone()),
        None => PullAuth::Anonymous,
    }
}

impl<A: RuntimeApi> RuntimeClient<A> {
    /// Wrap an API without owning any daemon.
    pub fn with_api(api: A, platform: Platform) -> Self {
        Self {
            api,
            runtime: None,
            lazy_pull: None,
            platform,
            auth: PullAuth::Anonymous,
            ids: ContainerIdGenerator::default(),
            ready_line_timeout: DEFAULT_READY_LINE_TIMEOUT,
        }
    }

    pub fn with_lazy_pull(mut self, backend: LazyPullBackend) -> Self {
        self.lazy_pull = Some(backend);
        self
    }

    pub fn with_auth(mut self, auth: PullAuth) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_ready_line_timeout(mut self, timeout: Duration) -> Self {
        self.ready_line_timeout = timeout;
        self
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn backend(&self) -> Backend {
        if self.lazy_pull.is_some() {
            Backend::Lazy
        } else {
            Backend::OverlayFs
        }
    }

    /// Pull and unpack an image, synchronously and to completion.
    ///
    /// With a lazy backend attached the pull goes through it and forwards
    /// the descriptor's index digest. Errors are surfaced verbatim.
    pub fn pull_image(&self, image: &ImageDescriptor) -> Result<Image, PullError> {
        let credentials = self.auth.resolve()?;
        let (snapshotter, lazy) = match &self.lazy_pull {
            Some(backend) => (backend.snapshotter.clone(), true),
            None => (DEFAULT_SNAPSHOTTER.to_string(), false),
        };

        let request = PullRequest {
            image_ref: image.image_ref.clone(),
            platform: self.platform.clone(),
            snapshotter,
            index_digest: if lazy { image.index_digest.clone() } else { None },
            lazy,
            credentials,
        };

        self.api.pull_image(&request).inspect_err(|e| {
            tracing::error!(
                operation = "pull",
                image_ref = %image.image_ref,
                backend = %self.backend(),
                error = %e,
                "Pull failed"
            );
        })
    }

    /// Run one container from `image` until its process exits.
    ///
    /// A uniquely named container and its task are always deleted before
    /// returning, whatever the outcome. The first error wins; cleanup
    /// errors are only returned when the run itself succeeded.
    pub fn run_container(&self, image: &Image) -> Result<(), RunError> {
        let container_id = self.ids.next_id();
        tracing::debug!(container_id = %container_id, image = %image.reference, "Running container");

        self.api.create_container(image, &container_id)?;

        let outcome = self.api.start_task(&container_id).and_then(|code| {
            if code == 0 {
                Ok(())
            } else {
                Err(RunError::NonZeroExit {
                    container_id: container_id.clone(),
                    code,
                })
            }
        });
        if let Err(e) = &outcome {
            log_run_failure(image, &container_id, e);
        }

        outcome.and(self.remove_container(&container_id))
    }

    /// Start a container from `image` and return once its output contains
    /// `ready_line`, leaving it running.
    ///
    /// The returned guard deletes the task and container when dropped or
    /// cleaned up; so does a failed start.
    pub fn start_until_ready(
        &self,
        image: &Image,
        ready_line: &str,
    ) -> Result<ReadyContainer<'_, A>, RunError> {
        let container_id = self.ids.next_id();
        tracing::debug!(
            container_id = %container_id,
            image = %image.reference,
            ready_line = %ready_line,
            "Starting container until ready"
        );

        self.api.create_container(image, &container_id)?;
        let container = ReadyContainer {
            client: self,
            container_id,
            removed: false,
        };

        self.api
            .start_task_until_ready(&container.container_id, ready_line, self.ready_line_timeout)
            .inspect_err(|e| log_run_failure(image, &container.container_id, e))?;
        Ok(container)
    }

    /// Delete a container's task, then the container itself.
    fn remove_container(&self, container_id: &str) -> Result<(), RunError> {
        let task_cleanup = self.api.delete_task(container_id);
        let container_cleanup = self.api.delete_container(container_id);

        if let Err(e) = &task_cleanup {
            tracing::warn!(container_id = %container_id, error = %e, "Task cleanup failed");
        }
        if let Err(e) = &container_cleanup {
            tracing::warn!(container_id = %container_id, error = %e, "Container cleanup failed");
        }
        task_cleanup.and(container_cleanup)
    }

    /// Stop the owned daemons, lazy-pull backend first. Idempotent.
    pub fn stop(&mut self) {
        if let Some(daemon) = self.lazy_pull.as_mut().and_then(|b| b.daemon.as_mut()) {
            daemon.stop();
        }
        if let Some(runtime) = self.runtime.as_mut() {
            runtime.stop();
        }
    }
}

fn log_run_failure(image: &Image, container_id: &str, error: &RunError) {
    tracing::error!(
        operation = "run",
        image_ref = %image.reference,
        container_id = %container_id,
        error = %error,
        "Run failed"
    );
}

/// A running container that has printed its ready line.
pub struct ReadyContainer<'c, A: RuntimeApi> {
    client: &'c RuntimeClient<A>,
    container_id: String,
    removed: bool,
}

impl<A: RuntimeApi> ReadyContainer<'_, A> {
    pub fn id(&self) -> &str {
        &self.container_id
    }

    /// Delete the task and container, reporting any failure.
    pub fn cleanup(mut self) -> Result<(), RunError> {
        self.removed = true;
        self.client.remove_container(&self.container_id)
    }
}

impl<A: RuntimeApi> Drop for ReadyContainer<'_, A> {
    fn drop(&mut self) {
        if !self.removed {
            self.removed = true;
            let _ = self.client.remove_container(&self.container_id);
        }
    }
}

impl<A: RuntimeApi> std::fmt::Debug for ReadyContainer<'_, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadyContainer")
            .field("container_id", &self.container_id)
            .field("removed", &self.removed)
            .finish()
    }
}

impl<A: RuntimeApi> Drop for RuntimeClient<A> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_container_ids_unique() {
        let ids = ContainerIdGenerator::new("run");
        let generated: HashSet<String> = (0..100).map(|_| ids.next_id()).collect();
        assert_eq!(generated.len(), 100);
        assert!(generated.iter().all(|id| id.starts_with("run-")));
    }

    #[test]
    fn test_auth_from_config() {
        let mut config = BenchConfig::default();
        assert_eq!(auth_from_config(&config), PullAuth::Anonymous);

        config.registry.secret_file = Some("/etc/secret".into());
        assert_eq!(
            auth_from_config(&config),
            PullAuth::secret_file("/etc/secret", "AWS")
        );
    }
}
