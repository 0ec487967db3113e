//! Boundary to the container runtime's client library.

use std::time::Duration;

use crate::error::{PullError, RunError};
use crate::types::Platform;

use super::credentials::RegistryCredentials;

/// Everything the client library needs to pull and unpack one image.
#[derive(Debug, Clone)]
pub struct PullRequest {
    pub image_ref: String,
    pub platform: Platform,
    /// Snapshotter the image is unpacked into.
    pub snapshotter: String,
    /// Set for lazy pulls; the backend resolves its side-loaded index by it.
    pub index_digest: Option<String>,
    /// True when the lazy-pull client must be used instead of a plain pull.
    pub lazy: bool,
    pub credentials: Option<RegistryCredentials>,
}

/// A pulled and unpacked image, ready to back containers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub reference: String,
    pub snapshotter: String,
}

/// Primitive pull/container/task calls of the runtime client library.
///
/// Every call blocks until the runtime answers. `start_task` returns the
/// task's exit code once its process has exited.
pub trait RuntimeApi {
    fn pull_image(&self, request: &PullRequest) -> Result<Image, PullError>;

    /// Create a container bound to a fresh writable snapshot of `image`.
    fn create_container(&self, image: &Image, container_id: &str) -> Result<(), RunError>;

    /// Create and start the container's task, then wait for it to exit.
    fn start_task(&self, container_id: &str) -> Result<i32, RunError>;

    /// Create and start the container's task, returning once a line of its
    /// output contains `ready_line`. The task keeps running until
    /// `delete_task` removes it.
    fn start_task_until_ready(
        &self,
        container_id: &str,
        ready_line: &str,
        timeout: Duration,
    ) -> Result<(), RunError>;

    /// Kill and delete the task. A task that is already gone is not an error.
    fn delete_task(&self, container_id: &str) -> Result<(), RunError>;

    /// Delete the container together with its snapshot. A container that is
    /// already gone is not an error.
    fn delete_container(&self, container_id: &str) -> Result<(), RunError>;
}
