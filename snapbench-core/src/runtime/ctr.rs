//! `RuntimeApi` backed by the runtime's command-line clients.
//!
//! Plain pulls and all container/task calls go through `ctr`; lazy pulls go
//! through `soci image rpull`. Both talk to the runtime daemon over its
//! control socket in the benchmark namespace.
//!
//! An attached `ctr tasks start` removes the task itself once it exits, so
//! the cleanup calls accept a task or container that is already gone.

use std::ffi::OsStr;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{ChildStderr, ChildStdout, Command, ExitStatus, Output, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::config::BenchConfig;
use crate::error::{PullError, RunError};

use super::api::{Image, PullRequest, RuntimeApi};

/// Prefix `ctr` puts on its own error messages, as opposed to task output.
const CTR_ERROR_PREFIX: &str = "ctr: ";

/// What containerd reports for a task or container that does not exist.
const NOT_FOUND_MARKER: &str = "not found";

/// Command-line client configuration.
#[derive(Debug, Clone)]
pub struct CtrCli {
    ctr: PathBuf,
    soci: PathBuf,
    address: PathBuf,
    namespace: String,
}

impl CtrCli {
    pub fn new(config: &BenchConfig) -> Self {
        Self {
            ctr: config.tools.ctr.clone(),
            soci: config.tools.soci.clone(),
            address: config.runtime.address.clone(),
            namespace: config.namespace.clone(),
        }
    }

    fn command(&self, program: &Path) -> Command {
        let mut cmd = Command::new(program);
        cmd.arg("--address")
            .arg(&self.address)
            .arg("--namespace")
            .arg(&self.namespace)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }

    fn ctr<I, S>(&self, args: I) -> std::io::Result<Output>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.command(&self.ctr).args(args).output()
    }

    fn pull_command(&self, request: &PullRequest) -> (String, Command) {
        let (label, mut cmd) = if request.lazy {
            let mut cmd = self.command(&self.soci);
            cmd.args(["image", "rpull", "--platform", request.platform.as_str()]);
            if let Some(digest) = &request.index_digest {
                cmd.args(["--soci-index-digest", digest.as_str()]);
            }
            ("soci image rpull", cmd)
        } else {
            let mut cmd = self.command(&self.ctr);
            cmd.args(["images", "pull", "--platform", request.platform.as_str()])
                .args(["--snapshotter", request.snapshotter.as_str()]);
            ("ctr images pull", cmd)
        };
        if let Some(creds) = &request.credentials {
            cmd.arg("--user").arg(creds.user_flag());
        }
        cmd.arg(&request.image_ref);
        (label.to_string(), cmd)
    }

    fn lifecycle(
        &self,
        step: &'static str,
        container_id: &str,
        args: &[&str],
    ) -> Result<Output, RunError> {
        tracing::debug!(step = step, container_id = %container_id, "Runtime call");
        self.ctr(args).map_err(|e| RunError::Invoke {
            step,
            container_id: container_id.to_string(),
            source: e,
        })
    }
}

fn stderr_text(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_string()
}

fn lifecycle_failure(step: &'static str, container_id: &str, output: &Output) -> RunError {
    RunError::Lifecycle {
        step,
        container_id: container_id.to_string(),
        status: output.status.to_string(),
        stderr: stderr_text(output),
    }
}

fn check(step: &'static str, container_id: &str, output: Output) -> Result<(), RunError> {
    if output.status.success() {
        Ok(())
    } else {
        Err(lifecycle_failure(step, container_id, &output))
    }
}

/// Like `check`, but a missing task or container counts as removed.
fn check_removed(step: &'static str, container_id: &str, output: Output) -> Result<(), RunError> {
    if !output.status.success() && stderr_text(&output).contains(NOT_FOUND_MARKER) {
        tracing::debug!(step = step, container_id = %container_id, "Already removed");
        return Ok(());
    }
    check(step, container_id, output)
}

enum LineWait {
    Found,
    TimedOut,
    Closed,
}

/// Forward stdout lines over a channel; the channel closes at EOF.
fn spawn_line_reader(pipe: ChildStdout) -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for chunk in BufReader::new(pipe).split(b'\n') {
            let Ok(bytes) = chunk else { break };
            if tx.send(String::from_utf8_lossy(&bytes).into_owned()).is_err() {
                break;
            }
        }
    });
    rx
}

fn spawn_collector(mut pipe: ChildStderr) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut text = String::new();
        let _ = pipe.read_to_string(&mut text);
        text
    })
}

fn wait_for_line(lines: &Receiver<String>, ready_line: &str, timeout: Duration) -> LineWait {
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match lines.recv_timeout(remaining) {
            Ok(line) if line.contains(ready_line) => return LineWait::Found,
            Ok(_) => {}
            Err(RecvTimeoutError::Timeout) => return LineWait::TimedOut,
            Err(RecvTimeoutError::Disconnected) => return LineWait::Closed,
        }
    }
}

/// Map `ctr tasks start` output to the task's exit code.
///
/// `ctr` exits with the task's own status; a failure of `ctr` itself is
/// recognised by its error prefix on stderr.
fn task_exit_code(container_id: &str, output: &Output) -> Result<i32, RunError> {
    let status: ExitStatus = output.status;
    if status.success() {
        return Ok(0);
    }
    if stderr_text(output).starts_with(CTR_ERROR_PREFIX) {
        return Err(lifecycle_failure("start task", container_id, output));
    }
    status.code().ok_or_else(|| RunError::Signaled {
        container_id: container_id.to_string(),
    })
}

impl RuntimeApi for CtrCli {
    fn pull_image(&self, request: &PullRequest) -> Result<Image, PullError> {
        let (label, mut cmd) = self.pull_command(request);
        tracing::debug!(
            command = %label,
            image_ref = %request.image_ref,
            snapshotter = %request.snapshotter,
            "Pulling image"
        );

        let output = cmd.output().map_err(|e| PullError::Invoke {
            command: label.clone(),
            image_ref: request.image_ref.clone(),
            source: e,
        })?;

        if !output.status.success() {
            return Err(PullError::Command {
                command: label,
                image_ref: request.image_ref.clone(),
                status: output.status.to_string(),
                stderr: stderr_text(&output),
            });
        }

        Ok(Image {
            reference: request.image_ref.clone(),
            snapshotter: request.snapshotter.clone(),
        })
    }

    fn create_container(&self, image: &Image, container_id: &str) -> Result<(), RunError> {
        let output = self.lifecycle(
            "create container",
            container_id,
            &[
                "containers",
                "create",
                "--snapshotter",
                image.snapshotter.as_str(),
                image.reference.as_str(),
                container_id,
            ],
        )?;
        check("create container", container_id, output)
    }

    fn start_task(&self, container_id: &str) -> Result<i32, RunError> {
        let output = self.lifecycle("start task", container_id, &["tasks", "start", container_id])?;
        task_exit_code(container_id, &output)
    }

    fn start_task_until_ready(
        &self,
        container_id: &str,
        ready_line: &str,
        timeout: Duration,
    ) -> Result<(), RunError> {
        const STEP: &str = "start task";
        let invoke_err = |source| RunError::Invoke {
            step: STEP,
            container_id: container_id.to_string(),
            source,
        };

        tracing::debug!(step = STEP, container_id = %container_id, ready_line = %ready_line, "Runtime call");
        let mut child = self
            .command(&self.ctr)
            .args(["tasks", "start", container_id])
            .spawn()
            .map_err(invoke_err)?;

        let stderr = child.stderr.take().map(spawn_collector);
        let outcome = match child.stdout.take().map(spawn_line_reader) {
            Some(lines) => wait_for_line(&lines, ready_line, timeout),
            None => LineWait::Closed,
        };

        match outcome {
            LineWait::Found => {
                // Detach the client; the task keeps running in the runtime
                let _ = child.kill();
                let _ = child.wait();
                Ok(())
            }
            LineWait::TimedOut => {
                let _ = child.kill();
                let _ = child.wait();
                Err(RunError::ReadyLineTimeout {
                    container_id: container_id.to_string(),
                    ready_line: ready_line.to_string(),
                    timeout,
                })
            }
            LineWait::Closed => {
                let status = child.wait().map_err(invoke_err)?;
                let stderr = stderr
                    .and_then(|handle| handle.join().ok())
                    .unwrap_or_default()
                    .trim()
                    .to_string();
                if stderr.starts_with(CTR_ERROR_PREFIX) {
                    return Err(RunError::Lifecycle {
                        step: STEP,
                        container_id: container_id.to_string(),
                        status: status.to_string(),
                        stderr,
                    });
                }
                Err(RunError::ReadyLineMissing {
                    container_id: container_id.to_string(),
                    ready_line: ready_line.to_string(),
                    status: status.to_string(),
                    stderr,
                })
            }
        }
    }

    fn delete_task(&self, container_id: &str) -> Result<(), RunError> {
        let output = self.lifecycle(
            "delete task",
            container_id,
            &["tasks", "delete", "--force", container_id],
        )?;
        check_removed("delete task", container_id, output)
    }

    fn delete_container(&self, container_id: &str) -> Result<(), RunError> {
        let output = self.lifecycle(
            "delete container",
            container_id,
            &["containers", "delete", container_id],
        )?;
        check_removed("delete container", container_id, output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::credentials::RegistryCredentials;
    use crate::types::Platform;
    use std::os::unix::process::ExitStatusExt;

    fn request(lazy: bool) -> PullRequest {
        PullRequest {
            image_ref: "public.ecr.aws/docker/library/alpine:latest".to_string(),
            platform: Platform::default(),
            snapshotter: if lazy { "soci" } else { "overlayfs" }.to_string(),
            index_digest: lazy.then(|| "sha256:feed".to_string()),
            lazy,
            credentials: Some(RegistryCredentials::new("AWS", "token")),
        }
    }

    fn args_of(cmd: &Command) -> Vec<String> {
        cmd.get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    fn output(raw_status: i32, stderr: &str) -> Output {
        Output {
            status: ExitStatus::from_raw(raw_status),
            stdout: Vec::new(),
            stderr: stderr.as_bytes().to_vec(),
        }
    }

    #[test]
    fn test_plain_pull_command() {
        let cli = CtrCli::new(&BenchConfig::default());
        let (label, cmd) = cli.pull_command(&request(false));
        let args = args_of(&cmd);

        assert_eq!(label, "ctr images pull");
        assert_eq!(cmd.get_program(), "ctr");
        assert_eq!(
            &args[..4],
            &[
                "--address",
                "/tmp/containerd-grpc/containerd.sock",
                "--namespace",
                "BENCHMARK_TESTING"
            ]
        );
        assert!(args.windows(2).any(|w| w == ["--snapshotter", "overlayfs"]));
        assert!(args.windows(2).any(|w| w == ["--user", "AWS:token"]));
        assert_eq!(args.last().unwrap(), "public.ecr.aws/docker/library/alpine:latest");
    }

    #[test]
    fn test_lazy_pull_command() {
        let cli = CtrCli::new(&BenchConfig::default());
        let (label, cmd) = cli.pull_command(&request(true));
        let args = args_of(&cmd);

        assert_eq!(label, "soci image rpull");
        assert_eq!(cmd.get_program(), "soci");
        assert!(args.windows(2).any(|w| w == ["image", "rpull"]));
        assert!(args.windows(2).any(|w| w == ["--soci-index-digest", "sha256:feed"]));
    }

    #[test]
    fn test_missing_task_counts_as_removed() {
        let gone = output(1 << 8, "ctr: no running task found: task c1 not found: not found");
        assert!(check_removed("delete task", "c1", gone).is_ok());

        let refused = output(1 << 8, "ctr: failed to delete task: permission denied");
        assert!(matches!(
            check_removed("delete task", "c1", refused),
            Err(RunError::Lifecycle { step: "delete task", .. })
        ));
    }

    #[test]
    fn test_wait_for_line() {
        let (tx, rx) = mpsc::channel();
        tx.send("booting".to_string()).unwrap();
        tx.send("2024/01/01 server: Ready to accept connections".to_string())
            .unwrap();
        assert!(matches!(
            wait_for_line(&rx, "Ready to accept", Duration::from_secs(1)),
            LineWait::Found
        ));

        // Sender still alive, nothing more arrives
        assert!(matches!(
            wait_for_line(&rx, "Ready", Duration::from_millis(20)),
            LineWait::TimedOut
        ));

        drop(tx);
        assert!(matches!(
            wait_for_line(&rx, "Ready", Duration::from_secs(1)),
            LineWait::Closed
        ));
    }

    #[test]
    fn test_task_exit_code_mapping() {
        // Raw wait statuses: exit code lives in the high byte
        assert_eq!(task_exit_code("c1", &output(0, "")).unwrap(), 0);
        assert_eq!(task_exit_code("c1", &output(3 << 8, "")).unwrap(), 3);
        assert!(matches!(
            task_exit_code("c1", &output(1 << 8, "ctr: container \"c1\" not found")),
            Err(RunError::Lifecycle { .. })
        ));
        assert!(matches!(
            task_exit_code("c1", &output(9, "")),
            Err(RunError::Signaled { .. })
        ));
    }
}
