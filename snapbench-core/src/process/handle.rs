//! External daemon process handle.
//!
//! Spawns a daemon with stdout/stderr captured to files and guarantees that
//! `stop` releases the process and removes every path the daemon owns.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;

use crate::error::StartError;

/// Interval between exit checks while waiting out the stop grace period.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Everything needed to launch one daemon.
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    name: String,
    program: PathBuf,
    args: Vec<OsString>,
    output_dir: PathBuf,
    cleanup_paths: Vec<PathBuf>,
    stop_grace: Duration,
}

impl ProcessSpec {
    /// `name` labels logs and the capture files; `program` is resolved via PATH.
    pub fn new(name: impl Into<String>, program: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args: Vec::new(),
            output_dir: PathBuf::from("."),
            cleanup_paths: Vec::new(),
            stop_grace: Duration::from_secs(5),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Directory receiving `<name>-stdout.log` and `<name>-stderr.log`.
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Register a path removed recursively when the process is stopped.
    pub fn cleanup_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cleanup_paths.push(path.into());
        self
    }

    pub fn stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn arguments(&self) -> &[OsString] {
        &self.args
    }

    pub fn cleanup_paths(&self) -> &[PathBuf] {
        &self.cleanup_paths
    }
}

/// Handle to one running external daemon.
///
/// Created by `start`, released by `stop`, never reused. Dropping the handle
/// stops it, so any early return in the caller still releases the daemon.
pub struct ExternalProcess {
    name: String,
    child: Option<Child>,
    pid: Option<u32>,
    stdout_log: Option<File>,
    stderr_log: Option<File>,
    stdout_path: PathBuf,
    stderr_path: PathBuf,
    cleanup_paths: Vec<PathBuf>,
    stop_grace: Duration,
    stopped: bool,
}

impl ExternalProcess {
    /// Spawn the daemon described by `spec`.
    ///
    /// # Errors
    /// Returns `StartError` if the output directory or capture files cannot
    /// be created, or the program cannot be spawned. Registered cleanup paths
    /// are removed before the error is returned.
    pub fn start(spec: ProcessSpec) -> Result<Self, StartError> {
        let mut process = Self {
            name: spec.name.clone(),
            child: None,
            pid: None,
            stdout_log: None,
            stderr_log: None,
            stdout_path: spec.output_dir.join(format!("{}-stdout.log", spec.name)),
            stderr_path: spec.output_dir.join(format!("{}-stderr.log", spec.name)),
            cleanup_paths: spec.cleanup_paths.clone(),
            stop_grace: spec.stop_grace,
            stopped: false,
        };

        match process.launch(&spec) {
            Ok(()) => Ok(process),
            Err(e) => {
                tracing::warn!(daemon = %spec.name, error = %e, "Daemon failed to start");
                process.stop();
                Err(e)
            }
        }
    }

    fn launch(&mut self, spec: &ProcessSpec) -> Result<(), StartError> {
        fs::create_dir_all(&spec.output_dir).map_err(|e| StartError::OutputDirectory {
            path: spec.output_dir.clone(),
            source: e,
        })?;

        let stdout_log = open_capture(&self.stdout_path)?;
        let stderr_log = open_capture(&self.stderr_path)?;
        let stdout = clone_capture(&stdout_log, &self.stdout_path)?;
        let stderr = clone_capture(&stderr_log, &self.stderr_path)?;
        self.stdout_log = Some(stdout_log);
        self.stderr_log = Some(stderr_log);

        let child = Command::new(&spec.program)
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .spawn()
            .map_err(|e| StartError::Spawn {
                program: spec.program.display().to_string(),
                source: e,
            })?;

        let pid = child.id();
        tracing::info!(
            daemon = %spec.name,
            pid = pid,
            program = %spec.program.display(),
            stdout = %self.stdout_path.display(),
            "Spawned daemon"
        );

        self.pid = Some(pid);
        self.child = Some(child);
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Process ID, if the spawn succeeded.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn stdout_path(&self) -> &Path {
        &self.stdout_path
    }

    pub fn stderr_path(&self) -> &Path {
        &self.stderr_path
    }

    pub fn cleanup_paths(&self) -> &[PathBuf] {
        &self.cleanup_paths
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Check if the process is still running.
    pub fn is_running(&mut self) -> bool {
        match self.child.as_mut().map(Child::try_wait) {
            Some(Ok(None)) => true,
            Some(Ok(Some(_))) | Some(Err(_)) | None => false,
        }
    }

    /// Release the daemon and everything it owns.
    ///
    /// Closes the capture files, terminates the process if it is still
    /// running and removes every registered path. Each step is best-effort.
    /// Calling `stop` again is a no-op.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;

        drop(self.stdout_log.take());
        drop(self.stderr_log.take());

        if let Some(mut child) = self.child.take() {
            terminate(&self.name, &mut child, self.stop_grace);
        }

        for path in &self.cleanup_paths {
            remove_path(&self.name, path);
        }

        tracing::debug!(daemon = %self.name, "Daemon stopped");
    }
}

impl Drop for ExternalProcess {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for ExternalProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExternalProcess")
            .field("name", &self.name)
            .field("pid", &self.pid)
            .field("stopped", &self.stopped)
            .finish()
    }
}

fn open_capture(path: &Path) -> Result<File, StartError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| StartError::OutputFile {
            path: path.to_path_buf(),
            source: e,
        })
}

fn clone_capture(file: &File, path: &Path) -> Result<File, StartError> {
    file.try_clone().map_err(|e| StartError::OutputFile {
        path: path.to_path_buf(),
        source: e,
    })
}

/// SIGTERM, wait out the grace period, then SIGKILL. Always reaps the child.
fn terminate(name: &str, child: &mut Child, grace: Duration) {
    match child.try_wait() {
        Ok(Some(status)) => {
            tracing::debug!(daemon = %name, %status, "Daemon had already exited");
            return;
        }
        Ok(None) => {}
        Err(e) => {
            tracing::warn!(daemon = %name, error = %e, "Cannot query daemon status");
        }
    }

    let pid = Pid::from_raw(child.id() as i32);
    if let Err(errno) = signal::kill(pid, Signal::SIGTERM) {
        tracing::warn!(daemon = %name, %pid, error = %errno, "SIGTERM failed");
    }

    let deadline = Instant::now() + grace;
    while Instant::now() < deadline {
        match child.try_wait() {
            Ok(Some(status)) => {
                tracing::debug!(daemon = %name, %status, "Daemon exited after SIGTERM");
                return;
            }
            Ok(None) => std::thread::sleep(EXIT_POLL_INTERVAL),
            Err(_) => break,
        }
    }

    tracing::warn!(daemon = %name, %pid, "Daemon ignored SIGTERM, sending SIGKILL");
    if let Err(e) = child.kill() {
        tracing::warn!(daemon = %name, error = %e, "SIGKILL failed");
    }
    let _ = child.wait();
}

fn remove_path(name: &str, path: &Path) {
    let result = match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => tracing::debug!(daemon = %name, path = %path.display(), "Removed path"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(daemon = %name, path = %path.display(), error = %e, "Cleanup failed")
        }
    }
}
