//! Target execution.
//!
//! Runs `<interpreter> <target>` and captures its output. Every failure
//! mode (timeout, missing file, spawn error) is reported through `stderr`
//! rather than as an error: an empty `stderr` is the only success signal
//! the iteration loop looks at.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Default bound on a single run of the target.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Captured output of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    /// Process exit code, or -1 when the process did not run to completion
    pub exit_code: i32,
}

impl ExecutionResult {
    /// Result for a run that never produced process output.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: message.into(),
            exit_code: -1,
        }
    }

    /// Whether the run counts as clean: nothing on stderr.
    ///
    /// The exit code is deliberately not consulted.
    pub fn is_clean(&self) -> bool {
        self.stderr.is_empty()
    }

    pub fn timed_out(&self) -> bool {
        self.exit_code == -1 && self.stderr.starts_with(TIMEOUT_PREFIX)
    }
}

const TIMEOUT_PREFIX: &str = "timed out after";

/// Runs the target program.
pub trait Executor {
    fn execute(&self, path: &Path) -> ExecutionResult;
}

impl<T: Executor + ?Sized> Executor for &T {
    fn execute(&self, path: &Path) -> ExecutionResult {
        (**self).execute(path)
    }
}

impl<T: Executor + ?Sized> Executor for Box<T> {
    fn execute(&self, path: &Path) -> ExecutionResult {
        (**self).execute(path)
    }
}

/// Executes targets as child processes with a timeout.
///
/// Owns a current-thread tokio runtime so the rest of the crate stays
/// synchronous.
#[derive(Debug)]
pub struct ProcessExecutor {
    interpreter: PathBuf,
    timeout: Duration,
    runtime: tokio::runtime::Runtime,
}

impl ProcessExecutor {
    pub fn new(interpreter: impl Into<PathBuf>, timeout: Duration) -> std::io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(Self {
            interpreter: interpreter.into(),
            timeout,
            runtime,
        })
    }

    pub fn interpreter(&self) -> &Path {
        &self.interpreter
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn run(&self, path: &Path) -> ExecutionResult {
        let mut cmd = Command::new(&self.interpreter);
        cmd.arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => ExecutionResult {
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                exit_code: output.status.code().unwrap_or(-1),
            },
            Ok(Err(e)) => {
                warn!(interpreter = %self.interpreter.display(), error = %e, "failed to spawn target");
                ExecutionResult::failed(format!(
                    "failed to run {} {}: {e}",
                    self.interpreter.display(),
                    path.display()
                ))
            }
            Err(_) => {
                // Dropping the output future kills the child
                warn!(timeout_secs = self.timeout.as_secs(), "target timed out");
                ExecutionResult::failed(format!(
                    "{TIMEOUT_PREFIX} {}s",
                    self.timeout.as_secs_f64()
                ))
            }
        }
    }
}

impl Executor for ProcessExecutor {
    fn execute(&self, path: &Path) -> ExecutionResult {
        if !path.is_file() {
            return ExecutionResult::failed(format!("file not found: {}", path.display()));
        }

        debug!(
            interpreter = %self.interpreter.display(),
            target = %path.display(),
            "executing target"
        );
        let result = self.runtime.block_on(self.run(path));
        debug!(exit_code = result.exit_code, stderr_len = result.stderr.len(), "target finished");
        result
    }
}

/// Pick the interpreter: a virtualenv interpreter when it exists on disk,
/// otherwise the configured command.
pub fn resolve_interpreter(venv: Option<&Path>, fallback: &str) -> PathBuf {
    match venv {
        Some(path) if path.is_file() => path.to_path_buf(),
        Some(path) => {
            warn!(venv = %path.display(), "virtualenv interpreter not found, using {fallback}");
            PathBuf::from(fallback)
        }
        None => PathBuf::from(fallback),
    }
}
