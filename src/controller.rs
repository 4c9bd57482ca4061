//! Iteration Controller.
//!
//! Drives one debugging session against one target file:
//!
//! ```text
//! Idle --start--> Running --step--> Succeeded
//!                    |  ^     \---> Failed
//!                  step |
//!                    v  | confirm
//!          AwaitingConfirmation --cancel--> Cancelled
//! ```
//!
//! The controller never loops on its own. A caller advances it with
//! `step()` while the phase is `Running` and decides `confirm()` or
//! `cancel()` while it is `AwaitingConfirmation`:
//!
//! ```no_run
//! # use autofix::controller::{Controller, Phase};
//! # fn drive<E: autofix::executor::Executor, R: autofix::diagnosis::ReasoningService>(
//! #     mut controller: Controller<E, R>,
//! # ) -> Result<(), autofix::controller::TransitionError> {
//! controller.start()?;
//! while !controller.phase().is_terminal() {
//!     match controller.phase() {
//!         Phase::Running => { controller.step()?; }
//!         Phase::AwaitingConfirmation => { controller.confirm()?; }
//!         _ => unreachable!(),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use crate::backup::BackupRecord;
use crate::diagnosis::{Correction, Diagnosis, ReasoningService};
use crate::edit::PatchBatch;
use crate::engine::{PatchEngine, PatchError};
use crate::executor::{ExecutionResult, Executor};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

/// Where a session stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Idle,
    Running,
    AwaitingConfirmation,
    Succeeded,
    Failed,
    Cancelled,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Succeeded | Phase::Failed | Phase::Cancelled)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Idle => "idle",
            Phase::Running => "running",
            Phase::AwaitingConfirmation => "awaiting confirmation",
            Phase::Succeeded => "succeeded",
            Phase::Failed => "failed",
            Phase::Cancelled => "cancelled",
        })
    }
}

/// A transition requested in a phase that does not allow it.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("cannot {operation} while {phase}")]
pub struct TransitionError {
    pub operation: &'static str,
    pub phase: Phase,
}

/// Why a session ended in [`Phase::Failed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The target file vanished or could not be read
    TargetUnavailable(String),
    /// The reasoning service call failed
    Service(String),
    /// The service replied without a usable correction
    NoUsableProposal,
    /// The patch was rejected and rolled back
    PatchRejected(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::TargetUnavailable(msg) => write!(f, "target unavailable: {msg}"),
            FailureReason::Service(msg) => write!(f, "diagnosis failed: {msg}"),
            FailureReason::NoUsableProposal => f.write_str("no usable correction was proposed"),
            FailureReason::PatchRejected(msg) => write!(f, "patch rejected: {msg}"),
        }
    }
}

/// Session data, owned by one [`Controller`].
#[derive(Debug, Clone)]
pub struct IterationState {
    pub iteration_count: u32,
    pub applied_correction_count: u32,
    pub phase: Phase,
    pub pending_batch: Option<PatchBatch>,
    /// The single up-front backup of the target
    pub initial_backup: Option<BackupRecord>,
    pub last_execution: Option<ExecutionResult>,
    /// Diagnosis behind `pending_batch`
    pub last_diagnosis: Option<Diagnosis>,
    pub failure: Option<FailureReason>,
    /// Final message once the session is terminal
    pub message: Option<String>,
    /// Log lines not yet taken by the presentation layer, oldest first
    pub log: Vec<String>,
}

impl IterationState {
    fn new() -> Self {
        Self {
            iteration_count: 0,
            applied_correction_count: 0,
            phase: Phase::Idle,
            pending_batch: None,
            initial_backup: None,
            last_execution: None,
            last_diagnosis: None,
            failure: None,
            message: None,
            log: Vec::new(),
        }
    }

    pub fn initial_backup_taken(&self) -> bool {
        self.initial_backup.is_some()
    }

    /// Validated corrections behind the pending batch.
    pub fn pending_corrections(&self) -> Vec<Correction> {
        self.last_diagnosis
            .as_ref()
            .map(Diagnosis::usable_corrections)
            .unwrap_or_default()
    }
}

/// Run → diagnose → confirm → patch state machine for one target file.
pub struct Controller<E, R> {
    target: PathBuf,
    engine: PatchEngine,
    executor: E,
    service: R,
    state: IterationState,
}

impl<E: Executor, R: ReasoningService> Controller<E, R> {
    pub fn new(target: impl Into<PathBuf>, engine: PatchEngine, executor: E, service: R) -> Self {
        Self {
            target: target.into(),
            engine,
            executor,
            service,
            state: IterationState::new(),
        }
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn engine(&self) -> &PatchEngine {
        &self.engine
    }

    pub fn state(&self) -> &IterationState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    /// `Idle -> Running`, taking the session's single backup.
    pub fn start(&mut self) -> Result<&IterationState, TransitionError> {
        self.require(Phase::Idle, "start")?;
        info!(target = %self.target.display(), "session started");
        self.log(format!("Target: {}", self.target.display()));

        match self.engine.create_backup(&self.target) {
            Ok(record) => {
                self.log(format!("Backup created: {}", record.path.display()));
                self.state.initial_backup = Some(record);
                self.transition(Phase::Running);
            }
            Err(e) => {
                let reason = match e {
                    PatchError::NotFound(path) => format!("file not found: {}", path.display()),
                    other => other.to_string(),
                };
                self.fail(FailureReason::TargetUnavailable(reason));
            }
        }

        Ok(&self.state)
    }

    /// One run-diagnose cycle. Valid only while `Running`.
    pub fn step(&mut self) -> Result<&IterationState, TransitionError> {
        self.require(Phase::Running, "step")?;

        self.state.iteration_count += 1;
        let iteration = self.state.iteration_count;
        info!(iteration, "iteration started");
        self.log(format!("Iteration {iteration}: running {}", self.target.display()));

        let result = self.executor.execute(&self.target);
        let clean = result.is_clean();
        let stderr = result.stderr.clone();
        self.state.last_execution = Some(result);

        if clean {
            self.finish(
                Phase::Succeeded,
                format!(
                    "Target ran without errors after {} iteration(s), {} correction(s) applied",
                    iteration, self.state.applied_correction_count
                ),
            );
            return Ok(&self.state);
        }

        self.log(format!("Error output:\n{}", preview(&stderr, 300)));

        let code = match fs::read_to_string(&self.target) {
            Ok(code) => code,
            Err(e) => {
                self.fail(FailureReason::TargetUnavailable(e.to_string()));
                return Ok(&self.state);
            }
        };
        let filename = self
            .target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let diagnosis = match self.service.analyze(&code, &stderr, &filename) {
            Ok(diagnosis) => diagnosis,
            Err(e) => {
                self.fail(FailureReason::Service(e.to_string()));
                return Ok(&self.state);
            }
        };

        match diagnosis.to_batch() {
            Some(batch) => {
                self.log(format!("{} correction(s) proposed", batch.len()));
                for op in &batch {
                    self.log(format!("  {op}: {}", op.content));
                }
                self.state.pending_batch = Some(batch);
                self.state.last_diagnosis = Some(diagnosis);
                self.transition(Phase::AwaitingConfirmation);
            }
            None => {
                self.state.last_diagnosis = Some(diagnosis);
                self.fail(FailureReason::NoUsableProposal);
            }
        }

        Ok(&self.state)
    }

    /// Apply the pending batch. Valid only while `AwaitingConfirmation`.
    ///
    /// The session backup taken by `start()` covers this patch; no new
    /// backup is written.
    pub fn confirm(&mut self) -> Result<&IterationState, TransitionError> {
        self.require(Phase::AwaitingConfirmation, "confirm")?;

        let Some(batch) = self.state.pending_batch.take() else {
            // Unreachable through the public API; treat as nothing to apply
            self.fail(FailureReason::NoUsableProposal);
            return Ok(&self.state);
        };

        match self.engine.apply_patch(&self.target, &batch, false) {
            Ok(report) => {
                self.state.applied_correction_count += 1;
                self.state.last_diagnosis = None;
                let mut line = format!("Patch applied ({} edit(s))", report.applied);
                if !report.skipped.is_empty() {
                    line.push_str(&format!(", {} out of range skipped", report.skipped.len()));
                }
                self.log(line);
                self.transition(Phase::Running);
            }
            Err(e) => {
                warn!(error = %e, "patch rejected");
                self.fail(FailureReason::PatchRejected(e.to_string()));
            }
        }

        Ok(&self.state)
    }

    /// Discard the pending batch and stop. Valid only while
    /// `AwaitingConfirmation`.
    pub fn cancel(&mut self) -> Result<&IterationState, TransitionError> {
        self.require(Phase::AwaitingConfirmation, "cancel")?;

        self.state.pending_batch = None;
        self.finish(
            Phase::Cancelled,
            format!(
                "Cancelled by user, {} correction(s) applied",
                self.state.applied_correction_count
            ),
        );
        Ok(&self.state)
    }

    /// Drain the pending log lines.
    ///
    /// Lines are kept only until taken, so a long session does not
    /// accumulate its whole transcript.
    pub fn take_log(&mut self) -> Vec<String> {
        std::mem::take(&mut self.state.log)
    }

    /// Consume the controller and return its final state.
    pub fn into_state(self) -> IterationState {
        self.state
    }

    fn require(&self, expected: Phase, operation: &'static str) -> Result<(), TransitionError> {
        if self.state.phase == expected {
            Ok(())
        } else {
            Err(TransitionError {
                operation,
                phase: self.state.phase,
            })
        }
    }

    fn transition(&mut self, next: Phase) {
        info!(from = %self.state.phase, to = %next, "phase changed");
        self.state.phase = next;
    }

    fn fail(&mut self, reason: FailureReason) {
        let message = format!(
            "Failed: {reason} ({} correction(s) applied)",
            self.state.applied_correction_count
        );
        self.state.pending_batch = None;
        self.state.failure = Some(reason);
        self.finish(Phase::Failed, message);
    }

    fn finish(&mut self, phase: Phase, message: String) {
        self.transition(phase);
        self.log(message.clone());
        self.state.message = Some(message);
    }

    fn log(&mut self, line: String) {
        self.state.log.push(line);
    }
}

/// Whether a confirmation answer means "go ahead".
pub fn is_affirmative(answer: &str) -> bool {
    matches!(
        answer.trim().to_lowercase().as_str(),
        "oui" | "o" | "yes" | "y"
    )
}

fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let head: String = text.chars().take(max_chars).collect();
        format!("{head}…")
    }
}
