//! End-to-end session tests
//!
//! Drives the full run → diagnose → confirm → patch loop against real files
//! with a scripted executor and a scripted reasoning service:
//! 1. Division by zero fixed after one confirmed correction
//! 2. Unusable proposal ends the session without staging a patch
//! 3. Cancellation leaves the target untouched
//! 4. Patch rejected by the syntax gate is rolled back

use autofix::backup::BackupStore;
use autofix::controller::{Controller, FailureReason, Phase};
use autofix::diagnosis::{Diagnosis, ReasoningService, ServiceError};
use autofix::executor::{ExecutionResult, Executor};
use autofix::PatchEngine;
use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Reports a ZeroDivisionError until the file no longer contains the
/// unguarded division.
struct DivisionChecker;

impl Executor for DivisionChecker {
    fn execute(&self, path: &Path) -> ExecutionResult {
        let source = fs::read_to_string(path).unwrap_or_default();
        if source.lines().any(|line| line.trim() == "print(x / y)") {
            ExecutionResult {
                stdout: "start\n".to_string(),
                stderr: "Traceback (most recent call last):\n  File \"calc.py\", line 4, in <module>\n    print(x / y)\nZeroDivisionError: division by zero\n".to_string(),
                exit_code: 1,
            }
        } else {
            ExecutionResult {
                stdout: "start\n0\n".to_string(),
                stderr: String::new(),
                exit_code: 0,
            }
        }
    }
}

/// Replies with a fixed JSON answer and records what it was asked.
struct ScriptedService {
    answer: String,
    requests: RefCell<Vec<(String, String, String)>>,
}

impl ScriptedService {
    fn new(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            requests: RefCell::new(Vec::new()),
        }
    }
}

impl ReasoningService for ScriptedService {
    fn analyze(&self, code: &str, error: &str, filename: &str) -> Result<Diagnosis, ServiceError> {
        self.requests
            .borrow_mut()
            .push((code.to_string(), error.to_string(), filename.to_string()));
        Diagnosis::from_response_text(&self.answer)
    }
}

const CALC: &str = "x = 10\ny = 0\nprint(\"start\")\nprint(x / y)\n";

const GUARD_ANSWER: &str = r#"```json
{
  "type_erreur": "ZeroDivisionError",
  "ligne_erreur": 4,
  "cause": "y is 0",
  "corrections": [
    {
      "ligne": 4,
      "code_original": "print(x / y)",
      "code_corrige": "print(x / y if y != 0 else 0)",
      "explication": "guard the division"
    }
  ],
  "conseil": "check divisors before dividing"
}
```"#;

fn setup_session() -> (TempDir, PathBuf, PatchEngine) {
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("calc.py");
    fs::write(&target, CALC).unwrap();
    let engine = PatchEngine::new(BackupStore::new(dir.path().join("backups")));
    (dir, target, engine)
}

#[test]
fn test_division_by_zero_fixed_after_confirmation() {
    let (_dir, target, engine) = setup_session();
    let service = ScriptedService::new(GUARD_ANSWER);
    let mut controller = Controller::new(&target, engine, DivisionChecker, &service);

    controller.start().unwrap();
    let state = controller.step().unwrap();
    assert_eq!(state.phase, Phase::AwaitingConfirmation);
    assert_eq!(state.pending_batch.as_ref().map(|b| b.len()), Some(1));

    controller.confirm().unwrap();
    assert_eq!(controller.phase(), Phase::Running);
    assert_eq!(
        fs::read_to_string(&target).unwrap(),
        "x = 10\ny = 0\nprint(\"start\")\nprint(x / y if y != 0 else 0)\n"
    );

    let state = controller.step().unwrap();
    assert_eq!(state.phase, Phase::Succeeded);
    assert_eq!(state.applied_correction_count, 1);
    assert_eq!(state.iteration_count, 2);

    // The service saw the full source, the error output and the file name
    let requests = service.requests.borrow();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].0, CALC);
    assert!(requests[0].1.contains("ZeroDivisionError"));
    assert_eq!(requests[0].2, "calc.py");

    // The session backup holds the original program
    let backup = state.initial_backup.as_ref().unwrap();
    assert_eq!(fs::read_to_string(&backup.path).unwrap(), CALC);
}

#[test]
fn test_unusable_proposal_fails_without_staging() {
    let (_dir, target, engine) = setup_session();
    let service = ScriptedService::new(
        r#"{"type_erreur": "ZeroDivisionError",
            "corrections": [{"ligne": 4, "code_original": "print(x / y)"}]}"#,
    );
    let mut controller = Controller::new(&target, engine, DivisionChecker, &service);

    controller.start().unwrap();
    let state = controller.step().unwrap();

    assert_eq!(state.phase, Phase::Failed);
    assert_eq!(state.failure, Some(FailureReason::NoUsableProposal));
    assert!(state.pending_batch.is_none());
    assert_eq!(state.applied_correction_count, 0);
    assert_eq!(fs::read_to_string(&target).unwrap(), CALC);
}

#[test]
fn test_cancellation_leaves_target_untouched() {
    let (_dir, target, engine) = setup_session();
    let service = ScriptedService::new(GUARD_ANSWER);
    let mut controller = Controller::new(&target, engine, DivisionChecker, &service);

    controller.start().unwrap();
    controller.step().unwrap();
    let state = controller.cancel().unwrap();

    assert_eq!(state.phase, Phase::Cancelled);
    assert!(state.pending_batch.is_none());
    assert!(state.message.as_deref().unwrap().contains("Cancelled"));
    assert_eq!(fs::read_to_string(&target).unwrap(), CALC);
    assert!(controller.confirm().is_err());
}

#[test]
fn test_malformed_answer_fails_session() {
    let (_dir, target, engine) = setup_session();
    let service = ScriptedService::new("Sorry, I can't determine the problem.");
    let mut controller = Controller::new(&target, engine, DivisionChecker, &service);

    controller.start().unwrap();
    let state = controller.step().unwrap();

    assert_eq!(state.phase, Phase::Failed);
    assert!(matches!(state.failure, Some(FailureReason::Service(_))));
}

#[test]
fn test_broken_correction_is_rolled_back() {
    let (_dir, target, engine) = setup_session();
    let service = ScriptedService::new(
        r#"{"corrections": [{"ligne": 4, "code_corrige": "print(x / (y if y else 1)"}]}"#,
    );
    let mut controller = Controller::new(&target, engine, DivisionChecker, &service);

    controller.start().unwrap();
    controller.step().unwrap();
    let state = controller.confirm().unwrap();

    assert_eq!(state.phase, Phase::Failed);
    assert!(matches!(state.failure, Some(FailureReason::PatchRejected(_))));
    assert_eq!(fs::read_to_string(&target).unwrap(), CALC);
}

#[test]
fn test_session_restore_from_backup() {
    let (_dir, target, engine) = setup_session();
    let service = ScriptedService::new(GUARD_ANSWER);
    let mut controller = Controller::new(&target, engine, DivisionChecker, &service);

    controller.start().unwrap();
    controller.step().unwrap();
    controller.confirm().unwrap();
    assert_ne!(fs::read_to_string(&target).unwrap(), CALC);

    let record = controller.state().initial_backup.clone().unwrap();
    controller.engine().restore(&record, &target).unwrap();
    assert_eq!(fs::read_to_string(&target).unwrap(), CALC);
}
