//! autofix: run a program, ask a reasoning service why it failed, and
//! apply the proposed line-level corrections with backup and rollback.
//!
//! # Architecture
//!
//! Every correction compiles down to a [`PatchBatch`] of line-based
//! [`EditOperation`]s. The [`PatchEngine`] is the only component that
//! writes to the target file; the [`Controller`] drives the
//! run → diagnose → confirm → patch loop as an explicit state machine over
//! two collaborators, an [`Executor`] and a [`ReasoningService`].
//!
//! # Safety
//!
//! - One persisted backup per session, taken before anything is touched
//! - Atomic file writes (tempfile + fsync + rename)
//! - Tree-sitter syntax gate after every write, with rollback on failure
//! - Nothing is applied without an explicit `confirm()`
//!
//! # Example
//!
//! ```no_run
//! use autofix::{PatchBatch, PatchEngine, EditOperation};
//!
//! let engine = PatchEngine::default();
//! let batch = PatchBatch::new(vec![EditOperation::replace(2, "b2()")]);
//!
//! match engine.apply_patch("script.py", &batch, true) {
//!     Ok(report) => println!("applied {} edit(s)", report.applied),
//!     Err(e) => eprintln!("patch failed: {e}"),
//! }
//! ```

pub mod backup;
pub mod config;
pub mod controller;
pub mod diagnosis;
pub mod edit;
pub mod engine;
pub mod executor;
pub mod pool;
pub mod service;
pub mod ts;
pub mod validate;

// Re-exports
pub use backup::{BackupError, BackupRecord, BackupStore};
pub use config::{discover, load_from_path, load_from_str, ConfigError, DebuggerConfig};
pub use controller::{is_affirmative, Controller, FailureReason, IterationState, Phase, TransitionError};
pub use diagnosis::{Correction, Diagnosis, ReasoningService, ServiceError};
pub use edit::{EditAction, EditOperation, PatchBatch};
pub use engine::{ApplyReport, PatchEngine, PatchError};
pub use executor::{ExecutionResult, Executor, ProcessExecutor};
pub use service::ChatCompletionsClient;
pub use ts::{SourceLanguage, TreeSitterError};
pub use validate::{ErrorLocation, ValidationError};
