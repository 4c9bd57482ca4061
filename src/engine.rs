//! Patch-Apply Engine.
//!
//! Applies a [`PatchBatch`] to a file on disk so that the file ends up
//! either fully updated and syntactically valid, or byte-identical to what
//! it was before the call.
//!
//! # Hard Rules (Never Violate)
//!
//! 1. **Snapshot first**: the pre-apply bytes are held in memory before
//!    anything is written, whether or not a persisted backup is taken.
//! 2. **Syntax gate**: after writing, the new content must parse without
//!    ERROR nodes in the file's language, or the snapshot is written back.
//! 3. **No partial state**: every failure after the snapshot restores it
//!    before the error is returned.

use crate::backup::{BackupError, BackupRecord, BackupStore};
use crate::edit::{apply_operations, atomic_write, EditOperation, PatchBatch};
use crate::ts::SourceLanguage;
use crate::validate::{pooled, ErrorLocation, ValidationError};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Error, Debug)]
pub enum PatchError {
    #[error("file not found: {0}")]
    NotFound(PathBuf),

    #[error("no syntax checker for {0} (unsupported file extension)")]
    UnsupportedLanguage(PathBuf),

    #[error("{0} is not valid UTF-8")]
    InvalidUtf8(PathBuf),

    #[error("patch would break {language} syntax in {file} ({count} error(s)); file restored")]
    SyntaxRegression {
        file: PathBuf,
        language: SourceLanguage,
        count: usize,
        errors: Vec<ErrorLocation>,
    },

    #[error("syntax check failed for {file}: {source}; file restored")]
    Validation {
        file: PathBuf,
        #[source]
        source: ValidationError,
    },

    #[error("backup failed: {0}")]
    Backup(#[from] BackupError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Outcome of a committed patch.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "ApplyReport carries the skipped operations and backup handle"]
pub struct ApplyReport {
    pub file: PathBuf,
    /// Operations that changed the file
    pub applied: usize,
    /// Out-of-range operations that were ignored
    pub skipped: Vec<EditOperation>,
    /// Backup taken by this call, if one was requested
    pub backup: Option<BackupRecord>,
}

/// Applies patch batches with backup and syntax-gated rollback.
#[derive(Debug, Clone, Default)]
pub struct PatchEngine {
    backups: BackupStore,
}

impl PatchEngine {
    pub fn new(backups: BackupStore) -> Self {
        Self { backups }
    }

    pub fn backups(&self) -> &BackupStore {
        &self.backups
    }

    /// Persist a full copy of `path` in the backup store.
    pub fn create_backup(&self, path: impl AsRef<Path>) -> Result<BackupRecord, PatchError> {
        let path = path.as_ref();
        self.backups.create_backup(path).map_err(|e| match e {
            BackupError::NotFound(p) => PatchError::NotFound(p),
            other => PatchError::Backup(other),
        })
    }

    /// Copy a backup record back over `path`.
    pub fn restore(&self, record: &BackupRecord, path: impl AsRef<Path>) -> Result<(), PatchError> {
        Ok(self.backups.restore(record, path)?)
    }

    /// Compute the patched content without touching the file.
    pub fn preview(&self, path: impl AsRef<Path>, batch: &PatchBatch) -> Result<String, PatchError> {
        let path = path.as_ref();
        let (_, original) = read_source(path)?;
        Ok(apply_operations(&original, batch).content)
    }

    /// Apply `batch` to `path`.
    ///
    /// With `make_backup` set, a persisted backup is taken first; otherwise
    /// the caller already holds one (e.g. a session-level backup). In both
    /// cases rollback uses the in-memory snapshot, so the file is restored
    /// byte for byte.
    ///
    /// Returns `Ok` only when the write succeeded and the syntax check
    /// passed.
    pub fn apply_patch(
        &self,
        path: impl AsRef<Path>,
        batch: &PatchBatch,
        make_backup: bool,
    ) -> Result<ApplyReport, PatchError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(PatchError::NotFound(path.to_path_buf()));
        }
        let language = SourceLanguage::from_path(path)
            .ok_or_else(|| PatchError::UnsupportedLanguage(path.to_path_buf()))?;

        let backup = if make_backup {
            Some(self.create_backup(path)?)
        } else {
            None
        };

        let (snapshot, original) = read_source(path)?;
        let patched = apply_operations(&original, batch);
        for op in &patched.skipped {
            warn!(file = %path.display(), %op, "edit out of range, skipped");
        }

        if let Err(source) = atomic_write(path, patched.content.as_bytes()) {
            self.rollback(path, &snapshot);
            return Err(PatchError::Io {
                path: path.to_path_buf(),
                source,
            });
        }

        match pooled::validate(language, &patched.content) {
            Ok(()) => {
                info!(
                    file = %path.display(),
                    applied = patched.applied,
                    skipped = patched.skipped.len(),
                    "patch committed"
                );
                Ok(ApplyReport {
                    file: path.to_path_buf(),
                    applied: patched.applied,
                    skipped: patched.skipped,
                    backup,
                })
            }
            Err(ValidationError::SyntaxErrors {
                language,
                count,
                errors,
            }) => {
                warn!(file = %path.display(), count, "syntax check failed, restoring original");
                self.rollback(path, &snapshot);
                Err(PatchError::SyntaxRegression {
                    file: path.to_path_buf(),
                    language,
                    count,
                    errors,
                })
            }
            Err(source) => {
                self.rollback(path, &snapshot);
                Err(PatchError::Validation {
                    file: path.to_path_buf(),
                    source,
                })
            }
        }
    }

    fn rollback(&self, path: &Path, snapshot: &[u8]) {
        if let Err(e) = atomic_write(path, snapshot) {
            // Last resort: a plain write of the snapshot
            error!(file = %path.display(), error = %e, "atomic rollback failed, retrying in place");
            if let Err(e) = fs::write(path, snapshot) {
                error!(file = %path.display(), error = %e, "rollback failed");
            }
        }
    }
}

/// Read `path` as raw bytes plus its UTF-8 text.
fn read_source(path: &Path) -> Result<(Vec<u8>, String), PatchError> {
    let bytes = fs::read(path).map_err(|source| match source.kind() {
        io::ErrorKind::NotFound => PatchError::NotFound(path.to_path_buf()),
        _ => PatchError::Io {
            path: path.to_path_buf(),
            source,
        },
    })?;
    let text = String::from_utf8(bytes.clone())
        .map_err(|_| PatchError::InvalidUtf8(path.to_path_buf()))?;
    Ok((bytes, text))
}
