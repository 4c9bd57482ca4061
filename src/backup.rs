//! Append-only backup store.
//!
//! Backups are plain copies named `<filename>.backup_<YYYYMMDD_HHMMSS>`.
//! Records are created with create-new semantics, so a prior backup is
//! never overwritten; a second backup within the same second gets a
//! numeric suffix.

use chrono::Local;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Default directory for backups, relative to the working directory.
pub const DEFAULT_BACKUP_DIR: &str = "backups";

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("file not found: {0}")]
    NotFound(PathBuf),

    #[error("backup I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A copy of a file as it was before a mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRecord {
    /// File that was backed up
    pub original: PathBuf,
    /// Location of the copy inside the backup directory
    pub path: PathBuf,
    /// Timestamp component of the name (`YYYYMMDD_HHMMSS`)
    pub timestamp: String,
}

impl BackupRecord {
    /// Read the backed-up bytes.
    pub fn read(&self) -> Result<Vec<u8>, BackupError> {
        fs::read(&self.path).map_err(|source| BackupError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

/// Directory holding backup records.
#[derive(Debug, Clone)]
pub struct BackupStore {
    dir: PathBuf,
}

impl BackupStore {
    /// The directory is created lazily, on the first backup.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Copy the current bytes of `path` into a new record.
    pub fn create_backup(&self, path: impl AsRef<Path>) -> Result<BackupRecord, BackupError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(BackupError::NotFound(path.to_path_buf()));
        }

        let content = fs::read(path).map_err(|source| BackupError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        fs::create_dir_all(&self.dir).map_err(|source| BackupError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());
        let timestamp = Local::now().format(TIMESTAMP_FORMAT).to_string();

        let backup_path = self.write_new_record(&filename, &timestamp, &content)?;
        info!(
            original = %path.display(),
            backup = %backup_path.display(),
            "backup created"
        );

        Ok(BackupRecord {
            original: path.to_path_buf(),
            path: backup_path,
            timestamp,
        })
    }

    fn write_new_record(
        &self,
        filename: &str,
        timestamp: &str,
        content: &[u8],
    ) -> Result<PathBuf, BackupError> {
        let base = format!("{filename}.backup_{timestamp}");
        let mut attempt = 0usize;

        loop {
            let name = if attempt == 0 {
                base.clone()
            } else {
                format!("{base}_{attempt}")
            };
            let candidate = self.dir.join(name);

            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&candidate)
            {
                Ok(mut file) => {
                    file.write_all(content)
                        .and_then(|()| file.sync_all())
                        .map_err(|source| BackupError::Io {
                            path: candidate.clone(),
                            source,
                        })?;
                    return Ok(candidate);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => attempt += 1,
                Err(source) => {
                    return Err(BackupError::Io {
                        path: candidate,
                        source,
                    })
                }
            }
        }
    }

    /// Copy a record back over `target`.
    pub fn restore(&self, record: &BackupRecord, target: impl AsRef<Path>) -> Result<(), BackupError> {
        let target = target.as_ref();
        let content = record.read()?;
        crate::edit::atomic_write(target, &content).map_err(|source| BackupError::Io {
            path: target.to_path_buf(),
            source,
        })?;
        info!(
            backup = %record.path.display(),
            target = %target.display(),
            "backup restored"
        );
        Ok(())
    }

    /// All records for `filename`, oldest first.
    pub fn records_for(&self, filename: &str) -> Result<Vec<PathBuf>, BackupError> {
        let prefix = format!("{filename}.backup_");
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(BackupError::Io {
                    path: self.dir.clone(),
                    source,
                })
            }
        };

        let mut records: Vec<(RecordOrder, PathBuf)> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter_map(|path| {
                let name = path.file_name()?.to_str()?;
                let order = RecordOrder::parse(name.strip_prefix(&prefix)?)?;
                Some((order, path))
            })
            .collect();
        records.sort();
        Ok(records.into_iter().map(|(_, path)| path).collect())
    }
}

/// Sort key of a record name: timestamp, then collision suffix.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct RecordOrder {
    timestamp: String,
    suffix: u32,
}

impl RecordOrder {
    /// Parse `YYYYMMDD_HHMMSS` or `YYYYMMDD_HHMMSS_<n>`.
    fn parse(rest: &str) -> Option<Self> {
        let timestamp_len = "YYYYMMDD_HHMMSS".len();
        let timestamp = rest.get(..timestamp_len)?;
        let suffix = match &rest[timestamp_len..] {
            "" => 0,
            tail => tail.strip_prefix('_')?.parse().ok()?,
        };
        Some(Self {
            timestamp: timestamp.to_string(),
            suffix,
        })
    }
}

impl Default for BackupStore {
    fn default() -> Self {
        Self::new(DEFAULT_BACKUP_DIR)
    }
}
