//! Session config resolution: file (or defaults), then command-line
//! overrides, then one validation pass over the result.

use crate::config::schema::{DebuggerConfig, Overrides, ValidationError};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File looked up in the working directory when no config path is given.
pub const DEFAULT_CONFIG_FILE: &str = "autofix.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config{}: {source}", origin(.path))]
    Parse {
        path: Option<PathBuf>,
        #[source]
        source: toml_edit::de::Error,
    },

    #[error("invalid settings{}: {source}", origin(.path))]
    Invalid {
        /// Config file the settings came from; `None` for built-in defaults
        path: Option<PathBuf>,
        #[source]
        source: ValidationError,
    },
}

fn origin(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|p| format!(" ({})", p.display()))
        .unwrap_or_default()
}

pub fn load_from_str(input: &str) -> Result<DebuggerConfig, ConfigError> {
    checked(parse(input, None)?, None)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<DebuggerConfig, ConfigError> {
    let path = path.as_ref();
    checked(read(path)?, Some(path))
}

/// Resolve the session config without overrides. See [`resolve`].
pub fn discover(explicit: Option<&Path>, dir: &Path) -> Result<DebuggerConfig, ConfigError> {
    resolve(explicit, dir, &Overrides::default())
}

/// Resolve the session config.
///
/// Source priority:
/// 1. Explicit path (must exist)
/// 2. `autofix.toml` in `dir`
/// 3. Built-in defaults
///
/// `overrides` are applied on top and the merged result is validated once,
/// so a bad command-line value is reported the same way as a bad file value.
pub fn resolve(
    explicit: Option<&Path>,
    dir: &Path,
    overrides: &Overrides,
) -> Result<DebuggerConfig, ConfigError> {
    let candidate = dir.join(DEFAULT_CONFIG_FILE);
    let source = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None if candidate.is_file() => Some(candidate),
        None => None,
    };

    let mut config = match &source {
        Some(path) => read(path)?,
        None => DebuggerConfig::default(),
    };
    config.apply(overrides);
    checked(config, source.as_deref())
}

fn parse(input: &str, path: Option<&Path>) -> Result<DebuggerConfig, ConfigError> {
    toml_edit::de::from_str(input).map_err(|source| ConfigError::Parse {
        path: path.map(Path::to_path_buf),
        source,
    })
}

fn read(path: &Path) -> Result<DebuggerConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&contents, Some(path))
}

fn checked(config: DebuggerConfig, path: Option<&Path>) -> Result<DebuggerConfig, ConfigError> {
    config.validate().map_err(|source| ConfigError::Invalid {
        path: path.map(Path::to_path_buf),
        source,
    })?;
    Ok(config)
}
