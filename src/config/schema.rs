use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;

/// Settings for a debugging session, as read from `autofix.toml`.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct DebuggerConfig {
    /// Where backup records are written
    pub backup_dir: PathBuf,
    /// Interpreter command used to run the target
    pub interpreter: String,
    /// Virtualenv interpreter, preferred when it exists
    pub venv_interpreter: Option<PathBuf>,
    /// Bound on one run of the target, in seconds
    pub timeout_secs: u64,
    /// Caller-side cap on run/diagnose cycles; unbounded when absent
    pub max_iterations: Option<u32>,
    /// Apply every proposal without asking
    pub auto_confirm: bool,
    pub service: ServiceConfig,
}

impl Default for DebuggerConfig {
    fn default() -> Self {
        Self {
            backup_dir: PathBuf::from(crate::backup::DEFAULT_BACKUP_DIR),
            interpreter: "python3".to_string(),
            venv_interpreter: None,
            timeout_secs: 10,
            max_iterations: None,
            auto_confirm: false,
            service: ServiceConfig::default(),
        }
    }
}

/// Reasoning-service connection settings.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    pub endpoint: String,
    pub model: String,
    /// Name of the environment variable holding the API key
    pub api_key_env: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
    pub request_timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.groq.com/openai/v1/chat/completions".to_string(),
            model: "llama-3.3-70b-versatile".to_string(),
            api_key_env: "GROQ_API_KEY".to_string(),
            temperature: 0.1,
            max_tokens: 1500,
            top_p: 0.95,
            request_timeout_secs: 60,
        }
    }
}

/// Command-line values that replace file settings when present.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    pub interpreter: Option<String>,
    pub venv_interpreter: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
    pub backup_dir: Option<PathBuf>,
    pub max_iterations: Option<u32>,
    /// Can switch auto-confirm on, never off
    pub auto_confirm: bool,
}

impl DebuggerConfig {
    pub fn apply(&mut self, overrides: &Overrides) {
        if let Some(interpreter) = &overrides.interpreter {
            self.interpreter = interpreter.clone();
        }
        if let Some(venv) = &overrides.venv_interpreter {
            self.venv_interpreter = Some(venv.clone());
        }
        if let Some(timeout) = overrides.timeout_secs {
            self.timeout_secs = timeout;
        }
        if let Some(dir) = &overrides.backup_dir {
            self.backup_dir = dir.clone();
        }
        if overrides.max_iterations.is_some() {
            self.max_iterations = overrides.max_iterations;
        }
        self.auto_confirm |= overrides.auto_confirm;
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if self.interpreter.trim().is_empty() {
            issues.push(ValidationIssue::MissingField { field: "interpreter" });
        }
        if self.timeout_secs == 0 {
            issues.push(ValidationIssue::OutOfRange {
                field: "timeout_secs",
                message: "must be greater than 0".to_string(),
            });
        }
        if self.max_iterations == Some(0) {
            issues.push(ValidationIssue::OutOfRange {
                field: "max_iterations",
                message: "must be greater than 0 when set".to_string(),
            });
        }
        if self.backup_dir.as_os_str().is_empty() {
            issues.push(ValidationIssue::MissingField { field: "backup_dir" });
        }

        let service = &self.service;
        if service.endpoint.trim().is_empty() {
            issues.push(ValidationIssue::MissingField {
                field: "service.endpoint",
            });
        }
        if service.model.trim().is_empty() {
            issues.push(ValidationIssue::MissingField {
                field: "service.model",
            });
        }
        if service.api_key_env.trim().is_empty() {
            issues.push(ValidationIssue::MissingField {
                field: "service.api_key_env",
            });
        }
        if !(0.0..=2.0).contains(&service.temperature) {
            issues.push(ValidationIssue::OutOfRange {
                field: "service.temperature",
                message: "must be between 0 and 2".to_string(),
            });
        }
        if !(service.top_p > 0.0 && service.top_p <= 1.0) {
            issues.push(ValidationIssue::OutOfRange {
                field: "service.top_p",
                message: "must be in (0, 1]".to_string(),
            });
        }
        if service.max_tokens == 0 {
            issues.push(ValidationIssue::OutOfRange {
                field: "service.max_tokens",
                message: "must be greater than 0".to_string(),
            });
        }
        if service.request_timeout_secs == 0 {
            issues.push(ValidationIssue::OutOfRange {
                field: "service.request_timeout_secs",
                message: "must be greater than 0".to_string(),
            });
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    MissingField { field: &'static str },
    OutOfRange { field: &'static str, message: String },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::MissingField { field } => write!(f, "missing or empty field `{field}`"),
            ValidationIssue::OutOfRange { field, message } => write!(f, "`{field}` {message}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.issues.iter().map(ToString::to_string).collect();
        write!(f, "{}", rendered.join("; "))
    }
}

impl std::error::Error for ValidationError {}
