pub mod loader;
pub mod schema;

pub use loader::{discover, load_from_path, load_from_str, resolve, ConfigError, DEFAULT_CONFIG_FILE};
pub use schema::{DebuggerConfig, Overrides, ServiceConfig, ValidationError, ValidationIssue};
