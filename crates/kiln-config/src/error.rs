//! Error types for configuration loading and resolution.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("project root not found: {}", .0.display())]
    RootNotFound(PathBuf),

    #[error("project root is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("missing required field '{field}'\n\nHint: {hint}")]
    MissingField { field: String, hint: String },

    #[error("invalid config value for '{field}'{}", .hint.as_ref().map(|h| format!("\n\nHint: {h}")).unwrap_or_default())]
    InvalidValue { field: String, hint: Option<String> },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
