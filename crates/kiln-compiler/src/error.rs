//! Compiler errors.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = CompileError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum CompileError {
    /// The build command could not be started at all
    #[error("Failed to start build command `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The build command ran and exited unsuccessfully
    #[error("Build command `{command}` {}{}", exit_description(*.code), stderr_suffix(.stderr))]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    /// A directory that must be watched does not exist
    #[error("Watch path not found: {}", .0.display())]
    WatchPathNotFound(PathBuf),

    #[error("File watcher error: {0}")]
    Watch(#[from] notify::Error),

    #[error("{0}")]
    Custom(String),
}

fn exit_description(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("exited with code {}", code),
        None => "was terminated by a signal".to_string(),
    }
}

fn stderr_suffix(stderr: &str) -> String {
    if stderr.trim().is_empty() {
        String::new()
    } else {
        format!("\n{}", stderr.trim_end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_failed_includes_code_and_stderr() {
        let err = CompileError::CommandFailed {
            command: "make".to_string(),
            code: Some(2),
            stderr: "error: no rule\n".to_string(),
        };
        assert_eq!(err.to_string(), "Build command `make` exited with code 2\nerror: no rule");
    }

    #[test]
    fn command_failed_without_code_mentions_signal() {
        let err = CompileError::CommandFailed {
            command: "make".to_string(),
            code: None,
            stderr: String::new(),
        };
        assert_eq!(err.to_string(), "Build command `make` was terminated by a signal");
    }
}
