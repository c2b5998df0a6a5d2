//! Error types for ServerCheck
//!
//! This module defines all error types used throughout the application,
//! following the propagation policy of the harness: attribute-level problems
//! never abort the run, device-level problems never abort other devices, and
//! only configuration malformation and "no hardware found" are fatal.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for ServerCheck operations
#[derive(Error, Debug)]
pub enum ServerCheckError {
    /// Malformed expectation data; aborts before any collection
    #[error("Configuration error: {0}")]
    Config(String),

    /// A diagnostic tool failed or its output could not be parsed.
    /// Scoped to one category; other categories keep collecting.
    #[error("Collection failed for '{category}' via `{command}`: {message}")]
    Collection {
        category: String,
        command: String,
        message: String,
    },

    /// A diagnostic tool exited non-zero
    #[error("`{command}` exited with {status}: {stderr}")]
    ToolFailed {
        command: String,
        status: i32,
        stdout: String,
        stderr: String,
    },

    /// A diagnostic tool is not installed on this host
    #[error("Required tool not found: {0}")]
    ToolMissing(String),

    /// A diagnostic tool did not terminate within the watchdog bound
    #[error("`{command}` timed out after {seconds}s")]
    ToolTimeout { command: String, seconds: u64 },

    /// No storage devices matched the configured target model.
    /// Fatal for the mount/disk-test phase only.
    #[error("No target drives found matching model '{0}'")]
    NoTargetDrivesFound(String),

    /// Mount or unmount of a target device failed
    #[error("Mount operation failed for '{device}': {message}")]
    Mount { device: String, message: String },

    /// A caller violated an API precondition (programmer error, not I/O)
    #[error("Precondition violated: {0}")]
    Precondition(String),

    /// I/O error during filesystem operations
    #[error("I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ServerCheckError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a collection error scoped to one category
    pub fn collection(
        category: impl Into<String>,
        command: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Collection {
            category: category.into(),
            command: command.into(),
            message: message.into(),
        }
    }

    /// Create a mount error for one device
    pub fn mount(device: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Mount {
            device: device.into(),
            message: message.into(),
        }
    }

    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error aborts the whole run rather than one category/device
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::NoTargetDrivesFound(_))
    }

    /// The captured diagnostic from the underlying tool, if any.
    ///
    /// Surfaced verbatim in `error` verdicts so the operator sees what the
    /// tool actually printed.
    pub fn tool_diagnostic(&self) -> Option<String> {
        match self {
            Self::ToolFailed { stdout, stderr, .. } => {
                if stderr.trim().is_empty() {
                    Some(stdout.trim().to_string())
                } else {
                    Some(stderr.trim().to_string())
                }
            }
            Self::Collection { message, .. } => Some(message.clone()),
            _ => None,
        }
    }
}

/// Result type alias for ServerCheck operations
pub type Result<T> = std::result::Result<T, ServerCheckError>;

impl From<serde_json::Error> for ServerCheckError {
    fn from(err: serde_json::Error) -> Self {
        ServerCheckError::Config(err.to_string())
    }
}

/// Extension trait for adding path context to std::io::Result
pub trait IoResultExt<T> {
    /// Add path context to an I/O error
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| ServerCheckError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(ServerCheckError::config("bad tolerance").is_fatal());
        assert!(ServerCheckError::NoTargetDrivesFound("Lexar".into()).is_fatal());
        assert!(!ServerCheckError::collection("cpu", "lscpu", "parse failure").is_fatal());
        assert!(!ServerCheckError::mount("/dev/nvme1n1", "busy").is_fatal());
    }

    #[test]
    fn test_tool_diagnostic_prefers_stderr() {
        let err = ServerCheckError::ToolFailed {
            command: "nvme list".into(),
            status: 1,
            stdout: "partial output".into(),
            stderr: "permission denied".into(),
        };
        assert_eq!(err.tool_diagnostic().unwrap(), "permission denied");

        let err = ServerCheckError::ToolFailed {
            command: "nvme list".into(),
            status: 1,
            stdout: "only stdout".into(),
            stderr: "  ".into(),
        };
        assert_eq!(err.tool_diagnostic().unwrap(), "only stdout");
    }

    #[test]
    fn test_io_error_with_path() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = ServerCheckError::io("/mnt/testdrives/0", io_err);
        assert!(err.to_string().contains("/mnt/testdrives/0"));
    }
}
