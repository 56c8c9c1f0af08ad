//! Error types for nbexec-core.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result type for nbexec-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in nbexec-core.
#[derive(Debug, Error)]
pub enum Error {
    /// Failed to parse a notebook document.
    #[error("parse error: {0}")]
    Parse(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The worker executable could not be launched.
    #[error("failed to spawn worker '{program}': {message}")]
    WorkerSpawn { program: String, message: String },

    /// Writing a request to the worker failed (stream closed or process gone).
    #[error("failed to write to worker: {0}")]
    WorkerWrite(String),

    /// The worker answered with a line that is not a valid response.
    #[error("malformed worker response: {0}")]
    WorkerProtocol(String),

    /// The worker's response stream closed before a line arrived.
    #[error("worker closed its output stream before responding")]
    WorkerEof,

    /// No response arrived within the configured bound.
    #[error("worker did not respond within {}s", .0.as_secs_f64())]
    WorkerTimeout(Duration),

    /// The report destination could not be created or written.
    #[error("output destination {path} is not writable: {message}")]
    OutputUnwritable { path: PathBuf, message: String },

    /// Invalid configuration handed to the core.
    #[error("configuration error: {0}")]
    Config(String),

    /// Execution was aborted by user request.
    #[error("execution aborted")]
    Aborted,
}

impl Error {
    /// Whether this error ends the whole run rather than a single cell.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::WorkerSpawn { .. } | Error::OutputUnwritable { .. } | Error::Config(_)
        )
    }

    /// A short recovery hint for errors a user can act on.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Error::WorkerSpawn { .. } => Some(
                "check the `worker` command in the config file or pass --worker; \
                 bare program names are looked up on PATH",
            ),
            Error::OutputUnwritable { .. } => {
                Some("pass --output-dir pointing at a writable directory")
            }
            Error::WorkerEof => {
                Some("the worker process exited; its stderr above usually names the cause")
            }
            Error::WorkerTimeout(_) => Some("raise --timeout or drop it to wait indefinitely"),
            Error::Parse(_) => Some("the file must be a JSON notebook with a `cells` array"),
            _ => None,
        }
    }

    /// Render the error together with its hint, if any.
    pub fn with_hint(&self) -> String {
        match self.hint() {
            Some(hint) => format!("{}\n  hint: {}", self, hint),
            None => self.to_string(),
        }
    }
}
