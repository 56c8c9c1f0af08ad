//! IPC protocol messages for the execution worker.
//!
//! Line-delimited JSON over the worker's stdin/stdout.
//! Format: one JSON object per line, terminated by a single `\n`.
//!
//! ```text
//! → {"code": "x = 1"}
//! ← {"success": true, "stdout": "", "stderr": "", "artifacts": []}
//! → {"code": "__EXIT__"}
//! ```

use std::io::{BufRead, Write};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// `code` value that asks the worker to exit.
pub const EXIT_SENTINEL: &str = "__EXIT__";

/// Request sent from the driver to the worker: one code cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// Source text to execute.
    pub code: String,
}

impl ExecutionRequest {
    /// Request executing `code`.
    pub fn new(code: impl Into<String>) -> Self {
        Self { code: code.into() }
    }

    /// The termination request.
    pub fn exit() -> Self {
        Self::new(EXIT_SENTINEL)
    }

    /// Whether this is the termination request rather than real source.
    pub fn is_exit(&self) -> bool {
        self.code == EXIT_SENTINEL
    }
}

/// Response sent from the worker for one request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResponse {
    /// Whether the code ran without raising.
    pub success: bool,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error (tracebacks included).
    pub stderr: String,
    /// Paths of files the cell generated. Absent means none; older workers
    /// send the same list as `images`.
    #[serde(default, alias = "images", skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<String>,
}

/// Encode a message as one newline-terminated JSON line.
pub fn encode_line<T: Serialize>(message: &T) -> Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec(message)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Decode one line (without its terminator) into a message.
pub fn decode_line<T: DeserializeOwned>(line: &str) -> Result<T> {
    serde_json::from_str(line).map_err(|e| {
        let preview: String = line.chars().take(120).collect();
        Error::WorkerProtocol(format!("{} (line: {:?})", e, preview))
    })
}

/// Write a message as a single line and flush.
///
/// The whole line goes out in one `write_all` so a request is never
/// interleaved with anything else on the stream.
pub fn write_message<W: Write, T: Serialize>(writer: &mut W, message: &T) -> Result<()> {
    let bytes = encode_line(message)?;
    writer
        .write_all(&bytes)
        .map_err(|e| Error::WorkerWrite(format!("Failed to write IPC message: {}", e)))?;
    writer
        .flush()
        .map_err(|e| Error::WorkerWrite(format!("Failed to flush IPC stream: {}", e)))?;
    Ok(())
}

/// Read one line and decode it.
///
/// Returns [`Error::WorkerEof`] if the stream ends before a line arrives.
pub fn read_message<R: BufRead, T: DeserializeOwned>(reader: &mut R) -> Result<T> {
    let mut line = String::new();
    let read = reader.read_line(&mut line).map_err(|e| match e.kind() {
        std::io::ErrorKind::InvalidData => Error::WorkerProtocol(e.to_string()),
        _ => Error::Io(e),
    })?;
    if read == 0 {
        return Err(Error::WorkerEof);
    }

    let line = line.strip_suffix('\n').unwrap_or(&line);
    let line = line.strip_suffix('\r').unwrap_or(line);
    decode_line(line)
}
