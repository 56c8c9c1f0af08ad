//! Per-cell results, run summary and the text report.
//!
//! The same [`render_cell`] text backs both the live console view and the
//! persisted report, so the two always agree on per-cell sections.

use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset};

use crate::error::{Error, Result};
use crate::ipc::ExecutionResponse;

const CELL_RULE: &str = "----------------------";

/// Why a cell has no worker response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellFailure {
    /// The worker's streams closed: it crashed, exited early, or was killed.
    StreamClosed,
    /// The worker answered with something that is not a response.
    Protocol,
    /// The worker did not answer in time.
    Timeout,
    /// The cell was never sent (its body is the worker exit sentinel).
    Rejected,
}

impl CellFailure {
    /// Classify a transaction error.
    pub fn from_error(error: &Error) -> Self {
        match error {
            Error::WorkerProtocol(_) | Error::Json(_) => CellFailure::Protocol,
            Error::WorkerTimeout(_) => CellFailure::Timeout,
            _ => CellFailure::StreamClosed,
        }
    }
}

impl fmt::Display for CellFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            CellFailure::StreamClosed => "stream closed",
            CellFailure::Protocol => "protocol error",
            CellFailure::Timeout => "timeout",
            CellFailure::Rejected => "rejected",
        };
        f.write_str(tag)
    }
}

/// Outcome of one code cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellResult {
    /// Position among all cells of the notebook.
    pub index: usize,
    /// Whether the cell ran without error.
    pub success: bool,
    /// Captured stdout.
    pub stdout: String,
    /// Captured stderr, or the transport error for failed transactions.
    pub stderr: String,
    /// Files generated by the cell.
    pub artifacts: Vec<String>,
    /// Set when no valid response was received.
    pub failure: Option<CellFailure>,
}

impl CellResult {
    /// Result built from a worker response.
    pub fn from_response(index: usize, response: ExecutionResponse) -> Self {
        Self {
            index,
            success: response.success,
            stdout: response.stdout,
            stderr: response.stderr,
            artifacts: response.artifacts,
            failure: None,
        }
    }

    /// Result for a transaction that produced no response.
    pub fn failed(index: usize, error: &Error) -> Self {
        Self {
            index,
            success: false,
            stdout: String::new(),
            stderr: error.to_string(),
            artifacts: Vec::new(),
            failure: Some(CellFailure::from_error(error)),
        }
    }
}

/// Counts derived from a result sequence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub total_processed: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub artifact_count: usize,
}

impl RunSummary {
    /// Percentage of processed cells that succeeded; 0 for an empty run.
    pub fn accuracy(&self) -> f64 {
        if self.total_processed == 0 {
            return 0.0;
        }
        self.success_count as f64 * 100.0 / self.total_processed as f64
    }
}

/// Aggregate results into a summary.
pub fn summarize(results: &[CellResult]) -> RunSummary {
    results.iter().fold(RunSummary::default(), |mut summary, result| {
        summary.total_processed += 1;
        if result.success {
            summary.success_count += 1;
        } else {
            summary.failure_count += 1;
        }
        summary.artifact_count += result.artifacts.len();
        summary
    })
}

/// Identifies a run in the report header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunHeader {
    /// Notebook file name.
    pub source_name: String,
    /// When the run started.
    pub started_at: DateTime<FixedOffset>,
}

impl RunHeader {
    pub fn new(source_name: impl Into<String>, started_at: DateTime<FixedOffset>) -> Self {
        Self {
            source_name: source_name.into(),
            started_at,
        }
    }

    /// Header for `notebook` starting now.
    pub fn now(notebook: &Path) -> Self {
        let source_name = notebook
            .file_name()
            .unwrap_or(notebook.as_os_str())
            .to_string_lossy()
            .to_string();
        Self::new(source_name, chrono::Local::now().fixed_offset())
    }
}

/// Render the report header.
pub fn render_header(header: &RunHeader) -> String {
    format!(
        "Execution Log for: {}\nTime: {}\n\n",
        header.source_name,
        header.started_at.to_rfc2822()
    )
}

/// Render one cell section.
pub fn render_cell(result: &CellResult) -> String {
    let mut out = format!("\n--- Cell {} Output ---\n", result.index);
    out.push_str(&format!("Success: {}\n", result.success));

    if let Some(failure) = result.failure {
        out.push_str(&format!("Failure: {}\n", failure));
    }
    if !result.stdout.is_empty() {
        out.push_str(&format!("Stdout:\n{}\n", result.stdout));
    }
    if !result.stderr.is_empty() {
        out.push_str(&format!("Stderr:\n{}\n", result.stderr));
    }
    if !result.artifacts.is_empty() {
        out.push_str("Generated Artifacts:\n");
        for artifact in &result.artifacts {
            out.push_str(&format!("- {}\n", artifact));
        }
    }

    out.push_str(CELL_RULE);
    out.push('\n');
    out
}

/// Render the trailing summary block.
pub fn render_summary(summary: &RunSummary) -> String {
    format!(
        "\n\n=== Execution Summary ===\n\
         Total Cells Processed: {}\n\
         Successful Executions: {}\n\
         Failed Executions: {}\n\
         Artifacts Generated: {}\n\
         Accuracy: {:.2}%\n\
         =======================\n",
        summary.total_processed,
        summary.success_count,
        summary.failure_count,
        summary.artifact_count,
        summary.accuracy()
    )
}

/// Render a complete report.
pub fn render(header: &RunHeader, results: &[CellResult], summary: &RunSummary) -> String {
    let mut out = render_header(header);
    for result in results {
        out.push_str(&render_cell(result));
    }
    out.push_str(&render_summary(summary));
    out
}

/// The persisted report, written incrementally.
///
/// The file is opened once in [`ReportWriter::create`] and closed when the
/// writer is finished or dropped.
pub struct ReportWriter {
    path: PathBuf,
    file: BufWriter<File>,
}

impl ReportWriter {
    /// Create the report file and write its header.
    pub fn create(path: impl Into<PathBuf>, header: &RunHeader) -> Result<Self> {
        let path = path.into();
        let file = File::create(&path).map_err(|e| Error::OutputUnwritable {
            path: path.clone(),
            message: e.to_string(),
        })?;

        let mut file = BufWriter::new(file);
        file.write_all(render_header(header).as_bytes())
            .map_err(|e| Error::OutputUnwritable {
                path: path.clone(),
                message: e.to_string(),
            })?;
        Ok(Self { path, file })
    }

    /// Path of the report file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one cell section.
    pub fn write_cell(&mut self, result: &CellResult) -> Result<()> {
        self.append(&render_cell(result))
    }

    /// Append the summary and close the file.
    pub fn finish(mut self, summary: &RunSummary) -> Result<PathBuf> {
        self.append(&render_summary(summary))?;
        Ok(self.path)
    }

    /// Write and flush `text`; any failure means the report is lost.
    fn append(&mut self, text: &str) -> Result<()> {
        self.file
            .write_all(text.as_bytes())
            .and_then(|_| self.file.flush())
            .map_err(|e| Error::OutputUnwritable {
                path: self.path.clone(),
                message: e.to_string(),
            })
    }
}
