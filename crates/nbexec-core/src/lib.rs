//! Core engine for nbexec.
//!
//! This crate provides:
//! - Jupyter notebook document model
//! - Dataset path rewriting with filesystem fallback
//! - Line-JSON IPC with a persistent execution worker process
//! - Sequential cell driver with partial-failure tolerance
//! - Run summary and text report rendering

pub mod error;
pub mod execute;
pub mod ipc;
pub mod ipynb;
pub mod paths;
pub mod report;
pub mod rewrite;

pub use error::{Error, Result};
pub use execute::{AbortHandle, CellDriver, ExecutionCallback, RunOutcome};
pub use ipc::{
    ChildWorker, ExecutionRequest, ExecutionResponse, WorkerChannel, WorkerKillHandle, WorkerSpec,
};
pub use ipynb::{Cell, CellKind, Notebook};
pub use paths::OutputDir;
pub use report::{CellFailure, CellResult, ReportWriter, RunHeader, RunSummary, summarize};
pub use rewrite::{PathRewriter, RewriteDiagnostic, Rewritten};
