//! Inter-process communication with the execution worker.
//!
//! This module provides the line-JSON protocol and the channel that owns the
//! worker process for the duration of a notebook run.

pub mod protocol;
mod worker;

pub use protocol::{
    EXIT_SENTINEL, ExecutionRequest, ExecutionResponse, decode_line, encode_line, read_message,
    write_message,
};
pub use worker::{ChildWorker, DiagnosticSink, WorkerChannel, WorkerKillHandle, WorkerSpec};
