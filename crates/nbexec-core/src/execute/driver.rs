//! Sequential cell driver.

use std::time::{Duration, Instant};

use crate::ipc::{ExecutionRequest, WorkerChannel};
use crate::ipynb::Notebook;
use crate::report::{CellFailure, CellResult, RunSummary, summarize};
use crate::rewrite::PathRewriter;

use super::context::{AbortHandle, ExecutionCallback};

/// Everything a run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    /// One result per code cell that was attempted, in document order.
    pub results: Vec<CellResult>,
    /// Counts derived from `results`.
    pub summary: RunSummary,
    /// Whether the run stopped early on an abort request.
    pub aborted: bool,
    /// Wall-clock time from the first request to worker exit.
    pub elapsed: Duration,
}

/// Runs a notebook's code cells, in order, through one worker.
///
/// The driver owns the worker for the whole run. Cell failures are recorded
/// and the run moves on; the worker is never restarted, so once it dies every
/// later cell fails the same way. The worker is terminated exactly once when
/// the run ends, whatever happened before.
pub struct CellDriver<W: WorkerChannel> {
    /// Dataset reference rewriter applied to every code cell.
    rewriter: PathRewriter,
    /// The execution worker.
    worker: W,
    /// Execution callback for progress reporting.
    callback: Option<Box<dyn ExecutionCallback>>,
    /// Abort handle for interruption.
    abort_handle: Option<AbortHandle>,
}

impl<W: WorkerChannel> CellDriver<W> {
    /// Create a driver over a started worker.
    pub fn new(rewriter: PathRewriter, worker: W) -> Self {
        Self {
            rewriter,
            worker,
            callback: None,
            abort_handle: None,
        }
    }

    /// Set the execution callback for progress reporting.
    pub fn set_callback(&mut self, callback: impl ExecutionCallback + 'static) {
        self.callback = Some(Box::new(callback));
    }

    /// Set the abort handle for interruption.
    pub fn set_abort_handle(&mut self, handle: AbortHandle) {
        self.abort_handle = Some(handle);
    }

    /// Check if execution has been aborted.
    fn is_aborted(&self) -> bool {
        self.abort_handle.as_ref().is_some_and(|h| h.is_aborted())
    }

    /// Execute every code cell of `notebook`, then terminate the worker.
    pub fn run(mut self, notebook: &Notebook) -> RunOutcome {
        let start = Instant::now();
        let (results, aborted) = self.execute_cells(notebook);

        if let Err(e) = self.worker.terminate() {
            tracing::warn!("Worker did not shut down cleanly: {}", e);
        }

        let summary = summarize(&results);
        RunOutcome {
            results,
            summary,
            aborted,
            elapsed: start.elapsed(),
        }
    }

    fn execute_cells(&mut self, notebook: &Notebook) -> (Vec<CellResult>, bool) {
        let mut results = Vec::with_capacity(notebook.code_cell_count());

        for (index, cell) in notebook.code_cells() {
            if self.is_aborted() {
                tracing::warn!("Run aborted before cell {}", index);
                return (results, true);
            }

            if let Some(ref mut callback) = self.callback {
                callback.on_cell_started(index);
            }

            let result = self.execute_cell(index, &cell.body());

            if let Some(ref mut callback) = self.callback {
                callback.on_cell_finished(&result);
            }
            results.push(result);
        }

        (results, self.is_aborted())
    }

    /// One transaction for one code cell.
    fn execute_cell(&mut self, index: usize, body: &str) -> CellResult {
        let request = ExecutionRequest::new(self.rewriter.rewrite(body));

        if request.is_exit() {
            tracing::error!("Cell {} consists of the worker exit sentinel; not sent", index);
            return CellResult {
                index,
                success: false,
                stdout: String::new(),
                stderr: "cell body is the worker exit sentinel and was not executed".to_string(),
                artifacts: Vec::new(),
                failure: Some(CellFailure::Rejected),
            };
        }

        tracing::debug!("Executing cell {} ({} bytes)", index, request.code.len());
        match self.worker.transact(&request) {
            Ok(response) => CellResult::from_response(index, response),
            Err(e) => {
                tracing::error!("No response for cell {}: {}", index, e);
                CellResult::failed(index, &e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use crate::ipc::ExecutionResponse;
    use crate::ipynb::Cell;

    /// Answers every request with the code echoed to stdout.
    #[derive(Default)]
    struct EchoWorker {
        pending: Option<String>,
    }

    impl WorkerChannel for EchoWorker {
        fn send(&mut self, request: &ExecutionRequest) -> Result<()> {
            self.pending = Some(request.code.clone());
            Ok(())
        }

        fn receive(&mut self) -> Result<ExecutionResponse> {
            let code = self.pending.take().ok_or(Error::WorkerEof)?;
            Ok(ExecutionResponse {
                success: true,
                stdout: code,
                stderr: String::new(),
                artifacts: Vec::new(),
            })
        }

        fn terminate(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn rewriter() -> PathRewriter {
        PathRewriter::new(std::env::temp_dir().join("nbexec-driver-tests-empty-root"))
    }

    #[test]
    fn test_body_is_sent_verbatim_without_references() {
        let notebook = Notebook::new(vec![Cell::code(["a = 1\n", "b = a + 1"])]);
        let outcome = CellDriver::new(rewriter(), EchoWorker::default()).run(&notebook);

        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].stdout, "a = 1\nb = a + 1");
        assert!(!outcome.aborted);
    }

    #[test]
    fn test_exit_sentinel_cell_not_sent() {
        let notebook = Notebook::new(vec![Cell::code(["__EXIT__"]), Cell::code(["x = 1"])]);
        let outcome = CellDriver::new(rewriter(), EchoWorker::default()).run(&notebook);

        assert_eq!(outcome.results.len(), 2);
        assert_eq!(outcome.results[0].failure, Some(CellFailure::Rejected));
        assert!(outcome.results[1].success);
        assert_eq!(outcome.summary.failure_count, 1);
    }

    #[test]
    fn test_pre_aborted_run_sends_nothing() {
        let notebook = Notebook::new(vec![Cell::code(["x = 1"])]);
        let abort = AbortHandle::new();
        abort.abort();

        let mut driver = CellDriver::new(rewriter(), EchoWorker::default());
        driver.set_abort_handle(abort);
        let outcome = driver.run(&notebook);

        assert!(outcome.aborted);
        assert!(outcome.results.is_empty());
    }
}
