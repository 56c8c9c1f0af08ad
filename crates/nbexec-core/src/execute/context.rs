//! Execution callbacks and cancellation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::report::CellResult;

/// Handle for cancelling a run.
///
/// `AbortHandle` can be cloned and shared across threads; any clone can
/// trigger the abort and every other clone observes it.
///
/// # Example
///
/// ```
/// use nbexec_core::execute::AbortHandle;
///
/// let handle = AbortHandle::new();
/// let handle_clone = handle.clone();
///
/// assert!(!handle.is_aborted());
/// handle_clone.abort();
/// assert!(handle.is_aborted());
/// ```
#[derive(Clone, Default)]
pub struct AbortHandle {
    /// Shared abort flag.
    aborted: Arc<AtomicBool>,
}

impl AbortHandle {
    /// Create a new abort handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if abort has been requested.
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    /// Request abort. The driver stops before the next cell.
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }
}

/// Callback trait for execution progress reporting.
pub trait ExecutionCallback: Send {
    /// Called before a code cell is sent to the worker.
    fn on_cell_started(&mut self, index: usize);

    /// Called with each cell's result, in document order.
    fn on_cell_finished(&mut self, result: &CellResult);
}
