//! Execution engine for nbexec.
//!
//! # Architecture
//!
//! ```text
//! CellDriver (parent, single thread)
//!     │
//!     ├── PathRewriter ── rewrite each code cell
//!     │
//!     ├── WorkerChannel (ChildWorker)
//!     │       ├── stdin:  {"code": ...}\n      one request per code cell
//!     │       ├── stdout: {"success": ...}\n   exactly one response each
//!     │       ├── stderr: forwarded on a background thread
//!     │       └── {"code": "__EXIT__"}\n      once, after the last cell
//!     │
//!     └── ExecutionCallback ── report sink (console + file)
//! ```
//!
//! # Module Structure
//!
//! - `context` - Execution callbacks and abort handle
//! - `driver` - CellDriver for sequential execution

mod context;
mod driver;

pub use context::{AbortHandle, ExecutionCallback};
pub use driver::{CellDriver, RunOutcome};
