//! Live console view of a notebook run.
//!
//! [`ReportSink`] is the driver's progress callback. Each finished cell is
//! printed and appended to the report file using the same section text.

use std::path::Path;
use std::sync::{Arc, Mutex};

use nbexec_core::execute::{AbortHandle, ExecutionCallback, RunOutcome};
use nbexec_core::report::{self, CellResult, ReportWriter, RunHeader};

use crate::colors;

/// Progress callback writing cell sections to the terminal and the report.
///
/// The first failed report write is kept and aborts the run.
pub struct ReportSink {
    report: Arc<Mutex<ReportWriter>>,
    abort: AbortHandle,
    failure: Arc<Mutex<Option<nbexec_core::Error>>>,
}

impl ReportSink {
    pub fn new(report: Arc<Mutex<ReportWriter>>, abort: AbortHandle) -> Self {
        Self {
            report,
            abort,
            failure: Arc::new(Mutex::new(None)),
        }
    }

    /// Shared slot holding the first report write failure.
    pub fn failure(&self) -> Arc<Mutex<Option<nbexec_core::Error>>> {
        Arc::clone(&self.failure)
    }

    fn record_failure(&self, err: nbexec_core::Error) {
        tracing::debug!("Report write failed, aborting: {}", err);
        self.abort.abort();
        if let Ok(mut slot) = self.failure.lock()
            && slot.is_none()
        {
            *slot = Some(err);
        }
    }

    fn has_failed(&self) -> bool {
        self.failure.lock().map(|slot| slot.is_some()).unwrap_or(true)
    }
}

impl ExecutionCallback for ReportSink {
    fn on_cell_started(&mut self, index: usize) {
        print!(
            "{}  ▶ Running{} {}cell {}{}... ",
            colors::CYAN,
            colors::RESET,
            colors::BOLD,
            index,
            colors::RESET
        );
        colors::flush_stdout();
    }

    fn on_cell_finished(&mut self, result: &CellResult) {
        println!("{}", colors::mark(result.success));
        print!("{}", report::render_cell(result));
        colors::flush_stdout();

        if self.has_failed() {
            return;
        }
        let written = match self.report.lock() {
            Ok(mut writer) => writer.write_cell(result),
            Err(poisoned) => poisoned.into_inner().write_cell(result),
        };
        if let Err(e) = written {
            self.record_failure(e);
        }
    }
}

/// Print the banner for one notebook.
pub fn print_header(header: &RunHeader, code_cells: usize) {
    println!(
        "\n{}nbexec{} - Running {}{}{}",
        colors::BOLD,
        colors::RESET,
        colors::CYAN,
        header.source_name,
        colors::RESET
    );
    println!(
        "{}{} code cells, started {}{}",
        colors::DIM,
        code_cells,
        header.started_at.to_rfc2822(),
        colors::RESET
    );
    println!("{}", "─".repeat(50));
}

/// Print the summary block and where the report went.
pub fn print_footer(outcome: &RunOutcome, report_path: &Path) {
    print!("{}", report::render_summary(&outcome.summary));

    let accuracy = outcome.summary.accuracy();
    println!("{}", "─".repeat(50));
    if outcome.aborted {
        println!(
            "{}Aborted{} after {} cells in {:.2}s",
            colors::YELLOW,
            colors::RESET,
            outcome.summary.total_processed,
            outcome.elapsed.as_secs_f64()
        );
    } else {
        println!(
            "{}Completed{} {} cells in {:.2}s ({}{:.2}%{} succeeded)",
            colors::GREEN,
            colors::RESET,
            outcome.summary.total_processed,
            outcome.elapsed.as_secs_f64(),
            colors::for_accuracy(accuracy),
            accuracy,
            colors::RESET
        );
    }
    println!(
        "{}Report:{} {}",
        colors::DIM,
        colors::RESET,
        report_path.display()
    );
}

/// The machine-readable accuracy line.
pub fn accuracy_line(accuracy: f64) -> String {
    format!("{{\"accuracy\": {:.2}}}", accuracy)
}
