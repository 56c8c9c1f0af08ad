//! Run command implementation.
//!
//! Dispatches a file or every runnable file in a directory: notebooks go
//! through the worker pipeline, scripts run directly with the interpreter.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use anyhow::{Context, bail};

use nbexec_core::execute::{AbortHandle, CellDriver};
use nbexec_core::ipc::ChildWorker;
use nbexec_core::ipynb::Notebook;
use nbexec_core::paths::OutputDir;
use nbexec_core::report::{ReportWriter, RunHeader, RunSummary};
use nbexec_core::rewrite::PathRewriter;

use crate::colors;
use crate::config::{Config, WORKER_DATASET_ROOT_VAR, WORKER_OUTPUT_DIR_VAR};
use crate::console::{self, ReportSink};

/// File types the run command handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileKind {
    Notebook,
    Script,
}

impl FileKind {
    fn of(path: &Path) -> Option<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("ipynb") => Some(FileKind::Notebook),
            Some("py") => Some(FileKind::Script),
            _ => None,
        }
    }
}

/// Result of one notebook.
#[derive(Debug, Clone)]
pub struct NotebookScore {
    /// Notebook file name.
    pub name: String,
    pub summary: RunSummary,
}

/// Execute `path`, a notebook, a script or a directory of them.
pub async fn execute(path: &Path, config: &Config) -> anyhow::Result<Vec<NotebookScore>> {
    if !path.exists() {
        bail!("Path not found: {}", path.display());
    }

    if !path.is_dir() {
        let kind = FileKind::of(path).with_context(|| {
            format!("Unsupported file type: {} (expected .ipynb or .py)", path.display())
        })?;
        return Ok(run_file(path, kind, config).await?.into_iter().collect());
    }

    let entries = runnable_entries(path)?;
    if entries.is_empty() {
        println!(
            "{}No notebooks or scripts found in {}{}",
            colors::YELLOW,
            path.display(),
            colors::RESET
        );
        return Ok(Vec::new());
    }

    let mut scores = Vec::new();
    for (entry, kind) in entries {
        match run_file(&entry, kind, config).await {
            Ok(score) => scores.extend(score),
            Err(e) if is_recoverable(&e) => {
                eprintln!(
                    "{}Error:{} {}: {}",
                    colors::RED,
                    colors::RESET,
                    entry.display(),
                    describe(&e)
                );
            }
            Err(e) => return Err(e),
        }
    }
    Ok(scores)
}

/// Fail if any notebook scored below `min_accuracy` percent.
pub fn check_min_accuracy(scores: &[NotebookScore], min_accuracy: f64) -> anyhow::Result<()> {
    let below: Vec<String> = scores
        .iter()
        .filter(|score| score.summary.accuracy() < min_accuracy)
        .map(|score| format!("{} ({:.2}%)", score.name, score.summary.accuracy()))
        .collect();

    if !below.is_empty() {
        bail!(
            "{} notebook(s) below the minimum accuracy of {:.2}%: {}",
            below.len(),
            min_accuracy,
            below.join(", ")
        );
    }
    Ok(())
}

/// Runnable files directly inside `dir`, sorted by name.
fn runnable_entries(dir: &Path) -> anyhow::Result<Vec<(PathBuf, FileKind)>> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    paths.sort();

    Ok(paths
        .into_iter()
        .filter_map(|path| match FileKind::of(&path) {
            Some(kind) => Some((path, kind)),
            None => {
                tracing::info!("Skipping {}", path.display());
                None
            }
        })
        .collect())
}

async fn run_file(
    path: &Path,
    kind: FileKind,
    config: &Config,
) -> anyhow::Result<Option<NotebookScore>> {
    match kind {
        FileKind::Notebook => run_notebook(path, config).await.map(Some),
        FileKind::Script => run_script(path, config).await.map(|_| None),
    }
}

/// Errors that end one file of a directory run but not the run itself.
fn is_recoverable(err: &anyhow::Error) -> bool {
    match err.downcast_ref::<nbexec_core::Error>() {
        Some(core) => !core.is_fatal() && !matches!(core, nbexec_core::Error::Aborted),
        None => true,
    }
}

fn describe(err: &anyhow::Error) -> String {
    match err.downcast_ref::<nbexec_core::Error>() {
        Some(core) => core.with_hint(),
        None => format!("{:#}", err),
    }
}

/// Run every code cell of one notebook through a fresh worker.
async fn run_notebook(path: &Path, config: &Config) -> anyhow::Result<NotebookScore> {
    let notebook = Notebook::read_from_file(path)?;
    let output = OutputDir::create(&config.output_dir)?;
    let header = RunHeader::now(path);
    console::print_header(&header, notebook.code_cell_count());

    let worker = ChildWorker::spawn(&config.worker_spec()?)?;
    let kill_handle = worker.kill_handle();
    let report = Arc::new(Mutex::new(ReportWriter::create(
        output.report_path(path),
        &header,
    )?));
    let abort_handle = AbortHandle::new();

    let sink = ReportSink::new(Arc::clone(&report), abort_handle.clone());
    let report_failure = sink.failure();

    let mut driver = CellDriver::new(PathRewriter::new(&config.dataset_root), worker);
    driver.set_callback(sink);
    driver.set_abort_handle(abort_handle.clone());

    let mut task = tokio::task::spawn_blocking(move || driver.run(&notebook));
    let outcome = tokio::select! {
        joined = &mut task => joined?,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("\n{}Interrupted, stopping worker{}", colors::YELLOW, colors::RESET);
            abort_handle.abort();
            kill_handle.kill();
            task.await?
        }
    };

    let failure = report_failure
        .lock()
        .map_err(|_| anyhow::anyhow!("Report failure slot is poisoned"))?
        .take();
    if let Some(err) = failure {
        return Err(err.into());
    }

    let writer = Arc::into_inner(report)
        .context("Report writer is still in use")?
        .into_inner()
        .map_err(|_| anyhow::anyhow!("Report writer is poisoned"))?;
    let report_path = writer.finish(&outcome.summary)?;

    console::print_footer(&outcome, &report_path);
    println!("{}", console::accuracy_line(outcome.summary.accuracy()));

    if outcome.aborted {
        return Err(nbexec_core::Error::Aborted.into());
    }

    Ok(NotebookScore {
        name: header.source_name,
        summary: outcome.summary,
    })
}

/// Run a plain script with the worker's interpreter, stdio inherited.
///
/// Ctrl-C reaches the script through the terminal; once it has exited the
/// interrupt stops the rest of a directory run.
async fn run_script(path: &Path, config: &Config) -> anyhow::Result<()> {
    let interpreter = config.interpreter()?.to_string();
    println!(
        "\n{}nbexec{} - Running script {}{}{}",
        colors::BOLD,
        colors::RESET,
        colors::CYAN,
        path.display(),
        colors::RESET
    );

    let mut command = Command::new(&interpreter);
    command
        .arg(path)
        .env(WORKER_OUTPUT_DIR_VAR, &config.output_dir)
        .env(WORKER_DATASET_ROOT_VAR, &config.dataset_root);

    let start = Instant::now();
    let mut task = tokio::task::spawn_blocking(move || command.status());
    let (status, interrupted) = tokio::select! {
        joined = &mut task => (joined?, false),
        _ = tokio::signal::ctrl_c() => {
            eprintln!("\n{}Interrupted, waiting for script{}", colors::YELLOW, colors::RESET);
            (task.await?, true)
        }
    };
    let status = status.with_context(|| format!("Failed to start {}", interpreter))?;
    let elapsed = start.elapsed().as_secs_f64();

    if status.success() {
        println!(
            "{}Completed{} {} in {:.2}s",
            colors::GREEN,
            colors::RESET,
            path.display(),
            elapsed
        );
    } else {
        println!(
            "{}Failed{} {} after {:.2}s ({})",
            colors::RED,
            colors::RESET,
            path.display(),
            elapsed,
            status
        );
    }

    if interrupted {
        return Err(nbexec_core::Error::Aborted.into());
    }
    Ok(())
}
