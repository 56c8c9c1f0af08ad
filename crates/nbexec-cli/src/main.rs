//! nbexec CLI - Execute Jupyter notebooks against a persistent worker process.

mod colors;
mod config;
mod console;
mod run;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "nbexec")]
#[command(about = "Execute Jupyter notebooks cell by cell in a persistent worker")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a notebook, a script, or every notebook and script in a directory
    Run {
        /// Path to a .ipynb or .py file, or a directory containing them
        path: PathBuf,

        /// Directory dataset references are rewritten under
        #[arg(long)]
        dataset_root: Option<PathBuf>,

        /// Directory reports are written to
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Worker command line, e.g. "python3 -u run_code.py"
        #[arg(long)]
        worker: Option<String>,

        /// Seconds to wait for each cell before killing the worker
        #[arg(long)]
        timeout: Option<u64>,

        /// Exit with an error if any notebook scores below this percentage
        #[arg(long)]
        min_accuracy: Option<f64>,
    },

    /// Show the configuration file location and resolved settings
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging; stdout carries the accuracy lines.
    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::DEBUG.into())
    } else {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Helper to format nbexec-core errors with recovery hints
    let format_error = |err: anyhow::Error| -> anyhow::Error {
        if let Some(core_err) = err.downcast_ref::<nbexec_core::Error>() {
            anyhow::anyhow!("{}", core_err.with_hint())
        } else {
            err
        }
    };

    match cli.command {
        Commands::Run {
            path,
            dataset_root,
            output_dir,
            worker,
            timeout,
            min_accuracy,
        } => {
            let config = config::resolve(config::Overrides {
                dataset_root,
                output_dir,
                worker,
                timeout_secs: timeout,
            })
            .map_err(format_error)?;

            let scores = run::execute(&path, &config).await.map_err(format_error)?;
            if let Some(min_accuracy) = min_accuracy {
                run::check_min_accuracy(&scores, min_accuracy)?;
            }
        }

        Commands::Config => config::show().map_err(format_error)?,
    }

    Ok(())
}
