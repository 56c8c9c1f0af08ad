//! Configuration bootstrap.
//!
//! Settings come from, lowest precedence first:
//! 1. `<config_dir>/nbexec/config.json` (created with defaults when missing)
//! 2. `NBEXEC_DATASET_ROOT`, `NBEXEC_OUTPUT_DIR`, `NBEXEC_WORKER`
//! 3. Command-line flags
//!
//! `NBEXEC_CONFIG` points at a different config file.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use nbexec_core::WorkerSpec;

use crate::colors;

const CONFIG_PATH_ENV: &str = "NBEXEC_CONFIG";
const DATASET_ROOT_ENV: &str = "NBEXEC_DATASET_ROOT";
const OUTPUT_DIR_ENV: &str = "NBEXEC_OUTPUT_DIR";
const WORKER_ENV: &str = "NBEXEC_WORKER";

/// Environment handed to the worker and to scripts.
pub const WORKER_OUTPUT_DIR_VAR: &str = "OUTPUT_DIR";
pub const WORKER_DATASET_ROOT_VAR: &str = "DATASET_ROOT";

/// Persisted settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Directory dataset references are rewritten under.
    pub dataset_root: PathBuf,
    /// Directory reports are written to.
    pub output_dir: PathBuf,
    /// Worker command line; the first element is the program.
    #[serde(default = "default_worker")]
    pub worker: Vec<String>,
    /// Per-cell response timeout. Absent or zero waits indefinitely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

fn default_worker() -> Vec<String> {
    ["python3", "-u", "run_code.py"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Values given on the command line.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub dataset_root: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub worker: Option<String>,
    pub timeout_secs: Option<u64>,
}

impl Config {
    /// Defaults rooted at `home`.
    pub fn with_home(home: &Path) -> Self {
        Self {
            dataset_root: home.join("datasets"),
            output_dir: home.join("output"),
            worker: default_worker(),
            timeout_secs: None,
        }
    }

    /// Location of the config file.
    pub fn default_path() -> anyhow::Result<PathBuf> {
        if let Some(path) = env::var_os(CONFIG_PATH_ENV).filter(|p| !p.is_empty()) {
            return Ok(PathBuf::from(path));
        }

        let base = dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
            .context("Could not determine the configuration directory")?;
        Ok(base.join("nbexec").join("config.json"))
    }

    /// Load the config at `path`, writing defaults first if it does not exist.
    ///
    /// Returns the config and whether it was just created.
    pub fn load_or_create(path: &Path) -> anyhow::Result<(Self, bool)> {
        if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            let config = serde_json::from_str(&content).map_err(|e| {
                nbexec_core::Error::Config(format!("{}: {}", path.display(), e))
            })?;
            return Ok((config, false));
        }

        let home = dirs::home_dir().context("Could not determine the home directory")?;
        let config = Self::with_home(&home);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let mut content = serde_json::to_string_pretty(&config)?;
        content.push('\n');
        fs::write(path, content)
            .with_context(|| format!("Failed to write config file {}", path.display()))?;

        Ok((config, true))
    }

    /// Apply `NBEXEC_*` overrides read through `var`.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        let set = |key: &str| var(key).filter(|value| !value.trim().is_empty());

        if let Some(root) = set(DATASET_ROOT_ENV) {
            self.dataset_root = PathBuf::from(root);
        }
        if let Some(dir) = set(OUTPUT_DIR_ENV) {
            self.output_dir = PathBuf::from(dir);
        }
        if let Some(worker) = set(WORKER_ENV) {
            self.worker = split_command(&worker);
        }
    }

    /// Apply command-line overrides.
    pub fn apply_overrides(&mut self, overrides: Overrides) {
        if let Some(root) = overrides.dataset_root {
            self.dataset_root = root;
        }
        if let Some(dir) = overrides.output_dir {
            self.output_dir = dir;
        }
        if let Some(worker) = overrides.worker {
            self.worker = split_command(&worker);
        }
        if overrides.timeout_secs.is_some() {
            self.timeout_secs = overrides.timeout_secs;
        }
    }

    /// Expand a leading `~` in the configured directories.
    pub fn expand_home(&mut self, home: Option<&Path>) {
        let Some(home) = home else { return };
        for path in [&mut self.dataset_root, &mut self.output_dir] {
            if let Ok(rest) = path.strip_prefix("~") {
                *path = home.join(rest);
            }
        }
    }

    /// Per-cell response timeout.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.filter(|secs| *secs > 0).map(Duration::from_secs)
    }

    /// The interpreter used for plain scripts: the worker's program.
    pub fn interpreter(&self) -> nbexec_core::Result<&str> {
        self.worker
            .first()
            .map(String::as_str)
            .ok_or_else(|| nbexec_core::Error::Config("worker command is empty".to_string()))
    }

    /// Launch description for the worker.
    pub fn worker_spec(&self) -> nbexec_core::Result<WorkerSpec> {
        Ok(WorkerSpec::from_command_line(&self.worker)?
            .env(WORKER_OUTPUT_DIR_VAR, self.output_dir.to_string_lossy())
            .env(WORKER_DATASET_ROOT_VAR, self.dataset_root.to_string_lossy())
            .timeout(self.timeout()))
    }
}

/// Split a whitespace-separated command line.
fn split_command(command: &str) -> Vec<String> {
    command.split_whitespace().map(String::from).collect()
}

/// Load the config file and layer environment and command-line overrides on top.
pub fn resolve(overrides: Overrides) -> anyhow::Result<Config> {
    let path = Config::default_path()?;
    let (mut config, created) = Config::load_or_create(&path)?;
    if created {
        eprintln!(
            "{}Created default config at {}{}",
            colors::YELLOW,
            path.display(),
            colors::RESET
        );
    }

    config.apply_env(|key| env::var(key).ok());
    config.apply_overrides(overrides);
    config.expand_home(dirs::home_dir().as_deref());
    Ok(config)
}

/// Print the config file location and the resolved settings.
pub fn show() -> anyhow::Result<()> {
    let path = Config::default_path()?;
    let config = resolve(Overrides::default())?;

    println!("{}Config file:{} {}", colors::BOLD, colors::RESET, path.display());
    println!("{}", "─".repeat(50));
    println!("  dataset_root  {}", config.dataset_root.display());
    println!("  output_dir    {}", config.output_dir.display());
    println!("  worker        {}", config.worker.join(" "));
    match config.timeout() {
        Some(timeout) => println!("  timeout       {}s", timeout.as_secs()),
        None => println!("  timeout       {}none{}", colors::DIM, colors::RESET),
    }

    Ok(())
}
