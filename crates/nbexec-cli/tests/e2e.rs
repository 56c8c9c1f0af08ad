//! End-to-end tests for nbexec CLI commands.
//!
//! These run the binary against real notebook files with a shell-script
//! worker speaking the line protocol, so they only run on unix.

#![cfg(unix)]
#![allow(deprecated)] // Allow deprecated Command::cargo_bin for tests

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::json;
use tempfile::TempDir;

// =============================================================================
// Test Helpers
// =============================================================================

/// Worker answering by what the cell contains.
const WORKER_SCRIPT: &str = r#"
while IFS= read -r line; do
  case "$line" in
    *__EXIT__*) exit 0 ;;
    *slow*) exec sleep 30 ;;
    *fail*) printf '%s\n' '{"success":false,"stdout":"","stderr":"boom"}' ;;
    *plot*) printf '%s\n' '{"success":true,"stdout":"","stderr":"","images":["fig_1.png"]}' ;;
    *) printf '%s\n' '{"success":true,"stdout":"ran","stderr":""}' ;;
  esac
done
"#;

/// A temporary home with config, dataset root, output dir and worker.
struct Workspace {
    temp_dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path();
        fs::create_dir_all(root.join("datasets")).expect("Failed to create dataset root");
        fs::create_dir_all(root.join("notebooks")).expect("Failed to create notebooks dir");
        fs::write(root.join("worker.sh"), WORKER_SCRIPT).expect("Failed to write worker");

        let config = json!({
            "dataset_root": root.join("datasets"),
            "output_dir": root.join("output"),
            "worker": ["sh", root.join("worker.sh")],
        });
        fs::write(root.join("config.json"), config.to_string()).expect("Failed to write config");

        Self { temp_dir }
    }

    fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    fn output_dir(&self) -> PathBuf {
        self.root().join("output")
    }

    /// Write a notebook whose cells are `(cell_type, source)` pairs.
    fn notebook(&self, name: &str, cells: &[(&str, &str)]) -> PathBuf {
        let cells: Vec<_> = cells
            .iter()
            .map(|(kind, source)| json!({"cell_type": kind, "metadata": {}, "source": [source]}))
            .collect();
        let notebook = json!({"cells": cells, "metadata": {}, "nbformat": 4, "nbformat_minor": 5});
        self.file(name, &notebook.to_string())
    }

    fn file(&self, name: &str, content: &str) -> PathBuf {
        let path = self.root().join("notebooks").join(name);
        fs::write(&path, content).expect("Failed to write file");
        path
    }

    fn report(&self, stem: &str) -> String {
        let path = self.output_dir().join(format!("{}_output.txt", stem));
        fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("Failed to read report {}: {}", path.display(), e))
    }

    fn nbexec(&self) -> Command {
        let mut cmd = Command::cargo_bin("nbexec").unwrap();
        cmd.env("NBEXEC_CONFIG", self.root().join("config.json"))
            .env("HOME", self.root())
            .env_remove("NBEXEC_DATASET_ROOT")
            .env_remove("NBEXEC_OUTPUT_DIR")
            .env_remove("NBEXEC_WORKER")
            .env_remove("RUST_LOG");
        cmd
    }
}

fn accuracy_lines(stdout: &str) -> Vec<f64> {
    stdout
        .lines()
        .filter(|line| line.starts_with("{\"accuracy\""))
        .map(|line| {
            let value: serde_json::Value = serde_json::from_str(line).expect("accuracy line is JSON");
            value["accuracy"].as_f64().expect("accuracy is a number")
        })
        .collect()
}

// =============================================================================
// Run Command Tests
// =============================================================================

#[test]
fn test_run_nonexistent_path() {
    let ws = Workspace::new();
    ws.nbexec()
        .args(["run", "/nonexistent/notebook.ipynb"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Path not found"));
}

#[test]
fn test_run_unsupported_file() {
    let ws = Workspace::new();
    let notes = ws.file("notes.txt", "hello");
    ws.nbexec()
        .arg("run")
        .arg(&notes)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unsupported file type"));
}

#[test]
fn test_run_notebook_writes_report() {
    let ws = Workspace::new();
    let notebook = ws.notebook(
        "demo.ipynb",
        &[("code", "x = 1"), ("markdown", "# Title"), ("code", "print(x)")],
    );

    let output = ws.nbexec().arg("run").arg(&notebook).output().unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(output.status.success(), "nbexec run should succeed. stderr: {}", stderr);
    assert_eq!(accuracy_lines(&stdout), vec![100.0]);
    assert!(stdout.contains("--- Cell 0 Output ---"), "stdout: {}", stdout);

    let report = ws.report("demo");
    assert!(report.starts_with("Execution Log for: demo.ipynb\nTime: "));
    assert!(report.contains("--- Cell 0 Output ---\nSuccess: true\nStdout:\nran\n"));
    assert!(report.contains("--- Cell 2 Output ---"));
    assert!(!report.contains("--- Cell 1 Output ---"));
    assert!(report.contains("Total Cells Processed: 2\n"));
    assert!(report.contains("Accuracy: 100.00%\n"));
}

#[test]
fn test_failed_cell_lowers_accuracy() {
    let ws = Workspace::new();
    let notebook = ws.notebook("mixed.ipynb", &[("code", "x = 1"), ("code", "fail()")]);

    let output = ws.nbexec().arg("run").arg(&notebook).output().unwrap();
    assert!(output.status.success());
    assert_eq!(accuracy_lines(&String::from_utf8_lossy(&output.stdout)), vec![50.0]);

    let report = ws.report("mixed");
    assert!(report.contains("Success: false\nStderr:\nboom\n"));
    assert!(report.contains("Failed Executions: 1\n"));
}

#[test]
fn test_min_accuracy_gate() {
    let ws = Workspace::new();
    let notebook = ws.notebook("mixed.ipynb", &[("code", "x = 1"), ("code", "fail()")]);

    ws.nbexec()
        .arg("run")
        .arg(&notebook)
        .args(["--min-accuracy", "90"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("{\"accuracy\": 50.00}"))
        .stderr(predicate::str::contains("below the minimum accuracy"));

    ws.nbexec()
        .arg("run")
        .arg(&notebook)
        .args(["--min-accuracy", "50"])
        .assert()
        .success();
}

#[test]
fn test_images_are_reported_as_artifacts() {
    let ws = Workspace::new();
    let notebook = ws.notebook("charts.ipynb", &[("code", "plot()")]);

    ws.nbexec().arg("run").arg(&notebook).assert().success();

    let report = ws.report("charts");
    assert!(report.contains("Generated Artifacts:\n- fig_1.png\n"));
    assert!(report.contains("Artifacts Generated: 1\n"));
}

#[test]
fn test_timeout_kills_worker_and_run_continues() {
    let ws = Workspace::new();
    let notebook = ws.notebook("hang.ipynb", &[("code", "slow()"), ("code", "x = 1")]);

    ws.nbexec()
        .arg("run")
        .arg(&notebook)
        .args(["--timeout", "1"])
        .timeout(std::time::Duration::from_secs(20))
        .assert()
        .success()
        .stdout(predicate::str::contains("{\"accuracy\": 0.00}"));

    let report = ws.report("hang");
    assert!(report.contains("Failure: timeout\n"));
    assert!(report.contains("Failure: stream closed\n"));
    assert!(report.contains("Total Cells Processed: 2\n"));
}

#[test]
fn test_run_directory() {
    let ws = Workspace::new();
    ws.notebook("a.ipynb", &[("code", "x = 1")]);
    ws.notebook("b.ipynb", &[("code", "x = 1"), ("code", "fail()")]);
    ws.file("notes.txt", "not runnable");
    ws.file("prepare.py", "echo hello-from-script\n");

    let output = ws
        .nbexec()
        .arg("run")
        .arg(ws.root().join("notebooks"))
        .output()
        .unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(accuracy_lines(&stdout), vec![100.0, 50.0]);
    assert!(stdout.contains("hello-from-script"), "stdout: {}", stdout);
    assert!(ws.output_dir().join("a_output.txt").exists());
    assert!(ws.output_dir().join("b_output.txt").exists());
    assert!(!ws.output_dir().join("notes_output.txt").exists());
}

#[cfg(target_os = "linux")]
#[test]
fn test_report_write_failure_stops_directory_run() {
    let ws = Workspace::new();
    ws.notebook("a.ipynb", &[("code", "x = 1"), ("code", "y = 2")]);
    ws.notebook("b.ipynb", &[("code", "x = 1")]);
    fs::create_dir_all(ws.output_dir()).unwrap();
    std::os::unix::fs::symlink("/dev/full", ws.output_dir().join("a_output.txt")).unwrap();

    let output = ws
        .nbexec()
        .arg("run")
        .arg(ws.root().join("notebooks"))
        .timeout(std::time::Duration::from_secs(20))
        .output()
        .unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success(), "stdout: {}", stdout);
    assert!(stderr.contains("not writable"), "stderr: {}", stderr);
    assert!(accuracy_lines(&stdout).is_empty());
    assert!(!stdout.contains("--- Cell 1 Output ---"), "stdout: {}", stdout);
    assert!(!ws.output_dir().join("b_output.txt").exists());
}

#[test]
fn test_failing_script_does_not_stop_directory_run() {
    let ws = Workspace::new();
    ws.file("a_prepare.py", "exit 3\n");
    ws.notebook("b.ipynb", &[("code", "x = 1")]);

    ws.nbexec()
        .arg("run")
        .arg(ws.root().join("notebooks"))
        .timeout(std::time::Duration::from_secs(20))
        .assert()
        .success()
        .stdout(predicate::str::contains("Failed").and(predicate::str::contains("{\"accuracy\": 100.00}")));
}

#[test]
fn test_invalid_notebook_in_directory_is_skipped() {
    let ws = Workspace::new();
    ws.file("broken.ipynb", "{ not json");
    ws.notebook("good.ipynb", &[("code", "x = 1")]);

    ws.nbexec()
        .arg("run")
        .arg(ws.root().join("notebooks"))
        .assert()
        .success()
        .stdout(predicate::str::contains("{\"accuracy\": 100.00}"))
        .stderr(predicate::str::contains("parse error"));
}

#[test]
fn test_invalid_notebook_file_fails() {
    let ws = Workspace::new();
    let broken = ws.file("broken.ipynb", "{ not json");

    ws.nbexec()
        .arg("run")
        .arg(&broken)
        .assert()
        .failure()
        .stderr(predicate::str::contains("parse error").and(predicate::str::contains("hint:")));
}

#[test]
fn test_missing_worker_is_fatal() {
    let ws = Workspace::new();
    let notebook = ws.notebook("demo.ipynb", &[("code", "x = 1")]);

    ws.nbexec()
        .arg("run")
        .arg(&notebook)
        .args(["--worker", "nbexec-no-such-worker --flag"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to spawn worker").and(predicate::str::contains("hint:")));
}

// =============================================================================
// Config Command Tests
// =============================================================================

#[test]
fn test_config_creates_default_file() {
    let ws = Workspace::new();
    let config_path = ws.root().join("fresh").join("config.json");

    ws.nbexec()
        .env("NBEXEC_CONFIG", &config_path)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("python3 -u run_code.py"))
        .stderr(predicate::str::contains("Created default config"));

    let written: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&config_path).unwrap()).unwrap();
    assert_eq!(written["worker"], json!(["python3", "-u", "run_code.py"]));
}

#[test]
fn test_config_env_override() {
    let ws = Workspace::new();

    ws.nbexec()
        .env("NBEXEC_DATASET_ROOT", "/srv/kaggle")
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("/srv/kaggle"));
}
