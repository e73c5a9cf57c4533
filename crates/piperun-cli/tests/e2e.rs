//! End-to-end tests for piperun CLI commands.
//!
//! These tests run the built binary against real shell commands.

#![cfg(unix)]
#![allow(deprecated)] // Allow deprecated Command::cargo_bin for tests

use std::fs;
use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

// =============================================================================
// Test Helpers
// =============================================================================

fn piperun() -> Command {
    let mut cmd = Command::cargo_bin("piperun").expect("binary should be built");
    for var in [
        "PIPERUN_WORKERS",
        "PIPERUN_ADMISSION_TIMEOUT_MS",
        "PIPERUN_COMPLETION_TIMEOUT_MS",
        "PIPERUN_SHELL",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

/// Temporary directory holding batch input files.
struct Inputs {
    temp_dir: TempDir,
}

impl Inputs {
    fn new(files: &[(&str, &str)]) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        for (name, contents) in files {
            fs::write(temp_dir.path().join(name), contents).expect("Failed to write input");
        }
        Self { temp_dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(name)
    }
}

fn json_lines(stdout: &[u8]) -> Vec<serde_json::Value> {
    String::from_utf8_lossy(stdout)
        .lines()
        .map(|line| serde_json::from_str(line).expect("valid JSON line"))
        .collect()
}

// =============================================================================
// run
// =============================================================================

#[test]
fn test_run_cat() {
    piperun()
        .args(["run", "cat"])
        .write_stdin("hello")
        .assert()
        .success()
        .stdout("hello");
}

#[test]
fn test_run_transforms_input() {
    piperun()
        .args(["run", "tr a-z A-Z"])
        .write_stdin("shout\n")
        .assert()
        .success()
        .stdout("SHOUT\n");
}

#[test]
fn test_run_passes_diagnostics_to_stderr() {
    piperun()
        .args(["run", "printf boom >&2"])
        .write_stdin("")
        .assert()
        .failure()
        .stdout("")
        .stderr(predicate::str::contains("boom"));
}

#[test]
fn test_run_completion_timeout() {
    piperun()
        .args(["--completion-timeout-ms", "100", "run", "sleep 5"])
        .write_stdin("")
        .assert()
        .failure()
        .stderr(predicate::str::contains("completion timed out"));
}

#[test]
fn test_run_rejects_zero_workers_from_env() {
    piperun()
        .env("PIPERUN_WORKERS", "0")
        .args(["run", "cat"])
        .write_stdin("")
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid configuration"));
}

#[test]
fn test_flag_overrides_env() {
    piperun()
        .env("PIPERUN_WORKERS", "0")
        .args(["--workers", "1", "run", "cat"])
        .write_stdin("ok")
        .assert()
        .success()
        .stdout("ok");
}

// =============================================================================
// batch
// =============================================================================

#[test]
fn test_batch_reports_each_file_in_order() {
    let inputs = Inputs::new(&[("a.txt", "one"), ("b.txt", "two"), ("c.txt", "three")]);

    let output = piperun()
        .args(["--admission-timeout-ms", "10000", "batch", "tr a-z A-Z"])
        .arg(inputs.path("a.txt"))
        .arg(inputs.path("b.txt"))
        .arg(inputs.path("c.txt"))
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let lines = json_lines(&output);
    assert_eq!(lines.len(), 3);

    let outputs: Vec<_> = lines.iter().map(|l| l["output"].as_str().unwrap()).collect();
    assert_eq!(outputs, ["ONE", "TWO", "THREE"]);
    assert!(lines.iter().all(|l| l["ok"] == true && l["error"].is_null()));
    assert!(lines[0]["file"].as_str().unwrap().ends_with("a.txt"));
}

#[test]
fn test_batch_missing_file_fails_that_line_only() {
    let inputs = Inputs::new(&[("present.txt", "here")]);

    let output = piperun()
        .args(["batch", "cat"])
        .arg(inputs.path("present.txt"))
        .arg(inputs.path("absent.txt"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("1 of 2 jobs failed"))
        .get_output()
        .stdout
        .clone();

    let lines = json_lines(&output);
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["ok"], true);
    assert_eq!(lines[0]["output"], "here");
    assert_eq!(lines[1]["ok"], false);
    assert!(
        lines[1]["error"]
            .as_str()
            .unwrap()
            .starts_with("failed to read input")
    );
}

#[test]
fn test_batch_requires_files() {
    piperun().args(["batch", "cat"]).assert().failure();
}

#[test]
fn test_help() {
    piperun()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("worker pool"));
}
