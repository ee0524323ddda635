//! End-to-end CLI tests using `assert_cmd`.
//!
//! These exercise the compiled `chunkrag` binary directly; none of them
//! need network access since they stick to structured (non-semantic)
//! chunking.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

fn cmd() -> Command {
    Command::cargo_bin("chunkrag").unwrap_or_else(|e| panic!("binary not built: {e}"))
}

#[test]
fn help_lists_the_chunk_subcommand() {
    cmd().arg("--help").assert().success().stdout(predicate::str::contains("chunk"));
}

#[test]
fn version_prints_the_crate_version() {
    cmd().arg("--version").assert().success().stdout(predicate::str::contains("chunkrag"));
}

#[test]
fn chunk_requires_size_or_preset() {
    let mut file = tempfile::NamedTempFile::new().unwrap_or_else(|e| panic!("tempfile: {e}"));
    writeln!(file, "hello world").unwrap_or_else(|e| panic!("write: {e}"));

    cmd()
        .args(["chunk"])
        .arg(file.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("--size"));
}

#[test]
fn chunk_splits_a_file_and_prints_json_lines() {
    let mut file = tempfile::NamedTempFile::new().unwrap_or_else(|e| panic!("tempfile: {e}"));
    writeln!(file, "{}", "word ".repeat(200)).unwrap_or_else(|e| panic!("write: {e}"));

    let output = cmd()
        .arg("chunk")
        .arg(file.path())
        .args(["--size", "50", "--overlap", "5", "--format", "json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let text = String::from_utf8(output).unwrap_or_default();
    assert!(text.lines().count() > 1);
    assert!(text.lines().all(|line| serde_json::from_str::<serde_json::Value>(line).is_ok()));
}

#[test]
fn chunk_accepts_stdin_via_dash() {
    cmd()
        .arg("chunk")
        .arg("-")
        .args(["--size", "20"])
        .write_stdin("the quick brown fox jumps over the lazy dog, again and again")
        .assert()
        .success();
}

#[test]
fn chunk_rejects_conflicting_preset_and_size() {
    let mut file = tempfile::NamedTempFile::new().unwrap_or_else(|e| panic!("tempfile: {e}"));
    writeln!(file, "hello").unwrap_or_else(|e| panic!("write: {e}"));

    cmd()
        .arg("chunk")
        .arg(file.path())
        .args(["--preset", "code", "--size", "100"])
        .assert()
        .failure();
}
