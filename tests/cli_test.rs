//! CLI integration tests for inc-index

use serde_json::Value;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

/// Helper to run the CLI against a workspace
fn run_cli(workspace: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_inc-index"))
        .arg("--workspace")
        .arg(workspace)
        .args(args)
        .env_remove("INC_INDEX_DATA_DIR")
        .output()
        .expect("Failed to execute inc-index CLI")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

fn fixture() -> String {
    format!("{}/tests/fixtures/widgets.json", env!("CARGO_MANIFEST_DIR"))
}

/// A workspace with the widgets fixture ingested.
fn ingested_workspace() -> TempDir {
    let temp = TempDir::new().unwrap();
    let output = run_cli(temp.path(), &["ingest", &fixture()]);
    assert!(output.status.success(), "ingest failed: {}", stderr(&output));
    temp
}

fn json(output: &Output) -> Value {
    serde_json::from_str(&stdout(output))
        .unwrap_or_else(|e| panic!("invalid JSON ({e}): {}", stdout(output)))
}

#[test]
fn test_help_command() {
    let temp = TempDir::new().unwrap();
    let output = run_cli(temp.path(), &["--help"]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("ingest"), "Should mention ingest command");
    assert!(text.contains("dirty"), "Should mention dirty command");
    assert!(text.contains("include"), "Should mention include command");
}

#[test]
fn test_version_command() {
    let temp = TempDir::new().unwrap();
    let output = run_cli(temp.path(), &["--version"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_ingest_reports_counts() {
    let temp = TempDir::new().unwrap();
    let output = run_cli(temp.path(), &["--json", "ingest", &fixture()]);
    assert!(output.status.success(), "{}", stderr(&output));

    let value = json(&output);
    assert_eq!(value["type"], "Ingest");
    assert_eq!(value["ingested"]["files"], 3);
    assert_eq!(value["ingested"]["symbols"], 3);
    assert_eq!(value["ingested"]["build_records"], 1);
    assert!(temp.path().join(".inc-index").is_dir());
}

#[test]
fn test_include_suggestions() {
    let workspace = ingested_workspace();
    let output = run_cli(
        workspace.path(),
        &["include", "Widget", "--file", "src/main.cpp"],
    );
    assert!(output.status.success(), "{}", stderr(&output));
    assert_eq!(
        stdout(&output).lines().collect::<Vec<_>>(),
        vec!["#include <gui.h>", "#include <gui/Widget.h>"]
    );
}

#[test]
fn test_include_json_output() {
    let workspace = ingested_workspace();
    let output = run_cli(
        workspace.path(),
        &["--json", "include", "Widget", "--file", "src/main.cpp"],
    );
    assert!(output.status.success(), "{}", stderr(&output));

    let value = json(&output);
    assert_eq!(value["type"], "Include");
    assert_eq!(value["outcome"]["status"], "resolved");
    assert_eq!(value["outcome"]["suggestions"], 2);
    assert_eq!(value["includes"][0], "#include <gui.h>");
}

#[test]
fn test_include_without_build_record_exits_2() {
    let workspace = ingested_workspace();
    let output = run_cli(
        workspace.path(),
        &["include", "Widget", "--file", "src/other.cpp"],
    );
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("No build record"));
}

#[test]
fn test_dirty_then_include_finds_nothing() {
    let workspace = ingested_workspace();
    let output = run_cli(
        workspace.path(),
        &["--json", "dirty", "include/gui/Widget.h"],
    );
    assert!(output.status.success(), "{}", stderr(&output));

    let value = json(&output);
    assert_eq!(value["report"]["symbols_removed"], 3);
    assert_eq!(value["report"]["names_removed"], 2);

    let output = run_cli(
        workspace.path(),
        &["include", "Widget", "--file", "src/main.cpp"],
    );
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(stdout(&output).is_empty());
}

#[test]
fn test_stats_and_compact() {
    let workspace = ingested_workspace();
    let output = run_cli(workspace.path(), &["compact"]);
    assert!(output.status.success(), "{}", stderr(&output));

    let output = run_cli(workspace.path(), &["--json", "stats"]);
    assert!(output.status.success(), "{}", stderr(&output));
    let value = json(&output);
    assert_eq!(value["file_count"], 3);
    assert_eq!(value["include_edges"], 2);
    assert_eq!(value["symbols"], 3);
    assert_eq!(value["symbol_names"], 2);
}

#[test]
fn test_missing_input_is_an_error() {
    let temp = TempDir::new().unwrap();
    let output = run_cli(temp.path(), &["ingest", "does-not-exist.json"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("Failed to read"));
}
