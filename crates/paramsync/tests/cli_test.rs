//! Integration tests for the `paramsync` binary.
//!
//! Everything runs against the in-process loopback peer; no test touches
//! the user's real configuration.
#![allow(clippy::unwrap_used)]

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a command with env isolation and short retry delays.
fn paramsync_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("paramsync");
    cmd.env("HOME", "/tmp/paramsync-cli-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/paramsync-cli-test-nonexistent")
        .env_remove("PARAMSYNC_CONFIG")
        .env_remove("RUST_LOG")
        .env("PARAMSYNC_BACKOFF__INITIAL_DELAY_MS", "5")
        .env("PARAMSYNC_BACKOFF__MAX_DELAY_MS", "50");
    cmd
}

fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = paramsync_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_lists_commands() {
    paramsync_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("demo").and(predicate::str::contains("config")),
    );
}

#[test]
fn test_version_flag() {
    paramsync_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("paramsync"));
}

// ── Config ──────────────────────────────────────────────────────────

#[test]
fn test_config_path_honors_flag() {
    paramsync_cmd()
        .args(["--config", "/tmp/elsewhere/paramsync.toml", "config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("/tmp/elsewhere/paramsync.toml"));
}

#[test]
fn test_config_show_merges_file_and_env() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[engine]\nwrite_method = \"host.set\"\n").unwrap();

    let output = paramsync_cmd()
        .arg("--config")
        .arg(&path)
        .args(["-o", "json", "config", "show"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", combined_output(&output));

    let shown: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(shown["engine"]["write_method"], "host.set");
    assert_eq!(shown["engine"]["snapshot_method"], "params.snapshot");
    assert_eq!(shown["backoff"]["initial_delay_ms"], 5);
}

#[test]
fn test_config_init_refuses_to_overwrite() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    paramsync_cmd()
        .arg("--config")
        .arg(&path)
        .args(["config", "init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote"));
    assert!(path.exists());

    paramsync_cmd()
        .arg("--config")
        .arg(&path)
        .args(["config", "init"])
        .assert()
        .code(6)
        .stderr(predicate::str::contains("already exists"));

    paramsync_cmd()
        .arg("--config")
        .arg(&path)
        .args(["config", "init", "--force"])
        .assert()
        .success();
}

// ── Demo ────────────────────────────────────────────────────────────

#[test]
fn test_demo_plain_output() {
    paramsync_cmd()
        .args(["-o", "plain", "demo", "--fail-snapshots", "1"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("gain=80%")
                .and(predicate::str::contains("mix=0.45"))
                .and(predicate::str::contains("bypass=on"))
                .and(predicate::str::contains("mode=fuzz")),
        );
}

#[test]
fn test_demo_json_report() {
    let output = paramsync_cmd()
        .args(["-o", "json", "demo", "--fail-snapshots", "1"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", combined_output(&output));

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let records = report["records"].as_array().unwrap();
    assert_eq!(records.len(), 4);
    assert!(records.iter().all(|r| r["pending"] == 0));

    let changes = report["changes"].as_array().unwrap();
    assert!(
        changes
            .iter()
            .any(|c| c["id"] == "gain" && c["cause"] == "rollback")
    );
}

#[test]
fn test_demo_table_without_changes() {
    paramsync_cmd()
        .args(["demo", "--fail-snapshots", "0", "--no-changes"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("rollback race")
                .and(predicate::str::contains("Dry/Wet"))
                .and(predicate::str::contains("write-confirmed").not()),
        );
}

#[test]
fn test_demo_rejects_invalid_backoff() {
    paramsync_cmd()
        .env("PARAMSYNC_BACKOFF__MULTIPLIER", "1.0")
        .arg("demo")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("multiplier"));
}

#[test]
fn test_quiet_suppresses_output() {
    paramsync_cmd()
        .args(["-q", "demo", "--fail-snapshots", "0"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}
