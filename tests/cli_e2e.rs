//! End-to-end CLI tests for the feedwatch binary.

use assert_cmd::Command;
use predicates::prelude::*;

/// Test that --help displays usage information and exits with code 0.
#[test]
fn test_binary_help_displays_usage() {
    let mut cmd = Command::cargo_bin("feedwatch").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Collect and monitor creator feeds"));
}

/// Test that --version displays version and exits with code 0.
#[test]
fn test_binary_version_displays_version() {
    let mut cmd = Command::cargo_bin("feedwatch").unwrap();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("feedwatch"));
}

/// Test that running without a subcommand prints usage and fails.
#[test]
fn test_binary_requires_a_subcommand() {
    let mut cmd = Command::cargo_bin("feedwatch").unwrap();
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

/// Test that invalid flags cause non-zero exit.
#[test]
fn test_binary_invalid_flag_returns_error() {
    let mut cmd = Command::cargo_bin("feedwatch").unwrap();
    cmd.arg("--invalid-flag")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

/// Test that collect --help lists the content type flag.
#[test]
fn test_collect_help_lists_type_flag() {
    let mut cmd = Command::cargo_bin("feedwatch").unwrap();
    cmd.args(["collect", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--type"))
        .stdout(predicate::str::contains("--no-download"));
}

/// Test that an unknown content type is rejected with the valid set listed.
#[test]
fn test_collect_unknown_type_is_rejected() {
    let mut cmd = Command::cargo_bin("feedwatch").unwrap();
    cmd.args(["collect", "sometarget", "--type", "bogus"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("possible values"));
}

/// Test that monitor with a missing config (defaults, zero targets) fails
/// with a pointer at the config file.
#[test]
fn test_monitor_without_targets_fails_with_hint() {
    let dir = tempfile::TempDir::new().unwrap();
    let mut cmd = Command::cargo_bin("feedwatch").unwrap();
    cmd.current_dir(dir.path())
        .args(["monitor", "--config", "absent.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no targets configured"));
}
