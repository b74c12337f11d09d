//! Error handling integration tests for the iclone CLI.
//!
//! These tests verify:
//! - Input validation exits with status 2 before anything is written
//! - Machine-readable failure output
//! - Error codes in human output

#[path = "../common/mod.rs"]
mod common;

use assert_cmd::cargo::cargo_bin_cmd;
use common::InstanceFixture;
use predicates::prelude::*;
use std::fs;

#[test]
fn test_missing_source() {
    let fx = InstanceFixture::new();

    cargo_bin_cmd!("iclone")
        .arg("clone")
        .arg(fx.dir.path().join("missing"))
        .arg(&fx.staging)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("error[invalid_input]"))
        .stderr(predicate::str::contains("Cannot open source instance"));

    assert!(!fx.staging.exists());
}

#[test]
fn test_source_is_a_file() {
    let fx = InstanceFixture::new();

    cargo_bin_cmd!("iclone")
        .arg("clone")
        .arg(fx.source.join("options.txt"))
        .arg(&fx.staging)
        .assert()
        .code(2);

    assert!(!fx.staging.exists());
}

#[test]
fn test_staging_already_exists() {
    let fx = InstanceFixture::new();
    fs::create_dir(&fx.staging).unwrap();
    fs::write(fx.staging.join("keep.txt"), "keep").unwrap();

    cargo_bin_cmd!("iclone")
        .arg("clone")
        .arg(&fx.source)
        .arg(&fx.staging)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("already exists"));

    assert_eq!(fs::read_to_string(fx.staging.join("keep.txt")).unwrap(), "keep");
    assert!(!fx.staging.join("options.txt").exists());
}

#[test]
fn test_invalid_filter() {
    let fx = InstanceFixture::new();

    cargo_bin_cmd!("iclone")
        .arg("clone")
        .arg(&fx.source)
        .arg(&fx.staging)
        .arg("--filter")
        .arg("(unclosed")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Invalid filter expression"));

    assert!(!fx.staging.exists());
}

#[test]
fn test_include_requires_filter() {
    let fx = InstanceFixture::new();

    cargo_bin_cmd!("iclone")
        .arg("clone")
        .arg(&fx.source)
        .arg(&fx.staging)
        .arg("--include")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--filter"));
}

#[test]
fn test_malformed_preferences() {
    let fx = InstanceFixture::new();
    let prefs = fx.dir.path().join("prefs.json");
    fs::write(&prefs, "{ not json").unwrap();

    cargo_bin_cmd!("iclone")
        .arg("clone")
        .arg(&fx.source)
        .arg(&fx.staging)
        .arg("--prefs")
        .arg(&prefs)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Invalid preferences file"));
}

#[test]
fn test_missing_preferences_file() {
    let fx = InstanceFixture::new();

    cargo_bin_cmd!("iclone")
        .arg("clone")
        .arg(&fx.source)
        .arg(&fx.staging)
        .arg("--prefs")
        .arg(fx.dir.path().join("nope.json"))
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Failed to read preferences"));
}

#[test]
fn test_json_failure_output() {
    let fx = InstanceFixture::new();

    let output = cargo_bin_cmd!("iclone")
        .arg("clone")
        .arg(fx.dir.path().join("missing"))
        .arg(&fx.staging)
        .arg("--output")
        .arg("json")
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(2));
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["status"], "failed");
    assert_eq!(value["error_code"], "invalid_input");
    assert!(
        value["message"]
            .as_str()
            .unwrap()
            .contains("Cannot open source instance")
    );
}

#[test]
fn test_empty_elevation_command() {
    let fx = InstanceFixture::new();

    cargo_bin_cmd!("iclone")
        .arg("clone")
        .arg(&fx.source)
        .arg(&fx.staging)
        .arg("--link")
        .arg("--elevate-with")
        .arg("   ")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--elevate-with needs a command"));
}

#[test]
fn test_invalid_log_filter_env() {
    let fx = InstanceFixture::new();

    cargo_bin_cmd!("iclone")
        .env("ICLONE_LOG", "instclone=notalevel")
        .arg("clone")
        .arg(&fx.source)
        .arg(&fx.staging)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("ICLONE_LOG"));
}
