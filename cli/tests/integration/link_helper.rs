//! Integration tests for the hidden `link-helper` subcommand, the process
//! that creates links on behalf of an unprivileged clone.

#![cfg(unix)]

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::{Value, json};
use std::fs;
use tempfile::TempDir;

fn write_requests(dir: &TempDir, requests: Value) -> std::path::PathBuf {
    let path = dir.path().join("requests.json");
    let body = json!({ "version": 1, "requests": requests });
    fs::write(&path, body.to_string()).unwrap();
    path
}

#[test]
fn test_helper_creates_links_and_reports() {
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("options.txt");
    fs::write(&target, "fov:70").unwrap();
    let link = dir.path().join("options-link.txt");
    let orphan = dir.path().join("missing-dir/link.txt");
    let requests = write_requests(
        &dir,
        json!([
            { "target": target, "link": link },
            { "target": target, "link": orphan },
        ]),
    );
    let results = dir.path().join("results.json");

    cargo_bin_cmd!("iclone")
        .arg("link-helper")
        .arg("--requests")
        .arg(&requests)
        .arg("--results")
        .arg(&results)
        .assert()
        .success();

    assert_eq!(fs::read_link(&link).unwrap(), target);
    let value: Value = serde_json::from_str(&fs::read_to_string(&results).unwrap()).unwrap();
    assert_eq!(value["version"], 1);
    let entries = value["results"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["code"], 0);
    // ENOENT for the link inside a missing directory
    assert_eq!(entries[1]["code"], 2);
    assert!(!entries[1]["message"].as_str().unwrap().is_empty());
}

#[test]
fn test_helper_rejects_other_version() {
    let dir = TempDir::new().unwrap();
    let requests = dir.path().join("requests.json");
    fs::write(&requests, r#"{ "version": 99, "requests": [] }"#).unwrap();
    let results = dir.path().join("results.json");

    cargo_bin_cmd!("iclone")
        .arg("link-helper")
        .arg("--requests")
        .arg(&requests)
        .arg("--results")
        .arg(&results)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("error[protocol]"));

    assert!(!results.exists());
}

#[test]
fn test_helper_missing_request_file() {
    let dir = TempDir::new().unwrap();

    cargo_bin_cmd!("iclone")
        .arg("link-helper")
        .arg("--requests")
        .arg(dir.path().join("nope.json"))
        .arg("--results")
        .arg(dir.path().join("results.json"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("error[io_error]"));
}

#[test]
fn test_clone_with_elevation_command_when_links_work() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("Vanilla");
    fs::create_dir(&source).unwrap();
    fs::write(source.join("options.txt"), "fov:70").unwrap();
    let staging = dir.path().join("staging");

    // links succeed unprivileged here, so the elevation command never runs
    cargo_bin_cmd!("iclone")
        .arg("clone")
        .arg(&source)
        .arg(&staging)
        .arg("--link")
        .arg("--elevate-with")
        .arg("false")
        .assert()
        .success();

    assert!(
        fs::symlink_metadata(staging.join("options.txt"))
            .unwrap()
            .file_type()
            .is_symlink()
    );
}
