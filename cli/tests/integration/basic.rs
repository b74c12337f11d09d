//! Basic copy integration tests for the iclone CLI.

#[path = "../common/mod.rs"]
mod common;

use assert_cmd::cargo::cargo_bin_cmd;
use common::{InstanceFixture, is_symlink};
use predicates::prelude::*;
use std::fs;

#[test]
fn test_clone_copies_instance() {
    let fx = InstanceFixture::new();

    let mut cmd = cargo_bin_cmd!("iclone");
    cmd.arg("clone")
        .arg(&fx.source)
        .arg(&fx.staging)
        .arg("--name")
        .arg("Vanilla (copy)")
        .assert()
        .success()
        .stderr(predicate::str::contains("Copying instance Vanilla"))
        .stdout(predicate::str::contains("Created \"Vanilla (copy)\""));

    assert_eq!(fs::read_to_string(fx.staged("options.txt")).unwrap(), "fov:70");
    assert_eq!(fs::read_to_string(fx.staged("mods/a.jar")).unwrap(), "jar a");
    assert_eq!(
        fs::read_to_string(fx.staged("saves/world1/level.dat")).unwrap(),
        "level"
    );
    assert!(!is_symlink(&fx.staged("options.txt")));

    assert_eq!(fx.staged_setting("name").as_deref(), Some("Vanilla (copy)"));
    assert_eq!(fx.staged_setting("iconKey").as_deref(), Some("default"));
    assert_eq!(fx.staged_setting("totalTimePlayed").as_deref(), Some("0"));
    assert_eq!(fx.staged_setting("lastTimePlayed").as_deref(), Some("0"));
}

#[test]
fn test_clone_leaves_source_untouched() {
    let fx = InstanceFixture::new();

    cargo_bin_cmd!("iclone")
        .arg("clone")
        .arg(&fx.source)
        .arg(&fx.staging)
        .assert()
        .success();

    assert_eq!(
        fs::read_to_string(fx.source.join("instance.cfg")).unwrap(),
        common::SETTINGS
    );
    // name defaults to the original's
    assert_eq!(fx.staged_setting("name").as_deref(), Some("Vanilla"));
}

#[test]
fn test_keep_playtime_and_icon() {
    let fx = InstanceFixture::new();

    cargo_bin_cmd!("iclone")
        .arg("clone")
        .arg(&fx.source)
        .arg(&fx.staging)
        .arg("--keep-playtime")
        .arg("--icon")
        .arg("diamond")
        .assert()
        .success();

    assert_eq!(fx.staged_setting("totalTimePlayed").as_deref(), Some("3600"));
    assert_eq!(fx.staged_setting("lastTimePlayed").as_deref(), Some("120"));
    assert_eq!(fx.staged_setting("iconKey").as_deref(), Some("diamond"));
}

#[test]
fn test_filter_excludes_matches() {
    let fx = InstanceFixture::new();

    cargo_bin_cmd!("iclone")
        .arg("clone")
        .arg(&fx.source)
        .arg(&fx.staging)
        .arg("--filter")
        .arg("^LOGS")
        .assert()
        .success();

    // case-insensitive
    assert!(!fx.staged("logs").exists());
    assert!(fx.staged("mods/a.jar").exists());
    assert!(fx.staged("instance.cfg").exists());
}

#[test]
fn test_filter_include_mode() {
    let fx = InstanceFixture::new();

    cargo_bin_cmd!("iclone")
        .arg("clone")
        .arg(&fx.source)
        .arg(&fx.staging)
        .arg("--filter")
        .arg(r"^(instance\.cfg|mods(/.*)?)$")
        .arg("--include")
        .assert()
        .success();

    assert!(fx.staged("instance.cfg").exists());
    assert!(fx.staged("mods/a.jar").exists());
    assert!(!fx.staged("options.txt").exists());
    assert!(!fx.staged("saves").exists());
}

#[test]
fn test_json_output() {
    let fx = InstanceFixture::new();

    let output = cargo_bin_cmd!("iclone")
        .arg("clone")
        .arg(&fx.source)
        .arg(&fx.staging)
        .arg("--name")
        .arg("Json")
        .arg("--output")
        .arg("json")
        .output()
        .unwrap();

    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["status"], "succeeded");
    assert_eq!(value["name"], "Json");
    assert_eq!(value["strategy"], "copy");
    assert_eq!(value["saves_copied_separately"], false);
    assert!(value["duration_ms"].is_u64());
    // the status line is only printed for humans
    assert!(
        !String::from_utf8_lossy(&output.stderr).contains("Copying instance"),
        "unexpected stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

#[test]
fn test_parallel_jobs() {
    let fx = InstanceFixture::new();
    for i in 0..32 {
        fs::write(fx.source.join(format!("mods/extra{i}.jar")), format!("{i}")).unwrap();
    }

    cargo_bin_cmd!("iclone")
        .arg("clone")
        .arg(&fx.source)
        .arg(&fx.staging)
        .arg("-j")
        .arg("1")
        .assert()
        .success();

    for i in 0..32 {
        assert_eq!(
            fs::read_to_string(fx.staged(&format!("mods/extra{i}.jar"))).unwrap(),
            format!("{i}")
        );
    }
}

#[test]
fn test_help_hides_link_helper() {
    cargo_bin_cmd!("iclone")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("clone"))
        .stdout(predicate::str::contains("link-helper").not());
}
