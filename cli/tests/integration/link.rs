//! Link-clone integration tests for the iclone CLI.
//!
//! These tests cover:
//! - Symbolic and hard link clones
//! - Keeping `saves` out of a link clone, with and without a separate copy
//! - Preferences files and flag overrides

#![cfg(unix)]

#[path = "../common/mod.rs"]
mod common;

use assert_cmd::cargo::cargo_bin_cmd;
use common::{InstanceFixture, is_symlink};
use std::fs;
use std::os::unix::fs::MetadataExt;

#[test]
fn test_symlink_clone() {
    let fx = InstanceFixture::new();

    cargo_bin_cmd!("iclone")
        .arg("clone")
        .arg(&fx.source)
        .arg(&fx.staging)
        .arg("--link")
        .assert()
        .success();

    let source = fs::canonicalize(&fx.source).unwrap();
    assert!(is_symlink(&fx.staged("options.txt")));
    assert_eq!(
        fs::read_link(fx.staged("mods/a.jar")).unwrap(),
        source.join("mods/a.jar")
    );
    assert_eq!(
        fs::read_link(fx.staged("saves/world1/level.dat")).unwrap(),
        source.join("saves/world1/level.dat")
    );
    // directories are real
    assert!(!is_symlink(&fx.staged("mods")));
    assert!(fx.staged("mods").is_dir());
}

#[test]
fn test_link_clone_settings_are_private() {
    let fx = InstanceFixture::new();

    cargo_bin_cmd!("iclone")
        .arg("clone")
        .arg(&fx.source)
        .arg(&fx.staging)
        .arg("--link")
        .arg("--name")
        .arg("Linked")
        .assert()
        .success();

    assert!(!is_symlink(&fx.staged("instance.cfg")));
    assert_eq!(fx.staged_setting("name").as_deref(), Some("Linked"));
    assert_eq!(fx.source_setting("name").as_deref(), Some("Vanilla"));
    assert_eq!(fx.source_setting("totalTimePlayed").as_deref(), Some("3600"));
}

#[test]
fn test_hard_link_clone() {
    let fx = InstanceFixture::new();

    cargo_bin_cmd!("iclone")
        .arg("clone")
        .arg(&fx.source)
        .arg(&fx.staging)
        .arg("--hard-links")
        .arg("--output")
        .arg("json")
        .assert()
        .success()
        .stdout(predicates::str::contains("\"strategy\":\"hardlink\""));

    let original = fs::metadata(fx.source.join("mods/a.jar")).unwrap();
    let linked = fs::metadata(fx.staged("mods/a.jar")).unwrap();
    assert!(!is_symlink(&fx.staged("mods/a.jar")));
    assert_eq!(original.ino(), linked.ino());
    assert_eq!(fx.source_setting("totalTimePlayed").as_deref(), Some("3600"));
}

#[test]
fn test_saves_copied_separately() {
    let fx = InstanceFixture::new();

    cargo_bin_cmd!("iclone")
        .arg("clone")
        .arg(&fx.source)
        .arg(&fx.staging)
        .arg("--link")
        .arg("--dont-link-saves")
        .arg("--copy-saves")
        .assert()
        .success();

    assert!(is_symlink(&fx.staged("options.txt")));
    let level = fx.staged("saves/world1/level.dat");
    assert!(!is_symlink(&level));
    assert!(!is_symlink(&fx.staged("saves")));
    assert_eq!(fs::read_to_string(&level).unwrap(), "level");

    // writing to the copy's save leaves the original alone
    fs::write(&level, "changed").unwrap();
    assert_eq!(
        fs::read_to_string(fx.source.join("saves/world1/level.dat")).unwrap(),
        "level"
    );
}

#[test]
fn test_dont_link_saves_without_copy() {
    let fx = InstanceFixture::new();

    cargo_bin_cmd!("iclone")
        .arg("clone")
        .arg(&fx.source)
        .arg(&fx.staging)
        .arg("--link")
        .arg("--dont-link-saves")
        .assert()
        .success();

    assert!(is_symlink(&fx.staged("options.txt")));
    assert!(!fx.staged("saves").exists());
}

#[test]
fn test_copy_saves_requires_link_mode() {
    let fx = InstanceFixture::new();

    // saves flags are ignored for a plain copy
    cargo_bin_cmd!("iclone")
        .arg("clone")
        .arg(&fx.source)
        .arg(&fx.staging)
        .arg("--dont-link-saves")
        .arg("--copy-saves")
        .assert()
        .success();

    assert!(!is_symlink(&fx.staged("options.txt")));
    assert!(fx.staged("saves/world1/level.dat").exists());
}

#[test]
fn test_preferences_file() {
    let fx = InstanceFixture::new();
    let prefs = fx.dir.path().join("prefs.json");
    fs::write(
        &prefs,
        r#"{ "use_links": true, "dont_link_saves": true, "copy_saves": true, "keep_playtime": true }"#,
    )
    .unwrap();

    let output = cargo_bin_cmd!("iclone")
        .arg("clone")
        .arg(&fx.source)
        .arg(&fx.staging)
        .arg("--prefs")
        .arg(&prefs)
        .arg("--output")
        .arg("json")
        .output()
        .unwrap();

    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["strategy"], "symlink");
    assert_eq!(value["saves_copied_separately"], true);
    assert_eq!(value["playtime_kept"], true);
    assert!(is_symlink(&fx.staged("mods/a.jar")));
    assert!(!is_symlink(&fx.staged("saves/world1/level.dat")));
    assert_eq!(fx.staged_setting("totalTimePlayed").as_deref(), Some("3600"));
}

#[test]
fn test_flags_override_preferences() {
    let fx = InstanceFixture::new();
    let prefs = fx.dir.path().join("prefs.json");
    fs::write(&prefs, r#"{ "use_links": true, "filter_expression": "^logs" }"#).unwrap();

    cargo_bin_cmd!("iclone")
        .arg("clone")
        .arg(&fx.source)
        .arg(&fx.staging)
        .arg("--prefs")
        .arg(&prefs)
        .arg("--filter")
        .arg("^mods")
        .assert()
        .success();

    assert!(fx.staged("logs/latest.log").exists());
    assert!(!fx.staged("mods").exists());
    assert!(is_symlink(&fx.staged("options.txt")));
}
