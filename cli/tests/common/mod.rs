//! Common test utilities for integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Settings written into every fixture instance.
pub const SETTINGS: &str = "[General]\nname=Vanilla\niconKey=grass\ntotalTimePlayed=3600\nlastTimePlayed=120\n";

/// A source instance and a not-yet-existing staging path next to it.
pub struct InstanceFixture {
    pub dir: TempDir,
    pub source: PathBuf,
    pub staging: PathBuf,
}

impl InstanceFixture {
    /// Create an instance with a settings file, a few top-level files and a
    /// `saves` directory.
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let source = dir.path().join("Vanilla");
        fs::create_dir_all(source.join("saves/world1")).expect("Failed to create saves");
        fs::create_dir_all(source.join("mods")).expect("Failed to create mods");
        fs::create_dir_all(source.join("logs")).expect("Failed to create logs");
        fs::write(source.join("instance.cfg"), SETTINGS).expect("Failed to write settings");
        fs::write(source.join("options.txt"), "fov:70").expect("Failed to write file");
        fs::write(source.join("mods/a.jar"), "jar a").expect("Failed to write file");
        fs::write(source.join("logs/latest.log"), "log").expect("Failed to write file");
        fs::write(source.join("saves/world1/level.dat"), "level").expect("Failed to write file");
        let staging = dir.path().join("staging");
        Self {
            dir,
            source,
            staging,
        }
    }

    /// Path inside the staging directory.
    pub fn staged(&self, relative: &str) -> PathBuf {
        self.staging.join(relative)
    }

    /// Read `key` from the staged settings file.
    pub fn staged_setting(&self, key: &str) -> Option<String> {
        setting(&self.staging, key)
    }

    /// Read `key` from the source settings file.
    pub fn source_setting(&self, key: &str) -> Option<String> {
        setting(&self.source, key)
    }
}

impl Default for InstanceFixture {
    fn default() -> Self {
        Self::new()
    }
}

fn setting(root: &Path, key: &str) -> Option<String> {
    let contents = fs::read_to_string(root.join("instance.cfg")).expect("Failed to read settings");
    contents.lines().find_map(|line| {
        line.split_once('=')
            .filter(|(k, _)| *k == key)
            .map(|(_, v)| v.to_string())
    })
}

/// Whether `path` is a symbolic link (without following it).
pub fn is_symlink(path: &Path) -> bool {
    fs::symlink_metadata(path)
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false)
}
