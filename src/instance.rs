//! Instance handles.
//!
//! The copy task only needs a few things from the surrounding instance
//! model: where the source lives, its name, and a handle on the copy to
//! assign a name and icon and to reset playtime. These are expressed as
//! traits; [`DirInstance`] is a plain directory-backed implementation that
//! keeps its settings in `instance.cfg`.
//!
//! # Settings File
//!
//! `instance.cfg` is a list of `key=value` lines. Recognised keys:
//!
//! | Key | Meaning |
//! |-----|---------|
//! | `name` | Display name |
//! | `iconKey` | Icon identifier |
//! | `totalTimePlayed` | Accumulated playtime in seconds |
//! | `lastTimePlayed` | Duration of the last session in seconds |
//!
//! Every other line is kept verbatim and written back in place.

use crate::error::{Error, Result};
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Settings file inside an instance directory.
pub const SETTINGS_FILE: &str = "instance.cfg";

const KEY_NAME: &str = "name";
const KEY_ICON: &str = "iconKey";
const KEY_TOTAL_TIME: &str = "totalTimePlayed";
const KEY_LAST_TIME: &str = "lastTimePlayed";

/// Read-only view of the instance being copied.
pub trait SourceInstance: Send + Sync {
    /// Root directory of the instance.
    fn instance_root(&self) -> &Path;

    /// Display name.
    fn name(&self) -> &str;
}

/// Mutable handle on an instance, as produced for a finished copy.
pub trait InstanceHandle: Send + fmt::Debug {
    /// Root directory of the instance.
    fn root(&self) -> &Path;

    /// Display name.
    fn name(&self) -> &str;

    /// Change the display name.
    fn set_name(&mut self, name: &str);

    /// Icon identifier.
    fn icon_key(&self) -> &str;

    /// Change the icon identifier.
    fn set_icon_key(&mut self, key: &str);

    /// Accumulated playtime in seconds.
    fn time_played(&self) -> u64;

    /// Zero the playtime counters.
    fn reset_time_played(&mut self);

    /// Persist pending changes.
    ///
    /// # Errors
    ///
    /// Returns the underlying IO error if the settings cannot be written.
    fn save(&self) -> io::Result<()>;
}

/// Turns a populated staging directory into an instance handle.
pub trait InstanceMaterializer: Send + Sync {
    /// Open the instance staged at `staging`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Materialize`] if the instance cannot be opened.
    fn materialize(&self, staging: &Path) -> Result<Box<dyn InstanceHandle>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
    Pair(String, String),
    Other(String),
}

/// Instance stored in a directory, with settings in `instance.cfg`.
#[derive(Debug, Clone)]
pub struct DirInstance {
    root: PathBuf,
    dir_name: String,
    lines: Vec<Line>,
}

impl DirInstance {
    /// Open the instance at `root`.
    ///
    /// A missing settings file yields default settings; the display name
    /// then falls back to the directory name.
    ///
    /// # Errors
    ///
    /// Returns an error if `root` is not a directory or the settings file
    /// exists but cannot be read.
    pub fn open<P: AsRef<Path>>(root: P) -> io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !fs::metadata(&root)?.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotADirectory,
                format!("not a directory: {}", root.display()),
            ));
        }

        let lines = match fs::read_to_string(root.join(SETTINGS_FILE)) {
            Ok(contents) => parse(&contents),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e),
        };
        let dir_name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Self {
            root,
            dir_name,
            lines,
        })
    }

    /// Value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.lines.iter().find_map(|line| match line {
            Line::Pair(k, v) if k == key => Some(v.as_str()),
            _ => None,
        })
    }

    /// Store `value` under `key`, replacing any previous value in place.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        for line in &mut self.lines {
            if let Line::Pair(k, v) = line {
                if *k == key {
                    *v = value;
                    return;
                }
            }
        }
        self.lines.push(Line::Pair(key.to_string(), value));
    }
}

fn parse(contents: &str) -> Vec<Line> {
    contents
        .lines()
        .map(|raw| match raw.split_once('=') {
            Some((key, value)) if !raw.starts_with(['#', ';', '[']) && !key.trim().is_empty() => {
                Line::Pair(key.trim().to_string(), value.to_string())
            }
            _ => Line::Other(raw.to_string()),
        })
        .collect()
}

impl SourceInstance for DirInstance {
    fn instance_root(&self) -> &Path {
        &self.root
    }

    fn name(&self) -> &str {
        InstanceHandle::name(self)
    }
}

impl InstanceHandle for DirInstance {
    fn root(&self) -> &Path {
        &self.root
    }

    fn name(&self) -> &str {
        self.get(KEY_NAME).unwrap_or(self.dir_name.as_str())
    }

    fn set_name(&mut self, name: &str) {
        self.set(KEY_NAME, name);
    }

    fn icon_key(&self) -> &str {
        self.get(KEY_ICON).unwrap_or("default")
    }

    fn set_icon_key(&mut self, key: &str) {
        self.set(KEY_ICON, key);
    }

    fn time_played(&self) -> u64 {
        self.get(KEY_TOTAL_TIME)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0)
    }

    fn reset_time_played(&mut self) {
        self.set(KEY_TOTAL_TIME, "0");
        self.set(KEY_LAST_TIME, "0");
    }

    fn save(&self) -> io::Result<()> {
        let mut temp = tempfile::NamedTempFile::new_in(&self.root)?;
        for line in &self.lines {
            match line {
                Line::Pair(key, value) => writeln!(temp, "{key}={value}")?,
                Line::Other(raw) => writeln!(temp, "{raw}")?,
            }
        }
        temp.as_file().sync_all()?;
        temp.persist(self.root.join(SETTINGS_FILE))
            .map_err(|e| e.error)?;
        Ok(())
    }
}

/// Materializer producing [`DirInstance`] handles.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirMaterializer;

impl InstanceMaterializer for DirMaterializer {
    fn materialize(&self, staging: &Path) -> Result<Box<dyn InstanceHandle>> {
        DirInstance::open(staging)
            .map(|instance| Box::new(instance) as Box<dyn InstanceHandle>)
            .map_err(|source| Error::Materialize {
                path: staging.to_path_buf(),
                source,
            })
    }
}
