//! Long path support on Windows.
//!
//! Windows limits ordinary paths to 260 characters (`MAX_PATH`). Deep
//! instance trees (mod caches, world region files) easily exceed that once
//! nested under a staging directory, so every filesystem call that creates
//! something goes through [`safe_path`], which switches to the `\\?\`
//! extended-length form on Windows and is a no-op elsewhere.

use std::path::{Path, PathBuf};

/// Convert a path to extended-length form on Windows.
///
/// | Input | Output |
/// |-------|--------|
/// | `C:\path` | `\\?\C:\path` |
/// | `\\server\share\path` | `\\?\UNC\server\share\path` |
/// | `\\?\C:\path` | unchanged |
/// | relative | resolved against the current directory, then prefixed |
#[cfg(windows)]
pub(crate) fn to_extended_length_path(path: &Path) -> PathBuf {
    let path_str = path.as_os_str().to_string_lossy();
    if path_str.starts_with(r"\\?\") {
        return path.to_path_buf();
    }

    if let Some(unc) = path_str.strip_prefix(r"\\") {
        return PathBuf::from(format!(r"\\?\UNC\{unc}"));
    }

    let absolute_path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        match std::fs::canonicalize(path) {
            Ok(canonical) => return canonical,
            Err(_) => match std::env::current_dir() {
                Ok(cwd) => cwd.join(path),
                Err(_) => path.to_path_buf(),
            },
        }
    };

    PathBuf::from(format!(r"\\?\{}", absolute_path.display()))
}

/// No-op outside Windows.
#[cfg(not(windows))]
pub(crate) fn to_extended_length_path(path: &Path) -> PathBuf {
    path.to_path_buf()
}

/// Path to hand to filesystem calls that create or open entries.
#[inline]
pub(crate) fn safe_path(path: &Path) -> PathBuf {
    to_extended_length_path(path)
}
