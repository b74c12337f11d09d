//! Filesystem link creation.
//!
//! Link creation goes through the [`LinkOps`] trait so the replication
//! engine, the privileged link helper and tests can share one code path
//! while swapping the actual filesystem calls.

use crate::utils::path::safe_path;
use std::fs;
use std::io;
use std::path::Path;

use super::utils::symlink;

/// Link-creation primitives used by a replication pass.
pub trait LinkOps: Send + Sync {
    /// Create a symbolic link at `link` pointing to `target`.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the link cannot be created.
    fn symlink(&self, target: &Path, link: &Path) -> io::Result<()>;

    /// Create a hard link at `link` to the existing file `original`.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the link cannot be created.
    fn hard_link(&self, original: &Path, link: &Path) -> io::Result<()>;
}

/// The real filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsLinks;

impl LinkOps for OsLinks {
    fn symlink(&self, target: &Path, link: &Path) -> io::Result<()> {
        symlink(target, &safe_path(link))
    }

    fn hard_link(&self, original: &Path, link: &Path) -> io::Result<()> {
        fs::hard_link(safe_path(original), safe_path(link))
    }
}
