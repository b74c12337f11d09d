//! Per-entry results of a replication pass.

use crate::elevation::LinkRequest;
use crate::error::{Error, Result};
use std::io;
use std::path::PathBuf;
use std::time::Duration;

/// What was attempted for an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryOperation {
    /// Listing the source root or a source directory
    Read,
    /// Creating a destination directory
    CreateDir,
    /// Copying a regular file
    CopyFile,
    /// Symlinking a regular file to its source
    Symlink,
    /// Hard-linking a regular file to its source
    HardLink,
    /// Recreating a symlink found in the source
    CopySymlink,
}

/// OS-level failure of a single entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryError {
    /// Raw OS error code, `-1` if the error carried none
    pub code: i32,
    /// Human-readable message
    pub message: String,
}

impl From<&io::Error> for EntryError {
    fn from(error: &io::Error) -> Self {
        Self {
            code: crate::error::os_code(error),
            message: error.to_string(),
        }
    }
}

/// Result of one attempted entry.
#[derive(Debug, Clone)]
pub struct EntryResult {
    /// Path relative to the source root (empty for the root itself)
    pub relative_path: PathBuf,
    /// Source path
    pub source: PathBuf,
    /// Destination path
    pub destination: PathBuf,
    /// What was attempted
    pub operation: EntryOperation,
    /// Target written into the link, for symlink operations
    pub link_target: Option<PathBuf>,
    /// Bytes copied (copy operations only)
    pub bytes: u64,
    /// Failure, if any
    pub error: Option<EntryError>,
}

impl EntryResult {
    /// Whether this entry succeeded.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// The symlink this entry tried to create, if it was a symlink operation.
    #[must_use]
    pub fn link_request(&self) -> Option<LinkRequest> {
        match self.operation {
            EntryOperation::Symlink | EntryOperation::CopySymlink => {
                self.link_target.as_ref().map(|target| LinkRequest {
                    target: target.clone(),
                    link: self.destination.clone(),
                })
            }
            _ => None,
        }
    }
}

/// Aggregated result of a replication pass.
///
/// Built while the pass runs and returned once it is over; success is a
/// reduction over all recorded entries rather than a running flag.
#[derive(Debug, Clone, Default)]
pub struct ReplicationOutcome {
    /// Every attempted entry, in walk order
    pub results: Vec<EntryResult>,
    /// The pass stopped early because of cancellation
    pub cancelled: bool,
    /// Wall-clock time of the pass
    pub duration: Duration,
}

/// Counters derived from a successful pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplicationStats {
    /// Regular files copied
    pub files_copied: u64,
    /// Links created (file links and recreated source symlinks)
    pub links_created: u64,
    /// Directories created
    pub dirs_created: u64,
    /// Total bytes copied
    pub bytes_copied: u64,
    /// Duration of the pass
    pub duration: Duration,
}

impl ReplicationOutcome {
    /// True only if the pass ran to completion and no entry failed.
    #[must_use]
    pub fn overall_success(&self) -> bool {
        !self.cancelled && self.results.iter().all(EntryResult::is_ok)
    }

    /// Failed entries, in walk order.
    pub fn failures(&self) -> impl Iterator<Item = &EntryResult> {
        self.results.iter().filter(|r| !r.is_ok())
    }

    /// Symlinks that could not be created, ready for a privileged retry.
    #[must_use]
    pub fn failed_link_requests(&self) -> Vec<LinkRequest> {
        self.failures().filter_map(EntryResult::link_request).collect()
    }

    /// Failures that a privileged link retry cannot fix.
    pub fn non_link_failures(&self) -> impl Iterator<Item = &EntryResult> {
        self.failures().filter(|r| r.link_request().is_none())
    }

    /// Summary counters for the pass.
    #[must_use]
    pub fn stats(&self) -> ReplicationStats {
        let mut stats = ReplicationStats {
            duration: self.duration,
            ..ReplicationStats::default()
        };
        for result in self.results.iter().filter(|r| r.is_ok()) {
            match result.operation {
                EntryOperation::CreateDir => stats.dirs_created += 1,
                EntryOperation::CopyFile => {
                    stats.files_copied += 1;
                    stats.bytes_copied += result.bytes;
                }
                EntryOperation::Symlink
                | EntryOperation::HardLink
                | EntryOperation::CopySymlink => stats.links_created += 1,
                EntryOperation::Read => {}
            }
        }
        stats
    }

    /// Fold the outcome into a single result.
    ///
    /// # Errors
    ///
    /// - [`Error::Cancelled`] if the pass was cancelled
    /// - [`Error::SourceUnreadable`] if the source root could not be read
    /// - [`Error::EntryReplicationFailed`] if any entry failed
    pub fn into_result(self) -> Result<ReplicationStats> {
        if self.cancelled {
            return Err(Error::Cancelled);
        }

        let total = self.results.len();
        let mut failures = self.failures();
        let Some(first) = failures.next() else {
            return Ok(self.stats());
        };

        if first.operation == EntryOperation::Read && first.relative_path.as_os_str().is_empty() {
            let message = first
                .error
                .as_ref()
                .map(|e| e.message.clone())
                .unwrap_or_default();
            let code = first.error.as_ref().map_or(-1, |e| e.code);
            let source = if code >= 0 {
                io::Error::from_raw_os_error(code)
            } else {
                io::Error::other(message)
            };
            return Err(Error::SourceUnreadable {
                path: first.source.clone(),
                source,
            });
        }

        Err(Error::EntryReplicationFailed {
            failed: 1 + failures.count(),
            total,
            path: first.relative_path.clone(),
            code: first.error.as_ref().map_or(-1, |e| e.code),
        })
    }
}
