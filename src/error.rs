//! Error types for instclone.
//!
//! This module provides the [`Error`] enum containing all possible errors
//! that can occur while duplicating an instance, the [`ErrorCode`] used for
//! machine-readable reporting, and the [`Result`] type alias.
//!
//! # Error Categories
//!
//! | Category | Errors |
//! |----------|--------|
//! | IO | [`Error::Io`], [`Error::SourceUnreadable`] |
//! | Partial | [`Error::EntryReplicationFailed`], [`Error::SavesReplicationFailed`] |
//! | Elevation | [`Error::ElevationDeclinedOrUnavailable`], [`Error::ElevationPartialFailure`], [`Error::ElevationTimedOut`] |
//! | Task | [`Error::StagingIsSource`], [`Error::StagingPathUnset`], [`Error::AlreadyStarted`], [`Error::Materialize`] |
//! | Input | [`Error::InvalidFilter`], [`Error::Protocol`] |
//! | Control | [`Error::Cancelled`] |

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type for instclone operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Check if an IO error indicates missing privileges for link creation.
///
/// # Platform Support
///
/// | Platform | Error Detection |
/// |----------|-----------------|
/// | Unix | `EPERM` (1), `EACCES` (13) |
/// | Windows | `ERROR_ACCESS_DENIED` (5), `ERROR_PRIVILEGE_NOT_HELD` (1314) |
///
/// # Example
///
/// ```
/// use std::io;
/// use instclone::is_privilege_error;
///
/// let error = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
/// assert!(is_privilege_error(&error));
/// ```
pub fn is_privilege_error(error: &io::Error) -> bool {
    if error.kind() == io::ErrorKind::PermissionDenied {
        return true;
    }

    #[cfg(unix)]
    {
        if let Some(raw_error) = error.raw_os_error() {
            const EPERM: i32 = 1;
            const EACCES: i32 = 13;
            return raw_error == EPERM || raw_error == EACCES;
        }
    }

    #[cfg(windows)]
    {
        if let Some(raw_error) = error.raw_os_error() {
            const ERROR_ACCESS_DENIED: i32 = 5;
            const ERROR_PRIVILEGE_NOT_HELD: i32 = 1314;
            return raw_error == ERROR_ACCESS_DENIED || raw_error == ERROR_PRIVILEGE_NOT_HELD;
        }
    }

    false
}

/// Raw OS code recorded for a failed entry; `-1` when the error has none.
///
/// Errors that wrap another `io::Error` (for example to add a path) are
/// unwrapped until an OS code turns up.
pub(crate) fn os_code(error: &io::Error) -> i32 {
    let mut next: Option<&(dyn std::error::Error + 'static)> = Some(error);
    while let Some(err) = next {
        if let Some(io_err) = err.downcast_ref::<io::Error>() {
            if let Some(code) = io_err.raw_os_error() {
                return code;
            }
            // io::Error::source skips the payload itself
            if let Some(inner) = io_err.get_ref() {
                next = Some(inner);
                continue;
            }
        }
        next = err.source();
    }
    -1
}

/// Stable, machine-readable classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorCode {
    /// Generic IO failure
    IoError,
    /// Source instance root missing or unreadable
    SourceUnreadable,
    /// One or more entries failed to replicate
    PartialReplication,
    /// Elevation was declined, failed to start, or returned nothing
    ElevationUnavailable,
    /// Elevated run reported per-entry failures
    ElevationFailed,
    /// Elevated run did not report back in time
    ElevationTimeout,
    /// Separate saves copy failed
    SavesFailed,
    /// Operation was cancelled
    Cancelled,
    /// Caller supplied invalid input (filter, staging path, state)
    InvalidInput,
    /// Copied instance could not be set up
    Materialize,
    /// Malformed link-helper exchange file
    Protocol,
}

impl ErrorCode {
    /// Snake-case identifier used in JSON output.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::IoError => "io_error",
            Self::SourceUnreadable => "source_unreadable",
            Self::PartialReplication => "partial_replication",
            Self::ElevationUnavailable => "elevation_unavailable",
            Self::ElevationFailed => "elevation_failed",
            Self::ElevationTimeout => "elevation_timeout",
            Self::SavesFailed => "saves_failed",
            Self::Cancelled => "cancelled",
            Self::InvalidInput => "invalid_input",
            Self::Materialize => "materialize",
            Self::Protocol => "protocol",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur while duplicating an instance.
///
/// Per-entry failures never abort a replication pass; they are collected in
/// a [`ReplicationOutcome`](crate::ReplicationOutcome) and only folded into
/// one of these variants once the pass has completed.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// IO error outside of a per-entry operation
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Source root does not exist, is not a directory, or cannot be listed
    #[error("Source is not readable: {path}: {source}")]
    SourceUnreadable {
        /// Source root
        path: PathBuf,
        /// Underlying error
        source: io::Error,
    },

    /// One or more entries failed to copy or link
    #[error("Failed to replicate {failed} of {total} entries (first failure: {path} [os error {code}])")]
    EntryReplicationFailed {
        /// Number of entries that failed
        failed: usize,
        /// Number of entries attempted
        total: usize,
        /// Relative path of the first failed entry
        path: PathBuf,
        /// OS error code of the first failed entry
        code: i32,
    },

    /// The privileged retry produced no results (declined, failed to start)
    #[error("Elevated link creation was declined or is unavailable")]
    ElevationDeclinedOrUnavailable,

    /// The privileged retry ran but some links still failed
    #[error("Elevated link creation failed for {failed} of {total} entries")]
    ElevationPartialFailure {
        /// Number of links that failed in the elevated run
        failed: usize,
        /// Number of links requested
        total: usize,
    },

    /// The privileged retry did not report back before the deadline
    #[error("Elevated link creation did not finish within {0:?}")]
    ElevationTimedOut(Duration),

    /// Copying the separately handled saves directory failed
    #[error("Failed to copy saves: {source}")]
    SavesReplicationFailed {
        /// Why the saves copy failed
        #[source]
        source: Box<Error>,
    },

    /// Operation was cancelled via the cancellation token
    #[error("Operation cancelled")]
    Cancelled,

    /// Filter expression is not a valid regular expression
    #[error("Invalid filter expression {pattern:?}: {source}")]
    InvalidFilter {
        /// The rejected pattern
        pattern: String,
        /// Underlying regex error
        source: regex::Error,
    },

    /// Staging path points at the source instance root
    #[error("Staging path is the source instance root: {0}")]
    StagingIsSource(PathBuf),

    /// Task was executed before a staging path was assigned
    #[error("No staging path set for the copy task")]
    StagingPathUnset,

    /// Task was executed more than once
    #[error("Copy task has already been started")]
    AlreadyStarted,

    /// Copied instance could not be opened or its settings written
    #[error("Failed to set up copied instance at {path}: {source}")]
    Materialize {
        /// Staging path of the copied instance
        path: PathBuf,
        /// Underlying error
        source: io::Error,
    },

    /// Link-helper exchange file is malformed
    #[error("Malformed link request/result file {path}: {source}")]
    Protocol {
        /// Exchange file
        path: PathBuf,
        /// Underlying JSON error
        source: serde_json::Error,
    },
}

impl Error {
    /// Machine-readable classification of this error.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Io(_) => ErrorCode::IoError,
            Self::SourceUnreadable { .. } => ErrorCode::SourceUnreadable,
            Self::EntryReplicationFailed { .. } => ErrorCode::PartialReplication,
            Self::ElevationDeclinedOrUnavailable => ErrorCode::ElevationUnavailable,
            Self::ElevationPartialFailure { .. } => ErrorCode::ElevationFailed,
            Self::ElevationTimedOut(_) => ErrorCode::ElevationTimeout,
            Self::SavesReplicationFailed { .. } => ErrorCode::SavesFailed,
            Self::Cancelled => ErrorCode::Cancelled,
            Self::InvalidFilter { .. }
            | Self::StagingIsSource(_)
            | Self::StagingPathUnset
            | Self::AlreadyStarted => ErrorCode::InvalidInput,
            Self::Materialize { .. } => ErrorCode::Materialize,
            Self::Protocol { .. } => ErrorCode::Protocol,
        }
    }
}
