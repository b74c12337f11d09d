//! Replication requests and copy preferences.
//!
//! [`ReplicationRequest`] describes one replication pass over a directory
//! tree. [`CopyPreferences`] is the user-facing snapshot an
//! [`InstanceCopyTask`](crate::InstanceCopyTask) is built from.
//!
//! # Example
//!
//! ```
//! use instclone::{ReplicationRequest, Strategy};
//!
//! let request = ReplicationRequest::new("instances/vanilla", "instances/.tmp-copy")
//!     .with_strategy(Strategy::Link)
//!     .with_hard_links()
//!     .with_parallel(4);
//! assert!(request.use_hard_links);
//! ```

use crate::filter::{FilterMode, PathFilter};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// How regular files are replicated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    /// Duplicate file contents and base metadata (default).
    #[default]
    Copy,
    /// Create a filesystem link to each source file.
    ///
    /// Symbolic links by default, hard links with
    /// [`ReplicationRequest::use_hard_links`].
    Link,
}

/// One replication pass from `source_root` to `destination_root`.
///
/// Symbolic links found in the source are never followed, whatever the
/// strategy: they are recreated as links with the same target.
///
/// # Default Values
///
/// | Field | Default | Description |
/// |-------|---------|-------------|
/// | `strategy` | `Copy` | Duplicate bytes |
/// | `use_hard_links` | `false` | Symlinks under `Link` |
/// | `filter` | `None` | Every path passes |
/// | `excluded_subtrees` | empty | Nothing pruned |
/// | `parallel` | 8 | Concurrent file operations |
/// | `fsync` | `true` | Sync copied files |
/// | `preserve_permissions` | `true` | Copy file/dir permissions |
/// | `preserve_timestamps` | `true` | Copy mtime/atime |
#[derive(Debug, Clone)]
#[allow(clippy::struct_excessive_bools)]
pub struct ReplicationRequest {
    /// Root of the tree to replicate
    pub source_root: PathBuf,

    /// Root of the tree to produce (created if missing)
    pub destination_root: PathBuf,

    /// Optional relative-path filter
    pub filter: Option<PathFilter>,

    /// Copy or link regular files
    pub strategy: Strategy,

    /// Create hard links instead of symlinks under [`Strategy::Link`]
    pub use_hard_links: bool,

    /// Relative subtrees skipped entirely, independent of `filter`
    pub excluded_subtrees: Vec<PathBuf>,

    /// Number of parallel file operations (default: 8)
    pub parallel: usize,

    /// Whether to sync copied files to disk (default: true)
    pub fsync: bool,

    /// Whether to preserve file and directory permissions (default: true)
    pub preserve_permissions: bool,

    /// Whether to preserve file timestamps (default: true)
    pub preserve_timestamps: bool,

    /// Cooperative cancellation flag
    pub cancel_token: Option<Arc<AtomicBool>>,
}

impl ReplicationRequest {
    /// Create a copy request with default tunables.
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(source_root: P, destination_root: Q) -> Self {
        Self {
            source_root: source_root.as_ref().to_path_buf(),
            destination_root: destination_root.as_ref().to_path_buf(),
            filter: None,
            strategy: Strategy::Copy,
            use_hard_links: false,
            excluded_subtrees: Vec::new(),
            parallel: 8,
            fsync: true,
            preserve_permissions: true,
            preserve_timestamps: true,
            cancel_token: None,
        }
    }

    /// Set the replication strategy
    #[must_use]
    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Use hard links under [`Strategy::Link`]
    #[must_use]
    pub fn with_hard_links(mut self) -> Self {
        self.use_hard_links = true;
        self
    }

    /// Set (or clear) the path filter
    #[must_use]
    pub fn with_filter(mut self, filter: Option<PathFilter>) -> Self {
        self.filter = filter;
        self
    }

    /// Skip a relative subtree entirely
    #[must_use]
    pub fn excluding<P: AsRef<Path>>(mut self, relative: P) -> Self {
        self.excluded_subtrees.push(relative.as_ref().to_path_buf());
        self
    }

    /// Set the number of parallel operations
    ///
    /// Value is clamped to at least 1.
    #[must_use]
    pub fn with_parallel(mut self, n: usize) -> Self {
        self.parallel = n.max(1);
        self
    }

    /// Disable fsync for faster (but less durable) copies
    #[must_use]
    pub fn without_fsync(mut self) -> Self {
        self.fsync = false;
        self
    }

    /// Disable timestamp preservation
    #[must_use]
    pub fn without_timestamps(mut self) -> Self {
        self.preserve_timestamps = false;
        self
    }

    /// Disable permission preservation
    #[must_use]
    pub fn without_permissions(mut self) -> Self {
        self.preserve_permissions = false;
        self
    }

    /// Attach a cancellation flag
    ///
    /// Setting the flag stops the pass before the next entry is processed.
    #[must_use]
    pub fn with_cancel_token(mut self, token: Arc<AtomicBool>) -> Self {
        self.cancel_token = Some(token);
        self
    }

    /// Same tunables and cancellation, different roots, no filtering.
    pub(crate) fn derive<P: AsRef<Path>, Q: AsRef<Path>>(&self, source: P, destination: Q) -> Self {
        Self {
            source_root: source.as_ref().to_path_buf(),
            destination_root: destination.as_ref().to_path_buf(),
            filter: None,
            strategy: Strategy::Copy,
            use_hard_links: false,
            excluded_subtrees: Vec::new(),
            parallel: self.parallel,
            fsync: self.fsync,
            preserve_permissions: self.preserve_permissions,
            preserve_timestamps: self.preserve_timestamps,
            cancel_token: self.cancel_token.clone(),
        }
    }

    #[inline]
    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel_token
            .as_ref()
            .is_some_and(|token| token.load(Ordering::Relaxed))
    }

    /// Whether `relative` lies inside one of the excluded subtrees.
    pub(crate) fn is_excluded(&self, relative: &Path) -> bool {
        self.excluded_subtrees
            .iter()
            .any(|excluded| relative.starts_with(excluded))
    }
}

/// User preferences captured when a copy task is created.
///
/// Serialised field names follow the launcher's settings keys in
/// snake_case, so a preferences file looks like:
///
/// ```json
/// { "use_links": true, "dont_link_saves": true, "copy_saves": true }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
#[allow(clippy::struct_excessive_bools)]
pub struct CopyPreferences {
    /// Keep the accumulated playtime on the copy
    pub keep_playtime: bool,

    /// Filter expression; empty means no filtering
    pub filter_expression: String,

    /// How `filter_expression` is applied (default: exclude matches)
    pub filter_mode: FilterMode,

    /// Link files instead of copying them
    pub use_links: bool,

    /// Use hard links rather than symlinks when linking
    pub use_hard_links: bool,

    /// Keep the `saves` directory out of the link pass
    pub dont_link_saves: bool,

    /// Copy the `saves` directory separately when it is not linked
    pub copy_saves: bool,

    /// Parallel file operations per pass
    pub parallel: usize,

    /// Upper bound for the elevated link run, in seconds (`None` waits forever)
    pub elevation_timeout_secs: Option<u64>,
}

impl Default for CopyPreferences {
    fn default() -> Self {
        Self {
            keep_playtime: false,
            filter_expression: String::new(),
            filter_mode: FilterMode::Exclude,
            use_links: false,
            use_hard_links: false,
            dont_link_saves: false,
            copy_saves: false,
            parallel: 8,
            elevation_timeout_secs: Some(300),
        }
    }
}

impl CopyPreferences {
    /// Saves are copied on their own, never linked.
    ///
    /// Only meaningful together with [`CopyPreferences::use_links`].
    #[must_use]
    pub fn copy_saves_separately(&self) -> bool {
        self.dont_link_saves && self.copy_saves
    }

    /// Elevation wait bound as a [`Duration`].
    #[must_use]
    pub fn elevation_timeout(&self) -> Option<Duration> {
        self.elevation_timeout_secs.map(Duration::from_secs)
    }
}
