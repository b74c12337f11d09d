//! # instclone
//!
//! Duplicate a self-contained application instance (a directory tree with a
//! settings file and data directories such as `saves`) into a fresh staging
//! directory, in the background.
//!
//! ## Core Features
//!
//! - **Copy or link**: deep copy, or a clone made of symbolic or hard links
//!   to the original files
//! - **Path filter**: case-insensitive regular expression over relative paths
//! - **Private saves**: `saves` can be kept out of a link clone and copied on
//!   its own, so save data is never shared between instances
//! - **Elevated retry**: where symlinks need elevation, failed links are
//!   retried once in a privileged helper process
//! - **Complete diagnostics**: every entry is attempted; failures are
//!   collected per entry with their OS error code
//! - **Atomic writes**: files are written to a temp file and renamed into
//!   place with `persist_noclobber`
//! - **Symlink safe**: symlinks inside the source are recreated, never followed
//! - **Parallel**: file work in a pass runs on a rayon pool
//!
//! ## Copy Task
//!
//! ```no_run
//! use instclone::{CopyPreferences, DirInstance, InstanceCopyTask, LogReporter, TaskState};
//! use std::sync::Arc;
//!
//! let original = Arc::new(DirInstance::open("instances/vanilla")?);
//! let prefs = CopyPreferences {
//!     filter_expression: "^logs/".to_string(),
//!     ..CopyPreferences::default()
//! };
//!
//! let mut task = InstanceCopyTask::new(original, &prefs)?;
//! task.set_staging_path("instances/vanilla-copy")?;
//! task.execute(Arc::new(LogReporter))?;
//!
//! match task.wait() {
//!     TaskState::Succeeded => println!("copied"),
//!     state => println!("{state:?}: {:?}", task.last_error()),
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Single Pass
//!
//! [`replicate`] runs one pass without the task machinery:
//!
//! ```no_run
//! use instclone::{ReplicationRequest, replicate};
//!
//! let outcome = replicate(&ReplicationRequest::new("instances/vanilla", "/tmp/vanilla"));
//! let stats = outcome.into_result()?;
//! println!("Copied {} files ({} bytes)", stats.files_copied, stats.bytes_copied);
//! # Ok::<(), instclone::Error>(())
//! ```
//!
//! ## Safety Guarantees
//!
//! - The source tree is never modified
//! - Existing destination files are never overwritten
//! - Symlinks are never followed during traversal
//! - A cancelled or failed task never sets up the copied instance

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod elevation;
mod error;
mod filter;
mod instance;
mod options;
mod outcome;
mod replicate;
mod saves;
mod task;
mod utils;

#[cfg(windows)]
mod win_attrs;

pub use elevation::{
    CommandElevator, ElevationLauncher, ElevationWait, Elevator, EscalatedOutcome,
    LinkCapability, LinkRequest, LinkResult, escalate_and_retry, run_link_helper,
};
pub use error::{Error, ErrorCode, Result, is_privilege_error};
pub use filter::{FilterMode, PathFilter};
pub use instance::{
    DirInstance, DirMaterializer, InstanceHandle, InstanceMaterializer, SETTINGS_FILE,
    SourceInstance,
};
pub use options::{CopyPreferences, ReplicationRequest, Strategy};
pub use outcome::{EntryError, EntryOperation, EntryResult, ReplicationOutcome, ReplicationStats};
pub use replicate::{LinkOps, OsLinks, replicate, replicate_with};
pub use saves::{SAVES_DIR, copy_saves};
pub use task::{
    ABORTED_MESSAGE, DEFAULT_ICON_KEY, FAILED_MESSAGE, InstanceCopyTask, LogReporter,
    TaskReporter, TaskState,
};
