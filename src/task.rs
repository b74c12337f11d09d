//! The instance copy task.
//!
//! An [`InstanceCopyTask`] moves through
//!
//! ```text
//! Idle ──execute──▶ Running ──▶ Succeeded | Failed | Aborted
//! ```
//!
//! and never leaves a terminal state. [`InstanceCopyTask::execute`] hands
//! the whole replication sequence to a background job and returns at once;
//! [`InstanceCopyTask::wait`] or [`InstanceCopyTask::try_finish`] collect
//! the result and, on success, set up the copied instance.
//!
//! # Replication Sequence
//!
//! | Preferences | Sequence |
//! |-------------|----------|
//! | copy | one filtered copy pass |
//! | link | link pass; on failure at most one elevated retry of the failed symlinks |
//! | link + split saves | as link, `saves` excluded from the link pass and copied afterwards |
//!
//! The elevated retry only happens when the task's [`LinkCapability`] has a
//! fallback and hard links were not requested. Any other failed link pass is
//! final.

use crate::elevation::{ElevationWait, LinkCapability, escalate_and_retry};
use crate::error::{Error, Result};
use crate::filter::PathFilter;
use crate::instance::{DirMaterializer, InstanceHandle, InstanceMaterializer, SourceInstance};
use crate::options::{CopyPreferences, ReplicationRequest, Strategy};
use crate::replicate::{LinkOps, OsLinks, replicate_with};
use crate::saves::{copy_saves, resolve_saves_dir};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use tracing::{debug, error, info};

/// Message reported when the copy fails.
pub const FAILED_MESSAGE: &str = "Instance folder copy failed.";

/// Message reported when the copy is cancelled.
pub const ABORTED_MESSAGE: &str = "Instance folder copy has been aborted.";

/// Icon assigned to the copy unless another one is set.
pub const DEFAULT_ICON_KEY: &str = "default";

/// Lifecycle state of a copy task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Created, not started
    Idle,
    /// Background job in flight
    Running,
    /// Copy finished and the new instance is set up
    Succeeded,
    /// Copy or setup failed
    Failed,
    /// Copy was cancelled
    Aborted,
}

impl TaskState {
    /// Whether the task has finished.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Aborted)
    }
}

/// Receives status and completion notifications of a task.
pub trait TaskReporter: Send + Sync {
    /// Human-readable description of what the task is doing.
    fn set_status(&self, status: &str);

    /// The task succeeded.
    fn emit_succeeded(&self);

    /// The task failed or was aborted.
    fn emit_failed(&self, message: &str);
}

/// Reporter that forwards everything to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl TaskReporter for LogReporter {
    fn set_status(&self, status: &str) {
        info!(status, "copy task status");
    }

    fn emit_succeeded(&self) {
        info!("copy task succeeded");
    }

    fn emit_failed(&self, message: &str) {
        error!(message, "copy task failed");
    }
}

/// Duplicates an instance into a staging directory.
///
/// # Example
///
/// ```no_run
/// use instclone::{CopyPreferences, DirInstance, InstanceCopyTask, LogReporter, TaskState};
/// use std::sync::Arc;
///
/// let original = Arc::new(DirInstance::open("instances/vanilla")?);
/// let prefs = CopyPreferences {
///     use_links: true,
///     dont_link_saves: true,
///     copy_saves: true,
///     ..CopyPreferences::default()
/// };
///
/// let mut task = InstanceCopyTask::new(original, &prefs)?;
/// task.set_staging_path("instances/vanilla-2")?;
/// task.set_name("Vanilla 2");
/// task.execute(Arc::new(LogReporter))?;
///
/// if task.wait() == TaskState::Succeeded {
///     let copy = task.take_instance();
/// }
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct InstanceCopyTask {
    original: Arc<dyn SourceInstance>,
    prefs: CopyPreferences,
    filter: Option<PathFilter>,
    staging: Option<PathBuf>,
    name: String,
    icon_key: String,
    capability: LinkCapability,
    links: Arc<dyn LinkOps>,
    materializer: Arc<dyn InstanceMaterializer>,
    cancel: Arc<AtomicBool>,
    state: TaskState,
    pending: Option<(Receiver<Result<()>>, Arc<dyn TaskReporter>)>,
    last_error: Option<Error>,
    instance: Option<Box<dyn InstanceHandle>>,
}

impl InstanceCopyTask {
    /// Prepare a copy of `original` with a snapshot of `prefs`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFilter`] if the filter expression does not
    /// compile.
    pub fn new(original: Arc<dyn SourceInstance>, prefs: &CopyPreferences) -> Result<Self> {
        let filter = PathFilter::new(&prefs.filter_expression, prefs.filter_mode)?;
        Ok(Self {
            name: original.name().to_string(),
            original,
            prefs: prefs.clone(),
            filter,
            staging: None,
            icon_key: DEFAULT_ICON_KEY.to_string(),
            capability: LinkCapability::AttemptLink,
            links: Arc::new(OsLinks),
            materializer: Arc::new(DirMaterializer),
            cancel: Arc::new(AtomicBool::new(false)),
            state: TaskState::Idle,
            pending: None,
            last_error: None,
            instance: None,
        })
    }

    /// Set the directory the copy is written to.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StagingIsSource`] if `path` is the source instance
    /// root.
    pub fn set_staging_path<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        if same_location(path, self.original.instance_root()) {
            return Err(Error::StagingIsSource(path.to_path_buf()));
        }
        self.staging = Some(path.to_path_buf());
        Ok(())
    }

    /// Name given to the copy (defaults to the original's name).
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Icon given to the copy (defaults to `"default"`).
    pub fn set_icon_key(&mut self, key: impl Into<String>) {
        self.icon_key = key.into();
    }

    /// What happens after a failed link pass.
    #[must_use]
    pub fn with_capability(mut self, capability: LinkCapability) -> Self {
        self.capability = capability;
        self
    }

    /// Link primitives used by link passes.
    #[must_use]
    pub fn with_links(mut self, links: Arc<dyn LinkOps>) -> Self {
        self.links = links;
        self
    }

    /// How the finished staging directory becomes an instance.
    #[must_use]
    pub fn with_materializer(mut self, materializer: Arc<dyn InstanceMaterializer>) -> Self {
        self.materializer = materializer;
        self
    }

    /// Flag that cancels the task when raised, from any thread.
    #[must_use]
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> TaskState {
        self.state
    }

    /// Why the task failed or was aborted.
    #[must_use]
    pub fn last_error(&self) -> Option<&Error> {
        self.last_error.as_ref()
    }

    /// The copied instance, once the task has succeeded.
    pub fn take_instance(&mut self) -> Option<Box<dyn InstanceHandle>> {
        self.instance.take()
    }

    /// Start the copy in the background.
    ///
    /// Publishes a status line through `reporter`, then returns without
    /// waiting for the copy.
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyStarted`] if the task is not idle
    /// - [`Error::StagingPathUnset`] if no staging path was set
    /// - [`Error::StagingIsSource`] if the staging path is the source root
    pub fn execute(&mut self, reporter: Arc<dyn TaskReporter>) -> Result<()> {
        if self.state != TaskState::Idle {
            return Err(Error::AlreadyStarted);
        }
        let staging = self.staging.clone().ok_or(Error::StagingPathUnset)?;
        if same_location(&staging, self.original.instance_root()) {
            return Err(Error::StagingIsSource(staging));
        }

        reporter.set_status(&format!("Copying instance {}", self.original.name()));
        self.state = TaskState::Running;

        let job = CopyJob {
            source_root: self.original.instance_root().to_path_buf(),
            staging,
            prefs: self.prefs.clone(),
            filter: self.filter.clone(),
            capability: self.capability.clone(),
            links: self.links.clone(),
            cancel: self.cancel.clone(),
        };
        info!(
            src = %job.source_root.display(),
            dst = %job.staging.display(),
            links = job.prefs.use_links,
            hard_links = job.prefs.use_hard_links,
            split_saves = job.prefs.copy_saves_separately(),
            "starting instance copy"
        );

        let (tx, rx) = mpsc::channel();
        rayon::spawn(move || {
            let result = job.run();
            // The task may have been dropped meanwhile
            let _ = tx.send(result);
        });
        self.pending = Some((rx, reporter));
        Ok(())
    }

    /// Block until the background job is done and return the final state.
    ///
    /// Returns the current state right away if the task is not running.
    pub fn wait(&mut self) -> TaskState {
        if let Some((rx, reporter)) = self.pending.take() {
            let result = rx.recv().unwrap_or_else(|_| Err(worker_lost()));
            self.finish(result, reporter.as_ref());
        }
        self.state
    }

    /// Finish the task if the background job is done.
    ///
    /// Returns `None` while the job is still running.
    pub fn try_finish(&mut self) -> Option<TaskState> {
        let Some((rx, reporter)) = self.pending.take() else {
            return Some(self.state);
        };
        let result = match rx.try_recv() {
            Ok(result) => result,
            Err(TryRecvError::Empty) => {
                self.pending = Some((rx, reporter));
                return None;
            }
            Err(TryRecvError::Disconnected) => Err(worker_lost()),
        };
        self.finish(result, reporter.as_ref());
        Some(self.state)
    }

    fn finish(&mut self, result: Result<()>, reporter: &dyn TaskReporter) {
        let result = result.and_then(|()| self.materialize());
        match result {
            Ok(instance) => {
                info!(path = %instance.root().display(), name = instance.name(), "instance copy finished");
                self.instance = Some(instance);
                self.state = TaskState::Succeeded;
                reporter.emit_succeeded();
            }
            Err(Error::Cancelled) => {
                info!("instance copy aborted");
                self.last_error = Some(Error::Cancelled);
                self.state = TaskState::Aborted;
                reporter.emit_failed(ABORTED_MESSAGE);
            }
            Err(e) => {
                error!(error = %e, code = %e.code(), "instance copy failed");
                self.last_error = Some(e);
                self.state = TaskState::Failed;
                reporter.emit_failed(FAILED_MESSAGE);
            }
        }
    }

    /// Open the staged copy and apply name, icon and playtime policy.
    fn materialize(&self) -> Result<Box<dyn InstanceHandle>> {
        let staging = self.staging.clone().ok_or(Error::StagingPathUnset)?;
        let mut instance = self.materializer.materialize(&staging)?;
        instance.set_name(&self.name);
        instance.set_icon_key(&self.icon_key);
        if !self.prefs.keep_playtime {
            instance.reset_time_played();
        }
        instance
            .save()
            .map_err(|source| Error::Materialize {
                path: staging,
                source,
            })?;
        Ok(instance)
    }
}

fn worker_lost() -> Error {
    Error::Io(io::Error::other("copy job ended without reporting a result"))
}

/// Whether two paths name the same location, resolving them when possible.
fn same_location(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Everything the background job needs, detached from the task.
struct CopyJob {
    source_root: PathBuf,
    staging: PathBuf,
    prefs: CopyPreferences,
    filter: Option<PathFilter>,
    capability: LinkCapability,
    links: Arc<dyn LinkOps>,
    cancel: Arc<AtomicBool>,
}

impl CopyJob {
    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    fn base_request(&self) -> ReplicationRequest {
        ReplicationRequest::new(&self.source_root, &self.staging)
            .with_filter(self.filter.clone())
            .with_parallel(self.prefs.parallel)
            .with_cancel_token(self.cancel.clone())
    }

    fn run(self) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let result = if self.prefs.use_links {
            self.link_instance()
        } else {
            self.copy_instance()
        };
        // A cancellation that lands after the last entry still aborts
        if self.is_cancelled() {
            return Err(Error::Cancelled);
        }
        result
    }

    fn copy_instance(&self) -> Result<()> {
        let outcome = replicate_with(&self.base_request(), self.links.as_ref());
        let stats = outcome.into_result()?;
        debug!(
            files = stats.files_copied,
            bytes = stats.bytes_copied,
            duration = ?stats.duration,
            "instance copied"
        );
        Ok(())
    }

    fn link_instance(&self) -> Result<()> {
        let split_saves = self.prefs.copy_saves_separately();
        let mut request = self.base_request().with_strategy(Strategy::Link);
        if self.prefs.use_hard_links {
            request = request.with_hard_links();
        }
        if self.prefs.dont_link_saves {
            request = request.excluding(resolve_saves_dir(&self.source_root));
        }

        let outcome = replicate_with(&request, self.links.as_ref());
        // Only refused symlinks are worth an elevated retry
        let batch = outcome.failed_link_requests();
        let elevator = match self.capability.elevator() {
            Some(elevator)
                if !self.prefs.use_hard_links && !outcome.cancelled && !batch.is_empty() =>
            {
                elevator.clone()
            }
            _ => {
                let stats = outcome.into_result()?;
                debug!(links = stats.links_created, "instance linked");
                if split_saves {
                    copy_saves(&self.source_root, &self.staging, &request)?;
                }
                return Ok(());
            }
        };

        debug!(
            failures = outcome.failures().count(),
            "link pass failed, escalating"
        );
        let wait = ElevationWait {
            timeout: self.prefs.elevation_timeout(),
            cancel_token: Some(self.cancel.clone()),
        };
        let escalated = match escalate_and_retry(elevator, batch, &wait) {
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            other => other,
        };

        // Saves are copied whatever the elevated run reported
        let saves = if split_saves {
            copy_saves(&self.source_root, &self.staging, &request).map(drop)
        } else {
            Ok(())
        };

        escalated.and_then(|escalated| escalated.into_result())?;
        if outcome.non_link_failures().next().is_some() {
            outcome.into_result()?;
        }
        saves
    }
}
