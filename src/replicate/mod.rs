//! Recursive tree replication.
//!
//! A pass runs in four phases:
//!
//! 1. Collect every directory, file and symlink (siblings in file-name order)
//! 2. Create the directory structure sequentially, parents first
//! 3. Copy or link regular files in parallel
//! 4. Recreate symlinks found in the source, with their original targets
//!
//! Directory permissions are applied last, deepest first, so a read-only
//! source directory does not lock its copy before the contents are written.
//!
//! Per-entry failures are recorded and the pass carries on; the caller gets
//! the complete list in a [`ReplicationOutcome`].

mod file;
mod link;
mod utils;

pub use link::{LinkOps, OsLinks};
pub(crate) use utils::is_symlink;

use crate::filter::PathFilter;
use crate::options::{ReplicationRequest, Strategy};
use crate::outcome::{EntryError, EntryOperation, EntryResult, ReplicationOutcome};
use crate::utils::path::safe_path;
use rayon::prelude::*;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, warn};

use file::copy_file_atomic;
use utils::is_escaping_symlink;

/// Source entry scheduled for replication.
#[derive(Debug, Clone)]
struct Planned {
    relative: PathBuf,
    src: PathBuf,
    dst: PathBuf,
}

/// Everything found during the walk.
#[derive(Debug, Default)]
struct Plan {
    dirs: Vec<Planned>,
    files: Vec<Planned>,
    symlinks: Vec<Planned>,
    read_failures: Vec<EntryResult>,
}

/// Replicate a tree using the real filesystem for links.
///
/// See [`replicate_with`].
pub fn replicate(request: &ReplicationRequest) -> ReplicationOutcome {
    replicate_with(request, &OsLinks)
}

/// Replicate `request.source_root` into `request.destination_root`.
///
/// Never fails as a whole: a missing or unreadable source root produces a
/// single failed [`EntryOperation::Read`] entry, every other problem is
/// recorded against the entry it happened to. Symlinks in the source are
/// never followed.
///
/// # Example
///
/// ```no_run
/// use instclone::{ReplicationRequest, Strategy, replicate};
///
/// let request = ReplicationRequest::new("instances/vanilla", "instances/vanilla-2")
///     .with_strategy(Strategy::Link);
/// let outcome = replicate(&request);
/// if !outcome.overall_success() {
///     for failure in outcome.failures() {
///         eprintln!("{}: {:?}", failure.relative_path.display(), failure.error);
///     }
/// }
/// ```
pub fn replicate_with(request: &ReplicationRequest, links: &dyn LinkOps) -> ReplicationOutcome {
    let start_time = Instant::now();
    let mut outcome = ReplicationOutcome::default();

    let source_root = match check_source_root(&request.source_root) {
        Ok(root) => root,
        Err(e) => {
            warn!(path = %request.source_root.display(), error = %e, "source root is not readable");
            outcome.results.push(EntryResult {
                relative_path: PathBuf::new(),
                source: request.source_root.clone(),
                destination: request.destination_root.clone(),
                operation: EntryOperation::Read,
                link_target: None,
                bytes: 0,
                error: Some(EntryError::from(&e)),
            });
            outcome.duration = start_time.elapsed();
            return outcome;
        }
    };

    // Phase 1: collect
    let mut plan = Plan::default();
    plan.dirs.push(Planned {
        relative: PathBuf::new(),
        src: source_root.clone(),
        dst: request.destination_root.clone(),
    });
    plan.collect(&source_root, &request.destination_root, Path::new(""), request);
    debug!(
        dirs = plan.dirs.len(),
        files = plan.files.len(),
        symlinks = plan.symlinks.len(),
        strategy = ?request.strategy,
        "collected source tree"
    );
    outcome.results.append(&mut plan.read_failures);

    // Phase 2: directories
    let mut created = Vec::with_capacity(plan.dirs.len());
    for dir in &plan.dirs {
        if request.is_cancelled() {
            apply_directory_permissions(&created, request);
            return cancelled(outcome, start_time);
        }
        let result = create_directory(dir);
        if result.is_ok() {
            created.push(dir);
        }
        outcome.results.push(result);
    }

    // Phase 3: files
    let file_results = replicate_files(&plan.files, &source_root, request, links);
    outcome.results.extend(file_results);
    if request.is_cancelled() {
        apply_directory_permissions(&created, request);
        return cancelled(outcome, start_time);
    }

    // Phase 4: source symlinks
    for entry in &plan.symlinks {
        if request.is_cancelled() {
            apply_directory_permissions(&created, request);
            return cancelled(outcome, start_time);
        }
        outcome.results.push(recreate_symlink(entry, links));
    }

    apply_directory_permissions(&created, request);
    outcome.duration = start_time.elapsed();
    debug!(
        entries = outcome.results.len(),
        failures = outcome.failures().count(),
        duration = ?outcome.duration,
        "replication pass finished"
    );
    outcome
}

fn cancelled(mut outcome: ReplicationOutcome, start_time: Instant) -> ReplicationOutcome {
    debug!("replication pass cancelled");
    outcome.cancelled = true;
    outcome.duration = start_time.elapsed();
    outcome
}

/// Resolve the source root to an absolute path, making sure it can be listed.
fn check_source_root(root: &Path) -> io::Result<PathBuf> {
    let meta = fs::metadata(root)?;
    if !meta.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotADirectory,
            format!("not a directory: {}", root.display()),
        ));
    }
    fs::read_dir(root)?;
    fs::canonicalize(root)
}

impl Plan {
    /// Depth-first walk of `src_dir`, siblings sorted by file name.
    fn collect(&mut self, src_dir: &Path, dst_dir: &Path, relative: &Path, request: &ReplicationRequest) {
        let entries = match read_sorted(src_dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %src_dir.display(), error = %e, "failed to list directory");
                self.read_failures.push(EntryResult {
                    relative_path: relative.to_path_buf(),
                    source: src_dir.to_path_buf(),
                    destination: dst_dir.to_path_buf(),
                    operation: EntryOperation::Read,
                    link_target: None,
                    bytes: 0,
                    error: Some(EntryError::from(&e)),
                });
                return;
            }
        };

        for (name, file_type) in entries {
            let rel = relative.join(&name);
            if request.is_excluded(&rel) {
                continue;
            }

            let passes = request
                .filter
                .as_ref()
                .is_none_or(|filter| filter.matches(&rel));
            let planned = Planned {
                src: src_dir.join(&name),
                dst: dst_dir.join(&name),
                relative: rel,
            };

            // file_type() comes from the directory entry and does not follow symlinks
            if file_type.is_symlink() {
                if passes {
                    self.symlinks.push(planned);
                }
            } else if file_type.is_dir() {
                let prunes = request
                    .filter
                    .as_ref()
                    .is_some_and(PathFilter::prunes_directories);
                if !passes && prunes {
                    continue;
                }

                let mark = self.len();
                let (src, dst, rel) = (planned.src.clone(), planned.dst.clone(), planned.relative.clone());
                self.dirs.push(planned);
                self.collect(&src, &dst, &rel, request);

                // Include mode keeps a non-matching directory only for its contents
                if !passes && self.len() == mark + 1 {
                    self.dirs.pop();
                }
            } else if file_type.is_file() {
                if passes {
                    self.files.push(planned);
                }
            } else {
                warn!(path = %planned.src.display(), "skipping special file");
            }
        }
    }

    fn len(&self) -> usize {
        self.dirs.len() + self.files.len() + self.symlinks.len() + self.read_failures.len()
    }
}

fn read_sorted(dir: &Path) -> io::Result<Vec<(std::ffi::OsString, fs::FileType)>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        entries.push((entry.file_name(), entry.file_type()?));
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(entries)
}

fn create_directory(dir: &Planned) -> EntryResult {
    let safe_dst = safe_path(&dir.dst);
    let result = fs::create_dir_all(&safe_dst);

    #[cfg(windows)]
    {
        if result.is_ok() {
            crate::win_attrs::copy_attributes(&dir.src, &safe_dst);
        }
    }

    if let Err(e) = &result {
        warn!(path = %dir.dst.display(), error = %e, "failed to create directory");
    }

    EntryResult {
        relative_path: dir.relative.clone(),
        source: dir.src.clone(),
        destination: dir.dst.clone(),
        operation: EntryOperation::CreateDir,
        link_target: None,
        bytes: 0,
        error: result.err().as_ref().map(EntryError::from),
    }
}

/// Copy source directory permissions onto the created directories.
///
/// `created` is in parent-before-child order; it is walked in reverse so a
/// directory is only restricted once everything below it is done.
fn apply_directory_permissions(created: &[&Planned], request: &ReplicationRequest) {
    if !request.preserve_permissions {
        return;
    }
    for dir in created.iter().rev() {
        match fs::metadata(&dir.src) {
            Ok(metadata) => {
                if let Err(e) = fs::set_permissions(safe_path(&dir.dst), metadata.permissions()) {
                    warn!(path = %dir.dst.display(), error = %e, "failed to set directory permissions");
                }
            }
            Err(e) => {
                warn!(path = %dir.src.display(), error = %e, "failed to read directory metadata");
            }
        }
    }
}

/// Copy or link all regular files, preserving walk order in the results.
fn replicate_files(
    files: &[Planned],
    source_root: &Path,
    request: &ReplicationRequest,
    links: &dyn LinkOps,
) -> Vec<EntryResult> {
    if files.is_empty() {
        return Vec::new();
    }

    let do_files = |files: &[Planned]| -> Vec<EntryResult> {
        files
            .par_iter()
            .filter_map(|entry| {
                if request.is_cancelled() {
                    return None;
                }
                Some(replicate_file(entry, source_root, request, links))
            })
            .collect()
    };

    if request.parallel != rayon::current_num_threads() {
        match rayon::ThreadPoolBuilder::new()
            .num_threads(request.parallel)
            .build()
        {
            Ok(pool) => pool.install(|| do_files(files)),
            Err(e) => {
                warn!(error = %e, "failed to create thread pool, using global pool");
                do_files(files)
            }
        }
    } else {
        do_files(files)
    }
}

fn replicate_file(
    entry: &Planned,
    source_root: &Path,
    request: &ReplicationRequest,
    links: &dyn LinkOps,
) -> EntryResult {
    let (operation, link_target, result) = match (request.strategy, request.use_hard_links) {
        (Strategy::Copy, _) => (
            EntryOperation::CopyFile,
            None,
            copy_file_atomic(&entry.src, &entry.dst, request),
        ),
        (Strategy::Link, true) => (
            EntryOperation::HardLink,
            None,
            links.hard_link(&entry.src, &entry.dst).map(|()| 0),
        ),
        (Strategy::Link, false) => {
            let target = source_root.join(&entry.relative);
            let result = links.symlink(&target, &entry.dst).map(|()| 0);
            (EntryOperation::Symlink, Some(target), result)
        }
    };

    if let Err(e) = &result {
        warn!(
            src = %entry.src.display(),
            dst = %entry.dst.display(),
            operation = ?operation,
            error = %e,
            "failed to replicate file"
        );
    }

    EntryResult {
        relative_path: entry.relative.clone(),
        source: entry.src.clone(),
        destination: entry.dst.clone(),
        operation,
        link_target,
        bytes: *result.as_ref().unwrap_or(&0),
        error: result.as_ref().err().map(EntryError::from),
    }
}

fn recreate_symlink(entry: &Planned, links: &dyn LinkOps) -> EntryResult {
    let mut result = EntryResult {
        relative_path: entry.relative.clone(),
        source: entry.src.clone(),
        destination: entry.dst.clone(),
        operation: EntryOperation::CopySymlink,
        link_target: None,
        bytes: 0,
        error: None,
    };

    let target = match fs::read_link(&entry.src) {
        Ok(target) => target,
        Err(e) => {
            warn!(path = %entry.src.display(), error = %e, "failed to read symlink");
            result.error = Some(EntryError::from(&e));
            return result;
        }
    };

    if is_escaping_symlink(&target) {
        warn!(
            link = %entry.src.display(),
            target = %target.display(),
            "symlink uses a relative path escaping upward"
        );
    }

    if let Err(e) = links.symlink(&target, &entry.dst) {
        warn!(
            link = %entry.dst.display(),
            target = %target.display(),
            error = %e,
            "failed to create symlink"
        );
        result.error = Some(EntryError::from(&e));
    }
    result.link_target = Some(target);
    result
}
