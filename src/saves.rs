//! Separate copy of the `saves` directory.
//!
//! Save data must never be shared between instances through links. When an
//! instance is link-cloned with saves split out, the main pass leaves
//! `saves` alone and this module copies it on its own.

use crate::error::{Error, Result};
use crate::options::ReplicationRequest;
use crate::outcome::ReplicationOutcome;
use crate::replicate::replicate;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Name of the save-data directory inside an instance.
pub const SAVES_DIR: &str = "saves";

/// Name of the saves directory as it is spelled under `root`.
///
/// An exact `saves` entry wins; otherwise the first directory whose name
/// matches ignoring ASCII case is used, so `Saves` on a case-insensitive
/// filesystem is still found. Falls back to [`SAVES_DIR`].
pub(crate) fn resolve_saves_dir(root: &Path) -> PathBuf {
    let Ok(entries) = fs::read_dir(root) else {
        return PathBuf::from(SAVES_DIR);
    };
    let mut candidates: Vec<_> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_ok_and(|t| t.is_dir()))
        .map(|entry| entry.file_name())
        .filter(|name| name.to_str().is_some_and(|n| n.eq_ignore_ascii_case(SAVES_DIR)))
        .collect();
    candidates.sort();

    let name = candidates
        .iter()
        .find(|name| *name == SAVES_DIR)
        .or_else(|| candidates.first());
    match name {
        Some(name) => PathBuf::from(name),
        None => PathBuf::from(SAVES_DIR),
    }
}

/// Copy `<source_root>/saves` to `<dest_root>/saves`.
///
/// Always copies (never links), never follows symlinks and ignores any
/// filter on `base`; only its copy tunables and cancellation token are used.
/// An instance without a `saves` directory has nothing to copy and succeeds
/// with an empty outcome. The directory keeps the spelling found by
/// [`resolve_saves_dir`] on both sides.
///
/// # Errors
///
/// - [`Error::SavesReplicationFailed`] if any saves entry failed
/// - [`Error::Cancelled`] if the copy was cancelled
pub fn copy_saves(
    source_root: &Path,
    dest_root: &Path,
    base: &ReplicationRequest,
) -> Result<ReplicationOutcome> {
    let name = resolve_saves_dir(source_root);
    let source = source_root.join(&name);
    match fs::symlink_metadata(&source) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %source.display(), "instance has no saves directory");
            return Ok(ReplicationOutcome::default());
        }
        _ => {}
    }

    let request = base.derive(&source, dest_root.join(&name));
    debug!(src = %source.display(), "copying saves separately");
    let outcome = replicate(&request);

    match outcome.clone().into_result() {
        Ok(_) => Ok(outcome),
        Err(Error::Cancelled) => Err(Error::Cancelled),
        Err(e) => Err(Error::SavesReplicationFailed {
            source: Box::new(e),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{FilterMode, PathFilter};
    use crate::options::Strategy;
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;
    use tempfile::tempdir;

    #[test]
    fn test_copy_saves_copies_bytes() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();
        fs::create_dir_all(src.path().join("saves/world/region")).unwrap();
        fs::write(src.path().join("saves/slot1.dat"), "slot one").unwrap();
        fs::write(src.path().join("saves/world/region/r.0.0.mca"), [7u8; 1024]).unwrap();

        let base = ReplicationRequest::new(src.path(), dst.path())
            .with_strategy(Strategy::Link)
            .with_filter(PathFilter::new("dat", FilterMode::Exclude).unwrap());
        let outcome = copy_saves(src.path(), dst.path(), &base).unwrap();

        assert!(outcome.overall_success());
        let copied = dst.path().join("saves/slot1.dat");
        assert_eq!(fs::read_to_string(&copied).unwrap(), "slot one");
        assert!(!fs::symlink_metadata(&copied).unwrap().file_type().is_symlink());
        assert_eq!(
            fs::read(dst.path().join("saves/world/region/r.0.0.mca")).unwrap(),
            vec![7u8; 1024]
        );
    }

    #[test]
    fn test_saves_dir_spelling_kept() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();
        fs::create_dir_all(src.path().join("Saves")).unwrap();
        fs::write(src.path().join("Saves/slot1.dat"), "slot one").unwrap();
        fs::write(src.path().join("saves.txt"), "not a directory").unwrap();

        assert_eq!(resolve_saves_dir(src.path()), PathBuf::from("Saves"));
        let base = ReplicationRequest::new(src.path(), dst.path());
        let outcome = copy_saves(src.path(), dst.path(), &base).unwrap();

        assert!(outcome.overall_success());
        assert_eq!(
            fs::read_to_string(dst.path().join("Saves/slot1.dat")).unwrap(),
            "slot one"
        );
    }

    #[test]
    fn test_resolve_saves_dir_prefers_exact_name() {
        let dir = tempdir().unwrap();
        assert_eq!(resolve_saves_dir(dir.path()), PathBuf::from(SAVES_DIR));

        fs::create_dir(dir.path().join("saves")).unwrap();
        assert_eq!(resolve_saves_dir(dir.path()), PathBuf::from(SAVES_DIR));
    }

    #[test]
    fn test_missing_saves_is_success() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();

        let base = ReplicationRequest::new(src.path(), dst.path());
        let outcome = copy_saves(src.path(), dst.path(), &base).unwrap();

        assert!(outcome.results.is_empty());
        assert!(!dst.path().join("saves").exists());
    }

    #[test]
    fn test_saves_failure_reported() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();
        fs::create_dir_all(src.path().join("saves")).unwrap();
        fs::write(src.path().join("saves/slot1.dat"), "new").unwrap();
        fs::create_dir_all(dst.path().join("saves")).unwrap();
        fs::write(dst.path().join("saves/slot1.dat"), "existing").unwrap();

        let base = ReplicationRequest::new(src.path(), dst.path());
        let err = copy_saves(src.path(), dst.path(), &base).unwrap_err();

        assert!(matches!(err, Error::SavesReplicationFailed { .. }));
        assert_eq!(
            fs::read_to_string(dst.path().join("saves/slot1.dat")).unwrap(),
            "existing"
        );
    }

    #[test]
    fn test_saves_cancelled() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();
        fs::create_dir_all(src.path().join("saves")).unwrap();
        fs::write(src.path().join("saves/slot1.dat"), "x").unwrap();

        let base = ReplicationRequest::new(src.path(), dst.path())
            .with_cancel_token(Arc::new(AtomicBool::new(true)));

        assert!(matches!(
            copy_saves(src.path(), dst.path(), &base),
            Err(Error::Cancelled)
        ));
    }
}
