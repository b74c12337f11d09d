//! Atomic single-file copy.

use crate::options::ReplicationRequest;
use crate::utils::path::safe_path;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::Path;
use tempfile::NamedTempFile;

use super::utils::{copy_file_contents, preserve_timestamps};

/// Copy one regular file into a fresh destination.
///
/// The data is written to a temp file next to `dst` and renamed into place
/// with `persist_noclobber`, so an interrupted copy never leaves a partial
/// file and an existing destination is never replaced.
///
/// Returns the number of bytes copied.
pub(crate) fn copy_file_atomic(
    src: &Path,
    dst: &Path,
    request: &ReplicationRequest,
) -> io::Result<u64> {
    let src_meta = fs::metadata(src)?;
    let src_file = File::open(src)?;

    let dst_parent = dst.parent().unwrap_or(Path::new("."));
    let safe_dst_parent = safe_path(dst_parent);

    // 0o600 for now when preserving, source permissions are applied before the rename
    let mode = if request.preserve_permissions { 0o600 } else { 0o666 };
    let temp_file = create_temp_in(&safe_dst_parent, mode)?;

    let bytes_copied = copy_file_contents(&src_file, temp_file.as_file(), src_meta.len())?;

    if request.fsync {
        temp_file.as_file().sync_all()?;
    }

    if request.preserve_permissions {
        fs::set_permissions(temp_file.path(), src_meta.permissions())?;
    }

    temp_file
        .persist_noclobber(safe_path(dst))
        .map_err(|e| e.error)?;

    if request.preserve_timestamps {
        if let Err(e) = preserve_timestamps(&src_meta, dst) {
            tracing::warn!(path = %dst.display(), error = %e, "failed to preserve timestamps");
        }
    }

    #[cfg(windows)]
    crate::win_attrs::copy_attributes(src, dst);

    Ok(bytes_copied)
}

/// Create a uniquely named temp file in `dir`.
///
/// The OS error of a failed create is returned as is, raw code included.
fn create_temp_in(dir: &Path, mode: u32) -> io::Result<NamedTempFile> {
    tempfile::Builder::new().make_in(dir, |path| {
        let mut options = OpenOptions::new();
        options.read(true).write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(mode);
        }
        #[cfg(windows)]
        {
            use std::os::windows::fs::OpenOptionsExt;
            let _ = mode;
            // FILE_SHARE_READ | FILE_SHARE_WRITE | FILE_SHARE_DELETE, so the open
            // file can be renamed into place
            options.share_mode(0x1 | 0x2 | 0x4);
        }
        #[cfg(not(any(unix, windows)))]
        let _ = mode;
        options.open(path)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn request() -> ReplicationRequest {
        ReplicationRequest::new("unused", "unused")
    }

    #[test]
    fn test_copy_file_basic() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src.txt");
        let dst = dir.path().join("dst.txt");
        fs::write(&src, "hello world").unwrap();

        let bytes = copy_file_atomic(&src, &dst, &request()).unwrap();

        assert_eq!(bytes, 11);
        assert_eq!(fs::read_to_string(&dst).unwrap(), "hello world");
    }

    #[test]
    fn test_copy_file_never_overwrites() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src.txt");
        let dst = dir.path().join("dst.txt");
        fs::write(&src, "new").unwrap();
        fs::write(&dst, "old").unwrap();

        let err = copy_file_atomic(&src, &dst, &request()).unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(fs::read_to_string(&dst).unwrap(), "old");
    }

    #[test]
    fn test_copy_file_missing_source() {
        let dir = tempdir().unwrap();
        let err = copy_file_atomic(
            &dir.path().join("missing"),
            &dir.path().join("dst"),
            &request(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(err.raw_os_error().is_some());
    }

    #[test]
    fn test_copy_file_preserves_mtime() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src.txt");
        let dst = dir.path().join("dst.txt");
        fs::write(&src, "content").unwrap();
        let old = filetime::FileTime::from_unix_time(1_500_000_000, 0);
        filetime::set_file_mtime(&src, old).unwrap();

        copy_file_atomic(&src, &dst, &request()).unwrap();

        let meta = fs::metadata(&dst).unwrap();
        assert_eq!(filetime::FileTime::from_last_modification_time(&meta), old);
    }

    #[cfg(unix)]
    #[test]
    fn test_copy_file_preserves_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let src = dir.path().join("run.sh");
        let dst = dir.path().join("run-copy.sh");
        fs::write(&src, "#!/bin/sh\n").unwrap();
        fs::set_permissions(&src, fs::Permissions::from_mode(0o750)).unwrap();

        copy_file_atomic(&src, &dst, &request()).unwrap();

        let mode = fs::metadata(&dst).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o750);
    }

    #[test]
    fn test_copy_file_without_timestamps() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src.txt");
        let dst = dir.path().join("dst.txt");
        fs::write(&src, "content").unwrap();
        let old = filetime::FileTime::from_unix_time(1_000_000_000, 0);
        filetime::set_file_mtime(&src, old).unwrap();

        let request = request().without_timestamps().without_fsync();
        copy_file_atomic(&src, &dst, &request).unwrap();

        let meta = fs::metadata(&dst).unwrap();
        assert!(filetime::FileTime::from_last_modification_time(&meta) > old);
    }

    #[cfg(unix)]
    #[test]
    fn test_temp_create_failure_keeps_os_code() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let src = dir.path().join("src.txt");
        fs::write(&src, "content").unwrap();
        let locked = dir.path().join("locked");
        fs::create_dir(&locked).unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o555)).unwrap();
        if fs::write(locked.join("writable"), "").is_ok() {
            // running with CAP_DAC_OVERRIDE, nothing to refuse
            return;
        }

        let err = copy_file_atomic(&src, &locked.join("dst.txt"), &request()).unwrap_err();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
        assert_eq!(err.raw_os_error(), Some(13));
        assert_eq!(crate::outcome::EntryError::from(&err).code, 13);
    }
}
