//! Hidden, system, read-only and archive attributes on Windows.
//!
//! Copied files and directories take these bits from their source. Bits the
//! filesystem manages itself (directory, compressed, encrypted, reparse
//! point) are left as the destination has them.

use std::io;
use std::os::windows::ffi::OsStrExt;
use std::path::Path;

use crate::utils::path::to_extended_length_path;

use windows::Win32::Storage::FileSystem::{
    FILE_ATTRIBUTE_NORMAL, FILE_FLAGS_AND_ATTRIBUTES, GetFileAttributesW, SetFileAttributesW,
};

/// `INVALID_FILE_ATTRIBUTES` from WinBase.h
const INVALID_FILE_ATTRIBUTES: u32 = u32::MAX;

/// READONLY | HIDDEN | SYSTEM | ARCHIVE | NOT_CONTENT_INDEXED
const COPIED_BITS: u32 = 0x1 | 0x2 | 0x4 | 0x20 | 0x2000;

fn wide(path: &Path) -> Vec<u16> {
    to_extended_length_path(path)
        .as_os_str()
        .encode_wide()
        .chain(Some(0))
        .collect()
}

fn get_attributes(path: &Path) -> io::Result<u32> {
    let wide = wide(path);
    // SAFETY: `wide` is a null-terminated UTF-16 string that outlives the call
    let attrs = unsafe { GetFileAttributesW(windows::core::PCWSTR(wide.as_ptr())) };
    if attrs == INVALID_FILE_ATTRIBUTES {
        Err(io::Error::last_os_error())
    } else {
        Ok(attrs)
    }
}

fn set_attributes(path: &Path, attrs: u32) -> io::Result<()> {
    let wide = wide(path);
    // SAFETY: `wide` is a null-terminated UTF-16 string that outlives the call
    unsafe {
        SetFileAttributesW(
            windows::core::PCWSTR(wide.as_ptr()),
            FILE_FLAGS_AND_ATTRIBUTES(attrs),
        )
    }
    .map_err(|_| io::Error::last_os_error())
}

/// Merge the copied attribute bits of `src` into `dst`.
fn merge_attributes(src_attrs: u32, dst_attrs: u32) -> u32 {
    let merged = (dst_attrs & !COPIED_BITS) | (src_attrs & COPIED_BITS);
    if merged == 0 {
        FILE_ATTRIBUTE_NORMAL.0
    } else {
        merged
    }
}

/// Copy attribute bits from `src` to `dst`, logging instead of failing.
pub(crate) fn copy_attributes(src: &Path, dst: &Path) {
    let result = get_attributes(src).and_then(|src_attrs| {
        let dst_attrs = get_attributes(dst)?;
        let merged = merge_attributes(src_attrs, dst_attrs);
        if merged == dst_attrs {
            return Ok(());
        }
        set_attributes(dst, merged)
    });
    if let Err(e) = result {
        tracing::debug!(path = %dst.display(), error = %e, "failed to copy file attributes");
    }
}
