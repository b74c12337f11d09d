//! Request and result files exchanged with the privileged link helper.
//!
//! Both files are JSON documents tagged with a format version:
//!
//! ```json
//! { "version": 1, "requests": [{ "target": "/src/a.txt", "link": "/dst/a.txt" }] }
//! { "version": 1, "results": [{ "link": "/dst/a.txt", "code": 0, "message": "" }] }
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Current exchange format version.
pub const PROTOCOL_VERSION: u32 = 1;

/// One symlink to create: `link` will point at `target`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRequest {
    /// Path the link points to
    pub target: PathBuf,
    /// Path of the link to create
    pub link: PathBuf,
}

/// Outcome of one [`LinkRequest`] as reported by the helper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkResult {
    /// Link the result refers to
    pub link: PathBuf,
    /// Raw OS error code, `0` on success
    pub code: i32,
    /// Error message, empty on success
    #[serde(default)]
    pub message: String,
}

impl LinkResult {
    /// Whether the link was created.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.code == 0
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct RequestFile {
    pub(crate) version: u32,
    pub(crate) requests: Vec<LinkRequest>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct ResultFile {
    pub(crate) version: u32,
    pub(crate) results: Vec<LinkResult>,
}

fn protocol_error(path: &Path, source: serde_json::Error) -> Error {
    Error::Protocol {
        path: path.to_path_buf(),
        source,
    }
}

fn check_version(path: &Path, version: u32) -> Result<()> {
    if version == PROTOCOL_VERSION {
        return Ok(());
    }
    Err(protocol_error(
        path,
        serde::de::Error::custom(format!(
            "unsupported version {version}, expected {PROTOCOL_VERSION}"
        )),
    ))
}

/// Write `requests` to `path`.
///
/// # Errors
///
/// Returns [`Error::Io`] if the file cannot be written.
pub fn write_requests(path: &Path, requests: &[LinkRequest]) -> Result<()> {
    let file = RequestFile {
        version: PROTOCOL_VERSION,
        requests: requests.to_vec(),
    };
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, &file).map_err(|e| protocol_error(path, e))?;
    writer.flush()?;
    Ok(())
}

/// Read a request file.
///
/// # Errors
///
/// Returns [`Error::Io`] if the file cannot be opened and [`Error::Protocol`]
/// if it is malformed or has another version.
pub fn read_requests(path: &Path) -> Result<Vec<LinkRequest>> {
    let reader = BufReader::new(File::open(path)?);
    let file: RequestFile = serde_json::from_reader(reader).map_err(|e| protocol_error(path, e))?;
    check_version(path, file.version)?;
    Ok(file.requests)
}

/// Atomically write `results` to `path`.
///
/// The reader either sees no file or a complete one.
///
/// # Errors
///
/// Returns [`Error::Io`] if the file cannot be written.
pub fn write_results(path: &Path, results: &[LinkResult]) -> Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    let file = ResultFile {
        version: PROTOCOL_VERSION,
        results: results.to_vec(),
    };
    serde_json::to_writer_pretty(&mut temp, &file).map_err(|e| protocol_error(path, e))?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

/// Read a result file.
///
/// # Errors
///
/// Returns [`Error::Io`] if the file cannot be opened and [`Error::Protocol`]
/// if it is malformed or has another version.
pub fn read_results(path: &Path) -> Result<Vec<LinkResult>> {
    let reader = BufReader::new(File::open(path)?);
    let file: ResultFile = serde_json::from_reader(reader).map_err(|e| protocol_error(path, e))?;
    check_version(path, file.version)?;
    Ok(file.results)
}
