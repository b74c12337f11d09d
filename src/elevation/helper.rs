//! The privileged side of the exchange.

use super::protocol::{LinkRequest, LinkResult, read_requests, write_results};
use crate::error::Result;
use crate::replicate::{LinkOps, OsLinks, is_symlink};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Create every requested link and report one result per request.
///
/// A link that already exists and points at the requested target counts as
/// created, so a helper run twice over the same batch reports success.
pub fn perform_link_requests(requests: &[LinkRequest], links: &dyn LinkOps) -> Vec<LinkResult> {
    requests
        .iter()
        .map(|request| {
            let outcome = match links.symlink(&request.target, &request.link) {
                Err(_)
                    if is_symlink(&request.link)
                        && fs::read_link(&request.link).is_ok_and(|t| t == request.target) =>
                {
                    Ok(())
                }
                other => other,
            };
            match outcome {
                Ok(()) => LinkResult {
                    link: request.link.clone(),
                    code: 0,
                    message: String::new(),
                },
                Err(e) => {
                    warn!(link = %request.link.display(), error = %e, "elevated link creation failed");
                    LinkResult {
                        link: request.link.clone(),
                        code: crate::error::os_code(&e),
                        message: e.to_string(),
                    }
                }
            }
        })
        .collect()
}

/// Entry point of the privileged link helper.
///
/// Reads the batch from `requests_file`, creates each link and writes the
/// per-link results to `results_file`. Individual link failures are reported
/// in the results, not as an error.
///
/// # Errors
///
/// Returns [`Error::Io`](crate::Error::Io) or [`Error::Protocol`](crate::Error::Protocol)
/// if the request file cannot be read or the result file cannot be written.
pub fn run_link_helper(requests_file: &Path, results_file: &Path) -> Result<()> {
    let requests = read_requests(requests_file)?;
    info!(links = requests.len(), "creating links with elevated privileges");
    let results = perform_link_requests(&requests, &OsLinks);
    write_results(results_file, &results)
}
