//! Elevation through an external launcher process.

use super::Elevator;
use super::protocol::{LinkRequest, LinkResult, read_results, write_requests};
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, warn};

/// How the privileged helper process is started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElevationLauncher {
    /// Run the helper behind a prefix command, e.g. `sudo -n` or `pkexec`
    Prefix(Vec<OsString>),
    /// Ask for elevation through a UAC prompt (`Start-Process -Verb RunAs`)
    WindowsRunAs,
}

/// [`Elevator`] that re-runs this program's `link-helper` subcommand with
/// elevated privileges.
///
/// Requests and results travel through JSON files in a private temporary
/// directory; see [`protocol`](super::protocol).
#[derive(Debug, Clone)]
pub struct CommandElevator {
    launcher: ElevationLauncher,
    helper_exe: PathBuf,
}

impl CommandElevator {
    /// Use `helper_exe` as the link helper.
    pub fn new<P: AsRef<Path>>(launcher: ElevationLauncher, helper_exe: P) -> Self {
        Self {
            launcher,
            helper_exe: helper_exe.as_ref().to_path_buf(),
        }
    }

    /// Use the running executable as the link helper.
    ///
    /// # Errors
    ///
    /// Returns an error if the path of the running executable is unknown.
    pub fn current_exe(launcher: ElevationLauncher) -> io::Result<Self> {
        Ok(Self::new(launcher, std::env::current_exe()?))
    }

    /// The launcher in use.
    #[must_use]
    pub fn launcher(&self) -> &ElevationLauncher {
        &self.launcher
    }

    fn helper_args(requests: &Path, results: &Path) -> Vec<OsString> {
        vec![
            OsString::from("link-helper"),
            OsString::from("--requests"),
            requests.as_os_str().to_owned(),
            OsString::from("--results"),
            results.as_os_str().to_owned(),
        ]
    }

    pub(crate) fn command(&self, requests: &Path, results: &Path) -> Command {
        let args = Self::helper_args(requests, results);
        match &self.launcher {
            ElevationLauncher::Prefix(prefix) => {
                let mut command = match prefix.split_first() {
                    Some((program, rest)) => {
                        let mut command = Command::new(program);
                        command.args(rest).arg(&self.helper_exe);
                        command
                    }
                    None => Command::new(&self.helper_exe),
                };
                command.args(&args);
                command
            }
            ElevationLauncher::WindowsRunAs => {
                let argument_list = args
                    .iter()
                    .map(|arg| powershell_quote(&format!("\"{}\"", arg.to_string_lossy())))
                    .collect::<Vec<_>>()
                    .join(",");
                let script = format!(
                    "$p = Start-Process -FilePath {} -ArgumentList {} -Verb RunAs -Wait -PassThru; exit $p.ExitCode",
                    powershell_quote(&self.helper_exe.to_string_lossy()),
                    argument_list
                );
                let mut command = Command::new("powershell");
                command.args(["-NoProfile", "-NonInteractive", "-Command", &script]);
                command
            }
        }
    }
}

/// Single-quote a string for PowerShell.
fn powershell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

impl Elevator for CommandElevator {
    fn run_privileged(&self, requests: &[LinkRequest]) -> Option<Vec<LinkResult>> {
        let exchange = match tempfile::tempdir() {
            Ok(dir) => dir,
            Err(e) => {
                warn!(error = %e, "failed to create elevation exchange directory");
                return None;
            }
        };
        let requests_path = exchange.path().join("requests.json");
        let results_path = exchange.path().join("results.json");

        if let Err(e) = write_requests(&requests_path, requests) {
            warn!(error = %e, "failed to write link requests");
            return None;
        }

        let mut command = self.command(&requests_path, &results_path);
        debug!(command = ?command, "starting elevated link helper");
        match command.status() {
            Ok(status) if !status.success() => {
                debug!(%status, "elevated link helper exited unsuccessfully");
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "failed to start elevated link helper");
                return None;
            }
        }

        // Declined prompts and crashed helpers leave no results behind
        match read_results(&results_path) {
            Ok(results) => Some(results),
            Err(e) => {
                debug!(error = %e, "elevated link helper produced no results");
                None
            }
        }
    }
}
