//! Privileged retry of symlink creation.
//!
//! Some platforms only let elevated processes create symbolic links. When a
//! link pass fails there, the failed links are handed to an [`Elevator`],
//! which repeats them in a privileged context and reports one
//! [`LinkResult`] per request. Exactly one such attempt is made per task.
//!
//! | Type | Role |
//! |------|------|
//! | [`LinkCapability`] | Whether a failed link pass may be retried elevated |
//! | [`Elevator`] | Runs a batch of link requests with elevated privileges |
//! | [`CommandElevator`] | Elevator that launches this program's link helper |
//! | [`escalate_and_retry`] | Runs an elevator and waits for its answer |
//! | [`run_link_helper`] | The privileged peer |

mod command;
mod helper;
pub mod protocol;

pub use command::{CommandElevator, ElevationLauncher};
pub use helper::{perform_link_requests, run_link_helper};
pub use protocol::{LinkRequest, LinkResult};

use crate::error::{Error, Result};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Slice of time the waiting worker sleeps between cancellation checks.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Runs link requests in a privileged context.
pub trait Elevator: Send + Sync {
    /// Create the requested links with elevated privileges.
    ///
    /// Returns `None` when no usable results were produced: the user
    /// declined, the privileged process failed to start, or it exited
    /// without reporting.
    fn run_privileged(&self, requests: &[LinkRequest]) -> Option<Vec<LinkResult>>;
}

/// What may happen after an ordinary link pass fails.
///
/// Chosen once when the task is set up.
#[derive(Clone, Default)]
pub enum LinkCapability {
    /// A failed link pass is final
    #[default]
    AttemptLink,
    /// A failed symlink pass is retried once through the elevator
    AttemptLinkWithElevationFallback(Arc<dyn Elevator>),
}

impl LinkCapability {
    /// Platform default: elevation fallback on Windows, where creating
    /// symlinks needs a privilege ordinary users lack, plain linking
    /// elsewhere.
    pub fn detect(elevator: Arc<dyn Elevator>) -> Self {
        if cfg!(windows) {
            Self::AttemptLinkWithElevationFallback(elevator)
        } else {
            Self::AttemptLink
        }
    }

    /// The fallback elevator, if any.
    #[must_use]
    pub fn elevator(&self) -> Option<&Arc<dyn Elevator>> {
        match self {
            Self::AttemptLink => None,
            Self::AttemptLinkWithElevationFallback(elevator) => Some(elevator),
        }
    }
}

impl fmt::Debug for LinkCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AttemptLink => f.write_str("AttemptLink"),
            Self::AttemptLinkWithElevationFallback(_) => {
                f.write_str("AttemptLinkWithElevationFallback")
            }
        }
    }
}

/// Bounds on the wait for an elevated run.
#[derive(Debug, Clone, Default)]
pub struct ElevationWait {
    /// Give up after this long (`None` waits until the elevator returns)
    pub timeout: Option<Duration>,
    /// Stop waiting when this flag is raised
    pub cancel_token: Option<Arc<AtomicBool>>,
}

impl ElevationWait {
    fn is_cancelled(&self) -> bool {
        self.cancel_token
            .as_ref()
            .is_some_and(|token| token.load(Ordering::Relaxed))
    }
}

/// Answer of an elevated run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscalatedOutcome {
    /// The elevator produced results at all
    pub got_result: bool,
    /// One result per request that the elevator reported on
    pub results: Vec<LinkResult>,
    /// Number of links that were requested
    pub requested: usize,
}

impl EscalatedOutcome {
    /// Results were obtained, cover every request, and none failed.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.got_result
            && self.results.len() == self.requested
            && self.results.iter().all(LinkResult::is_ok)
    }

    /// Fold into a single result.
    ///
    /// # Errors
    ///
    /// - [`Error::ElevationDeclinedOrUnavailable`] if no results were obtained
    /// - [`Error::ElevationPartialFailure`] if any link failed or went unreported
    pub fn into_result(self) -> Result<()> {
        if !self.got_result {
            return Err(Error::ElevationDeclinedOrUnavailable);
        }
        if self.succeeded() {
            return Ok(());
        }
        let ok = self.results.iter().filter(|r| r.is_ok()).count();
        Err(Error::ElevationPartialFailure {
            failed: self.requested.saturating_sub(ok),
            total: self.requested,
        })
    }
}

/// Run `batch` through `elevator` and wait for its answer.
///
/// The elevator runs on its own thread and delivers its answer through a
/// single-use channel. The calling thread waits in short slices so it can
/// observe cancellation and the optional deadline. On timeout or
/// cancellation the elevated run is left to finish; its answer is dropped.
///
/// # Errors
///
/// - [`Error::Cancelled`] if the cancel token is raised while waiting
/// - [`Error::ElevationTimedOut`] if the deadline passes first
/// - [`Error::Io`] if the waiting thread cannot be spawned
pub fn escalate_and_retry(
    elevator: Arc<dyn Elevator>,
    batch: Vec<LinkRequest>,
    wait: &ElevationWait,
) -> Result<EscalatedOutcome> {
    let requested = batch.len();
    info!(links = requested, "retrying link creation with elevated privileges");

    let (tx, rx) = mpsc::sync_channel(1);
    thread::Builder::new()
        .name("instclone-elevation".into())
        .spawn(move || {
            let results = elevator.run_privileged(&batch);
            // Nobody listens after a timeout or cancellation
            let _ = tx.send(results);
        })?;

    let deadline = wait.timeout.map(|timeout| Instant::now() + timeout);
    loop {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(Some(results)) => {
                debug!(results = results.len(), "elevated run reported back");
                return Ok(EscalatedOutcome {
                    got_result: true,
                    results,
                    requested,
                });
            }
            Ok(None) | Err(RecvTimeoutError::Disconnected) => {
                warn!("elevated run produced no results");
                return Ok(EscalatedOutcome {
                    got_result: false,
                    results: Vec::new(),
                    requested,
                });
            }
            Err(RecvTimeoutError::Timeout) => {
                if wait.is_cancelled() {
                    return Err(Error::Cancelled);
                }
                if let (Some(deadline), Some(timeout)) = (deadline, wait.timeout) {
                    if Instant::now() >= deadline {
                        warn!(?timeout, "elevated run did not report back in time");
                        return Err(Error::ElevationTimedOut(timeout));
                    }
                }
            }
        }
    }
}
