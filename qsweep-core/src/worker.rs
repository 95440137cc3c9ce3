//! Worker Seam
//!
//! The driver talks to worker executables only through this trait, so the
//! sweep logic can be exercised without spawning processes.

use crate::{Calibration, Configuration, RunOutcome};
use std::fmt;
use std::time::Duration;

/// Why a queue failed its pre-flight check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueRejection {
    /// Exit code, if the worker exited normally
    pub code: Option<i32>,
    /// Diagnostic text
    pub detail: String,
}

impl fmt::Display for QueueRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "exit code {}: {}", code, self.detail),
            None => write!(f, "{}", self.detail),
        }
    }
}

/// A benchmark worker executable under test
pub trait Worker {
    /// Run the worker once for `queue` with a zero workload; `Ok` when it exits 0.
    fn validate(&self, queue: &str) -> Result<(), QueueRejection>;

    /// Run one measured repetition, terminating it once `timeout` elapses.
    fn run(
        &self,
        configuration: &Configuration,
        calibration: Calibration,
        timeout: Duration,
    ) -> RunOutcome;
}

impl<W: Worker + ?Sized> Worker for &W {
    fn validate(&self, queue: &str) -> Result<(), QueueRejection> {
        (**self).validate(queue)
    }

    fn run(
        &self,
        configuration: &Configuration,
        calibration: Calibration,
        timeout: Duration,
    ) -> RunOutcome {
        (**self).run(configuration, calibration, timeout)
    }
}
