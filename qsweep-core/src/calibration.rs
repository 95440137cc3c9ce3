//! Delay Calibration
//!
//! Converts a target delay (ns) into the two integer parameters of the
//! workers' randomized busy-wait, `center` and `amplitude`, by running an
//! external probe that searches for parameters whose realized mean delay is
//! within 10% of the target.
//!
//! Delays under `min_delay_ns` never reach the probe and resolve to
//! `Calibration::NONE` (no stimulus). Every other delay is probed at most once
//! per sweep: the outcome, success or failure, is cached and shared.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use thiserror::Error;

/// Delays below this many nanoseconds inject no stimulus
pub const DEFAULT_MIN_DELAY_NS: u64 = 100;

/// Measurements per probe adjustment round
pub const DEFAULT_PROBE_RUNS: u64 = 1_000;

/// Consecutive in-tolerance rounds the probe requires before answering
pub const DEFAULT_PROBE_CHECKS: u64 = 5;

/// Busy-wait stimulus parameters passed to the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Calibration {
    /// Center of the busy-wait distribution
    pub center: u64,
    /// Amplitude of the busy-wait distribution
    pub amplitude: u64,
}

impl Calibration {
    /// Sentinel meaning "inject no timing stimulus"
    pub const NONE: Calibration = Calibration {
        center: 0,
        amplitude: 0,
    };

    /// Create a calibration pair
    pub const fn new(center: u64, amplitude: u64) -> Self {
        Self { center, amplitude }
    }

    /// Whether this is the no-stimulus sentinel
    pub fn is_none(&self) -> bool {
        *self == Self::NONE
    }
}

/// Calibration failures. Non-fatal at sweep scope: only configurations using
/// the failed delay are skipped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CalibrationError {
    #[error("failed to spawn calibration probe for {delay_ns}ns: {message}")]
    Spawn { delay_ns: u64, message: String },

    #[error("calibration probe for {delay_ns}ns exited with {status}: {stderr}")]
    ProbeFailed {
        delay_ns: u64,
        status: String,
        stderr: String,
    },

    #[error("calibration probe for {delay_ns}ns timed out after {timeout:?}")]
    TimedOut { delay_ns: u64, timeout: Duration },

    #[error("calibration probe for {delay_ns}ns printed {lines} line(s), expected at least 2")]
    MissingOutput { delay_ns: u64, lines: usize },

    #[error("calibration probe for {delay_ns}ns printed non-integer line {line:?}")]
    InvalidValue { delay_ns: u64, line: String },
}

impl CalibrationError {
    /// Delay the failure belongs to
    pub fn delay_ns(&self) -> u64 {
        match self {
            CalibrationError::Spawn { delay_ns, .. }
            | CalibrationError::ProbeFailed { delay_ns, .. }
            | CalibrationError::TimedOut { delay_ns, .. }
            | CalibrationError::MissingOutput { delay_ns, .. }
            | CalibrationError::InvalidValue { delay_ns, .. } => *delay_ns,
        }
    }
}

/// Arguments of one probe invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeRequest {
    /// Target mean delay in nanoseconds
    pub delay_ns: u64,
    /// Accepted deviation from the target, in nanoseconds
    pub tolerance_ns: u64,
    /// Measurements per adjustment round
    pub runs: u64,
    /// Consecutive in-tolerance rounds required
    pub checks: u64,
}

impl ProbeRequest {
    /// Positional arguments: `<delay> <tolerance> <runs> <checks>`
    pub fn args(&self) -> [String; 4] {
        [
            self.delay_ns.to_string(),
            self.tolerance_ns.to_string(),
            self.runs.to_string(),
            self.checks.to_string(),
        ]
    }
}

/// Fixed probe parameters for a sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeSettings {
    /// Threshold below which no probe is run
    pub min_delay_ns: u64,
    /// Measurements per adjustment round
    pub runs: u64,
    /// Consecutive in-tolerance rounds required
    pub checks: u64,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            min_delay_ns: DEFAULT_MIN_DELAY_NS,
            runs: DEFAULT_PROBE_RUNS,
            checks: DEFAULT_PROBE_CHECKS,
        }
    }
}

impl ProbeSettings {
    /// Build the request for `delay_ns` (tolerance is a tenth of the target)
    pub fn request(&self, delay_ns: u64) -> ProbeRequest {
        ProbeRequest {
            delay_ns,
            tolerance_ns: delay_ns / 10,
            runs: self.runs,
            checks: self.checks,
        }
    }
}

/// Something that can run the calibration probe and return its stdout.
///
/// Implementations report spawn failures and non-zero exits as
/// `CalibrationError`; output parsing is the calibrator's job.
pub trait Probe {
    /// Run the probe once
    fn run(&self, request: &ProbeRequest) -> Result<String, CalibrationError>;
}

impl<P: Probe + ?Sized> Probe for &P {
    fn run(&self, request: &ProbeRequest) -> Result<String, CalibrationError> {
        (**self).run(request)
    }
}

type CacheEntry = Result<Calibration, CalibrationError>;

/// Resolves delays to calibrations, probing each distinct delay at most once.
///
/// Readers share the cache; the first writer for a delay runs the probe while
/// holding the write lock, so concurrent requests for the same delay observe
/// that single result.
pub struct DelayCalibrator<P> {
    probe: P,
    settings: ProbeSettings,
    cache: RwLock<HashMap<u64, CacheEntry>>,
}

impl<P: Probe> DelayCalibrator<P> {
    /// Create a calibrator with an empty cache
    pub fn new(probe: P, settings: ProbeSettings) -> Self {
        Self {
            probe,
            settings,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Resolve `delay_ns` to busy-wait parameters
    pub fn resolve(&self, delay_ns: u64) -> Result<Calibration, CalibrationError> {
        if delay_ns < self.settings.min_delay_ns {
            return Ok(Calibration::NONE);
        }

        if let Some(hit) = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&delay_ns)
        {
            tracing::debug!(delay_ns, "calibration cache hit");
            return hit.clone();
        }

        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        // Another writer may have filled the slot while we waited.
        if let Some(hit) = cache.get(&delay_ns) {
            return hit.clone();
        }

        let result = self.calibrate(delay_ns);
        match &result {
            Ok(calibration) => tracing::info!(
                delay_ns,
                center = calibration.center,
                amplitude = calibration.amplitude,
                "calibrated delay"
            ),
            Err(e) => tracing::warn!(delay_ns, error = %e, "calibration failed"),
        }
        cache.insert(delay_ns, result.clone());
        result
    }

    fn calibrate(&self, delay_ns: u64) -> Result<Calibration, CalibrationError> {
        let request = self.settings.request(delay_ns);
        let stdout = self.probe.run(&request)?;
        parse_probe_output(delay_ns, &stdout)
    }

    /// Settings in use
    pub fn settings(&self) -> ProbeSettings {
        self.settings
    }

    /// The wrapped probe
    pub fn probe(&self) -> &P {
        &self.probe
    }

    /// Every probed delay with its cached outcome, ordered by delay
    pub fn entries(&self) -> Vec<(u64, CacheEntry)> {
        let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
        let mut entries: Vec<_> = cache.iter().map(|(d, r)| (*d, r.clone())).collect();
        entries.sort_by_key(|(delay, _)| *delay);
        entries
    }
}

/// Parse `center` and `amplitude` from the first two lines of probe output.
fn parse_probe_output(delay_ns: u64, stdout: &str) -> Result<Calibration, CalibrationError> {
    let lines: Vec<&str> = stdout.lines().take(2).collect();
    if lines.len() < 2 {
        return Err(CalibrationError::MissingOutput {
            delay_ns,
            lines: lines.len(),
        });
    }

    let parse = |line: &str| {
        line.trim()
            .parse::<u64>()
            .map_err(|_| CalibrationError::InvalidValue {
                delay_ns,
                line: line.to_string(),
            })
    };

    Ok(Calibration {
        center: parse(lines[0])?,
        amplitude: parse(lines[1])?,
    })
}
