//! Report Data Structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Complete sweep report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepReport {
    pub meta: ReportMeta,
    pub settings: ReportSettings,
    pub summary: SweepSummary,
    pub calibrations: Vec<CalibrationEntry>,
    pub incomplete: Vec<IncompleteEntry>,
}

/// Report metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMeta {
    pub schema_version: u32,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub git_commit: Option<String>,
    pub git_branch: Option<String>,
    pub system: SystemInfo,
}

/// System information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemInfo {
    pub os: String,
    pub os_version: String,
    pub cpu: String,
    pub cpu_cores: u32,
    pub memory_gb: f64,
}

/// Sweep parameters captured in the report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSettings {
    pub worker: String,
    pub probe: Option<String>,
    pub runs: u32,
    pub ops: u64,
    pub queues: Vec<String>,
    pub sizes: Vec<u64>,
    pub delays: Vec<u64>,
    /// `(producers, consumers)` in sweep order
    pub thread_pairs: Vec<(u32, u32)>,
    pub timeout_floor_ms: u64,
    pub timeout_scale: f64,
    pub output: String,
}

/// Counters of a finished (or aborted) sweep
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SweepSummary {
    /// Configurations enumerated after filtering
    pub planned_configurations: usize,
    /// Rows written during this sweep
    pub completed: usize,
    /// Configurations that produced no row
    pub incomplete: usize,
    /// Configurations skipped because the sink already held them
    pub resumed: usize,
    /// Configurations skipped because their delay could not be calibrated
    pub calibration_skipped: usize,
    /// Worker invocations, including failed and timed out ones
    pub invocations: usize,
    pub failed_repetitions: usize,
    pub timeouts: usize,
    pub duration_ms: u64,
}

impl SweepSummary {
    /// True when every planned configuration has a row
    pub fn all_complete(&self) -> bool {
        self.incomplete == 0 && self.calibration_skipped == 0
    }
}

/// Outcome of calibrating one delay
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationEntry {
    pub delay_ns: u64,
    pub center: Option<u64>,
    pub amplitude: Option<u64>,
    pub error: Option<String>,
}

/// Configuration that produced no row, and why
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncompleteEntry {
    pub configuration: String,
    pub reason: String,
}
