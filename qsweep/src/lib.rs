#![warn(missing_docs)]
//! # qsweep
//!
//! Calibrated parameter-sweep harness for black-box concurrent queue benchmarks.
//!
//! qsweep drives an external worker executable across a matrix of
//! configurations and writes one CSV row per configuration whose repetitions
//! all succeeded:
//! - **Deterministic sweeps**: queue × thread pair × size × delay, always in the same order
//! - **Delay calibration**: target delays are turned into busy-wait parameters by an external probe, once per delay
//! - **Bounded runs**: every run gets a timeout proportional to the delay it injects
//! - **All-or-nothing rows**: a configuration with any failed or timed-out repetition produces no row
//! - **Append-only output**: rows are flushed one at a time, so an interrupted sweep can be resumed
//!
//! ## Quick Start
//!
//! ```text
//! qsweep init > sweep.toml
//! qsweep plan
//! qsweep validate
//! qsweep --report sweep.json
//! ```
//!
//! ## Library Use
//!
//! ```ignore
//! use qsweep::{ProcessProbe, ProcessWorker, SinkTarget, SweepDriver, SweepMatrix};
//!
//! let mut driver = SweepDriver::new(
//!     ProcessWorker::new("./All2All"),
//!     ProcessProbe::new("./time"),
//!     qsweep::ProbeSettings::default(),
//!     qsweep::TimeoutPolicy::default(),
//! );
//! let outcome = driver.run(&matrix, &SinkTarget { path: "sweep.csv".into(), resume: false })?;
//! ```

// Re-export core types
pub use qsweep_core::{
    AffinityList, Calibration, CalibrationError, Configuration, DelayCalibrator, Incomplete,
    Probe, ProbeRequest, ProbeSettings, QueueRejection, ResultRow, RowKey, RunOutcome, ThreadPair,
    TimeoutPolicy, TimeoutTable, Worker, reduce,
};

// Re-export report types
pub use qsweep_report::{
    ResultWriter, RowSchema, SinkError, SweepReport, SweepSummary, generate_json_report,
    read_completed,
};

// Re-export stats
pub use qsweep_stats::{ScoreSummary, compute_summary};

// Re-export driver types
pub use qsweep_cli::{
    ProcessProbe, ProcessWorker, SinkTarget, SweepConfig, SweepDriver, SweepError, SweepMatrix,
    SweepOutcome, SweepPlan, ThreadShape, build_plan,
};

/// Run the qsweep CLI.
///
/// ```ignore
/// fn main() -> anyhow::Result<()> {
///     qsweep::run()
/// }
/// ```
pub use qsweep_cli::run;
