#![warn(missing_docs)]
//! qsweep Report - Result Sink and Summaries
//!
//! - CSV sink with a fixed, validated column schema; one row per completed
//!   configuration, flushed as soon as it is written
//! - Resume support: scanning an existing sink for completed rows
//! - JSON sweep report (metadata, counters, calibrations, discarded configurations)

mod json;
mod report;
mod schema;
mod sink;

pub use json::generate_json_report;
pub use report::{
    CalibrationEntry, IncompleteEntry, ReportMeta, ReportSettings, SweepReport, SweepSummary,
    SystemInfo,
};
pub use schema::{HEADER_WITH_DELAY, HEADER_WITHOUT_DELAY, RowSchema};
pub use sink::{ResultWriter, SinkError, read_completed};

/// Version of the JSON report layout
pub const REPORT_SCHEMA_VERSION: u32 = 1;
