//! Sweep Executor
//!
//! Drives a planned sweep against a worker and collects the results.
//!
//! ## Pipeline Overview
//!
//! ```text
//! SweepMatrix (from sweep.toml + CLI)
//!       │
//!       ▼
//! ┌─────────────┐
//! │ validation  │  Zero-workload run per queue; any rejection aborts
//! └──────┬──────┘
//!        │
//!        ▼
//! ┌─────────────┐
//! │    sweep    │  Calibrate, bound, repeat, reduce, append row
//! └──────┬──────┘
//!        │
//!        ▼
//! ┌─────────────┐
//! │   report    │  SweepReport with metadata and calibration table
//! └──────┬──────┘
//!        │
//!        ▼
//! ┌─────────────┐
//! │ formatting  │  Human-readable summary
//! └─────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`validation`] - Pre-flight queue check
//! - [`sweep`] - Sequential sweep driver
//! - [`report`] - Report building
//! - [`formatting`] - Human-readable output formatting
//! - [`metadata`] - System metadata collection

mod formatting;
mod metadata;
mod report;
mod sweep;
mod validation;

// Re-export public API
pub use formatting::{format_duration, format_human_output};
pub use metadata::build_report_meta;
pub use report::build_report;
pub use sweep::{SinkTarget, SweepDriver, SweepError, SweepOutcome};
pub use validation::validate_queues;
