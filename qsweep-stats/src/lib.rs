#![warn(missing_docs)]
//! qsweep Statistics
//!
//! Descriptive statistics over the throughput scores reported by repeated
//! worker runs:
//! - Arithmetic mean
//! - Population standard deviation (every repetition is the population)

mod summary;

pub use summary::{ScoreSummary, compute_summary, mean, population_std_dev};
