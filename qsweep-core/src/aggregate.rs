//! Repetition Aggregation
//!
//! All-or-nothing reduction of a configuration's repetitions. A row exists
//! only when exactly `runs` repetitions succeeded; any failure or timeout
//! discards the whole configuration.

use crate::{Configuration, RunOutcome};
use qsweep_stats::compute_summary;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One completed configuration, ready for the sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    /// The measured configuration
    pub configuration: Configuration,
    /// Mean throughput score
    pub score: f64,
    /// Population standard deviation of the scores
    pub score_error: f64,
    /// Repetitions aggregated (always the requested count)
    pub runs: u32,
}

impl ResultRow {
    /// Identity of this row for resume bookkeeping
    pub fn key(&self) -> RowKey {
        RowKey::new(&self.configuration, self.runs)
    }
}

/// Identity of a row in the sink: every column except the scores
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowKey {
    /// Queue identifier
    pub queue: String,
    /// Producer count
    pub producers: u32,
    /// Consumer count
    pub consumers: u32,
    /// Queue capacity
    pub size: u64,
    /// Operations per run
    pub items: u64,
    /// Repetitions
    pub runs: u32,
    /// Delay, absent in sinks without a delay column
    pub delay_ns: Option<u64>,
}

impl RowKey {
    /// Key for `configuration` measured with `runs` repetitions
    pub fn new(configuration: &Configuration, runs: u32) -> Self {
        Self {
            queue: configuration.queue.clone(),
            producers: configuration.producers(),
            consumers: configuration.consumers(),
            size: configuration.capacity,
            items: configuration.ops,
            runs,
            delay_ns: Some(configuration.delay_ns),
        }
    }

    /// Same key without the delay column
    pub fn without_delay(mut self) -> Self {
        self.delay_ns = None;
        self
    }
}

/// Why a configuration produced no row
#[derive(Debug, Clone, PartialEq)]
pub struct Incomplete {
    /// The discarded configuration
    pub configuration: Configuration,
    /// Requested repetitions
    pub expected: u32,
    /// Successful repetitions observed
    pub successes: u32,
    /// Repetitions that failed
    pub failures: u32,
    /// Repetitions that timed out
    pub timeouts: u32,
    /// Description of the first failed or timed-out repetition
    pub first_problem: Option<String>,
}

impl fmt::Display for Incomplete {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}/{} repetitions succeeded ({} failed, {} timed out)",
            self.configuration, self.successes, self.expected, self.failures, self.timeouts
        )?;
        if let Some(problem) = &self.first_problem {
            write!(f, ", first problem: {}", problem)?;
        }
        Ok(())
    }
}

impl std::error::Error for Incomplete {}

/// Reduce the outcomes of one configuration.
///
/// Returns the row when every one of the `runs` repetitions succeeded.
pub fn reduce(
    configuration: &Configuration,
    outcomes: &[RunOutcome],
    runs: u32,
) -> Result<ResultRow, Incomplete> {
    let mut scores = Vec::with_capacity(outcomes.len());
    let mut failures = 0u32;
    let mut timeouts = 0u32;
    let mut first_problem = None;

    for (index, outcome) in outcomes.iter().enumerate() {
        match outcome {
            RunOutcome::Success(score) => scores.push(*score),
            RunOutcome::Failure { .. } => failures += 1,
            RunOutcome::Timeout(_) => timeouts += 1,
        }
        if !outcome.is_success() && first_problem.is_none() {
            first_problem = Some(format!("repetition {}: {}", index + 1, outcome));
        }
    }

    let successes = scores.len() as u32;
    if failures > 0 || timeouts > 0 || successes != runs {
        return Err(Incomplete {
            configuration: configuration.clone(),
            expected: runs,
            successes,
            failures,
            timeouts,
            first_problem,
        });
    }

    let summary = compute_summary(&scores);
    Ok(ResultRow {
        configuration: configuration.clone(),
        score: summary.mean,
        score_error: summary.std_dev,
        runs,
    })
}
