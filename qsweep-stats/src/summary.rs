//! Score Summary
//!
//! A configuration's repetitions are the whole population of interest, so the
//! dispersion is the population standard deviation (divide by `n`, not `n - 1`).
//! A single repetition therefore has a standard deviation of exactly 0.

/// Summary of one configuration's repetition scores
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreSummary {
    /// Arithmetic mean
    pub mean: f64,
    /// Population standard deviation
    pub std_dev: f64,
}

/// Arithmetic mean; 0 for an empty slice.
pub fn mean(scores: &[f64]) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    scores.iter().sum::<f64>() / scores.len() as f64
}

/// Population standard deviation; 0 for fewer than two scores.
pub fn population_std_dev(scores: &[f64]) -> f64 {
    if scores.len() < 2 {
        return 0.0;
    }
    let mean = mean(scores);
    let variance = scores.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / scores.len() as f64;
    variance.sqrt()
}

/// Compute the summary of a set of repetition scores
pub fn compute_summary(scores: &[f64]) -> ScoreSummary {
    ScoreSummary {
        mean: mean(scores),
        std_dev: population_std_dev(scores),
    }
}
