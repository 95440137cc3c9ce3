//! Run Outcome
//!
//! Result of a single worker invocation. Callers match on the three states
//! instead of treating a non-zero exit as an unwinding error.

use std::fmt;
use std::time::Duration;

/// Outcome of one worker repetition
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Exit code 0 and a parsable, non-negative throughput score
    Success(f64),
    /// Non-zero exit, death by signal (`code: None`), spawn failure or unparsable output
    Failure {
        /// Exit code, if the process exited normally
        code: Option<i32>,
        /// Short diagnostic (stderr tail, spawn error, parse error)
        reason: String,
    },
    /// The run exceeded its bound and was terminated; output discarded
    Timeout(Duration),
}

impl RunOutcome {
    /// Score of a successful run
    pub fn score(&self) -> Option<f64> {
        match self {
            RunOutcome::Success(score) => Some(*score),
            _ => None,
        }
    }

    /// Whether this run produced a score
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Success(_))
    }

    /// Whether this run hit its time bound
    pub fn is_timeout(&self) -> bool {
        matches!(self, RunOutcome::Timeout(_))
    }

    /// Build a failure outcome
    pub fn failure(code: Option<i32>, reason: impl Into<String>) -> Self {
        RunOutcome::Failure {
            code,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Success(score) => write!(f, "score {}", score),
            RunOutcome::Failure {
                code: Some(code),
                reason,
            } => write!(f, "exit code {}: {}", code, reason),
            RunOutcome::Failure { code: None, reason } => write!(f, "failed: {}", reason),
            RunOutcome::Timeout(bound) => write!(f, "timed out after {:?}", bound),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors() {
        assert_eq!(RunOutcome::Success(3.5).score(), Some(3.5));
        assert!(RunOutcome::Success(0.0).is_success());
        assert_eq!(RunOutcome::failure(Some(1), "boom").score(), None);
        assert!(RunOutcome::Timeout(Duration::from_secs(1)).is_timeout());
        assert!(!RunOutcome::failure(None, "signal").is_timeout());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            RunOutcome::failure(Some(2), "Queue not found").to_string(),
            "exit code 2: Queue not found"
        );
        assert_eq!(
            RunOutcome::Timeout(Duration::from_secs(3)).to_string(),
            "timed out after 3s"
        );
    }
}
