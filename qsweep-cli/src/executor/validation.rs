//! Queue Validation
//!
//! Runs the worker once per queue with a zero workload before any measurement,
//! so a broken binary or a misspelled queue is caught before a long sweep.

use qsweep_core::{QueueRejection, Worker};

/// Validate every queue; returns the rejected ones in input order.
pub fn validate_queues<W: Worker>(worker: &W, queues: &[String]) -> Vec<(String, QueueRejection)> {
    queues
        .iter()
        .filter_map(|queue| match worker.validate(queue) {
            Ok(()) => {
                tracing::info!(queue = %queue, "queue validated");
                None
            }
            Err(rejection) => {
                tracing::error!(queue = %queue, reason = %rejection, "invalid queue");
                Some((queue.clone(), rejection))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use qsweep_core::{Calibration, Configuration, RunOutcome};
    use std::cell::RefCell;
    use std::time::Duration;

    struct Checker {
        accepted: &'static [&'static str],
        seen: RefCell<Vec<String>>,
    }

    impl Worker for Checker {
        fn validate(&self, queue: &str) -> Result<(), QueueRejection> {
            self.seen.borrow_mut().push(queue.to_string());
            if self.accepted.iter().any(|q| *q == queue) {
                Ok(())
            } else {
                Err(QueueRejection {
                    code: Some(1),
                    detail: "unknown queue".to_string(),
                })
            }
        }

        fn run(&self, _: &Configuration, _: Calibration, _: Duration) -> RunOutcome {
            panic!("validation must not run measurements");
        }
    }

    #[test]
    fn test_reports_every_invalid_queue() {
        let checker = Checker {
            accepted: &["A", "B"],
            seen: RefCell::new(Vec::new()),
        };
        let queues: Vec<String> = ["A", "X", "B", "Y"].iter().map(|s| s.to_string()).collect();

        let invalid = validate_queues(&checker, &queues);

        let names: Vec<_> = invalid.iter().map(|(q, _)| q.as_str()).collect();
        assert_eq!(names, vec!["X", "Y"]);
        assert_eq!(invalid[0].1.code, Some(1));
        // Every queue is checked exactly once, in order.
        assert_eq!(*checker.seen.borrow(), queues);
    }

    #[test]
    fn test_all_valid() {
        let checker = Checker {
            accepted: &["A"],
            seen: RefCell::new(Vec::new()),
        };
        assert!(validate_queues(&checker, &["A".to_string()]).is_empty());
    }
}
