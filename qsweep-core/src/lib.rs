#![warn(missing_docs)]
//! qsweep Core - Sweep Model and Policies
//!
//! This crate holds everything the sweep driver reasons about without touching
//! a process table:
//! - `Configuration` / `ThreadPair`, one point of the parameter sweep
//! - `RunOutcome`, the three-state result of a single worker repetition
//! - `DelayCalibrator`, turning a target delay into busy-wait parameters via a `Probe`
//! - `TimeoutPolicy`, the per-run wall-clock bound
//! - `reduce`, the all-or-nothing repetition aggregator producing `ResultRow`s
//! - CPU affinity lists used to pin spawned workers

mod affinity;
mod aggregate;
mod calibration;
mod outcome;
mod timeout;
mod worker;

pub use affinity::{AffinityList, pin_command};
pub use aggregate::{Incomplete, ResultRow, RowKey, reduce};
pub use calibration::{
    Calibration, CalibrationError, DEFAULT_MIN_DELAY_NS, DEFAULT_PROBE_CHECKS, DEFAULT_PROBE_RUNS,
    DelayCalibrator, Probe, ProbeRequest, ProbeSettings,
};
pub use outcome::RunOutcome;
pub use timeout::{DEFAULT_TIMEOUT_FLOOR, DEFAULT_TIMEOUT_SCALE, TimeoutPolicy, TimeoutTable};
pub use worker::{QueueRejection, Worker};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Producer/consumer thread counts handed to a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ThreadPair {
    /// Producer threads
    pub producers: u32,
    /// Consumer threads
    pub consumers: u32,
}

impl ThreadPair {
    /// Create a new pair
    pub const fn new(producers: u32, consumers: u32) -> Self {
        Self {
            producers,
            consumers,
        }
    }

    /// Total worker threads, excluding the worker's own main thread
    pub fn total(&self) -> u32 {
        self.producers + self.consumers
    }
}

impl fmt::Display for ThreadPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p:{} c:{}", self.producers, self.consumers)
    }
}

/// One point of the sweep.
///
/// Produced by the planner in enumeration order and consumed exactly once by
/// the driver.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Configuration {
    /// Queue variant understood by the worker binary
    pub queue: String,
    /// Producer/consumer split
    pub threads: ThreadPair,
    /// Queue capacity
    pub capacity: u64,
    /// Operations (items) per run
    pub ops: u64,
    /// Target injected delay in nanoseconds
    pub delay_ns: u64,
}

impl Configuration {
    /// Producer count
    pub fn producers(&self) -> u32 {
        self.threads.producers
    }

    /// Consumer count
    pub fn consumers(&self) -> u32 {
        self.threads.consumers
    }
}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{} {} size:{} items:{} delay:{}ns]",
            self.queue, self.threads, self.capacity, self.ops, self.delay_ns
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_display_names_every_axis() {
        let cfg = Configuration {
            queue: "LinkedCRQueue".to_string(),
            threads: ThreadPair::new(4, 2),
            capacity: 64,
            ops: 100_000,
            delay_ns: 17_000,
        };

        assert_eq!(
            cfg.to_string(),
            "[LinkedCRQueue p:4 c:2 size:64 items:100000 delay:17000ns]"
        );
        assert_eq!(cfg.producers(), 4);
        assert_eq!(cfg.consumers(), 2);
        assert_eq!(cfg.threads.total(), 6);
    }
}
