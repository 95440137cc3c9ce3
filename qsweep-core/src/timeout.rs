//! Run Time Bound
//!
//! `bound = max(floor, ops * 2 * delay_s * scale)`
//!
//! Every item crosses a producer-side and a consumer-side delay, hence the
//! factor 2; `scale` covers pairing and scheduling overhead on top of that.

use std::collections::HashMap;
use std::time::Duration;

/// Default minimum bound per run
pub const DEFAULT_TIMEOUT_FLOOR: Duration = Duration::from_secs(120);

/// Default overhead factor
pub const DEFAULT_TIMEOUT_SCALE: f64 = 1.5;

/// Derives a wall-clock bound from operation count and injected delay
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeoutPolicy {
    /// Minimum bound regardless of workload
    pub floor: Duration,
    /// Multiplier for producer/consumer pairing overhead
    pub scale: f64,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self {
            floor: DEFAULT_TIMEOUT_FLOOR,
            scale: DEFAULT_TIMEOUT_SCALE,
        }
    }
}

impl TimeoutPolicy {
    /// Create a policy
    pub fn new(floor: Duration, scale: f64) -> Self {
        Self { floor, scale }
    }

    /// Bound for a run of `ops` items with `delay_ns` injected per side
    pub fn bound(&self, ops: u64, delay_ns: u64) -> Duration {
        let delay_s = delay_ns as f64 / 1_000_000_000.0;
        let secs = ops as f64 * 2.0 * delay_s * self.scale;
        // Saturate instead of panicking on absurd inputs.
        let derived = Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX);
        derived.max(self.floor)
    }
}

/// Memoizes bounds per distinct (ops, delay) pair for the lifetime of a sweep
#[derive(Debug, Clone)]
pub struct TimeoutTable {
    policy: TimeoutPolicy,
    bounds: HashMap<(u64, u64), Duration>,
}

impl TimeoutTable {
    /// Create an empty table for `policy`
    pub fn new(policy: TimeoutPolicy) -> Self {
        Self {
            policy,
            bounds: HashMap::new(),
        }
    }

    /// Cached bound for (ops, delay)
    pub fn bound(&mut self, ops: u64, delay_ns: u64) -> Duration {
        let policy = self.policy;
        *self
            .bounds
            .entry((ops, delay_ns))
            .or_insert_with(|| policy.bound(ops, delay_ns))
    }
}
