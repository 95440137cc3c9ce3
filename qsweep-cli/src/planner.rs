//! Sweep Planner
//!
//! Builds the execution plan: the Cartesian product of queues, thread pairs,
//! sizes and delays.
//!
//! Ordering is fixed (queue outermost, then thread pair, then size, then
//! delay) and follows the declaration order of each axis, so the same
//! configuration lists always produce the same invocation sequence.
//!
//! Thread pairs come from explicit `[p, c]` entries followed by the expansion
//! of each declared [`ThreadShape`]; duplicates keep their first position.

use qsweep_core::{Configuration, ThreadPair};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;

/// Producer/consumer layout swept over a list of thread counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ThreadShape {
    /// `(t, t)`
    Balanced,
    /// `(t, 1)`
    ManyToOne,
    /// `(1, t)`
    OneToMany,
    /// `(1, 1)`, independent of the thread counts
    OneToOne,
}

impl ThreadShape {
    /// Pairs this shape yields for `counts`
    pub fn pairs(self, counts: &[u32]) -> Vec<ThreadPair> {
        match self {
            ThreadShape::Balanced => counts.iter().map(|&t| ThreadPair::new(t, t)).collect(),
            ThreadShape::ManyToOne => counts.iter().map(|&t| ThreadPair::new(t, 1)).collect(),
            ThreadShape::OneToMany => counts.iter().map(|&t| ThreadPair::new(1, t)).collect(),
            ThreadShape::OneToOne => vec![ThreadPair::new(1, 1)],
        }
    }
}

impl fmt::Display for ThreadShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ThreadShape::Balanced => "balanced",
            ThreadShape::ManyToOne => "many-to-one",
            ThreadShape::OneToMany => "one-to-many",
            ThreadShape::OneToOne => "one-to-one",
        };
        f.write_str(name)
    }
}

fn dedup_keep_first<T: Eq + Hash + Clone>(items: impl IntoIterator<Item = T>) -> Vec<T> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

/// Explicit pairs followed by every shape's expansion, without duplicates
pub fn thread_pairs(
    explicit: &[ThreadPair],
    shapes: &[ThreadShape],
    counts: &[u32],
) -> Vec<ThreadPair> {
    let expanded = shapes.iter().flat_map(|shape| shape.pairs(counts));
    dedup_keep_first(explicit.iter().copied().chain(expanded))
}

/// Queues matching `filter`, in declaration order and without duplicates
pub fn select_queues(queues: &[String], filter: Option<&Regex>) -> Vec<String> {
    dedup_keep_first(
        queues
            .iter()
            .filter(|q| filter.is_none_or(|re| re.is_match(q)))
            .cloned(),
    )
}

/// The axes of a sweep
#[derive(Debug, Clone, PartialEq)]
pub struct SweepMatrix {
    /// Queue identifiers
    pub queues: Vec<String>,
    /// Producer/consumer pairs
    pub thread_pairs: Vec<ThreadPair>,
    /// Queue capacities
    pub sizes: Vec<u64>,
    /// Target delays in nanoseconds
    pub delays: Vec<u64>,
    /// Operations per run
    pub ops: u64,
    /// Repetitions per configuration
    pub runs: u32,
}

/// Execution plan for a sweep
#[derive(Debug, Clone)]
pub struct SweepPlan {
    /// Configurations in enumeration order
    pub configurations: Vec<Configuration>,
    /// Repetitions per configuration
    pub runs: u32,
}

impl SweepPlan {
    /// Number of configurations
    pub fn len(&self) -> usize {
        self.configurations.len()
    }

    /// Whether the plan is empty
    pub fn is_empty(&self) -> bool {
        self.configurations.is_empty()
    }

    /// Worker invocations the plan asks for
    pub fn total_repetitions(&self) -> u64 {
        self.configurations.len() as u64 * u64::from(self.runs)
    }
}

/// Build execution plan from the sweep axes
pub fn build_plan(matrix: &SweepMatrix) -> SweepPlan {
    let mut configurations = Vec::with_capacity(
        matrix.queues.len() * matrix.thread_pairs.len() * matrix.sizes.len() * matrix.delays.len(),
    );

    for queue in &matrix.queues {
        for &threads in &matrix.thread_pairs {
            for &capacity in &matrix.sizes {
                for &delay_ns in &matrix.delays {
                    configurations.push(Configuration {
                        queue: queue.clone(),
                        threads,
                        capacity,
                        ops: matrix.ops,
                        delay_ns,
                    });
                }
            }
        }
    }

    SweepPlan {
        configurations,
        runs: matrix.runs,
    }
}
