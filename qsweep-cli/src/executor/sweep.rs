//! Sweep Driver
//!
//! Single-threaded and sequential: one worker process is outstanding at a
//! time, repetitions run in order, and configurations follow the plan. The
//! calibration cache and the CSV sink are the only state shared across
//! configurations.

use super::validation::validate_queues;
use crate::planner::{SweepMatrix, build_plan};
use indicatif::{ProgressBar, ProgressStyle};
use qsweep_core::{
    Calibration, Configuration, DelayCalibrator, Incomplete, Probe, ProbeSettings, RowKey,
    RunOutcome, TimeoutPolicy, TimeoutTable, Worker, reduce,
};
use qsweep_report::{
    CalibrationEntry, ResultWriter, RowSchema, SinkError, SweepSummary, read_completed,
};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors that end a sweep
#[derive(Debug, Error)]
pub enum SweepError {
    #[error("invalid queues: {}", .0.join(", "))]
    InvalidQueues(Vec<String>),

    #[error("result sink failed: {0}")]
    Sink(#[from] SinkError),
}

/// CSV sink of a sweep
#[derive(Debug, Clone)]
pub struct SinkTarget {
    /// File path
    pub path: PathBuf,
    /// Append and skip configurations already present instead of truncating
    pub resume: bool,
}

/// What a finished sweep produced besides its rows
#[derive(Debug, Clone)]
pub struct SweepOutcome {
    /// Counters
    pub summary: SweepSummary,
    /// Configurations without a row, in plan order
    pub incomplete: Vec<Incomplete>,
    /// Every calibrated delay, ordered by delay
    pub calibrations: Vec<CalibrationEntry>,
    /// Column layout of the sink
    pub schema: RowSchema,
}

/// Repetition progress over the whole sweep.
///
/// `step` counts attempted repetitions, successful or not. Repetitions that
/// will never run are taken out of `total`, so a finished sweep ends at
/// `step == total`.
struct Progress {
    bar: ProgressBar,
    step: u64,
    total: u64,
}

impl Progress {
    fn new(total: u64, visible: bool) -> Self {
        let bar = if visible {
            let pb = ProgressBar::new(total);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template(
                        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
                    )
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-"),
            );
            pb
        } else {
            ProgressBar::hidden()
        };
        Self { bar, step: 0, total }
    }

    fn attempt(&mut self) {
        self.step += 1;
        self.bar.inc(1);
    }

    fn forgo(&mut self, repetitions: u64) {
        self.total = self.total.saturating_sub(repetitions);
        self.bar.set_length(self.total);
    }

    fn percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            self.step as f64 * 100.0 / self.total as f64
        }
    }

    fn label(&self, configuration: &Configuration) {
        self.bar.set_message(format!(
            "{} {}",
            configuration.queue, configuration.threads
        ));
    }
}

/// Sequential sweep driver
pub struct SweepDriver<W, P> {
    worker: W,
    calibrator: DelayCalibrator<P>,
    timeouts: TimeoutTable,
    show_progress: bool,
}

impl<W: Worker, P: Probe> SweepDriver<W, P> {
    /// Create a driver; the progress bar is off until [`with_progress`](Self::with_progress).
    pub fn new(worker: W, probe: P, settings: ProbeSettings, policy: TimeoutPolicy) -> Self {
        Self {
            worker,
            calibrator: DelayCalibrator::new(probe, settings),
            timeouts: TimeoutTable::new(policy),
            show_progress: false,
        }
    }

    /// Draw a progress bar on stderr
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// The calibration cache
    pub fn calibrator(&self) -> &DelayCalibrator<P> {
        &self.calibrator
    }

    /// Run the sweep described by `matrix`, appending rows to `sink`.
    ///
    /// Fails only when a queue is rejected (before any measurement) or the
    /// sink cannot be written. Rows flushed before a sink failure stay valid.
    pub fn run(
        &mut self,
        matrix: &SweepMatrix,
        sink: &SinkTarget,
    ) -> Result<SweepOutcome, SweepError> {
        let start = Instant::now();

        let invalid = validate_queues(&self.worker, &matrix.queues);
        if !invalid.is_empty() {
            return Err(SweepError::InvalidQueues(
                invalid.into_iter().map(|(queue, _)| queue).collect(),
            ));
        }

        let plan = build_plan(matrix);
        let schema = RowSchema::for_delays(&matrix.delays, self.calibrator.settings().min_delay_ns);

        let completed = if sink.resume {
            read_completed(&sink.path, schema)?
        } else {
            BTreeSet::new()
        };
        let mut writer = if sink.resume {
            ResultWriter::append(&sink.path, schema)?
        } else {
            ResultWriter::create(&sink.path, schema)?
        };

        let runs = u64::from(plan.runs);
        let mut summary = SweepSummary {
            planned_configurations: plan.len(),
            ..Default::default()
        };
        let mut incomplete = Vec::new();
        let mut progress = Progress::new(plan.total_repetitions(), self.show_progress);

        tracing::info!(
            configurations = plan.len(),
            repetitions = plan.total_repetitions(),
            already_done = completed.len(),
            output = %sink.path.display(),
            "starting sweep"
        );

        for configuration in &plan.configurations {
            let key = schema.key_of(RowKey::new(configuration, plan.runs));
            if completed.contains(&key) {
                summary.resumed += 1;
                progress.forgo(runs);
                tracing::debug!(configuration = %configuration, "already in sink, skipping");
                continue;
            }

            let calibration = match self.calibrator.resolve(configuration.delay_ns) {
                Ok(calibration) => calibration,
                Err(e) => {
                    summary.calibration_skipped += 1;
                    progress.forgo(runs);
                    tracing::warn!(
                        configuration = %configuration,
                        error = %e,
                        "skipping configuration, delay not calibrated"
                    );
                    continue;
                }
            };

            let timeout = self.timeouts.bound(configuration.ops, configuration.delay_ns);
            tracing::debug!(configuration = %configuration, ?timeout, "run bound");

            progress.label(configuration);
            let outcomes = self.repeat(
                configuration,
                calibration,
                timeout,
                plan.runs,
                &mut summary,
                &mut progress,
            );

            match reduce(configuration, &outcomes, plan.runs) {
                Ok(row) => {
                    tracing::info!(
                        configuration = %configuration,
                        score = row.score,
                        score_error = row.score_error,
                        "row written"
                    );
                    writer.write_row(row)?;
                    summary.completed += 1;
                }
                Err(missing) => {
                    tracing::warn!("incomplete runs for {}", missing);
                    summary.incomplete += 1;
                    incomplete.push(missing);
                }
            }

            tracing::info!(
                "[{} {} size:{} delay:{}] {}/{} ({:.2}%)",
                configuration.queue,
                configuration.threads,
                configuration.capacity,
                configuration.delay_ns,
                progress.step,
                progress.total,
                progress.percent()
            );
        }

        progress.bar.finish_with_message("Complete");
        summary.duration_ms = start.elapsed().as_millis() as u64;

        tracing::info!(
            rows = writer.rows_written(),
            incomplete = summary.incomplete,
            skipped = summary.calibration_skipped,
            resumed = summary.resumed,
            "sweep finished"
        );

        Ok(SweepOutcome {
            summary,
            incomplete,
            calibrations: self.calibration_table(),
            schema,
        })
    }

    /// Run up to `runs` repetitions, stopping at the first one without a score.
    fn repeat(
        &self,
        configuration: &Configuration,
        calibration: Calibration,
        timeout: Duration,
        runs: u32,
        summary: &mut SweepSummary,
        progress: &mut Progress,
    ) -> Vec<RunOutcome> {
        let mut outcomes = Vec::with_capacity(runs as usize);

        for repetition in 1..=runs {
            let outcome = self.worker.run(configuration, calibration, timeout);
            summary.invocations += 1;
            progress.attempt();

            match &outcome {
                RunOutcome::Success(score) => {
                    tracing::debug!(repetition, score, "repetition complete");
                }
                RunOutcome::Failure { .. } => {
                    summary.failed_repetitions += 1;
                    tracing::error!(
                        "Error in run {} for queue {} {}: {}",
                        repetition,
                        configuration.queue,
                        configuration.threads,
                        outcome
                    );
                }
                RunOutcome::Timeout(_) => {
                    summary.timeouts += 1;
                    tracing::error!(
                        "Timeout in run {} for queue {} {}",
                        repetition,
                        configuration.queue,
                        configuration.threads
                    );
                }
            }

            let stop = !outcome.is_success();
            outcomes.push(outcome);
            if stop {
                // The configuration can no longer produce a row.
                progress.forgo(u64::from(runs - repetition));
                break;
            }
        }

        outcomes
    }

    /// Every probed delay with its result
    pub fn calibration_table(&self) -> Vec<CalibrationEntry> {
        self.calibrator
            .entries()
            .into_iter()
            .map(|(delay_ns, result)| match result {
                Ok(calibration) => CalibrationEntry {
                    delay_ns,
                    center: Some(calibration.center),
                    amplitude: Some(calibration.amplitude),
                    error: None,
                },
                Err(e) => CalibrationEntry {
                    delay_ns,
                    center: None,
                    amplitude: None,
                    error: Some(e.to_string()),
                },
            })
            .collect()
    }
}
