#![warn(missing_docs)]
//! qsweep CLI Library
//!
//! Command-line driver for calibrated parameter sweeps. A sweep runs an
//! external worker binary over every combination of queue, thread pair, queue
//! size and injected delay, `runs` times each, and appends one CSV row per
//! fully successful combination.
//!
//! # Example
//!
//! ```ignore
//! fn main() -> anyhow::Result<()> {
//!     qsweep_cli::run()
//! }
//! ```

mod config;
mod executor;
mod planner;
mod supervisor;

pub use config::*;
pub use executor::{
    SinkTarget, SweepDriver, SweepError, SweepOutcome, build_report, build_report_meta,
    format_duration, format_human_output, validate_queues,
};
pub use planner::{
    SweepMatrix, SweepPlan, ThreadShape, build_plan, select_queues, thread_pairs,
};
pub use supervisor::{DEFAULT_GRACE, ProcessProbe, ProcessWorker};

use clap::{Parser, Subcommand};
use qsweep_core::{AffinityList, DelayCalibrator, TimeoutPolicy};
use qsweep_report::{ReportSettings, generate_json_report};
use regex::Regex;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// qsweep CLI arguments
#[derive(Parser, Debug)]
#[command(name = "qsweep")]
#[command(
    author,
    version,
    about = "qsweep - calibrated parameter sweeps over concurrent queue benchmarks"
)]
pub struct Cli {
    /// Optional subcommand (Run, Plan, Validate, Calibrate, Init); defaults to Run
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Configuration file; defaults to sweep.toml found by walking up from the current directory
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Only sweep queues matching this regex
    #[arg(long, global = true)]
    pub filter: Option<String>,

    /// Worker binary (overrides [worker].binary)
    #[arg(long, global = true)]
    pub worker: Option<PathBuf>,

    /// Calibration probe binary (overrides [probe].binary)
    #[arg(long, global = true)]
    pub probe: Option<PathBuf>,

    /// Repetitions per configuration
    #[arg(long, short = 'n', global = true)]
    pub runs: Option<u32>,

    /// Operations per run
    #[arg(long, global = true)]
    pub ops: Option<u64>,

    /// CSV sink (overrides [output].csv)
    #[arg(short, long, global = true)]
    pub output: Option<PathBuf>,

    /// Write a JSON sweep report to this file
    #[arg(long, global = true)]
    pub report: Option<PathBuf>,

    /// Append to the CSV sink and skip configurations it already holds
    #[arg(long, global = true)]
    pub resume: bool,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only warnings and errors; no progress bar or summary
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

/// CLI subcommands
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// Run the sweep (default)
    Run,
    /// Print the configurations in sweep order without running anything
    Plan,
    /// Check every queue against the worker binary
    Validate,
    /// Calibrate every configured delay and print `delay center amplitude`
    Calibrate,
    /// Print a default sweep.toml
    Init,
}

/// Run the qsweep CLI with the process arguments.
///
/// # Returns
/// Returns `Ok(())` on success, or an error if the sweep had to abort.
pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    run_with_cli(cli)
}

/// Run the qsweep CLI with pre-parsed arguments.
pub fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    init_tracing(&cli);

    if cli.command == Some(Commands::Init) {
        print!("{}", SweepConfig::default_toml());
        return Ok(());
    }

    let config = load_config(&cli)?;

    match cli.command {
        Some(Commands::Plan) => print_plan(&cli, &config),
        Some(Commands::Validate) => validate_command(&cli, &config),
        Some(Commands::Calibrate) => calibrate_command(&cli, &config),
        Some(Commands::Run) | None => run_sweep(&cli, &config),
        Some(Commands::Init) => Ok(()),
    }
}

fn init_tracing(cli: &Cli) {
    let default = if cli.verbose {
        "qsweep=debug"
    } else if cli.quiet {
        "qsweep=warn"
    } else {
        "qsweep=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // A subscriber may already be installed when embedded; keep it.
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// `--config`, else a discovered sweep.toml, else defaults
fn load_config(cli: &Cli) -> anyhow::Result<SweepConfig> {
    let path = cli.config.clone().or_else(SweepConfig::discover);
    match path {
        Some(path) => {
            tracing::debug!(path = %path.display(), "loading configuration");
            SweepConfig::load(&path)
        }
        None => Ok(SweepConfig::default()),
    }
}

/// Sweep axes after CLI overrides and the queue filter
fn build_matrix(cli: &Cli, config: &SweepConfig) -> anyhow::Result<SweepMatrix> {
    let filter = cli
        .filter
        .as_deref()
        .map(Regex::new)
        .transpose()
        .map_err(|e| anyhow::anyhow!("invalid --filter: {}", e))?;

    let queues = select_queues(&config.sweep.queues, filter.as_ref());
    if queues.is_empty() {
        anyhow::bail!("no queues to sweep: set [sweep].queues (or loosen --filter)");
    }

    let pairs = thread_pairs(
        &config.sweep.explicit_pairs(),
        &config.sweep.shapes,
        &config.sweep.thread_counts,
    );
    if pairs.is_empty() {
        anyhow::bail!(
            "no thread pairs: set [sweep].threads, or [sweep].shapes with thread_counts"
        );
    }
    if let Some(pair) = pairs.iter().find(|p| p.producers == 0 || p.consumers == 0) {
        anyhow::bail!("thread pair {} needs at least one producer and one consumer", pair);
    }

    let runs = cli.runs.unwrap_or(config.sweep.runs);
    if runs == 0 {
        anyhow::bail!("runs must be at least 1");
    }

    Ok(SweepMatrix {
        queues,
        thread_pairs: pairs,
        sizes: config.sweep.sizes.clone(),
        delays: config.sweep.delays.clone(),
        ops: cli.ops.unwrap_or(config.sweep.ops),
        runs,
    })
}

fn build_worker(
    cli: &Cli,
    config: &SweepConfig,
    policy: TimeoutPolicy,
) -> anyhow::Result<ProcessWorker> {
    let binary = cli
        .worker
        .clone()
        .or_else(|| config.worker.binary.clone())
        .ok_or_else(|| anyhow::anyhow!("no worker binary: set [worker].binary or pass --worker"))?;

    let mut worker = ProcessWorker::new(binary)
        .with_imbalance(config.worker.imbalance)
        .with_grace(config.timeout.grace()?)
        .with_validation_timeout(policy.floor);

    if let Some(dir) = &config.worker.working_dir {
        worker = worker.with_working_dir(dir);
    }

    if let Some(path) = &config.affinity.pinning_file {
        let affinity = AffinityList::load(path)
            .map_err(|e| anyhow::anyhow!("cannot read pinning file {}: {}", path.display(), e))?;
        if affinity.is_empty() {
            tracing::warn!(path = %path.display(), "pinning file lists no CPUs, workers run unpinned");
        } else {
            tracing::info!(cpus = affinity.len(), "pinning workers");
            worker = worker.with_affinity(affinity);
        }
    }

    Ok(worker)
}

fn probe_binary(cli: &Cli, config: &SweepConfig) -> Option<PathBuf> {
    cli.probe.clone().or_else(|| config.probe.binary.clone())
}

fn build_probe(cli: &Cli, config: &SweepConfig, delays: &[u64]) -> anyhow::Result<ProcessProbe> {
    let min_delay_ns = config.probe.min_delay_ns;
    let needs_probe = delays.iter().any(|&delay| delay >= min_delay_ns);

    match probe_binary(cli, config) {
        Some(binary) => {
            let floor = config.timeout.policy()?.floor;
            let mut probe =
                ProcessProbe::new(binary).with_timeout(floor, config.timeout.grace()?);
            if let Some(dir) = &config.worker.working_dir {
                probe = probe.with_working_dir(dir);
            }
            Ok(probe)
        }
        None if needs_probe => anyhow::bail!(
            "delays of {}ns or more need a calibration probe: set [probe].binary or pass --probe",
            min_delay_ns
        ),
        None => Ok(ProcessProbe::missing()),
    }
}

fn print_plan(cli: &Cli, config: &SweepConfig) -> anyhow::Result<()> {
    let matrix = build_matrix(cli, config)?;
    let plan = build_plan(&matrix);

    println!("qsweep Plan:");

    let mut queues: BTreeMap<usize, (&str, Vec<String>)> = BTreeMap::new();
    for configuration in &plan.configurations {
        let position = matrix
            .queues
            .iter()
            .position(|q| *q == configuration.queue)
            .unwrap_or(0);
        queues
            .entry(position)
            .or_insert_with(|| (configuration.queue.as_str(), Vec::new()))
            .1
            .push(format!(
                "{} size:{} delay:{}ns",
                configuration.threads, configuration.capacity, configuration.delay_ns
            ));
    }

    for (queue, entries) in queues.values() {
        println!("├── queue: {}", queue);
        for entry in entries {
            println!("│   ├── {}", entry);
        }
    }

    println!(
        "{} configurations x {} runs = {} worker invocations ({} ops each).",
        plan.len(),
        plan.runs,
        plan.total_repetitions(),
        matrix.ops
    );
    Ok(())
}

fn validate_command(cli: &Cli, config: &SweepConfig) -> anyhow::Result<()> {
    let matrix = build_matrix(cli, config)?;
    let worker = build_worker(cli, config, config.timeout.policy()?)?;

    let invalid = validate_queues(&worker, &matrix.queues);
    for queue in &matrix.queues {
        match invalid.iter().find(|(q, _)| q == queue) {
            Some((_, rejection)) => println!("  ✗ {} ({})", queue, rejection),
            None => println!("  ✓ {}", queue),
        }
    }

    if !invalid.is_empty() {
        return Err(
            SweepError::InvalidQueues(invalid.into_iter().map(|(q, _)| q).collect()).into(),
        );
    }
    println!("{} queues valid.", matrix.queues.len());
    Ok(())
}

fn calibrate_command(cli: &Cli, config: &SweepConfig) -> anyhow::Result<()> {
    let delays = &config.sweep.delays;
    let probe = build_probe(cli, config, delays)?;
    let calibrator = DelayCalibrator::new(probe, config.probe.settings());

    let mut failed = 0usize;
    for &delay_ns in delays {
        match calibrator.resolve(delay_ns) {
            Ok(calibration) => {
                println!("{} {} {}", delay_ns, calibration.center, calibration.amplitude)
            }
            Err(e) => {
                failed += 1;
                println!("{} error: {}", delay_ns, e);
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{} of {} delays could not be calibrated", failed, delays.len());
    }
    Ok(())
}

fn report_settings(
    cli: &Cli,
    config: &SweepConfig,
    matrix: &SweepMatrix,
    worker: &ProcessWorker,
    policy: TimeoutPolicy,
    sink: &SinkTarget,
) -> ReportSettings {
    ReportSettings {
        worker: worker.binary().display().to_string(),
        probe: probe_binary(cli, config).map(|p| p.display().to_string()),
        runs: matrix.runs,
        ops: matrix.ops,
        queues: matrix.queues.clone(),
        sizes: matrix.sizes.clone(),
        delays: matrix.delays.clone(),
        thread_pairs: matrix
            .thread_pairs
            .iter()
            .map(|p| (p.producers, p.consumers))
            .collect(),
        timeout_floor_ms: policy.floor.as_millis() as u64,
        timeout_scale: policy.scale,
        output: sink.path.display().to_string(),
    }
}

fn run_sweep(cli: &Cli, config: &SweepConfig) -> anyhow::Result<()> {
    let matrix = build_matrix(cli, config)?;
    let policy = config.timeout.policy()?;
    let worker = build_worker(cli, config, policy)?;
    let probe = build_probe(cli, config, &matrix.delays)?;

    let sink = SinkTarget {
        path: cli.output.clone().unwrap_or_else(|| config.output.csv.clone()),
        resume: cli.resume || config.output.resume,
    };
    let report_path = cli.report.clone().or_else(|| config.output.report.clone());
    let settings = report_settings(cli, config, &matrix, &worker, policy, &sink);

    if !cli.quiet {
        println!(
            "Sweeping {} queue(s), {} thread pair(s), {} size(s), {} delay(s), {} runs each...\n",
            matrix.queues.len(),
            matrix.thread_pairs.len(),
            matrix.sizes.len(),
            matrix.delays.len(),
            matrix.runs
        );
    }

    let mut driver = SweepDriver::new(worker, probe, config.probe.settings(), policy)
        .with_progress(!cli.quiet);
    let outcome = driver.run(&matrix, &sink)?;

    let report = build_report(settings, &outcome);

    if let Some(path) = report_path {
        let json = generate_json_report(&report)?;
        std::fs::write(&path, json)
            .map_err(|e| anyhow::anyhow!("cannot write report {}: {}", path.display(), e))?;
        if !cli.quiet {
            println!("Report written to: {}", path.display());
        }
    }

    if !cli.quiet {
        print!("{}", format_human_output(&report));
        println!("Results written to: {}", sink.path.display());
    }

    Ok(())
}
