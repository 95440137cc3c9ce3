//! Configuration loading from sweep.toml
//!
//! A sweep is described by a `sweep.toml` file, discovered by walking up from
//! the current directory or named explicitly with `--config`. Every field has
//! a default, so a file only needs the parts that differ.

use crate::planner::ThreadShape;
use qsweep_core::{
    DEFAULT_MIN_DELAY_NS, DEFAULT_PROBE_CHECKS, DEFAULT_PROBE_RUNS, ProbeSettings, ThreadPair,
    TimeoutPolicy,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File name looked up during discovery
pub const CONFIG_FILE_NAME: &str = "sweep.toml";

/// qsweep configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SweepConfig {
    /// Worker executable
    #[serde(default)]
    pub worker: WorkerConfig,
    /// Calibration probe
    #[serde(default)]
    pub probe: ProbeConfig,
    /// Sweep matrix
    #[serde(default)]
    pub sweep: MatrixConfig,
    /// Per-run time bound
    #[serde(default)]
    pub timeout: TimeoutConfig,
    /// Result sink and report
    #[serde(default)]
    pub output: OutputConfig,
    /// CPU pinning
    #[serde(default)]
    pub affinity: AffinityConfig,
}

/// Worker executable configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WorkerConfig {
    /// Path to the worker binary
    #[serde(default)]
    pub binary: Option<PathBuf>,
    /// Directory the worker runs in (defaults to the current directory)
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    /// Workload imbalance passed as the last positional argument
    #[serde(default)]
    pub imbalance: Option<i64>,
}

/// Calibration probe configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Path to the probe binary; only needed when a delay is calibrated
    #[serde(default)]
    pub binary: Option<PathBuf>,
    /// Measurements per adjustment round
    #[serde(default = "default_probe_runs")]
    pub runs: u64,
    /// Consecutive in-tolerance rounds required
    #[serde(default = "default_probe_checks")]
    pub checks: u64,
    /// Delays below this many nanoseconds inject no stimulus
    #[serde(default = "default_min_delay_ns")]
    pub min_delay_ns: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            binary: None,
            runs: default_probe_runs(),
            checks: default_probe_checks(),
            min_delay_ns: default_min_delay_ns(),
        }
    }
}

impl ProbeConfig {
    /// Calibrator settings
    pub fn settings(&self) -> ProbeSettings {
        ProbeSettings {
            min_delay_ns: self.min_delay_ns,
            runs: self.runs,
            checks: self.checks,
        }
    }
}

fn default_probe_runs() -> u64 {
    DEFAULT_PROBE_RUNS
}
fn default_probe_checks() -> u64 {
    DEFAULT_PROBE_CHECKS
}
fn default_min_delay_ns() -> u64 {
    DEFAULT_MIN_DELAY_NS
}

/// Sweep matrix configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatrixConfig {
    /// Queue identifiers, in sweep order
    #[serde(default)]
    pub queues: Vec<String>,
    /// Explicit `[producers, consumers]` pairs
    #[serde(default)]
    pub threads: Vec<[u32; 2]>,
    /// Shapes expanded over `thread_counts`, after the explicit pairs
    #[serde(default)]
    pub shapes: Vec<ThreadShape>,
    /// Thread counts the shapes expand
    #[serde(default)]
    pub thread_counts: Vec<u32>,
    /// Queue capacities
    #[serde(default = "default_sizes")]
    pub sizes: Vec<u64>,
    /// Target delays in nanoseconds
    #[serde(default = "default_delays")]
    pub delays: Vec<u64>,
    /// Operations per run
    #[serde(default = "default_ops")]
    pub ops: u64,
    /// Repetitions per configuration
    #[serde(default = "default_runs")]
    pub runs: u32,
}

impl Default for MatrixConfig {
    fn default() -> Self {
        Self {
            queues: Vec::new(),
            threads: Vec::new(),
            shapes: Vec::new(),
            thread_counts: Vec::new(),
            sizes: default_sizes(),
            delays: default_delays(),
            ops: default_ops(),
            runs: default_runs(),
        }
    }
}

impl MatrixConfig {
    /// Explicit pairs as [`ThreadPair`]s
    pub fn explicit_pairs(&self) -> Vec<ThreadPair> {
        self.threads
            .iter()
            .map(|&[producers, consumers]| ThreadPair::new(producers, consumers))
            .collect()
    }
}

fn default_sizes() -> Vec<u64> {
    vec![64]
}
fn default_delays() -> Vec<u64> {
    vec![0]
}
fn default_ops() -> u64 {
    100_000
}
fn default_runs() -> u32 {
    10
}

/// Timeout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Minimum bound for any run (e.g., "120s", "5m")
    #[serde(default = "default_floor")]
    pub floor: String,
    /// Multiplier applied to the total injected delay
    #[serde(default = "default_scale")]
    pub scale: f64,
    /// Time between SIGTERM and SIGKILL once a run exceeds its bound
    #[serde(default = "default_grace")]
    pub grace: String,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            floor: default_floor(),
            scale: default_scale(),
            grace: default_grace(),
        }
    }
}

impl TimeoutConfig {
    /// Build the timeout policy
    pub fn policy(&self) -> anyhow::Result<TimeoutPolicy> {
        let floor = SweepConfig::parse_std_duration(&self.floor)?;
        if !self.scale.is_finite() || self.scale <= 0.0 {
            anyhow::bail!("timeout.scale must be a positive number, got {}", self.scale);
        }
        Ok(TimeoutPolicy::new(floor, self.scale))
    }

    /// SIGTERM to SIGKILL window
    pub fn grace(&self) -> anyhow::Result<Duration> {
        SweepConfig::parse_std_duration(&self.grace)
    }
}

fn default_floor() -> String {
    "120s".to_string()
}
fn default_scale() -> f64 {
    qsweep_core::DEFAULT_TIMEOUT_SCALE
}
fn default_grace() -> String {
    "500ms".to_string()
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// CSV sink
    #[serde(default = "default_csv")]
    pub csv: PathBuf,
    /// JSON sweep report (not written unless set)
    #[serde(default)]
    pub report: Option<PathBuf>,
    /// Append to an existing sink and skip configurations it already holds
    #[serde(default)]
    pub resume: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            csv: default_csv(),
            report: None,
            resume: false,
        }
    }
}

fn default_csv() -> PathBuf {
    PathBuf::from("sweep.csv")
}

/// CPU pinning configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AffinityConfig {
    /// Ordered logical CPU list, one id per line
    #[serde(default)]
    pub pinning_file: Option<PathBuf>,
}

impl SweepConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("cannot read {}: {}", path.display(), e))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("invalid configuration {}: {}", path.display(), e))?;
        Ok(config)
    }

    /// Find `sweep.toml` by walking up from the current directory
    pub fn discover() -> Option<PathBuf> {
        let mut dir = std::env::current_dir().ok()?;
        loop {
            let config_path = dir.join(CONFIG_FILE_NAME);
            if config_path.exists() {
                return Some(config_path);
            }
            if !dir.pop() {
                break;
            }
        }
        None
    }

    /// Generate a default configuration as TOML string
    pub fn default_toml() -> String {
        r#"# qsweep configuration

[worker]
# Worker executable: <queue> <producers> <consumers> <size> <ops> <center> <amplitude> [imbalance]
binary = "./build/All2All"
# Directory the worker runs in (uncomment to enable)
# working_dir = "build"
# Workload imbalance passed as the 8th argument (uncomment to enable)
# imbalance = 1

[probe]
# Calibration probe: <delay> <tolerance> <runs> <checks>, prints center and amplitude
binary = "./build/time"
# Measurements per adjustment round
runs = 1000
# Consecutive in-tolerance rounds required
checks = 5
# Delays below this inject no stimulus and skip the probe
min_delay_ns = 100

[sweep]
queues = ["LinkedMuxQueue", "FAAArrayQueue"]
# Explicit [producers, consumers] pairs
threads = [[1, 1]]
# Shapes over thread_counts: "balanced", "many-to-one", "one-to-many", "one-to-one"
shapes = ["balanced"]
thread_counts = [2, 4, 8]
sizes = [64]
# Target delays in nanoseconds
delays = [0]
ops = 100000
runs = 10

[timeout]
# Minimum bound for a single run
floor = "120s"
# Multiplier on ops * 2 * delay
scale = 1.5
# SIGTERM to SIGKILL window
grace = "500ms"

[output]
csv = "sweep.csv"
# JSON sweep report (uncomment to enable)
# report = "sweep.json"
# Append to csv and skip configurations it already holds
resume = false

[affinity]
# Ordered CPU list, one id per line (uncomment to enable)
# pinning_file = "pinning.txt"
"#
        .to_string()
    }

    /// Parse duration string (e.g., "3s", "500ms", "2m") to nanoseconds
    pub fn parse_duration(s: &str) -> anyhow::Result<u64> {
        let s = s.trim();
        if s.is_empty() {
            return Err(anyhow::anyhow!("Empty duration string"));
        }

        // Find where the number ends and unit begins
        let (num_part, unit_part) = s
            .char_indices()
            .find(|(_, c)| c.is_alphabetic())
            .map(|(i, _)| s.split_at(i))
            .unwrap_or((s, "s"));

        let value: f64 = num_part
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid duration number: {}", num_part))?;
        if !value.is_finite() || value < 0.0 {
            return Err(anyhow::anyhow!("Invalid duration: {}", s));
        }

        let multiplier: u64 = match unit_part.to_lowercase().as_str() {
            "ns" => 1,
            "us" | "µs" => 1_000,
            "ms" => 1_000_000,
            "s" | "" => 1_000_000_000,
            "m" | "min" => 60_000_000_000,
            _ => return Err(anyhow::anyhow!("Unknown duration unit: {}", unit_part)),
        };

        Ok((value * multiplier as f64) as u64)
    }

    /// [`parse_duration`](Self::parse_duration) as a [`Duration`]
    pub fn parse_std_duration(s: &str) -> anyhow::Result<Duration> {
        Self::parse_duration(s).map(Duration::from_nanos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SweepConfig::default();
        assert_eq!(config.probe.runs, 1000);
        assert_eq!(config.probe.checks, 5);
        assert_eq!(config.probe.min_delay_ns, 100);
        assert_eq!(config.sweep.sizes, vec![64]);
        assert_eq!(config.sweep.delays, vec![0]);
        assert_eq!(config.timeout.floor, "120s");
        assert!(!config.output.resume);
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(SweepConfig::parse_duration("3s").unwrap(), 3_000_000_000);
        assert_eq!(SweepConfig::parse_duration("500ms").unwrap(), 500_000_000);
        assert_eq!(SweepConfig::parse_duration("100us").unwrap(), 100_000);
        assert_eq!(SweepConfig::parse_duration("1000ns").unwrap(), 1000);
        assert_eq!(SweepConfig::parse_duration("2m").unwrap(), 120_000_000_000);
        assert_eq!(SweepConfig::parse_duration("1.5s").unwrap(), 1_500_000_000);
        assert_eq!(SweepConfig::parse_duration("90").unwrap(), 90_000_000_000);
        assert!(SweepConfig::parse_duration("").is_err());
        assert!(SweepConfig::parse_duration("-1s").is_err());
        assert!(SweepConfig::parse_duration("3h").is_err());
    }

    #[test]
    fn test_parse_toml() {
        let toml_str = r#"
            [worker]
            binary = "./All2All"
            imbalance = 2

            [sweep]
            queues = ["A", "B"]
            threads = [[1, 1], [4, 2]]
            shapes = ["many-to-one"]
            thread_counts = [8]
            runs = 3

            [timeout]
            floor = "5s"
        "#;

        let config: SweepConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.worker.imbalance, Some(2));
        assert_eq!(config.sweep.queues, vec!["A", "B"]);
        assert_eq!(
            config.sweep.explicit_pairs(),
            vec![ThreadPair::new(1, 1), ThreadPair::new(4, 2)]
        );
        assert_eq!(config.sweep.shapes, vec![ThreadShape::ManyToOne]);
        assert_eq!(config.sweep.runs, 3);
        // Defaults should still apply
        assert_eq!(config.sweep.ops, 100_000);
        assert_eq!(config.timeout.scale, 1.5);
        assert_eq!(
            config.timeout.policy().unwrap().floor,
            Duration::from_secs(5)
        );
    }

    #[test]
    fn test_rejects_bad_scale() {
        let config = TimeoutConfig {
            scale: 0.0,
            ..TimeoutConfig::default()
        };
        assert!(config.policy().is_err());
    }

    #[test]
    fn test_default_toml_parses() {
        let config: SweepConfig = toml::from_str(&SweepConfig::default_toml()).unwrap();
        assert_eq!(config.probe.runs, 1000);
        assert_eq!(config.sweep.shapes, vec![ThreadShape::Balanced]);
        assert_eq!(config.timeout.grace().unwrap(), Duration::from_millis(500));
        assert_eq!(config.output.csv, PathBuf::from("sweep.csv"));
    }

    #[test]
    fn test_load_reports_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[sweep]\nruns = \"many\"\n").unwrap();

        let err = SweepConfig::load(&path).unwrap_err().to_string();
        assert!(err.contains(CONFIG_FILE_NAME));
    }
}
