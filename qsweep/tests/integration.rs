//! Integration tests for qsweep
//!
//! Every test drives real processes: the worker and the probe are small shell
//! scripts written into a temporary directory. They log their arguments to a
//! file next to themselves, so the tests can count exactly what was invoked.

use qsweep::{
    ProbeSettings, ProcessProbe, ProcessWorker, RowSchema, SinkTarget, SweepConfig, SweepDriver,
    SweepMatrix, ThreadPair, TimeoutPolicy,
};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tempfile::TempDir;

/// Accepts queues A, B and slow. Validation runs (0 ops) only check the name.
/// `slow` hangs, everything else scores 1000.
const WORKER: &str = r#"
case "$1" in
  A|B|slow) ;;
  *) echo "unknown queue: $1" >&2; exit 2 ;;
esac
[ "$5" = "0" ] && exit 0
echo "$*" >> "$(dirname "$0")/calls.log"
[ "$1" = "slow" ] && sleep 30
echo 1000
"#;

const PROBE: &str = r#"
echo "$*" >> "$(dirname "$0")/probe.log"
echo 950
echo 40
"#;

fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn lines(path: &Path) -> Vec<String> {
    match std::fs::read_to_string(path) {
        Ok(text) => text.lines().map(String::from).collect(),
        Err(_) => Vec::new(),
    }
}

fn matrix(queues: &[&str], delays: &[u64], runs: u32) -> SweepMatrix {
    SweepMatrix {
        queues: queues.iter().map(|q| q.to_string()).collect(),
        thread_pairs: vec![ThreadPair::new(1, 1), ThreadPair::new(2, 2)],
        sizes: vec![64],
        delays: delays.to_vec(),
        ops: 100,
        runs,
    }
}

struct Bench {
    dir: TempDir,
    worker: PathBuf,
    probe: PathBuf,
}

impl Bench {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let worker = script(dir.path(), "worker.sh", WORKER);
        let probe = script(dir.path(), "probe.sh", PROBE);
        Self { dir, worker, probe }
    }

    fn driver(&self, floor: Duration) -> SweepDriver<ProcessWorker, ProcessProbe> {
        SweepDriver::new(
            ProcessWorker::new(&self.worker).with_grace(Duration::from_millis(100)),
            ProcessProbe::new(&self.probe),
            ProbeSettings::default(),
            TimeoutPolicy::new(floor, 1.5),
        )
        .with_progress(false)
    }

    fn sink(&self, resume: bool) -> SinkTarget {
        SinkTarget {
            path: self.path("out.csv"),
            resume,
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn write_config(&self, queues: &str, delays: &str) -> PathBuf {
        let toml = format!(
            r#"
[worker]
binary = "{worker}"

[probe]
binary = "{probe}"

[sweep]
queues = {queues}
threads = [[1, 1]]
delays = {delays}
ops = 100
runs = 2

[timeout]
floor = "5s"
grace = "100ms"

[output]
csv = "{csv}"
"#,
            worker = self.worker.display(),
            probe = self.probe.display(),
            csv = self.path("out.csv").display(),
        );
        let path = self.path("sweep.toml");
        std::fs::write(&path, toml).unwrap();
        path
    }

    fn qsweep(&self, args: &[&str]) -> std::process::Output {
        Command::new(env!("CARGO_BIN_EXE_qsweep"))
            .args(args)
            .current_dir(self.dir.path())
            .env_remove("RUST_LOG")
            .output()
            .unwrap()
    }
}

/// Rows land in sweep order, one per configuration, repetitions back to back
#[test]
fn test_sweep_writes_rows_in_order() {
    let bench = Bench::new();
    let mut driver = bench.driver(Duration::from_secs(5));

    let outcome = driver.run(&matrix(&["A", "B"], &[0], 2), &bench.sink(false)).unwrap();

    assert_eq!(outcome.schema, RowSchema::WithoutDelay);
    assert_eq!(outcome.summary.invocations, 8);
    assert_eq!(outcome.summary.completed, 4);
    assert!(outcome.summary.all_complete());

    let calls = lines(&bench.path("calls.log"));
    assert_eq!(
        calls,
        [
            "A 1 1 64 100 0 0",
            "A 1 1 64 100 0 0",
            "A 2 2 64 100 0 0",
            "A 2 2 64 100 0 0",
            "B 1 1 64 100 0 0",
            "B 1 1 64 100 0 0",
            "B 2 2 64 100 0 0",
            "B 2 2 64 100 0 0",
        ]
    );

    let csv = lines(&bench.path("out.csv"));
    assert_eq!(csv.len(), 5);
    assert_eq!(csv[1], "A,1,1,64,100,2,1000,0");
    assert_eq!(csv[4], "B,2,2,64,100,2,1000,0");

    // Delays below the threshold never reach the probe
    assert!(lines(&bench.path("probe.log")).is_empty());
}

/// A hanging worker is killed at the floor and its configuration stops early
#[test]
fn test_timeout_stops_configuration() {
    let bench = Bench::new();
    let mut driver = bench.driver(Duration::from_millis(300));

    let mut matrix = matrix(&["slow", "A"], &[0], 3);
    matrix.thread_pairs.truncate(1);

    let started = std::time::Instant::now();
    let outcome = driver.run(&matrix, &bench.sink(false)).unwrap();
    assert!(started.elapsed() < Duration::from_secs(20));

    assert_eq!(outcome.summary.timeouts, 1);
    assert_eq!(outcome.summary.incomplete, 1);
    assert_eq!(outcome.summary.completed, 1);
    assert_eq!(outcome.incomplete[0].configuration.queue, "slow");

    let calls = lines(&bench.path("calls.log"));
    assert_eq!(calls.iter().filter(|c| c.starts_with("slow ")).count(), 1);
    assert_eq!(calls.iter().filter(|c| c.starts_with("A ")).count(), 3);

    let csv = lines(&bench.path("out.csv"));
    assert_eq!(csv.len(), 2);
    assert!(csv[1].starts_with("A,"));
}

/// One probe run per distinct delay, its answer passed to every worker run
#[test]
fn test_calibration_once_per_delay() {
    let bench = Bench::new();
    let mut driver = bench.driver(Duration::from_secs(5));

    let outcome = driver
        .run(&matrix(&["A", "B"], &[0, 1000], 1), &bench.sink(false))
        .unwrap();

    assert_eq!(outcome.schema, RowSchema::WithDelay);
    assert_eq!(outcome.summary.completed, 8);

    let probes = lines(&bench.path("probe.log"));
    assert_eq!(probes, ["1000 100 1000 5"]);

    let calls = lines(&bench.path("calls.log"));
    assert_eq!(calls.len(), 8);
    assert_eq!(calls[0], "A 1 1 64 100 0 0");
    assert_eq!(calls[1], "A 1 1 64 100 950 40");
    assert_eq!(calls.iter().filter(|c| c.ends_with(" 950 40")).count(), 4);

    let csv = lines(&bench.path("out.csv"));
    assert!(csv.contains(&"B,2,2,64,100,1,1000,1000,0".to_string()));
}

/// An unknown queue aborts the sweep before any measured run
#[test]
fn test_invalid_queue_aborts() {
    let bench = Bench::new();
    let mut driver = bench.driver(Duration::from_secs(5));

    let err = driver
        .run(&matrix(&["A", "Nope"], &[0], 2), &bench.sink(false))
        .unwrap_err();

    assert!(err.to_string().contains("Nope"));
    assert!(lines(&bench.path("calls.log")).is_empty());
    assert!(!bench.path("out.csv").exists());
}

/// A resumed sweep only runs the configurations the sink is missing
#[test]
fn test_resume_skips_written_rows() {
    let bench = Bench::new();

    bench
        .driver(Duration::from_secs(5))
        .run(&matrix(&["A"], &[0], 2), &bench.sink(false))
        .unwrap();
    assert_eq!(lines(&bench.path("calls.log")).len(), 4);

    let outcome = bench
        .driver(Duration::from_secs(5))
        .run(&matrix(&["A", "B"], &[0], 2), &bench.sink(true))
        .unwrap();

    assert_eq!(outcome.summary.resumed, 2);
    assert_eq!(outcome.summary.invocations, 4);

    let calls = lines(&bench.path("calls.log"));
    assert_eq!(calls.len(), 8);
    assert!(calls[4..].iter().all(|c| c.starts_with("B ")));

    let csv = lines(&bench.path("out.csv"));
    assert_eq!(csv.len(), 5);
    assert_eq!(csv.iter().filter(|l| l.starts_with("Queue,")).count(), 1);
}

/// The binary runs a configured sweep and writes the JSON report
#[test]
fn test_cli_run_with_report() {
    let bench = Bench::new();
    let config = bench.write_config(r#"["A", "B"]"#, "[0]");

    let output = bench.qsweep(&[
        "--config",
        config.to_str().unwrap(),
        "--report",
        "report.json",
        "-q",
    ]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let csv = lines(&bench.path("out.csv"));
    assert_eq!(csv.len(), 3);

    let report = std::fs::read_to_string(bench.path("report.json")).unwrap();
    let report: qsweep::SweepReport = serde_json::from_str(&report).unwrap();
    assert_eq!(report.summary.completed, 2);
    assert_eq!(report.summary.invocations, 4);
    assert_eq!(report.settings.queues, ["A", "B"]);
}

/// The binary exits non-zero and names the queue it rejected
#[test]
fn test_cli_invalid_queue() {
    let bench = Bench::new();
    let config = bench.write_config(r#"["A", "Nope"]"#, "[0]");

    let output = bench.qsweep(&["--config", config.to_str().unwrap(), "-q"]);

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("invalid queues: Nope"));
    assert!(lines(&bench.path("calls.log")).is_empty());
}

/// `plan` and `calibrate` only touch the probe, never the worker
#[test]
fn test_cli_plan_and_calibrate() {
    let bench = Bench::new();
    let config = bench.write_config(r#"["A"]"#, "[0, 2000]");
    let config = config.to_str().unwrap();

    let plan = bench.qsweep(&["plan", "--config", config]);
    assert!(plan.status.success());
    let plan = String::from_utf8_lossy(&plan.stdout);
    assert!(plan.contains("├── queue: A"));
    assert!(plan.contains("2 configurations x 2 runs = 4 worker invocations"));

    let calibrate = bench.qsweep(&["calibrate", "--config", config, "-q"]);
    assert!(calibrate.status.success());
    let calibrate = String::from_utf8_lossy(&calibrate.stdout);
    assert!(calibrate.contains("0 0 0"));
    assert!(calibrate.contains("2000 950 40"));

    assert_eq!(lines(&bench.path("probe.log")), ["2000 200 1000 5"]);
    assert!(lines(&bench.path("calls.log")).is_empty());
}

/// `init` prints a configuration the loader accepts
#[test]
fn test_cli_init_round_trips() {
    let bench = Bench::new();

    let output = bench.qsweep(&["init"]);
    assert!(output.status.success());

    let path = bench.path("generated.toml");
    std::fs::write(&path, &output.stdout).unwrap();
    let config = SweepConfig::load(&path).unwrap();
    assert_eq!(config.sweep.runs, 10);
    assert_eq!(config.output.csv, PathBuf::from("sweep.csv"));
}
