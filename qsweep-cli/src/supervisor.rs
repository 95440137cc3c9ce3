//! Supervisor
//!
//! Spawns worker and probe processes, enforces the per-run bound and turns
//! exits into [`RunOutcome`]s.
//!
//! Each worker leads its own process group so that a timeout reaches every
//! process it started: SIGTERM first, SIGKILL once the grace window ends.
//! Output of a terminated run is discarded.

use qsweep_core::{
    AffinityList, Calibration, CalibrationError, Configuration, DEFAULT_TIMEOUT_FLOOR, Probe,
    ProbeRequest, QueueRejection, RunOutcome, Worker, pin_command,
};
use std::io::{self, Read};
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

/// Default SIGTERM to SIGKILL window
pub const DEFAULT_GRACE: Duration = Duration::from_millis(500);

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Arguments of the zero-workload validation run
const VALIDATION_ARGS: [&str; 6] = ["1", "1", "1", "0", "0", "0"];

/// Signal every process in the group led by `pid`.
fn signal_group(pid: u32, signal: libc::c_int) -> Result<(), io::Error> {
    let ret = unsafe { libc::kill(-(pid as libc::pid_t), signal) };
    if ret == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

#[derive(Debug)]
enum Exit {
    Finished {
        status: ExitStatus,
        stdout: String,
        stderr: String,
    },
    TimedOut,
}

fn drain(mut pipe: impl Read + Send + 'static) -> Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        let _ = tx.send(buf);
    });
    rx
}

/// Wait for a pipe to reach EOF. `None` if the deadline passes first.
fn collect(pipe: Option<Receiver<Vec<u8>>>, deadline: Option<Instant>) -> Option<String> {
    let Some(pipe) = pipe else {
        return Some(String::new());
    };
    let bytes = match deadline {
        Some(deadline) => {
            match pipe.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
                Ok(bytes) => bytes,
                Err(RecvTimeoutError::Disconnected) => Vec::new(),
                Err(RecvTimeoutError::Timeout) => return None,
            }
        }
        None => pipe.recv().unwrap_or_default(),
    };
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

/// Run `command` until it exits or `timeout` elapses.
fn supervise(mut command: Command, timeout: Duration, grace: Duration) -> io::Result<Exit> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0);

    let mut child = command.spawn()?;
    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);

    // `None` when the bound is too large to represent: wait indefinitely.
    let deadline = Instant::now().checked_add(timeout);

    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                // The bound covers the whole group: a descendant still holding
                // an output pipe keeps the run going.
                return match (collect(stdout, deadline), collect(stderr, deadline)) {
                    (Some(stdout), Some(stderr)) => Ok(Exit::Finished {
                        status,
                        stdout,
                        stderr,
                    }),
                    _ => {
                        let _ = signal_group(child.id(), libc::SIGKILL);
                        Ok(Exit::TimedOut)
                    }
                };
            }
            Ok(None) => {}
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(e);
            }
        }

        if let Some(deadline) = deadline {
            let now = Instant::now();
            if now >= deadline {
                terminate(&mut child, grace);
                // Descendants may still hold the pipes; the drain threads are left detached.
                return Ok(Exit::TimedOut);
            }
            thread::sleep(POLL_INTERVAL.min(deadline - now));
        } else {
            thread::sleep(POLL_INTERVAL);
        }
    }
}

/// SIGTERM the group, wait up to `grace`, then SIGKILL whatever is left.
fn terminate(child: &mut Child, grace: Duration) {
    let pid = child.id();
    if let Err(e) = signal_group(pid, libc::SIGTERM) {
        tracing::debug!(pid, error = %e, "SIGTERM not delivered");
    }

    let deadline = Instant::now().checked_add(grace).unwrap_or_else(Instant::now);
    while Instant::now() < deadline {
        if matches!(child.try_wait(), Ok(Some(_))) {
            break;
        }
        thread::sleep(POLL_INTERVAL);
    }

    let _ = signal_group(pid, libc::SIGKILL);
    let _ = child.kill();
    let _ = child.wait();
}

/// Last non-empty stderr line, or a description of how the process ended
fn diagnostic(status: &ExitStatus, stderr: &str) -> String {
    if let Some(line) = stderr.lines().map(str::trim).rfind(|l| !l.is_empty()) {
        return line.to_string();
    }
    match status.signal() {
        Some(signal) => format!("terminated by signal {}", signal),
        None => "no diagnostic output".to_string(),
    }
}

/// Parse the single score line of a successful run
fn parse_score(stdout: &str) -> Result<f64, String> {
    let lines: Vec<&str> = stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    let line = match lines.as_slice() {
        [line] => *line,
        [] => return Err("no score printed".to_string()),
        many => return Err(format!("expected one score line, got {}", many.len())),
    };

    let score: f64 = line
        .parse()
        .map_err(|_| format!("unparsable score {:?}", line))?;
    if !score.is_finite() || score < 0.0 {
        return Err(format!("invalid score {}", score));
    }
    Ok(score)
}

/// Worker executable driven through its positional-argument contract:
/// `<queue> <producers> <consumers> <size> <ops> <center> <amplitude> [imbalance]`
#[derive(Debug, Clone)]
pub struct ProcessWorker {
    binary: PathBuf,
    working_dir: Option<PathBuf>,
    imbalance: Option<i64>,
    grace: Duration,
    validation_timeout: Duration,
    affinity: Option<AffinityList>,
}

impl ProcessWorker {
    /// Worker at `binary`, run in the current directory
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            working_dir: None,
            imbalance: None,
            grace: DEFAULT_GRACE,
            validation_timeout: DEFAULT_TIMEOUT_FLOOR,
            affinity: None,
        }
    }

    /// Run the worker inside `dir`
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Pass `imbalance` as the trailing argument of measured runs
    pub fn with_imbalance(mut self, imbalance: Option<i64>) -> Self {
        self.imbalance = imbalance;
        self
    }

    /// SIGTERM to SIGKILL window on timeout
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Bound for the zero-workload validation run
    pub fn with_validation_timeout(mut self, timeout: Duration) -> Self {
        self.validation_timeout = timeout;
        self
    }

    /// Pin each run to the head of `affinity`
    pub fn with_affinity(mut self, affinity: AffinityList) -> Self {
        self.affinity = Some(affinity);
        self
    }

    /// Worker binary
    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Positional arguments of a measured run
    pub fn arguments(&self, configuration: &Configuration, calibration: Calibration) -> Vec<String> {
        let mut args = vec![
            configuration.queue.clone(),
            configuration.producers().to_string(),
            configuration.consumers().to_string(),
            configuration.capacity.to_string(),
            configuration.ops.to_string(),
            calibration.center.to_string(),
            calibration.amplitude.to_string(),
        ];
        if let Some(imbalance) = self.imbalance {
            args.push(imbalance.to_string());
        }
        args
    }

    fn command<S: AsRef<std::ffi::OsStr>>(&self, args: &[S]) -> Command {
        let mut command = Command::new(&self.binary);
        command.args(args);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }
        command
    }
}

impl Worker for ProcessWorker {
    fn validate(&self, queue: &str) -> Result<(), QueueRejection> {
        let mut args = vec![queue];
        args.extend(VALIDATION_ARGS);
        let command = self.command(&args);

        match supervise(command, self.validation_timeout, self.grace) {
            Ok(Exit::Finished { status, .. }) if status.success() => Ok(()),
            Ok(Exit::Finished { status, stderr, .. }) => Err(QueueRejection {
                code: status.code(),
                detail: diagnostic(&status, &stderr),
            }),
            Ok(Exit::TimedOut) => Err(QueueRejection {
                code: None,
                detail: format!("timed out after {:?}", self.validation_timeout),
            }),
            Err(e) => Err(QueueRejection {
                code: None,
                detail: format!("failed to spawn {}: {}", self.binary.display(), e),
            }),
        }
    }

    fn run(
        &self,
        configuration: &Configuration,
        calibration: Calibration,
        timeout: Duration,
    ) -> RunOutcome {
        let args = self.arguments(configuration, calibration);
        let mut command = self.command(&args);
        if let Some(affinity) = &self.affinity {
            // +1 for the worker's coordinating main thread
            let count = configuration.threads.total() as usize + 1;
            pin_command(&mut command, affinity.select(count));
        }

        tracing::debug!(
            binary = %self.binary.display(),
            args = %args.join(" "),
            timeout = ?timeout,
            "spawning worker"
        );

        match supervise(command, timeout, self.grace) {
            Ok(Exit::Finished {
                status, stdout, ..
            }) if status.success() => match parse_score(&stdout) {
                Ok(score) => RunOutcome::Success(score),
                Err(reason) => RunOutcome::failure(status.code(), reason),
            },
            Ok(Exit::Finished { status, stderr, .. }) => {
                RunOutcome::failure(status.code(), diagnostic(&status, &stderr))
            }
            Ok(Exit::TimedOut) => RunOutcome::Timeout(timeout),
            Err(e) => RunOutcome::failure(
                None,
                format!("failed to spawn {}: {}", self.binary.display(), e),
            ),
        }
    }
}

/// Calibration probe executable: `<delay> <tolerance> <runs> <checks>`
#[derive(Debug, Clone)]
pub struct ProcessProbe {
    binary: Option<PathBuf>,
    working_dir: Option<PathBuf>,
    timeout: Duration,
    grace: Duration,
}

impl Default for ProcessProbe {
    fn default() -> Self {
        Self {
            binary: None,
            working_dir: None,
            timeout: DEFAULT_TIMEOUT_FLOOR,
            grace: DEFAULT_GRACE,
        }
    }
}

impl ProcessProbe {
    /// Probe at `binary`
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: Some(binary.into()),
            ..Self::default()
        }
    }

    /// Probe for sweeps without a configured binary; every run fails
    pub fn missing() -> Self {
        Self::default()
    }

    /// Run the probe inside `dir`
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Bound for one probe run, and the SIGTERM to SIGKILL window after it
    pub fn with_timeout(mut self, timeout: Duration, grace: Duration) -> Self {
        self.timeout = timeout;
        self.grace = grace;
        self
    }
}

impl Probe for ProcessProbe {
    fn run(&self, request: &ProbeRequest) -> Result<String, CalibrationError> {
        let delay_ns = request.delay_ns;
        let binary = self.binary.as_ref().ok_or_else(|| CalibrationError::Spawn {
            delay_ns,
            message: "no probe binary configured".to_string(),
        })?;

        let args = request.args();
        let mut command = Command::new(binary);
        command.args(&args);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        tracing::debug!(binary = %binary.display(), args = %args.join(" "), "spawning probe");

        let exit = supervise(command, self.timeout, self.grace).map_err(|e| {
            CalibrationError::Spawn {
                delay_ns,
                message: format!("{}: {}", binary.display(), e),
            }
        })?;

        match exit {
            Exit::Finished { status, stdout, .. } if status.success() => Ok(stdout),
            Exit::Finished { status, stderr, .. } => Err(CalibrationError::ProbeFailed {
                delay_ns,
                status: status.to_string(),
                stderr: diagnostic(&status, &stderr),
            }),
            Exit::TimedOut => Err(CalibrationError::TimedOut {
                delay_ns,
                timeout: self.timeout,
            }),
        }
    }
}
