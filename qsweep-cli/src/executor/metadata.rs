//! Report Metadata
//!
//! Where the sweep ran: git revision of the current directory, platform and
//! the host's CPU and memory. Hardware details are read from `/proc` and fall
//! back to "Unknown" / 0 where it does not exist.

use chrono::Utc;
use qsweep_report::{REPORT_SCHEMA_VERSION, ReportMeta, SystemInfo};
use std::path::Path;
use std::process::Command;

const KIB_PER_GIB: f64 = 1024.0 * 1024.0;

/// Build report metadata including system info and git details
pub fn build_report_meta() -> ReportMeta {
    let memory_gb = proc_field("/proc/meminfo", "MemTotal")
        .and_then(|value| value.trim_end_matches("kB").trim().parse::<u64>().ok())
        .map_or(0.0, |kib| kib as f64 / KIB_PER_GIB);

    let system = SystemInfo {
        os: std::env::consts::OS.to_string(),
        os_version: std::env::consts::ARCH.to_string(),
        cpu: proc_field("/proc/cpuinfo", "model name").unwrap_or_else(|| "Unknown".to_string()),
        cpu_cores: std::thread::available_parallelism().map_or(1, |n| n.get() as u32),
        memory_gb,
    };

    ReportMeta {
        schema_version: REPORT_SCHEMA_VERSION,
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
        git_commit: git(&["rev-parse", "HEAD"]),
        git_branch: git(&["rev-parse", "--abbrev-ref", "HEAD"]),
        system,
    }
}

/// Trimmed stdout of a successful git command
fn git(args: &[&str]) -> Option<String> {
    Command::new("git")
        .args(args)
        .output()
        .ok()
        .filter(|o| o.status.success())
        .and_then(|o| String::from_utf8(o.stdout).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Value of the first `key : value` line of a `/proc`-style file
fn proc_field(path: impl AsRef<Path>, key: &str) -> Option<String> {
    let content = std::fs::read_to_string(path).ok()?;
    content
        .lines()
        .filter(|line| line.starts_with(key))
        .find_map(|line| line.split_once(':'))
        .map(|(_, value)| value.trim().to_string())
}
