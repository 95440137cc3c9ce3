//! Output Formatting
//!
//! Human-readable summary of a finished sweep: counters, the calibration
//! table and every configuration that produced no row.

use qsweep_report::SweepReport;

/// Format milliseconds as `850ms`, `12.3s`, `4m 05s` or `2h 03m`
pub fn format_duration(ms: u64) -> String {
    if ms < 1_000 {
        format!("{}ms", ms)
    } else if ms < 60_000 {
        format!("{:.1}s", ms as f64 / 1_000.0)
    } else if ms < 3_600_000 {
        format!("{}m {:02}s", ms / 60_000, (ms % 60_000) / 1_000)
    } else {
        format!("{}h {:02}m", ms / 3_600_000, (ms % 3_600_000) / 60_000)
    }
}

/// Format a report for human-readable terminal display
pub fn format_human_output(report: &SweepReport) -> String {
    let summary = &report.summary;
    let mut output = String::new();

    output.push('\n');
    output.push_str("qsweep Results\n");
    output.push_str(&"=".repeat(60));
    output.push_str("\n\n");

    output.push_str(&format!(
        "  configurations: {} planned, {} completed, {} incomplete\n",
        summary.planned_configurations, summary.completed, summary.incomplete
    ));
    if summary.resumed > 0 || summary.calibration_skipped > 0 {
        output.push_str(&format!(
            "  skipped:        {} already in {}, {} without calibration\n",
            summary.resumed, report.settings.output, summary.calibration_skipped
        ));
    }
    output.push_str(&format!(
        "  repetitions:    {} run, {} failed, {} timed out\n",
        summary.invocations, summary.failed_repetitions, summary.timeouts
    ));
    output.push_str(&format!(
        "  duration:       {}\n",
        format_duration(summary.duration_ms)
    ));

    if !report.calibrations.is_empty() {
        output.push_str("\nCalibrations\n");
        output.push_str(&"-".repeat(60));
        output.push('\n');
        for entry in &report.calibrations {
            match (&entry.error, entry.center, entry.amplitude) {
                (None, Some(center), Some(amplitude)) => output.push_str(&format!(
                    "  ✓ {:>10} ns  center {}  amplitude {}\n",
                    entry.delay_ns, center, amplitude
                )),
                (error, _, _) => output.push_str(&format!(
                    "  ✗ {:>10} ns  {}\n",
                    entry.delay_ns,
                    error.as_deref().unwrap_or("no result")
                )),
            }
        }
    }

    if !report.incomplete.is_empty() {
        output.push_str("\nIncomplete configurations\n");
        output.push_str(&"-".repeat(60));
        output.push('\n');
        for entry in &report.incomplete {
            output.push_str(&format!("  ✗ {}\n      {}\n", entry.configuration, entry.reason));
        }
    }

    output.push('\n');
    output
}
