//! Report Building

use super::metadata::build_report_meta;
use super::sweep::SweepOutcome;
use qsweep_core::Incomplete;
use qsweep_report::{IncompleteEntry, ReportSettings, SweepReport};

fn reason(incomplete: &Incomplete) -> String {
    incomplete.first_problem.clone().unwrap_or_else(|| {
        format!(
            "{}/{} repetitions succeeded",
            incomplete.successes, incomplete.expected
        )
    })
}

/// Assemble the sweep report from the driver's outcome
pub fn build_report(settings: ReportSettings, outcome: &SweepOutcome) -> SweepReport {
    SweepReport {
        meta: build_report_meta(),
        settings,
        summary: outcome.summary.clone(),
        calibrations: outcome.calibrations.clone(),
        incomplete: outcome
            .incomplete
            .iter()
            .map(|incomplete| IncompleteEntry {
                configuration: incomplete.configuration.to_string(),
                reason: reason(incomplete),
            })
            .collect(),
    }
}
