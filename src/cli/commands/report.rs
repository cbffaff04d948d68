//! Printing batch reports.

use anyhow::{bail, Result};
use serde::Serialize;

use super::Context;
use crate::batch::BatchReport;
use crate::ui::output;

/// Print `report` and fail if any repository failed.
///
/// Text mode prints one line per repository, `describe` rendering the
/// successful results.
pub fn finish<T, F>(ctx: &Context, action: &str, report: &BatchReport<T>, describe: F) -> Result<()>
where
    T: Serialize,
    F: Fn(&T) -> String,
{
    if ctx.json {
        output::print_json(report)?;
    } else {
        for done in &report.succeeded {
            output::print(
                format!("{}: {}", done.repository, describe(&done.result)),
                ctx.verbosity,
            );
        }
        for failure in &report.failed {
            output::error(format!("{}: {}", failure.repository, failure.error));
        }
        output::print(summary(action, report), ctx.verbosity);
    }

    if !report.is_success() {
        bail!(
            "{} of {} repositories failed",
            report.failed.len(),
            report.total()
        );
    }
    Ok(())
}

fn summary<T>(action: &str, report: &BatchReport<T>) -> String {
    let mut line = format!(
        "{}: {} of {} repositories done",
        action,
        report.succeeded.len(),
        report.total()
    );
    if !report.failed.is_empty() {
        let failed: Vec<String> = report
            .failed
            .iter()
            .map(|f| f.repository.to_string())
            .collect();
        line.push_str("\nfailed:\n");
        line.push_str(&output::format_list(&failed, "  - "));
    }
    line
}
