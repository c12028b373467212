//! Terminal summary renderer for run results.
//!
//! [`render_summary`] is a pure function from a [`RunReport`] to a
//! colorized string with dotted metric rows. Colors follow the global
//! `colored` override, which `main` disables for `--no-color` or piped
//! output.

use colored::Colorize;

use crate::orchestrator::RunReport;

/// Width for dotted metric row padding.
const PAD_WIDTH: usize = 28;

/// Render the run summary.
///
/// # Layout
///
/// ```text
///   fetchpi  slow-series | 3 fetches | capacity 4 | event
///
///   pi_estimate.................: 3.1415926535897932384626433833
///   pi_iteration................: 41832
///   pi_steps....................: 41833
///   fetch_ok....................: 2
///   fetch_failed................: 1
///   elapsed.....................: 3.2s
///
///   fetches:
///     #0........................: 3012ms  49321 bytes  sha256=3b1e...
///     #1........................: 3009ms  49321 bytes  sha256=3b1e...
///     #2........................: connection: Connection error: refused
/// ```
pub fn render_summary(report: &RunReport) -> String {
    let mut lines = vec![
        String::new(),
        format!(
            "  {}  {} | {} fetches | capacity {} | {}",
            "fetchpi".bold(),
            report.algorithm,
            report.fetches.len(),
            report.capacity,
            report.termination,
        ),
        String::new(),
    ];

    lines.push(format_metric_row(
        "pi_estimate",
        &report.estimate.value.to_string().green().to_string(),
    ));
    lines.push(format_metric_row(
        "pi_iteration",
        &report.estimate.iteration.to_string(),
    ));
    lines.push(format_metric_row(
        "pi_steps",
        &report.estimate.steps.to_string(),
    ));
    lines.push(format_metric_row(
        "fetch_ok",
        &report.succeeded().to_string().green().to_string(),
    ));
    let failed = report.failed();
    let failed_str = if failed > 0 {
        failed.to_string().red().to_string()
    } else {
        failed.to_string()
    };
    lines.push(format_metric_row("fetch_failed", &failed_str));
    lines.push(format_metric_row(
        "elapsed",
        &format!("{:.1}s", report.elapsed.as_secs_f64()),
    ));

    if !report.fetches.is_empty() {
        lines.push(String::new());
        lines.push("  fetches:".to_string());
        for outcome in &report.fetches {
            let value = match &outcome.result {
                Ok(stats) => format!(
                    "{}ms  {} bytes  sha256={}",
                    stats.duration.as_millis(),
                    stats.size,
                    stats.digest
                ),
                Err(err) => format!("{}: {err}", err.error_category())
                    .red()
                    .to_string(),
            };
            lines.push(format_metric_row(
                &format!("  #{}", outcome.task),
                &value,
            ));
        }
    }

    lines.join("\n")
}

/// Produces `"  name..........: value"`.
fn format_metric_row(name: &str, value: &str) -> String {
    format!("  {name:.<PAD_WIDTH$}: {value}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approx::{Algorithm, Estimate};
    use crate::error::FetchError;
    use crate::fetch::StatsRecord;
    use crate::numeric::Precision;
    use crate::orchestrator::{FetchOutcome, Termination};
    use std::time::Duration;

    fn setup_no_color() {
        colored::control::set_override(false);
    }

    fn report(fetches: Vec<FetchOutcome>) -> RunReport {
        RunReport {
            algorithm: Algorithm::FastSeries,
            precision: Precision::new(10),
            capacity: fetches.len() + 1,
            termination: Termination::Event,
            estimate: Estimate {
                iteration: 2,
                steps: 2,
                value: "3.1415926536".parse().unwrap(),
            },
            fetches,
            phases: Vec::new(),
            elapsed: Duration::from_millis(1300),
        }
    }

    #[test]
    fn test_render_summary_metric_rows() {
        setup_no_color();
        let output = render_summary(&report(Vec::new()));
        assert!(output.contains("fetchpi"));
        assert!(output.contains("fast-series | 0 fetches | capacity 1 | event"));
        assert!(output.contains("  pi_estimate.................: 3.1415926536"));
        assert!(output.contains("  pi_steps....................: 2"));
        assert!(output.contains("  elapsed.....................: 1.3s"));
        assert!(!output.contains("fetches:"));
    }

    #[test]
    fn test_render_summary_lists_each_fetch() {
        setup_no_color();
        let output = render_summary(&report(vec![
            FetchOutcome {
                task: 0,
                target: "http://x/".to_string(),
                result: Ok(StatsRecord {
                    task: 0,
                    duration: Duration::from_millis(40),
                    size: 12,
                    digest: "ff00".to_string(),
                }),
            },
            FetchOutcome {
                task: 1,
                target: "http://x/".to_string(),
                result: Err(FetchError::Http {
                    status: 503,
                    message: "Service Unavailable".to_string(),
                }),
            },
        ]));
        assert!(output.contains("  fetch_ok....................: 1"));
        assert!(output.contains("  fetch_failed................: 1"));
        assert!(output.contains("40ms  12 bytes  sha256=ff00"));
        assert!(output.contains("http: HTTP 503: Service Unavailable"));
    }
}
