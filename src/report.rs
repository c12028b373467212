//! JSON report serialization for run results.
//!
//! Produces a schema-versioned document with the resolved configuration,
//! the final estimate, per-task fetch outcomes and the phase timeline, so
//! a single file is enough to understand what ran and how it ended.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::approx::{Algorithm, Estimate};
use crate::config::RunConfig;
use crate::error::FetchError;
use crate::fetch::StatsRecord;
use crate::orchestrator::{RunPhase, RunReport};

/// Schema version for the JSON report format.
///
/// Increment when making breaking changes to the report structure.
const SCHEMA_VERSION: &str = "1.0";

/// Top-level JSON report.
#[derive(Debug, Serialize)]
pub struct JsonReport {
    /// Report format version for parser compatibility.
    pub schema_version: String,
    /// RFC 3339 timestamp when the report was generated.
    pub timestamp: String,
    /// Wall time of the whole run in seconds.
    pub elapsed_secs: f64,
    /// Full resolved configuration (with CLI overrides applied).
    pub config: ReportConfig,
    pub approximation: ApproximationReport,
    pub fetches: Vec<FetchReport>,
    /// Failure counts keyed by error category.
    pub errors: BTreeMap<String, u64>,
    pub phases: Vec<PhaseReport>,
}

/// Resolved configuration embedded in the report.
#[derive(Debug, Serialize)]
pub struct ReportConfig {
    pub fetches: usize,
    pub capacity: usize,
    /// `"event"` or `"poll every Nms"`.
    pub termination: String,
    pub url: String,
    pub delay_ms: u64,
    pub timeout_ms: u64,
    pub algorithm: Algorithm,
    pub precision: u32,
    pub yield_cadence: u64,
}

#[derive(Debug, Serialize)]
pub struct ApproximationReport {
    pub algorithm: Algorithm,
    #[serde(flatten)]
    pub estimate: Estimate,
}

/// One fetch task's outcome. Exactly one of `stats` and `error` is set.
#[derive(Debug, Serialize)]
pub struct FetchReport {
    pub task: usize,
    pub target: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<StatsRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<FetchErrorReport>,
}

#[derive(Debug, Serialize)]
pub struct FetchErrorReport {
    #[serde(flatten)]
    pub detail: FetchError,
    /// Human-readable message.
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct PhaseReport {
    pub phase: RunPhase,
    /// Seconds since the run started.
    pub entered_at_secs: f64,
}

impl JsonReport {
    /// Build a report from a finished run and the configuration it used.
    pub fn from_run(report: &RunReport, config: &RunConfig) -> Self {
        let fetches: Vec<FetchReport> = report
            .fetches
            .iter()
            .map(|outcome| match &outcome.result {
                Ok(stats) => FetchReport {
                    task: outcome.task,
                    target: outcome.target.clone(),
                    ok: true,
                    stats: Some(stats.clone()),
                    error: None,
                },
                Err(err) => FetchReport {
                    task: outcome.task,
                    target: outcome.target.clone(),
                    ok: false,
                    stats: None,
                    error: Some(FetchErrorReport {
                        detail: err.clone(),
                        message: err.to_string(),
                    }),
                },
            })
            .collect();

        let mut errors = BTreeMap::new();
        for err in report.fetches.iter().filter_map(|o| o.result.as_ref().err()) {
            *errors.entry(err.error_category().to_string()).or_insert(0) += 1;
        }

        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            elapsed_secs: report.elapsed.as_secs_f64(),
            config: ReportConfig {
                fetches: config.pool.fetches,
                capacity: report.capacity,
                termination: report.termination.to_string(),
                url: config.fetch.url.clone(),
                delay_ms: config.fetch.delay_ms,
                timeout_ms: config.fetch.timeout_ms,
                algorithm: report.algorithm,
                precision: report.precision.digits(),
                yield_cadence: config.approximation.yield_cadence,
            },
            approximation: ApproximationReport {
                algorithm: report.algorithm,
                estimate: report.estimate.clone(),
            },
            fetches,
            errors,
            phases: report
                .phases
                .iter()
                .map(|p| PhaseReport {
                    phase: p.phase,
                    entered_at_secs: p.entered_at.as_secs_f64(),
                })
                .collect(),
        }
    }

    /// Pretty-printed JSON.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::numeric::Precision;
    use crate::orchestrator::{FetchOutcome, PhaseRecord, Termination};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn sample_run() -> RunReport {
        RunReport {
            algorithm: Algorithm::SlowSeries,
            precision: Precision::new(5),
            capacity: 3,
            termination: Termination::Event,
            estimate: Estimate {
                iteration: 41,
                steps: 42,
                value: "3.11786".parse().unwrap(),
            },
            fetches: vec![
                FetchOutcome {
                    task: 0,
                    target: "http://a/".to_string(),
                    result: Ok(StatsRecord {
                        task: 0,
                        duration: Duration::from_millis(250),
                        size: 3,
                        digest: "abc".to_string(),
                    }),
                },
                FetchOutcome {
                    task: 1,
                    target: "http://a/".to_string(),
                    result: Err(FetchError::Timeout),
                },
            ],
            phases: vec![
                PhaseRecord {
                    phase: RunPhase::Submitting,
                    entered_at: Duration::ZERO,
                },
                PhaseRecord {
                    phase: RunPhase::Done,
                    entered_at: Duration::from_millis(300),
                },
            ],
            elapsed: Duration::from_millis(300),
        }
    }

    fn sample_config() -> RunConfig {
        let mut config = RunConfig::default();
        config.pool.fetches = 2;
        config.fetch.url = "http://a/".to_string();
        config
    }

    #[test]
    fn test_report_schema_and_config() {
        let report = JsonReport::from_run(&sample_run(), &sample_config());
        assert_eq!(report.schema_version, "1.0");
        assert_eq!(report.config.fetches, 2);
        assert_eq!(report.config.capacity, 3);
        assert_eq!(report.config.termination, "event");
        assert_eq!(report.config.precision, 5);
    }

    #[test]
    fn test_report_fetch_outcomes_and_error_counts() {
        let report = JsonReport::from_run(&sample_run(), &sample_config());
        assert!(report.fetches[0].ok);
        assert!(report.fetches[0].error.is_none());
        assert!(!report.fetches[1].ok);
        assert!(report.fetches[1].stats.is_none());
        assert_eq!(report.errors.get("timeout"), Some(&1));
    }

    #[test]
    fn test_report_serializes_to_valid_json() {
        let report = JsonReport::from_run(&sample_run(), &sample_config());
        let json = report.to_json_pretty().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["approximation"]["algorithm"], "slow-series");
        assert_eq!(value["approximation"]["value"], "3.11786");
        assert_eq!(value["approximation"]["steps"], 42);
        assert_eq!(value["fetches"][0]["stats"]["duration_secs"], 0.25);
        assert_eq!(value["fetches"][1]["error"]["kind"], "timeout");
        assert_eq!(value["phases"][1]["phase"], "done");
        assert!(chrono::DateTime::parse_from_rfc3339(value["timestamp"].as_str().unwrap()).is_ok());
    }
}
