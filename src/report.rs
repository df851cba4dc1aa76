//! Report generation for cross-validation runs.
//!
//! Aggregates unordered task results into a deterministic report:
//! - skip markers are dropped (single-sample languages become warnings)
//! - evaluations are sorted by sample path
//! - BAD outcomes are counted and, in test mode, checked against the threshold

use crate::config::RunConfig;
use crate::filter::SkipReason;
use crate::metrics::{summarize, AccuracySummary, StatConfig};
use crate::runner::{Evaluation, TaskResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::io::{self, Write};

/// Outcome of the threshold check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    /// Number of BAD outcomes
    pub errors: usize,
    /// Maximum tolerated BAD outcomes
    pub threshold: usize,
    /// Whether `errors <= threshold`
    pub passed: bool,
}

impl Verdict {
    /// Compare an error count to a threshold
    #[must_use]
    pub const fn new(errors: usize, threshold: usize) -> Self {
        Self {
            errors,
            threshold,
            passed: errors <= threshold,
        }
    }

    /// Human-readable verdict line
    #[must_use]
    pub fn message(&self) -> String {
        let relation = if self.passed { "within" } else { "above" };
        format!(
            "Number of errors ({}) is {relation} the acceptable threshold ({})",
            self.errors, self.threshold
        )
    }
}

/// Report metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Report generation timestamp
    pub generated_at: DateTime<Utc>,
    /// Tool version
    pub framework_version: String,
    /// Whether every sample was tested against every language
    pub exhaustive: bool,
    /// Extension allow-list, if any
    pub extensions: Option<Vec<String>>,
}

/// Final, deterministic report of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Report metadata
    pub metadata: ReportMetadata,
    /// Evaluated samples, sorted by path
    pub evaluations: Vec<Evaluation>,
    /// Number of BAD outcomes
    pub total_errors: usize,
    /// Number of skipped samples
    pub skipped: usize,
    /// Warnings about samples that could not be cross-validated
    pub warnings: Vec<String>,
    /// Threshold verdict, only in test mode
    pub verdict: Option<Verdict>,
}

impl RunReport {
    /// Whether the run counts as a success
    #[must_use]
    pub fn passed(&self) -> bool {
        self.verdict.map_or(true, |v| v.passed)
    }

    /// One line per evaluated sample: `<path> GOOD` or `<path> BAD (<lang>)`
    pub fn lines(&self) -> impl Iterator<Item = String> + '_ {
        self.evaluations
            .iter()
            .map(|e| format!("{} {}", e.path, e.outcome))
    }

    /// Write the text report.
    ///
    /// Warnings go to `err` first, then sample lines to `out`. The verdict
    /// goes to `out` when it passes and to `err` when it fails.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn write_text<O: Write, E: Write>(&self, out: &mut O, err: &mut E) -> io::Result<()> {
        for warning in &self.warnings {
            writeln!(err, "{warning}")?;
        }
        for line in self.lines() {
            writeln!(out, "{line}")?;
        }
        if let Some(verdict) = &self.verdict {
            if verdict.passed {
                writeln!(out, "{}", verdict.message())?;
            } else {
                writeln!(err, "{}", verdict.message())?;
            }
        }
        Ok(())
    }

    /// Render report as JSON
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Accuracy summary of the evaluated samples
    #[must_use]
    pub fn summary(&self, config: &StatConfig) -> AccuracySummary {
        summarize(&self.evaluations, config)
    }
}

/// Builds a [`RunReport`] from task results
pub struct ReportBuilder {
    exhaustive: bool,
    extensions: Option<Vec<String>>,
    threshold: Option<usize>,
    results: Vec<TaskResult>,
}

impl ReportBuilder {
    /// Create a builder for a run with the given configuration
    #[must_use]
    pub fn new(config: &RunConfig) -> Self {
        Self {
            exhaustive: config.exhaustive,
            extensions: config
                .extensions
                .as_ref()
                .map(|e| e.iter().cloned().collect()),
            threshold: config.check_threshold.then_some(config.threshold()),
            results: Vec::new(),
        }
    }

    /// Add task results, in any order
    #[must_use]
    pub fn with_results(mut self, results: impl IntoIterator<Item = TaskResult>) -> Self {
        self.results.extend(results);
        self
    }

    /// Build the report
    #[must_use]
    pub fn build(self) -> RunReport {
        let mut evaluations = Vec::new();
        let mut warnings = BTreeSet::new();
        let mut skipped = 0;

        for result in self.results {
            match result {
                TaskResult::Evaluated(evaluation) => evaluations.push(evaluation),
                TaskResult::Skipped { reason, .. } => {
                    skipped += 1;
                    if let SkipReason::SingleSample { language } = reason {
                        warnings.insert(format!(
                            "Not enough samples for language {language}, skipping"
                        ));
                    }
                }
            }
        }

        evaluations.sort_by(|a, b| a.path.cmp(&b.path));
        let total_errors = evaluations.iter().filter(|e| e.outcome.is_bad()).count();
        let verdict = self
            .threshold
            .map(|threshold| Verdict::new(total_errors, threshold));

        tracing::info!(
            evaluated = evaluations.len(),
            skipped,
            total_errors,
            "Aggregated cross-validation results"
        );

        RunReport {
            metadata: ReportMetadata {
                generated_at: Utc::now(),
                framework_version: env!("CARGO_PKG_VERSION").to_string(),
                exhaustive: self.exhaustive,
                extensions: self.extensions,
            },
            evaluations,
            total_errors,
            skipped,
            warnings: warnings.into_iter().collect(),
            verdict,
        }
    }
}
