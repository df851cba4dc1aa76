//! Accuracy metrics over cross-validation outcomes.
//!
//! Reports overall accuracy with a seeded bootstrap confidence interval, a
//! per-language breakdown, and the most common confusions.

use crate::runner::{Evaluation, Outcome, UNKNOWN_LANGUAGE};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as FmtWrite;
use tabled::{Table, Tabled};

/// Statistical configuration for the accuracy summary
#[derive(Debug, Clone)]
pub struct StatConfig {
    /// Number of bootstrap resamples
    pub bootstrap_n: usize,
    /// Confidence level (e.g., 0.95)
    pub confidence: f64,
    /// Random seed for reproducibility
    pub seed: u64,
}

impl Default for StatConfig {
    fn default() -> Self {
        Self {
            bootstrap_n: 10_000,
            confidence: 0.95,
            seed: 42,
        }
    }
}

/// Bootstrap confidence interval of the mean (percentile method)
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_sign_loss,
    clippy::cast_possible_truncation
)]
pub fn bootstrap_ci(samples: &[f64], config: &StatConfig) -> (f64, f64) {
    if samples.len() < 2 || config.bootstrap_n == 0 {
        let mean = compute_mean(samples);
        return (mean, mean);
    }

    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let mut bootstrap_means = Vec::with_capacity(config.bootstrap_n);

    for _ in 0..config.bootstrap_n {
        let resample_sum: f64 = (0..samples.len())
            .map(|_| {
                let idx = rng.next_u64() as usize % samples.len();
                samples[idx]
            })
            .sum();
        bootstrap_means.push(resample_sum / samples.len() as f64);
    }

    bootstrap_means.sort_by(f64::total_cmp);

    let alpha = 1.0 - config.confidence;
    let lower_idx = (config.bootstrap_n as f64 * (alpha / 2.0)).floor() as usize;
    let upper_idx = (config.bootstrap_n as f64 * (1.0 - alpha / 2.0)).ceil() as usize;

    let last = bootstrap_means.len() - 1;
    (
        bootstrap_means[lower_idx.min(last)],
        bootstrap_means[upper_idx.min(last)],
    )
}

#[allow(clippy::cast_precision_loss)]
fn compute_mean(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().sum::<f64>() / samples.len() as f64
}

#[allow(clippy::cast_precision_loss)]
fn ratio(good: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        good as f64 / total as f64
    }
}

/// Accuracy for a single ground-truth language
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageAccuracy {
    pub language: String,
    pub total: usize,
    pub good: usize,
    pub bad: usize,
    pub accuracy: f64,
}

/// A ground-truth language mistaken for another
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confusion {
    pub expected: String,
    pub predicted: String,
    pub count: usize,
}

/// Aggregate accuracy of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracySummary {
    /// Evaluated samples
    pub total: usize,
    pub good: usize,
    pub bad: usize,
    /// Fraction of GOOD outcomes
    pub accuracy: f64,
    /// Lower bound of the bootstrap CI
    pub ci_lower: f64,
    /// Upper bound of the bootstrap CI
    pub ci_upper: f64,
    /// Per-language breakdown, sorted by language
    pub by_language: Vec<LanguageAccuracy>,
    /// Confusions, most frequent first
    pub confusions: Vec<Confusion>,
}

/// Summarize evaluated samples
#[must_use]
pub fn summarize(evaluations: &[Evaluation], config: &StatConfig) -> AccuracySummary {
    let hits: Vec<f64> = evaluations
        .iter()
        .map(|e| if e.outcome.is_bad() { 0.0 } else { 1.0 })
        .collect();
    let (ci_lower, ci_upper) = bootstrap_ci(&hits, config);

    let mut per_language: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
    let mut confusions: BTreeMap<(&str, &str), usize> = BTreeMap::new();
    for evaluation in evaluations {
        let entry = per_language.entry(evaluation.language.as_str()).or_default();
        entry.0 += 1;
        if let Outcome::Bad { predicted } = &evaluation.outcome {
            entry.1 += 1;
            let predicted = predicted.as_deref().unwrap_or(UNKNOWN_LANGUAGE);
            *confusions
                .entry((evaluation.language.as_str(), predicted))
                .or_insert(0) += 1;
        }
    }

    let by_language = per_language
        .into_iter()
        .map(|(language, (total, bad))| LanguageAccuracy {
            language: language.to_string(),
            total,
            good: total - bad,
            bad,
            accuracy: ratio(total - bad, total),
        })
        .collect();

    let mut confusions: Vec<Confusion> = confusions
        .into_iter()
        .map(|((expected, predicted), count)| Confusion {
            expected: expected.to_string(),
            predicted: predicted.to_string(),
            count,
        })
        .collect();
    // Stable sort keeps the alphabetical order among equal counts
    confusions.sort_by(|a, b| b.count.cmp(&a.count));

    let bad = evaluations.iter().filter(|e| e.outcome.is_bad()).count();
    AccuracySummary {
        total: evaluations.len(),
        good: evaluations.len() - bad,
        bad,
        accuracy: ratio(evaluations.len() - bad, evaluations.len()),
        ci_lower,
        ci_upper,
        by_language,
        confusions,
    }
}

#[derive(Tabled)]
struct LanguageRow {
    #[tabled(rename = "Language")]
    language: String,
    #[tabled(rename = "Samples")]
    total: usize,
    #[tabled(rename = "Good")]
    good: usize,
    #[tabled(rename = "Bad")]
    bad: usize,
    #[tabled(rename = "Accuracy")]
    accuracy: String,
}

impl AccuracySummary {
    /// Render the summary as a plain-text table
    #[must_use]
    pub fn to_table(&self) -> String {
        let rows: Vec<LanguageRow> = self
            .by_language
            .iter()
            .map(|l| LanguageRow {
                language: l.language.clone(),
                total: l.total,
                good: l.good,
                bad: l.bad,
                accuracy: format!("{:.2}%", l.accuracy * 100.0),
            })
            .collect();

        let mut output = Table::new(rows).to_string();
        output.push('\n');
        writeln!(
            output,
            "Accuracy: {:.2}% [{:.2}-{:.2}] over {} samples",
            self.accuracy * 100.0,
            self.ci_lower * 100.0,
            self.ci_upper * 100.0,
            self.total
        )
        .ok();
        for confusion in self.confusions.iter().take(10) {
            writeln!(
                output,
                "  {} -> {}: {}",
                confusion.expected, confusion.predicted, confusion.count
            )
            .ok();
        }
        output
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn eval(path: &str, language: &str, predicted: Option<Option<&str>>) -> Evaluation {
        Evaluation {
            path: path.to_string(),
            language: language.to_string(),
            outcome: match predicted {
                None => Outcome::Good,
                Some(p) => Outcome::Bad {
                    predicted: p.map(str::to_string),
                },
            },
        }
    }

    #[test]
    fn test_bootstrap_ci_degenerate() {
        let config = StatConfig::default();
        assert_eq!(bootstrap_ci(&[], &config), (0.0, 0.0));
        assert_eq!(bootstrap_ci(&[1.0], &config), (1.0, 1.0));
        assert_eq!(bootstrap_ci(&[1.0, 1.0, 1.0], &config), (1.0, 1.0));
    }

    #[test]
    fn test_bootstrap_ci_brackets_mean() {
        let samples: Vec<f64> = (0..100).map(|i| if i % 4 == 0 { 0.0 } else { 1.0 }).collect();
        let config = StatConfig {
            bootstrap_n: 2000,
            ..StatConfig::default()
        };
        let (lower, upper) = bootstrap_ci(&samples, &config);
        assert!(lower < 0.75 && 0.75 < upper, "({lower}, {upper})");
        assert!(lower > 0.5 && upper <= 1.0);
        // Seeded: identical on rerun
        assert_eq!(bootstrap_ci(&samples, &config), (lower, upper));
    }

    #[test]
    fn test_summarize() {
        let evaluations = vec![
            eval("Matlab/a.m", "Matlab", None),
            eval("Matlab/b.m", "Matlab", Some(Some("Objective-C"))),
            eval("Matlab/c.m", "Matlab", Some(Some("Objective-C"))),
            eval("Objective-C/a.m", "Objective-C", None),
            eval("Objective-C/b.m", "Objective-C", Some(None)),
        ];
        let summary = summarize(&evaluations, &StatConfig::default());

        assert_eq!(summary.total, 5);
        assert_eq!(summary.good, 2);
        assert_eq!(summary.bad, 3);
        assert!((summary.accuracy - 0.4).abs() < f64::EPSILON);

        assert_eq!(summary.by_language.len(), 2);
        assert_eq!(summary.by_language[0].language, "Matlab");
        assert_eq!(summary.by_language[0].bad, 2);
        assert_eq!(summary.by_language[1].good, 1);

        assert_eq!(
            summary.confusions[0],
            Confusion {
                expected: "Matlab".into(),
                predicted: "Objective-C".into(),
                count: 2
            }
        );
        assert_eq!(summary.confusions[1].predicted, "Unknown");
    }

    #[test]
    fn test_summarize_empty() {
        let summary = summarize(&[], &StatConfig::default());
        assert_eq!(summary.total, 0);
        assert!(summary.accuracy.abs() < f64::EPSILON);
        assert!(summary.by_language.is_empty());
    }

    #[test]
    fn test_to_table() {
        let evaluations = vec![
            eval("Matlab/a.m", "Matlab", None),
            eval("Matlab/b.m", "Matlab", Some(Some("Objective-C"))),
        ];
        let table = summarize(&evaluations, &StatConfig::default()).to_table();
        assert!(table.contains("Language"));
        assert!(table.contains("Matlab"));
        assert!(table.contains("50.00%"));
        assert!(table.contains("Matlab -> Objective-C: 1"));
    }
}
