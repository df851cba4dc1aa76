//! Leave-one-out evaluation engine.
//!
//! Every sample is filtered, and each eligible sample is classified by a model
//! trained on the rest of the corpus. Tasks run on a rayon pool and share only
//! the immutable [`EvalContext`]; each task owns the training state it builds.

use crate::classifier::{Classify, ClassifierError, Prediction, Trainer};
use crate::config::RunConfig;
use crate::corpus::Corpus;
use crate::filter::{AmbiguityFilter, Eligibility, SkipReason};
use crate::heuristics::HeuristicSet;
use crate::languages::LanguageRegistry;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;
use thiserror::Error;

/// Label reported when the classifier returns no ranking
pub const UNKNOWN_LANGUAGE: &str = "Unknown";

/// Errors that abort a cross-validation run
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Classifier failed on {path}: {source}")]
    Classifier {
        path: String,
        #[source]
        source: ClassifierError,
    },

    #[error("Failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Result of classifying one held-out sample
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    /// Top prediction matches the ground truth
    Good,
    /// Top prediction differs; `None` when nothing was predicted
    Bad { predicted: Option<String> },
}

impl Outcome {
    /// Decide the outcome from a ranking, best first
    #[must_use]
    pub fn from_ranking(ranking: &[Prediction], truth: &str) -> Self {
        match ranking.first() {
            None => Self::Bad { predicted: None },
            Some(top) if top.language == truth => Self::Good,
            Some(top) => Self::Bad {
                predicted: Some(top.language.clone()),
            },
        }
    }

    /// Whether this outcome counts as an error
    #[must_use]
    pub const fn is_bad(&self) -> bool {
        matches!(self, Self::Bad { .. })
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Good => write!(f, "GOOD"),
            Self::Bad { predicted } => write!(
                f,
                "BAD ({})",
                predicted.as_deref().unwrap_or(UNKNOWN_LANGUAGE)
            ),
        }
    }
}

/// An evaluated sample
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Sample path relative to the corpus root
    pub path: String,
    /// Ground-truth language
    pub language: String,
    /// Outcome of the held-out classification
    pub outcome: Outcome,
}

/// Result of one task: an evaluation or a skip marker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskResult {
    Evaluated(Evaluation),
    Skipped { path: String, reason: SkipReason },
}

impl TaskResult {
    /// Path of the sample the task handled
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Self::Evaluated(e) => &e.path,
            Self::Skipped { path, .. } => path,
        }
    }
}

/// Immutable state shared by every task of a run
#[derive(Debug)]
pub struct EvalContext {
    config: RunConfig,
    corpus: Corpus,
    filter: AmbiguityFilter,
}

impl EvalContext {
    /// Build the context once, before any evaluation starts
    #[must_use]
    pub fn new(
        config: RunConfig,
        corpus: Corpus,
        registry: LanguageRegistry,
        heuristics: &HeuristicSet,
    ) -> Self {
        let filter = AmbiguityFilter::new(&config, &corpus, registry, heuristics.rules());
        Self {
            config,
            corpus,
            filter,
        }
    }

    /// Run configuration
    #[must_use]
    pub const fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Corpus under evaluation
    #[must_use]
    pub const fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    /// Sample filter
    #[must_use]
    pub const fn filter(&self) -> &AmbiguityFilter {
        &self.filter
    }
}

/// Evaluates one held-out sample against a freshly trained model
pub struct Evaluator<'a, F> {
    context: &'a EvalContext,
    factory: &'a F,
}

impl<'a, F, T> Evaluator<'a, F>
where
    F: Fn() -> T,
    T: Trainer,
{
    /// Create an evaluator drawing fresh trainers from `factory`
    pub const fn new(context: &'a EvalContext, factory: &'a F) -> Self {
        Self { context, factory }
    }

    /// Train on every sample except `held_out` and classify it.
    ///
    /// # Errors
    ///
    /// Returns `RunnerError::Classifier` if training or classification fails.
    ///
    /// # Panics
    ///
    /// Panics if `held_out` is not a valid sample index.
    pub fn evaluate(
        &self,
        held_out: usize,
        candidates: Option<&[String]>,
    ) -> Result<Outcome, RunnerError> {
        let samples = self.context.corpus.samples();
        let sample = &samples[held_out];
        let fail = |source| RunnerError::Classifier {
            path: sample.path.clone(),
            source,
        };

        let mut trainer = (self.factory)();
        for (_, training) in samples.iter().enumerate().filter(|(i, _)| *i != held_out) {
            trainer
                .train(&training.language, &training.tokens)
                .map_err(fail)?;
        }
        let model = trainer.finalize().map_err(fail)?;

        let limit = sample.content.len().min(self.context.config.consider_bytes);
        let ranking = model
            .classify(&sample.content[..limit], candidates)
            .map_err(fail)?;

        Ok(Outcome::from_ranking(&ranking, &sample.language))
    }
}

/// Runs filtering and evaluation for every sample on a worker pool
pub struct CrossValidator<F> {
    factory: F,
}

impl<F, T> CrossValidator<F>
where
    F: Fn() -> T + Sync,
    T: Trainer,
{
    /// Create a validator drawing fresh trainers from `factory`
    pub const fn new(factory: F) -> Self {
        Self { factory }
    }

    /// Evaluate the whole corpus. Results come back in no particular order.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error raised by any task; the run is abandoned.
    pub fn run(&self, context: &EvalContext) -> Result<Vec<TaskResult>, RunnerError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(context.config.jobs.unwrap_or(0))
            .build()?;

        let start = Instant::now();
        tracing::info!(
            samples = context.corpus.len(),
            workers = pool.current_num_threads(),
            exhaustive = context.config.exhaustive,
            "Starting leave-one-out cross-validation"
        );

        let evaluator = Evaluator::new(context, &self.factory);
        let results = pool.install(|| {
            context
                .corpus
                .samples()
                .par_iter()
                .enumerate()
                .map(|(index, sample)| match context.filter.check(sample) {
                    Eligibility::Skipped(reason) => {
                        tracing::trace!(path = %sample.path, %reason, "Skipped sample");
                        Ok::<_, RunnerError>(TaskResult::Skipped {
                            path: sample.path.clone(),
                            reason,
                        })
                    }
                    Eligibility::Eligible { candidates } => {
                        let outcome = evaluator.evaluate(index, candidates.as_deref())?;
                        tracing::debug!(path = %sample.path, %outcome, "Evaluated sample");
                        Ok(TaskResult::Evaluated(Evaluation {
                            path: sample.path.clone(),
                            language: sample.language.clone(),
                            outcome,
                        }))
                    }
                })
                .collect::<Result<Vec<_>, RunnerError>>()
        })?;

        tracing::info!(
            tasks = results.len(),
            elapsed_ms = start.elapsed().as_millis(),
            "Cross-validation finished"
        );

        Ok(results)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::classifier::NaiveBayesTrainer;
    use crate::corpus::Sample;
    use std::collections::HashSet;

    /// Predicts whatever language name the held-out content spells out, and
    /// fails if the held-out sample's marker token was trained on.
    #[derive(Default)]
    struct ProbeTrainer {
        seen: HashSet<String>,
    }

    struct ProbeModel {
        seen: HashSet<String>,
    }

    impl Trainer for ProbeTrainer {
        type Model = ProbeModel;

        fn train(&mut self, _language: &str, tokens: &[String]) -> Result<(), ClassifierError> {
            self.seen.extend(tokens.iter().cloned());
            Ok(())
        }

        fn finalize(self) -> Result<ProbeModel, ClassifierError> {
            Ok(ProbeModel { seen: self.seen })
        }
    }

    impl Classify for ProbeModel {
        fn classify(
            &self,
            content: &[u8],
            candidates: Option<&[String]>,
        ) -> Result<Vec<Prediction>, ClassifierError> {
            let text = String::from_utf8_lossy(content);
            let mut words = text.split_whitespace();
            let predicted = words.next().unwrap_or_default().to_string();
            let marker = words.next().unwrap_or_default();
            if self.seen.contains(marker) {
                return Err(ClassifierError::Failed(format!("{marker} leaked")));
            }
            let allowed = candidates.map_or(true, |c| c.contains(&predicted));
            Ok(if predicted.is_empty() || !allowed {
                Vec::new()
            } else {
                vec![Prediction {
                    language: predicted,
                    score: 0.0,
                }]
            })
        }
    }

    struct FailingTrainer;

    impl Trainer for FailingTrainer {
        type Model = crate::classifier::NaiveBayesModel;

        fn train(&mut self, _: &str, _: &[String]) -> Result<(), ClassifierError> {
            Err(ClassifierError::Failed("boom".into()))
        }

        fn finalize(self) -> Result<Self::Model, ClassifierError> {
            Err(ClassifierError::EmptyTrainingSet)
        }
    }

    const LANGUAGES: &str = r#"
Matlab:
  extensions: [".m"]
Objective-C:
  extensions: [".m"]
Text:
  extensions: [".txt"]
"#;

    /// Content is "<predicted> <unique marker>"
    fn context(samples: &[(&str, &str, &str)], exhaustive: bool) -> EvalContext {
        let samples = samples
            .iter()
            .map(|(path, lang, content)| Sample::new(*path, *lang, content.as_bytes().to_vec()))
            .collect();
        let config = RunConfig {
            exhaustive,
            jobs: Some(2),
            ..RunConfig::default()
        };
        EvalContext::new(
            config,
            Corpus::from_samples(samples).unwrap(),
            LanguageRegistry::from_yaml(LANGUAGES).unwrap(),
            &HeuristicSet::default(),
        )
    }

    fn sorted(mut results: Vec<TaskResult>) -> Vec<TaskResult> {
        results.sort_by(|a, b| a.path().cmp(b.path()));
        results
    }

    #[test]
    fn test_outcome_from_ranking() {
        let rank = |langs: &[&str]| -> Vec<Prediction> {
            langs
                .iter()
                .map(|l| Prediction {
                    language: (*l).to_string(),
                    score: 0.0,
                })
                .collect()
        };
        assert_eq!(Outcome::from_ranking(&[], "Matlab"), Outcome::Bad { predicted: None });
        assert_eq!(
            Outcome::from_ranking(&rank(&["Matlab", "Objective-C"]), "Matlab"),
            Outcome::Good
        );
        assert_eq!(
            Outcome::from_ranking(&rank(&["Objective-C", "Matlab"]), "Matlab"),
            Outcome::Bad {
                predicted: Some("Objective-C".into())
            }
        );
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(Outcome::Good.to_string(), "GOOD");
        assert_eq!(
            Outcome::Bad {
                predicted: Some("Objective-C".into())
            }
            .to_string(),
            "BAD (Objective-C)"
        );
        assert_eq!(Outcome::Bad { predicted: None }.to_string(), "BAD (Unknown)");
        assert!(Outcome::Bad { predicted: None }.is_bad());
        assert!(!Outcome::Good.is_bad());
    }

    #[test]
    fn test_held_out_sample_never_trained_on() {
        let ctx = context(
            &[
                ("Matlab/a.m", "Matlab", "Matlab m1"),
                ("Matlab/b.m", "Matlab", "Matlab m2"),
                ("Objective-C/a.m", "Objective-C", "Objective-C o1"),
                ("Objective-C/b.m", "Objective-C", "Objective-C o2"),
            ],
            true,
        );
        let results = CrossValidator::new(ProbeTrainer::default).run(&ctx).unwrap();
        assert_eq!(results.len(), 4);
        assert!(results
            .iter()
            .all(|r| matches!(r, TaskResult::Evaluated(e) if e.outcome == Outcome::Good)));
    }

    #[test]
    fn test_default_mode_evaluates_only_ambiguous() {
        let ctx = context(
            &[
                ("Text/a.txt", "Text", "Text t1"),
                ("Text/b.txt", "Text", "Text t2"),
                ("Matlab/a.m", "Matlab", "Matlab m1"),
                ("Matlab/b.m", "Matlab", "Objective-C m2"),
                ("Objective-C/a.m", "Objective-C", "Objective-C o1"),
                ("Objective-C/b.m", "Objective-C", "Objective-C o2"),
            ],
            false,
        );
        let results = sorted(CrossValidator::new(ProbeTrainer::default).run(&ctx).unwrap());
        let evaluated: Vec<_> = results
            .iter()
            .filter_map(|r| match r {
                TaskResult::Evaluated(e) => Some((e.path.as_str(), e.outcome.to_string())),
                TaskResult::Skipped { .. } => None,
            })
            .collect();
        assert_eq!(
            evaluated,
            vec![
                ("Matlab/a.m", "GOOD".to_string()),
                ("Matlab/b.m", "BAD (Objective-C)".to_string()),
                ("Objective-C/a.m", "GOOD".to_string()),
                ("Objective-C/b.m", "GOOD".to_string()),
            ]
        );
        assert!(results.iter().any(|r| matches!(
            r,
            TaskResult::Skipped { path, reason: SkipReason::UnambiguousExtension } if path == "Text/a.txt"
        )));
    }

    #[test]
    fn test_restricted_candidates_without_result_is_unknown() {
        // Predicts Text, which is not a candidate for .m files
        let ctx = context(
            &[
                ("Matlab/a.m", "Matlab", "Text m1"),
                ("Matlab/b.m", "Matlab", "Matlab m2"),
                ("Objective-C/a.m", "Objective-C", "Objective-C o1"),
                ("Objective-C/b.m", "Objective-C", "Objective-C o2"),
            ],
            false,
        );
        let evaluator_factory = ProbeTrainer::default;
        let evaluator = Evaluator::new(&ctx, &evaluator_factory);
        let candidates = vec!["Matlab".to_string(), "Objective-C".to_string()];
        let outcome = evaluator.evaluate(0, Some(&candidates)).unwrap();
        assert_eq!(outcome, Outcome::Bad { predicted: None });
        assert_eq!(outcome.to_string(), "BAD (Unknown)");
    }

    #[test]
    fn test_classifier_failure_aborts_run() {
        let ctx = context(
            &[
                ("Matlab/a.m", "Matlab", "Matlab m1"),
                ("Matlab/b.m", "Matlab", "Matlab m2"),
            ],
            true,
        );
        let result = CrossValidator::new(|| FailingTrainer).run(&ctx);
        assert!(matches!(result, Err(RunnerError::Classifier { .. })));
    }

    #[test]
    fn test_naive_bayes_end_to_end() {
        let samples = [
            ("Matlab/a.m", "Matlab", "function y = f(x)\n  y = x + 1;\nend\n"),
            ("Matlab/b.m", "Matlab", "function z = g(x)\n  z = x * 2;\nend\n"),
            (
                "Objective-C/a.m",
                "Objective-C",
                "#import <Foundation/Foundation.h>\n@interface Foo : NSObject\n@end\n",
            ),
            (
                "Objective-C/b.m",
                "Objective-C",
                "#import <UIKit/UIKit.h>\n@interface Bar : NSObject\n@end\n",
            ),
        ];
        let ctx = context(&samples, false);
        let results = CrossValidator::new(NaiveBayesTrainer::new).run(&ctx).unwrap();
        assert_eq!(results.len(), 4);
        for result in results {
            match result {
                TaskResult::Evaluated(e) => assert_eq!(e.outcome, Outcome::Good, "{}", e.path),
                TaskResult::Skipped { path, .. } => panic!("{path} should be evaluated"),
            }
        }
    }

    #[test]
    fn test_worker_count_does_not_change_results() {
        let samples = [
            ("Matlab/a.m", "Matlab", "Matlab m1"),
            ("Matlab/b.m", "Matlab", "Objective-C m2"),
            ("Objective-C/a.m", "Objective-C", "Objective-C o1"),
            ("Objective-C/b.m", "Objective-C", "Unknown o2"),
        ];
        let run = |jobs| {
            let mut ctx = context(&samples, false);
            ctx.config.jobs = Some(jobs);
            sorted(CrossValidator::new(ProbeTrainer::default).run(&ctx).unwrap())
        };
        assert_eq!(run(1), run(4));
    }
}
