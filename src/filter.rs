//! Sample selection: which samples are worth cross-validating.
//!
//! In the default mode only samples whose filename and extension leave more
//! than one plausible language are tested, and the classifier is restricted to
//! those plausible languages. Extensions fully resolved by a catch-all
//! heuristic are skipped. Exhaustive mode tests everything against every
//! language.

use crate::config::RunConfig;
use crate::corpus::{Corpus, Sample};
use crate::heuristics::RuleCapabilities;
use crate::languages::LanguageRegistry;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Extensions resolved by a catch-all heuristic rule
pub type SkipSet = BTreeSet<String>;

/// Union of the extensions of every rule ending in an unconditional match
pub fn build_skip_set<'a, R>(rules: impl IntoIterator<Item = &'a R>) -> SkipSet
where
    R: RuleCapabilities + 'a,
{
    rules
        .into_iter()
        .filter(|rule| rule.ends_in_catch_all())
        .flat_map(|rule| rule.extensions().iter().cloned())
        .collect()
}

/// Why a sample was not evaluated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// Fewer than two samples share the language; nothing left to train on
    SingleSample { language: String },
    /// Extension absent from the configured allow-list
    ExtensionNotSelected,
    /// Filename alone determines the language
    UnambiguousFilename,
    /// Extension alone determines the language
    UnambiguousExtension,
    /// A catch-all heuristic resolves the extension
    HeuristicCatchAll,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SingleSample { language } => {
                write!(f, "not enough samples for language {language}")
            }
            Self::ExtensionNotSelected => write!(f, "extension not selected"),
            Self::UnambiguousFilename => write!(f, "filename is unambiguous"),
            Self::UnambiguousExtension => write!(f, "extension is unambiguous"),
            Self::HeuristicCatchAll => write!(f, "resolved by catch-all heuristic"),
        }
    }
}

/// Filter decision for one sample
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eligibility {
    /// Evaluate the sample; `None` means every language is a candidate
    Eligible { candidates: Option<Vec<String>> },
    /// Do not evaluate
    Skipped(SkipReason),
}

/// Per-sample eligibility decisions, fixed before evaluation starts
#[derive(Debug, Clone)]
pub struct AmbiguityFilter {
    config: RunConfig,
    registry: LanguageRegistry,
    skip_set: SkipSet,
    language_counts: BTreeMap<String, usize>,
}

impl AmbiguityFilter {
    /// Build the filter for a run.
    ///
    /// The skip-set is computed here, once; it stays empty in exhaustive mode.
    pub fn new<'a, R>(
        config: &RunConfig,
        corpus: &Corpus,
        registry: LanguageRegistry,
        rules: impl IntoIterator<Item = &'a R>,
    ) -> Self
    where
        R: RuleCapabilities + 'a,
    {
        let skip_set = if config.exhaustive {
            SkipSet::new()
        } else {
            build_skip_set(rules)
        };

        tracing::debug!(
            exhaustive = config.exhaustive,
            skip_set = ?skip_set,
            "Built sample filter"
        );

        Self {
            config: config.clone(),
            registry,
            skip_set,
            language_counts: corpus.language_counts(),
        }
    }

    /// Extensions skipped because a heuristic already resolves them
    #[must_use]
    pub const fn skip_set(&self) -> &SkipSet {
        &self.skip_set
    }

    /// Decide whether a sample is evaluated and against which languages
    #[must_use]
    pub fn check(&self, sample: &Sample) -> Eligibility {
        let count = self
            .language_counts
            .get(&sample.language)
            .copied()
            .unwrap_or(0);
        if count < 2 {
            return Eligibility::Skipped(SkipReason::SingleSample {
                language: sample.language.clone(),
            });
        }

        if !self.config.extension_selected(&sample.extension) {
            return Eligibility::Skipped(SkipReason::ExtensionNotSelected);
        }

        if self.config.exhaustive {
            return Eligibility::Eligible { candidates: None };
        }

        let by_filename = self.registry.find_by_filename(&sample.filename);
        if by_filename.len() == 1 {
            return Eligibility::Skipped(SkipReason::UnambiguousFilename);
        }

        let by_extension = self.registry.find_by_extension(&sample.filename);
        if by_extension.len() < 2 {
            return Eligibility::Skipped(SkipReason::UnambiguousExtension);
        }

        if self.skip_set.contains(&sample.extension) {
            return Eligibility::Skipped(SkipReason::HeuristicCatchAll);
        }

        let candidates: Vec<String> = if by_filename.is_empty() {
            by_extension.into_iter().collect()
        } else {
            by_filename.intersection(&by_extension).cloned().collect()
        };

        Eligibility::Eligible {
            candidates: Some(candidates),
        }
    }
}
