//! Language classifier contract and the reference token classifier.
//!
//! The cross-validation harness only talks to a model through [`Trainer`] and
//! [`Classify`]: accumulate statistics from labeled token streams, freeze them
//! into an immutable model, then rank candidate languages for raw content.
//! [`NaiveBayesTrainer`] is the multinomial naive-Bayes implementation the
//! CLI uses by default.

use crate::tokenizer::extract_tokens;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// Errors raised by a trainer or classifier
#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("Cannot finalize a model trained on zero samples")]
    EmptyTrainingSet,

    #[error("Training sample has an empty language label")]
    EmptyLanguage,

    #[error("Classification failed: {0}")]
    Failed(String),
}

/// A ranked language candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Language name
    pub language: String,
    /// Score; higher is more likely. Only comparable within one ranking.
    pub score: f64,
}

/// Accumulates training statistics and freezes them into a model
pub trait Trainer {
    /// Model produced by [`Trainer::finalize`]
    type Model: Classify;

    /// Add one labeled sample's tokens
    ///
    /// # Errors
    ///
    /// Implementations may reject malformed samples.
    fn train(&mut self, language: &str, tokens: &[String]) -> Result<(), ClassifierError>;

    /// Freeze accumulated statistics
    ///
    /// # Errors
    ///
    /// Implementations may fail when the statistics are unusable.
    fn finalize(self) -> Result<Self::Model, ClassifierError>;
}

/// Ranks languages for raw content
pub trait Classify {
    /// Rank languages for `content`, best first.
    ///
    /// `candidates` restricts the ranking to the given languages; `None`
    /// considers every language the model knows. An empty ranking means the
    /// model has no answer.
    ///
    /// # Errors
    ///
    /// Implementations may fail on internal errors.
    fn classify(
        &self,
        content: &[u8],
        candidates: Option<&[String]>,
    ) -> Result<Vec<Prediction>, ClassifierError>;
}

/// Multinomial naive-Bayes trainer over token counts
#[derive(Debug, Default, Clone)]
pub struct NaiveBayesTrainer {
    token_counts: HashMap<String, HashMap<String, u64>>,
    language_tokens: HashMap<String, u64>,
    language_samples: HashMap<String, u64>,
}

impl NaiveBayesTrainer {
    /// Create an empty trainer
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of samples trained so far
    #[must_use]
    pub fn sample_count(&self) -> u64 {
        self.language_samples.values().sum()
    }
}

impl Trainer for NaiveBayesTrainer {
    type Model = NaiveBayesModel;

    fn train(&mut self, language: &str, tokens: &[String]) -> Result<(), ClassifierError> {
        if language.is_empty() {
            return Err(ClassifierError::EmptyLanguage);
        }

        let counts = self.token_counts.entry(language.to_string()).or_default();
        for token in tokens {
            *counts.entry(token.clone()).or_insert(0) += 1;
        }
        *self
            .language_tokens
            .entry(language.to_string())
            .or_insert(0) += tokens.len() as u64;
        *self
            .language_samples
            .entry(language.to_string())
            .or_insert(0) += 1;

        Ok(())
    }

    #[allow(clippy::cast_precision_loss)]
    fn finalize(self) -> Result<NaiveBayesModel, ClassifierError> {
        let total_samples = self.sample_count();
        if total_samples == 0 {
            return Err(ClassifierError::EmptyTrainingSet);
        }
        let total_tokens: u64 = self.language_tokens.values().sum();

        let languages = self
            .language_samples
            .iter()
            .map(|(language, &samples)| {
                let language_total = self.language_tokens.get(language).copied().unwrap_or(0);
                let token_log_probs = self
                    .token_counts
                    .get(language)
                    .map(|counts| {
                        counts
                            .iter()
                            .map(|(token, &count)| {
                                (token.clone(), (count as f64 / language_total as f64).ln())
                            })
                            .collect()
                    })
                    .unwrap_or_default();

                let stats = LanguageStats {
                    log_prior: (samples as f64 / total_samples as f64).ln(),
                    token_log_probs,
                };
                (language.clone(), stats)
            })
            .collect();

        Ok(NaiveBayesModel {
            languages,
            unseen_log_prob: (1.0 / total_tokens.max(1) as f64).ln(),
        })
    }
}

#[derive(Debug, Clone)]
struct LanguageStats {
    log_prior: f64,
    token_log_probs: HashMap<String, f64>,
}

/// Immutable naive-Bayes model
#[derive(Debug, Clone)]
pub struct NaiveBayesModel {
    languages: BTreeMap<String, LanguageStats>,
    unseen_log_prob: f64,
}

impl NaiveBayesModel {
    /// Languages the model was trained on, sorted
    pub fn languages(&self) -> impl Iterator<Item = &str> {
        self.languages.keys().map(String::as_str)
    }

    fn score(&self, stats: &LanguageStats, tokens: &[String]) -> f64 {
        let likelihood: f64 = tokens
            .iter()
            .map(|t| {
                stats
                    .token_log_probs
                    .get(t)
                    .copied()
                    .unwrap_or(self.unseen_log_prob)
            })
            .sum();
        likelihood + stats.log_prior
    }
}

impl Classify for NaiveBayesModel {
    fn classify(
        &self,
        content: &[u8],
        candidates: Option<&[String]>,
    ) -> Result<Vec<Prediction>, ClassifierError> {
        let tokens = extract_tokens(content);

        let selected: Vec<(&String, &LanguageStats)> = match candidates {
            None => self.languages.iter().collect(),
            Some(names) => names
                .iter()
                .filter_map(|name| self.languages.get_key_value(name))
                .collect(),
        };

        let mut ranked: Vec<Prediction> = selected
            .into_iter()
            .map(|(language, stats)| Prediction {
                language: language.clone(),
                score: self.score(stats, &tokens),
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.language.cmp(&b.language))
        });
        ranked.dedup_by(|a, b| a.language == b.language);

        Ok(ranked)
    }
}
