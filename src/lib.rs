//! # Classifier Cross-Validation
//!
//! Leave-one-out cross-validation gate for source-code language
//! classification. Every sample of a labeled corpus is held out in turn, a
//! classifier is trained on all the remaining samples, and the held-out sample
//! is classified. A GOOD/BAD line is reported per sample and, in test mode, the
//! error count is compared against a fixed acceptance threshold.
//!
//! ## Pipeline
//!
//! ```text
//! Corpus (<root>/<Language>/<file>)
//!        ↓
//! Sample filter (single-sample, allow-list, ambiguity, catch-all skip-set)
//!        ↓
//! Parallel LOOCV (fresh model per held-out sample, rayon pool)
//!        ↓
//! Aggregation (drop skips, sort by path, count BAD)
//!        ↓
//! Report (text / JSON, threshold verdict, accuracy summary)
//! ```

pub mod classifier;
pub mod config;
pub mod corpus;
pub mod filter;
pub mod heuristics;
pub mod languages;
pub mod metrics;
pub mod report;
pub mod runner;
pub mod tokenizer;

pub use classifier::{
    ClassifierError, Classify, NaiveBayesModel, NaiveBayesTrainer, Prediction, Trainer,
};
pub use config::{
    parse_extension_list, ConfigError, RunConfig, Settings, ACCEPTABLE_ERRORS,
    ACCEPTABLE_ERRORS_ALL, CONSIDER_BYTES,
};
pub use corpus::{Corpus, CorpusError, CorpusStats, Sample};
pub use filter::{build_skip_set, AmbiguityFilter, Eligibility, SkipReason, SkipSet};
pub use heuristics::{
    HeuristicRule, HeuristicSet, HeuristicsError, Pattern, RuleCapabilities, RuleEntry,
};
pub use languages::{LanguageDef, LanguageError, LanguageRegistry};
pub use metrics::{bootstrap_ci, summarize, AccuracySummary, StatConfig};
pub use report::{ReportBuilder, ReportMetadata, RunReport, Verdict};
pub use runner::{
    CrossValidator, EvalContext, Evaluation, Evaluator, Outcome, RunnerError, TaskResult,
    UNKNOWN_LANGUAGE,
};
pub use tokenizer::extract_tokens;
