//! Run configuration for cross-validation.
//!
//! [`Settings`] holds file locations and tuning knobs that may come from a YAML
//! file. [`RunConfig`] is the immutable per-run configuration built once from
//! settings and command-line flags and then shared read-only by every task.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Acceptable number of BAD outcomes when only ambiguous samples are tested.
/// May only ever decrease.
pub const ACCEPTABLE_ERRORS: usize = 16;

/// Acceptable number of BAD outcomes when every sample is tested.
/// May only ever decrease.
pub const ACCEPTABLE_ERRORS_ALL: usize = 1400;

/// Bytes of a held-out sample passed to the classifier
pub const CONSIDER_BYTES: usize = 50 * 1024;

/// Errors that can occur during configuration loading
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML configuration: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Extension must start with '.': {0:?}")]
    InvalidExtension(String),

    #[error("Worker count must be at least 1")]
    InvalidJobs,
}

/// File locations and tuning knobs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Settings {
    /// Corpus root directory
    #[serde(default = "default_corpus")]
    pub corpus: PathBuf,
    /// Language definitions (YAML)
    #[serde(default = "default_languages")]
    pub languages: PathBuf,
    /// Heuristic rules (YAML)
    #[serde(default = "default_heuristics")]
    pub heuristics: PathBuf,
    /// Worker threads; rayon's default when absent
    #[serde(default)]
    pub jobs: Option<usize>,
    /// Bytes of content passed to the classifier
    #[serde(default = "default_consider_bytes")]
    pub consider_bytes: usize,
}

fn default_corpus() -> PathBuf {
    PathBuf::from("samples")
}
fn default_languages() -> PathBuf {
    PathBuf::from("languages.yml")
}
fn default_heuristics() -> PathBuf {
    PathBuf::from("heuristics.yml")
}
const fn default_consider_bytes() -> usize {
    CONSIDER_BYTES
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            corpus: default_corpus(),
            languages: default_languages(),
            heuristics: default_heuristics(),
            jobs: None,
            consider_bytes: default_consider_bytes(),
        }
    }
}

impl Settings {
    /// Load settings from a YAML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Load settings from a YAML string
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML cannot be parsed or `jobs` is zero.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let settings: Self = serde_yaml::from_str(yaml)?;
        if settings.jobs == Some(0) {
            return Err(ConfigError::InvalidJobs);
        }
        Ok(settings)
    }
}

/// Immutable configuration of one cross-validation run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    /// Test every sample against every language
    pub exhaustive: bool,
    /// Only test samples with one of these extensions
    pub extensions: Option<BTreeSet<String>>,
    /// Compare the error count against the acceptance threshold
    pub check_threshold: bool,
    /// Worker threads; rayon's default when absent
    pub jobs: Option<usize>,
    /// Bytes of content passed to the classifier
    pub consider_bytes: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            exhaustive: false,
            extensions: None,
            check_threshold: false,
            jobs: None,
            consider_bytes: CONSIDER_BYTES,
        }
    }
}

impl RunConfig {
    /// Acceptance threshold for this run's scope
    #[must_use]
    pub const fn threshold(&self) -> usize {
        if self.exhaustive {
            ACCEPTABLE_ERRORS_ALL
        } else {
            ACCEPTABLE_ERRORS
        }
    }

    /// Whether the extension passes the allow-list (always true without one)
    #[must_use]
    pub fn extension_selected(&self, extension: &str) -> bool {
        self.extensions
            .as_ref()
            .map_or(true, |allowed| allowed.contains(extension))
    }
}

/// Parse a comma-separated extension list such as `.m,.h`
///
/// # Errors
///
/// Returns `ConfigError::InvalidExtension` for an entry without a leading dot.
pub fn parse_extension_list(list: &str) -> Result<BTreeSet<String>, ConfigError> {
    list.split(',')
        .map(str::trim)
        .filter(|ext| !ext.is_empty())
        .map(|ext| {
            if ext.starts_with('.') && ext.len() > 1 {
                Ok(ext.to_lowercase())
            } else {
                Err(ConfigError::InvalidExtension(ext.to_string()))
            }
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_default_values() {
        let settings = Settings::default();
        assert_eq!(settings.corpus, PathBuf::from("samples"));
        assert_eq!(settings.languages, PathBuf::from("languages.yml"));
        assert_eq!(settings.heuristics, PathBuf::from("heuristics.yml"));
        assert_eq!(settings.jobs, None);
        assert_eq!(settings.consider_bytes, 51_200);
    }

    #[test]
    fn test_settings_from_yaml_partial() {
        let settings = Settings::from_yaml("corpus: data/samples\njobs: 4\n").unwrap();
        assert_eq!(settings.corpus, PathBuf::from("data/samples"));
        assert_eq!(settings.jobs, Some(4));
        assert_eq!(settings.heuristics, PathBuf::from("heuristics.yml"));
    }

    #[test]
    fn test_settings_zero_jobs() {
        let result = Settings::from_yaml("jobs: 0\n");
        assert!(matches!(result, Err(ConfigError::InvalidJobs)));
    }

    #[test]
    fn test_settings_serialization_roundtrip() {
        let settings = Settings::default();
        let yaml = serde_yaml::to_string(&settings).expect("serialize");
        assert_eq!(Settings::from_yaml(&yaml).unwrap(), settings);
    }

    #[test]
    fn test_settings_load_missing() {
        assert!(matches!(
            Settings::load("/nonexistent/crossval.yml"),
            Err(ConfigError::IoError(_))
        ));
    }

    #[test]
    fn test_threshold_by_scope() {
        let config = RunConfig::default();
        assert_eq!(config.threshold(), ACCEPTABLE_ERRORS);

        let config = RunConfig {
            exhaustive: true,
            ..RunConfig::default()
        };
        assert_eq!(config.threshold(), ACCEPTABLE_ERRORS_ALL);
        assert!(ACCEPTABLE_ERRORS < ACCEPTABLE_ERRORS_ALL);
    }

    #[test]
    fn test_extension_selected() {
        let config = RunConfig::default();
        assert!(config.extension_selected(".anything"));

        let config = RunConfig {
            extensions: Some(parse_extension_list(".m,.h").unwrap()),
            ..RunConfig::default()
        };
        assert!(config.extension_selected(".m"));
        assert!(!config.extension_selected(".c"));
    }

    #[test]
    fn test_parse_extension_list() {
        let parsed = parse_extension_list(" .M , .h,,").unwrap();
        assert_eq!(parsed.into_iter().collect::<Vec<_>>(), vec![".h", ".m"]);

        assert!(matches!(
            parse_extension_list(".m,h"),
            Err(ConfigError::InvalidExtension(e)) if e == "h"
        ));
        assert!(parse_extension_list(".").is_err());
    }
}
