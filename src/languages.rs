//! Language registry: which languages a filename or extension is consistent with.
//!
//! Loaded from a YAML document mapping each language name to its known
//! extensions and exact filenames:
//!
//! ```yaml
//! Matlab:
//!   extensions: [".m", ".matlab"]
//! Objective-C:
//!   extensions: [".m", ".h"]
//! Ruby:
//!   extensions: [".rb"]
//!   filenames: ["Rakefile", "Gemfile"]
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur while loading the language registry
#[derive(Error, Debug)]
pub enum LanguageError {
    #[error("Failed to read language definitions: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse language definitions: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Invalid extension for {language}: {extension} (must start with '.')")]
    InvalidExtension { language: String, extension: String },
}

/// Definition of a single language
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LanguageDef {
    /// File extensions, including the leading dot
    #[serde(default)]
    pub extensions: Vec<String>,
    /// Exact filenames (e.g. `Makefile`)
    #[serde(default)]
    pub filenames: Vec<String>,
}

/// Registry of known languages
#[derive(Debug, Clone, Default)]
pub struct LanguageRegistry {
    languages: BTreeMap<String, LanguageDef>,
    by_extension: BTreeMap<String, BTreeSet<String>>,
    by_filename: BTreeMap<String, BTreeSet<String>>,
}

impl LanguageRegistry {
    /// Build a registry from language definitions
    ///
    /// # Errors
    ///
    /// Returns `LanguageError::InvalidExtension` if an extension lacks its leading dot.
    pub fn new(languages: BTreeMap<String, LanguageDef>) -> Result<Self, LanguageError> {
        let mut by_extension: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut by_filename: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

        for (name, def) in &languages {
            for ext in &def.extensions {
                if !ext.starts_with('.') {
                    return Err(LanguageError::InvalidExtension {
                        language: name.clone(),
                        extension: ext.clone(),
                    });
                }
                by_extension
                    .entry(ext.to_lowercase())
                    .or_default()
                    .insert(name.clone());
            }
            for filename in &def.filenames {
                by_filename
                    .entry(filename.clone())
                    .or_default()
                    .insert(name.clone());
            }
        }

        Ok(Self {
            languages,
            by_extension,
            by_filename,
        })
    }

    /// Load registry from a YAML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, LanguageError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Load registry from a YAML string
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML cannot be parsed.
    pub fn from_yaml(yaml: &str) -> Result<Self, LanguageError> {
        let languages: BTreeMap<String, LanguageDef> = serde_yaml::from_str(yaml)?;
        Self::new(languages)
    }

    /// Languages whose filename list contains this exact filename
    #[must_use]
    pub fn find_by_filename(&self, filename: &str) -> BTreeSet<String> {
        self.by_filename.get(filename).cloned().unwrap_or_default()
    }

    /// Languages claiming any dotted suffix of the filename.
    ///
    /// `foo.d.ts` is checked against both `.d.ts` and `.ts`. Matching is
    /// case-insensitive.
    #[must_use]
    pub fn find_by_extension(&self, filename: &str) -> BTreeSet<String> {
        extension_candidates(filename)
            .iter()
            .filter_map(|ext| self.by_extension.get(ext))
            .flatten()
            .cloned()
            .collect()
    }

    /// Whether the registry knows this language
    #[must_use]
    pub fn contains(&self, language: &str) -> bool {
        self.languages.contains_key(language)
    }

    /// All language names, sorted
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.languages.keys().map(String::as_str)
    }

    /// Number of known languages
    #[must_use]
    pub fn len(&self) -> usize {
        self.languages.len()
    }

    /// Check if the registry is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.languages.is_empty()
    }
}

/// Every dotted suffix of a filename, lowercased, longest first.
///
/// A leading dot (as in `.bashrc`) does not start an extension.
#[must_use]
pub fn extension_candidates(filename: &str) -> Vec<String> {
    let lower = filename.to_lowercase();
    let body = lower.strip_prefix('.').unwrap_or(&lower);
    body.match_indices('.')
        .map(|(i, _)| body[i..].to_string())
        .collect()
}

/// The last dotted suffix of a filename, lowercased, or an empty string
#[must_use]
pub fn primary_extension(filename: &str) -> String {
    extension_candidates(filename).pop().unwrap_or_default()
}
