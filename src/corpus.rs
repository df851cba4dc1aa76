//! Corpus loading for language classification cross-validation.
//!
//! Samples live under `<root>/<Language>/<file>`. Files whose exact name is
//! meaningful (e.g. `Makefile`) live under `<root>/<Language>/filenames/<file>`.
//! Content is tokenized once at load time and shared read-only afterwards.

#![allow(clippy::missing_const_for_fn)]

use crate::languages::primary_extension;
use crate::tokenizer::extract_tokens;
use rayon::prelude::*;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Directory holding samples identified by exact filename
pub const FILENAMES_DIR: &str = "filenames";

/// Errors that can occur during corpus loading
#[derive(Error, Debug)]
pub enum CorpusError {
    #[error("Corpus directory not found: {0}")]
    NotFound(String),

    #[error("No samples found in corpus")]
    Empty,

    #[error("Duplicate sample path: {0}")]
    DuplicatePath(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// A single labeled sample
#[derive(Debug, Clone)]
pub struct Sample {
    /// Path relative to the corpus root, `/`-separated (e.g. `Matlab/foo.m`)
    pub path: String,
    /// Ground-truth language
    pub language: String,
    /// Raw file content
    pub content: Vec<u8>,
    /// Tokens extracted from the content
    pub tokens: Vec<String>,
    /// File name without directories
    pub filename: String,
    /// Last extension including the leading dot, lowercased; empty if none
    pub extension: String,
}

impl Sample {
    /// Build a sample, deriving filename, extension and tokens
    #[must_use]
    pub fn new(path: impl Into<String>, language: impl Into<String>, content: Vec<u8>) -> Self {
        let path = path.into();
        let filename = path.rsplit('/').next().unwrap_or_default().to_string();
        let extension = primary_extension(&filename);
        let tokens = extract_tokens(&content);

        Self {
            path,
            language: language.into(),
            content,
            tokens,
            filename,
            extension,
        }
    }
}

/// Read-only corpus of labeled samples
#[derive(Debug, Default)]
pub struct Corpus {
    /// Root directory of the corpus, if loaded from disk
    pub root: Option<PathBuf>,
    samples: Vec<Sample>,
}

impl Corpus {
    /// Load corpus from directory path
    ///
    /// # Errors
    ///
    /// Returns an error if the directory doesn't exist, can't be read, or
    /// contains no samples.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, CorpusError> {
        let root = path.as_ref().to_path_buf();

        if !root.is_dir() {
            return Err(CorpusError::NotFound(root.display().to_string()));
        }

        let mut raw = Vec::new();
        for language_dir in sorted_entries(&root)? {
            if !language_dir.is_dir() {
                continue;
            }
            let language = file_name(&language_dir);
            if language.starts_with('.') {
                continue;
            }

            for entry in sorted_entries(&language_dir)? {
                let name = file_name(&entry);
                if entry.is_file() {
                    raw.push((format!("{language}/{name}"), language.clone(), entry));
                } else if entry.is_dir() && name == FILENAMES_DIR {
                    for file in sorted_entries(&entry)? {
                        if file.is_file() {
                            let fname = file_name(&file);
                            raw.push((
                                format!("{language}/{FILENAMES_DIR}/{fname}"),
                                language.clone(),
                                file,
                            ));
                        }
                    }
                }
            }
        }

        let samples = raw
            .into_par_iter()
            .map(|(rel, language, file)| {
                let content = std::fs::read(&file)?;
                Ok::<_, CorpusError>(Sample::new(rel, language, content))
            })
            .collect::<Result<Vec<_>, CorpusError>>()?;

        tracing::debug!(
            root = %root.display(),
            samples = samples.len(),
            "Loaded corpus"
        );

        let mut corpus = Self::from_samples(samples)?;
        corpus.root = Some(root);
        Ok(corpus)
    }

    /// Build a corpus from in-memory samples
    ///
    /// # Errors
    ///
    /// Returns an error if there are no samples or two samples share a path.
    pub fn from_samples(mut samples: Vec<Sample>) -> Result<Self, CorpusError> {
        if samples.is_empty() {
            return Err(CorpusError::Empty);
        }

        let mut seen = HashSet::new();
        for sample in &samples {
            if !seen.insert(sample.path.as_str()) {
                return Err(CorpusError::DuplicatePath(sample.path.clone()));
            }
        }

        // Sort by path for reproducibility
        samples.sort_by(|a, b| a.path.cmp(&b.path));

        Ok(Self {
            root: None,
            samples,
        })
    }

    /// Get total number of samples
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check if corpus is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// All samples, sorted by path
    #[must_use]
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Get iterator over samples
    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    /// Look up a sample by path
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Sample> {
        self.samples
            .binary_search_by(|s| s.path.as_str().cmp(path))
            .ok()
            .map(|i| &self.samples[i])
    }

    /// Number of samples per language
    #[must_use]
    pub fn language_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for sample in &self.samples {
            *counts.entry(sample.language.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Compute statistics about the corpus
    #[must_use]
    pub fn stats(&self) -> CorpusStats {
        let counts = self.language_counts();
        CorpusStats {
            total_samples: self.samples.len(),
            total_languages: counts.len(),
            single_sample_languages: counts.values().filter(|&&c| c < 2).count(),
            total_tokens: self.samples.iter().map(|s| s.tokens.len()).sum(),
        }
    }
}

/// Statistics about the corpus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusStats {
    /// Total number of samples
    pub total_samples: usize,
    /// Number of distinct languages
    pub total_languages: usize,
    /// Languages with fewer than two samples
    pub single_sample_languages: usize,
    /// Total tokens across samples
    pub total_tokens: usize,
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>, CorpusError> {
    let mut entries = std::fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()?;
    entries.sort();
    Ok(entries)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}
