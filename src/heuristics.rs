//! Heuristic disambiguation rules.
//!
//! A rule owns a set of extensions and an ordered list of entries. Each entry
//! pairs one or more languages with a pattern; the first entry whose pattern
//! matches the file content resolves the file. An entry with no pattern at all
//! matches unconditionally, and when such an entry closes the list the rule is
//! a catch-all: every file with one of its extensions is resolved without the
//! statistical classifier.
//!
//! ```yaml
//! disambiguations:
//!   - extensions: [".m"]
//!     rules:
//!       - language: Objective-C
//!         pattern: '^\s*(@interface|@implementation|#import)'
//!       - language: Matlab
//!         named_pattern: matlab
//!   - extensions: [".txt"]
//!     rules:
//!       - language: Text
//! named_patterns:
//!   matlab: ['^\s*function\b', '^\s*%']
//! ```

use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur while loading heuristic rules
#[derive(Error, Debug)]
pub enum HeuristicsError {
    #[error("Failed to read heuristics file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse heuristics YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Invalid heuristic pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Unknown named pattern: {0}")]
    UnknownNamedPattern(String),

    #[error("Heuristic rule has no extensions")]
    NoExtensions,
}

/// Capability query the evaluation harness needs from a heuristic rule
pub trait RuleCapabilities {
    /// Whether the rule's last entry matches unconditionally
    fn ends_in_catch_all(&self) -> bool;

    /// Extensions the rule applies to, including the leading dot
    fn extensions(&self) -> &[String];
}

/// A compiled content pattern
#[derive(Debug, Clone)]
pub enum Pattern {
    /// Matches any content
    Always,
    /// Matches when the regex finds a match
    Positive(Regex),
    /// Matches when the regex finds no match
    Negative(Regex),
    /// Matches when every sub-pattern matches
    And(Vec<Pattern>),
}

impl Pattern {
    /// Test the pattern against file content
    #[must_use]
    pub fn is_match(&self, content: &str) -> bool {
        match self {
            Self::Always => true,
            Self::Positive(re) => re.is_match(content),
            Self::Negative(re) => !re.is_match(content),
            Self::And(patterns) => patterns.iter().all(|p| p.is_match(content)),
        }
    }
}

/// One entry of a rule: the languages chosen when the pattern matches
#[derive(Debug, Clone)]
pub struct RuleEntry {
    /// Languages this entry resolves to
    pub languages: Vec<String>,
    /// Pattern guarding the entry
    pub pattern: Pattern,
}

/// A disambiguation rule for a group of extensions
#[derive(Debug, Clone)]
pub struct HeuristicRule {
    extensions: Vec<String>,
    entries: Vec<RuleEntry>,
}

impl HeuristicRule {
    /// Create a rule from its extensions and ordered entries
    #[must_use]
    pub fn new(extensions: Vec<String>, entries: Vec<RuleEntry>) -> Self {
        Self {
            extensions: extensions.iter().map(|e| e.to_lowercase()).collect(),
            entries,
        }
    }

    /// Ordered entries of the rule
    #[must_use]
    pub fn entries(&self) -> &[RuleEntry] {
        &self.entries
    }

    /// Languages of the first entry matching the content, if any
    #[must_use]
    pub fn resolve(&self, content: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|entry| entry.pattern.is_match(content))
            .map(|entry| entry.languages.as_slice())
    }
}

impl RuleCapabilities for HeuristicRule {
    fn ends_in_catch_all(&self) -> bool {
        matches!(
            self.entries.last(),
            Some(RuleEntry {
                pattern: Pattern::Always,
                ..
            })
        )
    }

    fn extensions(&self) -> &[String] {
        &self.extensions
    }
}

/// The full set of heuristic rules
#[derive(Debug, Clone, Default)]
pub struct HeuristicSet {
    rules: Vec<HeuristicRule>,
}

impl HeuristicSet {
    /// Create a set from already compiled rules
    #[must_use]
    pub const fn new(rules: Vec<HeuristicRule>) -> Self {
        Self { rules }
    }

    /// Load rules from a YAML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or compiled.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, HeuristicsError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Load rules from a YAML string
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is malformed, a regex does not compile,
    /// or a named pattern is referenced but not defined.
    pub fn from_yaml(yaml: &str) -> Result<Self, HeuristicsError> {
        let raw: RawHeuristics = serde_yaml::from_str(yaml)?;
        let named: HashMap<String, Vec<String>> = raw
            .named_patterns
            .into_iter()
            .map(|(name, p)| (name, p.into_vec()))
            .collect();

        let rules = raw
            .disambiguations
            .into_iter()
            .map(|d| {
                if d.extensions.is_empty() {
                    return Err(HeuristicsError::NoExtensions);
                }
                let entries = d
                    .rules
                    .into_iter()
                    .map(|entry| {
                        Ok(RuleEntry {
                            languages: entry.language.into_vec(),
                            pattern: entry.pattern.compile(&named)?,
                        })
                    })
                    .collect::<Result<Vec<_>, HeuristicsError>>()?;
                Ok(HeuristicRule::new(d.extensions, entries))
            })
            .collect::<Result<Vec<_>, HeuristicsError>>()?;

        tracing::debug!(rules = rules.len(), "Loaded heuristic rules");
        Ok(Self { rules })
    }

    /// All rules, in file order
    #[must_use]
    pub fn rules(&self) -> &[HeuristicRule] {
        &self.rules
    }

    /// Rules that apply to the given extension
    pub fn rules_for_extension<'a>(
        &'a self,
        extension: &'a str,
    ) -> impl Iterator<Item = &'a HeuristicRule> + 'a {
        let extension = extension.to_lowercase();
        self.rules
            .iter()
            .filter(move |r| r.extensions.contains(&extension))
    }

    /// Number of rules
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Check if there are no rules
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            Self::One(s) => vec![s],
            Self::Many(v) => v,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawHeuristics {
    #[serde(default)]
    disambiguations: Vec<RawDisambiguation>,
    #[serde(default)]
    named_patterns: HashMap<String, OneOrMany>,
}

#[derive(Debug, Deserialize)]
struct RawDisambiguation {
    #[serde(default)]
    extensions: Vec<String>,
    #[serde(default)]
    rules: Vec<RawEntry>,
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    language: OneOrMany,
    #[serde(flatten)]
    pattern: RawPattern,
}

#[derive(Debug, Default, Deserialize)]
struct RawPattern {
    #[serde(default)]
    pattern: Option<OneOrMany>,
    #[serde(default)]
    negative_pattern: Option<OneOrMany>,
    #[serde(default)]
    named_pattern: Option<String>,
    #[serde(default)]
    and: Option<Vec<RawPattern>>,
}

impl RawPattern {
    fn compile(self, named: &HashMap<String, Vec<String>>) -> Result<Pattern, HeuristicsError> {
        let mut parts = Vec::new();

        if let Some(p) = self.pattern {
            parts.push(Pattern::Positive(build_regex(&p.into_vec())?));
        }
        if let Some(p) = self.negative_pattern {
            parts.push(Pattern::Negative(build_regex(&p.into_vec())?));
        }
        if let Some(name) = self.named_pattern {
            let sources = named
                .get(&name)
                .ok_or(HeuristicsError::UnknownNamedPattern(name))?;
            parts.push(Pattern::Positive(build_regex(sources)?));
        }
        if let Some(subs) = self.and {
            let compiled = subs
                .into_iter()
                .map(|s| s.compile(named))
                .collect::<Result<Vec<_>, _>>()?;
            parts.push(Pattern::And(compiled));
        }

        Ok(match parts.len() {
            0 => Pattern::Always,
            1 => parts.remove(0),
            _ => Pattern::And(parts),
        })
    }
}

/// Alternatives are OR-ed; `^` and `$` match at line boundaries
fn build_regex(sources: &[String]) -> Result<Regex, HeuristicsError> {
    let joined = sources
        .iter()
        .map(|s| format!("(?:{s})"))
        .collect::<Vec<_>>()
        .join("|");
    RegexBuilder::new(&joined)
        .multi_line(true)
        .build()
        .map_err(|source| HeuristicsError::InvalidPattern {
            pattern: joined,
            source,
        })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const YAML: &str = r#"
disambiguations:
  - extensions: [".m"]
    rules:
      - language: Objective-C
        pattern: '^\s*(@interface|@implementation|#import)'
      - language: Matlab
        named_pattern: matlab
  - extensions: [".txt", ".TEXT"]
    rules:
      - language: Text
  - extensions: [".pl"]
    rules:
      - language: Prolog
        pattern: ':-'
      - language: [Perl, Raku]
        and:
          - pattern: 'my\s'
          - negative_pattern: 'use v6'
named_patterns:
  matlab: ['^\s*function\b', '^\s*%']
"#;

    fn set() -> HeuristicSet {
        HeuristicSet::from_yaml(YAML).unwrap()
    }

    #[test]
    fn test_load_rules() {
        let set = set();
        assert_eq!(set.len(), 3);
        assert!(!set.is_empty());
        assert_eq!(set.rules()[0].entries().len(), 2);
    }

    #[test]
    fn test_catch_all_detection() {
        let set = set();
        assert!(!set.rules()[0].ends_in_catch_all());
        assert!(set.rules()[1].ends_in_catch_all());
        assert!(!set.rules()[2].ends_in_catch_all());
    }

    #[test]
    fn test_extensions_lowercased() {
        let set = set();
        assert_eq!(set.rules()[1].extensions(), &[".txt", ".text"]);
        assert_eq!(set.rules_for_extension(".TEXT").count(), 1);
        assert_eq!(set.rules_for_extension(".c").count(), 0);
    }

    #[test]
    fn test_resolve_first_match_wins() {
        let set = set();
        let rule = &set.rules()[0];
        assert_eq!(
            rule.resolve("#import <Foundation/Foundation.h>\n"),
            Some(&["Objective-C".to_string()][..])
        );
        assert_eq!(
            rule.resolve("function y = f(x)\n  y = x;\nend\n"),
            Some(&["Matlab".to_string()][..])
        );
        assert_eq!(rule.resolve("nothing here"), None);
    }

    #[test]
    fn test_resolve_and_negative() {
        let set = set();
        let rule = &set.rules()[2];
        let langs = rule.resolve("my $x = 1;").unwrap();
        assert_eq!(langs, &["Perl".to_string(), "Raku".to_string()]);
        assert!(rule.resolve("use v6;\nmy $x = 1;").is_none());
        assert_eq!(rule.resolve("foo :- bar."), Some(&["Prolog".to_string()][..]));
    }

    #[test]
    fn test_unknown_named_pattern() {
        let yaml = r#"
disambiguations:
  - extensions: [".x"]
    rules:
      - language: X
        named_pattern: missing
"#;
        let result = HeuristicSet::from_yaml(yaml);
        assert!(matches!(result, Err(HeuristicsError::UnknownNamedPattern(n)) if n == "missing"));
    }

    #[test]
    fn test_invalid_regex() {
        let yaml = r#"
disambiguations:
  - extensions: [".x"]
    rules:
      - language: X
        pattern: '(unclosed'
"#;
        let result = HeuristicSet::from_yaml(yaml);
        assert!(matches!(result, Err(HeuristicsError::InvalidPattern { .. })));
    }

    #[test]
    fn test_rule_without_extensions() {
        let yaml = "disambiguations:\n  - rules:\n      - language: X\n";
        assert!(matches!(
            HeuristicSet::from_yaml(yaml),
            Err(HeuristicsError::NoExtensions)
        ));
    }
}
