use log::warn;
use regex::{Regex, RegexBuilder};

use crate::core::task::FuzzResult;

/// Built-in SQL error signatures, tried in this order.
pub const SQL_ERROR_SIGNATURES: &[&str] = &[
    "you have an error in your sql syntax",
    "syntax error at or near",
    "unrecognized token",
    "pg::syntaxerror",
    "unclosed quotation mark after the character string",
    "sqlite3",
    "sqlstate",
];

#[derive(Debug, Clone)]
struct ErrorSignature {
    pattern: String,
    regex: Regex,
}

/// Labels fuzz results whose body leaks a backend SQL error.
///
/// Signatures are case-insensitive regexes checked in order; the first match
/// wins and its pattern text is recorded. Classification only looks at the
/// body excerpt and keeps no state between calls.
#[derive(Debug, Clone)]
pub struct ResponseClassifier {
    signatures: Vec<ErrorSignature>,
}

impl ResponseClassifier {
    pub fn new() -> Self {
        let mut classifier = Self::empty();
        for pattern in SQL_ERROR_SIGNATURES {
            if let Err(e) = classifier.add_signature(pattern) {
                warn!("Built-in signature '{}' rejected: {}", pattern, e);
            }
        }
        classifier
    }

    pub fn empty() -> Self {
        Self {
            signatures: Vec::new(),
        }
    }

    /// Appends a signature after the existing ones.
    pub fn add_signature(&mut self, pattern: &str) -> Result<(), regex::Error> {
        let regex = RegexBuilder::new(pattern).case_insensitive(true).build()?;
        self.signatures.push(ErrorSignature {
            pattern: pattern.to_string(),
            regex,
        });
        Ok(())
    }

    /// Appends every valid pattern, skipping the invalid ones with a warning.
    /// Returns how many were added.
    pub fn extend_signatures<I, S>(&mut self, patterns: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut added = 0;
        for pattern in patterns {
            let pattern = pattern.as_ref();
            match self.add_signature(pattern) {
                Ok(()) => added += 1,
                Err(e) => warn!("Skipping invalid error signature '{}': {}", pattern, e),
            }
        }
        added
    }

    pub fn signature_count(&self) -> usize {
        self.signatures.len()
    }

    /// Pattern text of the first signature found in `body`.
    pub fn detect(&self, body: &str) -> Option<&str> {
        self.signatures
            .iter()
            .find(|sig| sig.regex.is_match(body))
            .map(|sig| sig.pattern.as_str())
    }

    /// Fills the error fields of a raw result from its body excerpt.
    pub fn classify(&self, mut result: FuzzResult) -> FuzzResult {
        result.error_pattern = self.detect(&result.body_excerpt).map(str::to_string);
        result
    }
}

impl Default for ResponseClassifier {
    fn default() -> Self {
        Self::new()
    }
}
