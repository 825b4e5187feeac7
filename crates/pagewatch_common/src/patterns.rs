//! Error signature matching.
//!
//! Decides whether a piece of rendered text looks like an error, and which
//! signature flagged it. Called for every element visited by a scan, so the
//! hot path only runs `Regex::is_match` over the compiled rules.

use crate::error::{OverlayError, Result};
use regex::{Regex, RegexBuilder};
use std::sync::LazyLock;

/// Built-in signatures, in priority order
pub const DEFAULT_SIGNATURES: &[&str] = &[r"NOT_FOUND gru1::", r"404", r"erro"];

static DEFAULT_MATCHER: LazyLock<PatternMatcher> = LazyLock::new(|| {
    PatternMatcher::new(DEFAULT_SIGNATURES.iter().copied())
        .expect("built-in signatures are valid regexes")
});

/// Result of testing one string against the rule set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MatchOutcome {
    pub matched: bool,
    pub rule_index: Option<usize>,
}

impl MatchOutcome {
    const MISS: MatchOutcome = MatchOutcome {
        matched: false,
        rule_index: None,
    };

    fn hit(rule_index: usize) -> Self {
        Self {
            matched: true,
            rule_index: Some(rule_index),
        }
    }
}

/// Ordered, case-insensitive error signatures
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    rules: Vec<Regex>,
}

impl PatternMatcher {
    /// Compile signatures in the given order
    pub fn new<I, S>(signatures: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let rules = signatures
            .into_iter()
            .map(|signature| {
                let signature = signature.as_ref();
                RegexBuilder::new(signature)
                    .case_insensitive(true)
                    .build()
                    .map_err(|source| OverlayError::InvalidPattern {
                        pattern: signature.to_string(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { rules })
    }

    /// Test text against the rules; the first matching rule wins
    pub fn matches(&self, text: &str) -> MatchOutcome {
        match self.first_match(text) {
            Some(index) => MatchOutcome::hit(index),
            None => MatchOutcome::MISS,
        }
    }

    pub fn first_match(&self, text: &str) -> Option<usize> {
        if text.is_empty() {
            return None;
        }
        self.rules.iter().position(|rule| rule.is_match(text))
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Source of the rule at `index`
    pub fn signature(&self, index: usize) -> Option<&str> {
        self.rules.get(index).map(Regex::as_str)
    }
}

impl Default for PatternMatcher {
    fn default() -> Self {
        DEFAULT_MATCHER.clone()
    }
}
