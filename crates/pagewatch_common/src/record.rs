//! Detected-error records.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

/// Fallback for module and file hints that could not be derived.
pub const UNKNOWN: &str = "unknown";

/// Module hint attached to every unhandled-rejection record.
pub const REJECTION_MODULE: &str = "Promise";

/// Channel an error was detected on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSource {
    ScriptError,
    UnhandledRejection,
    DomPattern,
}

impl ErrorSource {
    pub fn label(&self) -> &'static str {
        match self {
            ErrorSource::ScriptError => "script error",
            ErrorSource::UnhandledRejection => "unhandled rejection",
            ErrorSource::DomPattern => "page content",
        }
    }
}

impl fmt::Display for ErrorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One detected failure.
///
/// Records are built by the producers and handed to the
/// [`ErrorLog`](crate::error_log::ErrorLog), which only ever lends them out
/// by shared reference afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorRecord {
    /// Append sequence number, assigned by the error log
    pub seq: u64,
    /// Full detected message (truncated only when displayed)
    pub text: String,
    /// Origin channel
    pub source: ErrorSource,
    /// Best-effort module attribution
    pub module_hint: String,
    /// Originating resource, script errors only
    pub file_hint: String,
    /// Signature that matched, page-content records only
    pub rule_index: Option<usize>,
    /// Monotonic capture time
    pub detected_at: Instant,
    /// Wall-clock capture time, for display
    pub captured_at: DateTime<Local>,
}

impl ErrorRecord {
    pub fn new(source: ErrorSource, text: impl Into<String>) -> Self {
        Self {
            seq: 0,
            text: text.into(),
            source,
            module_hint: UNKNOWN.to_string(),
            file_hint: UNKNOWN.to_string(),
            rule_index: None,
            detected_at: Instant::now(),
            captured_at: Local::now(),
        }
    }

    /// Set module hint; empty hints keep the `unknown` fallback
    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        let module = module.into();
        if !module.trim().is_empty() {
            self.module_hint = module;
        }
        self
    }

    /// Set file hint; empty hints keep the `unknown` fallback
    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        let file = file.into();
        if !file.trim().is_empty() {
            self.file_hint = file;
        }
        self
    }

    pub fn with_rule(mut self, rule_index: usize) -> Self {
        self.rule_index = Some(rule_index);
        self
    }

    /// Key used by the optional suppression window
    pub fn dedup_key(&self) -> (String, ErrorSource, String) {
        (self.text.clone(), self.source, self.module_hint.clone())
    }
}
