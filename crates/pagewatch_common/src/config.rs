//! Configuration for the overlay.
//!
//! Loaded from a TOML file or string; every field has a default so an empty
//! document is a valid configuration.

use crate::error::{OverlayError, Result};
use crate::error_log::{LogLimits, DEFAULT_MAX_HISTORY, DEFAULT_RECENT_LIMIT};
use crate::patterns::{PatternMatcher, DEFAULT_SIGNATURES};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// What to do with an element whose text matched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Remediation {
    /// Record only
    #[default]
    Observe,
    /// Record and hide the element
    Suppress,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by RUST_LOG
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Include targets in log lines
    #[serde(default = "default_true")]
    pub with_target: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            with_target: default_true(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayConfig {
    /// Error signatures (regex, case-insensitive) in priority order
    #[serde(default = "default_patterns")]
    pub patterns: Vec<String>,

    /// Elements visited per scan slice
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Records shown in the panel
    #[serde(default = "default_recent_limit")]
    pub recent_limit: usize,

    /// Characters of message text shown per panel entry
    #[serde(default = "default_truncate_chars")]
    pub truncate_chars: usize,

    /// Retention ceiling for the error log (0 = unbounded)
    #[serde(default = "default_max_history")]
    pub max_history: usize,

    /// Suppress repeats of the same error inside this window
    #[serde(default)]
    pub dedup_window_ms: Option<u64>,

    #[serde(default)]
    pub remediation: Remediation,

    /// Attribute naming the module an element belongs to
    #[serde(default = "default_module_attribute")]
    pub module_attribute: String,

    /// Element id of the overlay panel
    #[serde(default = "default_panel_id")]
    pub panel_id: String,

    /// Pause between scan slices (0 = plain yield)
    #[serde(default)]
    pub idle_delay_ms: u64,

    /// Stop the initial sweep after this long
    #[serde(default)]
    pub scan_ceiling_ms: Option<u64>,

    /// Disconnect the mutation feed after this long
    #[serde(default)]
    pub feed_timeout_ms: Option<u64>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_patterns() -> Vec<String> {
    DEFAULT_SIGNATURES.iter().map(|s| s.to_string()).collect()
}

fn default_batch_size() -> usize {
    50
}

fn default_recent_limit() -> usize {
    DEFAULT_RECENT_LIMIT
}

fn default_truncate_chars() -> usize {
    100
}

fn default_max_history() -> usize {
    DEFAULT_MAX_HISTORY
}

fn default_module_attribute() -> String {
    "data-module".to_string()
}

fn default_panel_id() -> String {
    "global-error-panel".to_string()
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            patterns: default_patterns(),
            batch_size: default_batch_size(),
            recent_limit: default_recent_limit(),
            truncate_chars: default_truncate_chars(),
            max_history: default_max_history(),
            dedup_window_ms: None,
            remediation: Remediation::default(),
            module_attribute: default_module_attribute(),
            panel_id: default_panel_id(),
            idle_delay_ms: 0,
            scan_ceiling_ms: None,
            feed_timeout_ms: None,
            logging: LoggingConfig::default(),
        }
    }
}

impl OverlayConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: OverlayConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from a specific path
    pub fn load_from_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read overlay config {}", path.display()))?;
        let config = Self::from_toml_str(&content)
            .with_context(|| format!("Invalid overlay config {}", path.display()))?;
        info!("Loaded overlay config from {}", path.display());
        Ok(config)
    }

    /// Load config, falling back to defaults when missing or invalid
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load_from_path(path).unwrap_or_else(|e| {
            warn!("Overlay config not loaded, using defaults: {:#}", e);
            OverlayConfig::default()
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.patterns.is_empty() {
            return Err(OverlayError::InvalidConfig(
                "at least one error signature is required".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(OverlayError::InvalidConfig(
                "batch_size must be positive".to_string(),
            ));
        }
        if self.recent_limit == 0 {
            return Err(OverlayError::InvalidConfig(
                "recent_limit must be positive".to_string(),
            ));
        }
        if self.module_attribute.trim().is_empty() || self.panel_id.trim().is_empty() {
            return Err(OverlayError::InvalidConfig(
                "module_attribute and panel_id must not be empty".to_string(),
            ));
        }
        if self.scan_ceiling_ms == Some(0) || self.feed_timeout_ms == Some(0) {
            return Err(OverlayError::InvalidConfig(
                "scan_ceiling_ms and feed_timeout_ms must be positive when set".to_string(),
            ));
        }
        self.matcher()?;
        Ok(())
    }

    /// Compile the configured signatures
    pub fn matcher(&self) -> Result<PatternMatcher> {
        PatternMatcher::new(&self.patterns)
    }

    pub fn log_limits(&self) -> LogLimits {
        LogLimits {
            max_history: self.max_history,
            dedup_window: self.dedup_window_ms.map(Duration::from_millis),
        }
    }

    pub fn idle_delay(&self) -> Duration {
        Duration::from_millis(self.idle_delay_ms)
    }

    pub fn scan_ceiling(&self) -> Option<Duration> {
        self.scan_ceiling_ms.map(Duration::from_millis)
    }

    pub fn feed_timeout(&self) -> Option<Duration> {
        self.feed_timeout_ms.map(Duration::from_millis)
    }
}
