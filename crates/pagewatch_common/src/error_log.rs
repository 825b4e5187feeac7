//! Error log: append-only store of detected errors.
//!
//! The panel only ever shows a short recent window, but the log itself keeps
//! history up to a retention ceiling and evicts oldest-first beyond it.

use crate::record::{ErrorRecord, ErrorSource};
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use tracing::warn;

/// Default retention ceiling
pub const DEFAULT_MAX_HISTORY: usize = 1000;

/// Default size of the recent view
pub const DEFAULT_RECENT_LIMIT: usize = 20;

/// What happened to an appended record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// Stored with this sequence number
    Appended(u64),
    /// Dropped by the suppression window
    Suppressed,
}

impl AppendOutcome {
    pub fn is_appended(&self) -> bool {
        matches!(self, AppendOutcome::Appended(_))
    }
}

/// Retention and suppression limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogLimits {
    /// Maximum records retained; 0 keeps everything
    pub max_history: usize,
    /// Drop repeats of the same (text, source, module) inside this window
    pub dedup_window: Option<Duration>,
}

impl Default for LogLimits {
    fn default() -> Self {
        Self {
            max_history: DEFAULT_MAX_HISTORY,
            dedup_window: None,
        }
    }
}

type DedupKey = (String, ErrorSource, String);

#[derive(Debug, Default)]
pub struct ErrorLog {
    records: VecDeque<ErrorRecord>,
    limits: LogLimits,
    next_seq: u64,
    evicted: u64,
    suppressed: u64,
    last_seen: HashMap<DedupKey, Instant>,
}

impl ErrorLog {
    pub fn new(limits: LogLimits) -> Self {
        Self {
            limits,
            ..Self::default()
        }
    }

    /// Append a record, assigning its sequence number
    pub fn append(&mut self, mut record: ErrorRecord) -> AppendOutcome {
        if let Some(window) = self.limits.dedup_window {
            let now = record.detected_at;
            self.last_seen
                .retain(|_, seen| now.saturating_duration_since(*seen) < window);

            let key = record.dedup_key();
            if self.last_seen.contains_key(&key) {
                self.suppressed += 1;
                return AppendOutcome::Suppressed;
            }
            self.last_seen.insert(key, now);
        }

        self.next_seq += 1;
        record.seq = self.next_seq;

        warn!(
            seq = record.seq,
            source = %record.source,
            module = %record.module_hint,
            file = %record.file_hint,
            "Error detected: {}",
            record.text
        );

        self.records.push_back(record);

        if self.limits.max_history > 0 {
            while self.records.len() > self.limits.max_history {
                self.records.pop_front();
                self.evicted += 1;
            }
        }

        AppendOutcome::Appended(self.next_seq)
    }

    /// Last `n` records, oldest first
    pub fn recent(&self, n: usize) -> Vec<&ErrorRecord> {
        let start = self.records.len().saturating_sub(n);
        self.records.range(start..).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ErrorRecord> {
        self.records.iter()
    }

    /// Records currently retained
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records ever accepted, including evicted ones
    pub fn total_appended(&self) -> u64 {
        self.next_seq
    }

    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    pub fn suppressed(&self) -> u64 {
        self.suppressed
    }

    pub fn limits(&self) -> LogLimits {
        self.limits
    }
}
