//! Event capture - turns host failure events into error records
//!
//! Listens on the host event stream for the whole session. A listener must
//! never take the host down with it: record construction is fallible and
//! contained, and anything that goes wrong is logged and dropped.

use crate::session::SharedSession;
use pagewatch_common::record::{REJECTION_MODULE, UNKNOWN};
use pagewatch_common::{
    CaptureError, ErrorRecord, ErrorSource, HostEvent, HostEventStream, RejectionEvent,
    ScriptErrorEvent,
};
use serde_json::Value;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, info, warn};

pub const UNKNOWN_SCRIPT_ERROR: &str = "Unknown script error";
pub const UNHANDLED_REJECTION: &str = "Unhandled promise rejection";

/// Last path segment of a script URL, without query or fragment
pub fn module_from_filename(filename: &str) -> String {
    let path = filename.split(['?', '#']).next().unwrap_or_default();
    match path.rsplit('/').next() {
        Some(segment) if !segment.is_empty() && !segment.ends_with(':') => segment.to_string(),
        _ => UNKNOWN.to_string(),
    }
}

fn non_empty(text: Option<&str>) -> Option<&str> {
    text.filter(|t| !t.trim().is_empty())
}

/// `message` property of a thrown value, if it carries one
fn message_of(value: &Value) -> Option<&str> {
    non_empty(value.get("message").and_then(Value::as_str))
}

pub fn script_error_record(event: &ScriptErrorEvent) -> ErrorRecord {
    let text = non_empty(event.message.as_deref())
        .or_else(|| event.error.as_ref().and_then(message_of))
        .unwrap_or(UNKNOWN_SCRIPT_ERROR);

    let mut record = ErrorRecord::new(ErrorSource::ScriptError, text);
    if let Some(filename) = non_empty(event.filename.as_deref()) {
        record = record
            .with_module(module_from_filename(filename))
            .with_file(filename);
    }
    record
}

pub fn rejection_text(reason: Option<&Value>) -> Result<String, CaptureError> {
    let text = match reason {
        None | Some(Value::Null) => UNHANDLED_REJECTION.to_string(),
        Some(Value::String(s)) if s.trim().is_empty() => UNHANDLED_REJECTION.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(value) => match message_of(value) {
            Some(message) => message.to_string(),
            None => serde_json::to_string(value)?,
        },
    };
    Ok(text)
}

pub fn rejection_record(event: &RejectionEvent) -> Result<ErrorRecord, CaptureError> {
    let text = rejection_text(event.reason.as_ref())?;
    Ok(ErrorRecord::new(ErrorSource::UnhandledRejection, text).with_module(REJECTION_MODULE))
}

/// Build the record for any host event, containing panics
pub fn record_from_event(event: &HostEvent) -> Result<ErrorRecord, CaptureError> {
    let built = panic::catch_unwind(AssertUnwindSafe(|| match event {
        HostEvent::ScriptError(e) => Ok(script_error_record(e)),
        HostEvent::UnhandledRejection(e) => rejection_record(e),
    }));
    match built {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(CaptureError::Panicked(message))
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    pub captured: u64,
    pub failed: u64,
}

pub struct EventCapture {
    session: SharedSession,
    stream: HostEventStream,
    stats: CaptureStats,
}

impl EventCapture {
    pub fn new(session: SharedSession, stream: HostEventStream) -> Self {
        Self {
            session,
            stream,
            stats: CaptureStats::default(),
        }
    }

    pub fn stats(&self) -> CaptureStats {
        self.stats
    }

    /// Record one host event. Never fails outward.
    pub fn handle(&mut self, event: &HostEvent) -> bool {
        match record_from_event(event) {
            Ok(record) => {
                debug!(target: "pagewatch::capture", source = %record.source, "Captured host failure");
                self.session.report(record);
                self.stats.captured += 1;
                true
            }
            Err(e) => {
                warn!(target: "pagewatch::capture", "Dropping host event: {}", e);
                self.stats.failed += 1;
                false
            }
        }
    }

    /// Drain events already queued, without waiting
    pub fn handle_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.stream.try_recv() {
            self.handle(&event);
            handled += 1;
        }
        handled
    }

    /// Listen until the host closes its side of the channel
    pub async fn run(mut self) -> CaptureStats {
        while let Some(event) = self.stream.recv().await {
            self.handle(&event);
        }
        info!(
            target: "pagewatch::capture",
            captured = self.stats.captured,
            failed = self.stats.failed,
            "Host event channel closed"
        );
        self.stats
    }
}
