//! Host failure channels.
//!
//! The page host reports uncaught script errors and unhandled rejections by
//! dispatching [`HostEvent`]s into the receiver that event capture listens
//! on. Events are serde types so a host bridge can forward them as JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

/// Uncaught script error, as reported by the host
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScriptErrorEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Script URL the error was raised in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lineno: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colno: Option<u32>,
    /// The thrown value, if the host could capture it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl ScriptErrorEvent {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn with_position(mut self, lineno: u32, colno: u32) -> Self {
        self.lineno = Some(lineno);
        self.colno = Some(colno);
        self
    }
}

/// Unhandled rejection; the reason can be any value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RejectionEvent {
    #[serde(default)]
    pub reason: Option<Value>,
}

impl RejectionEvent {
    pub fn new(reason: Value) -> Self {
        Self {
            reason: Some(reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostEvent {
    ScriptError(ScriptErrorEvent),
    UnhandledRejection(RejectionEvent),
}

pub type HostEventStream = mpsc::UnboundedReceiver<HostEvent>;

/// Sending side of the host failure channels
#[derive(Debug, Clone)]
pub struct HostEvents {
    tx: mpsc::UnboundedSender<HostEvent>,
}

impl HostEvents {
    /// Create a connected dispatcher/stream pair
    pub fn channel() -> (Self, HostEventStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Dispatch an event; returns false once nothing is listening
    pub fn dispatch(&self, event: HostEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    pub fn script_error(&self, event: ScriptErrorEvent) -> bool {
        self.dispatch(HostEvent::ScriptError(event))
    }

    pub fn unhandled_rejection(&self, reason: Value) -> bool {
        self.dispatch(HostEvent::UnhandledRejection(RejectionEvent::new(reason)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_json_shape() {
        let event: HostEvent = serde_json::from_value(json!({
            "type": "script_error",
            "message": "x is not defined",
            "filename": "https://cdn.example/app.js",
            "lineno": 12
        }))
        .unwrap();

        match event {
            HostEvent::ScriptError(e) => {
                assert_eq!(e.filename.as_deref(), Some("https://cdn.example/app.js"));
                assert_eq!(e.lineno, Some(12));
                assert_eq!(e.colno, None);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_dispatch_after_receiver_dropped() {
        let (events, rx) = HostEvents::channel();
        assert!(events.unhandled_rejection(json!("nope")));
        drop(rx);
        assert!(!events.script_error(ScriptErrorEvent::new("late")));
    }
}
