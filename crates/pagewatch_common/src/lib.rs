//! Shared types for the pagewatch overlay.
//!
//! Everything here is plain data plus synchronous logic: the document model,
//! error signatures, the module registry and the error log. Scheduling and
//! wiring live in the `pagewatch` crate.

pub mod config;
pub mod dom;
pub mod error;
pub mod error_log;
pub mod host;
pub mod patterns;
pub mod record;
pub mod registry;

pub use config::{LoggingConfig, OverlayConfig, Remediation};
pub use dom::{Document, MutationRecord, NodeId, SharedDocument};
pub use error::{CaptureError, OverlayError};
pub use error_log::{AppendOutcome, ErrorLog, LogLimits};
pub use host::{HostEvent, HostEventStream, HostEvents, RejectionEvent, ScriptErrorEvent};
pub use patterns::{MatchOutcome, PatternMatcher};
pub use record::{ErrorRecord, ErrorSource};
pub use registry::{ModuleRegistration, ModuleRegistry};
