//! pagewatch - runtime error overlay for a loaded page.
//!
//! Three producers feed one error log: event capture (uncaught script errors
//! and unhandled rejections), the incremental page sweep, and the mutation
//! feed for content inserted later. The panel renders the log on the page.
//!
//! Everything runs on one thread; see [`overlay::Overlay`] for the lifecycle.

pub mod capture;
pub mod inspect;
pub mod mutation_feed;
pub mod overlay;
pub mod panel;
pub mod scanner;
pub mod scheduler;
pub mod session;
pub mod telemetry;

pub use capture::{CaptureStats, EventCapture};
pub use inspect::{Detection, Inspection, Inspector};
pub use mutation_feed::{FeedStats, MutationFeed};
pub use overlay::{Overlay, OverlayHandle};
pub use panel::{Panel, PanelEntry, PanelView};
pub use scanner::{DomScanner, ScanReport};
pub use scheduler::{IdleScheduler, StopSignal};
pub use session::{Session, SharedSession};
pub use telemetry::init_tracing;

pub use pagewatch_common::{
    Document, ErrorRecord, ErrorSource, HostEvent, HostEvents, OverlayConfig, OverlayError,
    Remediation,
};
