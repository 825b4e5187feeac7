//! Overlay lifecycle.
//!
//! [`Overlay::install`] binds event capture and mounts the panel;
//! [`Overlay::document_ready`] starts the page sweep and the mutation feed.
//! All background work runs as `spawn_local` tasks, so both must be called
//! from inside a [`tokio::task::LocalSet`].

use crate::capture::{CaptureStats, EventCapture};
use crate::inspect::Inspector;
use crate::mutation_feed::{FeedStats, MutationFeed};
use crate::panel::{Panel, PanelView};
use crate::scanner::{DomScanner, ScanReport};
use crate::scheduler::{IdleScheduler, StopSignal};
use crate::session::{Session, SharedSession};
use pagewatch_common::dom::ObserverId;
use pagewatch_common::error::Result;
use pagewatch_common::{ErrorRecord, HostEventStream, NodeId, OverlayConfig, SharedDocument};
use std::cell::RefCell;
use std::rc::Rc;
use tokio::task::{spawn_local, JoinHandle};
use tracing::{debug, info};

type SharedPanel = Rc<RefCell<Panel>>;

pub struct Overlay {
    document: SharedDocument,
    session: SharedSession,
    panel: SharedPanel,
    inspector: Rc<Inspector>,
    config: OverlayConfig,
    scan_stop: StopSignal,
    feed_stop: StopSignal,
    observer: Option<ObserverId>,
    ready: bool,
    capture_task: JoinHandle<CaptureStats>,
    refresh_task: JoinHandle<()>,
    scan_task: Option<JoinHandle<ScanReport>>,
    feed_task: Option<JoinHandle<FeedStats>>,
}

impl Overlay {
    /// Bind the host failure channels and mount the (hidden) panel
    pub fn install(
        document: SharedDocument,
        host_events: HostEventStream,
        config: OverlayConfig,
    ) -> Result<Self> {
        config.validate()?;
        let matcher = config.matcher()?;
        let session = Session::new(config.log_limits());

        let mut panel = Panel::new(
            document.clone(),
            session.clone(),
            config.panel_id.clone(),
            config.recent_limit,
            config.truncate_chars,
        );
        let panel_element = panel.mount()?;
        let panel = Rc::new(RefCell::new(panel));

        let inspector = Rc::new(
            Inspector::new(matcher, config.module_attribute.clone())
                .with_remediation(config.remediation)
                .excluding(panel_element),
        );

        let capture_task = spawn_local(EventCapture::new(session.clone(), host_events).run());
        let refresh_task = spawn_local(refresh_loop(session.clone(), panel.clone()));

        info!(
            rules = config.patterns.len(),
            remediation = ?config.remediation,
            "Overlay installed"
        );

        Ok(Self {
            document,
            session,
            panel,
            inspector,
            config,
            scan_stop: StopSignal::new(),
            feed_stop: StopSignal::new(),
            observer: None,
            ready: false,
            capture_task,
            refresh_task,
            scan_task: None,
            feed_task: None,
        })
    }

    /// Start the sweep and the feed. Calling it again does nothing.
    pub fn document_ready(&mut self) -> Result<()> {
        if self.ready {
            debug!("Overlay already started");
            return Ok(());
        }

        // Snapshot first, then subscribe: nothing lands in both
        let scanner = DomScanner::prepare(
            self.document.clone(),
            self.session.clone(),
            self.inspector.clone(),
            self.config.batch_size,
        )
        .with_scheduler(IdleScheduler::new(self.config.idle_delay()))
        .with_ceiling(self.config.scan_ceiling())
        .with_stop(self.scan_stop.clone());

        let body = self.document.borrow().body();
        let feed = MutationFeed::connect(
            self.document.clone(),
            self.session.clone(),
            self.inspector.clone(),
            body,
        )?
        .with_stop(self.feed_stop.clone())
        .with_timeout(self.config.feed_timeout());

        self.observer = feed.observer();
        let pending = scanner.pending();
        self.scan_task = Some(spawn_local(scanner.scan_all()));
        self.feed_task = Some(spawn_local(feed.run()));
        self.ready = true;

        info!(elements = pending, "Overlay started");
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Wait for the initial sweep. `None` if it never started or was aborted.
    pub async fn wait_for_scan(&mut self) -> Option<ScanReport> {
        let task = self.scan_task.take()?;
        task.await.ok()
    }

    /// Stop the feed now and cancel the sweep at its next batch boundary
    pub fn disconnect(&mut self) {
        self.scan_stop.stop();
        self.feed_stop.stop();
        if let Some(observer) = self.observer.take() {
            if let Ok(mut doc) = self.document.try_borrow_mut() {
                doc.disconnect_observer(observer);
            }
            info!("Overlay disconnected");
        }
    }

    pub fn handle(&self) -> OverlayHandle {
        OverlayHandle {
            session: self.session.clone(),
            panel: self.panel.clone(),
        }
    }

    pub fn session(&self) -> &SharedSession {
        &self.session
    }

    pub fn config(&self) -> &OverlayConfig {
        &self.config
    }

    pub fn panel_element(&self) -> Option<NodeId> {
        self.panel.try_borrow().ok().and_then(|p| p.element())
    }
}

impl Drop for Overlay {
    fn drop(&mut self) {
        self.disconnect();
        self.capture_task.abort();
        self.refresh_task.abort();
        if let Some(task) = &self.scan_task {
            task.abort();
        }
        if let Some(task) = &self.feed_task {
            task.abort();
        }
    }
}

/// Redraw whenever the session signals a write
async fn refresh_loop(session: SharedSession, panel: SharedPanel) {
    loop {
        session.refresh_requested().await;
        let drawn = match panel.try_borrow_mut() {
            Ok(mut panel) => panel.refresh(),
            Err(_) => {
                debug!(target: "pagewatch::panel", "Panel busy, skipping redraw");
                session.request_refresh();
                false
            }
        };
        if !drawn {
            // A re-armed request resolves at once; let the holder finish first
            tokio::task::yield_now().await;
        }
    }
}

/// Cloneable access for host code: module registration and panel control
#[derive(Clone)]
pub struct OverlayHandle {
    session: SharedSession,
    panel: SharedPanel,
}

impl OverlayHandle {
    /// Upsert a module. The panel redraws on the next tick.
    pub fn register_module(&self, id: &str, display_name: Option<&str>) -> Result<()> {
        self.session.register_module(id, display_name)
    }

    pub fn toggle_panel(&self) -> bool {
        self.panel
            .try_borrow_mut()
            .map(|mut panel| panel.toggle())
            .unwrap_or(false)
    }

    /// Forward a click; toggles when it landed on the overlay
    pub fn click(&self, target: NodeId) -> bool {
        self.panel
            .try_borrow_mut()
            .map(|mut panel| panel.handle_click(target))
            .unwrap_or(false)
    }

    /// Redraw synchronously instead of waiting for the refresh task
    pub fn refresh_now(&self) -> bool {
        self.panel
            .try_borrow_mut()
            .map(|mut panel| panel.refresh())
            .unwrap_or(false)
    }

    pub fn is_panel_visible(&self) -> bool {
        self.panel
            .try_borrow()
            .map(|panel| panel.is_visible())
            .unwrap_or(false)
    }

    pub fn panel_view(&self) -> Option<PanelView> {
        self.panel.try_borrow().ok().map(|panel| panel.view())
    }

    pub fn recent(&self, n: usize) -> Vec<ErrorRecord> {
        self.session.recent(n)
    }

    pub fn error_count(&self) -> usize {
        self.session.log().len()
    }

    pub fn module_name(&self, id: &str) -> String {
        self.session.modules().lookup(id).to_string()
    }
}
