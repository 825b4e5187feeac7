//! Panel renderer - the on-page overlay
//!
//! Every redraw is a full, idempotent rebuild from a snapshot of the module
//! registry and the recent window of the error log. Redraws are requested
//! through the session's coalesced refresh signal, so a burst of writes costs
//! one rebuild.

use crate::session::{Session, SharedSession};
use pagewatch_common::dom::{escape_attr, escape_text};
use pagewatch_common::error::Result;
use pagewatch_common::{ErrorRecord, ModuleRegistration, NodeId, OverlayError, SharedDocument};
use std::fmt::Write as _;
use tracing::{debug, info};

pub const DEFAULT_PANEL_ID: &str = "global-error-panel";
pub const PANEL_TITLE: &str = "Click to toggle visibility";
pub const EMPTY_LOG: &str = "No errors detected";
pub const EMPTY_TEXT: &str = "(no message)";
pub const TRUNCATION_MARKER: &str = "...";
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Cut `text` to `limit` characters, marking the cut. Zero disables the cut.
pub fn truncate(text: &str, limit: usize) -> String {
    if limit == 0 || text.chars().count() <= limit {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(limit).collect();
    cut.push_str(TRUNCATION_MARKER);
    cut
}

/// One displayed log line, already truncated and formatted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelEntry {
    pub seq: u64,
    pub module: String,
    pub file: String,
    pub origin: String,
    pub message: String,
    pub time: String,
}

impl PanelEntry {
    pub fn from_record(record: &ErrorRecord, truncate_chars: usize) -> Self {
        let message = if record.text.trim().is_empty() {
            EMPTY_TEXT.to_string()
        } else {
            truncate(&record.text, truncate_chars)
        };
        Self {
            seq: record.seq,
            module: record.module_hint.clone(),
            file: record.file_hint.clone(),
            origin: record.source.label().to_string(),
            message,
            time: record.captured_at.format(TIMESTAMP_FORMAT).to_string(),
        }
    }
}

/// Snapshot of everything the panel shows
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PanelView {
    pub modules: Vec<ModuleRegistration>,
    pub recent_limit: usize,
    /// Oldest first
    pub entries: Vec<PanelEntry>,
}

impl PanelView {
    pub fn capture(session: &Session, recent_limit: usize, truncate_chars: usize) -> Self {
        let modules = session.modules().entries().to_vec();
        let entries = session
            .log()
            .recent(recent_limit)
            .into_iter()
            .map(|record| PanelEntry::from_record(record, truncate_chars))
            .collect();
        Self {
            modules,
            recent_limit,
            entries,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Panel body markup; every piece of page-derived text is escaped
    pub fn to_markup(&self) -> String {
        let mut html = String::from("<b>Registered modules:</b><br>");
        for module in &self.modules {
            let _ = write!(
                html,
                "- [{}] {}<br>",
                escape_text(&module.id),
                escape_text(&module.display_name)
            );
        }

        let _ = write!(
            html,
            "<hr><b>Detected errors (last {}):</b><br>",
            self.recent_limit
        );
        if self.entries.is_empty() {
            html.push_str(EMPTY_LOG);
            return html;
        }
        for entry in &self.entries {
            let _ = write!(
                html,
                "<div class=\"entry\" data-seq=\"{}\">\
                 <b>Module:</b> {}<br>\
                 <b>File:</b> {}<br>\
                 <b>Origin:</b> {}<br>\
                 <b>Message:</b> {}<br>\
                 <b>Time:</b> {}\
                 </div>",
                entry.seq,
                escape_text(&entry.module),
                escape_text(&entry.file),
                escape_text(&entry.origin),
                escape_text(&entry.message),
                escape_text(&entry.time),
            );
        }
        html
    }
}

pub struct Panel {
    document: SharedDocument,
    session: SharedSession,
    element: Option<NodeId>,
    panel_id: String,
    recent_limit: usize,
    truncate_chars: usize,
    visible: bool,
    shown_once: bool,
    redraws: u64,
}

impl Panel {
    pub fn new(
        document: SharedDocument,
        session: SharedSession,
        panel_id: impl Into<String>,
        recent_limit: usize,
        truncate_chars: usize,
    ) -> Self {
        Self {
            document,
            session,
            element: None,
            panel_id: panel_id.into(),
            recent_limit,
            truncate_chars,
            visible: false,
            shown_once: false,
            redraws: 0,
        }
    }

    /// Append the hidden overlay element to the body. Mounting twice is a no-op.
    pub fn mount(&mut self) -> Result<NodeId> {
        if let Some(element) = self.element {
            return Ok(element);
        }
        let mut doc = self.document.borrow_mut();
        let body = doc.body();
        let id = escape_attr(&self.panel_id);
        let markup = format!("<div id=\"{}\" title=\"{}\" hidden></div>", id, PANEL_TITLE);
        let element = doc
            .append_html(body, &markup)?
            .into_iter()
            .find(|&node| doc.is_element(node))
            .ok_or_else(|| {
                OverlayError::InvalidConfig(format!(
                    "panel id {:?} produced no element",
                    self.panel_id
                ))
            })?;
        self.element = Some(element);
        debug!(target: "pagewatch::panel", panel = %element, "Panel mounted");
        Ok(element)
    }

    pub fn element(&self) -> Option<NodeId> {
        self.element
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn redraws(&self) -> u64 {
        self.redraws
    }

    pub fn view(&self) -> PanelView {
        PanelView::capture(&self.session, self.recent_limit, self.truncate_chars)
    }

    /// Rebuild the panel contents. Returns false when nothing was drawn.
    pub fn refresh(&mut self) -> bool {
        let Some(element) = self.element else {
            return false;
        };
        let markup = self.view().to_markup();

        let Ok(mut doc) = self.document.try_borrow_mut() else {
            debug!(target: "pagewatch::panel", "Document busy, skipping redraw");
            // The wakeup that got us here is spent; ask again
            self.session.request_refresh();
            return false;
        };
        if let Err(e) = doc.set_inner_html(element, &markup) {
            debug!(target: "pagewatch::panel", kind = e.kind(), "Redraw failed: {}", e);
            return false;
        }
        if !self.shown_once {
            self.shown_once = true;
            self.visible = true;
            let _ = doc.set_hidden(element, false);
            info!(target: "pagewatch::panel", "Panel shown");
        }
        self.redraws += 1;
        true
    }

    /// Flip visibility; persists across redraws
    pub fn toggle(&mut self) -> bool {
        let Some(element) = self.element else {
            return self.visible;
        };
        let Ok(mut doc) = self.document.try_borrow_mut() else {
            debug!(target: "pagewatch::panel", "Document busy, ignoring toggle");
            return self.visible;
        };
        self.visible = !self.visible;
        self.shown_once = true;
        let _ = doc.set_hidden(element, !self.visible);
        self.visible
    }

    /// Toggle when the click landed inside the overlay subtree
    pub fn handle_click(&mut self, target: NodeId) -> bool {
        let inside = match self.element {
            Some(element) => self
                .document
                .try_borrow()
                .map(|doc| doc.is_inclusive_ancestor(element, target))
                .unwrap_or(false),
            None => false,
        };
        if inside {
            self.toggle();
        }
        inside
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagewatch_common::{Document, ErrorSource, LogLimits};

    fn mounted(html: &str) -> (SharedDocument, SharedSession, Panel) {
        let document = Document::parse_html(html).into_shared();
        let session = Session::new(LogLimits::default());
        let mut panel = Panel::new(document.clone(), session.clone(), DEFAULT_PANEL_ID, 20, 100);
        panel.mount().unwrap();
        (document, session, panel)
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 100), "short");
        let long = "x".repeat(150);
        let cut = truncate(&long, 100);
        assert_eq!(cut.len(), 103);
        assert!(cut.ends_with(TRUNCATION_MARKER));
        assert_eq!(truncate("ãçéíõú", 3), "ãçé...");
        assert_eq!(truncate(&long, 0), long);
    }

    #[test]
    fn test_mount_appends_hidden_overlay() {
        let (doc, _session, panel) = mounted("<body><p>page</p></body>");
        let doc = doc.borrow();
        let element = doc.element_by_id(DEFAULT_PANEL_ID).unwrap();
        assert_eq!(panel.element(), Some(element));
        assert_eq!(doc.parent(element), Some(doc.body()));
        assert_eq!(doc.attr(element, "title"), Some(PANEL_TITLE));
        assert!(doc.is_hidden(element));
        assert!(!panel.is_visible());
    }

    #[test]
    fn test_refresh_before_mount_is_noop() {
        let document = Document::new().into_shared();
        let session = Session::new(LogLimits::default());
        let mut panel = Panel::new(document, session, DEFAULT_PANEL_ID, 20, 100);
        assert!(!panel.refresh());
        assert_eq!(panel.redraws(), 0);
    }

    #[test]
    fn test_empty_log_markup() {
        let (doc, session, mut panel) = mounted("<body></body>");
        session.register_module("cart", Some("Cart")).unwrap();
        assert!(panel.refresh());

        let doc = doc.borrow();
        let element = panel.element().unwrap();
        let html = doc.inner_html(element);
        assert!(html.contains("- [cart] Cart"));
        assert!(html.contains(EMPTY_LOG));
        assert!(!doc.is_hidden(element));
        assert!(panel.is_visible());
    }

    #[test]
    fn test_entries_are_escaped_and_truncated() {
        let (doc, session, mut panel) = mounted("<body></body>");
        session.report(ErrorRecord::new(
            ErrorSource::DomPattern,
            "<img src=x onerror=alert(1)> erro",
        ));
        session.report(ErrorRecord::new(ErrorSource::ScriptError, "e".repeat(120)));
        session.report(ErrorRecord::new(ErrorSource::ScriptError, ""));
        panel.refresh();

        let doc = doc.borrow();
        let element = panel.element().unwrap();
        // No element was injected from record text
        assert!(doc
            .descendant_elements(element)
            .iter()
            .all(|&n| doc.tag_name(n) != Some("img")));
        let text = doc.text_content(element);
        assert!(text.contains("<img src=x onerror=alert(1)> erro"));
        assert!(text.contains(&format!("{}...", "e".repeat(100))));
        assert!(text.contains(EMPTY_TEXT));
        assert!(text.contains("Origin: script error"));
    }

    #[test]
    fn test_view_keeps_last_twenty_oldest_first() {
        let (_doc, session, panel) = mounted("<body></body>");
        for i in 0..25 {
            session.report(ErrorRecord::new(ErrorSource::DomPattern, format!("erro {i}")));
        }
        let view = panel.view();
        assert_eq!(view.entries.len(), 20);
        assert_eq!(view.entries[0].message, "erro 5");
        assert_eq!(view.entries[19].message, "erro 24");
    }

    #[test]
    fn test_toggle_survives_refresh() {
        let (doc, _session, mut panel) = mounted("<body></body>");
        panel.refresh();
        let element = panel.element().unwrap();
        let initial = doc.borrow().is_hidden(element);

        assert!(!panel.toggle());
        panel.refresh();
        assert!(doc.borrow().is_hidden(element));

        assert!(panel.toggle());
        panel.refresh();
        assert_eq!(doc.borrow().is_hidden(element), initial);
    }

    #[test]
    fn test_click_inside_panel_toggles() {
        let (doc, session, mut panel) = mounted(r#"<body><p id="outside">x</p></body>"#);
        session.report(ErrorRecord::new(ErrorSource::DomPattern, "erro"));
        panel.refresh();

        let element = panel.element().unwrap();
        let inner = doc.borrow().descendant_elements(element)[0];
        let outside = doc.borrow().element_by_id("outside").unwrap();

        assert!(!panel.handle_click(outside));
        assert!(panel.is_visible());
        assert!(panel.handle_click(inner));
        assert!(!panel.is_visible());
    }

    #[tokio::test]
    async fn test_busy_document_skips_redraw_and_rearms() {
        let (doc, session, mut panel) = mounted("<body></body>");
        session.report(ErrorRecord::new(ErrorSource::ScriptError, "boom"));
        session.refresh_requested().await;

        let guard = doc.borrow();
        assert!(!panel.refresh());
        assert_eq!(panel.redraws(), 0);
        drop(guard);

        // The skipped redraw left a pending request behind
        tokio::time::timeout(std::time::Duration::from_millis(50), session.refresh_requested())
            .await
            .expect("refresh re-requested");
        assert!(panel.refresh());
        assert!(doc.borrow().text_content(panel.element().unwrap()).contains("boom"));
    }
}
