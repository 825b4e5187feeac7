//! End-to-end tests for the overlay lifecycle

use pagewatch::{
    Document, ErrorSource, HostEvents, Overlay, OverlayConfig, OverlayError, Remediation,
};
use pagewatch_common::host::ScriptErrorEvent;
use pagewatch_common::SharedDocument;
use serde_json::json;
use tokio::task::LocalSet;

const PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Storefront</title></head>
<body>
  <header id="top">Welcome back</header>
  <main data-module="catalog">
    <ul>
      <li>Lamp</li>
      <li>Desk</li>
    </ul>
    <p id="notice">Erro 404 ao carregar</p>
  </main>
  <footer>All rights reserved</footer>
</body>
</html>"#;

/// Let spawned local tasks run
async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

fn install(config: OverlayConfig) -> (SharedDocument, HostEvents, Overlay) {
    let document = Document::parse_html(PAGE).into_shared();
    let (host, events) = HostEvents::channel();
    let overlay = Overlay::install(document.clone(), events, config).unwrap();
    (document, host, overlay)
}

// ============================================================================
// Initial sweep
// ============================================================================

#[tokio::test]
async fn test_initial_sweep_finds_page_errors() {
    LocalSet::new()
        .run_until(async {
            let (_doc, _host, mut overlay) = install(OverlayConfig::default());
            overlay.document_ready().unwrap();
            let report = overlay.wait_for_scan().await.unwrap();

            assert!(report.completed);
            // header, main, ul, 2 li, p, footer
            assert_eq!(report.visited, 7);
            // main (containing the notice) and the notice itself
            assert_eq!(report.matched, 2);

            let records = overlay.handle().recent(20);
            assert!(records.iter().all(|r| r.source == ErrorSource::DomPattern));
            assert!(records.iter().all(|r| r.module_hint == "catalog"));
            assert_eq!(records[1].text, "Erro 404 ao carregar");
            assert_eq!(records[1].rule_index, Some(1));
        })
        .await;
}

#[tokio::test]
async fn test_document_ready_is_idempotent() {
    LocalSet::new()
        .run_until(async {
            let (doc, _host, mut overlay) = install(OverlayConfig::default());
            overlay.document_ready().unwrap();
            overlay.document_ready().unwrap();
            assert!(overlay.is_ready());
            assert_eq!(doc.borrow().observer_count(), 1);

            overlay.wait_for_scan().await.unwrap();
            settle().await;
            assert_eq!(overlay.handle().error_count(), 2);
        })
        .await;
}

#[tokio::test]
async fn test_disconnect_cancels_sweep_and_feed() {
    LocalSet::new()
        .run_until(async {
            let (doc, _host, mut overlay) = install(OverlayConfig::default());
            overlay.document_ready().unwrap();
            overlay.disconnect();

            let report = overlay.wait_for_scan().await.unwrap();
            assert!(!report.completed);
            assert_eq!(report.visited, 0);
            assert_eq!(doc.borrow().observer_count(), 0);

            let body = doc.borrow().body();
            doc.borrow_mut()
                .append_element(body, "div", &[], "NOT_FOUND gru1::late")
                .unwrap();
            settle().await;
            assert_eq!(overlay.handle().error_count(), 0);
        })
        .await;
}

// ============================================================================
// Mutation feed
// ============================================================================

#[tokio::test]
async fn test_inserted_signature_yields_one_record() {
    LocalSet::new()
        .run_until(async {
            let (doc, _host, mut overlay) = install(OverlayConfig::default());
            overlay.document_ready().unwrap();
            overlay.wait_for_scan().await.unwrap();
            settle().await;
            let handle = overlay.handle();
            let before = handle.error_count();

            let body = doc.borrow().body();
            doc.borrow_mut()
                .append_element(body, "div", &[("id", "late")], "NOT_FOUND gru1::resource")
                .unwrap();
            settle().await;

            let records = handle.recent(100);
            assert_eq!(records.len(), before + 1);
            let last = records.last().unwrap();
            assert_eq!(last.source, ErrorSource::DomPattern);
            assert_eq!(last.text, "NOT_FOUND gru1::resource");
            assert_eq!(last.module_hint, "late");
            assert_eq!(last.rule_index, Some(0));
        })
        .await;
}

#[tokio::test]
async fn test_panel_redraws_are_not_detected() {
    LocalSet::new()
        .run_until(async {
            let (_doc, host, mut overlay) = install(OverlayConfig::default());
            overlay.document_ready().unwrap();
            overlay.wait_for_scan().await.unwrap();

            // The panel now shows "erro" text in several redraws
            host.script_error(ScriptErrorEvent::new("erro fatal"));
            settle().await;
            overlay.handle().refresh_now();
            settle().await;

            assert_eq!(overlay.handle().error_count(), 3);
        })
        .await;
}

#[tokio::test]
async fn test_page_changes_while_sweep_is_paused() {
    LocalSet::new()
        .run_until(async {
            let mut markup = String::from("<body><ul id=\"rows\">");
            for i in 0..200 {
                markup.push_str(&format!("<li>Row {i}</li>"));
            }
            markup.push_str("</ul></body>");
            let document = Document::parse_html(&markup).into_shared();
            let (_host, events) = HostEvents::channel();
            let config = OverlayConfig {
                batch_size: 50,
                idle_delay_ms: 25,
                ..OverlayConfig::default()
            };
            let mut overlay = Overlay::install(document.clone(), events, config).unwrap();
            overlay.document_ready().unwrap();

            // First batch runs, then the sweep sleeps between slices
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            assert_eq!(overlay.handle().error_count(), 0);

            {
                let mut doc = document.borrow_mut();
                let rows = doc.element_by_id("rows").unwrap();
                let doomed: Vec<_> = doc.children(rows)[150..].to_vec();
                for row in doomed {
                    doc.remove(row).unwrap();
                }
                let body = doc.body();
                doc.append_element(body, "div", &[("id", "late")], "NOT_FOUND gru1::x")
                    .unwrap();
            }

            let report = overlay.wait_for_scan().await.unwrap();
            settle().await;

            assert!(report.completed);
            // ul + 200 li from the snapshot; the late div is not in it
            assert_eq!(report.visited, 201);
            assert_eq!(report.skipped, 50);
            assert_eq!(report.batches, 5);
            assert_eq!(report.matched, 0);

            let records = overlay.handle().recent(20);
            assert_eq!(records.len(), 1);
            assert_eq!(records[0].text, "NOT_FOUND gru1::x");
            assert_eq!(records[0].module_hint, "late");
        })
        .await;
}

// ============================================================================
// Event capture
// ============================================================================

#[tokio::test]
async fn test_host_events_are_captured() {
    LocalSet::new()
        .run_until(async {
            let (_doc, host, overlay) = install(OverlayConfig::default());
            host.script_error(
                ScriptErrorEvent::new("x is not defined")
                    .with_filename("https://cdn.example/app.js")
                    .with_position(10, 2),
            );
            host.unhandled_rejection(json!({"message": "timeout"}));
            settle().await;

            let records = overlay.handle().recent(20);
            assert_eq!(records.len(), 2);
            assert_eq!(records[0].source, ErrorSource::ScriptError);
            assert_eq!(records[0].file_hint, "https://cdn.example/app.js");
            assert_eq!(records[0].module_hint, "app.js");
            assert_eq!(records[1].source, ErrorSource::UnhandledRejection);
            assert_eq!(records[1].text, "timeout");
            assert_eq!(records[1].module_hint, "Promise");
        })
        .await;
}

// ============================================================================
// Panel
// ============================================================================

#[tokio::test]
async fn test_registration_redraws_panel() {
    LocalSet::new()
        .run_until(async {
            let (doc, _host, overlay) = install(OverlayConfig::default());
            let handle = overlay.handle();
            let panel = overlay.panel_element().unwrap();
            assert!(doc.borrow().is_hidden(panel));

            handle.register_module("x", Some("Checkout")).unwrap();
            handle.register_module("x", Some("Checkout v2")).unwrap();
            assert!(handle.register_module("  ", None).is_err());
            settle().await;

            assert_eq!(handle.module_name("x"), "Checkout v2");
            assert_eq!(handle.module_name("unregistered"), "unregistered");
            assert!(handle.is_panel_visible());

            let doc = doc.borrow();
            assert!(!doc.is_hidden(panel));
            let text = doc.text_content(panel);
            assert!(text.contains("- [x] Checkout v2"));
            assert!(text.contains("No errors detected"));
        })
        .await;
}

#[tokio::test]
async fn test_toggle_twice_restores_visibility() {
    LocalSet::new()
        .run_until(async {
            let (doc, host, overlay) = install(OverlayConfig::default());
            let handle = overlay.handle();
            let panel = overlay.panel_element().unwrap();
            host.script_error(ScriptErrorEvent::new("boom"));
            settle().await;
            let shown = handle.is_panel_visible();
            assert!(shown);

            handle.toggle_panel();
            host.script_error(ScriptErrorEvent::new("boom again"));
            settle().await;
            assert!(!handle.is_panel_visible());
            assert!(doc.borrow().is_hidden(panel));

            handle.toggle_panel();
            handle.refresh_now();
            assert_eq!(handle.is_panel_visible(), shown);
            assert!(!doc.borrow().is_hidden(panel));
        })
        .await;
}

#[tokio::test]
async fn test_click_on_panel_toggles() {
    LocalSet::new()
        .run_until(async {
            let (doc, host, overlay) = install(OverlayConfig::default());
            let handle = overlay.handle();
            host.script_error(ScriptErrorEvent::new("boom"));
            settle().await;

            let panel = overlay.panel_element().unwrap();
            let header = doc.borrow().element_by_id("top").unwrap();
            assert!(!handle.click(header));
            assert!(handle.is_panel_visible());
            assert!(handle.click(panel));
            assert!(!handle.is_panel_visible());
        })
        .await;
}

#[tokio::test]
async fn test_panel_shows_last_twenty() {
    LocalSet::new()
        .run_until(async {
            let (_doc, host, overlay) = install(OverlayConfig::default());
            for i in 0..25 {
                host.script_error(ScriptErrorEvent::new(format!("failure {i}")));
            }
            settle().await;

            let view = overlay.handle().panel_view().unwrap();
            assert_eq!(view.entries.len(), 20);
            assert_eq!(view.entries[0].message, "failure 5");
            assert_eq!(view.entries[19].message, "failure 24");
            assert!(view.to_markup().contains("Detected errors (last 20)"));
        })
        .await;
}

// ============================================================================
// Configuration variants
// ============================================================================

#[tokio::test]
async fn test_suppress_mode_hides_matches() {
    LocalSet::new()
        .run_until(async {
            let config = OverlayConfig {
                remediation: Remediation::Suppress,
                ..OverlayConfig::default()
            };
            let (doc, _host, mut overlay) = install(config);
            overlay.document_ready().unwrap();
            let report = overlay.wait_for_scan().await.unwrap();
            assert_eq!(report.hidden, 2);

            let doc = doc.borrow();
            let notice = doc.element_by_id("notice").unwrap();
            let header = doc.element_by_id("top").unwrap();
            assert!(doc.is_hidden(notice));
            assert!(!doc.is_hidden(header));
        })
        .await;
}

#[tokio::test]
async fn test_custom_patterns_and_limits() {
    LocalSet::new()
        .run_until(async {
            let config = OverlayConfig {
                patterns: vec!["welcome".to_string()],
                batch_size: 2,
                ..OverlayConfig::default()
            };
            let (_doc, _host, mut overlay) = install(config);
            overlay.document_ready().unwrap();
            let report = overlay.wait_for_scan().await.unwrap();

            assert_eq!(report.batches, 4);
            assert_eq!(report.matched, 1);
            assert_eq!(overlay.handle().recent(20)[0].module_hint, "top");
        })
        .await;
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    LocalSet::new()
        .run_until(async {
            let document = Document::parse_html(PAGE).into_shared();
            let (_host, events) = HostEvents::channel();
            let config = OverlayConfig {
                patterns: vec!["(unclosed".to_string()],
                ..OverlayConfig::default()
            };
            let err = Overlay::install(document.clone(), events, config)
                .err()
                .expect("invalid pattern rejected");
            assert!(matches!(err, OverlayError::InvalidPattern { .. }));
            // Nothing was mounted
            assert!(document.borrow().element_by_id("global-error-panel").is_none());
        })
        .await;
}
