//! Incremental page sweep.
//!
//! Visits every element that existed when the sweep was prepared, a batch at
//! a time, yielding to the runtime between batches so the thread stays
//! responsive on large pages. The element list is snapshotted up front: the
//! page may change between batches, and removed elements are skipped rather
//! than treated as failures. Anything inserted after the snapshot belongs to
//! the mutation feed.

use crate::inspect::{Detection, Inspection, Inspector};
use crate::scheduler::{IdleScheduler, StopSignal};
use crate::session::SharedSession;
use pagewatch_common::{NodeId, SharedDocument};
use std::rc::Rc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Default elements per slice
pub const DEFAULT_BATCH_SIZE: usize = 50;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub visited: usize,
    pub matched: usize,
    /// Elements that vanished or could not be inspected
    pub skipped: usize,
    pub hidden: usize,
    pub batches: usize,
    /// False when stopped or cut off by the ceiling
    pub completed: bool,
    pub elapsed: Duration,
}

pub struct DomScanner {
    document: SharedDocument,
    session: SharedSession,
    inspector: Rc<Inspector>,
    scheduler: IdleScheduler,
    batch_size: usize,
    ceiling: Option<Duration>,
    stop: StopSignal,
    pending: Vec<NodeId>,
}

impl DomScanner {
    /// Snapshot the elements to visit. Call this before connecting anything
    /// that could mutate the page, so the snapshot and the feed do not overlap.
    pub fn prepare(
        document: SharedDocument,
        session: SharedSession,
        inspector: Rc<Inspector>,
        batch_size: usize,
    ) -> Self {
        let pending = {
            let doc = document.borrow();
            doc.descendant_elements(doc.body())
                .into_iter()
                .filter(|&node| !inspector.is_excluded(&doc, node))
                .collect()
        };
        Self {
            document,
            session,
            inspector,
            scheduler: IdleScheduler::default(),
            batch_size: batch_size.max(1),
            ceiling: None,
            stop: StopSignal::new(),
            pending,
        }
    }

    pub fn with_scheduler(mut self, scheduler: IdleScheduler) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Give up on the sweep after `ceiling` of wall-clock time
    pub fn with_ceiling(mut self, ceiling: Option<Duration>) -> Self {
        self.ceiling = ceiling;
        self
    }

    pub fn with_stop(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    /// Elements still waiting to be visited
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Inspect one batch synchronously and report its matches
    pub fn scan_batch(&self, batch: &[NodeId], report: &mut ScanReport) {
        let detections: Vec<Detection> = {
            let doc = self.document.borrow();
            batch
                .iter()
                .filter_map(|&node| {
                    report.visited += 1;
                    match self.inspector.inspect(&doc, node) {
                        Inspection::Matched(detection) => Some(detection),
                        Inspection::Clean => None,
                        Inspection::Skipped => {
                            report.skipped += 1;
                            None
                        }
                    }
                })
                .collect()
        };
        report.batches += 1;

        if detections.is_empty() {
            return;
        }
        for detection in &detections {
            if self.session.report(detection.to_record()).is_appended() {
                report.matched += 1;
            }
        }
        report.hidden += self
            .inspector
            .remediate(&mut self.document.borrow_mut(), &detections);
    }

    /// Sweep everything in the snapshot, yielding between batches
    pub async fn scan_all(mut self) -> ScanReport {
        let started = Instant::now();
        let elements = std::mem::take(&mut self.pending);
        let mut report = ScanReport::default();
        info!(
            target: "pagewatch::scanner",
            elements = elements.len(),
            batch_size = self.batch_size,
            "Starting page sweep"
        );

        for batch in elements.chunks(self.batch_size) {
            if self.stop.is_stopped() {
                info!(target: "pagewatch::scanner", visited = report.visited, "Page sweep cancelled");
                report.elapsed = started.elapsed();
                return report;
            }
            if let Some(ceiling) = self.ceiling {
                if started.elapsed() >= ceiling {
                    info!(
                        target: "pagewatch::scanner",
                        visited = report.visited,
                        ceiling_ms = ceiling.as_millis() as u64,
                        "Page sweep hit its time ceiling"
                    );
                    report.elapsed = started.elapsed();
                    return report;
                }
            }

            self.scan_batch(batch, &mut report);
            debug!(target: "pagewatch::scanner", batch = report.batches, "Batch done");
            self.scheduler.next_slice().await;
        }

        report.completed = true;
        report.elapsed = started.elapsed();
        info!(
            target: "pagewatch::scanner",
            visited = report.visited,
            matched = report.matched,
            skipped = report.skipped,
            batches = report.batches,
            "Page sweep finished"
        );
        report
    }
}
