//! Mutation feed - catches error text inserted after the initial sweep
//!
//! Subscribes to structural changes under the body and inspects every newly
//! inserted element together with its element descendants. Inserted subtrees
//! are assumed small compared with the whole page, so they are inspected in
//! one go rather than sliced.

use crate::inspect::{Detection, Inspection, Inspector};
use crate::scheduler::StopSignal;
use crate::session::SharedSession;
use pagewatch_common::dom::ObserverId;
use pagewatch_common::error::Result;
use pagewatch_common::{MutationRecord, NodeId, SharedDocument};
use std::rc::Rc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedStats {
    pub records: u64,
    pub inspected: u64,
    pub matched: u64,
    pub hidden: u64,
}

pub struct MutationFeed {
    document: SharedDocument,
    session: SharedSession,
    inspector: Rc<Inspector>,
    observer: Option<ObserverId>,
    rx: mpsc::UnboundedReceiver<MutationRecord>,
    stop: StopSignal,
    timeout: Option<Duration>,
    stats: FeedStats,
}

impl MutationFeed {
    /// Start observing structural changes under `root`
    pub fn connect(
        document: SharedDocument,
        session: SharedSession,
        inspector: Rc<Inspector>,
        root: NodeId,
    ) -> Result<Self> {
        let (observer, rx) = document.borrow_mut().observe(root)?;
        debug!(target: "pagewatch::feed", observer, root = %root, "Mutation feed connected");
        Ok(Self {
            document,
            session,
            inspector,
            observer: Some(observer),
            rx,
            stop: StopSignal::new(),
            timeout: None,
            stats: FeedStats::default(),
        })
    }

    pub fn with_stop(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    /// Disconnect on its own after `timeout`
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn observer(&self) -> Option<ObserverId> {
        self.observer
    }

    pub fn stats(&self) -> FeedStats {
        self.stats
    }

    pub fn is_connected(&self) -> bool {
        self.observer.is_some()
    }

    /// Inspect the elements a record inserted. Returns the number of matches.
    pub fn process(&mut self, record: &MutationRecord) -> usize {
        if self.observer.is_none() {
            return 0;
        }
        self.stats.records += 1;

        let detections: Vec<Detection> = {
            let doc = self.document.borrow();
            let mut detections = Vec::new();
            for &added in &record.added {
                // Text insertions and the overlay's own redraws are ignored
                if !doc.is_element(added) || self.inspector.is_excluded(&doc, added) {
                    continue;
                }
                let subtree = std::iter::once(added).chain(doc.descendant_elements(added));
                for node in subtree {
                    self.stats.inspected += 1;
                    if let Inspection::Matched(detection) = self.inspector.inspect(&doc, node) {
                        detections.push(detection);
                    }
                }
            }
            detections
        };

        let mut matched = 0;
        for detection in &detections {
            if self.session.report(detection.to_record()).is_appended() {
                matched += 1;
            }
        }
        self.stats.matched += matched as u64;
        if !detections.is_empty() {
            self.stats.hidden += self
                .inspector
                .remediate(&mut self.document.borrow_mut(), &detections)
                as u64;
        }
        matched
    }

    /// Process every record already queued, without waiting
    pub fn process_pending(&mut self) -> usize {
        let mut matched = 0;
        while self.observer.is_some() && !self.stop.is_stopped() {
            match self.rx.try_recv() {
                Ok(record) => matched += self.process(&record),
                Err(_) => break,
            }
        }
        matched
    }

    /// Stop observing. Records still queued are dropped.
    pub fn disconnect(&mut self) {
        if let Some(observer) = self.observer.take() {
            if let Ok(mut doc) = self.document.try_borrow_mut() {
                doc.disconnect_observer(observer);
            }
            self.rx.close();
            while self.rx.try_recv().is_ok() {}
            info!(
                target: "pagewatch::feed",
                records = self.stats.records,
                matched = self.stats.matched,
                "Mutation feed disconnected"
            );
        }
    }

    /// Deliver records until stopped, timed out, or the document goes away
    pub async fn run(mut self) -> FeedStats {
        let stop = self.stop.clone();
        let deadline = self.timeout.map(|t| tokio::time::Instant::now() + t);

        loop {
            let next = tokio::select! {
                biased;
                _ = stop.wait() => break,
                _ = sleep_until(deadline) => {
                    info!(target: "pagewatch::feed", "Mutation feed timed out");
                    break;
                }
                record = self.rx.recv() => record,
            };
            let Some(record) = next else {
                break;
            };
            if stop.is_stopped() {
                break;
            }
            self.process(&record);
        }

        self.disconnect();
        self.stats
    }
}

impl Drop for MutationFeed {
    fn drop(&mut self) {
        self.disconnect();
    }
}

async fn sleep_until(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
