//! Per-document session state.
//!
//! Owns the error log and module registry for one loaded document and the
//! refresh signal that every write raises. Components receive the session by
//! `Rc`; nothing here is global.

use pagewatch_common::error::Result;
use pagewatch_common::{AppendOutcome, ErrorLog, ErrorRecord, LogLimits, ModuleRegistry};
use std::cell::{Ref, RefCell};
use std::rc::Rc;
use tokio::sync::Notify;
use tracing::info;

pub type SharedSession = Rc<Session>;

#[derive(Debug, Default)]
pub struct Session {
    log: RefCell<ErrorLog>,
    modules: RefCell<ModuleRegistry>,
    /// Coalesced redraw request; a burst of writes leaves a single permit
    refresh: Notify,
}

impl Session {
    pub fn new(limits: LogLimits) -> SharedSession {
        Rc::new(Self {
            log: RefCell::new(ErrorLog::new(limits)),
            modules: RefCell::new(ModuleRegistry::new()),
            refresh: Notify::new(),
        })
    }

    /// Append a record and request a redraw
    pub fn report(&self, record: ErrorRecord) -> AppendOutcome {
        let outcome = self.log.borrow_mut().append(record);
        if outcome.is_appended() {
            self.refresh.notify_one();
        }
        outcome
    }

    /// Upsert a module and request a redraw
    pub fn register_module(&self, id: &str, display_name: Option<&str>) -> Result<()> {
        self.modules.borrow_mut().register(id, display_name)?;
        info!("Module registered: [{}] {}", id, display_name.unwrap_or(""));
        self.refresh.notify_one();
        Ok(())
    }

    pub fn log(&self) -> Ref<'_, ErrorLog> {
        self.log.borrow()
    }

    pub fn modules(&self) -> Ref<'_, ModuleRegistry> {
        self.modules.borrow()
    }

    /// Owned copies of the last `n` records
    pub fn recent(&self, n: usize) -> Vec<ErrorRecord> {
        self.log.borrow().recent(n).into_iter().cloned().collect()
    }

    pub fn request_refresh(&self) {
        self.refresh.notify_one();
    }

    /// Resolves once at least one write happened since the last wakeup
    pub async fn refresh_requested(&self) {
        self.refresh.notified().await;
    }
}
