//! Scan controller: one scan operation, two execution modes, one event
//! stream.
//!
//! Asynchronous scans construct the scanner inside a dedicated worker
//! thread and hand everything back over the event channel plus
//! [`ScanController::wait`], so the scanner's state is never observed
//! concurrently.

use crate::card::Card;
use crate::db::SignatureDb;
use crate::error::ScanError;
use crate::scanner::BlockScanner;
use crate::types::{ScanEvent, ScanOptions, SyntheticEntry};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::info;

/// Drives scans over one card with a shared set of signature databases.
///
/// Only one scan may be in flight per controller; a second start is
/// rejected with [`ScanError::Busy`], never queued.
pub struct ScanController {
    card: Option<Arc<dyn Card>>,
    databases: Vec<Arc<SignatureDb>>,

    events: UnboundedSender<ScanEvent>,
    receiver: Option<UnboundedReceiver<ScanEvent>>,

    busy: Arc<AtomicBool>,
    cancel: Arc<AtomicBool>,

    worker: Option<JoinHandle<Vec<SyntheticEntry>>>,
    entries: Vec<SyntheticEntry>,
}

impl ScanController {
    pub fn new() -> Self {
        let (events, receiver) = unbounded_channel();
        Self {
            card: None,
            databases: Vec::new(),
            events,
            receiver: Some(receiver),
            busy: Arc::new(AtomicBool::new(false)),
            cancel: Arc::new(AtomicBool::new(false)),
            worker: None,
            entries: Vec::new(),
        }
    }

    pub fn set_card(&mut self, card: Arc<dyn Card>) {
        self.card = Some(card);
    }

    pub fn add_database(&mut self, db: Arc<SignatureDb>) {
        self.databases.push(db);
    }

    /// Take the event receiver. All scans on this controller report through
    /// it, in generation order.
    pub fn events(&mut self) -> Option<UnboundedReceiver<ScanEvent>> {
        self.receiver.take()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Request cancellation of the in-flight scan. Honored at the next
    /// per-block poll.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Entries reconstructed by the last completed scan.
    pub fn take_entries(&mut self) -> Vec<SyntheticEntry> {
        std::mem::take(&mut self.entries)
    }

    /// Run a scan inline on the caller's thread.
    ///
    /// Emits the same event sequence as the asynchronous mode and returns
    /// the number of recovered entries.
    pub fn scan_sync(&mut self, options: ScanOptions) -> Result<usize, ScanError> {
        let (card, databases) = self.begin()?;

        let mut scanner = BlockScanner::with_cancel(options, Arc::clone(&self.cancel));
        let result = scanner.scan(card.as_ref(), &databases, Some(&self.events));

        self.busy.store(false, Ordering::SeqCst);
        match result {
            Ok(entries) => {
                let found = entries.len();
                self.entries = entries;
                Ok(found)
            }
            Err(e) => Err(e),
        }
    }

    /// Run a scan on a dedicated worker thread.
    ///
    /// The scanner is constructed inside the worker; progress and the final
    /// outcome arrive on the event channel, and [`Self::wait`] hands the
    /// reconstructed entries back afterwards.
    pub fn scan_async(&mut self, options: ScanOptions) -> Result<(), ScanError> {
        let (card, databases) = self.begin()?;

        let events = self.events.clone();
        let busy = Arc::clone(&self.busy);
        let cancel = Arc::clone(&self.cancel);

        let handle = std::thread::spawn(move || {
            let mut scanner = BlockScanner::with_cancel(options, cancel);
            let entries = scanner
                .scan(card.as_ref(), &databases, Some(&events))
                .unwrap_or_default();

            busy.store(false, Ordering::SeqCst);
            entries
        });

        self.worker = Some(handle);
        Ok(())
    }

    /// Block until the asynchronous scan finishes and return the entry
    /// count. Returns `None` when no worker is running.
    pub fn wait(&mut self) -> Option<usize> {
        let handle = self.worker.take()?;
        let entries = handle.join().unwrap_or_default();
        let found = entries.len();
        self.entries = entries;
        Some(found)
    }

    /// Common precondition checks; claims the busy flag on success.
    fn begin(&mut self) -> Result<(Arc<dyn Card>, Vec<Arc<SignatureDb>>), ScanError> {
        if self.busy.swap(true, Ordering::SeqCst) {
            return Err(ScanError::Busy);
        }
        self.cancel.store(false, Ordering::SeqCst);

        // A finished worker may not have been reaped yet.
        if let Some(handle) = self.worker.take() {
            let entries = handle.join().unwrap_or_default();
            self.entries = entries;
        }

        let Some(card) = self.card.clone() else {
            self.busy.store(false, Ordering::SeqCst);
            self.report_fatal(ScanError::NoCard);
            return Err(ScanError::NoCard);
        };

        if self.databases.is_empty() {
            self.busy.store(false, Ordering::SeqCst);
            self.report_fatal(ScanError::NoDatabases);
            return Err(ScanError::NoDatabases);
        }

        info!(databases = self.databases.len(), "starting scan");
        Ok((card, self.databases.clone()))
    }

    /// Fatal conditions go through the same channel as success so callers
    /// need only one failure path.
    fn report_fatal(&self, error: ScanError) {
        let _ = self.events.send(ScanEvent::Error {
            message: error.to_string(),
        });
    }
}

impl Default for ScanController {
    fn default() -> Self {
        Self::new()
    }
}
