//! In-memory collaborators for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use jiff::tz::TimeZone;
use jiff::Timestamp;

use crate::error::AutoprintError;
use crate::models::{Snapshot, TicketDetail, TicketId, TicketSummary};
use crate::printing::{LabelJob, LabelPrinter, ReceiptJob, ReceiptPrinter, RetryPolicy};
use crate::schedule::Clock;
use crate::state::AppState;
use crate::whd_client::TicketSource;

/// Builds a detail record the way WHD returns it.
pub fn detail(subject: &str, text: &str, reported: &str) -> TicketDetail {
    TicketDetail {
        id: None,
        subject: Some(subject.to_string()),
        detail: Some(text.to_string()),
        report_date_utc: Some(reported.to_string()),
    }
}

/// Builds a snapshot from `(id, subject)` pairs.
pub fn snapshot(entries: &[(&str, Option<&str>)]) -> Snapshot {
    entries
        .iter()
        .map(|(id, subject)| TicketSummary::new(*id, *subject))
        .collect()
}

/// Scriptable ticket source. `None` as the listing simulates an outage.
#[derive(Default)]
pub struct MockSource {
    listing: Mutex<Option<Snapshot>>,
    listing_delay: Mutex<Duration>,
    details: Mutex<HashMap<TicketId, TicketDetail>>,
    pub list_calls: AtomicUsize,
    pub detail_calls: AtomicUsize,
}

impl MockSource {
    pub fn set_listing(&self, listing: Option<Snapshot>) {
        *self.listing.lock().unwrap() = listing;
    }

    /// Makes each listing fetch take `delay` before answering.
    pub fn set_listing_delay(&self, delay: Duration) {
        *self.listing_delay.lock().unwrap() = delay;
    }

    pub fn add_detail(&self, id: &str, detail: TicketDetail) {
        self.details.lock().unwrap().insert(TicketId::new(id), detail);
    }
}

#[async_trait]
impl TicketSource for MockSource {
    async fn fetch_open_tickets(&self) -> Result<Snapshot, AutoprintError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.listing_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.listing
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| AutoprintError::timeout(Duration::from_secs(15), "fetch_open_tickets"))
    }

    async fn fetch_ticket_detail(&self, id: &TicketId) -> Result<TicketDetail, AutoprintError> {
        self.detail_calls.fetch_add(1, Ordering::SeqCst);
        self.details
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| AutoprintError::not_found(id.as_str()))
    }
}

/// Label printer that records jobs instead of printing them.
#[derive(Default)]
pub struct RecordingLabels {
    pub jobs: Mutex<Vec<LabelJob>>,
    pub fail: AtomicBool,
}

impl RecordingLabels {
    pub fn printed(&self) -> Vec<LabelJob> {
        self.jobs.lock().unwrap().clone()
    }
}

#[async_trait]
impl LabelPrinter for RecordingLabels {
    async fn print_label(&self, job: &LabelJob) -> Result<(), AutoprintError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AutoprintError::print("label", "offline"));
        }
        self.jobs.lock().unwrap().push(job.clone());
        Ok(())
    }
}

/// Receipt printer that records jobs and can fail a set number of times.
#[derive(Default)]
pub struct RecordingReceipts {
    pub jobs: Mutex<Vec<ReceiptJob>>,
    pub failures_left: AtomicU32,
    pub attempts: AtomicU32,
}

impl RecordingReceipts {
    pub fn printed(&self) -> Vec<ReceiptJob> {
        self.jobs.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReceiptPrinter for RecordingReceipts {
    async fn print_receipt(&self, job: &ReceiptJob) -> Result<(), AutoprintError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(AutoprintError::print("receipt", "paper out"));
        }
        self.jobs.lock().unwrap().push(job.clone());
        Ok(())
    }
}

/// Clock pinned to a settable instant.
pub struct FixedClock {
    now: Mutex<Timestamp>,
}

impl FixedClock {
    pub fn at(rfc3339: &str) -> Self {
        Self {
            now: Mutex::new(rfc3339.parse().unwrap()),
        }
    }

    pub fn set(&self, rfc3339: &str) {
        *self.now.lock().unwrap() = rfc3339.parse().unwrap();
    }
}

impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        *self.now.lock().unwrap()
    }
}

/// Application state wired to the recording collaborators.
pub struct TestHarness {
    pub state: Arc<AppState>,
    pub source: Arc<MockSource>,
    pub labels: Arc<RecordingLabels>,
    pub receipts: Arc<RecordingReceipts>,
}

impl TestHarness {
    pub fn new() -> Self {
        let source = Arc::new(MockSource::default());
        let labels = Arc::new(RecordingLabels::default());
        let receipts = Arc::new(RecordingReceipts::default());

        let state = AppState::new(
            source.clone(),
            labels.clone(),
            receipts.clone(),
            TimeZone::UTC,
        )
        .with_receipt_retry(RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
        })
        .with_secret("hunter2");

        Self {
            state: Arc::new(state),
            source,
            labels,
            receipts,
        }
    }
}
