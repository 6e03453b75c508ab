//! Process-wide state shared by the scheduler and the admin interface.
//!
//! Everything that changes at runtime lives in [`CoreState`] behind a single
//! async mutex. The poll cycle fetches without it and takes it only for the
//! diff; ticket dispatch only takes it to publish the [`LastKnownTicket`].

use std::sync::Arc;

use jiff::tz::TimeZone;
use jiff::Timestamp;
use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard};

use crate::models::{Ticket, TicketId};
use crate::printing::{LabelPrinter, ReceiptPrinter, RetryPolicy};
use crate::store::TicketSnapshotStore;
use crate::whd_client::TicketSource;

/// Shown for activity that has not happened yet.
pub const NEVER: &str = "n/a";

/// The most recently retrieved ticket, kept for "reprint last".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastKnownTicket {
    /// Ticket ID.
    pub id: TicketId,
    /// Full subject.
    pub subject: String,
    /// Serial number candidate, possibly empty.
    pub serial_number: String,
    /// Normalized detail text.
    pub detail: String,
    /// Report time, unknown until a ticket has been retrieved.
    pub reported_at: Option<Timestamp>,
}

impl Default for LastKnownTicket {
    fn default() -> Self {
        Self {
            id: TicketId::new("999999"),
            subject: "AutoPrint".to_string(),
            serial_number: "XXXXXXXXXXXX".to_string(),
            detail: "No tickets have been submitted :(".to_string(),
            reported_at: None,
        }
    }
}

impl From<&Ticket> for LastKnownTicket {
    fn from(ticket: &Ticket) -> Self {
        Self {
            id: ticket.id.clone(),
            subject: ticket.subject.clone(),
            serial_number: ticket.serial_number.clone(),
            detail: ticket.detail.clone(),
            reported_at: Some(ticket.reported_at),
        }
    }
}

/// When things last went right.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivityStatus {
    /// Last successful poll of the open-ticket list.
    pub last_server_check: Option<Timestamp>,
    /// Last successful label print.
    pub last_label_print: Option<Timestamp>,
}

/// Mutable state guarded by [`AppState::core`].
#[derive(Debug, Default)]
pub struct CoreState {
    /// Tickets seen in the current operating window.
    pub store: TicketSnapshotStore,
    /// Ticket served by the reprint actions.
    pub last_known: LastKnownTicket,
    /// Last poll and print times.
    pub activity: ActivityStatus,
}

/// Status as shown on the admin interface.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StatusView {
    /// Last successful poll, RFC 3339, or `n/a`.
    pub last_server_check: String,
    /// Last successful label print, RFC 3339, or `n/a`.
    pub last_label_print: String,
    /// Subject of the last retrieved ticket.
    pub last_subject: String,
    /// ID of the last retrieved ticket.
    pub last_ticket_id: String,
    /// Number of tickets in the current baseline.
    pub store_size: usize,
}

/// Shared application state.
pub struct AppState {
    core: Mutex<CoreState>,
    source: Arc<dyn TicketSource>,
    labels: Arc<dyn LabelPrinter>,
    receipts: Arc<dyn ReceiptPrinter>,
    receipt_retry: RetryPolicy,
    timezone: TimeZone,
    secret: String,
    restart_command: Vec<String>,
}

impl AppState {
    /// Creates the state with an empty store.
    pub fn new(
        source: Arc<dyn TicketSource>,
        labels: Arc<dyn LabelPrinter>,
        receipts: Arc<dyn ReceiptPrinter>,
        timezone: TimeZone,
    ) -> Self {
        Self {
            core: Mutex::new(CoreState::default()),
            source,
            labels,
            receipts,
            receipt_retry: RetryPolicy::default(),
            timezone,
            secret: String::new(),
            restart_command: Vec::new(),
        }
    }

    /// Sets the retry policy for receipts.
    pub fn with_receipt_retry(mut self, policy: RetryPolicy) -> Self {
        self.receipt_retry = policy;
        self
    }

    /// Sets the secret scrubbed from logged error messages.
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = secret.into();
        self
    }

    /// Sets the program and arguments launched by the restart trigger.
    pub fn with_restart_command(mut self, command: Vec<String>) -> Self {
        self.restart_command = command;
        self
    }

    /// Locks the mutable state.
    pub async fn core(&self) -> MutexGuard<'_, CoreState> {
        self.core.lock().await
    }

    /// The ticketing backend.
    pub fn source(&self) -> &dyn TicketSource {
        self.source.as_ref()
    }

    /// The label printer.
    pub fn labels(&self) -> &dyn LabelPrinter {
        self.labels.as_ref()
    }

    /// The receipt printer.
    pub fn receipts(&self) -> &dyn ReceiptPrinter {
        self.receipts.as_ref()
    }

    /// Retry policy for receipts.
    pub fn receipt_retry(&self) -> RetryPolicy {
        self.receipt_retry
    }

    /// Reference time zone for dates on labels and receipts.
    pub fn timezone(&self) -> &TimeZone {
        &self.timezone
    }

    /// The restart command, empty if none is configured.
    pub fn restart_command(&self) -> &[String] {
        &self.restart_command
    }

    /// Formats an error for logging with the secret removed.
    pub fn sanitize(&self, error: &crate::error::AutoprintError) -> String {
        error.sanitized_display(&self.secret)
    }

    /// Records a successful label print.
    pub async fn record_label_print(&self) {
        self.core().await.activity.last_label_print = Some(Timestamp::now());
    }

    /// Builds the status view.
    pub async fn status(&self) -> StatusView {
        let core = self.core().await;
        let render = |at: Option<Timestamp>| at.map_or_else(|| NEVER.to_string(), |t| t.to_string());
        StatusView {
            last_server_check: render(core.activity.last_server_check),
            last_label_print: render(core.activity.last_label_print),
            last_subject: core.last_known.subject.clone(),
            last_ticket_id: core.last_known.id.to_string(),
            store_size: core.store.len(),
        }
    }
}
