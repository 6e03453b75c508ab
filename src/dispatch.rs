//! Turning a ticket into print jobs.
//!
//! Dispatch happens in three steps:
//!
//! 1. [`derive_ticket`] validates the WHD detail record and extracts the
//!    serial number candidate.
//! 2. [`plan`] decides which labels and whether a receipt to print. It is a
//!    pure function of the ticket and the request.
//! 3. [`run_plan`] drives the print collaborators, usually from a spawned
//!    task via [`spawn_plan`].
//!
//! # DOA tickets
//!
//! A subject starting with `DOA` gets the DOA label, which carries the full
//! subject and the report date, and no receipt. A subject that mentions
//! `DOA` anywhere else additionally gets the fixed warning sticker.

use std::sync::Arc;

use jiff::civil::DateTime;
use jiff::tz::TimeZone;
use jiff::Timestamp;

use crate::error::AutoprintError;
use crate::models::{Ticket, TicketDetail, TicketId};
use crate::printing::{LabelJob, PrintOutcome, ReceiptJob};
use crate::state::{AppState, LastKnownTicket};

/// Line marker WHD embeds in ticket detail text.
pub const LINE_BREAK_MARKER: &str = "<br/> ";

/// Subject marker for dead-on-arrival tickets.
pub const DOA_MARKER: &str = "DOA";

/// Length of a serial number at the start of a subject.
pub const SERIAL_LEN: usize = 12;

/// Printed in place of a report date that was never retrieved.
pub const UNKNOWN_DATE: &str = "XX/XX/XX XX:XX";

const LABEL_DATE_FORMAT: &str = "%d/%m/%Y";
const RECEIPT_DATE_FORMAT: &str = "%a %b %d %Y %H:%M";

/// Which outputs a caller wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrintRequest {
    /// Print the ticket label.
    pub label: bool,
    /// Print the receipt.
    pub receipt: bool,
}

impl PrintRequest {
    /// Label and receipt, as for a newly detected ticket.
    pub const BOTH: Self = Self {
        label: true,
        receipt: true,
    };

    /// Label only.
    pub const LABEL_ONLY: Self = Self {
        label: true,
        receipt: false,
    };

    /// Receipt only.
    pub const RECEIPT_ONLY: Self = Self {
        label: false,
        receipt: true,
    };
}

/// Replaces WHD line markers with newlines.
pub fn normalize_detail(detail: &str) -> String {
    detail.replace(LINE_BREAK_MARKER, "\n")
}

/// Extracts the serial number from the start of a subject.
///
/// The first [`SERIAL_LEN`] characters qualify only if there are exactly
/// that many and all are ASCII letters or digits. Returns the upper-cased
/// serial, or an empty string.
pub fn serial_candidate(subject: &str) -> String {
    let head: String = subject.chars().take(SERIAL_LEN).collect();
    if head.chars().count() == SERIAL_LEN && head.chars().all(|c| c.is_ascii_alphanumeric()) {
        head.to_ascii_uppercase()
    } else {
        String::new()
    }
}

/// Parses `reportDateUtc`. WHD normally sends an offset, but a bare
/// date-time is read as UTC.
fn parse_report_date(raw: &str) -> Option<Timestamp> {
    let raw = raw.trim();
    if let Ok(ts) = raw.parse::<Timestamp>() {
        return Some(ts);
    }
    raw.parse::<DateTime>()
        .ok()?
        .to_zoned(TimeZone::UTC)
        .ok()
        .map(|zoned| zoned.timestamp())
}

/// Validates a detail record and derives the dispatchable ticket.
///
/// # Errors
///
/// Returns `AutoprintError::MalformedTicket` if the subject or report date
/// is missing, or the report date cannot be parsed. A missing detail text
/// is treated as empty.
pub fn derive_ticket(id: &TicketId, detail: TicketDetail) -> Result<Ticket, AutoprintError> {
    let subject = detail
        .subject
        .ok_or_else(|| AutoprintError::malformed(id.as_str(), "missing subject"))?;

    let raw_date = detail
        .report_date_utc
        .ok_or_else(|| AutoprintError::malformed(id.as_str(), "missing reportDateUtc"))?;
    let reported_at = parse_report_date(&raw_date).ok_or_else(|| {
        AutoprintError::malformed(id.as_str(), format!("unparseable reportDateUtc {:?}", raw_date))
    })?;

    Ok(Ticket {
        id: id.clone(),
        serial_number: serial_candidate(&subject),
        detail: normalize_detail(detail.detail.as_deref().unwrap_or_default()),
        subject,
        reported_at,
    })
}

/// The jobs one dispatch will print.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchPlan {
    /// Labels, printed in order.
    pub labels: Vec<LabelJob>,
    /// Receipt, if any.
    pub receipt: Option<ReceiptJob>,
}

impl DispatchPlan {
    /// Returns true if there is nothing to print.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty() && self.receipt.is_none()
    }
}

fn format_date(at: Option<Timestamp>, tz: &TimeZone, format: &str) -> String {
    at.map_or_else(
        || UNKNOWN_DATE.to_string(),
        |ts| ts.to_zoned(tz.clone()).strftime(format).to_string(),
    )
}

/// Decides what to print for `ticket`.
pub fn plan(ticket: &LastKnownTicket, request: PrintRequest, tz: &TimeZone) -> DispatchPlan {
    let is_doa = ticket.subject.starts_with(DOA_MARKER);
    let mentions_doa = !is_doa && ticket.subject.contains(DOA_MARKER);

    let mut labels = Vec::new();
    let mut receipt_wanted = request.receipt;

    if request.label {
        if is_doa {
            labels.push(LabelJob::Doa {
                ticket_id: ticket.id.clone(),
                subject: ticket.subject.clone(),
                report_date: format_date(ticket.reported_at, tz, LABEL_DATE_FORMAT),
            });
            receipt_wanted = false;
        } else if ticket.serial_number.is_empty() {
            labels.push(LabelJob::WithoutSerial {
                ticket_id: ticket.id.clone(),
            });
        } else {
            labels.push(LabelJob::WithSerial {
                ticket_id: ticket.id.clone(),
                serial_number: ticket.serial_number.clone(),
            });
        }
    }

    if mentions_doa {
        labels.push(LabelJob::DoaWarning);
    }

    let receipt = receipt_wanted.then(|| ReceiptJob {
        ticket_id: ticket.id.clone(),
        subject: ticket.subject.clone(),
        detail: ticket.detail.clone(),
        date: format_date(ticket.reported_at, tz, RECEIPT_DATE_FORMAT),
    });

    DispatchPlan { labels, receipt }
}

/// What happened when a plan was printed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanReport {
    /// Labels that printed.
    pub labels_printed: usize,
    /// Labels that failed.
    pub labels_failed: usize,
    /// Receipt result, if one was planned.
    pub receipt: Option<PrintOutcome>,
}

/// Prints every job in `plan`, labels first.
///
/// Label failures are logged and do not stop the remaining jobs. The
/// receipt goes through the state's retry policy.
pub async fn run_plan(state: &AppState, plan: &DispatchPlan) -> PlanReport {
    let mut report = PlanReport::default();

    for job in &plan.labels {
        match state.labels().print_label(job).await {
            Ok(()) => {
                state.record_label_print().await;
                report.labels_printed += 1;
            }
            Err(e) => {
                tracing::error!(
                    template = job.template_name(),
                    error = %state.sanitize(&e),
                    "Label print failed"
                );
                report.labels_failed += 1;
            }
        }
    }

    if let Some(job) = &plan.receipt {
        let outcome = state
            .receipt_retry()
            .run("receipt", || state.receipts().print_receipt(job))
            .await;
        report.receipt = Some(outcome);
    }

    report
}

/// Prints `plan` in the background.
pub fn spawn_plan(state: &Arc<AppState>, plan: DispatchPlan) {
    if plan.is_empty() {
        return;
    }
    let state = Arc::clone(state);
    tokio::spawn(async move {
        run_plan(&state, &plan).await;
    });
}

/// Fetches a ticket, publishes it as the last known ticket and plans its
/// print jobs.
///
/// # Errors
///
/// Returns the fetch error or `AutoprintError::MalformedTicket`; in both
/// cases nothing is updated and nothing will print.
pub async fn prepare_ticket(
    state: &AppState,
    id: &TicketId,
    request: PrintRequest,
) -> Result<DispatchPlan, AutoprintError> {
    tracing::info!(ticket_id = %id, "Retrieving ticket information");

    let detail = state.source().fetch_ticket_detail(id).await?;
    let ticket = derive_ticket(id, detail)?;
    tracing::info!(
        ticket_id = %ticket.id,
        serial_number = %ticket.serial_number,
        "Retrieved ticket"
    );

    let last = LastKnownTicket::from(&ticket);
    let plan = plan(&last, request, state.timezone());
    state.core().await.last_known = last;

    Ok(plan)
}

/// Fetches a ticket and prints it in the background.
///
/// # Errors
///
/// See [`prepare_ticket`].
pub async fn dispatch_ticket(
    state: &Arc<AppState>,
    id: &TicketId,
    request: PrintRequest,
) -> Result<DispatchPlan, AutoprintError> {
    let plan = prepare_ticket(state, id, request).await?;
    spawn_plan(state, plan.clone());
    Ok(plan)
}

/// Plans a reprint of the last known ticket without contacting WHD.
pub async fn plan_reprint(state: &AppState, request: PrintRequest) -> DispatchPlan {
    let last = state.core().await.last_known.clone();
    plan(&last, request, state.timezone())
}

/// Reprints the last known ticket in the background.
pub async fn reprint_last(state: &Arc<AppState>, request: PrintRequest) -> DispatchPlan {
    let plan = plan_reprint(state, request).await;
    spawn_plan(state, plan.clone());
    plan
}

/// Prints `quantity` price stickers in the background.
pub fn print_price_label(state: &Arc<AppState>, price: String, quantity: u32) -> DispatchPlan {
    let plan = DispatchPlan {
        labels: vec![LabelJob::Price { price, quantity }],
        receipt: None,
    };
    spawn_plan(state, plan.clone());
    plan
}
