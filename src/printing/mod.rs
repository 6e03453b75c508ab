//! Print collaborators.
//!
//! The dispatch logic only knows two narrow interfaces: [`LabelPrinter`]
//! for adhesive labels and [`ReceiptPrinter`] for thermal receipts. Each
//! implementation owns its device and serializes jobs to it.

mod dymo;
mod receipt;
mod retry;

pub use dymo::{DymoLabelPrinter, PREVIEW_FILE};
pub use receipt::TcpReceiptPrinter;
pub use retry::{PrintOutcome, RetryPolicy};

use async_trait::async_trait;

use crate::error::AutoprintError;
use crate::models::TicketId;

/// A label to print.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelJob {
    /// Standard ticket label with the serial number field filled in.
    WithSerial {
        /// Ticket ID.
        ticket_id: TicketId,
        /// 12-character serial number.
        serial_number: String,
    },

    /// Standard ticket label for subjects without a serial number.
    WithoutSerial {
        /// Ticket ID.
        ticket_id: TicketId,
    },

    /// Dead-on-arrival label carrying the full subject and the report date.
    Doa {
        /// Ticket ID.
        ticket_id: TicketId,
        /// Full ticket subject.
        subject: String,
        /// Report date, `dd/mm/yyyy`.
        report_date: String,
    },

    /// Fixed warning sticker for tickets that mention DOA.
    DoaWarning,

    /// Price sticker.
    Price {
        /// Price text substituted for `00.00`.
        price: String,
        /// Number of copies.
        quantity: u32,
    },
}

impl LabelJob {
    /// Template file name for this kind of label.
    pub fn template_name(&self) -> &'static str {
        match self {
            LabelJob::WithSerial { .. } => "label_template_with_serialnumber.label",
            LabelJob::WithoutSerial { .. } => "label_template_without_serialnumber.label",
            LabelJob::Doa { .. } => "label_template_doa.label",
            LabelJob::DoaWarning => "label_doa_warning.label",
            LabelJob::Price { .. } => "label_template_price.label",
        }
    }

    /// Placeholder substitutions applied to the template, in order.
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        match self {
            LabelJob::WithSerial {
                ticket_id,
                serial_number,
            } => vec![
                ("TICKETNO", ticket_id.to_string()),
                ("SERIALNO", serial_number.clone()),
                ("OPENDATE", String::new()),
            ],
            LabelJob::WithoutSerial { ticket_id } => vec![
                ("TICKETNO", ticket_id.to_string()),
                ("SERIALNO", String::new()),
                ("OPENDATE", String::new()),
            ],
            LabelJob::Doa {
                ticket_id,
                subject,
                report_date,
            } => vec![
                ("TICKETNO", ticket_id.to_string()),
                ("SERIALNO", subject.clone()),
                ("OPENDATE", report_date.clone()),
            ],
            LabelJob::DoaWarning => Vec::new(),
            LabelJob::Price { price, .. } => vec![("00.00", price.clone())],
        }
    }

    /// Number of copies to print.
    pub fn copies(&self) -> u32 {
        match self {
            LabelJob::Price { quantity, .. } => *quantity,
            _ => 1,
        }
    }
}

/// A receipt to print.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptJob {
    /// Ticket ID, printed large at the top.
    pub ticket_id: TicketId,
    /// Full subject.
    pub subject: String,
    /// Detail text with real newlines.
    pub detail: String,
    /// Report date as printed.
    pub date: String,
}

/// Adhesive label printer.
#[async_trait]
pub trait LabelPrinter: Send + Sync {
    /// Renders the job from its template and prints it.
    async fn print_label(&self, job: &LabelJob) -> Result<(), AutoprintError>;
}

/// Thermal receipt printer.
///
/// A failed call may be repeated with the same job.
#[async_trait]
pub trait ReceiptPrinter: Send + Sync {
    /// Prints one receipt.
    async fn print_receipt(&self, job: &ReceiptJob) -> Result<(), AutoprintError>;
}
