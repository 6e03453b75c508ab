//! New-ticket detection.
//!
//! Compares a freshly polled [`Snapshot`] against the
//! [`TicketSnapshotStore`] and records what it sees. The first poll after a
//! reset only takes a baseline; later polls report the tickets the store has
//! not seen, in the order the backend listed them.

use crate::models::{Snapshot, TicketId};
use crate::store::TicketSnapshotStore;

/// ID recorded when the baseline poll finds no open tickets.
pub const PLACEHOLDER_TICKET_ID: &str = "123456";

/// Subject recorded alongside [`PLACEHOLDER_TICKET_ID`].
pub const PLACEHOLDER_TICKET_SUBJECT: &str = "TEMPTICKET";

/// A ticket that appeared since the previous poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTicket {
    /// Ticket ID.
    pub id: TicketId,
    /// Short subject, with a null subject replaced by [`crate::models::MISSING_SUBJECT`].
    pub subject: String,
}

/// Result of comparing one snapshot with the store.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Detection {
    /// True if this poll established the baseline instead of diffing.
    pub baseline: bool,
    /// Tickets to dispatch, in backend order. Always empty for a baseline.
    pub new_tickets: Vec<NewTicket>,
}

/// Diffs `snapshot` against `store`, updating the store in place.
pub fn detect(store: &mut TicketSnapshotStore, snapshot: &Snapshot) -> Detection {
    if store.is_empty() {
        return take_baseline(store, snapshot);
    }

    let mut new_tickets = Vec::new();
    for entry in snapshot {
        if store.contains(&entry.id) {
            continue;
        }
        let subject = entry.subject_or_placeholder().to_string();
        tracing::info!(ticket_id = %entry.id, subject = %subject, "New ticket found");
        store.put(entry.id.clone(), subject.clone());
        new_tickets.push(NewTicket {
            id: entry.id.clone(),
            subject,
        });
    }

    Detection {
        baseline: false,
        new_tickets,
    }
}

fn take_baseline(store: &mut TicketSnapshotStore, snapshot: &Snapshot) -> Detection {
    tracing::info!(count = snapshot.len(), "Recording baseline of open tickets");

    for entry in snapshot {
        tracing::debug!(ticket_id = %entry.id, subject = ?entry.short_subject, "Baseline ticket");
        store.put(entry.id.clone(), entry.subject_or_placeholder());
    }

    if snapshot.is_empty() {
        tracing::info!(
            ticket_id = PLACEHOLDER_TICKET_ID,
            "No open tickets, recording placeholder so the baseline sticks"
        );
        store.put(TicketId::new(PLACEHOLDER_TICKET_ID), PLACEHOLDER_TICKET_SUBJECT);
    }

    Detection {
        baseline: true,
        new_tickets: Vec::new(),
    }
}
