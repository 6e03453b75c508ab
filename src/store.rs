//! The set of tickets already seen in the current operating window.
//!
//! An empty store means no baseline has been taken yet. Entries are only
//! ever added; the whole store is dropped with [`TicketSnapshotStore::clear`]
//! when the operating window closes.

use std::collections::HashMap;

use crate::models::TicketId;

/// Last known open tickets, keyed by ID.
#[derive(Debug, Default)]
pub struct TicketSnapshotStore {
    tickets: HashMap<TicketId, String>,
}

impl TicketSnapshotStore {
    /// Creates an empty (uninitialized) store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if no baseline has been recorded.
    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty()
    }

    /// Number of tickets recorded.
    pub fn len(&self) -> usize {
        self.tickets.len()
    }

    /// Returns the recorded subject of a ticket.
    pub fn get(&self, id: &TicketId) -> Option<&str> {
        self.tickets.get(id).map(String::as_str)
    }

    /// Returns true if the ticket has been seen.
    pub fn contains(&self, id: &TicketId) -> bool {
        self.tickets.contains_key(id)
    }

    /// Records a ticket. Returns true if it was not already present.
    ///
    /// An existing entry keeps its original subject.
    pub fn put(&mut self, id: TicketId, subject: impl Into<String>) -> bool {
        match self.tickets.entry(id) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(subject.into());
                true
            }
        }
    }

    /// Forgets every ticket, forcing a new baseline on the next poll.
    pub fn clear(&mut self) {
        self.tickets.clear();
    }
}
