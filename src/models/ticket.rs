//! Ticket models for the Web Help Desk REST API.
//!
//! WHD returns two shapes we care about: the short entries of the
//! `Tickets/mine` listing and the full record from `Tickets/{id}`.

use std::fmt;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

/// Subject stored for a listed ticket whose `shortSubject` is null.
pub const MISSING_SUBJECT: &str = "NOSUBJECTERR";

/// Opaque ticket identifier.
///
/// WHD sends numeric IDs, but nothing here does arithmetic on them, so they
/// are kept as text. Both JSON strings and integers are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TicketId(String);

impl TicketId {
    /// Creates a ticket ID from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the ID is all ASCII digits, as WHD IDs are.
    pub fn is_numeric(&self) -> bool {
        !self.0.is_empty() && self.0.bytes().all(|b| b.is_ascii_digit())
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<u64> for TicketId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for TicketId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl<'de> Deserialize<'de> for TicketId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::{self, Visitor};

        struct StringOrIntVisitor;

        impl<'de> Visitor<'de> for StringOrIntVisitor {
            type Value = TicketId;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a string or an integer ticket id")
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(TicketId::new(value))
            }

            fn visit_string<E>(self, value: String) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(TicketId(value))
            }

            fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(TicketId(value.to_string()))
            }

            fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(TicketId(value.to_string()))
            }
        }

        deserializer.deserialize_any(StringOrIntVisitor)
    }
}

/// One entry of the open-ticket listing.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketSummary {
    /// Ticket ID.
    pub id: TicketId,

    /// Truncated subject; WHD sends `null` for tickets without one.
    #[serde(default)]
    pub short_subject: Option<String>,
}

impl TicketSummary {
    /// Creates a summary, mostly useful for tests and fixtures.
    pub fn new(id: impl Into<TicketId>, short_subject: Option<&str>) -> Self {
        Self {
            id: id.into(),
            short_subject: short_subject.map(str::to_string),
        }
    }

    /// Returns the subject, or [`MISSING_SUBJECT`] when WHD sent none.
    pub fn subject_or_placeholder(&self) -> &str {
        self.short_subject.as_deref().unwrap_or(MISSING_SUBJECT)
    }
}

/// The ordered result of one open-ticket poll.
pub type Snapshot = Vec<TicketSummary>;

/// One entry of the `Tickets/mine` listing as it arrives on the wire.
///
/// The ID may be missing or `null`; such entries are dropped by
/// [`snapshot_from_listing`] instead of failing the whole listing.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingEntry {
    /// Ticket ID, if WHD sent one.
    #[serde(default)]
    pub id: Option<TicketId>,

    /// Truncated subject.
    #[serde(default)]
    pub short_subject: Option<String>,
}

/// Builds a snapshot from a raw listing, skipping entries without an ID.
pub fn snapshot_from_listing(entries: Vec<ListingEntry>) -> Snapshot {
    entries
        .into_iter()
        .enumerate()
        .filter_map(|(position, entry)| match entry.id {
            Some(id) => Some(TicketSummary {
                id,
                short_subject: entry.short_subject,
            }),
            None => {
                tracing::warn!(
                    position,
                    subject = ?entry.short_subject,
                    "Skipping listed ticket without an id"
                );
                None
            }
        })
        .collect()
}

/// Full ticket record from `Tickets/{id}`.
///
/// Every field is optional on the wire; [`crate::dispatch::derive_ticket`]
/// decides which absences are fatal.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketDetail {
    /// Ticket ID, echoed back by WHD.
    #[serde(default)]
    pub id: Option<TicketId>,

    /// Full subject line.
    #[serde(default)]
    pub subject: Option<String>,

    /// Request detail text, with `<br/> ` line markers.
    #[serde(default)]
    pub detail: Option<String>,

    /// When the ticket was reported, ISO 8601 in UTC.
    #[serde(default)]
    pub report_date_utc: Option<String>,
}

/// A ticket ready for dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    /// Ticket ID.
    pub id: TicketId,
    /// Full subject line.
    pub subject: String,
    /// Detail text with line markers replaced by newlines.
    pub detail: String,
    /// When the ticket was reported.
    pub reported_at: Timestamp,
    /// 12-character upper-case serial number, or empty.
    pub serial_number: String,
}
