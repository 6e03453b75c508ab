//! Query parameters for the admin routes.
//!
//! # Input Sanitization
//!
//! All query structs implement `sanitize()` which trims whitespace from
//! string fields and drops empty ones. Call it before validating.

use serde::Deserialize;

use crate::error::AutoprintError;
use crate::models::TicketId;

/// Most copies of a price label printed in one request.
pub const MAX_PRICE_LABEL_QUANTITY: u32 = 100;

const MAX_PRICE_LEN: usize = 16;

/// Helper function to trim an optional string.
fn trim_option(s: &Option<String>) -> Option<String> {
    s.as_ref().map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// `?ticketNumber=` on the ticket print routes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TicketNumberQuery {
    /// WHD ticket number.
    #[serde(default, rename = "ticketNumber")]
    pub ticket_number: Option<String>,
}

impl TicketNumberQuery {
    /// Returns a copy with whitespace trimmed.
    pub fn sanitize(self) -> Self {
        Self {
            ticket_number: trim_option(&self.ticket_number),
        }
    }

    /// Validates the ticket number.
    ///
    /// # Errors
    ///
    /// Returns `AutoprintError::Validation` if it is missing or not numeric.
    pub fn ticket_id(&self) -> Result<TicketId, AutoprintError> {
        let raw = self
            .ticket_number
            .as_deref()
            .ok_or_else(|| AutoprintError::validation("ticketNumber is required"))?;

        let id = TicketId::new(raw);
        if !id.is_numeric() {
            return Err(AutoprintError::validation(format!(
                "ticketNumber must be numeric, got {:?}",
                raw
            )));
        }
        Ok(id)
    }
}

/// `?price=&quantity=` on the price label route.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PriceLabelQuery {
    /// Price text, e.g. `19.99`.
    #[serde(default)]
    pub price: Option<String>,

    /// Number of copies (default: 1). Kept as text so a bad value gets
    /// the same JSON error as the other checks.
    #[serde(default)]
    pub quantity: Option<String>,
}

impl PriceLabelQuery {
    /// Returns a copy with whitespace trimmed.
    pub fn sanitize(self) -> Self {
        Self {
            price: trim_option(&self.price),
            quantity: trim_option(&self.quantity),
        }
    }

    /// Validates the price and quantity.
    ///
    /// # Errors
    ///
    /// Returns `AutoprintError::Validation` for a missing or overlong price,
    /// or a quantity outside `1..=MAX_PRICE_LABEL_QUANTITY`.
    pub fn validate(&self) -> Result<(String, u32), AutoprintError> {
        let price = self
            .price
            .clone()
            .ok_or_else(|| AutoprintError::validation("price is required"))?;
        if price.chars().count() > MAX_PRICE_LEN {
            return Err(AutoprintError::validation(format!(
                "price must be at most {} characters",
                MAX_PRICE_LEN
            )));
        }

        let quantity = match self.quantity.as_deref() {
            None => 1,
            Some(raw) => raw
                .parse::<u32>()
                .ok()
                .filter(|q| (1..=MAX_PRICE_LABEL_QUANTITY).contains(q))
                .ok_or_else(|| {
                    AutoprintError::validation(format!(
                        "quantity must be between 1 and {}",
                        MAX_PRICE_LABEL_QUANTITY
                    ))
                })?,
        };

        Ok((price, quantity))
    }
}
