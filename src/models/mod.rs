//! Data models for the Web Help Desk REST API.
//!
//! This module contains the ticket listing and detail payloads as well as
//! the derived [`Ticket`] handed to the print dispatch.

mod ticket;

pub use ticket::*;
