//! # Autoprint
//!
//! Autoprint watches a SolarWinds Web Help Desk instance for newly opened
//! tickets and prints a label and a receipt for each one as it arrives.
//!
//! ## Features
//!
//! - **Change detection**: polls the open-ticket list and diffs it against
//!   a baseline, so each ticket prints once
//! - **Operating hours**: fast polling inside the configured window; the
//!   baseline is dropped overnight so the next morning starts fresh
//! - **Label and receipt output**: DYMO Connect labels from `.label`
//!   templates and Star receipts over raw TCP
//! - **DOA handling**: dead-on-arrival tickets get their own label and a
//!   warning sticker
//! - **Admin interface**: status, manual prints, reprints and price stickers
//!   over HTTP
//! - **Security**: the WHD password is never logged or exposed in error
//!   messages
//!
//! ## Architecture
//!
//! - [`config`] - Configuration loading from environment variables
//! - [`error`] - Error types with message sanitization
//! - [`models`] - WHD ticket records
//! - [`whd_client`] - HTTP client for the WHD REST API
//! - [`store`] - Set of tickets already seen
//! - [`detector`] - Snapshot diffing
//! - [`dispatch`] - What to print for a ticket
//! - [`printing`] - Label and receipt printers
//! - [`schedule`] - The polling loop and operating window
//! - [`state`] - Shared runtime state
//! - [`server`] - Admin HTTP routes
//!
//! ## Usage
//!
//! ```bash
//! export WHD_BASE_URL=http://helpdesk.example.com:8081
//! export WHD_USERNAME=autoprint
//! export WHD_PASSWORD=...
//! export RECEIPT_PRINTER_ADDR=10.0.0.40:9100
//!
//! ./autoprint
//! ```
//!
//! Optional:
//! - `RUST_LOG`: Log level (e.g., `autoprint=debug`)
//!
//! See [`config::Config`] for the remaining settings.
//!
//! ## Example
//!
//! Dispatching a single ticket by hand:
//!
//! ```ignore
//! use std::sync::Arc;
//! use autoprint::{config::Config, dispatch, printing, state::AppState, whd_client::WhdClient};
//!
//! async fn example() -> Result<(), autoprint::error::AutoprintError> {
//!     let config = Config::from_env()?;
//!     let state = Arc::new(AppState::new(
//!         Arc::new(WhdClient::new(&config)?),
//!         Arc::new(printing::DymoLabelPrinter::new(&config)?),
//!         Arc::new(printing::TcpReceiptPrinter::new(config.receipt_printer_addr.clone())),
//!         config.timezone.clone(),
//!     ));
//!
//!     let plan = dispatch::prepare_ticket(&state, &"4021".into(), dispatch::PrintRequest::BOTH).await?;
//!     dispatch::run_plan(&state, &plan).await;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod config;
pub mod detector;
pub mod dispatch;
pub mod error;
pub mod models;
pub mod printing;
pub mod schedule;
pub mod server;
pub mod state;
pub mod store;
pub mod whd_client;

#[cfg(test)]
mod testing;
