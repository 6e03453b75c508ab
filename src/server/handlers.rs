//! Admin route handlers.
//!
//! Print routes answer `202 Accepted` as soon as the request is valid; the
//! WHD fetch and the printing happen on a background task.

use std::process::Stdio;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Serialize;

use super::inputs::{PriceLabelQuery, TicketNumberQuery};
use crate::dispatch::{self, DispatchPlan, PrintRequest};
use crate::error::AutoprintError;
use crate::state::{AppState, StatusView};

/// Error body for rejected requests.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// What was wrong with the request.
    pub error: String,
}

/// Body of a `202 Accepted` answer.
#[derive(Debug, Serialize)]
pub struct AcceptedResponse {
    /// Always `accepted`.
    pub status: &'static str,
    /// Ticket being printed, for ticket routes.
    #[serde(rename = "ticketNumber", skip_serializing_if = "Option::is_none")]
    pub ticket_number: Option<String>,
    /// Labels queued, when known up front.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<usize>,
    /// Whether a receipt was queued, when known up front.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt: Option<bool>,
}

impl AcceptedResponse {
    fn for_ticket(ticket_number: String) -> Self {
        Self {
            status: "accepted",
            ticket_number: Some(ticket_number),
            labels: None,
            receipt: None,
        }
    }

    fn for_plan(plan: &DispatchPlan) -> Self {
        Self {
            status: "accepted",
            ticket_number: None,
            labels: Some(plan.labels.len()),
            receipt: Some(plan.receipt.is_some()),
        }
    }

    fn empty() -> Self {
        Self {
            status: "accepted",
            ticket_number: None,
            labels: None,
            receipt: None,
        }
    }
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn error_response(status: StatusCode, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
}

fn bad_request(e: AutoprintError) -> ApiError {
    error_response(StatusCode::BAD_REQUEST, e.to_string())
}

/// Liveness probe.
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Poll and print status.
pub async fn status(State(state): State<Arc<AppState>>) -> Json<StatusView> {
    Json(state.status().await)
}

async fn accept_ticket(
    state: Arc<AppState>,
    query: TicketNumberQuery,
    request: PrintRequest,
) -> Result<impl IntoResponse, ApiError> {
    let id = query.sanitize().ticket_id().map_err(bad_request)?;
    tracing::info!(ticket_id = %id, ?request, "Manual print requested");

    let response = AcceptedResponse::for_ticket(id.to_string());
    tokio::spawn(async move {
        if let Err(e) = dispatch::dispatch_ticket(&state, &id, request).await {
            tracing::error!(ticket_id = %id, error = %state.sanitize(&e), "Manual print failed");
        }
    });

    Ok((StatusCode::ACCEPTED, Json(response)))
}

/// Fetches a ticket and prints its label.
pub async fn print_ticket_label(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TicketNumberQuery>,
) -> Result<impl IntoResponse, ApiError> {
    accept_ticket(state, query, PrintRequest::LABEL_ONLY).await
}

/// Fetches a ticket and prints its receipt.
pub async fn print_ticket_receipt(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TicketNumberQuery>,
) -> Result<impl IntoResponse, ApiError> {
    accept_ticket(state, query, PrintRequest::RECEIPT_ONLY).await
}

/// Fetches a ticket and prints label and receipt.
pub async fn print_ticket(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TicketNumberQuery>,
) -> Result<impl IntoResponse, ApiError> {
    accept_ticket(state, query, PrintRequest::BOTH).await
}

/// Reprints the label of the last retrieved ticket.
pub async fn print_last_label(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let plan = dispatch::reprint_last(&state, PrintRequest::LABEL_ONLY).await;
    (StatusCode::ACCEPTED, Json(AcceptedResponse::for_plan(&plan)))
}

/// Reprints the receipt of the last retrieved ticket.
pub async fn print_last_receipt(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let plan = dispatch::reprint_last(&state, PrintRequest::RECEIPT_ONLY).await;
    (StatusCode::ACCEPTED, Json(AcceptedResponse::for_plan(&plan)))
}

/// Prints price stickers.
pub async fn print_price_label(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PriceLabelQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let (price, quantity) = query.sanitize().validate().map_err(bad_request)?;
    tracing::info!(price = %price, quantity, "Price label requested");

    let plan = dispatch::print_price_label(&state, price, quantity);
    Ok((StatusCode::ACCEPTED, Json(AcceptedResponse::for_plan(&plan))))
}

/// Launches the configured update-and-restart command, detached.
pub async fn update_restart(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let Some((program, args)) = state.restart_command().split_first() else {
        return Err(error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "no restart command configured",
        ));
    };

    let child = tokio::process::Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| {
            tracing::error!(program = %program, error = %e, "Could not launch restart command");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("could not launch restart command: {}", e),
            )
        })?;

    tracing::warn!(program = %program, pid = ?child.id(), "Restart command launched");
    Ok((StatusCode::ACCEPTED, Json(AcceptedResponse::empty())))
}
