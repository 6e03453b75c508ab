//! Admin web interface.
//!
//! A small JSON API over the shared [`AppState`]: status, manual prints,
//! reprints, price stickers and the update-and-restart trigger. Anything
//! not matched by a route is served from the preview directory, which is
//! where the last printed label is saved.

mod handlers;
mod inputs;

pub use handlers::{AcceptedResponse, ErrorResponse};
pub use inputs::{PriceLabelQuery, TicketNumberQuery, MAX_PRICE_LABEL_QUANTITY};

use std::path::Path;
use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Builds the admin router.
pub fn create_router(state: Arc<AppState>, preview_dir: &Path) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/", get(handlers::status))
        .route("/status", get(handlers::status))
        // Ticket prints (fetch from WHD)
        .route("/print/ticketlabel", get(handlers::print_ticket_label))
        .route("/print/ticketreceipt", get(handlers::print_ticket_receipt))
        .route("/print/ticket", get(handlers::print_ticket))
        // Reprints from the last known ticket
        .route("/print/lastlabel", get(handlers::print_last_label))
        .route("/print/lastreceipt", get(handlers::print_last_receipt))
        .route("/print/pricelabel", get(handlers::print_price_label))
        .route("/updaterestart", get(handlers::update_restart))
        .with_state(state)
        .fallback_service(ServeDir::new(preview_dir))
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TicketId;
    use crate::printing::LabelJob;
    use crate::testing::{detail, TestHarness};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tower::ServiceExt;

    async fn get(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    fn app(harness: &TestHarness) -> Router {
        create_router(harness.state.clone(), Path::new("/nonexistent-preview-dir"))
    }

    async fn wait_for_labels(harness: &TestHarness, count: usize) -> Vec<LabelJob> {
        for _ in 0..200 {
            let printed = harness.labels.printed();
            if printed.len() >= count {
                return printed;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("expected {} labels", count);
    }

    #[tokio::test]
    async fn test_health() {
        let harness = TestHarness::new();
        let (status, body) = get(app(&harness), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn test_status_view() {
        let harness = TestHarness::new();
        let (status, body) = get(app(&harness), "/status").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            serde_json::json!({
                "last_server_check": "n/a",
                "last_label_print": "n/a",
                "last_subject": "AutoPrint",
                "last_ticket_id": "999999",
                "store_size": 0,
            })
        );

        let (root_status, root_body) = get(app(&harness), "/").await;
        assert_eq!(root_status, StatusCode::OK);
        assert_eq!(root_body, body);
    }

    #[tokio::test]
    async fn test_print_ticket_rejects_bad_number() {
        let harness = TestHarness::new();

        let (status, body) = get(app(&harness), "/print/ticket?ticketNumber=abc").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("numeric"));

        let (status, _) = get(app(&harness), "/print/ticketlabel").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_print_ticket_label_accepts_and_prints() {
        let harness = TestHarness::new();
        harness
            .source
            .add_detail("4021", detail("ABCDEF123456 screen", "x", "2024-03-01T09:00:00Z"));

        let (status, body) = get(app(&harness), "/print/ticketlabel?ticketNumber=4021").await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["ticketNumber"], "4021");

        let labels = wait_for_labels(&harness, 1).await;
        assert_eq!(
            labels,
            vec![LabelJob::WithSerial {
                ticket_id: TicketId::new("4021"),
                serial_number: "ABCDEF123456".to_string(),
            }]
        );
        assert!(harness.receipts.printed().is_empty());
    }

    #[tokio::test]
    async fn test_reprint_last_label_uses_defaults() {
        let harness = TestHarness::new();
        let (status, body) = get(app(&harness), "/print/lastlabel").await;

        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["labels"], 1);
        assert_eq!(body["receipt"], false);
        wait_for_labels(&harness, 1).await;
    }

    #[tokio::test]
    async fn test_reprint_last_receipt() {
        let harness = TestHarness::new();
        let (status, body) = get(app(&harness), "/print/lastreceipt").await;

        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["labels"], 0);
        assert_eq!(body["receipt"], true);
    }

    #[tokio::test]
    async fn test_price_label() {
        let harness = TestHarness::new();

        let (status, _) = get(app(&harness), "/print/pricelabel?price=4.50&quantity=2").await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(
            wait_for_labels(&harness, 1).await,
            vec![LabelJob::Price {
                price: "4.50".to_string(),
                quantity: 2,
            }]
        );

        let (status, _) = get(app(&harness), "/print/pricelabel?price=4.50&quantity=0").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_update_restart() {
        let harness = TestHarness::new();
        let (status, _) = get(app(&harness), "/updaterestart").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let state = AppState::new(
            harness.source.clone(),
            harness.labels.clone(),
            harness.receipts.clone(),
            jiff::tz::TimeZone::UTC,
        )
        .with_restart_command(vec!["true".to_string()]);
        let app = create_router(Arc::new(state), Path::new("."));
        let (status, body) = get(app, "/updaterestart").await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["status"], "accepted");
    }

    #[tokio::test]
    async fn test_serves_label_preview() {
        let harness = TestHarness::new();
        let previews = tempfile::tempdir().unwrap();
        std::fs::write(previews.path().join(crate::printing::PREVIEW_FILE), b"\x89PNG").unwrap();

        let app = create_router(harness.state.clone(), previews.path());
        let request = Request::builder()
            .uri("/last_label.png")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"\x89PNG");
    }
}
