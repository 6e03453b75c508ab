//! Autoprint - label and receipt printer for Web Help Desk tickets
//!
//! This binary polls WHD for new tickets, prints them, and serves the admin
//! interface on `0.0.0.0:$AUTOPRINT_WEB_PORT`.
//!
//! # Configuration
//!
//! Set the following environment variables (or use a `.env` file):
//!
//! - `WHD_BASE_URL`: Base URL of the Web Help Desk host
//! - `WHD_USERNAME` / `WHD_PASSWORD`: Account whose tickets are polled
//! - `RECEIPT_PRINTER_ADDR`: `host:port` of the receipt printer
//!
//! # Usage
//!
//! ```bash
//! # Direct execution
//! ./autoprint
//!
//! # With more logging
//! RUST_LOG=autoprint=debug ./autoprint
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, EnvFilter};

use autoprint::{config, printing, schedule, server, state, whd_client};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (ignore errors if not found)
    dotenvy::dotenv().ok();

    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("autoprint=info")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    tracing::info!("Starting Autoprint v{}", env!("CARGO_PKG_VERSION"));

    let config = config::Config::from_env().context("Failed to load configuration")?;

    tracing::debug!(?config, "Configuration loaded");

    let whd = whd_client::WhdClient::new(&config).context("Failed to create WHD client")?;

    // Test connection to WHD before starting
    tracing::info!("Testing connection to Web Help Desk...");
    if whd.test_connection().await.is_err() {
        // The poller retries every cycle, so keep going
        tracing::warn!(
            "Autoprint will start but may not be able to reach Web Help Desk. \
             Check configuration and network connectivity."
        );
    }

    let labels =
        printing::DymoLabelPrinter::new(&config).context("Failed to create label printer")?;
    let receipts = printing::TcpReceiptPrinter::new(config.receipt_printer_addr.clone());

    if let Err(e) = tokio::fs::create_dir_all(&config.preview_dir).await {
        tracing::warn!(
            path = %config.preview_dir.display(),
            error = %e,
            "Could not create preview directory"
        );
    }

    let state = Arc::new(
        state::AppState::new(
            Arc::new(whd),
            Arc::new(labels),
            Arc::new(receipts),
            config.timezone.clone(),
        )
        .with_secret(config.password())
        .with_restart_command(config.restart_command.clone()),
    );

    let poller = schedule::PollingScheduler::new(
        state.clone(),
        schedule::OperatingWindow::from_config(&config),
    )
    .spawn();

    let app = server::create_router(state, &config.preview_dir);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.web_port))
        .await
        .with_context(|| format!("Failed to bind port {}", config.web_port))?;

    tracing::info!(port = config.web_port, "Admin interface listening");

    axum::serve(listener, app)
        .await
        .context("Admin server error")?;

    poller.abort();
    tracing::info!("Autoprint shutting down");

    Ok(())
}
