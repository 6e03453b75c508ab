//! HTTP client for the Web Help Desk REST API.
//!
//! This module provides [`WhdClient`], which implements [`TicketSource`]
//! against `Helpdesk.woa/ra`. WHD authenticates with `username` and
//! `password` query parameters on every request.
//!
//! # Timeouts and Retry Logic
//!
//! Polling must never stall the scheduler, so every request is bounded by a
//! connect timeout and an overall response timeout. A timeout fails the call
//! immediately. Rate limiting and 502/503/504 get one more attempt; anything
//! else is returned to the caller as-is.
//!
//! # Security
//!
//! The password is part of every URL. It is never logged, and all error
//! messages are sanitized before logging.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use crate::config::Config;
use crate::error::AutoprintError;
use crate::models::{snapshot_from_listing, ListingEntry, Snapshot, TicketDetail, TicketId};

/// Connect timeout for WHD requests.
const CONNECT_TIMEOUT_SECS: u64 = 5;

/// Overall request timeout for WHD requests.
const REQUEST_TIMEOUT_SECS: u64 = 15;

/// Maximum number of attempts for transient failures.
const MAX_RETRY_ATTEMPTS: u32 = 2;

/// Initial delay for rate-limit backoff (milliseconds).
const INITIAL_BACKOFF_MS: u64 = 250;

/// Maximum length for HTTP error response bodies kept in errors.
const MAX_ERROR_BODY_LEN: usize = 500;

/// Path of the WHD REST resources below the host.
const REST_PATH: &str = "/helpdesk/WebObjects/Helpdesk.woa/ra";

/// Where tickets come from.
///
/// Failures are always reported as errors; an unreachable backend is never
/// treated as "no open tickets".
#[async_trait]
pub trait TicketSource: Send + Sync {
    /// Lists the open tickets owned by the configured account, in backend order.
    async fn fetch_open_tickets(&self) -> Result<Snapshot, AutoprintError>;

    /// Fetches the full record of a single ticket.
    async fn fetch_ticket_detail(&self, id: &TicketId) -> Result<TicketDetail, AutoprintError>;
}

/// HTTP client for Web Help Desk.
#[derive(Clone)]
pub struct WhdClient {
    /// The underlying HTTP client (cloning is cheap).
    http: Client,

    /// Host URL without trailing slash (e.g., `http://helpdesk.example.com`).
    base_url: String,

    /// WHD account name.
    username: String,

    /// WHD account password.
    /// SECURITY: Never log this value!
    password: String,

    /// Status type name for the open-ticket qualifier.
    status_filter: String,
}

impl WhdClient {
    /// Creates a new WHD client from configuration.
    ///
    /// # Errors
    ///
    /// Returns `AutoprintError::HttpClient` if the HTTP client fails to initialize.
    pub fn new(config: &Config) -> Result<Self, AutoprintError> {
        Self::with_credentials(
            &config.base_url,
            &config.username,
            config.password(),
            &config.status_filter,
        )
    }

    /// Creates a client from explicit connection details.
    pub fn with_credentials(
        base_url: &str,
        username: &str,
        password: &str,
        status_filter: &str,
    ) -> Result<Self, AutoprintError> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(AutoprintError::HttpClient)?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            username: username.to_string(),
            password: password.to_string(),
            status_filter: status_filter.to_string(),
        })
    }

    /// Validates that an ID is numeric before it is put into a URL path.
    fn validate_id(id: &TicketId) -> Result<(), AutoprintError> {
        if !id.is_numeric() {
            return Err(AutoprintError::validation(format!(
                "ticket id must be a numeric string, got: {:?}",
                id.as_str().chars().take(50).collect::<String>()
            )));
        }
        Ok(())
    }

    /// Builds the WHD qualifier selecting tickets by status type name.
    fn status_qualifier(status: &str) -> String {
        format!(
            "(statustype.statusTypeName = '{}')",
            status.replace('\'', "\\'")
        )
    }

    /// Builds a full request URL with credentials and extra query pairs.
    ///
    /// Values are percent-encoded with `%20` for spaces, which WHD's
    /// qualifier parser expects.
    fn url(&self, resource: &str, extra: &[(&str, &str)]) -> String {
        let mut url = format!("{}{}/{}?", self.base_url, REST_PATH, resource);
        let pairs = extra
            .iter()
            .copied()
            .chain([
                ("username", self.username.as_str()),
                ("password", self.password.as_str()),
            ])
            .map(|(key, value)| format!("{}={}", key, urlencoding::encode(value)))
            .collect::<Vec<_>>()
            .join("&");
        url.push_str(&pairs);
        url
    }

    /// Tests connectivity to the WHD server by listing open tickets once.
    ///
    /// # Errors
    ///
    /// Returns the underlying fetch error if the server cannot be polled.
    pub async fn test_connection(&self) -> Result<(), AutoprintError> {
        tracing::debug!("Testing connection to WHD server");

        match self.fetch_open_tickets().await {
            Ok(tickets) => {
                tracing::info!(open = tickets.len(), "Connection test successful");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e.sanitized_display(&self.password), "Connection test failed");
                Err(e)
            }
        }
    }

    /// Executes an operation with retry logic for transient failures.
    async fn with_retry<T, F, Fut>(&self, operation: &str, f: F) -> Result<T, AutoprintError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, AutoprintError>>,
    {
        let mut delay = Duration::from_millis(INITIAL_BACKOFF_MS);
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            match f().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempts < MAX_RETRY_ATTEMPTS => {
                    let actual_delay = e.retry_after().unwrap_or(delay);
                    if e.is_rate_limit() {
                        tracing::warn!(
                            operation = operation,
                            delay_ms = actual_delay.as_millis() as u64,
                            "Rate limited, backing off"
                        );
                    }

                    tracing::debug!(
                        operation = operation,
                        attempt = attempts,
                        max_attempts = MAX_RETRY_ATTEMPTS,
                        delay_ms = actual_delay.as_millis() as u64,
                        error = %e.sanitized_display(&self.password),
                        "Retrying after transient error"
                    );

                    tokio::time::sleep(actual_delay).await;
                    delay *= 2;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Makes a single GET request and decodes the JSON body.
    async fn get_inner<T>(&self, operation: &str, url: &str) -> Result<T, AutoprintError>
    where
        T: serde::de::DeserializeOwned,
    {
        tracing::debug!(operation = operation, "Making WHD API request");

        let response = self.http.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                return AutoprintError::timeout(
                    Duration::from_secs(REQUEST_TIMEOUT_SECS),
                    operation,
                );
            }
            AutoprintError::Http(e.without_url())
        })?;
        let status = response.status();

        if !status.is_success() {
            return Err(self.handle_http_error(status, response).await);
        }

        let body = response
            .text()
            .await
            .map_err(|e| AutoprintError::Http(e.without_url()))?;

        tracing::trace!(body = %body, "WHD API response");

        serde_json::from_str(&body).map_err(AutoprintError::Serialization)
    }

    /// GET with automatic retry for transient failures.
    async fn get<T>(&self, operation: &str, url: &str) -> Result<T, AutoprintError>
    where
        T: serde::de::DeserializeOwned,
    {
        self.with_retry(operation, || self.get_inner::<T>(operation, url))
            .await
    }

    /// Converts a non-success response into an `AutoprintError`.
    async fn handle_http_error(
        &self,
        status: StatusCode,
        response: reqwest::Response,
    ) -> AutoprintError {
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs);

        let body = response.text().await.unwrap_or_default();
        let body = AutoprintError::sanitize_message(&body, &self.password);
        let body = if body.len() > MAX_ERROR_BODY_LEN {
            let cut = (0..=MAX_ERROR_BODY_LEN)
                .rev()
                .find(|i| body.is_char_boundary(*i))
                .unwrap_or(0);
            format!("{}...[truncated]", &body[..cut])
        } else {
            body
        };

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AutoprintError::Authentication,
            StatusCode::TOO_MANY_REQUESTS => {
                tracing::warn!("Rate limited by WHD server");
                AutoprintError::RateLimited { retry_after }
            }
            StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT => {
                tracing::warn!(status = %status, "WHD server temporarily unavailable");
                AutoprintError::ServiceUnavailable { status }
            }
            _ => AutoprintError::HttpStatus { status, body },
        }
    }
}

#[async_trait]
impl TicketSource for WhdClient {
    async fn fetch_open_tickets(&self) -> Result<Snapshot, AutoprintError> {
        let qualifier = Self::status_qualifier(&self.status_filter);
        let url = self.url("Tickets/mine", &[("qualifier", &qualifier)]);
        let entries: Vec<ListingEntry> = self.get("fetch_open_tickets", &url).await?;
        Ok(snapshot_from_listing(entries))
    }

    async fn fetch_ticket_detail(&self, id: &TicketId) -> Result<TicketDetail, AutoprintError> {
        Self::validate_id(id)?;
        let url = self.url(&format!("Tickets/{}", id), &[]);
        match self.get::<TicketDetail>("fetch_ticket_detail", &url).await {
            Err(AutoprintError::HttpStatus { status, .. }) if status == StatusCode::NOT_FOUND => {
                Err(AutoprintError::not_found(id.as_str()))
            }
            other => other,
        }
    }
}
