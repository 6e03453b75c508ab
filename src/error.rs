//! Error types for Autoprint.
//!
//! This module defines `AutoprintError`, the unified error type used
//! throughout the crate for consistent error handling and propagation.
//!
//! # Security
//!
//! Web Help Desk authenticates with a username and password passed in the
//! query string, so reqwest errors routinely carry the full URL. Use
//! `sanitize_message()` before logging anything that came from the
//! transport layer.

use std::time::Duration;
use thiserror::Error;

/// Unified error type for all Autoprint operations.
#[derive(Error, Debug)]
pub enum AutoprintError {
    /// Configuration error - missing or invalid environment variables.
    #[error("configuration error: {0}")]
    Config(String),

    /// HTTP request failed during transmission.
    #[error("HTTP request failed: {0}")]
    Http(#[source] reqwest::Error),

    /// HTTP client initialization failed.
    #[error("HTTP client error: {0}")]
    HttpClient(#[source] reqwest::Error),

    /// HTTP response returned a non-success status code.
    #[error("HTTP {status}: {body}")]
    HttpStatus {
        /// The HTTP status code returned.
        status: reqwest::StatusCode,
        /// The response body, truncated.
        body: String,
    },

    /// Request timed out.
    #[error("request timed out after {duration:?} - the server may be slow or unreachable")]
    Timeout {
        /// How long we waited before timing out.
        duration: Duration,
        /// The operation that timed out.
        operation: String,
    },

    /// Rate limited by the server (HTTP 429).
    #[error("rate limited by server - please wait before retrying")]
    RateLimited {
        /// Suggested retry delay, if provided by server.
        retry_after: Option<Duration>,
    },

    /// Server temporarily unavailable (HTTP 502/503/504).
    #[error("service temporarily unavailable ({status})")]
    ServiceUnavailable {
        /// The specific status code.
        status: reqwest::StatusCode,
    },

    /// Authentication failed - likely bad WHD credentials.
    #[error("authentication failed - check WHD_USERNAME and WHD_PASSWORD")]
    Authentication,

    /// Requested ticket was not found.
    #[error("ticket not found: {id}")]
    NotFound {
        /// The ID of the ticket that was not found.
        id: String,
    },

    /// JSON serialization or deserialization failed.
    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The backend returned a ticket we cannot work with.
    #[error("malformed ticket {id}: {reason}")]
    MalformedTicket {
        /// The ticket the data belongs to.
        id: String,
        /// What was wrong with it.
        reason: String,
    },

    /// A label template could not be loaded.
    #[error("label template {path}: {source}")]
    Template {
        /// Path of the template file.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A print device was unreachable or rejected the job.
    #[error("{device} print failed: {message}")]
    Print {
        /// Which device failed ("label" or "receipt").
        device: &'static str,
        /// Details about the failure.
        message: String,
    },

    /// Input validation failed.
    #[error("validation error: {0}")]
    Validation(String),
}

impl AutoprintError {
    /// Creates a configuration error for a missing environment variable.
    pub fn missing_env(var_name: &str) -> Self {
        AutoprintError::Config(format!(
            "missing required environment variable: {}",
            var_name
        ))
    }

    /// Creates a configuration error for an invalid value.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        AutoprintError::Config(message.into())
    }

    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        AutoprintError::Validation(message.into())
    }

    /// Creates a not found error for a ticket ID.
    pub fn not_found(id: impl Into<String>) -> Self {
        AutoprintError::NotFound { id: id.into() }
    }

    /// Creates a timeout error.
    pub fn timeout(duration: Duration, operation: impl Into<String>) -> Self {
        AutoprintError::Timeout {
            duration,
            operation: operation.into(),
        }
    }

    /// Creates a malformed ticket error.
    pub fn malformed(id: impl Into<String>, reason: impl Into<String>) -> Self {
        AutoprintError::MalformedTicket {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Creates a print device error.
    pub fn print(device: &'static str, message: impl Into<String>) -> Self {
        AutoprintError::Print {
            device,
            message: message.into(),
        }
    }

    /// Returns true if this error is transient and the operation should be retried.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            AutoprintError::RateLimited { .. } => true,
            AutoprintError::ServiceUnavailable { .. } => true,
            AutoprintError::Http(e) => e.is_connect(),
            AutoprintError::HttpStatus { status, .. } => {
                status.as_u16() == 429 || status.is_server_error()
            }
            _ => false,
        }
    }

    /// Returns true if this is a rate limit error, indicating we should back off.
    #[must_use]
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, AutoprintError::RateLimited { .. })
            || matches!(self, AutoprintError::HttpStatus { status, .. } if status.as_u16() == 429)
    }

    /// Returns the suggested delay before retry, if any.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            AutoprintError::RateLimited { retry_after } => *retry_after,
            AutoprintError::ServiceUnavailable { .. } => Some(Duration::from_millis(500)),
            _ => None,
        }
    }

    /// Returns true for errors that mean the backend could not be polled this
    /// cycle, as opposed to a problem with a single ticket or device.
    #[must_use]
    pub fn is_transient_fetch(&self) -> bool {
        matches!(
            self,
            AutoprintError::Http(_)
                | AutoprintError::HttpStatus { .. }
                | AutoprintError::Timeout { .. }
                | AutoprintError::RateLimited { .. }
                | AutoprintError::ServiceUnavailable { .. }
                | AutoprintError::Serialization(_)
        )
    }

    /// Replaces every occurrence of `secret` in `message` with `[REDACTED]`.
    #[must_use]
    pub fn sanitize_message(message: &str, secret: &str) -> String {
        if secret.is_empty() {
            return message.to_string();
        }
        let message = message.replace(secret, "[REDACTED]");
        // reqwest prints the URL percent-encoded
        let encoded = urlencoding::encode(secret);
        if encoded != secret {
            message.replace(encoded.as_ref(), "[REDACTED]")
        } else {
            message
        }
    }

    /// Creates a sanitized version of this error's display message.
    #[must_use]
    pub fn sanitized_display(&self, secret: &str) -> String {
        Self::sanitize_message(&self.to_string(), secret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_missing_env_error() {
        let err = AutoprintError::missing_env("WHD_PASSWORD");
        assert!(err.to_string().contains("WHD_PASSWORD"));
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_not_found_error() {
        let err = AutoprintError::not_found("12345");
        assert_eq!(err.to_string(), "ticket not found: 12345");
    }

    #[test]
    fn test_timeout_error() {
        let err = AutoprintError::timeout(Duration::from_secs(15), "fetch_open_tickets");
        let msg = err.to_string();
        assert!(msg.contains("timed out"));
        assert!(msg.contains("15s"));
    }

    #[test]
    fn test_malformed_ticket_error() {
        let err = AutoprintError::malformed("42", "missing reportDateUtc");
        assert_eq!(err.to_string(), "malformed ticket 42: missing reportDateUtc");
    }

    #[test]
    fn test_print_error() {
        let err = AutoprintError::print("receipt", "connection refused");
        assert_eq!(err.to_string(), "receipt print failed: connection refused");
    }

    #[test]
    fn test_is_retryable_rate_limited() {
        let err = AutoprintError::RateLimited { retry_after: None };
        assert!(err.is_retryable());
        assert!(err.is_rate_limit());
    }

    #[test]
    fn test_is_retryable_service_unavailable() {
        let err = AutoprintError::ServiceUnavailable {
            status: reqwest::StatusCode::BAD_GATEWAY,
        };
        assert!(err.is_retryable());
        assert!(!err.is_rate_limit());
        assert_eq!(err.retry_after(), Some(Duration::from_millis(500)));
    }

    #[test]
    fn test_timeout_is_not_retried_but_is_transient() {
        let err = AutoprintError::timeout(Duration::from_secs(15), "poll");
        assert!(!err.is_retryable());
        assert!(err.is_transient_fetch());
    }

    #[test]
    fn test_malformed_is_not_transient() {
        let err = AutoprintError::malformed("1", "bad");
        assert!(!err.is_retryable());
        assert!(!err.is_transient_fetch());
    }

    #[test]
    fn test_sanitize_message_removes_secret() {
        let secret = "hunter2";
        let message = format!("GET http://whd/ra/Tickets?password={} failed", secret);
        let sanitized = AutoprintError::sanitize_message(&message, secret);
        assert!(!sanitized.contains(secret));
        assert!(sanitized.contains("[REDACTED]"));
    }

    #[test]
    fn test_sanitize_message_removes_encoded_secret() {
        let secret = "p@ss word";
        let message = "GET http://whd/ra/Tickets?password=p%40ss%20word failed";
        let sanitized = AutoprintError::sanitize_message(message, secret);
        assert_eq!(sanitized, "GET http://whd/ra/Tickets?password=[REDACTED] failed");
    }

    #[test]
    fn test_sanitize_message_empty_secret() {
        let message = "Some error message";
        assert_eq!(AutoprintError::sanitize_message(message, ""), message);
    }
}
