//! Configuration management for Autoprint.
//!
//! Configuration is loaded once at startup from environment variables
//! (optionally seeded from a `.env` file) and is immutable afterwards.
//! Any problem here is fatal: the scheduler never starts on a bad config.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use jiff::tz::TimeZone;
use url::Url;

use crate::error::AutoprintError;

const DEFAULT_STATUS_FILTER: &str = "Open";
const DEFAULT_OPENING_HOUR: u8 = 8;
const DEFAULT_CLOSING_HOUR: u8 = 18;
const DEFAULT_CHECK_INTERVAL_SECS: u64 = 30;
const DEFAULT_TIMEZONE: &str = "UTC";
const DEFAULT_WEB_PORT: u16 = 3000;
const DEFAULT_DYMO_SERVICE_URL: &str = "https://127.0.0.1:41951/DYMO/DLS/Printing";
const DEFAULT_DYMO_PRINTER_NAME: &str = "DYMO LabelWriter 450";
const DEFAULT_RESTART_COMMAND: &str = "/bin/bash update_script.sh";

/// Configuration for Autoprint.
///
/// The WHD password is stored but never logged or exposed in error messages.
#[derive(Clone)]
pub struct Config {
    /// Base URL of the Web Help Desk host (e.g., `http://helpdesk.example.com`).
    pub base_url: String,

    /// WHD account whose tickets are polled.
    pub username: String,

    /// WHD account password.
    password: String,

    /// Status type name used in the open-ticket qualifier.
    pub status_filter: String,

    /// First hour (inclusive) of the operating window.
    pub opening_hour: u8,

    /// Hour (exclusive) at which the operating window ends.
    pub closing_hour: u8,

    /// Poll interval while inside the operating window.
    pub check_interval: Duration,

    /// Reference time zone for the operating window.
    pub timezone: TimeZone,

    /// Port the admin interface listens on.
    pub web_port: u16,

    /// Directory holding the `.label` template files.
    pub template_dir: PathBuf,

    /// Directory where the last printed label is saved and served from.
    pub preview_dir: PathBuf,

    /// Base URL of the DYMO Connect web service.
    pub dymo_service_url: String,

    /// Name of the label printer as known to DYMO Connect.
    pub dymo_printer_name: String,

    /// `host:port` of the receipt printer.
    pub receipt_printer_addr: String,

    /// Program and arguments launched by the restart trigger.
    pub restart_command: Vec<String>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("status_filter", &self.status_filter)
            .field("opening_hour", &self.opening_hour)
            .field("closing_hour", &self.closing_hour)
            .field("check_interval", &self.check_interval)
            .field("timezone", &self.timezone.iana_name())
            .field("web_port", &self.web_port)
            .field("receipt_printer_addr", &self.receipt_printer_addr)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// # Required Environment Variables
    ///
    /// - `WHD_BASE_URL`, `WHD_USERNAME`, `WHD_PASSWORD`
    /// - `RECEIPT_PRINTER_ADDR`
    ///
    /// Everything else has a default.
    ///
    /// # Errors
    ///
    /// Returns `AutoprintError::Config` if any required variable is missing
    /// or if values fail validation.
    pub fn from_env() -> Result<Self, AutoprintError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Loads configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AutoprintError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get_required = |name: &str| -> Result<String, AutoprintError> {
            lookup(name)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| AutoprintError::missing_env(name))
        };
        let get_optional = |name: &str, default: &str| -> String {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let base_url = Self::validate_base_url(get_required("WHD_BASE_URL")?)?;
        let username = get_required("WHD_USERNAME")?.trim().to_string();
        let password = get_required("WHD_PASSWORD")?;
        Self::validate_password(&password)?;

        let opening_hour = Self::parse_number(
            "AUTOPRINT_OPENING_HOUR",
            lookup("AUTOPRINT_OPENING_HOUR"),
            DEFAULT_OPENING_HOUR,
        )?;
        let closing_hour = Self::parse_number(
            "AUTOPRINT_CLOSING_HOUR",
            lookup("AUTOPRINT_CLOSING_HOUR"),
            DEFAULT_CLOSING_HOUR,
        )?;
        Self::validate_window(opening_hour, closing_hour)?;

        let interval_secs: u64 = Self::parse_number(
            "AUTOPRINT_CHECK_INTERVAL_SECS",
            lookup("AUTOPRINT_CHECK_INTERVAL_SECS"),
            DEFAULT_CHECK_INTERVAL_SECS,
        )?;
        if interval_secs == 0 {
            return Err(AutoprintError::invalid_config(
                "AUTOPRINT_CHECK_INTERVAL_SECS must be greater than zero",
            ));
        }

        let timezone = Self::resolve_timezone(&get_optional("AUTOPRINT_TIMEZONE", DEFAULT_TIMEZONE))?;

        let web_port = Self::parse_number(
            "AUTOPRINT_WEB_PORT",
            lookup("AUTOPRINT_WEB_PORT"),
            DEFAULT_WEB_PORT,
        )?;

        let restart_command: Vec<String> =
            get_optional("AUTOPRINT_RESTART_COMMAND", DEFAULT_RESTART_COMMAND)
                .split_whitespace()
                .map(str::to_string)
                .collect();

        Ok(Config {
            base_url,
            username,
            password,
            status_filter: get_optional("WHD_STATUS_FILTER", DEFAULT_STATUS_FILTER),
            opening_hour,
            closing_hour,
            check_interval: Duration::from_secs(interval_secs),
            timezone,
            web_port,
            template_dir: PathBuf::from(get_optional("AUTOPRINT_TEMPLATE_DIR", ".")),
            preview_dir: PathBuf::from(get_optional("AUTOPRINT_PREVIEW_DIR", "./public")),
            dymo_service_url: get_optional("DYMO_SERVICE_URL", DEFAULT_DYMO_SERVICE_URL)
                .trim_end_matches('/')
                .to_string(),
            dymo_printer_name: get_optional("DYMO_PRINTER_NAME", DEFAULT_DYMO_PRINTER_NAME),
            receipt_printer_addr: get_required("RECEIPT_PRINTER_ADDR")?.trim().to_string(),
            restart_command,
        })
    }

    /// Returns the WHD password.
    ///
    /// Only for building requests and sanitizing error messages, never for logging.
    pub fn password(&self) -> &str {
        &self.password
    }

    fn parse_number<T>(name: &str, raw: Option<String>, default: T) -> Result<T, AutoprintError>
    where
        T: std::str::FromStr,
    {
        match raw.map(|value| value.trim().to_string()) {
            None => Ok(default),
            Some(value) if value.is_empty() => Ok(default),
            Some(value) => value.parse::<T>().map_err(|_| {
                AutoprintError::invalid_config(format!("{} must be a number, got {:?}", name, value))
            }),
        }
    }

    /// Validates and normalizes the base URL.
    fn validate_base_url(url: String) -> Result<String, AutoprintError> {
        let url = url.trim().trim_end_matches('/').to_string();

        let parsed = Url::parse(&url)
            .map_err(|e| AutoprintError::invalid_config(format!("WHD_BASE_URL is invalid: {}", e)))?;

        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(AutoprintError::invalid_config(
                "WHD_BASE_URL must start with http:// or https://",
            ));
        }
        if parsed.host_str().is_none() {
            return Err(AutoprintError::invalid_config("WHD_BASE_URL has no host"));
        }

        Ok(url)
    }

    /// Validates the password is not a placeholder value.
    fn validate_password(password: &str) -> Result<(), AutoprintError> {
        let lower = password.to_lowercase();
        let placeholder_patterns = ["your_password", "placeholder", "changeme"];

        if placeholder_patterns.iter().any(|p| lower.contains(p)) {
            return Err(AutoprintError::invalid_config(
                "WHD_PASSWORD appears to be a placeholder value",
            ));
        }

        Ok(())
    }

    fn validate_window(opening: u8, closing: u8) -> Result<(), AutoprintError> {
        if closing > 24 {
            return Err(AutoprintError::invalid_config(
                "AUTOPRINT_CLOSING_HOUR must be between 0 and 24",
            ));
        }
        if opening >= closing {
            return Err(AutoprintError::invalid_config(format!(
                "opening hour {} must be before closing hour {}",
                opening, closing
            )));
        }
        Ok(())
    }

    fn resolve_timezone(name: &str) -> Result<TimeZone, AutoprintError> {
        if name.eq_ignore_ascii_case("UTC") {
            return Ok(TimeZone::UTC);
        }
        TimeZone::get(name).map_err(|e| {
            AutoprintError::invalid_config(format!("AUTOPRINT_TIMEZONE {:?}: {}", name, e))
        })
    }
}
