//! Bounded retry for print jobs.

use std::future::Future;
use std::time::Duration;

use crate::error::AutoprintError;

/// How often and how patiently a failed print is repeated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Never less than one.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubled after each further failure.
    pub initial_backoff: Duration,
    /// Upper bound for the delay between attempts.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(10),
        }
    }
}

/// Terminal result of a retried print.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrintOutcome {
    /// The job went through.
    Printed {
        /// Attempts used.
        attempts: u32,
    },
    /// Every attempt failed.
    Failed {
        /// Attempts used.
        attempts: u32,
        /// Message of the last error.
        error: String,
    },
}

impl PrintOutcome {
    /// Returns true if the job was printed.
    pub fn is_printed(&self) -> bool {
        matches!(self, PrintOutcome::Printed { .. })
    }
}

impl RetryPolicy {
    /// Delay after the given failed attempt (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Runs `job` until it succeeds or the attempts are used up.
    pub async fn run<F, Fut>(&self, device: &str, job: F) -> PrintOutcome
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<(), AutoprintError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match job().await {
                Ok(()) => return PrintOutcome::Printed { attempts: attempt },
                Err(e) if attempt < max_attempts => {
                    let delay = self.backoff(attempt);
                    tracing::warn!(
                        device = device,
                        attempt = attempt,
                        max_attempts = max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Print failed, trying again"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    tracing::error!(
                        device = device,
                        attempts = attempt,
                        error = %e,
                        "Print failed, giving up"
                    );
                    return PrintOutcome::Failed {
                        attempts: attempt,
                        error: e.to_string(),
                    };
                }
            }
        }
    }
}
