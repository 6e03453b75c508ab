//! The polling loop.
//!
//! Each tick asks the [`OperatingWindow`] whether the shop is open. Inside
//! the window the open-ticket list is fetched and diffed against the
//! baseline, and every new ticket is dispatched. Outside it the baseline is
//! dropped, so the first poll of the next day takes a fresh one instead of
//! printing everything that came in overnight.

use std::sync::Arc;
use std::time::Duration;

use jiff::tz::TimeZone;
use jiff::Timestamp;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::detector;
use crate::dispatch::{self, PrintRequest};
use crate::models::TicketId;
use crate::state::AppState;

/// Poll interval outside operating hours.
pub const OUT_OF_HOURS_INTERVAL: Duration = Duration::from_secs(120);

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> Timestamp;
}

/// The system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// Whether the shop is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Polling and printing.
    InHours,
    /// Idle, with the baseline cleared.
    OutOfHours,
}

/// Opening hours in the reference time zone.
#[derive(Debug, Clone)]
pub struct OperatingWindow {
    opening_hour: u8,
    closing_hour: u8,
    interval: Duration,
    timezone: TimeZone,
}

impl OperatingWindow {
    /// Creates a window covering `[opening_hour, closing_hour)`.
    pub fn new(opening_hour: u8, closing_hour: u8, interval: Duration, timezone: TimeZone) -> Self {
        Self {
            opening_hour,
            closing_hour,
            interval,
            timezone,
        }
    }

    /// Creates the window from configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.opening_hour,
            config.closing_hour,
            config.check_interval,
            config.timezone.clone(),
        )
    }

    /// Phase at `now`, judged by the hour in the reference time zone.
    pub fn phase_at(&self, now: Timestamp) -> Phase {
        let hour = now.to_zoned(self.timezone.clone()).hour() as u8;
        if hour >= self.opening_hour && hour < self.closing_hour {
            Phase::InHours
        } else {
            Phase::OutOfHours
        }
    }

    /// Delay before the next tick.
    pub fn delay_for(&self, phase: Phase) -> Duration {
        match phase {
            Phase::InHours => self.interval,
            Phase::OutOfHours => OUT_OF_HOURS_INTERVAL,
        }
    }
}

/// What one tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickOutcome {
    /// Phase the tick ran in.
    pub phase: Phase,
    /// How long to wait before the next tick.
    pub next_delay: Duration,
    /// True if the baseline was dropped.
    pub cleared: bool,
    /// True if the open-ticket fetch failed and nothing was committed.
    pub fetch_failed: bool,
    /// New tickets whose print jobs were started.
    pub dispatched: Vec<TicketId>,
}

/// Drives the poll cycle.
pub struct PollingScheduler {
    state: Arc<AppState>,
    window: OperatingWindow,
    clock: Arc<dyn Clock>,
}

impl PollingScheduler {
    /// Creates a scheduler on the system clock.
    pub fn new(state: Arc<AppState>, window: OperatingWindow) -> Self {
        Self {
            state,
            window,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Runs one cycle.
    pub async fn tick(&self) -> TickOutcome {
        let phase = self.window.phase_at(self.clock.now());
        let mut outcome = TickOutcome {
            phase,
            next_delay: self.window.delay_for(phase),
            cleared: false,
            fetch_failed: false,
            dispatched: Vec::new(),
        };

        if phase == Phase::OutOfHours {
            let mut core = self.state.core().await;
            if !core.store.is_empty() {
                tracing::info!(count = core.store.len(), "Outside operating hours, clearing ticket cache");
                core.store.clear();
                outcome.cleared = true;
            }
            return outcome;
        }

        let snapshot = match self.state.source().fetch_open_tickets().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                let error = self.state.sanitize(&e);
                if e.is_transient_fetch() {
                    tracing::warn!(error = %error, "Ticket poll failed, skipping cycle");
                } else {
                    tracing::error!(error = %error, "Ticket poll failed, skipping cycle");
                }
                outcome.fetch_failed = true;
                return outcome;
            }
        };

        // The lock covers only the diff; the fetch above may take the full
        // request timeout.
        let new_tickets = {
            let mut core = self.state.core().await;
            let detection = detector::detect(&mut core.store, &snapshot);
            core.activity.last_server_check = Some(self.clock.now());
            detection.new_tickets
        };

        for ticket in new_tickets {
            match dispatch::dispatch_ticket(&self.state, &ticket.id, PrintRequest::BOTH).await {
                Ok(_) => outcome.dispatched.push(ticket.id),
                Err(e) => tracing::error!(
                    ticket_id = %ticket.id,
                    error = %self.state.sanitize(&e),
                    "Could not dispatch new ticket"
                ),
            }
        }

        outcome
    }

    /// Ticks forever, sleeping between cycles.
    pub async fn run(self) {
        tracing::info!(
            opening_hour = self.window.opening_hour,
            closing_hour = self.window.closing_hour,
            interval_secs = self.window.interval.as_secs(),
            "Starting ticket poller"
        );
        loop {
            let outcome = self.tick().await;
            tracing::debug!(phase = ?outcome.phase, delay_secs = outcome.next_delay.as_secs(), "Tick complete");
            tokio::time::sleep(outcome.next_delay).await;
        }
    }

    /// Runs the loop on a background task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MISSING_SUBJECT;
    use crate::printing::LabelJob;
    use crate::testing::{detail, snapshot, FixedClock, TestHarness};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::Ordering;

    const OPEN: &str = "2024-03-01T10:00:00Z";
    const NIGHT: &str = "2024-03-01T21:00:00Z";

    fn window() -> OperatingWindow {
        OperatingWindow::new(8, 18, Duration::from_secs(30), TimeZone::UTC)
    }

    fn scheduler(harness: &TestHarness, clock: &Arc<FixedClock>) -> PollingScheduler {
        PollingScheduler::new(harness.state.clone(), window()).with_clock(clock.clone())
    }

    async fn wait_for_labels(harness: &TestHarness, count: usize) {
        for _ in 0..200 {
            if harness.labels.printed().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("expected {} labels, got {:?}", count, harness.labels.printed());
    }

    #[test]
    fn test_phase_boundaries() {
        let window = window();
        let at = |s: &str| window.phase_at(s.parse().unwrap());

        assert_eq!(at("2024-03-01T07:59:59Z"), Phase::OutOfHours);
        assert_eq!(at("2024-03-01T08:00:00Z"), Phase::InHours);
        assert_eq!(at("2024-03-01T17:59:59Z"), Phase::InHours);
        assert_eq!(at("2024-03-01T18:00:00Z"), Phase::OutOfHours);
    }

    #[test]
    fn test_phase_uses_reference_timezone() {
        let tz = TimeZone::get("Australia/Sydney").unwrap();
        let window = OperatingWindow::new(8, 18, Duration::from_secs(30), tz);

        // 22:00 UTC is 09:00 the next morning in Sydney (AEDT).
        assert_eq!(window.phase_at("2024-03-01T22:00:00Z".parse().unwrap()), Phase::InHours);
        assert_eq!(window.phase_at("2024-03-01T10:00:00Z".parse().unwrap()), Phase::OutOfHours);
    }

    #[test]
    fn test_closing_at_midnight_covers_late_evening() {
        let window = OperatingWindow::new(0, 24, Duration::from_secs(30), TimeZone::UTC);
        assert_eq!(window.phase_at("2024-03-01T23:59:00Z".parse().unwrap()), Phase::InHours);
    }

    #[test]
    fn test_delays() {
        let window = window();
        assert_eq!(window.delay_for(Phase::InHours), Duration::from_secs(30));
        assert_eq!(window.delay_for(Phase::OutOfHours), OUT_OF_HOURS_INTERVAL);
    }

    #[tokio::test]
    async fn test_cold_start_takes_baseline() {
        let harness = TestHarness::new();
        let clock = Arc::new(FixedClock::at(OPEN));
        harness
            .source
            .set_listing(Some(snapshot(&[("1", Some("a")), ("2", None)])));

        let outcome = scheduler(&harness, &clock).tick().await;

        assert_eq!(outcome.phase, Phase::InHours);
        assert_eq!(outcome.next_delay, Duration::from_secs(30));
        assert!(outcome.dispatched.is_empty());

        let core = harness.state.core().await;
        assert_eq!(core.store.len(), 2);
        assert_eq!(core.store.get(&TicketId::new("2")), Some(MISSING_SUBJECT));
        assert_eq!(core.activity.last_server_check, Some(OPEN.parse().unwrap()));
        assert_eq!(harness.source.detail_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cold_start_with_no_tickets_seeds_placeholder() {
        let harness = TestHarness::new();
        let clock = Arc::new(FixedClock::at(OPEN));
        harness.source.set_listing(Some(Vec::new()));

        scheduler(&harness, &clock).tick().await;

        let core = harness.state.core().await;
        assert_eq!(core.store.len(), 1);
        assert_eq!(
            core.store.get(&TicketId::new(detector::PLACEHOLDER_TICKET_ID)),
            Some(detector::PLACEHOLDER_TICKET_SUBJECT)
        );
    }

    #[tokio::test]
    async fn test_steady_state_dispatches_new_tickets_in_order() {
        let harness = TestHarness::new();
        let clock = Arc::new(FixedClock::at(OPEN));
        let scheduler = scheduler(&harness, &clock);

        harness.source.set_listing(Some(snapshot(&[("1", Some("a"))])));
        scheduler.tick().await;

        harness.source.add_detail("3", detail("Laptop", "x", "2024-03-01T09:00:00Z"));
        harness
            .source
            .add_detail("2", detail("ABCDEF123456", "y", "2024-03-01T09:05:00Z"));
        harness.source.set_listing(Some(snapshot(&[
            ("1", Some("a")),
            ("3", Some("Laptop")),
            ("2", Some("ABCDEF123456")),
        ])));

        let outcome = scheduler.tick().await;

        assert_eq!(outcome.dispatched, vec![TicketId::new("3"), TicketId::new("2")]);
        assert_eq!(harness.state.core().await.last_known.id, TicketId::new("2"));
        assert_eq!(harness.state.core().await.store.len(), 3);

        wait_for_labels(&harness, 2).await;
        assert!(harness.labels.printed().contains(&LabelJob::WithSerial {
            ticket_id: TicketId::new("2"),
            serial_number: "ABCDEF123456".to_string(),
        }));
    }

    #[tokio::test]
    async fn test_same_snapshot_twice_dispatches_nothing() {
        let harness = TestHarness::new();
        let clock = Arc::new(FixedClock::at(OPEN));
        let scheduler = scheduler(&harness, &clock);
        harness.source.set_listing(Some(snapshot(&[("1", Some("a"))])));

        scheduler.tick().await;
        harness.source.add_detail("2", detail("b", "", "2024-03-01T09:00:00Z"));
        harness
            .source
            .set_listing(Some(snapshot(&[("1", Some("a")), ("2", Some("b"))])));

        assert_eq!(scheduler.tick().await.dispatched.len(), 1);
        assert!(scheduler.tick().await.dispatched.is_empty());
        assert_eq!(harness.source.detail_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_out_of_hours_clears_and_skips_fetch() {
        let harness = TestHarness::new();
        let clock = Arc::new(FixedClock::at(OPEN));
        let scheduler = scheduler(&harness, &clock);
        harness.source.set_listing(Some(snapshot(&[("1", Some("a"))])));
        scheduler.tick().await;

        clock.set(NIGHT);
        let outcome = scheduler.tick().await;

        assert_eq!(outcome.phase, Phase::OutOfHours);
        assert_eq!(outcome.next_delay, OUT_OF_HOURS_INTERVAL);
        assert!(outcome.cleared);
        assert!(harness.state.core().await.store.is_empty());
        assert_eq!(harness.source.list_calls.load(Ordering::SeqCst), 1);

        assert!(!scheduler.tick().await.cleared);
    }

    #[tokio::test]
    async fn test_next_morning_rebaselines_instead_of_printing() {
        let harness = TestHarness::new();
        let clock = Arc::new(FixedClock::at(OPEN));
        let scheduler = scheduler(&harness, &clock);
        harness.source.set_listing(Some(snapshot(&[("1", Some("a"))])));
        scheduler.tick().await;

        clock.set(NIGHT);
        scheduler.tick().await;

        clock.set("2024-03-02T08:00:00Z");
        harness
            .source
            .set_listing(Some(snapshot(&[("1", Some("a")), ("9", Some("overnight"))])));
        let outcome = scheduler.tick().await;

        assert!(outcome.dispatched.is_empty());
        assert_eq!(harness.state.core().await.store.len(), 2);
    }

    #[tokio::test]
    async fn test_fetch_failure_commits_nothing() {
        let harness = TestHarness::new();
        let clock = Arc::new(FixedClock::at(OPEN));
        harness.source.set_listing(None);

        let outcome = scheduler(&harness, &clock).tick().await;

        assert!(outcome.fetch_failed);
        assert_eq!(outcome.next_delay, Duration::from_secs(30));
        let core = harness.state.core().await;
        assert!(core.store.is_empty());
        assert_eq!(core.activity.last_server_check, None);
    }

    #[tokio::test]
    async fn test_detail_failure_keeps_ticket_seen() {
        let harness = TestHarness::new();
        let clock = Arc::new(FixedClock::at(OPEN));
        let scheduler = scheduler(&harness, &clock);
        harness.source.set_listing(Some(snapshot(&[("1", Some("a"))])));
        scheduler.tick().await;

        harness
            .source
            .set_listing(Some(snapshot(&[("1", Some("a")), ("5", Some("gone"))])));
        let outcome = scheduler.tick().await;

        assert!(outcome.dispatched.is_empty());
        let core = harness.state.core().await;
        assert!(core.store.contains(&TicketId::new("5")));
        assert_eq!(core.last_known.id, TicketId::new("999999"));
    }

    #[tokio::test]
    async fn test_status_stays_responsive_during_slow_poll() {
        let harness = TestHarness::new();
        let clock = Arc::new(FixedClock::at(OPEN));
        harness.source.set_listing(Some(snapshot(&[("1", Some("a"))])));
        harness.source.set_listing_delay(Duration::from_secs(2));

        let scheduler = scheduler(&harness, &clock);
        let poll = tokio::spawn(async move { scheduler.tick().await });
        tokio::time::sleep(Duration::from_millis(50)).await;

        let status = tokio::time::timeout(Duration::from_millis(500), harness.state.status()).await;
        assert!(status.is_ok(), "status blocked behind the ticket poll");

        let outcome = poll.await.unwrap();
        assert!(!outcome.fetch_failed);
        assert_eq!(harness.state.core().await.store.len(), 1);
    }
}
