//! Presentation-side state for the terminal readout.
//!
//! `App` is a read model: it is rebuilt from [`MonitorEvent`]s and the
//! preference cache, and never writes persistent state itself.

use std::borrow::Cow;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::aqi::{FetchError, Snapshot};
use crate::monitor::{MonitorEvent, Trigger};
use crate::storage::Preferences;

/// How long a transient status message stays visible.
const STATUS_TTL: Duration = Duration::from_secs(3);

pub struct App {
    /// Latest successful reading. Kept while later fetches fail.
    pub reading: Option<Snapshot>,
    pub last_error: Option<FetchError>,
    pub consecutive_failures: u32,
    pub retry_at: Option<Instant>,
    pub next_poll_at: Option<Instant>,
    /// Trigger of the fetch currently in flight.
    pub fetching: Option<Trigger>,
    pub prefs: watch::Receiver<Preferences>,
    pub status_message: Option<(Cow<'static, str>, Instant)>,
    pub needs_redraw: bool,
}

impl App {
    pub fn new(prefs: watch::Receiver<Preferences>) -> Self {
        Self {
            reading: None,
            last_error: None,
            consecutive_failures: 0,
            retry_at: None,
            next_poll_at: None,
            fetching: None,
            prefs,
            status_message: None,
            needs_redraw: true,
        }
    }

    /// Folds a poll-loop event into the read model.
    pub fn apply(&mut self, event: MonitorEvent) {
        let now = Instant::now();
        match event {
            MonitorEvent::FetchStarted(trigger) => {
                self.fetching = Some(trigger);
            }
            MonitorEvent::Updated {
                snapshot,
                next_poll,
            } => {
                self.fetching = None;
                self.reading = Some(snapshot);
                self.last_error = None;
                self.consecutive_failures = 0;
                self.retry_at = None;
                self.next_poll_at = now.checked_add(next_poll);
            }
            MonitorEvent::Failed {
                error,
                retry_in,
                consecutive_failures,
            } => {
                self.fetching = None;
                self.last_error = Some(error);
                self.consecutive_failures = consecutive_failures;
                self.retry_at = retry_in.and_then(|d| now.checked_add(d));
            }
        }
        self.needs_redraw = true;
    }

    pub fn preferences(&self) -> Preferences {
        *self.prefs.borrow()
    }

    /// Time left until the armed retry, if any.
    pub fn retry_countdown(&self) -> Option<Duration> {
        self.retry_at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    pub fn next_poll_countdown(&self) -> Option<Duration> {
        self.next_poll_at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    pub fn set_status(&mut self, msg: impl Into<Cow<'static, str>>) {
        self.status_message = Some((msg.into(), Instant::now()));
        self.needs_redraw = true;
    }

    /// Clear status message if expired (older than 3 seconds)
    /// Returns true if a message was actually cleared
    pub fn clear_expired_status(&mut self) -> bool {
        if let Some((_, time)) = &self.status_message {
            if time.elapsed() >= STATUS_TTL {
                self.status_message = None;
                return true;
            }
        }
        false
    }
}
