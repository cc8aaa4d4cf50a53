//! Retry scheduling after failed fetches.
//!
//! The scheduler keeps one base delay and at most one armed retry deadline.
//! Each failure arms a retry at the jittered base and doubles the base up to
//! the ceiling; a success restores the initial base and disarms.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use tokio::time::Instant;

/// Tunables for [`BackoffScheduler`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub max: Duration,
    pub floor: Duration,
    /// Relative jitter, e.g. `0.15` for ±15%.
    pub jitter: f64,
}

/// Roughly 30 years, the same stand-in tokio uses for "never".
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// `now + delay`, saturating to a far-future instant instead of panicking.
pub(crate) fn deadline_after(now: Instant, delay: Duration) -> Instant {
    now.checked_add(delay)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(15),
            max: Duration::from_secs(120),
            floor: Duration::from_secs(2),
            jitter: 0.15,
        }
    }
}

pub struct BackoffScheduler {
    policy: BackoffPolicy,
    base: Duration,
    armed: Option<Instant>,
    rng: StdRng,
}

impl BackoffScheduler {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self::with_rng(policy, StdRng::from_entropy())
    }

    /// Deterministic jitter for tests.
    pub fn with_seed(policy: BackoffPolicy, seed: u64) -> Self {
        Self::with_rng(policy, StdRng::seed_from_u64(seed))
    }

    fn with_rng(policy: BackoffPolicy, rng: StdRng) -> Self {
        Self {
            base: policy.initial,
            policy,
            armed: None,
            rng,
        }
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Pre-jitter delay the next failure will use.
    pub fn base(&self) -> Duration {
        self.base
    }

    pub fn retry_deadline(&self) -> Option<Instant> {
        self.armed
    }

    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// Arms a retry after a failure and returns its delay.
    ///
    /// Returns `None` without touching the base when a retry is already armed;
    /// there is never more than one pending retry.
    pub fn on_failure(&mut self, now: Instant) -> Option<Duration> {
        if let Some(deadline) = self.armed {
            tracing::debug!(
                remaining_ms = deadline.saturating_duration_since(now).as_millis() as u64,
                "Retry already armed, not scheduling another"
            );
            return None;
        }

        let delay = self.jittered(self.base);
        self.armed = Some(deadline_after(now, delay));
        self.base = self.base.saturating_mul(2).min(self.policy.max);
        Some(delay)
    }

    /// Consumes the armed retry if its deadline has passed.
    pub fn fire(&mut self, now: Instant) -> bool {
        match self.armed {
            Some(deadline) if deadline <= now => {
                self.armed = None;
                true
            }
            _ => false,
        }
    }

    /// Back to the initial base; any armed retry becomes irrelevant.
    pub fn on_success(&mut self) {
        self.base = self.policy.initial;
        self.armed = None;
    }

    fn jittered(&mut self, base: Duration) -> Duration {
        let spread = self.policy.jitter.abs();
        let factor = if spread > 0.0 {
            1.0 + self.rng.gen_range(-spread..=spread)
        } else {
            1.0
        };
        let ms = (base.as_millis() as f64 * factor).round().max(0.0) as u64;
        Duration::from_millis(ms)
            .max(self.policy.floor)
            .min(self.policy.max)
    }
}
