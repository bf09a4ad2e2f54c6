//! Reconnect backoff
//!
//! Exponential delay with additive jitter. Delays never decrease across
//! consecutive failures, so full jitter is not used.

use rand::Rng;
use relay_common::BackoffSettings;
use std::time::Duration;

/// Backoff parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Delay before the second attempt
    pub base: Duration,
    /// Upper bound on any delay
    pub max: Duration,
    /// Extra random delay in `[0, jitter)`
    pub jitter: Duration,
    /// Failed attempts after which the client gives up
    pub max_attempts: u32,
}

impl BackoffPolicy {
    /// Build from the settings loaded by `relay-common`
    #[must_use]
    pub fn from_settings(settings: &BackoffSettings) -> Self {
        Self {
            base: Duration::from_millis(settings.base_ms),
            max: Duration::from_millis(settings.max_ms),
            jitter: Duration::from_millis(settings.jitter_ms),
            max_attempts: settings.max_reconnects,
        }
    }

    /// Start tracking a fresh sequence of failures
    #[must_use]
    pub fn start(&self) -> Backoff {
        Backoff::new(*self)
    }

    fn exponential(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }

    fn jitter(&self) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..jitter_ms))
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_settings(&BackoffSettings::default())
    }
}

/// Attempt counter and current delay for one logical client
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: BackoffPolicy,
    attempts: u32,
    last_delay: Duration,
}

impl Backoff {
    /// Create a counter with no failures recorded
    #[must_use]
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
            last_delay: Duration::ZERO,
        }
    }

    /// Record a failed attempt and return the delay before the next one
    ///
    /// Returns `None` once `max_attempts` failures have been recorded.
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.attempts = self.attempts.saturating_add(1);
        if self.attempts >= self.policy.max_attempts {
            return None;
        }

        let raw = self.policy.exponential(self.attempts) + self.policy.jitter();
        let delay = raw.max(self.last_delay).min(self.policy.max);
        self.last_delay = delay;
        Some(delay)
    }

    /// Forget all recorded failures
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.last_delay = Duration::ZERO;
    }

    /// Failed attempts recorded so far
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Most recent delay handed out
    #[must_use]
    pub fn last_delay(&self) -> Duration {
        self.last_delay
    }

    /// Check if the attempt budget is spent
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.policy.max_attempts
    }
}
