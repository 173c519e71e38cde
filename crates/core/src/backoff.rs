//! Backoff state machines.
//!
//! Both the REST retry policy and the WebSocket reconnect schedule are
//! expressed as "attempt count → delay" so they can be tested without any
//! sleeping. Callers own the actual waiting.

use std::time::Duration;

/// Default number of retries after the first REST attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Default delay before the first REST retry.
pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_millis(300);

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

/// Bounded retry schedule for REST calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Per-attempt timeout.
    pub timeout: Duration,
    /// Retries after the first attempt; total attempts are `max_retries + 1`.
    pub max_retries: u32,
    /// Delay before the first retry. Doubles for each subsequent retry.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_REQUEST_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_RETRY_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after failed attempt number `attempt` (1-based), or
    /// `None` when the retry budget is spent.
    pub fn delay_after(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_retries {
            return None;
        }
        let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
        Some(self.base_delay.saturating_mul(factor))
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }
}

// ---------------------------------------------------------------------------
// Reconnect backoff
// ---------------------------------------------------------------------------

/// Live-update reconnect schedule: wait `initial_delay` after the first
/// drop, then `multiplier` times longer after each further one, never more
/// than `max_delay`.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

/// Counts consecutive connection failures and hands out the wait before
/// each retry. A successful connection starts the schedule over.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: ReconnectConfig,
    current: Option<Duration>,
    failures: u32,
}

impl Backoff {
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            current: None,
            failures: 0,
        }
    }

    /// Record a failed or dropped connection and return the wait before the
    /// next attempt.
    pub fn on_failure(&mut self) -> Duration {
        let delay = match self.current {
            None => self.config.initial_delay,
            Some(previous) => {
                let grown = previous.as_secs_f64() * self.config.multiplier;
                Duration::try_from_secs_f64(grown).unwrap_or(self.config.max_delay)
            }
        }
        .min(self.config.max_delay);
        self.current = Some(delay);
        self.failures += 1;
        delay
    }

    pub fn on_success(&mut self) {
        self.current = None;
        self.failures = 0;
    }

    /// Consecutive failures since the last success.
    pub fn failures(&self) -> u32 {
        self.failures
    }
}
