//! Retry policy applied by the agent.
//!
//! The standard policy retries transient responses indefinitely: 5xx
//! responses after a fixed delay, 429 responses after the server-declared
//! `retry_after`. Bounding is opt-in through [`RetryPolicy::max_attempts`].

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(with = "humantime_serde")]
    server_error_delay: Duration,
    max_attempts: Option<u32>,
    #[serde(default, with = "humantime_serde")]
    max_retry_after: Option<Duration>,
}

impl RetryPolicy {
    pub const DEFAULT_SERVER_ERROR_DELAY: Duration = Duration::from_millis(5000);

    pub const fn standard() -> Self {
        Self {
            server_error_delay: Self::DEFAULT_SERVER_ERROR_DELAY,
            max_attempts: None,
            max_retry_after: None,
        }
    }

    pub fn server_error_delay(mut self, delay: Duration) -> Self {
        self.server_error_delay = delay.max(Duration::from_millis(1));
        self
    }

    /// Stop after `attempts` dispatches. Zero is treated as one.
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts.max(1));
        self
    }

    pub fn unbounded(mut self) -> Self {
        self.max_attempts = None;
        self
    }

    /// Abort instead of sleeping when the server asks for a longer wait.
    pub fn max_retry_after(mut self, cap: Duration) -> Self {
        self.max_retry_after = Some(cap);
        self
    }

    pub fn server_error_delay_value(&self) -> Duration {
        self.server_error_delay
    }

    pub fn max_attempts_limit(&self) -> Option<u32> {
        self.max_attempts
    }

    pub fn max_retry_after_value(&self) -> Option<Duration> {
        self.max_retry_after
    }

    /// Whether another dispatch is allowed after `attempts` have been made.
    pub fn allows_another(&self, attempts: u32) -> bool {
        match self.max_attempts {
            Some(limit) => attempts < limit,
            None => true,
        }
    }

    pub fn accepts_retry_after(&self, wait: Duration) -> bool {
        match self.max_retry_after {
            Some(cap) => wait <= cap,
            None => true,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::standard()
    }
}
