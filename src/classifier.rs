//! Maps a completed HTTP exchange to the action the agent takes next.
//!
//! | status                     | action                                   |
//! |----------------------------|------------------------------------------|
//! | 2xx, 3xx                   | `Success`                                |
//! | 5xx                        | `Retry` after the server-error delay     |
//! | 400, 403, 404              | `Failure`                                |
//! | 429 with `retry_after > 0` | `Retry` after `retry_after` milliseconds |
//! | anything else              | `Abort`                                  |

use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;

use crate::policy::RetryPolicy;
use crate::response::Response;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryCause {
    ServerError,
    RateLimited,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Success,
    Retry { wait: Duration, cause: RetryCause },
    Failure,
    Abort,
}

impl Action {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Action::Retry { .. })
    }

    pub fn wait_ms(&self) -> Option<u128> {
        match self {
            Action::Retry { wait, .. } => Some(wait.as_millis()),
            _ => None,
        }
    }
}

/// Body of a 429 response
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateLimitNotice {
    pub message: String,
    pub retry_after: Option<f64>,
    pub global: bool,
}

impl RateLimitNotice {
    /// Lenient parse; an unreadable body is an empty notice
    pub fn parse(body: &[u8]) -> Self {
        let Ok(value) = serde_json::from_slice::<Value>(body) else {
            return Self::default();
        };

        Self {
            message: value
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            retry_after: value.get("retry_after").and_then(Value::as_f64),
            global: value.get("global").and_then(Value::as_bool).unwrap_or(false),
        }
    }

    /// Declared wait, if it is a positive number of milliseconds
    pub fn wait(&self) -> Option<Duration> {
        let millis = self.retry_after?;
        if !millis.is_finite() || millis <= 0.0 {
            return None;
        }
        Some(Duration::from_millis(millis.ceil() as u64))
    }
}

/// Stateless response classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classifier {
    server_error_delay: Duration,
}

impl Classifier {
    pub fn new(server_error_delay: Duration) -> Self {
        Self { server_error_delay }
    }

    pub fn from_policy(policy: &RetryPolicy) -> Self {
        Self::new(policy.server_error_delay_value())
    }

    pub fn classify(&self, response: &Response) -> Action {
        self.classify_parts(response.status, &response.body)
    }

    /// Classify by status, consulting the body only for 429.
    pub fn classify_parts(&self, status: StatusCode, body: &[u8]) -> Action {
        if status.is_success() || status.is_redirection() {
            return Action::Success;
        }

        if status.is_server_error() {
            return Action::Retry {
                wait: self.server_error_delay,
                cause: RetryCause::ServerError,
            };
        }

        match status {
            StatusCode::BAD_REQUEST | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => {
                Action::Failure
            }
            StatusCode::TOO_MANY_REQUESTS => match RateLimitNotice::parse(body).wait() {
                Some(wait) => Action::Retry {
                    wait,
                    cause: RetryCause::RateLimited,
                },
                None => Action::Abort,
            },
            _ => Action::Abort,
        }
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(RetryPolicy::DEFAULT_SERVER_ERROR_DELAY)
    }
}

/// Classify with the default server-error delay
pub fn classify(status: StatusCode, body: &[u8]) -> Action {
    Classifier::default().classify_parts(status, body)
}

/// Canonical reason phrase for logs
pub fn reason(status: StatusCode) -> &'static str {
    status.canonical_reason().unwrap_or("Unknown Status")
}
