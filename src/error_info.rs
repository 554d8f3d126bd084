//! Best-effort decoding of the service's JSON error payload.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Structured error returned by the service alongside a failed response
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub message: String,
    pub code: i64,
}

impl ErrorInfo {
    pub fn new(message: impl Into<String>, code: i64) -> Self {
        Self {
            message: message.into(),
            code,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.message.is_empty() && self.code == 0
    }

    /// Decode `message` and `code` from a response body.
    ///
    /// Missing fields, wrong types, and bodies that are not JSON all yield
    /// zero values. This never fails.
    pub fn extract(body: &[u8]) -> Self {
        let Ok(value) = serde_json::from_slice::<Value>(body) else {
            return Self::default();
        };

        let message = value
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let code = value.get("code").and_then(Value::as_i64).unwrap_or(0);

        Self { message, code }
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            write!(f, "no error description")
        } else {
            write!(f, "{} (code {})", self.message, self.code)
        }
    }
}
