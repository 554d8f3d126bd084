use reqwest::StatusCode;
use serde::Serialize;
use thiserror::Error;

use crate::error_info::ErrorInfo;
use crate::route::Route;

pub type Result<T> = std::result::Result<T, AgentError>;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Request rejected on {route} ({status}): {info}")]
    ClientRejected {
        route: Route,
        status: StatusCode,
        info: ErrorInfo,
    },

    #[error("Request aborted on {route} ({status}): {info}")]
    ProtocolAbort {
        route: Route,
        status: StatusCode,
        info: ErrorInfo,
    },

    #[error("Route {route} is halted after a previous abort ({status})")]
    RouteHalted { route: Route, status: StatusCode },

    #[error("Gave up on {route} after {attempts} attempts (last status {last_status})")]
    RetriesExhausted {
        route: Route,
        attempts: u32,
        last_status: StatusCode,
    },

    #[error("Request on {route} was cancelled")]
    Cancelled { route: Route },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Failed to decode response body: {0}")]
    Decode(String),
}

/// How loudly a caller should surface an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Severity {
    Warning,
    Error,
    Critical,
}

impl AgentError {
    pub fn severity(&self) -> Severity {
        match self {
            AgentError::Cancelled { .. } => Severity::Warning,
            AgentError::ClientRejected { .. }
            | AgentError::RetriesExhausted { .. }
            | AgentError::Transport(_)
            | AgentError::Decode(_) => Severity::Error,
            AgentError::Configuration(_)
            | AgentError::ProtocolAbort { .. }
            | AgentError::RouteHalted { .. } => Severity::Critical,
        }
    }

    pub fn is_abort(&self) -> bool {
        matches!(
            self,
            AgentError::ProtocolAbort { .. } | AgentError::RouteHalted { .. }
        )
    }

    /// Error payload decoded from the response, when there was one.
    pub fn error_info(&self) -> Option<&ErrorInfo> {
        match self {
            AgentError::ClientRejected { info, .. } | AgentError::ProtocolAbort { info, .. } => {
                Some(info)
            }
            _ => None,
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            AgentError::ClientRejected { status, .. }
            | AgentError::ProtocolAbort { status, .. }
            | AgentError::RouteHalted { status, .. } => Some(*status),
            AgentError::RetriesExhausted { last_status, .. } => Some(*last_status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for AgentError {
    fn from(err: reqwest::Error) -> Self {
        AgentError::Transport(err.to_string())
    }
}

impl From<envconfig::Error> for AgentError {
    fn from(err: envconfig::Error) -> Self {
        AgentError::Configuration(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AgentError {
    fn from(err: validator::ValidationErrors) -> Self {
        AgentError::Configuration(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abort_outranks_failure() {
        let route = Route::new("GET /users/@me");
        let failure = AgentError::ClientRejected {
            route: route.clone(),
            status: StatusCode::NOT_FOUND,
            info: ErrorInfo::default(),
        };
        let abort = AgentError::ProtocolAbort {
            route,
            status: StatusCode::UNAUTHORIZED,
            info: ErrorInfo::default(),
        };

        assert!(abort.severity() > failure.severity());
        assert!(abort.is_abort());
        assert!(!failure.is_abort());
    }

    #[test]
    fn test_display_includes_error_info() {
        let err = AgentError::ClientRejected {
            route: Route::new("POST /channels/1/messages"),
            status: StatusCode::FORBIDDEN,
            info: ErrorInfo::new("Missing Access", 50001),
        };

        let text = err.to_string();
        assert!(text.contains("POST /channels/1/messages"));
        assert!(text.contains("403"));
        assert!(text.contains("Missing Access"));
        assert_eq!(err.status(), Some(StatusCode::FORBIDDEN));
    }
}
