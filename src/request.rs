use reqwest::{Method, StatusCode};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

use crate::error::{AgentError, Result};
use crate::error_info::ErrorInfo;
use crate::policy::RetryPolicy;
use crate::route::Route;

/// Replaces the default error payload decoding for one call
pub type ErrorHandler = Arc<dyn Fn(StatusCode, &[u8]) -> ErrorInfo + Send + Sync>;

/// One logical API call
#[derive(Clone)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub route: Route,
    pub body: Option<Vec<u8>>,
    pub error_handler: Option<ErrorHandler>,
    pub retry_policy: Option<RetryPolicy>,
}

impl Request {
    /// Route is derived from the method and path
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            route: Route::from_path(&method, &path),
            method,
            path,
            body: None,
            error_handler: None,
            retry_policy: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Override the derived route
    pub fn route(mut self, route: impl Into<Route>) -> Self {
        self.route = route.into();
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn json<T: Serialize + ?Sized>(self, body: &T) -> Result<Self> {
        let bytes = serde_json::to_vec(body)
            .map_err(|e| AgentError::Configuration(format!("failed to serialize body: {}", e)))?;
        Ok(self.body(bytes))
    }

    pub fn error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(StatusCode, &[u8]) -> ErrorInfo + Send + Sync + 'static,
    {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    pub fn body_bytes(&self) -> &[u8] {
        self.body.as_deref().unwrap_or_default()
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("route", &self.route)
            .field("body_len", &self.body.as_ref().map(Vec::len))
            .field("error_handler", &self.error_handler.is_some())
            .field("retry_policy", &self.retry_policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_route_derived_from_path() {
        let request = Request::post("/channels/42/messages");
        assert_eq!(request.route.as_str(), "POST /channels/42/messages");
        assert!(request.body_bytes().is_empty());
    }

    #[test]
    fn test_json_body() {
        let request = Request::post("/channels/42/messages")
            .json(&json!({"content": "hello"}))
            .unwrap();
        assert_eq!(request.body_bytes(), br#"{"content":"hello"}"#);
    }

    #[test]
    fn test_overrides() {
        let request = Request::get("/users/@me")
            .route("me")
            .retry_policy(RetryPolicy::standard().max_attempts(2))
            .error_handler(|status, _| ErrorInfo::new("custom", status.as_u16() as i64));

        assert_eq!(request.route.as_str(), "me");
        assert_eq!(request.retry_policy.as_ref().and_then(RetryPolicy::max_attempts_limit), Some(2));

        let handler = request.error_handler.clone().unwrap();
        assert_eq!(handler(StatusCode::NOT_FOUND, &b""[..]), ErrorInfo::new("custom", 404));
    }
}
