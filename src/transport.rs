//! Transport engine: sends one attempt over the wire.

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use crate::error::{AgentError, Result};
use crate::headers::ClientHeaders;
use crate::request::Request;
use crate::response::Response;

/// Performs a single network exchange.
///
/// Implementations return every HTTP status as `Ok`; only failures to
/// obtain a response at all are errors.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn perform(&self, request: &Request, headers: &ClientHeaders) -> Result<Response>;
}

/// `reqwest` backed transport
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: String,
}

impl ReqwestTransport {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AgentError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn url_for(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn perform(&self, request: &Request, headers: &ClientHeaders) -> Result<Response> {
        let url = self.url_for(&request.path);
        debug!(method = %request.method, url = %url, "Dispatching request");

        let mut builder = self
            .client
            .request(request.method.clone(), &url)
            .headers(headers.to_header_map());
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await?;
        let status = response.status();
        let response_headers = response.headers().clone();
        let body = response.bytes().await?;

        Ok(Response::new(status, response_headers, body.to_vec()))
    }
}
