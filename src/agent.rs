//! Request orchestration: cooldown gate, dispatch, classification, retry.

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::bucket::{BucketStore, ClientId, InMemoryBucketStore};
use crate::classifier::{reason, Action, Classifier, RateLimitNotice, RetryCause};
use crate::config::Config;
use crate::error::{AgentError, Result};
use crate::error_info::ErrorInfo;
use crate::headers::ClientHeaders;
use crate::metrics::{MetricsCollector, Outcome};
use crate::policy::RetryPolicy;
use crate::request::Request;
use crate::response::Response;
use crate::route::Route;
use crate::transport::{ReqwestTransport, Transport};

/// Client instance executing rate-limited API calls
pub struct Agent {
    id: ClientId,
    headers: ClientHeaders,
    transport: Arc<dyn Transport>,
    buckets: Arc<dyn BucketStore>,
    policy: RetryPolicy,
    metrics: MetricsCollector,
    halted: RwLock<HashMap<Route, StatusCode>>,
}

impl Agent {
    /// Build headers and transport from configuration.
    ///
    /// Fails with [`AgentError::Configuration`] before any network activity
    /// if the configuration or token is unusable.
    pub fn init(config: &Config) -> Result<Self> {
        config.check()?;
        let headers = ClientHeaders::build(&config.token, config.user_agent())?;
        let transport = ReqwestTransport::new(&config.base_url, config.request_timeout())?;

        info!(base_url = %config.base_url, "Agent initialized");
        Ok(Self::with_parts(
            headers,
            Arc::new(transport),
            Arc::new(InMemoryBucketStore::new()),
            config.retry_policy(),
        ))
    }

    pub fn with_parts(
        headers: ClientHeaders,
        transport: Arc<dyn Transport>,
        buckets: Arc<dyn BucketStore>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            id: ClientId::new(),
            headers,
            transport,
            buckets,
            policy,
            metrics: MetricsCollector::new(),
            halted: RwLock::new(HashMap::new()),
        }
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn headers(&self) -> &ClientHeaders {
        &self.headers
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    pub fn bucket_store(&self) -> &Arc<dyn BucketStore> {
        &self.buckets
    }

    pub async fn execute(&self, request: Request) -> Result<Response> {
        self.execute_with_cancel(request, &CancellationToken::new())
            .await
    }

    /// Execute and decode the success body as JSON
    pub async fn execute_json<T: DeserializeOwned>(&self, request: Request) -> Result<T> {
        self.execute(request).await?.json()
    }

    /// Execute one logical call to completion.
    ///
    /// Transient responses (5xx, 429 with `retry_after`) are retried here
    /// and never reach the caller. `cancel` is honoured while waiting for
    /// the bucket, during dispatch, and during retry sleeps.
    pub async fn execute_with_cancel(
        &self,
        request: Request,
        cancel: &CancellationToken,
    ) -> Result<Response> {
        let span = info_span!(
            "execute",
            request_id = %Uuid::new_v4(),
            route = %request.route,
            method = %request.method,
        );
        self.run(request, cancel).instrument(span).await
    }

    async fn run(&self, request: Request, cancel: &CancellationToken) -> Result<Response> {
        let route = request.route.clone();
        if let Some(status) = self.halted_status(&route) {
            warn!(status = status.as_u16(), "Route halted by a previous abort, not dispatching");
            return Err(AgentError::RouteHalted { route, status });
        }

        let policy = request.retry_policy.as_ref().unwrap_or(&self.policy);
        let classifier = Classifier::from_policy(policy);
        let mut attempts: u32 = 0;

        loop {
            // Bucket state is re-read on every pass; a retry never skips the gate.
            let bucket = self.buckets.get_or_create(self.id, &route);
            self.buckets.await_cooldown(&bucket, cancel).await?;

            attempts = attempts.saturating_add(1);
            self.metrics.record_attempt(&route).await;
            let response = tokio::select! {
                result = self.transport.perform(&request, &self.headers) => match result {
                    Ok(response) => response,
                    Err(err) => {
                        error!(attempt = attempts, error = %err, "Transport failed");
                        self.metrics.record(&route, Outcome::Failure).await;
                        return Err(err);
                    }
                },
                _ = cancel.cancelled() => {
                    return Err(AgentError::Cancelled { route });
                }
            };

            let status = response.status;
            match classifier.classify(&response) {
                Action::Success => {
                    self.buckets
                        .update_from_response(self.id, &route, &bucket, &response.headers)
                        .await;
                    self.metrics.record(&route, Outcome::Success).await;
                    debug!(
                        status = status.as_u16(),
                        reason = reason(status),
                        attempt = attempts,
                        "Request succeeded"
                    );
                    return Ok(response);
                }
                Action::Retry { wait, cause } => {
                    if cause == RetryCause::RateLimited {
                        let notice = RateLimitNotice::parse(&response.body);
                        self.buckets
                            .update_from_response(self.id, &route, &bucket, &response.headers)
                            .await;
                        self.buckets.get_or_create(self.id, &route).block_for(wait);
                        if !policy.accepts_retry_after(wait) {
                            debug!(
                                wait_ms = wait.as_millis() as u64,
                                cap_ms = ?policy.max_retry_after_value().map(|cap| cap.as_millis() as u64),
                                "Declared retry_after exceeds the configured cap"
                            );
                            return Err(self.abort(&request, &response).await);
                        }
                        info!(
                            wait_ms = wait.as_millis() as u64,
                            global = notice.global,
                            message = %notice.message,
                            "Rate limited"
                        );
                    }

                    if !policy.allows_another(attempts) {
                        warn!(
                            status = status.as_u16(),
                            reason = reason(status),
                            attempts,
                            "Retry budget exhausted"
                        );
                        self.metrics.record(&route, Outcome::Failure).await;
                        return Err(AgentError::RetriesExhausted {
                            route,
                            attempts,
                            last_status: status,
                        });
                    }

                    info!(
                        status = status.as_u16(),
                        reason = reason(status),
                        attempt = attempts,
                        wait_ms = wait.as_millis() as u64,
                        "Retrying request"
                    );
                    self.metrics.record(&route, Outcome::Retry).await;
                    self.pause(&route, wait, cancel).await?;
                }
                Action::Failure => {
                    self.buckets
                        .update_from_response(self.id, &route, &bucket, &response.headers)
                        .await;
                    let info = self.describe_error(&request, &response);
                    warn!(
                        status = status.as_u16(),
                        reason = reason(status),
                        code = info.code,
                        message = %info.message,
                        "Request rejected"
                    );
                    self.metrics.record(&route, Outcome::Failure).await;
                    return Err(AgentError::ClientRejected {
                        route,
                        status,
                        info,
                    });
                }
                Action::Abort => {
                    self.buckets
                        .update_from_response(self.id, &route, &bucket, &response.headers)
                        .await;
                    return Err(self.abort(&request, &response).await);
                }
            }
        }
    }

    /// Terminal abort: decode the error, halt the route, record it.
    async fn abort(&self, request: &Request, response: &Response) -> AgentError {
        let route = request.route.clone();
        let status = response.status;
        let info = self.describe_error(request, response);
        error!(
            status = status.as_u16(),
            reason = reason(status),
            code = info.code,
            message = %info.message,
            "Request aborted, halting route"
        );

        self.write_halted().insert(route.clone(), status);
        self.metrics.record(&route, Outcome::Abort).await;
        AgentError::ProtocolAbort {
            route,
            status,
            info,
        }
    }

    fn describe_error(&self, request: &Request, response: &Response) -> ErrorInfo {
        match &request.error_handler {
            Some(handler) => handler(response.status, &response.body),
            None => ErrorInfo::extract(&response.body),
        }
    }

    async fn pause(&self, route: &Route, wait: Duration, cancel: &CancellationToken) -> Result<()> {
        tokio::select! {
            _ = tokio::time::sleep(wait) => Ok(()),
            _ = cancel.cancelled() => Err(AgentError::Cancelled { route: route.clone() }),
        }
    }

    fn halted_status(&self, route: &Route) -> Option<StatusCode> {
        let halted = match self.halted.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        halted.get(route).copied()
    }

    fn write_halted(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<Route, StatusCode>> {
        match self.halted.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Routes refusing calls until [`Agent::resume_route`]
    pub fn halted_routes(&self) -> Vec<Route> {
        let halted = match self.halted.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        halted.keys().cloned().collect()
    }

    /// Allow calls on a route again after an abort. Returns whether it was halted.
    pub fn resume_route(&self, route: &Route) -> bool {
        let resumed = self.write_halted().remove(route).is_some();
        if resumed {
            info!(route = %route, "Route resumed");
        }
        resumed
    }

    /// Drop this client's buckets idle for longer than `max_idle`
    pub fn sweep_idle_buckets(&self, max_idle: Duration) -> usize {
        let swept = self.buckets.sweep_idle(self.id, max_idle);
        debug!(swept, "Swept idle buckets");
        swept
    }

    /// Sweep idle buckets every `max_idle` until `stop` fires
    pub fn spawn_idle_sweeper(
        self: &Arc<Self>,
        max_idle: Duration,
        stop: CancellationToken,
    ) -> JoinHandle<()> {
        let agent = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticks = tokio::time::interval(max_idle.max(Duration::from_millis(1)));
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticks.tick() => {
                        agent.sweep_idle_buckets(max_idle);
                    }
                    _ = stop.cancelled() => break,
                }
            }
        })
    }

    /// Release the client: sweeps its buckets and drops transport and headers.
    pub fn shutdown(self) -> usize {
        let released = self.buckets.cleanup(self.id);
        info!(client = %self.id, released, "Agent shut down");
        released
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headers::AUTHORIZATION_CAPACITY;

    #[test]
    fn test_init_rejects_oversized_token() {
        let config = Config::with_token("x".repeat(AUTHORIZATION_CAPACITY));
        let result = Agent::init(&config);
        assert!(matches!(result, Err(AgentError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_init_builds_client_headers() {
        let agent = Agent::init(&Config::with_token("abc")).unwrap();
        assert_eq!(agent.headers().len(), 5);
        assert!(agent.halted_routes().is_empty());
        assert_eq!(agent.policy().max_attempts_limit(), None);
        assert_eq!(agent.shutdown(), 0);
    }

    #[tokio::test]
    async fn test_resume_unknown_route() {
        let agent = Agent::init(&Config::with_token("abc")).unwrap();
        assert!(!agent.resume_route(&Route::new("GET /nothing")));
    }
}
