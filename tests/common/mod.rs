#![allow(dead_code)]

use api_agent::bucket::{BucketHandle, BucketStore, ClientId, InMemoryBucketStore};
use api_agent::{Agent, ClientHeaders, Request, Response, Result, RetryPolicy, Route, Transport};
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub fn response(status: u16, body: &str) -> Response {
    Response::new(
        StatusCode::from_u16(status).unwrap(),
        HeaderMap::new(),
        body.as_bytes().to_vec(),
    )
}

pub fn with_headers(mut response: Response, pairs: &[(&'static str, &str)]) -> Response {
    for (name, value) in pairs {
        response.headers.insert(*name, value.parse().unwrap());
    }
    response
}

/// Replays canned responses; the last one repeats forever
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Result<Response>>>,
    last: Mutex<Option<Response>>,
    calls: Mutex<Vec<(Instant, String)>>,
}

impl ScriptedTransport {
    pub fn new(script: Vec<Response>) -> Arc<Self> {
        Self::with_results(script.into_iter().map(Ok).collect())
    }

    pub fn with_results(script: Vec<Result<Response>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().iter().map(|(at, _)| *at).collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn perform(&self, request: &Request, headers: &ClientHeaders) -> Result<Response> {
        assert_eq!(headers.len(), 5);
        self.calls
            .lock()
            .unwrap()
            .push((Instant::now(), request.path.clone()));

        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Ok(response)) => {
                *self.last.lock().unwrap() = Some(response.clone());
                Ok(response)
            }
            Some(Err(err)) => Err(err),
            None => Ok(self
                .last
                .lock()
                .unwrap()
                .clone()
                .expect("script must not be empty")),
        }
    }
}

/// In-memory store that records when buckets were updated
#[derive(Default)]
pub struct RecordingStore {
    inner: InMemoryBucketStore,
    updates: Mutex<Vec<Instant>>,
    acquisitions: Mutex<Vec<Instant>>,
}

impl RecordingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn update_times(&self) -> Vec<Instant> {
        self.updates.lock().unwrap().clone()
    }

    pub fn acquisition_count(&self) -> usize {
        self.acquisitions.lock().unwrap().len()
    }
}

#[async_trait]
impl BucketStore for RecordingStore {
    fn get_or_create(&self, client: ClientId, route: &Route) -> BucketHandle {
        self.inner.get_or_create(client, route)
    }

    async fn await_cooldown(&self, handle: &BucketHandle, cancel: &CancellationToken) -> Result<()> {
        let result = self.inner.await_cooldown(handle, cancel).await;
        self.acquisitions.lock().unwrap().push(Instant::now());
        result
    }

    async fn update_from_response(
        &self,
        client: ClientId,
        route: &Route,
        handle: &BucketHandle,
        headers: &HeaderMap,
    ) {
        self.updates.lock().unwrap().push(Instant::now());
        self.inner
            .update_from_response(client, route, handle, headers)
            .await;
    }

    fn cleanup(&self, client: ClientId) -> usize {
        self.inner.cleanup(client)
    }

    fn sweep_idle(&self, client: ClientId, max_idle: Duration) -> usize {
        self.inner.sweep_idle(client, max_idle)
    }

    fn bucket_count(&self) -> usize {
        self.inner.bucket_count()
    }
}

pub fn agent(
    transport: Arc<ScriptedTransport>,
    store: Arc<RecordingStore>,
    policy: RetryPolicy,
) -> Agent {
    let headers = ClientHeaders::build("abc", "agent-tests").unwrap();
    Agent::with_parts(headers, transport, store, policy)
}
