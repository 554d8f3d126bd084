//! Per-route cooldown tracking shared by every call of a client.

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{AgentError, Result};
use crate::route::Route;
use crate::token_bucket::{RateLimitHeaders, TokenBucket};

/// Owner of a set of buckets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(Uuid);

impl ClientId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// One rate-limit bucket, possibly shared by several routes
#[derive(Debug)]
pub struct Bucket {
    route: Route,
    gate: tokio::sync::Mutex<()>,
    state: Mutex<TokenBucket>,
}

pub type BucketHandle = Arc<Bucket>;

impl Bucket {
    pub fn new(route: Route) -> Self {
        Self {
            route,
            gate: tokio::sync::Mutex::new(()),
            state: Mutex::new(TokenBucket::new(Instant::now())),
        }
    }

    /// Route that created the bucket
    pub fn route(&self) -> &Route {
        &self.route
    }

    pub fn snapshot(&self) -> TokenBucket {
        self.lock_state().clone()
    }

    pub fn is_cooling_down(&self) -> bool {
        self.lock_state().is_cooling_down(Instant::now())
    }

    /// Force a cooldown of exactly `wait`; a server-declared retry_after
    /// overrides whatever the headers suggested
    pub fn block_for(&self, wait: Duration) {
        self.lock_state().block_for(wait, Instant::now());
    }

    pub fn apply(&self, headers: &RateLimitHeaders) {
        self.lock_state().apply(headers, Instant::now());
    }

    fn lock_state(&self) -> MutexGuard<'_, TokenBucket> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Wait out any cooldown, then take one request from the estimate.
    ///
    /// Waiters are admitted one at a time so a burst released by a reset
    /// is paced through the refreshed counters.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<()> {
        let _gate = tokio::select! {
            guard = self.gate.lock() => guard,
            _ = cancel.cancelled() => {
                return Err(AgentError::Cancelled { route: self.route.clone() });
            }
        };

        loop {
            let until = self.lock_state().cooldown_until(Instant::now());
            let Some(until) = until else {
                self.lock_state().consume(Instant::now());
                return Ok(());
            };

            info!(
                route = %self.route,
                wait_ms = until.saturating_duration_since(Instant::now()).as_millis() as u64,
                "Bucket cooling down"
            );
            tokio::select! {
                _ = tokio::time::sleep_until(until) => {}
                _ = cancel.cancelled() => {
                    return Err(AgentError::Cancelled { route: self.route.clone() });
                }
            }
        }
    }
}

/// Contract the agent needs from a bucket tracker
#[async_trait]
pub trait BucketStore: Send + Sync {
    /// Bucket for a route, created on first use
    fn get_or_create(&self, client: ClientId, route: &Route) -> BucketHandle;

    /// Block until the bucket is not cooling down
    async fn await_cooldown(&self, handle: &BucketHandle, cancel: &CancellationToken) -> Result<()>;

    /// Refresh bucket state from a response's rate-limit headers
    async fn update_from_response(
        &self,
        client: ClientId,
        route: &Route,
        handle: &BucketHandle,
        headers: &HeaderMap,
    );

    /// Drop every bucket owned by `client`, returning how many went away
    fn cleanup(&self, client: ClientId) -> usize;

    /// Drop `client`'s buckets idle for longer than `max_idle`
    fn sweep_idle(&self, client: ClientId, max_idle: Duration) -> usize;

    fn bucket_count(&self) -> usize;
}

#[derive(Default)]
struct Indexes {
    routes: HashMap<(ClientId, Route), BucketHandle>,
    hashes: HashMap<(ClientId, String), BucketHandle>,
}

/// In-process bucket store
#[derive(Default, Clone)]
pub struct InMemoryBucketStore {
    indexes: Arc<RwLock<Indexes>>,
}

impl InMemoryBucketStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Indexes> {
        match self.indexes.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, Indexes> {
        match self.indexes.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Bucket currently serving `route`, without creating one
    pub fn lookup(&self, client: ClientId, route: &Route) -> Option<BucketHandle> {
        self.read().routes.get(&(client, route.clone())).cloned()
    }

    /// Resolve the bucket a response should update, linking the route to
    /// the shared bucket when the server names one.
    fn link(&self, client: ClientId, route: &Route, handle: &BucketHandle, hash: &str) -> BucketHandle {
        let mut indexes = self.write();
        let shared = indexes
            .hashes
            .entry((client, hash.to_string()))
            .or_insert_with(|| handle.clone())
            .clone();

        if !Arc::ptr_eq(&shared, handle) {
            debug!(route = %route, bucket = %hash, "Linking route to shared bucket");
            indexes.routes.insert((client, route.clone()), shared.clone());
        }
        shared
    }
}

#[async_trait]
impl BucketStore for InMemoryBucketStore {
    fn get_or_create(&self, client: ClientId, route: &Route) -> BucketHandle {
        if let Some(handle) = self.lookup(client, route) {
            return handle;
        }

        self.write()
            .routes
            .entry((client, route.clone()))
            .or_insert_with(|| Arc::new(Bucket::new(route.clone())))
            .clone()
    }

    async fn await_cooldown(&self, handle: &BucketHandle, cancel: &CancellationToken) -> Result<()> {
        handle.acquire(cancel).await
    }

    async fn update_from_response(
        &self,
        client: ClientId,
        route: &Route,
        handle: &BucketHandle,
        headers: &HeaderMap,
    ) {
        let parsed = RateLimitHeaders::parse(headers);
        if parsed.is_empty() {
            return;
        }

        let target = match parsed.bucket.as_deref() {
            Some(hash) => self.link(client, route, handle, hash),
            None => handle.clone(),
        };
        target.apply(&parsed);

        debug!(
            route = %route,
            limit = ?parsed.limit,
            remaining = ?parsed.remaining,
            reset_after_ms = ?parsed.reset_after.map(|d| d.as_millis()),
            "Bucket updated"
        );
    }

    fn cleanup(&self, client: ClientId) -> usize {
        let mut indexes = self.write();
        let before = indexes.routes.len();
        indexes.routes.retain(|(owner, _), _| *owner != client);
        indexes.hashes.retain(|(owner, _), _| *owner != client);
        before - indexes.routes.len()
    }

    fn sweep_idle(&self, client: ClientId, max_idle: Duration) -> usize {
        let now = Instant::now();
        let keep = |owner: &ClientId, handle: &BucketHandle| {
            if *owner != client {
                return true;
            }
            let mut state = handle.lock_state();
            state.is_cooling_down(now) || now.saturating_duration_since(state.last_used()) < max_idle
        };

        let mut indexes = self.write();
        let before = indexes.routes.len();
        indexes.routes.retain(|(owner, _), handle| keep(owner, &*handle));
        indexes.hashes.retain(|(owner, _), handle| keep(owner, &*handle));
        before - indexes.routes.len()
    }

    fn bucket_count(&self) -> usize {
        self.read().routes.len()
    }
}
