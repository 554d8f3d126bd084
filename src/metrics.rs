use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::route::Route;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteMetrics {
    pub attempts: u64,
    pub successes: u64,
    pub retries: u64,
    pub failures: u64,
    pub aborts: u64,
}

/// Terminal or intermediate outcome recorded for a route
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Retry,
    Failure,
    Abort,
}

#[derive(Debug, Clone, Default)]
pub struct MetricsCollector {
    routes: Arc<RwLock<HashMap<Route, RouteMetrics>>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record_attempt(&self, route: &Route) {
        let mut routes = self.routes.write().await;
        routes.entry(route.clone()).or_default().attempts += 1;
    }

    pub async fn record(&self, route: &Route, outcome: Outcome) {
        let mut routes = self.routes.write().await;
        let metrics = routes.entry(route.clone()).or_default();

        match outcome {
            Outcome::Success => metrics.successes += 1,
            Outcome::Retry => metrics.retries += 1,
            Outcome::Failure => metrics.failures += 1,
            Outcome::Abort => metrics.aborts += 1,
        }
    }

    pub async fn get_route_metrics(&self, route: &Route) -> Option<RouteMetrics> {
        let routes = self.routes.read().await;
        routes.get(route).cloned()
    }

    pub async fn get_all_metrics(&self) -> HashMap<Route, RouteMetrics> {
        let routes = self.routes.read().await;
        routes.clone()
    }

    pub async fn get_global_metrics(&self) -> RouteMetrics {
        let routes = self.routes.read().await;
        let mut global = RouteMetrics::default();

        for metrics in routes.values() {
            global.attempts += metrics.attempts;
            global.successes += metrics.successes;
            global.retries += metrics.retries;
            global.failures += metrics.failures;
            global.aborts += metrics.aborts;
        }

        global
    }

    pub async fn reset(&self) {
        self.routes.write().await.clear();
    }
}
