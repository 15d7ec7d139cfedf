use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;

use ghostgate_core::api::AppContext;
use tokio::sync::broadcast;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub ctx: AppContext,
    pub stats: Arc<RwLock<ServerStats>>,
    pub shutdown_tx: broadcast::Sender<()>,
}

impl AppState {
    pub fn new(ctx: AppContext, shutdown_tx: broadcast::Sender<()>) -> Self {
        Self {
            ctx,
            stats: Arc::new(RwLock::new(ServerStats::new())),
            shutdown_tx,
        }
    }

    pub fn record_request(&self, route: &'static str) {
        self.stats
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .increment_request(route);
    }

    pub fn record_error(&self) {
        self.stats
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .increment_error();
    }
}

#[derive(Debug)]
pub struct ServerStats {
    started: Instant,
    pub requests_total: u64,
    pub errors_total: u64,
    pub by_route: HashMap<&'static str, u64>,
}

impl ServerStats {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            requests_total: 0,
            errors_total: 0,
            by_route: HashMap::new(),
        }
    }

    pub fn increment_request(&mut self, route: &'static str) {
        self.requests_total += 1;
        *self.by_route.entry(route).or_default() += 1;
    }

    pub fn increment_error(&mut self) {
        self.errors_total += 1;
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started.elapsed().as_secs()
    }
}

impl Default for ServerStats {
    fn default() -> Self {
        Self::new()
    }
}
