//! Ticker: the fixed-period scheduler that drives every registered Canary forward.
//!
//! Per-key tick serialization uses a `DashMap<CanaryKey, Arc<Mutex<()>>>` with `try_lock`; a key
//! whose previous tick has not finished is skipped for this period rather than queued.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::engine::RolloutEngine;
use crate::server::{LeaderState, ShutdownSignal, SharedMetrics};

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct CanaryKey {
    pub namespace: String,
    pub name: String,
}

impl CanaryKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

/// The set of Canaries the Ticker drives. Populated by the external reconciler (out of scope);
/// the Ticker only ever reads a snapshot of it.
#[derive(Clone, Default)]
pub struct Registry {
    keys: Arc<DashMap<CanaryKey, ()>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: CanaryKey) {
        self.keys.insert(key, ());
    }

    pub fn remove(&self, key: &CanaryKey) {
        self.keys.remove(key);
    }

    fn snapshot(&self) -> Vec<CanaryKey> {
        self.keys.iter().map(|entry| entry.key().clone()).collect()
    }
}

pub struct Ticker {
    engine: Arc<RolloutEngine>,
    registry: Registry,
    period: Duration,
    locks: Arc<DashMap<CanaryKey, Arc<Mutex<()>>>>,
    leader: LeaderState,
    metrics: SharedMetrics,
}

impl Ticker {
    pub fn new(
        engine: Arc<RolloutEngine>,
        registry: Registry,
        period: Duration,
        leader: LeaderState,
        metrics: SharedMetrics,
    ) -> Self {
        Self {
            engine,
            registry,
            period,
            locks: Arc::new(DashMap::new()),
            leader,
            metrics,
        }
    }

    /// Runs periods until `shutdown` fires. Each period snapshots the registry and spawns one
    /// independent task per key; keys whose previous tick is still running are skipped.
    pub async fn run(&self, mut shutdown: ShutdownSignal) {
        let mut interval = tokio::time::interval(self.period);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.run_one_period().await;
                }
                _ = shutdown.wait() => {
                    info!("ticker stopping: shutdown signal received");
                    return;
                }
            }
        }
    }

    async fn run_one_period(&self) {
        if !self.leader.is_leader() {
            debug!("not leader, skipping tick period");
            self.metrics.record_tick_skipped();
            return;
        }

        let keys = self.registry.snapshot();
        debug!(count = keys.len(), "starting tick period");

        let mut handles = Vec::with_capacity(keys.len());
        for key in keys {
            let lock = self
                .locks
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone();
            let engine = self.engine.clone();
            let metrics = self.metrics.clone();
            handles.push(tokio::spawn(async move {
                let Ok(_guard) = lock.try_lock() else {
                    debug!(namespace = %key.namespace, name = %key.name, "skipping tick, previous still running");
                    return;
                };
                let started = Instant::now();
                match engine.advance(&key.name, &key.namespace).await {
                    Ok(outcome) => {
                        debug!(namespace = %key.namespace, name = %key.name, ?outcome, "tick completed");
                        metrics.record_tick_success(started.elapsed().as_secs_f64());
                    }
                    Err(e) => {
                        warn!(namespace = %key.namespace, name = %key.name, error = %e, "tick ended in error");
                        metrics.record_tick_error(started.elapsed().as_secs_f64());
                    }
                }
            }));
        }

        for handle in handles {
            let _ = handle.await;
        }
    }

    #[cfg(test)]
    fn lock_for(&self, key: &CanaryKey) -> Arc<Mutex<()>> {
        self.locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[cfg(test)]
#[path = "ticker_test.rs"]
mod tests;
