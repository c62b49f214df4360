//! Per-group polling loops.
//!
//! Each group runs one independent loop: snapshot the registry, fan the
//! probes out through a bounded worker pool, fold every result back in,
//! then sleep the group's interval. The enable flags are re-checked at the
//! top of each round only, so stopping is cooperative — an in-flight round
//! always settles before the loop exits.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures::StreamExt;
use futures::stream;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use sondeo::Prober;

use super::alerts::AlertDispatcher;
use super::lock;
use super::registry::Registry;

/// Fallback poll interval for a group that vanished mid-loop.
const FALLBACK_INTERVAL: Duration = Duration::from_secs(5);

/// Spawns and tracks group polling loops.
pub struct Scheduler {
    registry: Arc<Registry>,
    prober: Arc<dyn Prober>,
    dispatcher: Arc<AlertDispatcher>,
    max_concurrent_probes: usize,
    running: Arc<Mutex<HashSet<String>>>,
}

impl Scheduler {
    pub fn new(
        registry: Arc<Registry>,
        prober: Arc<dyn Prober>,
        dispatcher: Arc<AlertDispatcher>,
        max_concurrent_probes: usize,
    ) -> Self {
        Self {
            registry,
            prober,
            dispatcher,
            max_concurrent_probes: max_concurrent_probes.max(1),
            running: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Spawn the polling loop for `group`, unless one is already live —
    /// at most one loop per group, so repeated start requests are
    /// idempotent.
    pub fn spawn_group(&self, group: &str) -> Option<JoinHandle<()>> {
        if !lock(&self.running).insert(group.to_string()) {
            debug!(group, "poll loop already running");
            return None;
        }

        let group = group.to_string();
        let registry = Arc::clone(&self.registry);
        let prober = Arc::clone(&self.prober);
        let dispatcher = Arc::clone(&self.dispatcher);
        let running = Arc::clone(&self.running);
        let cap = self.max_concurrent_probes;

        Some(tokio::spawn(async move {
            info!(group = %group, "poll loop started");
            loop {
                // Flags are observed only here, at the round boundary.
                if !registry.is_active(&group) {
                    break;
                }

                let hosts = registry.snapshot(&group);
                let results: Vec<_> = stream::iter(hosts)
                    .map(|host| {
                        let prober = Arc::clone(&prober);
                        async move {
                            let reachable = prober.probe(host.address).await;
                            (host, reachable)
                        }
                    })
                    .buffer_unordered(cap)
                    .collect()
                    .await;

                // Fold the whole round in before sleeping, so queries
                // between rounds never see a half-settled round.
                let now = Instant::now();
                for (host, reachable) in results {
                    if let Some(alert) = registry.record_result(&group, host.address, reachable, now)
                    {
                        dispatcher.enqueue(alert);
                    }
                }

                let interval = registry.group_interval(&group).unwrap_or(FALLBACK_INTERVAL);
                tokio::time::sleep(interval).await;
            }
            info!(group = %group, "poll loop stopped");
            lock(&running).remove(&group);
        }))
    }

    /// Spawn loops for every currently enabled group; returns how many
    /// were newly started.
    pub fn spawn_enabled(&self) -> usize {
        self.registry
            .enabled_groups()
            .iter()
            .filter(|group| self.spawn_group(group).is_some())
            .count()
    }

    pub fn is_running(&self, group: &str) -> bool {
        lock(&self.running).contains(group)
    }
}
