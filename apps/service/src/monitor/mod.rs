//! The monitoring engine.
//!
//! Wires the host registry, group schedulers, alert dispatcher and the
//! persistence store behind the small command API the control plane talks
//! to: start/stop, group toggles, host add/remove, state queries and the
//! alert subscription seam.

pub mod alerts;
pub mod error;
pub mod registry;
pub mod scheduler;
pub mod types;

pub use alerts::{AlertDispatcher, SubscriberId};
pub use error::MonitorError;
pub use registry::Registry;
pub use types::{Host, HostFilter, HostListing, StatusReport};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tracing::error;

use sondeo::Prober;

use crate::config::Config;
use crate::store::HostStore;
use scheduler::Scheduler;

/// Lock a mutex, recovering the data if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The monitoring engine and its control-plane command surface.
pub struct Monitor {
    registry: Arc<Registry>,
    dispatcher: Arc<AlertDispatcher>,
    scheduler: Scheduler,
    store: HostStore,
}

impl Monitor {
    /// Build the engine: merge the persisted snapshot over the configured
    /// seed hosts, then register every configured group.
    pub fn new(config: &Config, store: HostStore, prober: Arc<dyn Prober>) -> Self {
        let merged = store.load(config.seed_groups());

        let registry = Arc::new(Registry::new(config.debounce_policy()));
        for (name, group) in &config.groups {
            let hosts = merged.get(name).cloned().unwrap_or_default();
            registry.load_group(name, group.interval(), &hosts);
        }

        let dispatcher = Arc::new(AlertDispatcher::new());
        let scheduler = Scheduler::new(
            Arc::clone(&registry),
            prober,
            Arc::clone(&dispatcher),
            config.monitor.max_concurrent_probes,
        );

        Self { registry, dispatcher, scheduler, store }
    }

    /// Raise the global flag and spawn a loop for every enabled group.
    /// Returns how many loops were newly started.
    pub fn start_monitoring(&self) -> usize {
        self.registry.set_global_enabled(true);
        self.scheduler.spawn_enabled()
    }

    /// Lower the global flag. Loops observe it at their next round
    /// boundary and exit after the in-flight round settles.
    pub fn stop_monitoring(&self) {
        self.registry.set_global_enabled(false);
    }

    /// Flip a group's enabled flag; if monitoring is globally on and the
    /// group just became enabled, its loop is (re)started.
    pub fn toggle_group(&self, group: &str) -> Result<bool, MonitorError> {
        let enabled = self.registry.toggle_group(group)?;
        if enabled && self.registry.global_enabled() {
            self.scheduler.spawn_group(group);
        }
        Ok(enabled)
    }

    /// Add a host and persist the registry.
    ///
    /// A persistence failure is returned to the caller, but the in-memory
    /// addition stands; the snapshot is retried on the next mutation.
    pub fn add_host(&self, group: &str, address: &str, name: &str) -> Result<Host, MonitorError> {
        let host = self.registry.add_host(group, address, name)?;
        self.persist()?;
        Ok(host)
    }

    /// Remove a host and persist the registry. Same persistence contract
    /// as [`Monitor::add_host`].
    pub fn remove_host(&self, group: &str, address: &str) -> Result<(), MonitorError> {
        self.registry.remove_host(group, address)?;
        self.persist()
    }

    pub fn list_hosts(&self, filter: HostFilter) -> Vec<HostListing> {
        self.registry.list_hosts(filter)
    }

    pub fn group_status(&self) -> StatusReport {
        self.registry.status()
    }

    pub fn subscribe(&self) -> (SubscriberId, mpsc::UnboundedReceiver<String>) {
        self.dispatcher.subscribe()
    }

    pub fn unsubscribe(&self, id: SubscriberId) {
        self.dispatcher.unsubscribe(id);
    }

    fn persist(&self) -> Result<(), MonitorError> {
        self.store.save(&self.registry.persistable()).map_err(|e| {
            error!(error = %e, "failed to persist host registry");
            MonitorError::from(e)
        })
    }
}
