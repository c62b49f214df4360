//! The host registry: single synchronized owner of all group, host and
//! debounce state. Every read or mutation happens under one lock, and the
//! lock is never held across a network call — schedulers take a snapshot,
//! probe outside the lock, then fold results back in.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use super::alerts::{AlertEvent, AlertKind};
use super::error::MonitorError;
use super::lock;
use super::types::{
    DebouncePolicy, GroupStatus, Host, HostFilter, HostListing, HostState, StatusReport,
};
use crate::store::GroupHosts;

struct GroupState {
    enabled: bool,
    interval: Duration,
    hosts: BTreeMap<IpAddr, String>,
    states: BTreeMap<IpAddr, HostState>,
}

struct Inner {
    global_enabled: bool,
    groups: BTreeMap<String, GroupState>,
}

/// Synchronized in-memory store of groups, hosts and their debounce state.
///
/// The global monitoring flag and per-group enabled flags live inside the
/// same lock, so scheduler loops and the control plane never see torn
/// reads.
pub struct Registry {
    policy: DebouncePolicy,
    inner: Mutex<Inner>,
}

impl Registry {
    pub fn new(policy: DebouncePolicy) -> Self {
        Self {
            policy,
            inner: Mutex::new(Inner { global_enabled: false, groups: BTreeMap::new() }),
        }
    }

    /// Register a group with its poll interval and initial host map
    /// (merged seed + persisted set). Entries whose key is not a valid IP
    /// literal are skipped with a warning rather than poisoning startup.
    pub fn load_group(&self, name: &str, interval: Duration, hosts: &BTreeMap<String, String>) {
        let mut parsed = BTreeMap::new();
        for (raw, display) in hosts {
            match raw.parse::<IpAddr>() {
                Ok(addr) => {
                    parsed.insert(addr, display.clone());
                }
                Err(_) => warn!(group = name, address = %raw, "skipping malformed host entry"),
            }
        }
        let states = parsed.keys().map(|addr| (*addr, HostState::fresh())).collect();
        lock(&self.inner).groups.insert(
            name.to_string(),
            GroupState { enabled: true, interval, hosts: parsed, states },
        );
    }

    pub fn add_host(&self, group: &str, address: &str, name: &str) -> Result<Host, MonitorError> {
        let address: IpAddr = address
            .trim()
            .parse()
            .map_err(|_| MonitorError::InvalidAddress(address.to_string()))?;
        let name = name.trim();
        if name.is_empty() || name.chars().count() > 50 {
            return Err(MonitorError::InvalidName);
        }

        let mut inner = lock(&self.inner);
        let group_state = inner
            .groups
            .get_mut(group)
            .ok_or_else(|| MonitorError::UnknownGroup(group.to_string()))?;
        if group_state.hosts.contains_key(&address) {
            return Err(MonitorError::DuplicateHost(address, group.to_string()));
        }
        group_state.hosts.insert(address, name.to_string());
        group_state.states.insert(address, HostState::fresh());
        info!(group, %address, name, "host added");
        Ok(Host { address, name: name.to_string() })
    }

    pub fn remove_host(&self, group: &str, address: &str) -> Result<(), MonitorError> {
        let address: IpAddr = address
            .trim()
            .parse()
            .map_err(|_| MonitorError::InvalidAddress(address.to_string()))?;

        let mut inner = lock(&self.inner);
        let group_state = inner
            .groups
            .get_mut(group)
            .ok_or_else(|| MonitorError::UnknownGroup(group.to_string()))?;
        if group_state.hosts.remove(&address).is_none() {
            return Err(MonitorError::HostNotFound(address, group.to_string()));
        }
        group_state.states.remove(&address);
        info!(group, %address, "host removed");
        Ok(())
    }

    /// Ordered copy of a group's hosts; empty for an unknown group. The
    /// caller probes against this copy without holding the lock.
    pub fn snapshot(&self, group: &str) -> Vec<Host> {
        lock(&self.inner)
            .groups
            .get(group)
            .map(|g| {
                g.hosts
                    .iter()
                    .map(|(addr, name)| Host { address: *addr, name: name.clone() })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn group_interval(&self, group: &str) -> Option<Duration> {
        lock(&self.inner).groups.get(group).map(|g| g.interval)
    }

    /// Fold one probe result into the host's debounce state.
    ///
    /// Returns the alert that must be enqueued, if the result caused a
    /// transition. A result for a host removed between snapshot and
    /// fold-in is stale and dropped silently.
    pub fn record_result(
        &self,
        group: &str,
        address: IpAddr,
        reachable: bool,
        now: Instant,
    ) -> Option<AlertEvent> {
        let mut inner = lock(&self.inner);
        let group_state = inner.groups.get_mut(group)?;
        let name = group_state.hosts.get(&address)?.clone();
        let state = group_state.states.get_mut(&address)?;

        if reachable {
            let was_down = !state.alive;
            state.consecutive_failures = 0;
            if was_down {
                state.alive = true;
                state.last_alert_at = Some(now);
                info!(group, %address, "host recovered");
                return Some(AlertEvent::new(AlertKind::Recovered, group, address, name));
            }
            return None;
        }

        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        if state.consecutive_failures < self.policy.failure_threshold {
            // Sub-threshold failures are absorbed silently.
            return None;
        }

        if state.alive {
            state.alive = false;
            state.last_alert_at = Some(now);
            warn!(
                group, %address,
                failures = state.consecutive_failures,
                "host declared down"
            );
            return Some(AlertEvent::new(AlertKind::Down, group, address, name));
        }

        // Already down: re-alert only once per cooldown window.
        match state.last_alert_at {
            Some(last) if now.duration_since(last) < self.policy.persistent_cooldown => None,
            _ => {
                state.last_alert_at = Some(now);
                warn!(group, %address, "host still down");
                Some(AlertEvent::new(AlertKind::PersistentDown, group, address, name))
            }
        }
    }

    pub fn set_global_enabled(&self, enabled: bool) {
        lock(&self.inner).global_enabled = enabled;
    }

    pub fn global_enabled(&self) -> bool {
        lock(&self.inner).global_enabled
    }

    pub fn set_group_enabled(&self, group: &str, enabled: bool) -> Result<(), MonitorError> {
        let mut inner = lock(&self.inner);
        let group_state = inner
            .groups
            .get_mut(group)
            .ok_or_else(|| MonitorError::UnknownGroup(group.to_string()))?;
        group_state.enabled = enabled;
        Ok(())
    }

    /// Flip a group's enabled flag, returning the new value.
    pub fn toggle_group(&self, group: &str) -> Result<bool, MonitorError> {
        let mut inner = lock(&self.inner);
        let group_state = inner
            .groups
            .get_mut(group)
            .ok_or_else(|| MonitorError::UnknownGroup(group.to_string()))?;
        group_state.enabled = !group_state.enabled;
        Ok(group_state.enabled)
    }

    /// Whether a scheduler round may start: global flag AND group flag,
    /// read under one lock acquisition.
    pub fn is_active(&self, group: &str) -> bool {
        let inner = lock(&self.inner);
        inner.global_enabled && inner.groups.get(group).map(|g| g.enabled).unwrap_or(false)
    }

    pub fn group_names(&self) -> Vec<String> {
        lock(&self.inner).groups.keys().cloned().collect()
    }

    pub fn enabled_groups(&self) -> Vec<String> {
        lock(&self.inner)
            .groups
            .iter()
            .filter(|(_, g)| g.enabled)
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn list_hosts(&self, filter: HostFilter) -> Vec<HostListing> {
        let inner = lock(&self.inner);
        let mut out = Vec::new();
        for (group, group_state) in &inner.groups {
            for (addr, name) in &group_state.hosts {
                let alive = group_state.states.get(addr).map(|s| s.alive).unwrap_or(true);
                let keep = match filter {
                    HostFilter::All => true,
                    HostFilter::Alive => alive,
                    HostFilter::Down => !alive,
                };
                if keep {
                    out.push(HostListing {
                        group: group.clone(),
                        address: *addr,
                        name: name.clone(),
                        alive,
                    });
                }
            }
        }
        out
    }

    pub fn status(&self) -> StatusReport {
        let inner = lock(&self.inner);
        let groups = inner
            .groups
            .iter()
            .map(|(name, g)| GroupStatus {
                name: name.clone(),
                enabled: g.enabled,
                alive: g.states.values().filter(|s| s.alive).count(),
                total: g.states.len(),
            })
            .collect();
        StatusReport { global_enabled: inner.global_enabled, groups }
    }

    /// Address→name maps per group, as persisted (runtime state excluded).
    pub fn persistable(&self) -> GroupHosts {
        lock(&self.inner)
            .groups
            .iter()
            .map(|(name, g)| {
                let hosts =
                    g.hosts.iter().map(|(addr, n)| (addr.to_string(), n.clone())).collect();
                (name.clone(), hosts)
            })
            .collect()
    }

    #[cfg(test)]
    pub(crate) fn host_state(&self, group: &str, address: IpAddr) -> Option<HostState> {
        lock(&self.inner).groups.get(group)?.states.get(&address).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDR: &str = "10.0.0.1";

    fn test_registry(policy: DebouncePolicy) -> Registry {
        let registry = Registry::new(policy);
        let mut hosts = BTreeMap::new();
        hosts.insert(ADDR.to_string(), "web-01".to_string());
        registry.load_group("servers", Duration::from_secs(5), &hosts);
        registry
    }

    fn addr() -> IpAddr {
        ADDR.parse().unwrap()
    }

    #[test]
    fn down_alert_fires_exactly_at_threshold() {
        let registry = test_registry(DebouncePolicy::default());
        let now = Instant::now();

        for _ in 0..4 {
            assert!(registry.record_result("servers", addr(), false, now).is_none());
        }
        let alert = registry.record_result("servers", addr(), false, now).expect("down alert");
        assert_eq!(alert.kind, AlertKind::Down);
        assert!(!registry.host_state("servers", addr()).unwrap().alive);
    }

    #[test]
    fn persistent_alert_respects_cooldown() {
        let policy =
            DebouncePolicy { failure_threshold: 5, persistent_cooldown: Duration::from_secs(600) };
        let registry = test_registry(policy);
        let t0 = Instant::now();

        for _ in 0..5 {
            registry.record_result("servers", addr(), false, t0);
        }
        // 100 s later, still inside the cooldown window.
        let t1 = t0 + Duration::from_secs(100);
        assert!(registry.record_result("servers", addr(), false, t1).is_none());
        // 650 s after the first alert: one persistent alert.
        let t2 = t0 + Duration::from_secs(650);
        let alert = registry.record_result("servers", addr(), false, t2).expect("persistent");
        assert_eq!(alert.kind, AlertKind::PersistentDown);
        // And the window restarts from t2.
        let t3 = t2 + Duration::from_secs(100);
        assert!(registry.record_result("servers", addr(), false, t3).is_none());
    }

    #[test]
    fn success_resets_failures_without_alert() {
        let registry = test_registry(DebouncePolicy::default());
        let now = Instant::now();

        for _ in 0..3 {
            registry.record_result("servers", addr(), false, now);
        }
        assert!(registry.record_result("servers", addr(), true, now).is_none());
        let state = registry.host_state("servers", addr()).unwrap();
        assert!(state.alive);
        assert_eq!(state.consecutive_failures, 0);
    }

    #[test]
    fn recovery_fires_exactly_once() {
        let registry = test_registry(DebouncePolicy::default());
        let now = Instant::now();

        for _ in 0..5 {
            registry.record_result("servers", addr(), false, now);
        }
        let alert = registry.record_result("servers", addr(), true, now).expect("recovered");
        assert_eq!(alert.kind, AlertKind::Recovered);
        // A second success is just steady state.
        assert!(registry.record_result("servers", addr(), true, now).is_none());
        assert_eq!(registry.host_state("servers", addr()).unwrap().consecutive_failures, 0);
    }

    #[test]
    fn readd_after_remove_yields_fresh_state() {
        let registry = test_registry(DebouncePolicy::default());
        let now = Instant::now();

        for _ in 0..5 {
            registry.record_result("servers", addr(), false, now);
        }
        registry.remove_host("servers", ADDR).unwrap();
        registry.add_host("servers", ADDR, "web-01").unwrap();

        let state = registry.host_state("servers", addr()).unwrap();
        assert!(state.alive);
        assert_eq!(state.consecutive_failures, 0);
        assert!(state.last_alert_at.is_none());
    }

    #[test]
    fn add_host_validates_before_mutating() {
        let registry = test_registry(DebouncePolicy::default());

        assert!(matches!(
            registry.add_host("servers", "not-an-ip", "X"),
            Err(MonitorError::InvalidAddress(_))
        ));
        assert!(matches!(registry.add_host("servers", "10.0.0.2", ""), Err(MonitorError::InvalidName)));
        let long = "x".repeat(51);
        assert!(matches!(
            registry.add_host("servers", "10.0.0.2", &long),
            Err(MonitorError::InvalidName)
        ));
        assert!(matches!(
            registry.add_host("servers", ADDR, "dup"),
            Err(MonitorError::DuplicateHost(_, _))
        ));
        assert!(matches!(
            registry.add_host("nope", "10.0.0.2", "X"),
            Err(MonitorError::UnknownGroup(_))
        ));
        // Nothing leaked into the registry.
        assert_eq!(registry.snapshot("servers").len(), 1);
    }

    #[test]
    fn remove_missing_host_is_an_error() {
        let registry = test_registry(DebouncePolicy::default());
        assert!(matches!(
            registry.remove_host("servers", "10.0.0.99"),
            Err(MonitorError::HostNotFound(_, _))
        ));
    }

    #[test]
    fn list_hosts_filters_on_liveness() {
        let registry = test_registry(DebouncePolicy::default());
        registry.add_host("servers", "10.0.0.2", "web-02").unwrap();
        let now = Instant::now();
        for _ in 0..5 {
            registry.record_result("servers", addr(), false, now);
        }

        let down = registry.list_hosts(HostFilter::Down);
        assert_eq!(down.len(), 1);
        assert_eq!(down[0].address, addr());

        let alive = registry.list_hosts(HostFilter::Alive);
        assert_eq!(alive.len(), 1);
        assert_eq!(alive[0].name, "web-02");

        assert_eq!(registry.list_hosts(HostFilter::All).len(), 2);
    }

    #[test]
    fn stale_result_for_removed_host_is_dropped() {
        let registry = test_registry(DebouncePolicy::default());
        registry.remove_host("servers", ADDR).unwrap();
        assert!(registry.record_result("servers", addr(), false, Instant::now()).is_none());
    }

    #[test]
    fn is_active_requires_both_flags() {
        let registry = test_registry(DebouncePolicy::default());
        assert!(!registry.is_active("servers"));
        registry.set_global_enabled(true);
        assert!(registry.is_active("servers"));
        assert!(!registry.toggle_group("servers").unwrap());
        assert!(!registry.is_active("servers"));
        assert!(registry.toggle_group("servers").unwrap());
        assert!(registry.is_active("servers"));
        assert!(!registry.is_active("no-such-group"));
    }

    #[test]
    fn status_counts_alive_hosts() {
        let registry = test_registry(DebouncePolicy::default());
        registry.add_host("servers", "10.0.0.2", "web-02").unwrap();
        let now = Instant::now();
        for _ in 0..5 {
            registry.record_result("servers", addr(), false, now);
        }

        let report = registry.status();
        assert!(!report.global_enabled);
        let servers = report.groups.iter().find(|g| g.name == "servers").unwrap();
        assert_eq!(servers.alive, 1);
        assert_eq!(servers.total, 2);
        assert!(servers.enabled);
    }

    #[test]
    fn malformed_seed_entries_are_skipped() {
        let registry = Registry::new(DebouncePolicy::default());
        let mut hosts = BTreeMap::new();
        hosts.insert("192.168.1.10".to_string(), "cam-01".to_string());
        hosts.insert("garbage".to_string(), "broken".to_string());
        registry.load_group("cctv", Duration::from_secs(5), &hosts);
        assert_eq!(registry.snapshot("cctv").len(), 1);
    }
}
