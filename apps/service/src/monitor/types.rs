use std::net::IpAddr;
use std::time::{Duration, Instant};

/// A monitored network address with its display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Host {
    pub address: IpAddr,
    pub name: String,
}

/// Per-host debounce state, co-owned by the registry and mutated only when
/// a probe result for the host is folded in.
#[derive(Debug, Clone)]
pub struct HostState {
    pub alive: bool,
    pub consecutive_failures: u32,
    pub last_alert_at: Option<Instant>,
}

impl HostState {
    /// State of a freshly registered host: assumed alive, no history.
    pub fn fresh() -> Self {
        Self { alive: true, consecutive_failures: 0, last_alert_at: None }
    }
}

/// Debounce thresholds applied by the registry state machine.
#[derive(Debug, Clone, Copy)]
pub struct DebouncePolicy {
    /// Consecutive failed probes before a host is declared down.
    pub failure_threshold: u32,
    /// Minimum time between repeated alerts for a host that stays down.
    pub persistent_cooldown: Duration,
}

impl Default for DebouncePolicy {
    fn default() -> Self {
        Self { failure_threshold: 5, persistent_cooldown: Duration::from_secs(600) }
    }
}

/// Filter for host listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostFilter {
    Alive,
    Down,
    All,
}

/// One row of a host listing.
#[derive(Debug, Clone)]
pub struct HostListing {
    pub group: String,
    pub address: IpAddr,
    pub name: String,
    pub alive: bool,
}

/// Per-group summary counts.
#[derive(Debug, Clone)]
pub struct GroupStatus {
    pub name: String,
    pub enabled: bool,
    pub alive: usize,
    pub total: usize,
}

/// Snapshot of the whole monitor's state, as shown by the status view.
#[derive(Debug, Clone)]
pub struct StatusReport {
    pub global_enabled: bool,
    pub groups: Vec<GroupStatus>,
}
