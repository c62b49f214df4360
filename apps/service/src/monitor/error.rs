use std::net::IpAddr;

use thiserror::Error;

use crate::store::StoreError;

/// Errors surfaced by the monitor's command API.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("invalid address `{0}`: not an IPv4 or IPv6 literal")]
    InvalidAddress(String),
    #[error("invalid display name: must be 1-50 characters")]
    InvalidName,
    #[error("unknown group `{0}`")]
    UnknownGroup(String),
    #[error("host {0} already exists in group `{1}`")]
    DuplicateHost(IpAddr, String),
    #[error("host {0} not found in group `{1}`")]
    HostNotFound(IpAddr, String),
    /// The in-memory mutation stands; only the snapshot write failed.
    #[error("persistence failed: {0}")]
    Persistence(#[from] StoreError),
}
