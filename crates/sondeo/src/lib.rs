//! Reachability probing.
//!
//! A probe is one bounded-timeout liveness check against a single address.
//! Retry and debounce policy live in the monitoring engine above this
//! crate; a prober only answers "did one attempt get through".

use std::net::IpAddr;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Default per-attempt timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Prober trait for reachability checks.
#[async_trait]
pub trait Prober: Send + Sync {
    /// Perform one reachability check against `addr`.
    ///
    /// Never fails toward the caller: a spawn error, a non-zero exit or a
    /// timeout all resolve to `false`.
    async fn probe(&self, addr: IpAddr) -> bool;
}

/// Prober backed by the system `ping` binary.
///
/// Dispatches to the matching address family (`-6` for IPv6 targets) and
/// suppresses all child output.
pub struct PingProber {
    attempt_timeout: Duration,
}

impl Default for PingProber {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl PingProber {
    pub fn new(attempt_timeout: Duration) -> Self {
        Self { attempt_timeout }
    }

    fn command(&self, addr: IpAddr) -> Command {
        let mut cmd = Command::new("ping");
        if addr.is_ipv6() {
            cmd.arg("-6");
        }
        // One echo request; Windows spells the count flag differently.
        let count_flag = if cfg!(windows) { "-n" } else { "-c" };
        cmd.arg(count_flag).arg("1");
        if cfg!(windows) {
            // Windows takes the reply timeout in milliseconds.
            cmd.arg("-w").arg(self.attempt_timeout.as_millis().to_string());
        } else {
            cmd.arg("-W").arg(self.attempt_timeout.as_secs().max(1).to_string());
        }
        cmd.arg(addr.to_string());
        cmd.stdout(Stdio::null()).stderr(Stdio::null());
        cmd.kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl Prober for PingProber {
    async fn probe(&self, addr: IpAddr) -> bool {
        let mut cmd = self.command(addr);
        // Slack over the ping's own deadline so the child normally wins.
        let deadline = self.attempt_timeout + Duration::from_secs(1);

        match timeout(deadline, cmd.status()).await {
            Ok(Ok(status)) => {
                let reachable = status.success();
                debug!(%addr, reachable, "ping finished");
                reachable
            }
            Ok(Err(e)) => {
                warn!(%addr, error = %e, "ping invocation failed");
                false
            }
            Err(_) => {
                debug!(%addr, "ping timed out");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_selects_family() {
        let prober = PingProber::default();

        let v4 = prober.command("10.0.0.1".parse().unwrap());
        let v4_args: Vec<_> = v4.as_std().get_args().collect();
        assert!(!v4_args.contains(&std::ffi::OsStr::new("-6")));

        let v6 = prober.command("2001:db8::1".parse().unwrap());
        let v6_args: Vec<_> = v6.as_std().get_args().collect();
        assert!(v6_args.contains(&std::ffi::OsStr::new("-6")));
        assert!(v6_args.contains(&std::ffi::OsStr::new("2001:db8::1")));
    }

    #[tokio::test]
    async fn probe_loopback() {
        let prober = PingProber::default();
        // Loopback answers without leaving the machine.
        assert!(prober.probe("127.0.0.1".parse().unwrap()).await);
    }
}
