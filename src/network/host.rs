//! Host interface address collaborator.
//!
//! The registry checks a new network's gateway against the addresses already
//! assigned to host interfaces. That query lives behind a trait so tests can
//! inject a fixed address set.

use crate::error::{NetError, Result};
use std::net::Ipv4Addr;
use tokio::process::Command;
use tracing::instrument;

/// Source of the IPv4 addresses currently assigned to host interfaces.
#[async_trait::async_trait]
pub trait HostAddrs: Send + Sync {
    async fn ipv4_addresses(&self) -> Result<Vec<Ipv4Addr>>;
}

/// Queries the live system via `ip -o -4 addr show`.
pub struct SystemHostAddrs;

#[async_trait::async_trait]
impl HostAddrs for SystemHostAddrs {
    #[instrument(skip(self))]
    async fn ipv4_addresses(&self) -> Result<Vec<Ipv4Addr>> {
        let output =
            Command::new("ip").args(["-o", "-4", "addr", "show"]).output().await.map_err(|e| {
                NetError::DriverFailed { reason: format!("failed to run ip addr: {}", e) }
            })?;

        if !output.status.success() {
            return Err(NetError::DriverFailed {
                reason: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }

        Ok(parse_ip_addr_output(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Parse `ip -o -4 addr show` output lines, e.g.
/// `2: eth0    inet 192.168.1.10/24 brd 192.168.1.255 scope global eth0\...`
fn parse_ip_addr_output(stdout: &str) -> Vec<Ipv4Addr> {
    stdout
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            fields.find(|f| *f == "inet")?;
            let cidr = fields.next()?;
            cidr.split('/').next()?.parse().ok()
        })
        .collect()
}
