//! Network driver capability.
//!
//! Drivers provision and tear down the underlying resources for a network
//! (bridge interface, NAT rules). The control plane only calls through the
//! [`NetworkDriver`] trait; concrete backends are registered with the
//! [`NetworkRegistry`](crate::network::registry::NetworkRegistry) at startup.

use crate::error::{NetError, Result};
use crate::types::Network;
use tokio::process::Command;
use tracing::{info, instrument};

/// Pluggable backend for one network type.
#[async_trait::async_trait]
pub trait NetworkDriver: Send + Sync {
    /// Driver name used to select it at network definition (e.g., "bridge").
    fn name(&self) -> &str;

    /// Provision the underlying resources for the network.
    ///
    /// Must be safe to call once per network; creation of resources that
    /// already exist is skipped rather than treated as an error.
    async fn create(&self, network: &Network) -> Result<()>;

    /// Tear down whatever [`create`](Self::create) provisioned.
    async fn delete(&self, network: &Network) -> Result<()>;
}

/// Linux bridge driver.
///
/// Uses the `ip` command for bridge management and iptables for outbound NAT,
/// naming the bridge interface after the network.
pub struct BridgeDriver;

impl BridgeDriver {
    async fn run(program: &str, args: &[&str]) -> Result<std::process::Output> {
        Command::new(program).args(args).output().await.map_err(|e| NetError::DriverFailed {
            reason: format!("failed to run {}: {}", program, e),
        })
    }

    async fn bridge_exists(name: &str) -> Result<bool> {
        let output = Self::run("ip", &["link", "show", name]).await?;
        Ok(output.status.success())
    }
}

#[async_trait::async_trait]
impl NetworkDriver for BridgeDriver {
    fn name(&self) -> &str {
        "bridge"
    }

    #[instrument(skip(self, network), fields(bridge = %network.name))]
    async fn create(&self, network: &Network) -> Result<()> {
        if Self::bridge_exists(&network.name).await? {
            info!("Bridge {} already exists, skipping creation", network.name);
            return Ok(());
        }

        let output =
            Self::run("ip", &["link", "add", "name", &network.name, "type", "bridge"]).await?;
        if !output.status.success() {
            return Err(NetError::DriverFailed {
                reason: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }

        // The bridge carries the gateway address for the subnet.
        let gateway_cidr = format!("{}/{}", network.gateway, network.subnet.prefix_len());
        let output =
            Self::run("ip", &["addr", "add", &gateway_cidr, "dev", &network.name]).await?;
        if !output.status.success() {
            return Err(NetError::DriverFailed {
                reason: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }

        let output = Self::run("ip", &["link", "set", &network.name, "up"]).await?;
        if !output.status.success() {
            return Err(NetError::DriverFailed {
                reason: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }

        let subnet = network.subnet.to_string();
        let output = Self::run(
            "iptables",
            &["-t", "nat", "-A", "POSTROUTING", "-s", &subnet, "-j", "MASQUERADE"],
        )
        .await?;
        if !output.status.success() {
            return Err(NetError::DriverFailed {
                reason: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }

        info!("Bridge {} created for subnet {}", network.name, subnet);
        metrics::counter!("boxd_bridge_created_total").increment(1);
        Ok(())
    }

    #[instrument(skip(self, network), fields(bridge = %network.name))]
    async fn delete(&self, network: &Network) -> Result<()> {
        let subnet = network.subnet.to_string();
        let output = Self::run(
            "iptables",
            &["-t", "nat", "-D", "POSTROUTING", "-s", &subnet, "-j", "MASQUERADE"],
        )
        .await?;
        if !output.status.success() {
            // The rule may already be gone; bridge removal still proceeds.
            info!("NAT rule for {} was not present", subnet);
        }

        if !Self::bridge_exists(&network.name).await? {
            info!("Bridge {} does not exist, nothing to delete", network.name);
            return Ok(());
        }

        let output = Self::run("ip", &["link", "del", &network.name]).await?;
        if !output.status.success() {
            return Err(NetError::DriverFailed {
                reason: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }

        info!("Bridge {} deleted", network.name);
        metrics::counter!("boxd_bridge_deleted_total").increment(1);
        Ok(())
    }
}
