//! Network registry: the single coordinating instance owning all live
//! networks, the registered drivers and the IPAM store.
//!
//! A network moves through a fixed lifecycle: defined (validated and
//! registered, nothing provisioned), provisioned (driver resources, bitmap
//! entry and config file exist), deleted (only legal while no addresses are
//! allocated). The registry replaces process-wide mutable globals: construct
//! one at startup, register drivers, then [`load`](NetworkRegistry::load)
//! the persisted networks.

use crate::error::{NetError, Result};
use crate::network::driver::NetworkDriver;
use crate::network::host::HostAddrs;
use crate::network::ipam::Ipam;
use crate::paths;
use crate::types::Network;
use ipnet::Ipv4Net;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

/// Registry of live networks and drivers, plus the process IPAM store.
pub struct NetworkRegistry {
    data_dir: PathBuf,
    networks: RwLock<HashMap<String, Network>>,
    drivers: HashMap<String, Arc<dyn NetworkDriver>>,
    ipam: Ipam,
    host: Arc<dyn HostAddrs>,
}

impl NetworkRegistry {
    /// Create an empty registry rooted at `data_dir`.
    ///
    /// Register drivers with [`register_driver`](Self::register_driver) and
    /// call [`load`](Self::load) before serving requests.
    pub fn new(data_dir: impl Into<PathBuf>, host: Arc<dyn HostAddrs>) -> Self {
        let data_dir = data_dir.into();
        let ipam = Ipam::new(&data_dir);
        Self { data_dir, networks: RwLock::new(HashMap::new()), drivers: HashMap::new(), ipam, host }
    }

    /// Register a driver implementation, keyed by its name.
    pub fn register_driver(&mut self, driver: Arc<dyn NetworkDriver>) {
        self.drivers.insert(driver.name().to_string(), driver);
    }

    /// Access the IPAM store (introspection and tests).
    pub fn ipam(&self) -> &Ipam {
        &self.ipam
    }

    /// Hydrate the registry from persisted per-network config files.
    ///
    /// Scans `<data>/networks/drivers/<driver>/<name>.json`; gateways are
    /// recomputed from the stored CIDR during decoding. Empty files are
    /// skipped.
    #[instrument(skip(self))]
    pub async fn load(&self) -> Result<()> {
        let drivers_dir = paths::drivers_dir(&self.data_dir);
        let mut driver_dirs = match tokio::fs::read_dir(&drivers_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(NetError::io(&drivers_dir, e)),
        };

        let mut networks = self.networks.write().await;
        while let Some(dir) = driver_dirs
            .next_entry()
            .await
            .map_err(|e| NetError::io(&drivers_dir, e))?
        {
            let mut configs = match tokio::fs::read_dir(dir.path()).await {
                Ok(entries) => entries,
                Err(_) => continue,
            };

            while let Some(entry) =
                configs.next_entry().await.map_err(|e| NetError::io(dir.path(), e))?
            {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                match Network::load_path(&path).await? {
                    Some(network) => {
                        info!(network = %network.name, subnet = %network.subnet, "loaded network");
                        networks.insert(network.name.clone(), network);
                    }
                    None => warn!(path = %path.display(), "skipping empty network config"),
                }
            }
        }

        info!("Loaded {} networks from disk", networks.len());
        Ok(())
    }

    /// Validate and register a new network without provisioning it.
    ///
    /// The network is inserted with zero allocations; nothing touches disk
    /// or the driver until [`provision`](Self::provision).
    #[instrument(skip(self), fields(name = %name, driver = %driver, cidr = %cidr))]
    pub async fn define(&self, name: &str, driver: &str, cidr: &str) -> Result<Network> {
        if name.is_empty() {
            return Err(NetError::InvalidInput { reason: "network name must not be empty".into() });
        }
        if driver.is_empty() {
            return Err(NetError::InvalidInput { reason: "driver name must not be empty".into() });
        }
        if !self.drivers.contains_key(driver) {
            return Err(NetError::DriverNotFound { name: driver.to_string() });
        }

        let subnet: Ipv4Net = cidr.parse().map_err(|e| NetError::InvalidInput {
            reason: format!("malformed CIDR '{}': {}", cidr, e),
        })?;

        let mut networks = self.networks.write().await;
        if networks.contains_key(name) {
            return Err(NetError::NetworkExists { name: name.to_string() });
        }

        let network = Network::new(name, driver, subnet);

        // Each live network owns exactly one bitmap entry keyed by its
        // subnet; two networks on one subnet would share an entry and let
        // their counters drift apart.
        if let Some(existing) = networks.values().find(|n| n.subnet == network.subnet) {
            return Err(NetError::SubnetExists {
                subnet: network.subnet.to_string(),
                name: existing.name.clone(),
            });
        }

        for addr in self.host.ipv4_addresses().await? {
            if addr == network.gateway {
                return Err(NetError::GatewayInUse {
                    gateway: network.gateway,
                    subnet: network.subnet.to_string(),
                });
            }
        }

        info!(gateway = %network.gateway, "defined network");
        networks.insert(name.to_string(), network.clone());
        Ok(network)
    }

    /// Provision a defined network: driver resources, then the subnet's
    /// bitmap entry, then the persisted config file.
    ///
    /// There is no rollback on partial failure; a failed step leaves the
    /// earlier steps' resources in place.
    #[instrument(skip(self), fields(name = %name))]
    pub async fn provision(&self, name: &str) -> Result<()> {
        let network = self.get(name).await.ok_or_else(|| NetError::NetworkNotFound {
            name: name.to_string(),
        })?;
        let driver = self.driver(&network.driver)?;

        driver.create(&network).await?;
        self.ipam.init(&network).await?;
        network.dump(&self.data_dir).await?;

        info!(subnet = %network.subnet, "provisioned network");
        metrics::counter!("boxd_network_created_total").increment(1);
        Ok(())
    }

    /// Define and provision in one step.
    pub async fn create_network(&self, name: &str, driver: &str, cidr: &str) -> Result<Network> {
        let network = self.define(name, driver, cidr).await?;
        self.provision(name).await?;
        Ok(network)
    }

    /// Delete a network with no allocated addresses.
    ///
    /// Order: bitmap entry removal, driver teardown, config file removal,
    /// registry eviction. If driver teardown fails the bitmap entry is
    /// already gone; the ordering is not reversible.
    #[instrument(skip(self), fields(name = %name))]
    pub async fn delete(&self, name: &str) -> Result<()> {
        let mut networks = self.networks.write().await;
        let network = networks
            .get(name)
            .ok_or_else(|| NetError::NetworkNotFound { name: name.to_string() })?
            .clone();

        if network.counts > 0 {
            return Err(NetError::NetworkInUse { name: name.to_string(), counts: network.counts });
        }

        let driver = self.driver(&network.driver)?;
        self.ipam.forget(&network).await?;
        driver.delete(&network).await?;
        network.remove_config(&self.data_dir).await?;
        networks.remove(name);

        info!(subnet = %network.subnet, "deleted network");
        metrics::counter!("boxd_network_deleted_total").increment(1);
        Ok(())
    }

    /// Allocate an address from the named network's subnet.
    #[instrument(skip(self), fields(name = %name))]
    pub async fn allocate(&self, name: &str) -> Result<Ipv4Addr> {
        let mut networks = self.networks.write().await;
        let network = networks
            .get_mut(name)
            .ok_or_else(|| NetError::NetworkNotFound { name: name.to_string() })?;
        self.ipam.allocate(network).await
    }

    /// Release an address back to the named network's subnet.
    #[instrument(skip(self), fields(name = %name, ip = %ip))]
    pub async fn release(&self, name: &str, ip: Ipv4Addr) -> Result<()> {
        let mut networks = self.networks.write().await;
        let network = networks
            .get_mut(name)
            .ok_or_else(|| NetError::NetworkNotFound { name: name.to_string() })?;
        self.ipam.release(network, ip).await
    }

    /// Look up a network by name.
    pub async fn get(&self, name: &str) -> Option<Network> {
        self.networks.read().await.get(name).cloned()
    }

    /// All registered networks, for listing.
    pub async fn list(&self) -> Vec<Network> {
        self.networks.read().await.values().cloned().collect()
    }

    fn driver(&self, name: &str) -> Result<Arc<dyn NetworkDriver>> {
        self.drivers
            .get(name)
            .cloned()
            .ok_or_else(|| NetError::DriverNotFound { name: name.to_string() })
    }
}
