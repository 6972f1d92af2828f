//! Network domain type and its on-disk codec.
//!
//! The in-memory [`Network`] keeps structured types (`Ipv4Net`, `Ipv4Addr`);
//! the persisted form is [`NetworkRecord`], which renders them as canonical
//! strings. Decoding always recomputes the gateway from the stored CIDR so a
//! tampered or stale `Gateway` field can never diverge from the subnet.

use crate::addr;
use crate::error::{NetError, Result};
use crate::paths;
use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One logical container network.
#[derive(Debug, Clone, PartialEq)]
pub struct Network {
    /// Unique network name
    pub name: String,

    /// Name of the driver backing this network (e.g., "bridge")
    pub driver: String,

    /// Subnet, normalized to its network address (e.g., 10.20.30.0/24)
    pub subnet: Ipv4Net,

    /// Gateway: always the subnet's first host address
    pub gateway: Ipv4Addr,

    /// Number of currently allocated addresses
    pub counts: u32,

    /// Creation timestamp, display-only
    pub created_at: String,
}

impl Network {
    /// Construct a new, unprovisioned network with zero allocations.
    ///
    /// The subnet is normalized so `10.20.30.1/24` becomes `10.20.30.0/24`,
    /// and the gateway is derived from it.
    pub fn new(name: impl Into<String>, driver: impl Into<String>, subnet: Ipv4Net) -> Self {
        let subnet = subnet.trunc();
        Self {
            name: name.into(),
            driver: driver.into(),
            gateway: addr::gateway_for(&subnet),
            subnet,
            counts: 0,
            created_at: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }

    /// Path of this network's config file under the given data directory.
    pub fn config_path(&self, data_dir: &Path) -> PathBuf {
        paths::network_config_path(data_dir, &self.driver, &self.name)
    }

    /// Persist this network's config file, creating parent directories.
    pub async fn dump(&self, data_dir: &Path) -> Result<()> {
        let path = self.config_path(data_dir);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| NetError::io(parent, e))?;
        }

        let record = NetworkRecord::from(self);
        let bytes = serde_json::to_vec(&record).map_err(|e| NetError::decode(&path, e))?;
        tokio::fs::write(&path, bytes).await.map_err(|e| NetError::io(&path, e))?;

        debug!(network = %self.name, path = %path.display(), "persisted network config");
        Ok(())
    }

    /// Load a network from a config file.
    ///
    /// Returns `Ok(None)` for an empty file (nothing persisted yet).
    pub async fn load_path(path: &Path) -> Result<Option<Network>> {
        let bytes = tokio::fs::read(path).await.map_err(|e| NetError::io(path, e))?;
        if bytes.is_empty() {
            return Ok(None);
        }

        let record: NetworkRecord =
            serde_json::from_slice(&bytes).map_err(|e| NetError::decode(path, e))?;
        Ok(Some(Network::try_from(record)?))
    }

    /// Remove this network's persisted config file.
    pub async fn remove_config(&self, data_dir: &Path) -> Result<()> {
        let path = self.config_path(data_dir);
        tokio::fs::remove_file(&path).await.map_err(|e| NetError::io(&path, e))
    }
}

/// Persisted form of a [`Network`].
///
/// Field names match the on-disk JSON layout consumed by other runtime
/// tooling; `IPNet` and `Gateway` are canonical string renderings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkRecord {
    #[serde(rename = "Name")]
    pub name: String,

    #[serde(rename = "Counts")]
    pub counts: u32,

    #[serde(rename = "Driver")]
    pub driver: String,

    #[serde(rename = "IPNet")]
    pub ip_net: String,

    #[serde(rename = "Gateway")]
    pub gateway: String,

    #[serde(rename = "CreateTime")]
    pub create_time: String,
}

impl From<&Network> for NetworkRecord {
    fn from(nw: &Network) -> Self {
        Self {
            name: nw.name.clone(),
            counts: nw.counts,
            driver: nw.driver.clone(),
            ip_net: nw.subnet.to_string(),
            gateway: nw.gateway.to_string(),
            create_time: nw.created_at.clone(),
        }
    }
}

impl TryFrom<NetworkRecord> for Network {
    type Error = NetError;

    fn try_from(record: NetworkRecord) -> Result<Network> {
        let subnet: Ipv4Net = record.ip_net.parse().map_err(|e| NetError::InvalidInput {
            reason: format!("malformed CIDR '{}' in persisted network config: {}", record.ip_net, e),
        })?;
        let subnet = subnet.trunc();

        // The stored Gateway string is ignored on purpose: the gateway is
        // always the subnet's first host address.
        Ok(Network {
            name: record.name,
            driver: record.driver,
            gateway: addr::gateway_for(&subnet),
            subnet,
            counts: record.counts,
            created_at: record.create_time,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Network {
        Network::new("net1", "bridge", "10.20.30.0/24".parse().unwrap())
    }

    #[test]
    fn test_new_normalizes_subnet_and_derives_gateway() {
        let nw = Network::new("net1", "bridge", "10.20.30.7/24".parse().unwrap());
        assert_eq!(nw.subnet.to_string(), "10.20.30.0/24");
        assert_eq!(nw.gateway, Ipv4Addr::new(10, 20, 30, 1));
        assert_eq!(nw.counts, 0);
    }

    #[test]
    fn test_record_round_trip() {
        let mut nw = sample();
        nw.counts = 3;

        let json = serde_json::to_string(&NetworkRecord::from(&nw)).unwrap();
        let record: NetworkRecord = serde_json::from_str(&json).unwrap();
        let decoded = Network::try_from(record).unwrap();

        assert_eq!(decoded, nw);
    }

    #[test]
    fn test_record_field_names() {
        let json = serde_json::to_value(NetworkRecord::from(&sample())).unwrap();
        for field in ["Name", "Counts", "Driver", "IPNet", "Gateway", "CreateTime"] {
            assert!(json.get(field).is_some(), "missing field {}", field);
        }
        assert_eq!(json["IPNet"], "10.20.30.0/24");
        assert_eq!(json["Gateway"], "10.20.30.1");
    }

    #[test]
    fn test_decode_recomputes_gateway() {
        // A stored gateway that disagrees with the CIDR is not trusted.
        let record = NetworkRecord {
            name: "net1".to_string(),
            counts: 0,
            driver: "bridge".to_string(),
            ip_net: "10.20.30.0/24".to_string(),
            gateway: "10.99.99.99".to_string(),
            create_time: "2026-01-01 00:00:00".to_string(),
        };

        let nw = Network::try_from(record).unwrap();
        assert_eq!(nw.gateway, Ipv4Addr::new(10, 20, 30, 1));
    }

    #[test]
    fn test_decode_rejects_malformed_cidr() {
        let record = NetworkRecord {
            name: "net1".to_string(),
            counts: 0,
            driver: "bridge".to_string(),
            ip_net: "not-a-cidr".to_string(),
            gateway: "10.20.30.1".to_string(),
            create_time: "2026-01-01 00:00:00".to_string(),
        };

        assert!(matches!(Network::try_from(record), Err(NetError::InvalidInput { .. })));
    }

    #[tokio::test]
    async fn test_dump_and_load_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut nw = sample();
        nw.counts = 2;
        nw.dump(dir.path()).await.unwrap();

        let path = nw.config_path(dir.path());
        let loaded = Network::load_path(&path).await.unwrap().unwrap();
        assert_eq!(loaded, nw);
    }

    #[tokio::test]
    async fn test_load_path_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.json");
        tokio::fs::write(&path, b"").await.unwrap();

        assert_eq!(Network::load_path(&path).await.unwrap(), None);
    }
}
