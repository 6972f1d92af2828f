//! Subnet-bitmap IP address management (IPAM).
//!
//! Every subnet owns one bit string in a single persisted JSON blob, one
//! character per address: `'0'` free, `'1'` allocated. Index 0 (network
//! address), index 1 (gateway) and the last index (broadcast) are never
//! handed out. Allocation state lives on disk; every operation reloads the
//! blob before mutating so each call is consistent with the latest persisted
//! state. A mutex scopes each load-mutate-persist sequence so in-process
//! callers cannot interleave.

use crate::addr;
use crate::error::{NetError, Result};
use crate::paths;
use crate::types::Network;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// Persisted form of the store: subnet CIDR string -> bit string.
type SubnetBitmaps = HashMap<String, String>;

/// The IPAM store.
///
/// One instance per process, owned by the
/// [`NetworkRegistry`](crate::network::registry::NetworkRegistry).
pub struct Ipam {
    data_dir: PathBuf,
    blob_path: PathBuf,
    /// Serializes load-mutate-persist sequences within this process.
    lock: Mutex<()>,
}

impl Ipam {
    /// Create an IPAM store rooted at the given data directory.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        let blob_path = paths::ipam_path(&data_dir);
        Self { data_dir, blob_path, lock: Mutex::new(()) }
    }

    /// Initialize the bitmap entry for a network's subnet.
    ///
    /// Idempotent: an existing entry is left untouched.
    #[instrument(skip(self, network), fields(subnet = %network.subnet))]
    pub async fn init(&self, network: &Network) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut bitmaps = self.load().await?;
        if self.ensure_entry(&mut bitmaps, network) {
            self.dump(&bitmaps).await?;
        }
        Ok(())
    }

    /// Allocate the lowest free address in the network's subnet.
    ///
    /// Persists the network's updated counter first, then the bitmap blob.
    /// If the process dies between the two writes the counter is stale-high
    /// relative to the bitmap; no transactional guarantee is made.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::PoolExhausted`] when no index strictly between the
    /// gateway and the broadcast address is free.
    #[instrument(skip(self, network), fields(network = %network.name, subnet = %network.subnet))]
    pub async fn allocate(&self, network: &mut Network) -> Result<Ipv4Addr> {
        let _guard = self.lock.lock().await;
        let mut bitmaps = self.load().await?;
        if self.ensure_entry(&mut bitmaps, network) {
            self.dump(&bitmaps).await?;
        }

        let key = network.subnet.to_string();
        let entry = match bitmaps.get_mut(&key) {
            Some(entry) => entry,
            None => return Err(NetError::SubnetNotInitialized { subnet: key }),
        };

        // Index 0 is the network address, 1 the gateway, len-1 the broadcast.
        let bits = entry.as_bytes();
        let found = (2..bits.len().saturating_sub(1)).find(|&index| bits[index] == b'0');

        let index = match found {
            Some(index) => index,
            None => return Err(NetError::PoolExhausted { subnet: key }),
        };
        entry.replace_range(index..index + 1, "1");
        let ip = addr::addr_at(&network.subnet, index as u32);

        network.counts += 1;
        network.dump(&self.data_dir).await?;
        self.dump(&bitmaps).await?;

        info!(%ip, subnet = %key, "allocated address");
        metrics::counter!("boxd_ip_allocated_total").increment(1);
        Ok(ip)
    }

    /// Release a previously allocated address.
    ///
    /// Releasing an address that is already free is a no-op, not an error;
    /// only a `'1' -> '0'` transition decrements the counter and persists.
    ///
    /// # Errors
    ///
    /// [`NetError::SubnetNotInitialized`] if the store has no entry for the
    /// subnet; [`NetError::AddressOutOfRange`] if the address falls on a
    /// reserved low index or outside the subnet.
    #[instrument(skip(self, network), fields(network = %network.name, subnet = %network.subnet, ip = %ip))]
    pub async fn release(&self, network: &mut Network, ip: Ipv4Addr) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut bitmaps = self.load().await?;

        let key = network.subnet.to_string();
        let entry = match bitmaps.get_mut(&key) {
            Some(entry) if !entry.is_empty() => entry,
            _ => return Err(NetError::SubnetNotInitialized { subnet: key }),
        };

        let base = addr::ip_to_u32(network.subnet.network()) as i64;
        let index = addr::ip_to_u32(ip) as i64 - base;
        if index <= 1 || index >= entry.len() as i64 {
            return Err(NetError::AddressOutOfRange { ip, subnet: key });
        }

        let index = index as usize;
        if entry.as_bytes()[index] == b'0' {
            // Double release: tolerated, nothing to persist.
            debug!(%ip, subnet = %key, "release of already-free address ignored");
            return Ok(());
        }

        entry.replace_range(index..index + 1, "0");
        if network.counts == 0 {
            // The counter lagged the bitmap, e.g. a crash between the
            // counter and bitmap writes. Clamp at zero instead of wrapping.
            warn!(subnet = %key, "allocated bit found while the network counter was zero");
        } else {
            network.counts -= 1;
        }
        network.dump(&self.data_dir).await?;
        self.dump(&bitmaps).await?;

        info!(%ip, subnet = %key, "released address");
        metrics::counter!("boxd_ip_released_total").increment(1);
        Ok(())
    }

    /// Drop the subnet's bitmap entry entirely (network deletion).
    #[instrument(skip(self, network), fields(subnet = %network.subnet))]
    pub async fn forget(&self, network: &Network) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut bitmaps = self.load().await?;
        if bitmaps.remove(&network.subnet.to_string()).is_some() {
            self.dump(&bitmaps).await?;
        }
        Ok(())
    }

    /// Snapshot of the persisted map, for callers that need to inspect it.
    pub async fn subnets(&self) -> Result<HashMap<String, String>> {
        let _guard = self.lock.lock().await;
        self.load().await
    }

    /// Insert an all-free entry for the subnet if none exists yet.
    ///
    /// Returns whether an entry was inserted. The entry length is the full
    /// address-space size, `2^(32 - prefix_len)`, even for `/31` and `/32`
    /// subnets that end up with zero allocatable addresses.
    fn ensure_entry(&self, bitmaps: &mut SubnetBitmaps, network: &Network) -> bool {
        let key = network.subnet.to_string();
        if bitmaps.contains_key(&key) {
            return false;
        }

        let size = addr::subnet_size(&network.subnet) as usize;
        bitmaps.insert(key.clone(), "0".repeat(size));
        debug!(subnet = %key, size, "initialized subnet bitmap");
        true
    }

    async fn load(&self) -> Result<SubnetBitmaps> {
        match tokio::fs::read(&self.blob_path).await {
            Ok(bytes) if bytes.is_empty() => Ok(SubnetBitmaps::new()),
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| NetError::decode(&self.blob_path, e)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(SubnetBitmaps::new()),
            Err(e) => Err(NetError::io(&self.blob_path, e)),
        }
    }

    async fn dump(&self, bitmaps: &SubnetBitmaps) -> Result<()> {
        if let Some(parent) = self.blob_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| NetError::io(parent, e))?;
        }

        let bytes =
            serde_json::to_vec(bitmaps).map_err(|e| NetError::decode(&self.blob_path, e))?;
        tokio::fs::write(&self.blob_path, bytes)
            .await
            .map_err(|e| NetError::io(&self.blob_path, e))
    }
}

impl std::fmt::Debug for Ipam {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ipam").field("blob_path", &self.blob_path).finish()
    }
}
