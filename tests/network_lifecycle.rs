//! Integration tests for the network lifecycle:
//! - define and provision a network
//! - allocate and release addresses
//! - delete the network
//! - reload everything from disk
//!
//! Tests use a temp data directory and a mock driver for portability.

use boxd_net::{
    error::{NetError, Result},
    Network, NetworkDriver, NetworkRegistry,
};
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

/// Mock driver for testing (doesn't require root or the `ip` command).
struct MockDriver {
    created: AtomicUsize,
    deleted: AtomicUsize,
}

impl MockDriver {
    fn new() -> Arc<Self> {
        Arc::new(Self { created: AtomicUsize::new(0), deleted: AtomicUsize::new(0) })
    }
}

#[async_trait::async_trait]
impl NetworkDriver for MockDriver {
    fn name(&self) -> &str {
        "bridge"
    }

    async fn create(&self, _network: &Network) -> Result<()> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, _network: &Network) -> Result<()> {
        self.deleted.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Host with no interface addresses, so gateway checks always pass.
struct NoHostAddrs;

#[async_trait::async_trait]
impl boxd_net::HostAddrs for NoHostAddrs {
    async fn ipv4_addresses(&self) -> Result<Vec<Ipv4Addr>> {
        Ok(vec![])
    }
}

fn registry(dir: &TempDir, driver: Arc<MockDriver>) -> NetworkRegistry {
    let mut registry = NetworkRegistry::new(dir.path(), Arc::new(NoHostAddrs));
    registry.register_driver(driver);
    registry
}

#[tokio::test]
async fn test_full_network_lifecycle() {
    let dir = TempDir::new().unwrap();
    let driver = MockDriver::new();
    let registry = registry(&dir, driver.clone());

    // Create: gateway is the subnet's first host address.
    let network = registry.create_network("net1", "bridge", "10.20.30.0/24").await.unwrap();
    assert_eq!(network.gateway, Ipv4Addr::new(10, 20, 30, 1));
    assert_eq!(driver.created.load(Ordering::SeqCst), 1);

    // First allocation lands on index 2 (0 = network, 1 = gateway).
    let first = registry.allocate("net1").await.unwrap();
    assert_eq!(first, Ipv4Addr::new(10, 20, 30, 2));

    let second = registry.allocate("net1").await.unwrap();
    assert_eq!(second, Ipv4Addr::new(10, 20, 30, 3));
    assert_eq!(registry.get("net1").await.unwrap().counts, 2);

    // Releasing the first address makes it the lowest free index again.
    registry.release("net1", first).await.unwrap();
    assert_eq!(registry.allocate("net1").await.unwrap(), first);

    // Delete refused while addresses are allocated.
    assert!(matches!(registry.delete("net1").await, Err(NetError::NetworkInUse { .. })));

    registry.release("net1", first).await.unwrap();
    registry.release("net1", second).await.unwrap();
    registry.delete("net1").await.unwrap();
    assert_eq!(driver.deleted.load(Ordering::SeqCst), 1);
    assert!(registry.get("net1").await.is_none());
}

#[tokio::test]
async fn test_slash_30_subnet_exhausts_after_one_allocation() {
    let dir = TempDir::new().unwrap();
    let registry = registry(&dir, MockDriver::new());
    registry.create_network("tiny", "bridge", "10.20.30.0/30").await.unwrap();

    // size 4: 0 = network, 1 = gateway, 3 = broadcast; only index 2 remains.
    assert_eq!(registry.allocate("tiny").await.unwrap(), Ipv4Addr::new(10, 20, 30, 2));
    assert!(matches!(registry.allocate("tiny").await, Err(NetError::PoolExhausted { .. })));
}

#[tokio::test]
async fn test_restart_resumes_from_persisted_state() {
    let dir = TempDir::new().unwrap();

    let allocated = {
        let registry = registry(&dir, MockDriver::new());
        registry.create_network("net1", "bridge", "10.20.30.0/24").await.unwrap();
        registry.create_network("net2", "bridge", "172.16.0.0/16").await.unwrap();
        registry.allocate("net1").await.unwrap()
    };

    // Simulated restart: a fresh registry hydrates from disk.
    let registry = registry(&dir, MockDriver::new());
    registry.load().await.unwrap();

    let networks = registry.list().await;
    assert_eq!(networks.len(), 2);

    let net1 = registry.get("net1").await.unwrap();
    assert_eq!(net1.counts, 1);
    assert_eq!(net1.gateway, Ipv4Addr::new(10, 20, 30, 1));

    // The persisted bitmap still holds the earlier allocation.
    assert_eq!(allocated, Ipv4Addr::new(10, 20, 30, 2));
    assert_eq!(registry.allocate("net1").await.unwrap(), Ipv4Addr::new(10, 20, 30, 3));
    assert_eq!(registry.allocate("net2").await.unwrap(), Ipv4Addr::new(172, 16, 0, 2));
}

#[tokio::test]
async fn test_two_networks_do_not_share_bitmaps() {
    let dir = TempDir::new().unwrap();
    let registry = registry(&dir, MockDriver::new());
    registry.create_network("a", "bridge", "10.1.0.0/24").await.unwrap();
    registry.create_network("b", "bridge", "10.2.0.0/24").await.unwrap();

    assert_eq!(registry.allocate("a").await.unwrap(), Ipv4Addr::new(10, 1, 0, 2));
    assert_eq!(registry.allocate("b").await.unwrap(), Ipv4Addr::new(10, 2, 0, 2));

    registry.release("a", Ipv4Addr::new(10, 1, 0, 2)).await.unwrap();
    assert_eq!(registry.get("a").await.unwrap().counts, 0);
    assert_eq!(registry.get("b").await.unwrap().counts, 1);
}
