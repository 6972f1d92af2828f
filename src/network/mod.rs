//! Network control plane: IPAM, drivers and the network registry.

pub mod driver;
pub mod host;
pub mod ipam;
pub mod registry;

pub use driver::{BridgeDriver, NetworkDriver};
pub use host::{HostAddrs, SystemHostAddrs};
pub use ipam::Ipam;
pub use registry::NetworkRegistry;
