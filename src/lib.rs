//! boxd network control plane.
//!
//! Tracks logical container networks (subnet, gateway, backing driver) and
//! allocates per-container IP addresses from subnet bitmaps, persisting all
//! state to disk so it survives process restarts.

pub mod addr;
pub mod error;
pub mod network;
pub mod observability;
pub mod paths;
pub mod types;

// Re-export commonly used items
pub use error::{NetError, Result};
pub use network::{BridgeDriver, HostAddrs, Ipam, NetworkDriver, NetworkRegistry, SystemHostAddrs};
pub use types::{Network, NetworkRecord};
