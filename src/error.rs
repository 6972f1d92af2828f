//! Error types for the boxd network control plane.
//!
//! All errors use `thiserror` for ergonomic error handling and proper error chains.

use std::net::Ipv4Addr;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for network operations.
pub type Result<T> = std::result::Result<T, NetError>;

/// Main error type for the network control plane.
#[derive(Error, Debug)]
pub enum NetError {
    // Validation errors
    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("Network already exists: {name}")]
    NetworkExists { name: String },

    #[error("Gateway {gateway} for subnet {subnet} is already assigned to a host interface")]
    GatewayInUse { gateway: Ipv4Addr, subnet: String },

    #[error("Subnet {subnet} is already used by network {name}")]
    SubnetExists { subnet: String, name: String },

    #[error("Network not found: {name}")]
    NetworkNotFound { name: String },

    #[error("Network driver not registered: {name}")]
    DriverNotFound { name: String },

    // Persistence errors
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed persisted state at {path:?}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    // Allocation errors
    #[error("Subnet {subnet} exhausted: no free addresses")]
    PoolExhausted { subnet: String },

    #[error("Address {ip} is out of range for subnet {subnet}")]
    AddressOutOfRange { ip: Ipv4Addr, subnet: String },

    #[error("Subnet {subnet} has not been initialized in the IPAM store")]
    SubnetNotInitialized { subnet: String },

    #[error("Network {name} still has {counts} allocated addresses")]
    NetworkInUse { name: String, counts: u32 },

    // Driver boundary errors
    #[error("Network driver operation failed: {reason}")]
    DriverFailed { reason: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl NetError {
    /// Create an I/O error carrying the offending path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }

    /// Create a decode error carrying the offending path.
    pub fn decode(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Decode { path: path.into(), source }
    }
}
