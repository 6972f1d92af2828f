//! Domain types.

pub mod network;

pub use network::{Network, NetworkRecord};
