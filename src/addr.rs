//! IPv4 address arithmetic.
//!
//! Converts between dotted-quad addresses and their `u32` form and derives
//! per-subnet addresses by index (index 1 is the gateway by convention).

use ipnet::Ipv4Net;
use std::net::Ipv4Addr;

/// Big-endian interpretation of the four address octets.
pub fn ip_to_u32(ip: Ipv4Addr) -> u32 {
    u32::from_be_bytes(ip.octets())
}

/// Inverse of [`ip_to_u32`]; total for all `u32` values.
pub fn u32_to_ip(value: u32) -> Ipv4Addr {
    Ipv4Addr::from(value.to_be_bytes())
}

/// Number of addresses in a subnet: `2^(32 - prefix_len)`.
///
/// Returned as `u64` so a `/0` subnet does not overflow.
pub fn subnet_size(subnet: &Ipv4Net) -> u64 {
    1u64 << (32 - subnet.prefix_len())
}

/// The address at `index` within the subnet (index 0 is the network address).
pub fn addr_at(subnet: &Ipv4Net, index: u32) -> Ipv4Addr {
    u32_to_ip(ip_to_u32(subnet.network()) + index)
}

/// The subnet's gateway: its first host address.
pub fn gateway_for(subnet: &Ipv4Net) -> Ipv4Addr {
    addr_at(subnet, 1)
}
