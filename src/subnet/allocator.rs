//! VLSM allocation.
//!
//! Turns a block plus a sizing requirement into the list of equally sized,
//! aligned child blocks that exactly fill it. Nothing here touches a forest;
//! `SubnetForest::split` attaches the result.

use regex::Regex;
use std::net::Ipv4Addr;
use std::sync::LazyLock;

use super::forest::SubnetError;
use super::network::Network;
use crate::ip::{self, ParseError, IPV4_BITS};

/// Largest number of children a single allocation may produce.
pub const MAX_CHILDREN: u64 = 65_536;

static BASE_NETWORK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-9]+)\.([0-9]+)\.([0-9]+)\.([0-9]+)/([0-9]+)$").expect("valid regex")
});

/// How to size the children of a block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sizing {
    /// Smallest blocks holding at least this many hosts each
    Hosts(u64),
    /// At least this many equally sized blocks
    Subnets(u64),
}

/// Parse `a.b.c.d/n` into a free root block.
///
/// Only the textual shape is checked. Octets above 255 and prefixes above 32
/// are accepted and fold into deterministic values: octets are shifted into
/// place with wrapping arithmetic and the prefix saturates. The address is
/// masked down to its own network so the block stays aligned.
pub fn parse_base_network(text: &str) -> Result<Network, ParseError> {
    let trimmed = text.trim();
    let caps = BASE_NETWORK_RE
        .captures(trimmed)
        .ok_or_else(|| ParseError::InvalidFormat {
            text: text.to_string(),
        })?;

    let number = |i: usize| -> u64 {
        caps[i]
            .bytes()
            .fold(0u64, |acc, b| acc.wrapping_mul(10).wrapping_add(u64::from(b - b'0')))
    };

    let raw = (0..4).fold(0u32, |acc, i| {
        let octet = number(i + 1) as u32;
        acc | octet.wrapping_shl(24 - 8 * i as u32)
    });
    let prefix = u8::try_from(number(5)).unwrap_or(u8::MAX);
    let prefix = prefix.min(IPV4_BITS);

    let address = ip::network_address(Ipv4Addr::from(raw), prefix);
    Ok(Network::new(address, prefix))
}

/// Smallest prefix whose host capacity covers `required_hosts`.
pub fn prefix_for_hosts(required_hosts: u64) -> Option<u8> {
    (2..=IPV4_BITS)
        .map(|host_bits| IPV4_BITS - host_bits)
        .find(|&prefix| ip::host_capacity(prefix) >= required_hosts)
}

/// Prefix giving at least `required_subnets` children of a `/parent_prefix`.
pub fn prefix_for_subnets(parent_prefix: u8, required_subnets: u64) -> u8 {
    let extra_bits = required_subnets
        .checked_next_power_of_two()
        .map_or(u64::BITS, |n| n.trailing_zeros());
    let prefix = u32::from(parent_prefix) + extra_bits;
    prefix.min(u32::from(IPV4_BITS)) as u8
}

/// Children that split `node` into blocks big enough for `required_hosts`
/// each.
pub fn allocate_by_host_count(
    node: &Network,
    required_hosts: u64,
) -> Result<Vec<Network>, SubnetError> {
    if required_hosts == 0 {
        return Err(SubnetError::InvalidRequirement {
            reason: "host count must be at least 1".to_string(),
        });
    }

    let new_prefix = prefix_for_hosts(required_hosts)
        .filter(|&p| p >= node.prefix_length)
        .ok_or_else(|| SubnetError::InsufficientCapacity {
            network: node.cidr(),
            required_hosts,
        })?;

    partition(node, new_prefix)
}

/// Exactly `2^k` children, the smallest power of two covering
/// `required_subnets` (capped at /32 blocks).
pub fn allocate_by_subnet_count(
    node: &Network,
    required_subnets: u64,
) -> Result<Vec<Network>, SubnetError> {
    if required_subnets == 0 {
        return Err(SubnetError::InvalidRequirement {
            reason: "subnet count must be at least 1".to_string(),
        });
    }

    partition(node, prefix_for_subnets(node.prefix_length, required_subnets))
}

/// Allocate according to a `Sizing`.
pub fn allocate(node: &Network, sizing: Sizing) -> Result<Vec<Network>, SubnetError> {
    match sizing {
        Sizing::Hosts(hosts) => allocate_by_host_count(node, hosts),
        Sizing::Subnets(count) => allocate_by_subnet_count(node, count),
    }
}

fn partition(node: &Network, new_prefix: u8) -> Result<Vec<Network>, SubnetError> {
    let count = node.block_size() / ip::block_size(new_prefix);
    if count > MAX_CHILDREN {
        return Err(SubnetError::TooManySubnets {
            network: node.cidr(),
            count,
        });
    }

    let child_block = ip::block_size(new_prefix);
    let base = u64::from(u32::from(node.address));
    Ok((0..count)
        .map(|i| {
            let address = Ipv4Addr::from((base + i * child_block) as u32);
            Network::new(address, new_prefix)
        })
        .collect())
}
