//! DHCP relay target resolution.
//!
//! Finds the address a router should forward DHCP broadcasts to so they
//! reach a designated server router. Only single-hop adjacency is
//! considered.

use log::debug;
use std::net::Ipv4Addr;

use crate::ip;
use crate::subnet::SubnetForest;
use crate::topology::{DeviceClass, DeviceId, TopologyGraph};

/// Prefix length of a point-to-point WAN block.
pub const WAN_PREFIX: u8 = 30;

/// Offset of the non-owning side's address inside a WAN /30.
pub const WAN_PEER_OFFSET: u32 = 2;

/// Resolve the relay target for `server`.
///
/// In priority order:
/// 1. a leaf /30 owned by the server gives its first usable address;
/// 2. a leaf /30 owned by another router directly linked to the server
///    gives the peer-side address (network + 2);
/// 3. any leaf owned by the server gives its first usable address.
///
/// Candidates are scanned in subnet id order. `None` when the server is not
/// a router or nothing matches.
pub fn resolve_relay_address(
    forest: &SubnetForest,
    graph: &TopologyGraph,
    server: DeviceId,
) -> Option<Ipv4Addr> {
    let server_device = graph.device(server)?;
    if server_device.class() != DeviceClass::Router {
        debug!("{} is not a router; no relay target", server_device.hostname);
        return None;
    }

    for wan in forest.leaves().filter(|n| n.prefix_length == WAN_PREFIX) {
        let Some(owner) = wan.assignment.owner() else {
            continue;
        };

        if owner == server {
            debug!("Relay via {} owned by {}", wan.cidr(), server_device.hostname);
            return Some(wan.first_usable());
        }

        let owner_is_router = graph
            .device(owner)
            .map_or(false, |d| d.class() == DeviceClass::Router);
        if owner_is_router && graph.are_directly_linked(owner, server) {
            debug!("Relay via peer side of {}", wan.cidr());
            return Some(ip::offset(wan.address, WAN_PEER_OFFSET));
        }
    }

    forest
        .leaves()
        .find(|n| n.assignment.owner() == Some(server))
        .map(|n| n.first_usable())
}
