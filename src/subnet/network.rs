//! Subnet nodes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

use crate::ip;
use crate::topology::DeviceId;

/// Forest-unique subnet identifier. Ids start at 1; 0 is the root sentinel
/// in save files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NetworkId(pub u32);

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Who, if anyone, uses a subnet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Assignment {
    Free,
    Assigned { device: DeviceId },
    /// Subdivided into children; never assignable directly
    Split,
}

impl Assignment {
    pub fn owner(&self) -> Option<DeviceId> {
        match self {
            Assignment::Assigned { device } => Some(*device),
            _ => None,
        }
    }

    pub fn is_free(&self) -> bool {
        matches!(self, Assignment::Free)
    }
}

/// DHCP service settings of a subnet
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DhcpSettings {
    pub enabled: bool,
    /// Only hand out the upper half of the block
    pub upper_half_only: bool,
    /// Router serving the pool
    pub server: Option<DeviceId>,
    /// `ip helper-address` target when the server is remote
    pub relay_helper: Option<Ipv4Addr>,
}

impl DhcpSettings {
    pub fn is_relayed(&self) -> bool {
        self.enabled && self.relay_helper.is_some()
    }
}

/// A block of addresses in the subnet forest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    pub id: NetworkId,
    pub address: Ipv4Addr,
    pub prefix_length: u8,
    pub parent_id: Option<NetworkId>,
    pub children_ids: Vec<NetworkId>,
    pub is_split: bool,
    pub name: Option<String>,
    pub assignment: Assignment,
    pub assigned_interface: Option<String>,
    /// 0 means physical / no VLAN
    pub associated_vlan_id: u16,
    pub dhcp: DhcpSettings,
}

impl Network {
    /// A free, unnamed block. The id is filled in when the block joins a
    /// forest.
    pub fn new(address: Ipv4Addr, prefix_length: u8) -> Self {
        Self {
            id: NetworkId(0),
            address,
            prefix_length,
            parent_id: None,
            children_ids: Vec::new(),
            is_split: false,
            name: None,
            assignment: Assignment::Free,
            assigned_interface: None,
            associated_vlan_id: 0,
            dhcp: DhcpSettings::default(),
        }
    }

    pub fn mask(&self) -> Ipv4Addr {
        ip::mask_for(self.prefix_length)
    }

    pub fn broadcast(&self) -> Ipv4Addr {
        ip::broadcast_address(self.address, self.prefix_length)
    }

    pub fn first_usable(&self) -> Ipv4Addr {
        ip::first_usable(self.address, self.prefix_length)
    }

    pub fn last_usable(&self) -> Ipv4Addr {
        ip::last_usable(self.address, self.prefix_length)
    }

    pub fn host_capacity(&self) -> u64 {
        ip::host_capacity(self.prefix_length)
    }

    pub fn block_size(&self) -> u64 {
        ip::block_size(self.prefix_length)
    }

    pub fn is_leaf(&self) -> bool {
        !self.is_split
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// True when `other` lies entirely inside this block.
    pub fn contains(&self, other: &Network) -> bool {
        let start = u64::from(u32::from(self.address));
        let other_start = u64::from(u32::from(other.address));
        other_start >= start && other_start + other.block_size() <= start + self.block_size()
    }

    /// `a.b.c.d/n`
    pub fn cidr(&self) -> String {
        format!("{}/{}", self.address, self.prefix_length)
    }

    /// Name if set, CIDR otherwise.
    pub fn label(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.cidr())
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} ({})", self.cidr(), name),
            None => f.write_str(&self.cidr()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_helpers() {
        let net = Network::new(Ipv4Addr::new(192, 168, 1, 32), 27);
        assert_eq!(net.mask(), Ipv4Addr::new(255, 255, 255, 224));
        assert_eq!(net.first_usable(), Ipv4Addr::new(192, 168, 1, 33));
        assert_eq!(net.last_usable(), Ipv4Addr::new(192, 168, 1, 62));
        assert_eq!(net.broadcast(), Ipv4Addr::new(192, 168, 1, 63));
        assert_eq!(net.host_capacity(), 30);
        assert_eq!(net.cidr(), "192.168.1.32/27");
        assert_eq!(net.label(), "192.168.1.32/27");
    }

    #[test]
    fn test_contains() {
        let parent = Network::new(Ipv4Addr::new(10, 0, 0, 0), 24);
        assert!(parent.contains(&Network::new(Ipv4Addr::new(10, 0, 0, 192), 26)));
        assert!(!parent.contains(&Network::new(Ipv4Addr::new(10, 0, 1, 0), 26)));
        assert!(!parent.contains(&Network::new(Ipv4Addr::new(10, 0, 0, 0), 23)));
    }
}
