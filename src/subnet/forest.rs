//! The subnet forest.
//!
//! Nodes live in an id-keyed map; parent and children relations are id
//! lookups. Splitting is additive: nodes are never removed except by a
//! whole-forest reset. Every operation validates first and mutates after,
//! so a returned error leaves the forest untouched.

use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use super::allocator::{self, Sizing};
use super::network::{Assignment, DhcpSettings, Network, NetworkId};
use crate::ip::{self, ParseError};
use crate::topology::{is_storable_name, DeviceId};

/// Errors raised by subnet forest operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubnetError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("Subnet {id} has already been split")]
    AlreadySplit { id: NetworkId },

    #[error("Subnet {id} is assigned and cannot be split")]
    AssignedLeafCannotSplit { id: NetworkId },

    #[error("Subnet {id} has been split; manage its children instead")]
    SplitNotAssignable { id: NetworkId },

    #[error("Unknown subnet reference {id}")]
    InvalidReference { id: u32 },

    #[error("Duplicate subnet id {id}")]
    DuplicateId { id: u32 },

    #[error("Children do not partition subnet {id}: {reason}")]
    InvalidPartition { id: NetworkId, reason: String },

    #[error("Invalid requirement: {reason}")]
    InvalidRequirement { reason: String },

    #[error("{network} cannot hold {required_hosts} hosts per subnet")]
    InsufficientCapacity {
        network: String,
        required_hosts: u64,
    },

    #[error("Subnet {network} is not aligned to its prefix length")]
    Misaligned { network: String },

    #[error("Name {name:?} contains '|' or a line break")]
    InvalidName { name: String },

    #[error("Splitting {network} would create {count} subnets (limit {limit})", limit = allocator::MAX_CHILDREN)]
    TooManySubnets { network: String, count: u64 },
}

/// Whether an assigned leaf may be split
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SplitPolicy {
    /// Split anyway and log a warning
    #[default]
    AllowAssigned,
    RejectAssigned,
}

#[derive(Debug, Clone, Default)]
pub struct SubnetForest {
    nodes: BTreeMap<NetworkId, Network>,
    next_id: u32,
    policy: SplitPolicy,
}

impl SubnetForest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: SplitPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub fn policy(&self) -> SplitPolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: SplitPolicy) {
        self.policy = policy;
    }

    fn take_id(&mut self) -> NetworkId {
        self.next_id += 1;
        NetworkId(self.next_id)
    }

    /// Register a block as a new root.
    pub fn add_root(&mut self, mut network: Network) -> NetworkId {
        let id = self.take_id();
        network.id = id;
        network.parent_id = None;
        network.children_ids.clear();
        self.nodes.insert(id, network);
        id
    }

    /// Parse a base network and register the blocks allocated from it as
    /// roots. The base block itself is not stored.
    pub fn plan(&mut self, base: &str, sizing: Sizing) -> Result<Vec<NetworkId>, SubnetError> {
        let base = allocator::parse_base_network(base)?;
        let children = allocator::allocate(&base, sizing)?;
        let ids: Vec<NetworkId> = children.into_iter().map(|c| self.add_root(c)).collect();
        info!("Planned {} subnet(s) from {}", ids.len(), base.cidr());
        Ok(ids)
    }

    /// Compute the children `sizing` would produce under `id`, without
    /// changing the forest.
    pub fn allocate_from(&self, id: NetworkId, sizing: Sizing) -> Result<Vec<Network>, SubnetError> {
        allocator::allocate(self.require(id)?, sizing)
    }

    /// Attach `children` under `parent` and mark it split.
    pub fn split(
        &mut self,
        parent: NetworkId,
        children: Vec<Network>,
    ) -> Result<Vec<NetworkId>, SubnetError> {
        let node = self.require(parent)?;
        if node.is_split {
            return Err(SubnetError::AlreadySplit { id: parent });
        }
        if let Assignment::Assigned { device } = node.assignment {
            match self.policy {
                SplitPolicy::RejectAssigned => {
                    return Err(SubnetError::AssignedLeafCannotSplit { id: parent })
                }
                SplitPolicy::AllowAssigned => warn!(
                    "Splitting subnet {} which is assigned to {}",
                    node.cidr(),
                    device
                ),
            }
        }
        check_partition(node, &children)?;

        let mut ids = Vec::with_capacity(children.len());
        for mut child in children {
            let id = self.take_id();
            child.id = id;
            child.parent_id = Some(parent);
            child.children_ids.clear();
            self.nodes.insert(id, child);
            ids.push(id);
        }

        if let Some(node) = self.nodes.get_mut(&parent) {
            node.is_split = true;
            node.assignment = Assignment::Split;
            node.assigned_interface = None;
            node.dhcp = DhcpSettings::default();
            node.children_ids = ids.clone();
            info!("Split {} into {} subnet(s)", node.cidr(), ids.len());
        }
        Ok(ids)
    }

    /// Split a leaf into blocks holding `hosts` hosts each.
    pub fn split_by_hosts(&mut self, id: NetworkId, hosts: u64) -> Result<Vec<NetworkId>, SubnetError> {
        let children = self.allocate_from(id, Sizing::Hosts(hosts))?;
        self.split(id, children)
    }

    /// Split a leaf into at least `count` equal blocks.
    pub fn split_by_count(&mut self, id: NetworkId, count: u64) -> Result<Vec<NetworkId>, SubnetError> {
        let children = self.allocate_from(id, Sizing::Subnets(count))?;
        self.split(id, children)
    }

    pub fn find(&self, id: NetworkId) -> Option<&Network> {
        self.nodes.get(&id)
    }

    pub fn require(&self, id: NetworkId) -> Result<&Network, SubnetError> {
        self.nodes
            .get(&id)
            .ok_or(SubnetError::InvalidReference { id: id.0 })
    }

    fn require_mut(&mut self, id: NetworkId) -> Result<&mut Network, SubnetError> {
        self.nodes
            .get_mut(&id)
            .ok_or(SubnetError::InvalidReference { id: id.0 })
    }

    pub fn children_of(&self, id: NetworkId) -> Vec<&Network> {
        self.find(id)
            .map(|n| n.children_ids.iter().filter_map(|c| self.nodes.get(c)).collect())
            .unwrap_or_default()
    }

    pub fn root_nodes(&self) -> Vec<&Network> {
        self.nodes.values().filter(|n| n.is_root()).collect()
    }

    /// All nodes in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Network> {
        self.nodes.values()
    }

    /// Nodes that have not been split, in id order.
    pub fn leaves(&self) -> impl Iterator<Item = &Network> {
        self.nodes.values().filter(|n| n.is_leaf())
    }

    pub fn find_by_cidr(&self, address: Ipv4Addr, prefix_length: u8) -> Option<&Network> {
        self.nodes
            .values()
            .find(|n| n.address == address && n.prefix_length == prefix_length)
    }

    pub fn host_capacity(&self, id: NetworkId) -> Option<u64> {
        self.find(id).map(|n| ip::host_capacity(n.prefix_length))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn rename(&mut self, id: NetworkId, name: Option<String>) -> Result<(), SubnetError> {
        if let Some(name) = name.as_deref() {
            check_name(name)?;
        }
        let node = self.require_mut(id)?;
        node.name = name.filter(|n| !n.trim().is_empty());
        debug!("Subnet {} renamed to {:?}", id, node.name);
        Ok(())
    }

    /// Record that `device` uses the subnet on `interface`.
    pub fn assign(
        &mut self,
        id: NetworkId,
        device: DeviceId,
        interface: Option<String>,
        vlan: u16,
    ) -> Result<(), SubnetError> {
        if let Some(interface) = interface.as_deref() {
            check_name(interface)?;
        }
        let node = self.require_mut(id)?;
        if node.is_split {
            return Err(SubnetError::SplitNotAssignable { id });
        }
        node.assignment = Assignment::Assigned { device };
        node.assigned_interface = interface;
        node.associated_vlan_id = vlan;
        info!("Subnet {} assigned to {}", node.cidr(), device);
        Ok(())
    }

    /// Return a leaf to `Free`, dropping its interface, VLAN and DHCP
    /// settings.
    pub fn release(&mut self, id: NetworkId) -> Result<(), SubnetError> {
        let node = self.require_mut(id)?;
        if node.is_split {
            return Err(SubnetError::SplitNotAssignable { id });
        }
        node.assignment = Assignment::Free;
        node.assigned_interface = None;
        node.associated_vlan_id = 0;
        node.dhcp = DhcpSettings::default();
        debug!("Subnet {} released", node.cidr());
        Ok(())
    }

    pub fn set_dhcp(&mut self, id: NetworkId, dhcp: DhcpSettings) -> Result<(), SubnetError> {
        let node = self.require_mut(id)?;
        if node.is_split {
            return Err(SubnetError::SplitNotAssignable { id });
        }
        node.dhcp = dhcp;
        Ok(())
    }

    pub fn clear_dhcp(&mut self, id: NetworkId) -> Result<(), SubnetError> {
        self.require_mut(id)?.dhcp = DhcpSettings::default();
        Ok(())
    }

    /// Release every leaf assigned to `device`. Returns the released ids.
    pub fn release_owned_by(&mut self, device: DeviceId) -> Vec<NetworkId> {
        let owned: Vec<NetworkId> = self
            .nodes
            .values()
            .filter(|n| n.assignment.owner() == Some(device))
            .map(|n| n.id)
            .collect();
        for id in &owned {
            if let Some(node) = self.nodes.get_mut(id) {
                node.assignment = Assignment::Free;
                node.assigned_interface = None;
                node.associated_vlan_id = 0;
                node.dhcp = DhcpSettings::default();
            }
        }
        owned
    }

    /// Disable DHCP on every subnet served by `device`. Returns the number
    /// of subnets changed.
    pub fn clear_dhcp_server(&mut self, device: DeviceId) -> usize {
        let mut changed = 0;
        for node in self.nodes.values_mut().filter(|n| n.dhcp.server == Some(device)) {
            node.dhcp = DhcpSettings::default();
            changed += 1;
        }
        changed
    }

    /// Drop every node. Ids restart at 1.
    pub fn reset(&mut self) {
        self.nodes.clear();
        self.next_id = 0;
    }

    /// Rebuild a forest from flat node records, re-linking `parent_id` to
    /// `children_ids`.
    ///
    /// Every record must be aligned to its prefix and named with storable
    /// names. Parent references must exist and must not loop. Each parent's
    /// children are ordered by address and must partition it exactly; the
    /// parent is then marked split. New ids continue after the highest
    /// loaded id.
    pub fn from_records(records: Vec<Network>) -> Result<Self, SubnetError> {
        let mut nodes = BTreeMap::new();
        for mut record in records {
            if record.id.0 == 0 {
                return Err(SubnetError::InvalidReference { id: 0 });
            }
            if !ip::is_aligned(record.address, record.prefix_length) {
                return Err(SubnetError::Misaligned {
                    network: record.cidr(),
                });
            }
            for name in [&record.name, &record.assigned_interface].into_iter().flatten() {
                check_name(name)?;
            }
            record.children_ids.clear();
            let id = record.id;
            if nodes.insert(id, record).is_some() {
                return Err(SubnetError::DuplicateId { id: id.0 });
            }
        }

        let mut families: BTreeMap<NetworkId, Vec<NetworkId>> = BTreeMap::new();
        for node in nodes.values() {
            if let Some(parent) = node.parent_id {
                if parent == node.id || !nodes.contains_key(&parent) {
                    return Err(SubnetError::InvalidReference { id: parent.0 });
                }
                families.entry(parent).or_default().push(node.id);
            }
        }

        // A parent chain longer than the node count has to loop
        for &start in nodes.keys() {
            let mut current = nodes.get(&start).and_then(|n| n.parent_id);
            let mut steps = 0;
            while let Some(parent) = current {
                steps += 1;
                if parent == start || steps > nodes.len() {
                    return Err(SubnetError::InvalidReference { id: start.0 });
                }
                current = nodes.get(&parent).and_then(|n| n.parent_id);
            }
        }

        for (parent, mut children) in families {
            children.sort_by_key(|c| nodes.get(c).map(|n| u32::from(n.address)));
            let child_records: Vec<Network> = children
                .iter()
                .filter_map(|c| nodes.get(c).cloned())
                .collect();
            if let Some(node) = nodes.get(&parent) {
                check_partition(node, &child_records)?;
            }
            if let Some(node) = nodes.get_mut(&parent) {
                node.is_split = true;
                node.assignment = Assignment::Split;
                node.children_ids = children;
            }
        }

        let next_id = nodes.keys().map(|id| id.0).max().unwrap_or(0);
        debug!("Rebuilt subnet forest with {} node(s)", nodes.len());
        Ok(Self {
            nodes,
            next_id,
            policy: SplitPolicy::default(),
        })
    }
}

fn check_name(name: &str) -> Result<(), SubnetError> {
    if is_storable_name(name) {
        Ok(())
    } else {
        Err(SubnetError::InvalidName {
            name: name.to_string(),
        })
    }
}

/// Children must be equal-sized, aligned blocks laid out back to back from
/// the parent's base address and covering it exactly.
fn check_partition(parent: &Network, children: &[Network]) -> Result<(), SubnetError> {
    let invalid = |reason: String| SubnetError::InvalidPartition {
        id: parent.id,
        reason,
    };

    let Some(first) = children.first() else {
        return Err(invalid("no children".to_string()));
    };
    if first.prefix_length < parent.prefix_length {
        return Err(invalid(format!(
            "child /{} is larger than parent /{}",
            first.prefix_length, parent.prefix_length
        )));
    }

    let child_block = ip::block_size(first.prefix_length);
    if children.len() as u64 * child_block != parent.block_size() {
        return Err(invalid(format!(
            "{} x /{} does not fill /{}",
            children.len(),
            first.prefix_length,
            parent.prefix_length
        )));
    }

    let base = u64::from(u32::from(parent.address));
    for (i, child) in children.iter().enumerate() {
        let expected = base + i as u64 * child_block;
        if child.prefix_length != first.prefix_length
            || u64::from(u32::from(child.address)) != expected
        {
            return Err(invalid(format!("unexpected child {}", child.cidr())));
        }
    }
    Ok(())
}
