//! The topology graph: devices, their ports and the links between them.
//!
//! Interface neighbor references and `Link` records describe the same
//! cabling twice. Every mutation here updates both inside one call and
//! validates before it touches anything, so an error never leaves the two
//! views out of step.

use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::cable::{infer_cable_type, CableType};
use super::device::Device;
use super::types::{is_storable_name, DeviceClass, DeviceId, LinkId, PortRef};

/// Errors raised by topology operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TopologyError {
    #[error("A device named '{hostname}' already exists")]
    DuplicateHostname { hostname: String },

    #[error("Port {port} on {device} is already connected")]
    PortBusy { device: String, port: String },

    #[error("Port {port} not found on {device}")]
    PortNotFound { device: String, port: String },

    #[error("No free ports on {device}")]
    NoFreePort { device: String },

    #[error("Cannot connect {device} to itself")]
    SelfLink { device: String },

    #[error("Unknown {kind} reference {id}")]
    InvalidReference { kind: &'static str, id: u32 },

    #[error("VLAN {id} is outside the range 1-4094")]
    InvalidVlan { id: u16 },

    #[error("VLAN {id} is not defined")]
    UnknownVlan { id: u16 },

    #[error("The default VLAN 1 cannot be deleted")]
    DefaultVlanProtected,

    #[error("Name {name:?} contains '|' or a line break")]
    InvalidName { name: String },
}

impl TopologyError {
    pub(crate) fn unknown_device(id: DeviceId) -> Self {
        TopologyError::InvalidReference {
            kind: "device",
            id: id.0,
        }
    }

    pub(crate) fn unknown_link(id: LinkId) -> Self {
        TopologyError::InvalidReference {
            kind: "link",
            id: id.0,
        }
    }

    /// `InvalidName` unless `name` is storable.
    pub(crate) fn check_name(name: &str) -> Result<(), Self> {
        if is_storable_name(name) {
            Ok(())
        } else {
            Err(TopologyError::InvalidName {
                name: name.to_string(),
            })
        }
    }
}

/// A cable between two ports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub id: LinkId,
    pub a: PortRef,
    pub b: PortRef,
    pub cable_type: CableType,
}

impl Link {
    pub fn involves(&self, device: DeviceId) -> bool {
        self.a.device == device || self.b.device == device
    }

    /// True when this link plugs into `port` on `device`.
    pub fn uses_port(&self, device: DeviceId, port: &str) -> bool {
        (self.a.device == device && self.a.port == port)
            || (self.b.device == device && self.b.port == port)
    }

    pub fn joins(&self, x: DeviceId, y: DeviceId) -> bool {
        (self.a.device == x && self.b.device == y) || (self.a.device == y && self.b.device == x)
    }
}

/// Devices in declaration order plus the link list.
#[derive(Debug, Clone, Default)]
pub struct TopologyGraph {
    devices: Vec<Device>,
    links: Vec<Link>,
    next_device_id: u32,
    next_link_id: u32,
}

impl TopologyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a device with the default port catalog of its class.
    /// Hostnames are unique and compared case-sensitively.
    pub fn add_device(
        &mut self,
        hostname: &str,
        class: DeviceClass,
    ) -> Result<DeviceId, TopologyError> {
        TopologyError::check_name(hostname)?;
        if self.device_by_hostname(hostname).is_some() {
            return Err(TopologyError::DuplicateHostname {
                hostname: hostname.to_string(),
            });
        }

        self.next_device_id += 1;
        let id = DeviceId(self.next_device_id);
        self.devices.push(Device::new(id, hostname, class));
        info!("Added {} {} ({})", class, hostname, id);
        Ok(id)
    }

    pub fn device(&self, id: DeviceId) -> Option<&Device> {
        self.devices.iter().find(|d| d.id == id)
    }

    pub fn device_mut(&mut self, id: DeviceId) -> Option<&mut Device> {
        self.devices.iter_mut().find(|d| d.id == id)
    }

    /// Look up a device, turning a miss into an error.
    pub fn require(&self, id: DeviceId) -> Result<&Device, TopologyError> {
        self.device(id).ok_or_else(|| TopologyError::unknown_device(id))
    }

    pub fn require_mut(&mut self, id: DeviceId) -> Result<&mut Device, TopologyError> {
        self.device_mut(id).ok_or_else(|| TopologyError::unknown_device(id))
    }

    pub fn device_by_hostname(&self, hostname: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.hostname == hostname)
    }

    /// Position of a device in declaration order.
    pub fn device_index(&self, id: DeviceId) -> Option<usize> {
        self.devices.iter().position(|d| d.id == id)
    }

    /// Device at a declaration-order position.
    pub fn device_at(&self, index: usize) -> Option<&Device> {
        self.devices.get(index)
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn devices_mut(&mut self) -> impl Iterator<Item = &mut Device> {
        self.devices.iter_mut()
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn link(&self, id: LinkId) -> Option<&Link> {
        self.links.iter().find(|l| l.id == id)
    }

    pub fn hostname(&self, id: DeviceId) -> Option<&str> {
        self.device(id).map(|d| d.hostname.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Unplugged ports of a device, in declaration order.
    pub fn available_ports(&self, id: DeviceId) -> Result<Vec<String>, TopologyError> {
        Ok(self.require(id)?.available_ports())
    }

    /// Cable type a link between the given ports would need.
    pub fn infer_cable_type(
        &self,
        device_a: DeviceId,
        port_a: &str,
        device_b: DeviceId,
        port_b: &str,
    ) -> Result<CableType, TopologyError> {
        let a = self.require(device_a)?;
        let b = self.require(device_b)?;
        Ok(infer_cable_type(a.class(), port_a, b.class(), port_b))
    }

    /// Plug a cable between two ports, creating either port if the device
    /// does not have it yet.
    pub fn connect(
        &mut self,
        device_a: DeviceId,
        port_a: &str,
        device_b: DeviceId,
        port_b: &str,
    ) -> Result<LinkId, TopologyError> {
        TopologyError::check_name(port_a)?;
        TopologyError::check_name(port_b)?;
        let idx_a = self
            .device_index(device_a)
            .ok_or_else(|| TopologyError::unknown_device(device_a))?;
        let idx_b = self
            .device_index(device_b)
            .ok_or_else(|| TopologyError::unknown_device(device_b))?;

        if idx_a == idx_b {
            return Err(TopologyError::SelfLink {
                device: self.devices[idx_a].hostname.clone(),
            });
        }

        for (idx, port) in [(idx_a, port_a), (idx_b, port_b)] {
            let device = &self.devices[idx];
            if device.interface(port).map_or(false, |i| i.is_connected()) {
                return Err(TopologyError::PortBusy {
                    device: device.hostname.clone(),
                    port: port.to_string(),
                });
            }
        }

        let cable_type = infer_cable_type(
            self.devices[idx_a].class(),
            port_a,
            self.devices[idx_b].class(),
            port_b,
        );

        self.devices[idx_a].ensure_interface(port_a).neighbor = Some(PortRef::new(device_b, port_b));
        self.devices[idx_b].ensure_interface(port_b).neighbor = Some(PortRef::new(device_a, port_a));

        self.next_link_id += 1;
        let id = LinkId(self.next_link_id);
        self.links.push(Link {
            id,
            a: PortRef::new(device_a, port_a),
            b: PortRef::new(device_b, port_b),
            cable_type,
        });

        info!(
            "Connected {} ({}) <--> {} ({}) [{}]",
            self.devices[idx_a].hostname,
            port_a,
            self.devices[idx_b].hostname,
            port_b,
            cable_type
        );
        Ok(id)
    }

    /// Remove a link and unplug both of its ports.
    pub fn disconnect(&mut self, id: LinkId) -> Result<Link, TopologyError> {
        let pos = self
            .links
            .iter()
            .position(|l| l.id == id)
            .ok_or_else(|| TopologyError::unknown_link(id))?;
        let link = self.links.remove(pos);

        for end in [&link.a, &link.b] {
            if let Some(port) = self
                .device_mut(end.device)
                .and_then(|d| d.interface_mut(&end.port))
            {
                port.clear_neighbor();
            }
        }

        info!("Disconnected {}", id);
        Ok(link)
    }

    /// Unplug every cable in the topology. Returns the number removed.
    pub fn disconnect_all(&mut self) -> usize {
        for device in &mut self.devices {
            for port in &mut device.ports {
                port.clear_neighbor();
            }
        }
        let removed = self.links.len();
        self.links.clear();
        info!("Disconnected all {} links", removed);
        removed
    }

    /// Delete a device, clearing every reference to it from other devices'
    /// ports and the link list. Returns the number of cables removed.
    pub fn delete_device(&mut self, id: DeviceId) -> Result<usize, TopologyError> {
        let idx = self
            .device_index(id)
            .ok_or_else(|| TopologyError::unknown_device(id))?;

        for device in self.devices.iter_mut().filter(|d| d.id != id) {
            let cleared = device.remove_neighbor_references(id);
            if cleared > 0 {
                debug!("Cleared {} port(s) on {} facing {}", cleared, device.hostname, id);
            }
        }

        let before = self.links.len();
        self.links.retain(|l| !l.involves(id));
        let removed = before - self.links.len();

        let device = self.devices.remove(idx);
        info!(
            "Deleted {} and unplugged {} cable(s)",
            device.hostname, removed
        );
        Ok(removed)
    }

    /// Link plugged into `port` on `device`, if any.
    pub fn find_link(&self, device: DeviceId, port: &str) -> Option<&Link> {
        self.links.iter().find(|l| l.uses_port(device, port))
    }

    pub fn links_between(&self, a: DeviceId, b: DeviceId) -> Vec<&Link> {
        self.links.iter().filter(|l| l.joins(a, b)).collect()
    }

    pub fn are_directly_linked(&self, a: DeviceId, b: DeviceId) -> bool {
        self.links.iter().any(|l| l.joins(a, b))
    }

    /// Reset every port on VLAN `vlan` to access VLAN 1. Returns the number
    /// of ports changed.
    pub fn reset_vlan_ports(&mut self, vlan: u16) -> usize {
        let mut changed = 0;
        for device in &mut self.devices {
            for port in device.ports.iter_mut().filter(|p| p.vlan_id == vlan) {
                port.vlan_id = super::device::DEFAULT_VLAN;
                port.is_trunk = false;
                changed += 1;
            }
        }
        changed
    }

    /// Drop every device and link. Ids keep counting upward.
    pub fn clear(&mut self) {
        self.devices.clear();
        self.links.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_routers() -> (TopologyGraph, DeviceId, DeviceId) {
        let mut graph = TopologyGraph::new();
        let r0 = graph.add_device("Router0", DeviceClass::Router).unwrap();
        let r1 = graph.add_device("Router1", DeviceClass::Router).unwrap();
        (graph, r0, r1)
    }

    #[test]
    fn test_duplicate_hostname_is_case_sensitive() {
        let mut graph = TopologyGraph::new();
        graph.add_device("PC0", DeviceClass::Pc).unwrap();
        assert_eq!(
            graph.add_device("PC0", DeviceClass::Router),
            Err(TopologyError::DuplicateHostname {
                hostname: "PC0".to_string()
            })
        );
        assert!(graph.add_device("pc0", DeviceClass::Pc).is_ok());
        assert_eq!(graph.devices().len(), 2);
    }

    #[test]
    fn test_separator_characters_rejected_in_names() {
        let (mut graph, r0, r1) = two_routers();
        assert!(matches!(
            graph.add_device("Core|1", DeviceClass::Router),
            Err(TopologyError::InvalidName { .. })
        ));
        assert!(graph.add_device("Core\n1", DeviceClass::Router).is_err());
        assert_eq!(graph.devices().len(), 2);

        assert!(matches!(
            graph.connect(r0, "Gig0/0|x", r1, "Gig0/0"),
            Err(TopologyError::InvalidName { .. })
        ));
        assert!(graph.links().is_empty());
        assert!(graph.device(r1).unwrap().interface("Gig0/0").unwrap().neighbor.is_none());
    }

    #[test]
    fn test_connect_is_symmetric() {
        let (mut graph, r0, r1) = two_routers();
        let link = graph.connect(r0, "Se0/1/0", r1, "Se0/1/0").unwrap();

        let a = graph.device(r0).unwrap().interface("Se0/1/0").unwrap();
        let b = graph.device(r1).unwrap().interface("Se0/1/0").unwrap();
        assert_eq!(a.neighbor, Some(PortRef::new(r1, "Se0/1/0")));
        assert_eq!(b.neighbor, Some(PortRef::new(r0, "Se0/1/0")));
        assert_eq!(graph.links().len(), 1);
        assert_eq!(graph.link(link).unwrap().cable_type, CableType::Serial);
        assert!(graph.are_directly_linked(r1, r0));

        graph.disconnect(link).unwrap();
        assert!(!graph.device(r0).unwrap().interface("Se0/1/0").unwrap().is_connected());
        assert!(!graph.device(r1).unwrap().interface("Se0/1/0").unwrap().is_connected());
        assert!(graph.links().is_empty());
        assert!(graph.disconnect(link).is_err());
    }

    #[test]
    fn test_connect_busy_port() {
        let (mut graph, r0, r1) = two_routers();
        let pc = graph.add_device("PC0", DeviceClass::Pc).unwrap();
        graph.connect(r0, "Gig0/0", r1, "Gig0/0").unwrap();

        let err = graph.connect(pc, "Fa0", r0, "Gig0/0").unwrap_err();
        assert_eq!(
            err,
            TopologyError::PortBusy {
                device: "Router0".to_string(),
                port: "Gig0/0".to_string()
            }
        );
        assert!(!graph.device(pc).unwrap().interface("Fa0").unwrap().is_connected());
        assert_eq!(graph.links().len(), 1);
    }

    #[test]
    fn test_failed_connect_leaves_no_auto_created_port() {
        let (mut graph, r0, r1) = two_routers();
        graph.connect(r0, "Gig0/0", r1, "Gig0/0").unwrap();

        assert!(graph.connect(r0, "Gig0/9", r1, "Gig0/0").is_err());
        assert!(graph.device(r0).unwrap().interface("Gig0/9").is_none());
    }

    #[test]
    fn test_connect_auto_creates_ports() {
        let (mut graph, r0, r1) = two_routers();
        graph.connect(r0, "Gig0/3", r1, "Gig0/3").unwrap();
        assert_eq!(graph.device(r0).unwrap().ports.len(), 6);
        assert!(graph.device(r1).unwrap().interface("Gig0/3").unwrap().is_connected());
    }

    #[test]
    fn test_self_link_rejected() {
        let (mut graph, r0, _) = two_routers();
        assert!(matches!(
            graph.connect(r0, "Gig0/0", r0, "Gig0/1"),
            Err(TopologyError::SelfLink { .. })
        ));
        assert!(graph.links().is_empty());
    }

    #[test]
    fn test_delete_device_cleans_references() {
        let mut graph = TopologyGraph::new();
        let sw = graph.add_device("Switch0", DeviceClass::Switch).unwrap();
        let pc0 = graph.add_device("PC0", DeviceClass::Pc).unwrap();
        let pc1 = graph.add_device("PC1", DeviceClass::Pc).unwrap();
        let r0 = graph.add_device("Router0", DeviceClass::Router).unwrap();
        graph.connect(pc0, "Fa0", sw, "Fa0/1").unwrap();
        graph.connect(pc1, "Fa0", sw, "Fa0/2").unwrap();
        graph.connect(r0, "Gig0/1", sw, "Gig0/1").unwrap();

        let removed = graph.delete_device(sw).unwrap();
        assert_eq!(removed, 3);
        assert!(graph.device(sw).is_none());
        assert!(graph.links().iter().all(|l| !l.involves(sw)));
        for device in graph.devices() {
            assert!(device
                .ports
                .iter()
                .all(|p| p.neighbor.as_ref().map(|n| n.device) != Some(sw)));
        }
        assert_eq!(graph.available_ports(pc0).unwrap(), vec!["Fa0"]);
    }

    #[test]
    fn test_ids_are_not_reused() {
        let mut graph = TopologyGraph::new();
        let a = graph.add_device("A", DeviceClass::Pc).unwrap();
        graph.delete_device(a).unwrap();
        let b = graph.add_device("A", DeviceClass::Pc).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_declaration_order_mapping() {
        let (mut graph, r0, r1) = two_routers();
        let pc = graph.add_device("PC0", DeviceClass::Pc).unwrap();
        assert_eq!(graph.device_index(r1), Some(1));
        graph.delete_device(r0).unwrap();
        assert_eq!(graph.device_index(pc), Some(1));
        assert_eq!(graph.device_at(0).map(|d| d.id), Some(r1));
    }

    #[test]
    fn test_disconnect_all() {
        let (mut graph, r0, r1) = two_routers();
        graph.connect(r0, "Gig0/0", r1, "Gig0/0").unwrap();
        graph.connect(r0, "Se0/1/0", r1, "Se0/1/0").unwrap();
        assert_eq!(graph.links_between(r0, r1).len(), 2);

        assert_eq!(graph.disconnect_all(), 2);
        assert!(graph.links().is_empty());
        assert_eq!(graph.available_ports(r0).unwrap().len(), 5);
    }

    #[test]
    fn test_find_link() {
        let (mut graph, r0, r1) = two_routers();
        let id = graph.connect(r0, "Gig0/0", r1, "Gig0/2").unwrap();
        assert_eq!(graph.find_link(r1, "Gig0/2").map(|l| l.id), Some(id));
        assert!(graph.find_link(r1, "Gig0/0").is_none());
    }
}
