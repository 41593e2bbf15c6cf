//! Lab session.
//!
//! A `Lab` owns the topology graph, the subnet forest and the VLAN database
//! and hosts the operations that touch more than one of them: binding
//! subnets to router interfaces or switch VLANs, DHCP setup with relay
//! resolution, and device deletion that also releases the device's subnets.

use log::{info, warn};
use std::net::Ipv4Addr;

use crate::relay;
use crate::subnet::{
    Assignment, DhcpSettings, Network, NetworkId, Sizing, SubnetError, SubnetForest,
};
use crate::topology::{
    assign_vlan_to_ports, connect_batch, parse_interface_range, BatchOutcome, BatchRequest,
    DeviceClass, DeviceId, DeviceKind, LinkId, SecurityConfig, StaticRoute, TopologyError,
    TopologyGraph, VlanDatabase,
};

/// Smallest prefix treated as a point-to-point link with no DHCP.
pub const POINT_TO_POINT_PREFIX: u8 = 30;

/// Enable secret set by `apply_security_defaults`
pub const DEFAULT_ENABLE_SECRET: &str = "class";
/// VTY password set by `apply_security_defaults`
pub const DEFAULT_VTY_PASSWORD: &str = "admin";

/// Errors raised by lab operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LabError {
    #[error(transparent)]
    Topology(#[from] TopologyError),

    #[error(transparent)]
    Subnet(#[from] SubnetError),

    #[error("{device} is not a {expected}")]
    WrongDeviceClass {
        device: String,
        expected: DeviceClass,
    },

    #[error("Could not find a relay address for DHCP server {server}; enter one manually")]
    ResolutionFailed { server: String },

    #[error("DHCP is not available on point-to-point subnet {network}")]
    DhcpOnPointToPoint { network: String },

    #[error("Subnet {network} is not assigned to a router")]
    NotAssignedToRouter { network: String },

    #[error("{device} has no static route #{index}")]
    InvalidRouteIndex { device: String, index: usize },
}

/// What `Lab::delete_device` cleaned up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionReport {
    pub hostname: String,
    pub cables_removed: usize,
    pub subnets_released: Vec<NetworkId>,
    /// Subnets whose DHCP server was the deleted device
    pub dhcp_cleared: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Lab {
    graph: TopologyGraph,
    forest: SubnetForest,
    vlans: VlanDatabase,
}

impl Lab {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assemble a lab from already built parts.
    pub fn from_parts(graph: TopologyGraph, forest: SubnetForest, vlans: VlanDatabase) -> Self {
        Self {
            graph,
            forest,
            vlans,
        }
    }

    pub fn graph(&self) -> &TopologyGraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut TopologyGraph {
        &mut self.graph
    }

    pub fn forest(&self) -> &SubnetForest {
        &self.forest
    }

    pub fn forest_mut(&mut self) -> &mut SubnetForest {
        &mut self.forest
    }

    pub fn vlans(&self) -> &VlanDatabase {
        &self.vlans
    }

    pub fn add_device(&mut self, hostname: &str, class: DeviceClass) -> Result<DeviceId, LabError> {
        Ok(self.graph.add_device(hostname, class)?)
    }

    /// Look a device up by hostname (exact match).
    pub fn device_id(&self, hostname: &str) -> Option<DeviceId> {
        self.graph.device_by_hostname(hostname).map(|d| d.id)
    }

    pub fn connect(
        &mut self,
        device_a: DeviceId,
        port_a: &str,
        device_b: DeviceId,
        port_b: &str,
    ) -> Result<LinkId, LabError> {
        Ok(self.graph.connect(device_a, port_a, device_b, port_b)?)
    }

    pub fn connect_batch(&mut self, request: &BatchRequest) -> Result<BatchOutcome, LabError> {
        Ok(connect_batch(&mut self.graph, request)?)
    }

    pub fn disconnect(&mut self, link: LinkId) -> Result<(), LabError> {
        self.graph.disconnect(link)?;
        Ok(())
    }

    /// Replace a device's security settings.
    pub fn set_security(
        &mut self,
        device: DeviceId,
        security: SecurityConfig,
    ) -> Result<(), LabError> {
        for field in [
            &security.enable_secret,
            &security.vty_password,
            &security.ssh_username,
            &security.ssh_password,
            &security.management_ip,
            &security.management_gateway,
            &security.allowed_remote_ip,
        ] {
            TopologyError::check_name(field)?;
        }
        self.graph.require_mut(device)?.security = security;
        Ok(())
    }

    /// Set the enable secret and VTY password on every router and switch.
    /// An empty value leaves that setting alone. Returns the number of
    /// devices updated.
    pub fn apply_global_passwords(
        &mut self,
        enable_secret: &str,
        vty_password: &str,
    ) -> Result<usize, LabError> {
        TopologyError::check_name(enable_secret)?;
        TopologyError::check_name(vty_password)?;

        let mut updated = 0;
        for device in self.graph.devices_mut() {
            if device.class() == DeviceClass::Pc {
                continue;
            }
            if !enable_secret.is_empty() {
                device.security.enable_secret = enable_secret.to_string();
            }
            if !vty_password.is_empty() {
                device.security.vty_password = vty_password.to_string();
            }
            updated += 1;
        }
        info!("Passwords applied to {} device(s)", updated);
        Ok(updated)
    }

    /// The exam passwords: enable secret `class`, VTY password `admin`.
    pub fn apply_security_defaults(&mut self) -> usize {
        let mut updated = 0;
        for device in self.graph.devices_mut() {
            if device.class() != DeviceClass::Pc {
                device.security.enable_secret = DEFAULT_ENABLE_SECRET.to_string();
                device.security.vty_password = DEFAULT_VTY_PASSWORD.to_string();
                updated += 1;
            }
        }
        info!("Exam passwords applied to {} device(s)", updated);
        updated
    }

    /// Plan the lab's top-level subnets from a base network.
    pub fn plan(&mut self, base: &str, sizing: Sizing) -> Result<Vec<NetworkId>, LabError> {
        Ok(self.forest.plan(base, sizing)?)
    }

    pub fn define_vlan(&mut self, id: u16, name: &str) -> Result<(), LabError> {
        Ok(self.vlans.define(id, name)?)
    }

    /// Delete a VLAN and move every port on it back to access VLAN 1.
    /// Returns the number of ports reset.
    pub fn delete_vlan(&mut self, id: u16) -> Result<usize, LabError> {
        let name = self.vlans.delete(id)?;
        let reset = self.graph.reset_vlan_ports(id);
        info!("Deleted VLAN {} ({}), {} port(s) back on VLAN 1", id, name, reset);
        Ok(reset)
    }

    /// Put the ports selected by `range` (see `parse_interface_range`) on
    /// `vlan` or make them trunks.
    pub fn assign_vlan_ports(
        &mut self,
        switch: DeviceId,
        range: &str,
        vlan: u16,
        is_trunk: bool,
    ) -> Result<Vec<String>, LabError> {
        self.require_class(switch, DeviceClass::Switch)?;
        let selectors = parse_interface_range(range);
        Ok(assign_vlan_to_ports(&mut self.graph, switch, &selectors, vlan, is_trunk)?)
    }

    fn require_class(&self, id: DeviceId, expected: DeviceClass) -> Result<(), LabError> {
        let device = self.graph.require(id)?;
        if device.class() != expected {
            return Err(LabError::WrongDeviceClass {
                device: device.hostname.clone(),
                expected,
            });
        }
        Ok(())
    }

    fn require_leaf(&self, net: NetworkId) -> Result<&Network, LabError> {
        let node = self.forest.require(net)?;
        if node.is_split {
            return Err(SubnetError::SplitNotAssignable { id: net }.into());
        }
        Ok(node)
    }

    /// Bind a subnet to a router interface. With a non-zero `vlan` the
    /// interface becomes the `.vlan` sub-interface of its base port.
    /// Returns the interface name stored on the subnet.
    pub fn assign_router_interface(
        &mut self,
        net: NetworkId,
        router: DeviceId,
        interface: &str,
        vlan: u16,
    ) -> Result<String, LabError> {
        self.require_class(router, DeviceClass::Router)?;
        let node = self.require_leaf(net)?;
        let unnamed = node.name.is_none();
        let point_to_point = node.prefix_length >= POINT_TO_POINT_PREFIX;

        let interface = if vlan > 0 {
            let base = interface.split('.').next().unwrap_or(interface);
            format!("{}.{}", base, vlan)
        } else {
            interface.to_string()
        };

        self.forest.assign(net, router, Some(interface.clone()), vlan)?;

        if vlan > 0 && unnamed {
            if let Some(name) = self.vlans.name_of(vlan) {
                self.forest.rename(net, Some(name.to_string()))?;
            }
        }
        if point_to_point {
            self.forest.clear_dhcp(net)?;
        }
        Ok(interface)
    }

    /// Bind a subnet to a switch VLAN, declaring the VLAN on the switch.
    pub fn assign_switch_vlan(
        &mut self,
        net: NetworkId,
        switch: DeviceId,
        vlan: u16,
        name: Option<&str>,
    ) -> Result<(), LabError> {
        self.require_class(switch, DeviceClass::Switch)?;
        if vlan == 0 || vlan > crate::topology::vlan::MAX_VLAN_ID {
            return Err(TopologyError::InvalidVlan { id: vlan }.into());
        }
        let node = self.require_leaf(net)?;

        let vlan_name = name
            .filter(|n| !n.trim().is_empty())
            .map(str::to_string)
            .or_else(|| node.name.clone())
            .unwrap_or_else(|| format!("VLAN{}", vlan));

        self.forest
            .assign(net, switch, Some(format!("VLAN {}", vlan)), vlan)?;
        if let Some(DeviceKind::Switch { vlans }) =
            self.graph.device_mut(switch).map(|d| &mut d.kind)
        {
            vlans.insert(vlan, vlan_name);
        }
        Ok(())
    }

    /// Checks shared by the DHCP operations. Returns the owning router.
    fn dhcp_target(&self, net: NetworkId) -> Result<DeviceId, LabError> {
        let node = self.require_leaf(net)?;
        let owner = match node.assignment {
            Assignment::Assigned { device }
                if self.graph.device(device).map(|d| d.class()) == Some(DeviceClass::Router) =>
            {
                device
            }
            _ => {
                return Err(LabError::NotAssignedToRouter {
                    network: node.cidr(),
                })
            }
        };
        if node.prefix_length >= POINT_TO_POINT_PREFIX {
            return Err(LabError::DhcpOnPointToPoint {
                network: node.cidr(),
            });
        }
        Ok(owner)
    }

    /// Serve DHCP for the subnet from its own router.
    pub fn enable_local_dhcp(&mut self, net: NetworkId, upper_half_only: bool) -> Result<(), LabError> {
        let owner = self.dhcp_target(net)?;
        self.forest.set_dhcp(
            net,
            DhcpSettings {
                enabled: true,
                upper_half_only,
                server: Some(owner),
                relay_helper: None,
            },
        )?;
        info!("DHCP for subnet {} served locally", net);
        Ok(())
    }

    /// Serve DHCP from a remote router, resolving the helper address to
    /// forward to. Leaves the subnet untouched when resolution fails.
    pub fn enable_relay_dhcp(
        &mut self,
        net: NetworkId,
        server: DeviceId,
        upper_half_only: bool,
    ) -> Result<Ipv4Addr, LabError> {
        self.dhcp_target(net)?;
        self.require_class(server, DeviceClass::Router)?;

        let helper = relay::resolve_relay_address(&self.forest, &self.graph, server).ok_or_else(
            || LabError::ResolutionFailed {
                server: self
                    .graph
                    .hostname(server)
                    .unwrap_or_default()
                    .to_string(),
            },
        )?;

        self.forest.set_dhcp(
            net,
            DhcpSettings {
                enabled: true,
                upper_half_only,
                server: Some(server),
                relay_helper: Some(helper),
            },
        )?;
        info!("DHCP for subnet {} relayed to {}", net, helper);
        Ok(helper)
    }

    /// Relay DHCP to a helper address given by hand.
    pub fn enable_relay_dhcp_manual(
        &mut self,
        net: NetworkId,
        server: Option<DeviceId>,
        helper: Ipv4Addr,
        upper_half_only: bool,
    ) -> Result<(), LabError> {
        self.dhcp_target(net)?;
        if let Some(server) = server {
            self.require_class(server, DeviceClass::Router)?;
        }
        self.forest.set_dhcp(
            net,
            DhcpSettings {
                enabled: true,
                upper_half_only,
                server,
                relay_helper: Some(helper),
            },
        )?;
        Ok(())
    }

    pub fn disable_dhcp(&mut self, net: NetworkId) -> Result<(), LabError> {
        Ok(self.forest.clear_dhcp(net)?)
    }

    /// Delete a device, unplug its cables, release its subnets and drop it
    /// as DHCP server wherever it was one.
    pub fn delete_device(&mut self, id: DeviceId) -> Result<DeletionReport, LabError> {
        let hostname = self.graph.require(id)?.hostname.clone();
        let cables_removed = self.graph.delete_device(id)?;
        let subnets_released = self.forest.release_owned_by(id);
        let dhcp_cleared = self.forest.clear_dhcp_server(id);

        if !subnets_released.is_empty() {
            warn!(
                "Released {} subnet(s) that were assigned to {}",
                subnets_released.len(),
                hostname
            );
        }
        Ok(DeletionReport {
            hostname,
            cables_removed,
            subnets_released,
            dhcp_cleared,
        })
    }

    /// Append a static route to a router. Returns its index.
    pub fn add_static_route(
        &mut self,
        router: DeviceId,
        destination: Ipv4Addr,
        mask: Ipv4Addr,
        next_hop: Ipv4Addr,
    ) -> Result<usize, LabError> {
        self.require_class(router, DeviceClass::Router)?;
        let device = self.graph.require_mut(router)?;
        let route = StaticRoute {
            destination,
            mask,
            next_hop,
        };
        info!("Static route {} added on {}", route, device.hostname);
        match &mut device.kind {
            DeviceKind::Router { static_routes } => {
                static_routes.push(route);
                Ok(static_routes.len() - 1)
            }
            _ => Err(LabError::WrongDeviceClass {
                device: device.hostname.clone(),
                expected: DeviceClass::Router,
            }),
        }
    }

    pub fn remove_static_route(
        &mut self,
        router: DeviceId,
        index: usize,
    ) -> Result<StaticRoute, LabError> {
        self.require_class(router, DeviceClass::Router)?;
        let device = self.graph.require_mut(router)?;
        let hostname = device.hostname.clone();
        match &mut device.kind {
            DeviceKind::Router { static_routes } if index < static_routes.len() => {
                Ok(static_routes.remove(index))
            }
            _ => Err(LabError::InvalidRouteIndex {
                device: hostname,
                index,
            }),
        }
    }

    /// Wipe everything: devices, links, subnets and VLANs other than 1.
    pub fn reset(&mut self) {
        self.graph.clear();
        self.forest.reset();
        self.vlans.reset();
        info!("Lab reset");
    }

    /// The reference exam scenario: two routers joined by a serial WAN,
    /// three switches, six hosts, VLANs 10/20 and four subnets with LAN A
    /// and LAN B relayed to Router1.
    pub fn exam_template() -> Result<Self, LabError> {
        let mut lab = Lab::new();

        let router0 = lab.add_device("Router0", DeviceClass::Router)?;
        let router1 = lab.add_device("Router1", DeviceClass::Router)?;
        let switch0 = lab.add_device("Switch0", DeviceClass::Switch)?;
        let switch1 = lab.add_device("Switch1", DeviceClass::Switch)?;
        let switch2 = lab.add_device("Switch2", DeviceClass::Switch)?;
        let hosts = ["PC0", "Laptop0", "PC1", "Laptop1", "PC2", "Laptop2"]
            .iter()
            .map(|name| lab.add_device(name, DeviceClass::Pc))
            .collect::<Result<Vec<_>, _>>()?;

        lab.connect(router0, "Gig0/1", switch0, "Gig0/1")?;
        lab.connect(router1, "Gig0/1", switch1, "Gig0/1")?;
        lab.connect(switch0, "Gig0/2", switch2, "Gig0/2")?;
        lab.connect(router0, "Se0/1/0", router1, "Se0/1/0")?;
        for (pair, switch) in hosts.chunks(2).zip([switch0, switch1, switch2]) {
            lab.connect(pair[0], "Fa0", switch, "Fa0/1")?;
            lab.connect(pair[1], "Fa0", switch, "Fa0/2")?;
        }

        lab.define_vlan(10, "LAN_A")?;
        lab.define_vlan(20, "LAN_B")?;

        let mut root = |address: [u8; 4], prefix: u8, name: &str| -> Result<NetworkId, LabError> {
            let id = lab.forest.add_root(Network::new(Ipv4Addr::from(address), prefix));
            lab.forest.rename(id, Some(name.to_string()))?;
            Ok(id)
        };
        let lan_a = root([192, 168, 1, 32], 27, "LAN A")?;
        let lan_b = root([192, 168, 1, 64], 27, "LAN B")?;
        let lan_c = root([192, 168, 1, 96], 27, "LAN C")?;
        let lan_d = root([192, 168, 1, 128], 30, "LAN D")?;

        lab.assign_router_interface(lan_a, router0, "Gig0/1", 10)?;
        lab.assign_router_interface(lan_b, router0, "Gig0/1", 20)?;
        lab.assign_router_interface(lan_c, router1, "Gig0/1", 0)?;
        lab.assign_router_interface(lan_d, router0, "Se0/1/0", 0)?;

        lab.enable_relay_dhcp(lan_a, router1, true)?;
        lab.enable_relay_dhcp(lan_b, router1, true)?;

        for switch in [switch0, switch2] {
            lab.assign_vlan_ports(switch, "Fa0/1", 10, false)?;
            lab.assign_vlan_ports(switch, "Fa0/2", 20, false)?;
        }

        info!("Exam template loaded");
        Ok(lab)
    }
}
