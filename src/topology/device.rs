//! Devices and their interfaces.

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

use super::types::{
    Color, DeviceClass, DeviceId, DeviceKind, PortRef, Position, SecurityConfig, StaticRoute,
};

/// Default access VLAN of every port
pub const DEFAULT_VLAN: u16 = 1;

/// A named port on a device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interface {
    pub name: String,
    /// Far end of the cable plugged into this port, if any
    pub neighbor: Option<PortRef>,
    pub vlan_id: u16,
    pub is_trunk: bool,
    pub manual_ip: Option<Ipv4Addr>,
}

impl Interface {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            neighbor: None,
            vlan_id: DEFAULT_VLAN,
            is_trunk: false,
            manual_ip: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.neighbor.is_some()
    }

    /// Unplug the port, keeping its VLAN settings.
    pub fn clear_neighbor(&mut self) {
        self.neighbor = None;
    }
}

/// A router, switch or PC in the topology
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    pub hostname: String,
    pub kind: DeviceKind,
    pub ports: Vec<Interface>,
    pub position: Position,
    pub color: Color,
    pub security: SecurityConfig,
}

impl Device {
    /// Create a device with the default port catalog of its class.
    pub fn new(id: DeviceId, hostname: impl Into<String>, class: DeviceClass) -> Self {
        Self {
            id,
            hostname: hostname.into(),
            kind: DeviceKind::new(class),
            ports: class.default_ports().into_iter().map(Interface::new).collect(),
            position: Position::default(),
            color: Color::default(),
            security: SecurityConfig::default(),
        }
    }

    pub fn class(&self) -> DeviceClass {
        self.kind.class()
    }

    pub fn interface(&self, name: &str) -> Option<&Interface> {
        self.ports.iter().find(|p| p.name == name)
    }

    pub fn interface_mut(&mut self, name: &str) -> Option<&mut Interface> {
        self.ports.iter_mut().find(|p| p.name == name)
    }

    /// Append a port unless one with the same name already exists.
    pub fn ensure_interface(&mut self, name: &str) -> &mut Interface {
        let idx = match self.ports.iter().position(|p| p.name == name) {
            Some(idx) => idx,
            None => {
                self.ports.push(Interface::new(name));
                self.ports.len() - 1
            }
        };
        &mut self.ports[idx]
    }

    /// Names of all unplugged ports, in declaration order.
    pub fn available_ports(&self) -> Vec<String> {
        self.ports
            .iter()
            .filter(|p| !p.is_connected())
            .map(|p| p.name.clone())
            .collect()
    }

    /// Unplug every port whose neighbor is `target`. Returns the number of
    /// ports cleared.
    pub fn remove_neighbor_references(&mut self, target: DeviceId) -> usize {
        let mut cleared = 0;
        for port in &mut self.ports {
            if port.neighbor.as_ref().map(|n| n.device) == Some(target) {
                port.clear_neighbor();
                cleared += 1;
            }
        }
        cleared
    }

    pub fn static_routes(&self) -> &[StaticRoute] {
        match &self.kind {
            DeviceKind::Router { static_routes } => static_routes,
            _ => &[],
        }
    }
}
