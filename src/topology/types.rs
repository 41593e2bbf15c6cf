//! Topology type definitions.
//!
//! Identifiers, the closed set of device classes and the class-specific
//! data each device carries.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv4Addr;

use crate::ip;

/// Stable device identifier. Never reused after a device is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceId(pub u32);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "device#{}", self.0)
    }
}

/// Stable link identifier. Never reused after a link is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LinkId(pub u32);

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link#{}", self.0)
    }
}

/// Kind of device in the lab
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    Router,
    Switch,
    Pc,
}

impl DeviceClass {
    /// Upper-case tag used in save files
    pub fn label(&self) -> &'static str {
        match self {
            DeviceClass::Router => "ROUTER",
            DeviceClass::Switch => "SWITCH",
            DeviceClass::Pc => "PC",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "ROUTER" => Some(DeviceClass::Router),
            "SWITCH" => Some(DeviceClass::Switch),
            "PC" => Some(DeviceClass::Pc),
            _ => None,
        }
    }

    /// Port catalog a freshly created device starts with, in declaration order.
    pub fn default_ports(&self) -> Vec<String> {
        match self {
            DeviceClass::Router => ["Gig0/0", "Gig0/1", "Gig0/2", "Se0/1/0", "Se0/1/1"]
                .iter()
                .map(|p| p.to_string())
                .collect(),
            DeviceClass::Switch => (1..=24)
                .map(|i| format!("Fa0/{}", i))
                .chain(["Gig0/1".to_string(), "Gig0/2".to_string()])
                .collect(),
            DeviceClass::Pc => vec![PC_PORT.to_string()],
        }
    }

    /// Cabling group: routers and PCs are group 1, switches group 2.
    pub fn cable_group(&self) -> u8 {
        match self {
            DeviceClass::Switch => 2,
            DeviceClass::Router | DeviceClass::Pc => 1,
        }
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The single network port of a PC.
pub const PC_PORT: &str = "Fa0";

/// Characters that separate fields and rows in the save file.
pub const RESERVED_NAME_CHARS: [char; 3] = ['|', '\n', '\r'];

/// Whether a name can be stored in a save-file field as-is.
pub fn is_storable_name(name: &str) -> bool {
    !name.contains(&RESERVED_NAME_CHARS[..])
}

/// One end of a link: a device and one of its port names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortRef {
    pub device: DeviceId,
    pub port: String,
}

impl PortRef {
    pub fn new(device: DeviceId, port: impl Into<String>) -> Self {
        Self {
            device,
            port: port.into(),
        }
    }
}

/// Canvas position used by drawing front ends.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

/// RGB color in the 0.0..=1.0 range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Default for Color {
    fn default() -> Self {
        Self {
            r: 1.0,
            g: 1.0,
            b: 1.0,
        }
    }
}

/// Access and management settings of a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub enable_secret: String,
    pub vty_password: String,
    pub ssh_username: String,
    pub ssh_password: String,
    pub management_ip: String,
    pub management_gateway: String,
    /// Telnet when true, SSH otherwise
    pub use_telnet: bool,
    pub allowed_remote_ip: String,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enable_secret: String::new(),
            vty_password: String::new(),
            ssh_username: String::new(),
            ssh_password: String::new(),
            management_ip: String::new(),
            management_gateway: String::new(),
            use_telnet: true,
            allowed_remote_ip: String::new(),
        }
    }
}

/// A static route configured on a router.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticRoute {
    pub destination: Ipv4Addr,
    pub mask: Ipv4Addr,
    pub next_hop: Ipv4Addr,
}

impl StaticRoute {
    pub fn prefix_length(&self) -> u8 {
        ip::prefix_from_mask(self.mask)
    }
}

impl fmt::Display for StaticRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} via {}",
            self.destination,
            self.prefix_length(),
            self.next_hop
        )
    }
}

/// Class-specific device data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceKind {
    Router { static_routes: Vec<StaticRoute> },
    /// VLANs declared locally on the switch, id -> name
    Switch { vlans: BTreeMap<u16, String> },
    Pc,
}

impl DeviceKind {
    pub fn new(class: DeviceClass) -> Self {
        match class {
            DeviceClass::Router => DeviceKind::Router {
                static_routes: Vec::new(),
            },
            DeviceClass::Switch => DeviceKind::Switch {
                vlans: BTreeMap::new(),
            },
            DeviceClass::Pc => DeviceKind::Pc,
        }
    }

    pub fn class(&self) -> DeviceClass {
        match self {
            DeviceKind::Router { .. } => DeviceClass::Router,
            DeviceKind::Switch { .. } => DeviceClass::Switch,
            DeviceKind::Pc => DeviceClass::Pc,
        }
    }
}
