//! Network topology module.
//!
//! Devices with named ports, the links between them, cable inference, the
//! batch connection workflow and the lab's VLAN database.

pub mod cable;
pub mod connections;
pub mod device;
pub mod graph;
pub mod types;
pub mod vlan;

// Re-export key types and functions for easier access
pub use cable::{infer_cable_type, CableType};
pub use connections::{auto_port, connect_batch, increment_port, BatchOutcome, BatchRequest};
pub use device::{Device, Interface, DEFAULT_VLAN};
pub use graph::{Link, TopologyError, TopologyGraph};
pub use types::{
    Color, DeviceClass, DeviceId, DeviceKind, LinkId, PortRef, Position, SecurityConfig,
    StaticRoute, PC_PORT, RESERVED_NAME_CHARS,
};
pub use types::is_storable_name;
pub use vlan::{assign_vlan_to_ports, parse_interface_range, PortSelector, VlanDatabase};
