//! Cable type inference.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::types::DeviceClass;

/// Physical cable needed between two ports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CableType {
    Serial,
    Crossover,
    StraightThrough,
}

impl CableType {
    pub fn label(&self) -> &'static str {
        match self {
            CableType::Serial => "Serial Cable",
            CableType::Crossover => "Crossover Cable",
            CableType::StraightThrough => "Copper Straight-Through",
        }
    }
}

impl fmt::Display for CableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

fn is_serial_port(name: &str) -> bool {
    name.chars()
        .next()
        .map_or(false, |c| c.eq_ignore_ascii_case(&'s'))
}

/// Pick the cable for a link. A serial port on either side wins; otherwise
/// devices of the same cabling group need a crossover cable and devices of
/// different groups a straight-through one.
pub fn infer_cable_type(
    class_a: DeviceClass,
    port_a: &str,
    class_b: DeviceClass,
    port_b: &str,
) -> CableType {
    if is_serial_port(port_a) || is_serial_port(port_b) {
        return CableType::Serial;
    }

    if class_a.cable_group() == class_b.cable_group() {
        CableType::Crossover
    } else {
        CableType::StraightThrough
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_router_to_switch_is_straight_through() {
        assert_eq!(
            infer_cable_type(DeviceClass::Router, "Gig0/1", DeviceClass::Switch, "Gig0/1"),
            CableType::StraightThrough
        );
        assert_eq!(
            infer_cable_type(DeviceClass::Pc, "Fa0", DeviceClass::Switch, "Fa0/1"),
            CableType::StraightThrough
        );
    }

    #[test]
    fn test_same_group_is_crossover() {
        assert_eq!(
            infer_cable_type(DeviceClass::Router, "Gig0/0", DeviceClass::Router, "Gig0/0"),
            CableType::Crossover
        );
        assert_eq!(
            infer_cable_type(DeviceClass::Router, "Gig0/0", DeviceClass::Pc, "Fa0"),
            CableType::Crossover
        );
        assert_eq!(
            infer_cable_type(DeviceClass::Switch, "Gig0/2", DeviceClass::Switch, "Gig0/2"),
            CableType::Crossover
        );
    }

    #[test]
    fn test_serial_overrides_groups() {
        assert_eq!(
            infer_cable_type(DeviceClass::Router, "Se0/1/0", DeviceClass::Router, "Se0/1/0"),
            CableType::Serial
        );
        assert_eq!(
            infer_cable_type(DeviceClass::Switch, "Fa0/1", DeviceClass::Router, "s0/0"),
            CableType::Serial
        );
    }
}
