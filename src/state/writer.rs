use std::fmt::Write;

use super::*;
use crate::subnet::{Assignment, Network};
use crate::topology::{DeviceKind, TopologyGraph, DEFAULT_VLAN};

fn flag(value: bool) -> &'static str {
    if value {
        "1"
    } else {
        "0"
    }
}

/// Declaration-order index of a device, `-1` when absent.
fn index_of(graph: &TopologyGraph, id: Option<crate::topology::DeviceId>) -> i64 {
    id.and_then(|id| graph.device_index(id))
        .map_or(-1, |i| i as i64)
}

fn assignment_text(graph: &TopologyGraph, net: &Network) -> String {
    match net.assignment {
        Assignment::Free => ASSIGNMENT_FREE.to_string(),
        Assignment::Split => ASSIGNMENT_SPLIT.to_string(),
        Assignment::Assigned { device } => format!(
            "{}{} - {}",
            ASSIGNMENT_PREFIX,
            graph.hostname(device).unwrap_or_default(),
            net.assigned_interface.as_deref().unwrap_or_default()
        ),
    }
}

/// Render `lab` in the save-file format.
pub fn save_to_string(lab: &Lab) -> String {
    let graph = lab.graph();
    let mut out = String::new();

    // Writing into a String cannot fail
    let _ = writeln!(out, "{}", SECTION_DEVICES);
    for (i, d) in graph.devices().iter().enumerate() {
        let _ = writeln!(
            out,
            "{}|{}|{}|{}|{}|{}|{}|{}",
            i,
            d.hostname,
            d.class().label(),
            d.position.x,
            d.position.y,
            d.color.r,
            d.color.g,
            d.color.b
        );
    }

    let _ = writeln!(out, "\n{}", SECTION_CONNECTIONS);
    for link in graph.links() {
        let _ = writeln!(
            out,
            "{}|{}|{}|{}",
            graph.hostname(link.a.device).unwrap_or_default(),
            link.a.port,
            graph.hostname(link.b.device).unwrap_or_default(),
            link.b.port
        );
    }

    let _ = writeln!(out, "\n{}", SECTION_VLANS);
    for (id, name) in lab.vlans().iter() {
        let _ = writeln!(out, "{}|{}", id, name);
    }

    let _ = writeln!(out, "\n{}", SECTION_SUBNETS);
    for net in lab.forest().iter() {
        let _ = writeln!(
            out,
            "{}|{}|{}|{}|{}|{}|{}|{}|{}|{}|{}|{}",
            net.id.0,
            net.address,
            net.prefix_length,
            net.parent_id.map_or(0, |p| p.0),
            net.name.as_deref().unwrap_or_default(),
            assignment_text(graph, net),
            net.assigned_interface.as_deref().unwrap_or_default(),
            net.associated_vlan_id,
            flag(net.dhcp.enabled),
            flag(net.dhcp.upper_half_only),
            index_of(graph, net.dhcp.server),
            net.dhcp
                .relay_helper
                .map_or_else(|| NO_HELPER.to_string(), |h| h.to_string())
        );
    }

    let _ = writeln!(out, "\n{}", SECTION_DEVICE_CONFIGS);
    for (i, d) in graph.devices().iter().enumerate() {
        let s = &d.security;
        let _ = writeln!(
            out,
            "{}|{}|{}|{}|{}|{}|{}|{}|{}",
            i,
            s.enable_secret,
            s.vty_password,
            s.ssh_username,
            s.ssh_password,
            s.management_ip,
            flag(s.use_telnet),
            s.allowed_remote_ip,
            s.management_gateway
        );
    }

    let _ = writeln!(out, "\n{}", SECTION_INTERFACE_CONFIGS);
    for (i, d) in graph.devices().iter().enumerate() {
        for port in d
            .ports
            .iter()
            .filter(|p| p.vlan_id != DEFAULT_VLAN || p.is_trunk)
        {
            let _ = writeln!(
                out,
                "{}|{}|{}|{}",
                i,
                port.name,
                port.vlan_id,
                flag(port.is_trunk)
            );
        }
    }

    let _ = writeln!(out, "\n{}", SECTION_STATIC_ROUTES);
    for (i, d) in graph.devices().iter().enumerate() {
        if let DeviceKind::Router { static_routes } = &d.kind {
            for route in static_routes {
                let _ = writeln!(
                    out,
                    "{}|{}|{}|{}",
                    i, route.destination, route.mask, route.next_hop
                );
            }
        }
    }

    out
}
