//! Plan summary.
//!
//! A serializable snapshot of a lab (written as `plan.json`) and the
//! plain-text listings printed by the CLI.

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

use crate::ip;
use crate::lab::Lab;
use crate::subnet::{Assignment, Network};
use crate::topology::{DeviceKind, TopologyGraph};

/// Everything a student needs to configure the lab by hand
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanSummary {
    pub name: String,
    pub devices: Vec<DeviceSummary>,
    pub links: Vec<LinkSummary>,
    pub vlans: Vec<VlanSummary>,
    pub subnets: Vec<SubnetSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSummary {
    pub hostname: String,
    pub class: String,
    /// Ports with a cable plugged in
    pub connected_ports: Vec<String>,
    /// Routers only, as `a.b.c.d/n via h`
    pub static_routes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkSummary {
    pub a: String,
    pub a_port: String,
    pub b: String,
    pub b_port: String,
    pub cable: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VlanSummary {
    pub id: u16,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubnetSummary {
    pub id: u32,
    pub cidr: String,
    pub name: Option<String>,
    pub parent: Option<u32>,
    pub split: bool,
    pub mask: Ipv4Addr,
    pub first_usable: Ipv4Addr,
    pub last_usable: Ipv4Addr,
    pub broadcast: Ipv4Addr,
    pub hosts: u64,
    pub owner: Option<String>,
    pub interface: Option<String>,
    pub vlan: u16,
    pub dhcp: Option<DhcpSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DhcpSummary {
    pub server: Option<String>,
    pub helper: Option<Ipv4Addr>,
    /// Lower-half addresses kept out of the pool
    pub excluded: Option<(Ipv4Addr, Ipv4Addr)>,
}

fn hostname_of(graph: &TopologyGraph, id: Option<crate::topology::DeviceId>) -> Option<String> {
    id.and_then(|id| graph.hostname(id)).map(str::to_string)
}

fn summarize_subnet(graph: &TopologyGraph, net: &Network) -> SubnetSummary {
    let dhcp = net.dhcp.enabled.then(|| DhcpSummary {
        server: hostname_of(graph, net.dhcp.server),
        helper: net.dhcp.relay_helper,
        excluded: if net.dhcp.upper_half_only {
            ip::dhcp_excluded_range(net.address, net.prefix_length)
        } else {
            None
        },
    });

    SubnetSummary {
        id: net.id.0,
        cidr: net.cidr(),
        name: net.name.clone(),
        parent: net.parent_id.map(|p| p.0),
        split: net.is_split,
        mask: net.mask(),
        first_usable: net.first_usable(),
        last_usable: net.last_usable(),
        broadcast: net.broadcast(),
        hosts: net.host_capacity(),
        owner: hostname_of(graph, net.assignment.owner()),
        interface: net.assigned_interface.clone(),
        vlan: net.associated_vlan_id,
        dhcp,
    }
}

impl PlanSummary {
    pub fn from_lab(name: &str, lab: &Lab) -> Self {
        let graph = lab.graph();

        let devices = graph
            .devices()
            .iter()
            .map(|d| DeviceSummary {
                hostname: d.hostname.clone(),
                class: d.class().to_string(),
                connected_ports: d
                    .ports
                    .iter()
                    .filter(|p| p.is_connected())
                    .map(|p| p.name.clone())
                    .collect(),
                static_routes: match &d.kind {
                    DeviceKind::Router { static_routes } => {
                        static_routes.iter().map(|r| r.to_string()).collect()
                    }
                    _ => Vec::new(),
                },
            })
            .collect();

        let links = graph
            .links()
            .iter()
            .map(|l| LinkSummary {
                a: graph.hostname(l.a.device).unwrap_or_default().to_string(),
                a_port: l.a.port.clone(),
                b: graph.hostname(l.b.device).unwrap_or_default().to_string(),
                b_port: l.b.port.clone(),
                cable: l.cable_type.label().to_string(),
            })
            .collect();

        let vlans = lab
            .vlans()
            .iter()
            .map(|(id, name)| VlanSummary {
                id,
                name: name.to_string(),
            })
            .collect();

        let subnets = lab
            .forest()
            .iter()
            .map(|net| summarize_subnet(graph, net))
            .collect();

        Self {
            name: name.to_string(),
            devices,
            links,
            vlans,
            subnets,
        }
    }
}

fn subnet_line(graph: &TopologyGraph, net: &Network, depth: usize) -> String {
    let mut line = format!(
        "{}[{}] {} hosts={}",
        "  ".repeat(depth),
        net.id.0,
        net.cidr(),
        net.host_capacity()
    );
    if let Some(name) = &net.name {
        line.push_str(&format!(" \"{}\"", name));
    }
    match net.assignment {
        Assignment::Free => line.push_str(" free"),
        Assignment::Split => line.push_str(" split"),
        Assignment::Assigned { device } => {
            line.push_str(&format!(
                " -> {} {}",
                graph.hostname(device).unwrap_or("?"),
                net.assigned_interface.as_deref().unwrap_or_default()
            ));
        }
    }
    if net.dhcp.enabled {
        match net.dhcp.relay_helper {
            Some(helper) => line.push_str(&format!(" dhcp(relay {})", helper)),
            None => line.push_str(" dhcp"),
        }
    }
    line
}

/// Indented subnet hierarchy, one line per node, roots in id order.
pub fn subnet_tree(lab: &Lab) -> Vec<String> {
    let forest = lab.forest();
    let mut lines = Vec::new();
    let mut stack: Vec<(&Network, usize)> =
        forest.root_nodes().into_iter().rev().map(|n| (n, 0)).collect();

    while let Some((net, depth)) = stack.pop() {
        lines.push(subnet_line(lab.graph(), net, depth));
        stack.extend(
            forest
                .children_of(net.id)
                .into_iter()
                .rev()
                .map(|child| (child, depth + 1)),
        );
    }
    lines
}

/// Devices with their class, then one line per cable.
pub fn topology_lines(lab: &Lab) -> Vec<String> {
    let graph = lab.graph();
    let mut lines: Vec<String> = graph
        .devices()
        .iter()
        .map(|d| format!("{} ({})", d.hostname, d.class()))
        .collect();
    lines.extend(graph.links().iter().map(|l| {
        format!(
            "{} {} <-> {} {} [{}]",
            graph.hostname(l.a.device).unwrap_or("?"),
            l.a.port,
            graph.hostname(l.b.device).unwrap_or("?"),
            l.b.port,
            l.cable_type.label()
        )
    }));
    lines
}
