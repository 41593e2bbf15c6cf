use log::{debug, warn};
use std::collections::{BTreeMap, HashMap};
use std::net::Ipv4Addr;

use super::*;
use crate::ip;
use crate::subnet::{Assignment, DhcpSettings, Network, NetworkId, SubnetForest};
use crate::topology::{
    Color, DeviceClass, DeviceId, DeviceKind, Position, StaticRoute, TopologyGraph, VlanDatabase,
};

/// One data row: source line number and its pipe-separated fields
struct Row<'a> {
    line: usize,
    fields: Vec<&'a str>,
}

impl<'a> Row<'a> {
    fn get(&self, i: usize) -> &'a str {
        self.fields.get(i).copied().unwrap_or_default()
    }

    fn skip(&self, section: &str, reason: &str) {
        warn!("Skipping {} row on line {}: {}", section, self.line, reason);
    }
}

/// Group data rows by section. Blank lines and `#` comments are dropped.
fn collect_sections(text: &str) -> BTreeMap<&str, Vec<Row<'_>>> {
    let mut sections: BTreeMap<&str, Vec<Row<'_>>> = BTreeMap::new();
    let mut current: Option<&str> = None;

    for (n, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if line.starts_with('[') {
            current = Some(line);
            continue;
        }
        match current {
            Some(section) => sections.entry(section).or_default().push(Row {
                line: n + 1,
                fields: line.split('|').collect(),
            }),
            None => warn!("Ignoring line {} outside any section", n + 1),
        }
    }

    for section in sections.keys() {
        if ![
            SECTION_DEVICES,
            SECTION_CONNECTIONS,
            SECTION_VLANS,
            SECTION_SUBNETS,
            SECTION_DEVICE_CONFIGS,
            SECTION_INTERFACE_CONFIGS,
            SECTION_STATIC_ROUTES,
        ]
        .contains(section)
        {
            warn!("Ignoring unknown section {}", section);
        }
    }
    sections
}

fn rows<'s, 'a>(sections: &'s BTreeMap<&str, Vec<Row<'a>>>, name: &str) -> &'s [Row<'a>] {
    sections.get(name).map(Vec::as_slice).unwrap_or(&[])
}

fn parse_flag(text: &str) -> bool {
    text.trim() == "1"
}

/// Rebuild a lab from save-file text.
///
/// Sections are collected first and applied in dependency order, so their
/// order in the text does not matter. Malformed rows are logged and skipped.
pub fn load_from_str(text: &str) -> Result<Lab, StateError> {
    let sections = collect_sections(text);

    let mut graph = TopologyGraph::new();
    let index = load_devices(&mut graph, rows(&sections, SECTION_DEVICES));
    load_connections(&mut graph, rows(&sections, SECTION_CONNECTIONS));
    let vlans = load_vlans(rows(&sections, SECTION_VLANS));
    let forest = load_subnets(&graph, &index, rows(&sections, SECTION_SUBNETS))?;
    load_device_configs(&mut graph, &index, rows(&sections, SECTION_DEVICE_CONFIGS));
    load_interface_configs(&mut graph, &index, rows(&sections, SECTION_INTERFACE_CONFIGS));
    load_static_routes(&mut graph, &index, rows(&sections, SECTION_STATIC_ROUTES));

    Ok(Lab::from_parts(graph, forest, vlans))
}

/// Returns saved index -> new device id.
fn load_devices(graph: &mut TopologyGraph, rows: &[Row<'_>]) -> HashMap<usize, DeviceId> {
    let mut index = HashMap::new();

    for row in rows {
        if row.fields.len() < 3 {
            row.skip(SECTION_DEVICES, "expected index|hostname|type");
            continue;
        }
        let Ok(saved_index) = row.get(0).trim().parse::<usize>() else {
            row.skip(SECTION_DEVICES, "bad index");
            continue;
        };
        let Some(class) = DeviceClass::from_label(row.get(2).trim()) else {
            row.skip(SECTION_DEVICES, "unknown device type");
            continue;
        };
        let id = match graph.add_device(row.get(1), class) {
            Ok(id) => id,
            Err(e) => {
                row.skip(SECTION_DEVICES, &e.to_string());
                continue;
            }
        };

        if row.fields.len() >= 8 {
            let numbers: Result<Vec<f32>, _> =
                (3..8).map(|i| row.get(i).trim().parse::<f32>()).collect();
            match (numbers, graph.device_mut(id)) {
                (Ok(v), Some(device)) => {
                    device.position = Position { x: v[0], y: v[1] };
                    device.color = Color {
                        r: v[2],
                        g: v[3],
                        b: v[4],
                    };
                }
                _ => debug!("Line {}: keeping default position and color", row.line),
            }
        }
        index.insert(saved_index, id);
    }
    index
}

fn load_connections(graph: &mut TopologyGraph, rows: &[Row<'_>]) {
    for row in rows {
        if row.fields.len() < 4 {
            row.skip(SECTION_CONNECTIONS, "expected hostA|portA|hostB|portB");
            continue;
        }
        let a = graph.device_by_hostname(row.get(0)).map(|d| d.id);
        let b = graph.device_by_hostname(row.get(2)).map(|d| d.id);
        let (Some(a), Some(b)) = (a, b) else {
            row.skip(SECTION_CONNECTIONS, "unknown hostname");
            continue;
        };
        if let Err(e) = graph.connect(a, row.get(1), b, row.get(3)) {
            row.skip(SECTION_CONNECTIONS, &e.to_string());
        }
    }
}

fn load_vlans(rows: &[Row<'_>]) -> VlanDatabase {
    let mut vlans = VlanDatabase::new();
    for row in rows {
        let Ok(id) = row.get(0).trim().parse::<u16>() else {
            row.skip(SECTION_VLANS, "bad VLAN id");
            continue;
        };
        if let Err(e) = vlans.define(id, row.get(1)) {
            row.skip(SECTION_VLANS, &e.to_string());
        }
    }
    vlans
}

/// Owner hostname out of `Assigned: <host> - <interface>`.
fn assigned_hostname(text: &str) -> Option<&str> {
    let rest = text.strip_prefix(ASSIGNMENT_PREFIX)?;
    Some(rest.split_once(" - ").map_or(rest, |(host, _)| host).trim())
}

fn parse_subnet(
    graph: &TopologyGraph,
    index: &HashMap<usize, DeviceId>,
    row: &Row<'_>,
) -> Option<Network> {
    if row.fields.len() < 7 {
        row.skip(SECTION_SUBNETS, "expected at least 7 fields");
        return None;
    }
    let id = match row.get(0).trim().parse::<u32>() {
        Ok(id) if id > 0 => NetworkId(id),
        _ => {
            row.skip(SECTION_SUBNETS, "bad subnet id");
            return None;
        }
    };
    let address = match ip::parse_address(row.get(1)) {
        Ok(a) => a,
        Err(e) => {
            row.skip(SECTION_SUBNETS, &e.to_string());
            return None;
        }
    };
    let prefix_length = match row.get(2).trim().parse::<u8>() {
        Ok(p) if p <= ip::IPV4_BITS => p,
        _ => {
            row.skip(SECTION_SUBNETS, "bad prefix length");
            return None;
        }
    };

    let network = ip::network_address(address, prefix_length);
    if network != address {
        warn!(
            "Line {}: {}/{} has host bits set, loading it as {}/{}",
            row.line, address, prefix_length, network, prefix_length
        );
    }

    let mut net = Network::new(network, prefix_length);
    net.id = id;
    net.parent_id = row
        .get(3)
        .trim()
        .parse::<u32>()
        .ok()
        .filter(|&p| p != 0)
        .map(NetworkId);
    net.name = Some(row.get(4).to_string()).filter(|n| !n.trim().is_empty());

    let assignment = row.get(5);
    if assignment.starts_with(ASSIGNMENT_PREFIX) {
        let owner = assigned_hostname(assignment)
            .and_then(|host| graph.device_by_hostname(host))
            .map(|d| d.id);
        match owner {
            Some(device) => {
                net.assignment = Assignment::Assigned { device };
                net.assigned_interface =
                    Some(row.get(6).to_string()).filter(|i| !i.is_empty());
            }
            None => warn!(
                "Line {}: owner of subnet {} not found, leaving it free",
                row.line,
                net.cidr()
            ),
        }
    }

    if row.fields.len() >= 8 {
        net.associated_vlan_id = row.get(7).trim().parse().unwrap_or(0);
    }

    if row.fields.len() >= 12 {
        let server = row
            .get(10)
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(|i| index.get(&i).copied());
        let helper = match row.get(11).trim() {
            NO_HELPER | "" => None,
            text => text.parse::<Ipv4Addr>().ok(),
        };
        net.dhcp = DhcpSettings {
            enabled: parse_flag(row.get(8)),
            upper_half_only: parse_flag(row.get(9)),
            server,
            relay_helper: helper,
        };
    }
    Some(net)
}

fn load_subnets(
    graph: &TopologyGraph,
    index: &HashMap<usize, DeviceId>,
    rows: &[Row<'_>],
) -> Result<SubnetForest, StateError> {
    let mut records: Vec<Network> = rows
        .iter()
        .filter_map(|row| parse_subnet(graph, index, row))
        .collect();

    // A child whose parent row is missing becomes a root
    let known: Vec<NetworkId> = records.iter().map(|n| n.id).collect();
    for net in records.iter_mut() {
        if let Some(parent) = net.parent_id.filter(|p| !known.contains(p)) {
            warn!(
                "Subnet {} refers to missing parent {}, loading it as a root",
                net.cidr(),
                parent
            );
            net.parent_id = None;
        }
    }

    Ok(SubnetForest::from_records(records)?)
}

fn load_device_configs(
    graph: &mut TopologyGraph,
    index: &HashMap<usize, DeviceId>,
    rows: &[Row<'_>],
) {
    for row in rows {
        if row.fields.len() < 8 {
            row.skip(SECTION_DEVICE_CONFIGS, "expected 8 fields");
            continue;
        }
        let Some(device) = row
            .get(0)
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(|i| index.get(&i))
            .and_then(|id| graph.device_mut(*id))
        else {
            row.skip(SECTION_DEVICE_CONFIGS, "unknown device index");
            continue;
        };
        let security = &mut device.security;
        security.enable_secret = row.get(1).to_string();
        security.vty_password = row.get(2).to_string();
        security.ssh_username = row.get(3).to_string();
        security.ssh_password = row.get(4).to_string();
        security.management_ip = row.get(5).to_string();
        security.use_telnet = parse_flag(row.get(6));
        security.allowed_remote_ip = row.get(7).to_string();
        security.management_gateway = row.get(8).to_string();
    }
}

fn load_interface_configs(
    graph: &mut TopologyGraph,
    index: &HashMap<usize, DeviceId>,
    rows: &[Row<'_>],
) {
    for row in rows {
        if row.fields.len() < 4 {
            row.skip(SECTION_INTERFACE_CONFIGS, "expected index|port|vlan|trunk");
            continue;
        }
        let Ok(vlan) = row.get(2).trim().parse::<u16>() else {
            row.skip(SECTION_INTERFACE_CONFIGS, "bad VLAN id");
            continue;
        };
        let Some(port) = row
            .get(0)
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(|i| index.get(&i))
            .and_then(|id| graph.device_mut(*id))
            .and_then(|d| d.interface_mut(row.get(1)))
        else {
            row.skip(SECTION_INTERFACE_CONFIGS, "unknown device or port");
            continue;
        };
        port.vlan_id = vlan;
        port.is_trunk = parse_flag(row.get(3));
    }
}

fn load_static_routes(
    graph: &mut TopologyGraph,
    index: &HashMap<usize, DeviceId>,
    rows: &[Row<'_>],
) {
    for row in rows {
        if row.fields.len() < 4 {
            row.skip(SECTION_STATIC_ROUTES, "expected router|destination|mask|next_hop");
            continue;
        }
        let addresses: Result<Vec<Ipv4Addr>, _> =
            (1..4).map(|i| ip::parse_address(row.get(i))).collect();
        let Ok(addresses) = addresses else {
            row.skip(SECTION_STATIC_ROUTES, "bad address");
            continue;
        };
        let kind = row
            .get(0)
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(|i| index.get(&i))
            .and_then(|id| graph.device_mut(*id))
            .map(|d| &mut d.kind);
        match kind {
            Some(DeviceKind::Router { static_routes }) => static_routes.push(StaticRoute {
                destination: addresses[0],
                mask: addresses[1],
                next_hop: addresses[2],
            }),
            _ => row.skip(SECTION_STATIC_ROUTES, "not a router"),
        }
    }
}
