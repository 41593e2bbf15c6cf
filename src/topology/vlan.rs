//! VLAN database and port-range selection.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::device::DEFAULT_VLAN;
use super::graph::{TopologyError, TopologyGraph};
use super::types::DeviceId;

pub const MAX_VLAN_ID: u16 = 4094;

/// Highest port number a numeric selection may name.
pub const MAX_PORT_NUMBER: u32 = 4096;

/// VLANs defined for the lab, id -> name. VLAN 1 is always present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VlanDatabase {
    vlans: BTreeMap<u16, String>,
}

impl Default for VlanDatabase {
    fn default() -> Self {
        let mut vlans = BTreeMap::new();
        vlans.insert(DEFAULT_VLAN, "default".to_string());
        Self { vlans }
    }
}

impl VlanDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define or rename a VLAN.
    pub fn define(&mut self, id: u16, name: &str) -> Result<(), TopologyError> {
        if id == 0 || id > MAX_VLAN_ID {
            return Err(TopologyError::InvalidVlan { id });
        }
        TopologyError::check_name(name)?;
        self.vlans.insert(id, name.to_string());
        info!("VLAN {} ({}) defined", id, name);
        Ok(())
    }

    /// Remove a VLAN from the database, returning its name. Ports still on
    /// the VLAN are not touched here; see `TopologyGraph::reset_vlan_ports`.
    pub fn delete(&mut self, id: u16) -> Result<String, TopologyError> {
        if id == DEFAULT_VLAN {
            return Err(TopologyError::DefaultVlanProtected);
        }
        self.vlans
            .remove(&id)
            .ok_or(TopologyError::UnknownVlan { id })
    }

    pub fn exists(&self, id: u16) -> bool {
        self.vlans.contains_key(&id)
    }

    pub fn name_of(&self, id: u16) -> Option<&str> {
        self.vlans.get(&id).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u16, &str)> {
        self.vlans.iter().map(|(id, name)| (*id, name.as_str()))
    }

    pub fn len(&self) -> usize {
        self.vlans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vlans.is_empty()
    }

    /// Back to just VLAN 1.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// One token of a port selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortSelector {
    /// Port matched by name
    Name(String),
    /// Port whose name ends with `/N`
    Number(u32),
}

/// Parse a port selection such as `1-3,5,Gig0/1`.
///
/// Tokens containing letters are port names. Numeric tokens are single
/// port numbers or `A-B` ranges (either order). Malformed numeric tokens and
/// numbers above `MAX_PORT_NUMBER` are skipped with a warning.
pub fn parse_interface_range(input: &str) -> Vec<PortSelector> {
    let mut selectors = Vec::new();

    for token in input.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        if token.chars().any(|c| c.is_ascii_alphabetic()) {
            selectors.push(PortSelector::Name(token.to_string()));
            continue;
        }

        match token.split_once('-') {
            Some((lo, hi)) => match (lo.trim().parse::<u32>(), hi.trim().parse::<u32>()) {
                (Ok(a), Ok(b)) => {
                    let (start, end) = if a <= b { (a, b) } else { (b, a) };
                    if end > MAX_PORT_NUMBER {
                        warn!("Range {} goes past port {}", token, MAX_PORT_NUMBER);
                        continue;
                    }
                    selectors.extend((start..=end).map(PortSelector::Number));
                }
                _ => warn!("Invalid range format: {}", token),
            },
            None => match token.parse::<u32>() {
                Ok(n) if n > MAX_PORT_NUMBER => {
                    warn!("Port number {} is above {}", n, MAX_PORT_NUMBER)
                }
                Ok(n) => selectors.push(PortSelector::Number(n)),
                Err(_) => selectors.push(PortSelector::Name(token.to_string())),
            },
        }
    }

    selectors
}

/// Set `vlan`/`is_trunk` on every port the selectors match on `device`.
///
/// Names match case-insensitively, exact match first and substring second;
/// unmatched names are skipped with a warning. Numbers match the first port
/// ending with `/N`, and `Fa0/N` is created when no port does. Returns the
/// names of the ports changed.
pub fn assign_vlan_to_ports(
    graph: &mut TopologyGraph,
    device: DeviceId,
    selectors: &[PortSelector],
    vlan: u16,
    is_trunk: bool,
) -> Result<Vec<String>, TopologyError> {
    let device = graph.require_mut(device)?;
    let mut changed = Vec::new();

    for selector in selectors {
        let idx = match selector {
            PortSelector::Number(n) => {
                let suffix = format!("/{}", n);
                match device.ports.iter().position(|p| p.name.ends_with(&suffix)) {
                    Some(idx) => idx,
                    None => {
                        let name = format!("Fa0{}", suffix);
                        device.ensure_interface(&name);
                        debug!("Created {} on {}", name, device.hostname);
                        device.ports.len() - 1
                    }
                }
            }
            PortSelector::Name(name) => {
                let lowered = name.to_lowercase();
                let exact = device
                    .ports
                    .iter()
                    .position(|p| p.name.eq_ignore_ascii_case(name));
                let found = exact.or_else(|| {
                    device
                        .ports
                        .iter()
                        .position(|p| p.name.to_lowercase().contains(&lowered))
                });
                match found {
                    Some(idx) => idx,
                    None => {
                        warn!("Interface '{}' not found on {}", name, device.hostname);
                        continue;
                    }
                }
            }
        };

        let port = &mut device.ports[idx];
        port.vlan_id = vlan;
        port.is_trunk = is_trunk;
        debug!(
            "Configured {} -> {}",
            port.name,
            if is_trunk {
                "TRUNK".to_string()
            } else {
                format!("VLAN {}", vlan)
            }
        );
        changed.push(port.name.clone());
    }

    Ok(changed)
}
