//! Lab orchestrator.
//!
//! Coordinates the flow from a validated lab description to a built `Lab`
//! and the plan files written for it.

use color_eyre::eyre::{eyre, WrapErr};
use color_eyre::Result;
use log::{debug, info};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::{AddressingConfig, DhcpConfig, LabConfig};
use crate::ip;
use crate::lab::Lab;
use crate::report::PlanSummary;
use crate::state;
use crate::subnet::{NetworkId, SplitPolicy};
use crate::topology::{BatchRequest, DeviceClass, DeviceId};

/// Name of the JSON plan summary
pub const PLAN_FILE: &str = "plan.json";

/// Files written by `generate_plan`, and the lab they describe
#[derive(Debug, Clone)]
pub struct PlanOutput {
    pub lab: Lab,
    pub state_path: PathBuf,
    pub plan_path: PathBuf,
    pub summary: PlanSummary,
}

fn device(lab: &Lab, hostname: &str) -> Result<DeviceId> {
    lab.device_id(hostname)
        .ok_or_else(|| eyre!("Unknown device '{}'", hostname))
}

/// Subnet lookup by `a.b.c.d/n` text.
fn subnet(lab: &Lab, cidr: &str) -> Result<NetworkId> {
    let (address, prefix) = cidr
        .split_once('/')
        .ok_or_else(|| eyre!("Subnet '{}' is not in a.b.c.d/n form", cidr))?;
    let address = ip::parse_address(address)?;
    let prefix: u8 = prefix
        .trim()
        .parse()
        .wrap_err_with(|| format!("Bad prefix length in '{}'", cidr))?;
    lab.forest()
        .find_by_cidr(address, prefix)
        .map(|n| n.id)
        .ok_or_else(|| eyre!("No subnet {} in the plan", cidr))
}

/// Build a lab from a validated description.
///
/// Steps run in dependency order: devices, cables, VLANs, the address plan,
/// interface assignments, DHCP (after every assignment so relay resolution
/// sees the WAN links) and finally static routes.
pub fn build_lab(config: &LabConfig) -> Result<Lab> {
    let mut lab = Lab::new();
    lab.forest_mut()
        .set_policy(SplitPolicy::from(config.general.split_policy));

    for entry in &config.devices {
        let id = lab.add_device(&entry.hostname, entry.class)?;
        if let (Some(position), Some(d)) = (entry.position, lab.graph_mut().device_mut(id)) {
            d.position = position;
        }
    }
    if config.general.exam_passwords {
        lab.apply_security_defaults();
    }
    for entry in &config.devices {
        if let Some(security) = &entry.security {
            let id = device(&lab, &entry.hostname)?;
            lab.set_security(id, security.clone())?;
        }
    }

    for link in &config.links {
        let a = device(&lab, &link.a)?;
        let b = device(&lab, &link.b)?;
        let a_port = match &link.a_port {
            Some(port) => port.clone(),
            None => crate::topology::auto_port(lab.graph(), a)
                .ok_or_else(|| eyre!("No free port on {}", link.a))?,
        };
        let b_port = match &link.b_port {
            Some(port) => port.clone(),
            None => crate::topology::auto_port(lab.graph(), b)
                .ok_or_else(|| eyre!("No free port on {}", link.b))?,
        };
        lab.connect(a, &a_port, b, &b_port)
            .wrap_err_with(|| format!("Failed to cable {} to {}", link.a, link.b))?;
    }

    for batch in &config.batch_links {
        let request = BatchRequest {
            sources: batch
                .sources
                .iter()
                .map(|s| device(&lab, s))
                .collect::<Result<Vec<_>>>()?,
            target: device(&lab, &batch.target)?,
            start_target_port: batch.start_port.clone(),
            source_port: batch.source_port.clone(),
        };
        let outcome = lab.connect_batch(&request)?;
        info!(
            "Batch onto {}: {} connected, {} skipped",
            batch.target,
            outcome.connected.len(),
            outcome.skipped.len()
        );
        if let Some(reason) = outcome.stopped {
            return Err(eyre!("Batch onto {} stopped: {}", batch.target, reason));
        }
    }

    for vlan in &config.vlans {
        lab.define_vlan(vlan.id, &vlan.name)?;
    }
    for entry in &config.vlan_ports {
        let switch = device(&lab, &entry.switch)?;
        let changed = lab.assign_vlan_ports(switch, &entry.ports, entry.vlan, entry.trunk)?;
        debug!("{}: {:?} -> VLAN {}", entry.switch, changed, entry.vlan);
    }

    if let Some(addressing) = &config.addressing {
        apply_addressing(&mut lab, addressing)?;
    }

    for route in &config.static_routes {
        let router = device(&lab, &route.router)?;
        lab.add_static_route(router, route.destination, route.mask, route.next_hop)?;
    }

    Ok(lab)
}

fn apply_addressing(lab: &mut Lab, addressing: &AddressingConfig) -> Result<()> {
    let roots = lab
        .plan(&addressing.base, addressing.sizing.into())
        .wrap_err_with(|| format!("Failed to plan {}", addressing.base))?;
    info!("Planned {} subnet(s) from {}", roots.len(), addressing.base);

    for split in &addressing.splits {
        let id = subnet(lab, &split.subnet)?;
        let blocks = lab.forest().allocate_from(id, split.sizing.into())?;
        let children = lab
            .forest_mut()
            .split(id, blocks)
            .wrap_err_with(|| format!("Failed to split {}", split.subnet))?;
        debug!("{} split into {} subnet(s)", split.subnet, children.len());
    }

    let mut pending_dhcp = Vec::new();
    for assignment in &addressing.assignments {
        let net = subnet(lab, &assignment.subnet)?;
        if let Some(name) = &assignment.name {
            lab.forest_mut().rename(net, Some(name.clone()))?;
        }

        let owner = device(lab, &assignment.device)?;
        let class = lab.graph().require(owner)?.class();
        match class {
            DeviceClass::Router => {
                let interface = assignment.interface.as_deref().ok_or_else(|| {
                    eyre!("Assignment of {} needs an interface", assignment.subnet)
                })?;
                lab.assign_router_interface(net, owner, interface, assignment.vlan)?;
            }
            DeviceClass::Switch => {
                lab.assign_switch_vlan(net, owner, assignment.vlan, assignment.name.as_deref())?;
            }
            DeviceClass::Pc => {
                return Err(eyre!(
                    "{} cannot own subnet {}",
                    assignment.device,
                    assignment.subnet
                ))
            }
        }

        if let Some(dhcp) = &assignment.dhcp {
            pending_dhcp.push((net, &assignment.subnet, dhcp));
        }
    }

    for (net, cidr, dhcp) in pending_dhcp {
        match dhcp {
            DhcpConfig::Local { upper_half_only } => {
                lab.enable_local_dhcp(net, *upper_half_only)?;
            }
            DhcpConfig::Relay {
                server,
                upper_half_only,
            } => {
                let server = device(lab, server)?;
                let helper = lab
                    .enable_relay_dhcp(net, server, *upper_half_only)
                    .wrap_err_with(|| format!("DHCP relay for {}", cidr))?;
                info!("{} relays DHCP to {}", cidr, helper);
            }
            DhcpConfig::Manual {
                server,
                helper,
                upper_half_only,
            } => {
                let server = server.as_deref().map(|s| device(lab, s)).transpose()?;
                lab.enable_relay_dhcp_manual(net, server, *helper, *upper_half_only)?;
            }
        }
    }
    Ok(())
}

/// Build the lab and write the save file and the JSON plan into
/// `output_dir`.
pub fn generate_plan(config: &LabConfig, output_dir: &Path) -> Result<PlanOutput> {
    let lab = build_lab(config)?;

    fs::create_dir_all(output_dir).wrap_err_with(|| {
        format!("Failed to create output directory '{}'", output_dir.display())
    })?;

    let state_path = output_dir.join(state::DEFAULT_STATE_FILE);
    state::save(&lab, &state_path)?;

    let summary = PlanSummary::from_lab(&config.general.name, &lab);
    let plan_path = output_dir.join(PLAN_FILE);
    let plan_json = serde_json::to_string_pretty(&summary)?;
    fs::write(&plan_path, &plan_json)
        .wrap_err_with(|| format!("Failed to write '{}'", plan_path.display()))?;
    info!("Plan written to {:?}", plan_path);

    Ok(PlanOutput {
        lab,
        state_path,
        plan_path,
        summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use tempfile::TempDir;

    const EXAM_YAML: &str = r#"
general:
  name: exam
devices:
  - { hostname: Router0, class: router }
  - { hostname: Router1, class: router }
  - { hostname: Switch0, class: switch }
  - { hostname: Switch1, class: switch }
  - { hostname: PC0, class: pc }
  - { hostname: PC1, class: pc }
links:
  - { a: Router0, a_port: Gig0/1, b: Switch0, b_port: Gig0/1 }
  - { a: Router1, a_port: Gig0/1, b: Switch1, b_port: Gig0/1 }
  - { a: Router0, a_port: Se0/1/0, b: Router1, b_port: Se0/1/0 }
batch_links:
  - { sources: [PC0, PC1], target: Switch0, start_port: Fa0/1 }
vlans:
  - { id: 10, name: LAN_A }
vlan_ports:
  - { switch: Switch0, ports: "1-2", vlan: 10 }
addressing:
  base: 192.168.1.0/24
  sizing: { subnets: 4 }
  splits:
    - { subnet: 192.168.1.192/26, sizing: { hosts: 2 } }
  assignments:
    - subnet: 192.168.1.0/26
      device: Router0
      interface: Gig0/1
      vlan: 10
      dhcp: { mode: relay, server: Router1, upper_half_only: true }
    - subnet: 192.168.1.64/26
      name: LAN C
      device: Router1
      interface: Gig0/1
      dhcp: { mode: local }
    - subnet: 192.168.1.192/30
      device: Router0
      interface: Se0/1/0
static_routes:
  - { router: Router0, destination: 192.168.1.64, mask: 255.255.255.192, next_hop: 192.168.1.194 }
"#;

    fn config() -> LabConfig {
        let config: LabConfig = serde_yaml::from_str(EXAM_YAML).unwrap();
        config.validate().unwrap();
        config
    }

    #[test]
    fn test_build_lab() {
        let lab = build_lab(&config()).unwrap();
        assert_eq!(lab.graph().links().len(), 5);
        // 4 roots, 16 /30 children
        assert_eq!(lab.forest().len(), 20);

        let lan_a = lab
            .forest()
            .find_by_cidr(Ipv4Addr::new(192, 168, 1, 0), 26)
            .unwrap();
        assert_eq!(lan_a.name.as_deref(), Some("LAN_A"));
        assert_eq!(lan_a.assigned_interface.as_deref(), Some("Gig0/1.10"));
        assert_eq!(lan_a.dhcp.relay_helper, Some(Ipv4Addr::new(192, 168, 1, 194)));

        let pc1 = lab.graph().device_by_hostname("PC1").unwrap();
        let link = lab.graph().find_link(pc1.id, "Fa0").unwrap();
        assert!(link.uses_port(lab.device_id("Switch0").unwrap(), "Fa0/2"));

        let router0 = lab.graph().device_by_hostname("Router0").unwrap();
        assert_eq!(router0.static_routes().len(), 1);
        assert!(router0.security.enable_secret.is_empty());
    }

    #[test]
    fn test_exam_passwords_then_device_overrides() {
        let mut config = config();
        config.general.exam_passwords = true;
        config.devices[1].security = Some(crate::topology::SecurityConfig {
            enable_secret: "r1secret".to_string(),
            ..Default::default()
        });
        let lab = build_lab(&config).unwrap();

        let security = |name: &str| {
            lab.graph()
                .device_by_hostname(name)
                .unwrap()
                .security
                .clone()
        };
        assert_eq!(security("Router0").enable_secret, "class");
        assert_eq!(security("Switch1").vty_password, "admin");
        assert_eq!(security("Router1").enable_secret, "r1secret");
        assert!(security("PC0").vty_password.is_empty());
    }

    #[test]
    fn test_unknown_split_subnet_fails() {
        let mut config = config();
        config.addressing.as_mut().unwrap().splits[0].subnet = "10.0.0.0/8".to_string();
        assert!(build_lab(&config).is_err());
    }

    #[test]
    fn test_generate_plan_writes_files() {
        let dir = TempDir::new().unwrap();
        let output = generate_plan(&config(), &dir.path().join("out")).unwrap();

        assert!(output.state_path.exists());
        let json = fs::read_to_string(&output.plan_path).unwrap();
        let summary: PlanSummary = serde_json::from_str(&json).unwrap();
        assert_eq!(summary.name, "exam");
        assert_eq!(summary.devices.len(), 6);

        let reloaded = state::load(&output.state_path).unwrap();
        assert_eq!(reloaded.forest().len(), 20);
        assert!(reloaded.forest().iter().eq(output.lab.forest().iter()));
    }
}
