use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::Ipv4Addr;

use crate::subnet::{Sizing, SplitPolicy};
use crate::topology::vlan::MAX_VLAN_ID;
use crate::topology::{is_storable_name, DeviceClass, Position, SecurityConfig};

/// Top-level lab description that mirrors the YAML file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    pub devices: Vec<DeviceConfig>,
    #[serde(default)]
    pub links: Vec<LinkConfig>,
    /// Many-to-one cabling, e.g. a row of PCs onto one switch
    #[serde(default)]
    pub batch_links: Vec<BatchLinkConfig>,
    #[serde(default)]
    pub vlans: Vec<VlanConfig>,
    #[serde(default)]
    pub vlan_ports: Vec<VlanPortConfig>,
    pub addressing: Option<AddressingConfig>,
    #[serde(default)]
    pub static_routes: Vec<StaticRouteConfig>,
}

/// General lab settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Lab name, used in the plan summary
    #[serde(default = "default_lab_name")]
    pub name: String,
    /// (Optional) Log level (error, warn, info, debug, trace) used when
    /// RUST_LOG is not set
    pub log_level: Option<String>,
    /// Whether assigned subnets may be split further (default: allow)
    #[serde(default)]
    pub split_policy: SplitPolicyConfig,
    /// Give every router and switch the exam passwords before per-device
    /// security settings are applied
    #[serde(default)]
    pub exam_passwords: bool,
}

fn default_lab_name() -> String {
    "lab".to_string()
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            name: default_lab_name(),
            log_level: None,
            split_policy: SplitPolicyConfig::default(),
            exam_passwords: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitPolicyConfig {
    #[default]
    AllowAssigned,
    RejectAssigned,
}

impl From<SplitPolicyConfig> for SplitPolicy {
    fn from(policy: SplitPolicyConfig) -> Self {
        match policy {
            SplitPolicyConfig::AllowAssigned => SplitPolicy::AllowAssigned,
            SplitPolicyConfig::RejectAssigned => SplitPolicy::RejectAssigned,
        }
    }
}

/// A device to place in the lab
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub hostname: String,
    /// router, switch or pc
    pub class: DeviceClass,
    pub position: Option<Position>,
    pub security: Option<SecurityConfig>,
}

/// A single cable. Ports left out are picked automatically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    pub a: String,
    pub a_port: Option<String>,
    pub b: String,
    pub b_port: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchLinkConfig {
    pub sources: Vec<String>,
    pub target: String,
    /// (Optional) First target port, incremented after each cable
    pub start_port: Option<String>,
    /// (Optional) Port to use on every source
    pub source_port: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VlanConfig {
    pub id: u16,
    pub name: String,
}

/// Put a range of switch ports on a VLAN
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VlanPortConfig {
    pub switch: String,
    /// Comma-separated names, numbers or ranges such as "1-4,Gig0/1"
    pub ports: String,
    #[serde(default = "default_vlan")]
    pub vlan: u16,
    #[serde(default)]
    pub trunk: bool,
}

fn default_vlan() -> u16 {
    1
}

/// How to carve a block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizingConfig {
    /// Hosts required per subnet
    Hosts(u64),
    /// Number of subnets required
    Subnets(u64),
}

impl SizingConfig {
    fn requirement(&self) -> u64 {
        match self {
            SizingConfig::Hosts(n) | SizingConfig::Subnets(n) => *n,
        }
    }
}

impl From<SizingConfig> for Sizing {
    fn from(sizing: SizingConfig) -> Self {
        match sizing {
            SizingConfig::Hosts(n) => Sizing::Hosts(n),
            SizingConfig::Subnets(n) => Sizing::Subnets(n),
        }
    }
}

/// VLSM plan: the base network, its first split and any further splits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddressingConfig {
    /// Base network, e.g. "192.168.1.0/24"
    pub base: String,
    #[serde(with = "serde_yaml::with::singleton_map")]
    pub sizing: SizingConfig,
    #[serde(default)]
    pub splits: Vec<SplitConfig>,
    #[serde(default)]
    pub assignments: Vec<AssignmentConfig>,
}

/// Split an existing subnet, named by CIDR
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitConfig {
    pub subnet: String,
    #[serde(with = "serde_yaml::with::singleton_map")]
    pub sizing: SizingConfig,
}

/// Bind a subnet (by CIDR) to a router interface or a switch VLAN
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentConfig {
    pub subnet: String,
    pub name: Option<String>,
    pub device: String,
    /// Router interface. Ignored for switches.
    pub interface: Option<String>,
    /// Sub-interface VLAN on routers (0 = physical), SVI VLAN on switches
    #[serde(default)]
    pub vlan: u16,
    pub dhcp: Option<DhcpConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum DhcpConfig {
    /// Pool on the owning router
    Local {
        #[serde(default)]
        upper_half_only: bool,
    },
    /// Pool on `server`, helper address resolved from the topology
    Relay {
        server: String,
        #[serde(default)]
        upper_half_only: bool,
    },
    /// Helper address given by hand
    Manual {
        server: Option<String>,
        helper: Ipv4Addr,
        #[serde(default)]
        upper_half_only: bool,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticRouteConfig {
    pub router: String,
    pub destination: Ipv4Addr,
    pub mask: Ipv4Addr,
    pub next_hop: Ipv4Addr,
}

impl LabConfig {
    /// Check names, references and ranges before anything is built.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut hostnames = HashSet::new();
        for device in &self.devices {
            if device.hostname.trim().is_empty() {
                return Err(ValidationError::InvalidDevice(
                    "hostname cannot be empty".to_string(),
                ));
            }
            if !hostnames.insert(device.hostname.as_str()) {
                return Err(ValidationError::InvalidDevice(format!(
                    "duplicate hostname '{}'",
                    device.hostname
                )));
            }
            Self::check_name(&device.hostname, "devices")?;
            if let Some(security) = &device.security {
                for field in [
                    &security.enable_secret,
                    &security.vty_password,
                    &security.ssh_username,
                    &security.ssh_password,
                    &security.management_ip,
                    &security.management_gateway,
                    &security.allowed_remote_ip,
                ] {
                    Self::check_name(field, "security")?;
                }
            }
        }

        let known = |hostname: &str, context: &str| -> Result<(), ValidationError> {
            if hostnames.contains(hostname) {
                Ok(())
            } else {
                Err(ValidationError::UnknownDevice {
                    hostname: hostname.to_string(),
                    context: context.to_string(),
                })
            }
        };

        for link in &self.links {
            known(&link.a, "links")?;
            known(&link.b, "links")?;
            for port in [&link.a_port, &link.b_port].into_iter().flatten() {
                Self::check_name(port, "links")?;
            }
        }
        for batch in &self.batch_links {
            known(&batch.target, "batch_links")?;
            for port in [&batch.start_port, &batch.source_port].into_iter().flatten() {
                Self::check_name(port, "batch_links")?;
            }
            for source in &batch.sources {
                known(source, "batch_links")?;
            }
        }

        for vlan in &self.vlans {
            Self::check_vlan(vlan.id)?;
            Self::check_name(&vlan.name, "vlans")?;
        }
        for entry in &self.vlan_ports {
            known(&entry.switch, "vlan_ports")?;
            Self::check_vlan(entry.vlan)?;
        }

        if let Some(addressing) = &self.addressing {
            if addressing.base.trim().is_empty() {
                return Err(ValidationError::InvalidAddressing(
                    "base network cannot be empty".to_string(),
                ));
            }
            Self::check_sizing(&addressing.sizing)?;
            for split in &addressing.splits {
                Self::check_sizing(&split.sizing)?;
            }
            for assignment in &addressing.assignments {
                known(&assignment.device, "assignments")?;
                for text in [&assignment.name, &assignment.interface].into_iter().flatten() {
                    Self::check_name(text, "assignments")?;
                }
                if assignment.vlan > MAX_VLAN_ID {
                    return Err(ValidationError::InvalidVlan(assignment.vlan));
                }
                match &assignment.dhcp {
                    Some(DhcpConfig::Relay { server, .. })
                    | Some(DhcpConfig::Manual {
                        server: Some(server),
                        ..
                    }) => known(server, "dhcp")?,
                    _ => {}
                }
            }
        }

        for route in &self.static_routes {
            known(&route.router, "static_routes")?;
        }

        Ok(())
    }

    fn check_name(name: &str, context: &str) -> Result<(), ValidationError> {
        if is_storable_name(name) {
            Ok(())
        } else {
            Err(ValidationError::InvalidName {
                name: name.to_string(),
                context: context.to_string(),
            })
        }
    }

    fn check_vlan(id: u16) -> Result<(), ValidationError> {
        if id == 0 || id > MAX_VLAN_ID {
            return Err(ValidationError::InvalidVlan(id));
        }
        Ok(())
    }

    fn check_sizing(sizing: &SizingConfig) -> Result<(), ValidationError> {
        if sizing.requirement() == 0 {
            return Err(ValidationError::InvalidAddressing(format!(
                "sizing requirement must be at least 1 ({:?})",
                sizing
            )));
        }
        Ok(())
    }
}

/// Errors found while validating a lab description
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid device configuration: {0}")]
    InvalidDevice(String),
    #[error("Unknown device '{hostname}' referenced in {context}")]
    UnknownDevice { hostname: String, context: String },
    #[error("VLAN {0} is outside the range 1-4094")]
    InvalidVlan(u16),
    #[error("Invalid addressing configuration: {0}")]
    InvalidAddressing(String),
    #[error("Name {name:?} in {context} contains '|' or a line break")]
    InvalidName { name: String, context: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    const LAB_YAML: &str = r#"
general:
  name: "branch"
devices:
  - hostname: Router0
    class: router
  - hostname: Switch0
    class: switch
  - hostname: PC0
    class: pc
links:
  - a: Router0
    a_port: Gig0/0
    b: Switch0
    b_port: Gig0/1
batch_links:
  - sources: [PC0]
    target: Switch0
    start_port: Fa0/1
vlans:
  - id: 10
    name: Staff
vlan_ports:
  - switch: Switch0
    ports: "1-4"
    vlan: 10
addressing:
  base: 192.168.1.0/24
  sizing:
    hosts: 50
  assignments:
    - subnet: 192.168.1.0/26
      device: Router0
      interface: Gig0/0
      vlan: 10
      dhcp:
        mode: local
        upper_half_only: true
static_routes:
  - router: Router0
    destination: 0.0.0.0
    mask: 0.0.0.0
    next_hop: 192.168.1.62
"#;

    fn parse(yaml: &str) -> LabConfig {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_parse_lab_config() {
        let config = parse(LAB_YAML);
        assert_eq!(config.general.name, "branch");
        assert_eq!(config.general.split_policy, SplitPolicyConfig::AllowAssigned);
        assert_eq!(config.devices.len(), 3);
        assert_eq!(config.devices[2].class, DeviceClass::Pc);

        let addressing = config.addressing.as_ref().unwrap();
        assert_eq!(addressing.sizing, SizingConfig::Hosts(50));
        assert!(matches!(
            addressing.assignments[0].dhcp,
            Some(DhcpConfig::Local {
                upper_half_only: true
            })
        ));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_minimal_config_defaults() {
        let config = parse("devices: []\n");
        assert_eq!(config.general.name, "lab");
        assert!(config.links.is_empty());
        assert!(config.addressing.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_duplicate_and_empty_hostnames() {
        let mut config = parse(LAB_YAML);
        config.devices[1].hostname = "Router0".to_string();
        assert!(matches!(config.validate(), Err(ValidationError::InvalidDevice(_))));

        config.devices[1].hostname = "  ".to_string();
        assert!(matches!(config.validate(), Err(ValidationError::InvalidDevice(_))));
    }

    #[test]
    fn test_rejects_unknown_references() {
        let mut config = parse(LAB_YAML);
        config.links[0].b = "Switch9".to_string();
        match config.validate() {
            Err(ValidationError::UnknownDevice { hostname, context }) => {
                assert_eq!(hostname, "Switch9");
                assert_eq!(context, "links");
            }
            other => panic!("unexpected {:?}", other),
        }

        let mut config = parse(LAB_YAML);
        config.addressing.as_mut().unwrap().assignments[0].dhcp = Some(DhcpConfig::Relay {
            server: "Router7".to_string(),
            upper_half_only: false,
        });
        assert!(matches!(
            config.validate(),
            Err(ValidationError::UnknownDevice { .. })
        ));
    }

    #[test]
    fn test_rejects_bad_vlans_and_sizing() {
        let mut config = parse(LAB_YAML);
        config.vlans[0].id = 4095;
        assert!(matches!(config.validate(), Err(ValidationError::InvalidVlan(4095))));

        let mut config = parse(LAB_YAML);
        config.vlan_ports[0].vlan = 0;
        assert!(matches!(config.validate(), Err(ValidationError::InvalidVlan(0))));

        let mut config = parse(LAB_YAML);
        config.addressing.as_mut().unwrap().sizing = SizingConfig::Subnets(0);
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidAddressing(_))
        ));
    }

    #[test]
    fn test_rejects_separator_characters() {
        let mut config = parse(LAB_YAML);
        config.vlans[0].name = "Staff|1".to_string();
        match config.validate() {
            Err(ValidationError::InvalidName { name, context }) => {
                assert_eq!(name, "Staff|1");
                assert_eq!(context, "vlans");
            }
            other => panic!("unexpected {:?}", other),
        }

        let mut config = parse(LAB_YAML);
        config.addressing.as_mut().unwrap().assignments[0].name = Some("LAN|A".to_string());
        assert!(matches!(config.validate(), Err(ValidationError::InvalidName { .. })));

        let mut config = parse(LAB_YAML);
        config.links[0].a_port = Some("Gig0/0\n".to_string());
        assert!(matches!(config.validate(), Err(ValidationError::InvalidName { .. })));
    }
}
