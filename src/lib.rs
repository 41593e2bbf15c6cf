//! # Netlab - VLSM addressing and topology planner for IPv4 network labs
//!
//! This library models a small router/switch/PC lab and plans its IPv4
//! addressing.
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - `ip`: IPv4 address arithmetic (masks, block bounds, usable ranges)
//! - `topology`: devices, ports, cables, batch cabling and the VLAN database
//! - `subnet`: the VLSM allocator and the subnet forest
//! - `relay`: DHCP relay (helper address) resolution
//! - `lab`: the session object tying topology, subnets and VLANs together
//! - `state`: section-tagged save file reader and writer
//! - `config`: YAML lab description structures and validation
//! - `config_loader`: lab description loading
//! - `orchestrator`: builds a lab from a description and writes the plan
//! - `report`: plan summary and text listings
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use netlab::{config_loader, orchestrator};
//! use std::path::Path;
//!
//! let config = config_loader::load_config(Path::new("lab.yaml"))?;
//! let plan = orchestrator::generate_plan(&config, Path::new("netlab_output"))?;
//!
//! // netlab_output now contains:
//! // - network_save.dat: the lab in save-file form
//! // - plan.json: devices, cables, VLANs and every subnet with its ranges
//! println!("{} subnets planned", plan.summary.subnets.len());
//! # Ok::<(), color_eyre::Report>(())
//! ```
//!
//! ## Lab description
//!
//! ```yaml
//! general:
//!   name: "branch"
//! devices:
//!   - { hostname: Router0, class: router }
//!   - { hostname: Switch0, class: switch }
//! links:
//!   - { a: Router0, a_port: Gig0/0, b: Switch0, b_port: Gig0/1 }
//! addressing:
//!   base: 192.168.1.0/24
//!   sizing: { hosts: 50 }
//!   assignments:
//!     - subnet: 192.168.1.0/26
//!       device: Router0
//!       interface: Gig0/0
//!       dhcp: { mode: local }
//! ```

pub mod config;
pub mod config_loader;
pub mod ip;
pub mod lab;
pub mod orchestrator;
pub mod relay;
pub mod report;
pub mod state;
pub mod subnet;
pub mod topology;

pub use lab::{DeletionReport, Lab, LabError};
