//! VLSM subnet allocation.
//!
//! The allocator carves a block into equal children; the forest keeps the
//! resulting hierarchy together with each block's assignment and DHCP
//! settings.

pub mod allocator;
pub mod forest;
pub mod network;

pub use allocator::{
    allocate, allocate_by_host_count, allocate_by_subnet_count, parse_base_network, Sizing,
};
pub use forest::{SplitPolicy, SubnetError, SubnetForest};
pub use network::{Assignment, DhcpSettings, Network, NetworkId};
