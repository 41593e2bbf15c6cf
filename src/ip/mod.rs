//! IPv4 address math.
//!
//! Pure functions over 32-bit addresses: parsing and formatting, masks,
//! block boundaries and host capacity. Used by the subnet allocator and the
//! DHCP relay resolver.

pub mod address;

// Re-export commonly used functions
pub use address::{
    block_size, broadcast_address, dhcp_excluded_range, first_usable, format_address,
    host_capacity, is_aligned, last_usable, mask_for, network_address, offset, parse_address,
    prefix_from_mask, ParseError, IPV4_BITS,
};
