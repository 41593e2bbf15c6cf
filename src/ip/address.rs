//! IPv4 address arithmetic.
//!
//! All functions work on `Ipv4Addr` values and treat them as 32-bit
//! big-endian integers. Prefix lengths above 32 are treated like /32 so
//! every function is total over its inputs.

use std::net::Ipv4Addr;

/// Number of bits in an IPv4 address.
pub const IPV4_BITS: u8 = 32;

/// Errors produced while reading address text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("Invalid IPv4 address '{text}' (expected a.b.c.d)")]
    InvalidAddress { text: String },

    #[error("Invalid Network Format '{text}' (expected x.x.x.x/yy)")]
    InvalidFormat { text: String },
}

/// Parse strict dotted-quad text into an address.
pub fn parse_address(text: &str) -> Result<Ipv4Addr, ParseError> {
    text.trim()
        .parse::<Ipv4Addr>()
        .map_err(|_| ParseError::InvalidAddress {
            text: text.to_string(),
        })
}

/// Format an address as dotted-quad text.
pub fn format_address(addr: Ipv4Addr) -> String {
    addr.to_string()
}

/// Subnet mask for a prefix length. /0 is all zeros, /32 and above all ones.
pub fn mask_for(prefix: u8) -> Ipv4Addr {
    Ipv4Addr::from(mask_bits(prefix))
}

fn mask_bits(prefix: u8) -> u32 {
    match prefix {
        0 => 0,
        p if p >= IPV4_BITS => u32::MAX,
        p => u32::MAX << (IPV4_BITS - p),
    }
}

/// Count the leading one bits of a dotted mask.
pub fn prefix_from_mask(mask: Ipv4Addr) -> u8 {
    u32::from(mask).leading_ones() as u8
}

/// Number of addresses in a block of the given prefix length.
pub fn block_size(prefix: u8) -> u64 {
    if prefix >= IPV4_BITS {
        1
    } else {
        1u64 << (IPV4_BITS - prefix)
    }
}

/// Base address of the block containing `addr`.
pub fn network_address(addr: Ipv4Addr, prefix: u8) -> Ipv4Addr {
    Ipv4Addr::from(u32::from(addr) & mask_bits(prefix))
}

/// Last address of the block containing `addr`.
pub fn broadcast_address(addr: Ipv4Addr, prefix: u8) -> Ipv4Addr {
    let mask = mask_bits(prefix);
    Ipv4Addr::from((u32::from(addr) & mask) | !mask)
}

/// Network address plus one.
pub fn first_usable(addr: Ipv4Addr, prefix: u8) -> Ipv4Addr {
    offset(network_address(addr, prefix), 1)
}

/// Broadcast address minus one.
pub fn last_usable(addr: Ipv4Addr, prefix: u8) -> Ipv4Addr {
    Ipv4Addr::from(u32::from(broadcast_address(addr, prefix)).wrapping_sub(1))
}

/// Usable hosts in a block: `2^(32-prefix) - 2`, and 0 once fewer than two
/// host bits remain (/31 and /32).
pub fn host_capacity(prefix: u8) -> u64 {
    let host_bits = i32::from(IPV4_BITS) - i32::from(prefix);
    if host_bits <= 1 {
        return 0;
    }
    (1u64 << host_bits) - 2
}

/// Wrapping add of `n` to an address.
pub fn offset(addr: Ipv4Addr, n: u32) -> Ipv4Addr {
    Ipv4Addr::from(u32::from(addr).wrapping_add(n))
}

/// True when `addr` is aligned to the block size of `prefix`.
pub fn is_aligned(addr: Ipv4Addr, prefix: u8) -> bool {
    network_address(addr, prefix) == addr
}

/// Lower-half range excluded from a DHCP pool that only hands out the
/// upper half of the block. `None` when the block is too small to split.
pub fn dhcp_excluded_range(addr: Ipv4Addr, prefix: u8) -> Option<(Ipv4Addr, Ipv4Addr)> {
    let half = block_size(prefix) / 2;
    if half < 2 {
        return None;
    }
    let network = network_address(addr, prefix);
    let end = u32::try_from(half - 1).ok()?;
    Some((offset(network, 1), offset(network, end)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_for() {
        assert_eq!(mask_for(0), Ipv4Addr::new(0, 0, 0, 0));
        assert_eq!(mask_for(8), Ipv4Addr::new(255, 0, 0, 0));
        assert_eq!(mask_for(26), Ipv4Addr::new(255, 255, 255, 192));
        assert_eq!(mask_for(30), Ipv4Addr::new(255, 255, 255, 252));
        assert_eq!(mask_for(32), Ipv4Addr::new(255, 255, 255, 255));
        assert_eq!(mask_for(40), Ipv4Addr::new(255, 255, 255, 255));
    }

    #[test]
    fn test_prefix_from_mask() {
        assert_eq!(prefix_from_mask(Ipv4Addr::new(255, 255, 255, 0)), 24);
        assert_eq!(prefix_from_mask(Ipv4Addr::new(255, 255, 255, 252)), 30);
        assert_eq!(prefix_from_mask(Ipv4Addr::new(0, 0, 0, 0)), 0);
    }

    #[test]
    fn test_network_and_broadcast() {
        let ip = Ipv4Addr::new(192, 168, 1, 77);
        assert_eq!(network_address(ip, 26), Ipv4Addr::new(192, 168, 1, 64));
        assert_eq!(broadcast_address(ip, 26), Ipv4Addr::new(192, 168, 1, 127));
        assert_eq!(first_usable(ip, 26), Ipv4Addr::new(192, 168, 1, 65));
        assert_eq!(last_usable(ip, 26), Ipv4Addr::new(192, 168, 1, 126));
        assert_eq!(network_address(ip, 0), Ipv4Addr::new(0, 0, 0, 0));
        assert_eq!(broadcast_address(ip, 0), Ipv4Addr::new(255, 255, 255, 255));
        assert_eq!(broadcast_address(ip, 32), ip);
    }

    #[test]
    fn test_host_capacity() {
        for p in 0..=30u8 {
            assert_eq!(host_capacity(p), (1u64 << (32 - p)) - 2, "prefix /{}", p);
        }
        assert_eq!(host_capacity(31), 0);
        assert_eq!(host_capacity(32), 0);
        assert_eq!(host_capacity(24), 254);
        assert_eq!(host_capacity(26), 62);
        assert_eq!(host_capacity(30), 2);
    }

    #[test]
    fn test_parse_and_format() {
        for text in ["0.0.0.0", "10.0.0.1", "192.168.1.130", "255.255.255.255"] {
            let addr = parse_address(text).unwrap();
            assert_eq!(format_address(addr), text);
        }
        assert!(matches!(
            parse_address("192.168.1"),
            Err(ParseError::InvalidAddress { .. })
        ));
        assert!(parse_address("256.1.1.1").is_err());
        assert!(parse_address("not-an-ip").is_err());
    }

    #[test]
    fn test_block_size_and_alignment() {
        assert_eq!(block_size(24), 256);
        assert_eq!(block_size(30), 4);
        assert_eq!(block_size(32), 1);
        assert!(is_aligned(Ipv4Addr::new(192, 168, 1, 128), 26));
        assert!(!is_aligned(Ipv4Addr::new(192, 168, 1, 130), 26));
    }

    #[test]
    fn test_offset_wraps() {
        assert_eq!(
            offset(Ipv4Addr::new(192, 168, 1, 128), 2),
            Ipv4Addr::new(192, 168, 1, 130)
        );
        assert_eq!(offset(Ipv4Addr::new(255, 255, 255, 255), 1), Ipv4Addr::new(0, 0, 0, 0));
    }

    #[test]
    fn test_dhcp_excluded_range() {
        let (start, end) = dhcp_excluded_range(Ipv4Addr::new(192, 168, 1, 32), 27).unwrap();
        assert_eq!(start, Ipv4Addr::new(192, 168, 1, 33));
        assert_eq!(end, Ipv4Addr::new(192, 168, 1, 47));
        assert!(dhcp_excluded_range(Ipv4Addr::new(10, 0, 0, 0), 31).is_none());
    }
}
