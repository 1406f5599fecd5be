//! CIDR operations for IPv4 and IPv6 networks
//!
//! Registry responses describe address space either as a prefix
//! (`74.125.0.0/16`) or as an inclusive range (`74.125.0.0 - 74.125.255.255`).
//! This crate converts between the two:
//! - Parse CIDR notation strictly (host bits must be clear)
//! - Summarize an inclusive address range into the minimal list of prefixes
//! - Collapse overlapping or adjacent prefixes
//! - Normalize zero-padded IPv4 text (`074.125.000.000`)
//!
//! # Examples
//!
//! ```
//! use ipwhois_cidr::{calculate_cidr, Cidr};
//!
//! let cidr = Cidr::parse("192.168.1.0/24").unwrap();
//! assert_eq!(cidr.prefix_len(), 24);
//! assert!(cidr.contains("192.168.1.1".parse().unwrap()));
//!
//! let blocks = calculate_cidr("10.0.0.0", "10.0.2.255").unwrap();
//! assert_eq!(blocks, vec!["10.0.0.0/23", "10.0.2.0/24"]);
//! ```

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;
use thiserror::Error;

/// CIDR errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CidrError {
    /// Invalid CIDR notation
    #[error("Invalid CIDR notation: {0}")]
    InvalidNotation(String),

    /// Invalid IP address
    #[error("Invalid IP address: {0}")]
    InvalidIpAddress(String),

    /// Invalid prefix length
    #[error("Invalid prefix length: {0} (must be 0-{1})")]
    InvalidPrefixLength(u8, u8),

    /// Address has bits set to the right of the prefix
    #[error("{0} has host bits set")]
    HostBitsSet(String),

    /// Range endpoints of different families
    #[error("Range endpoints are not the same address family: {0} - {1}")]
    FamilyMismatch(String, String),

    /// Range start is above its end
    #[error("Range start {0} is greater than end {1}")]
    InvertedRange(String, String),
}

pub type Result<T> = std::result::Result<T, CidrError>;

/// IP address family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Family {
    V4,
    V6,
}

impl Family {
    /// Number of address bits
    pub fn bits(self) -> u8 {
        match self {
            Family::V4 => 32,
            Family::V6 => 128,
        }
    }

    fn all_ones(self) -> u128 {
        match self {
            Family::V4 => u32::MAX as u128,
            Family::V6 => u128::MAX,
        }
    }

    fn of(addr: &IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => Family::V4,
            IpAddr::V6(_) => Family::V6,
        }
    }
}

/// Convert an address to its integer value
pub fn addr_to_int(addr: IpAddr) -> u128 {
    match addr {
        IpAddr::V4(v4) => u32::from(v4) as u128,
        IpAddr::V6(v6) => u128::from(v6),
    }
}

/// Convert an integer back to an address of the given family
pub fn int_to_addr(family: Family, value: u128) -> IpAddr {
    match family {
        Family::V4 => IpAddr::V4(Ipv4Addr::from(value as u32)),
        Family::V6 => IpAddr::V6(Ipv6Addr::from(value)),
    }
}

/// CIDR block representation
///
/// Stores the network address as an integer wide enough for both families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cidr {
    /// Address family (ordered first so v4 sorts before v6)
    family: Family,
    /// Network address (base IP)
    network: u128,
    /// Prefix length
    prefix_len: u8,
}

impl Cidr {
    /// Parse CIDR notation strictly
    ///
    /// A bare address is accepted as a host prefix (`/32` or `/128`).
    /// Host bits set to the right of the prefix are rejected.
    ///
    /// # Examples
    ///
    /// ```
    /// use ipwhois_cidr::Cidr;
    ///
    /// let cidr = Cidr::parse("2001:4860::/32").unwrap();
    /// assert_eq!(cidr.prefix_len(), 32);
    /// assert!(Cidr::parse("10.0.0.1/8").is_err());
    /// ```
    pub fn parse(cidr: &str) -> Result<Self> {
        let cidr = cidr.trim();
        let (ip_str, prefix_str) = match cidr.split_once('/') {
            Some((ip, prefix)) => (ip, Some(prefix)),
            None => (cidr, None),
        };

        let addr: IpAddr = ip_str
            .parse()
            .map_err(|_| CidrError::InvalidIpAddress(ip_str.to_string()))?;
        let family = Family::of(&addr);

        let prefix_len = match prefix_str {
            Some(p) => p
                .parse::<u8>()
                .map_err(|_| CidrError::InvalidNotation(format!("Invalid prefix: {}", p)))?,
            None => family.bits(),
        };

        let cidr = Self::new(addr, prefix_len)?;
        if cidr.network != addr_to_int(addr) {
            return Err(CidrError::HostBitsSet(cidr_text(ip_str, prefix_len)));
        }

        Ok(cidr)
    }

    /// Create new CIDR from an address and prefix length, masking host bits
    pub fn new(addr: IpAddr, prefix_len: u8) -> Result<Self> {
        let family = Family::of(&addr);
        if prefix_len > family.bits() {
            return Err(CidrError::InvalidPrefixLength(prefix_len, family.bits()));
        }

        Ok(Self {
            family,
            network: addr_to_int(addr) & Self::mask_for(family, prefix_len),
            prefix_len,
        })
    }

    fn mask_for(family: Family, prefix_len: u8) -> u128 {
        let host_bits = (family.bits() - prefix_len) as u32;
        let host_mask = if host_bits >= 128 {
            u128::MAX
        } else {
            (1u128 << host_bits) - 1
        };
        family.all_ones() & !host_mask
    }

    /// Address family
    pub fn family(&self) -> Family {
        self.family
    }

    /// Network address
    pub fn network(&self) -> IpAddr {
        int_to_addr(self.family, self.network)
    }

    /// Last address in the block
    pub fn last(&self) -> IpAddr {
        int_to_addr(self.family, self.last_int())
    }

    fn last_int(&self) -> u128 {
        self.network | (self.family.all_ones() & !Self::mask_for(self.family, self.prefix_len))
    }

    /// Prefix length
    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// Total number of addresses in this block, saturating at `u128::MAX`
    pub fn size(&self) -> u128 {
        let host_bits = (self.family.bits() - self.prefix_len) as u32;
        if host_bits >= 128 {
            u128::MAX
        } else {
            1u128 << host_bits
        }
    }

    /// Check if an address is in this block
    pub fn contains(&self, ip: IpAddr) -> bool {
        Family::of(&ip) == self.family
            && (addr_to_int(ip) & Self::mask_for(self.family, self.prefix_len)) == self.network
    }
}

fn cidr_text(ip: &str, prefix_len: u8) -> String {
    format!("{}/{}", ip, prefix_len)
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network(), self.prefix_len)
    }
}

impl FromStr for Cidr {
    type Err = CidrError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for Cidr {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Cidr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}

/// Summarize an inclusive address range into the minimal list of prefixes
///
/// # Examples
///
/// ```
/// use ipwhois_cidr::summarize_range;
///
/// let nets = summarize_range("192.0.2.0".parse().unwrap(), "192.0.2.130".parse().unwrap()).unwrap();
/// let text: Vec<String> = nets.iter().map(|n| n.to_string()).collect();
/// assert_eq!(text, vec!["192.0.2.0/25", "192.0.2.128/31", "192.0.2.130/32"]);
/// ```
pub fn summarize_range(first: IpAddr, last: IpAddr) -> Result<Vec<Cidr>> {
    let family = Family::of(&first);
    if family != Family::of(&last) {
        return Err(CidrError::FamilyMismatch(first.to_string(), last.to_string()));
    }

    let mut first_int = addr_to_int(first);
    let last_int = addr_to_int(last);
    if first_int > last_int {
        return Err(CidrError::InvertedRange(first.to_string(), last.to_string()));
    }

    let bits = family.bits() as u32;
    let mut nets = Vec::new();

    loop {
        let aligned = if first_int == 0 {
            bits
        } else {
            first_int.trailing_zeros().min(bits)
        };

        // Largest power of two not exceeding the remaining span.
        let span = last_int - first_int;
        let fits = if span == u128::MAX {
            128
        } else {
            127 - (span + 1).leading_zeros()
        };

        let nbits = aligned.min(fits);
        nets.push(Cidr {
            family,
            network: first_int,
            prefix_len: (bits - nbits) as u8,
        });

        let block_last = if nbits >= 128 {
            u128::MAX
        } else {
            first_int + ((1u128 << nbits) - 1)
        };
        if block_last >= last_int {
            break;
        }
        first_int = block_last + 1;
    }

    Ok(nets)
}

/// Collapse overlapping and adjacent prefixes into a minimal sorted list
///
/// IPv4 blocks sort before IPv6 blocks.
pub fn collapse(nets: &[Cidr]) -> Vec<Cidr> {
    let mut sorted: Vec<Cidr> = nets.to_vec();
    sorted.sort();

    let mut ranges: Vec<(Family, u128, u128)> = Vec::new();
    for net in sorted {
        let (first, last) = (net.network, net.last_int());
        match ranges.last_mut() {
            Some((family, _, end))
                if *family == net.family && (first <= *end || first - 1 == *end) =>
            {
                if last > *end {
                    *end = last;
                }
            }
            _ => ranges.push((net.family, first, last)),
        }
    }

    ranges
        .into_iter()
        .flat_map(|(family, first, last)| {
            summarize_range(int_to_addr(family, first), int_to_addr(family, last))
                .unwrap_or_default()
        })
        .collect()
}

/// Calculate the minimal CIDR strings covering `start..=end`
///
/// Either endpoint may also be given in prefix notation, in which case its
/// network address is used.
pub fn calculate_cidr(start: &str, end: &str) -> Result<Vec<String>> {
    let first = endpoint_address(start)?;
    let last = endpoint_address(end)?;
    let nets = summarize_range(first, last)?;

    Ok(collapse(&nets).iter().map(Cidr::to_string).collect())
}

fn endpoint_address(text: &str) -> Result<IpAddr> {
    let text = text.trim();
    match text.parse::<IpAddr>() {
        Ok(addr) => Ok(addr),
        Err(_) => {
            let (ip, prefix) = text
                .split_once('/')
                .ok_or_else(|| CidrError::InvalidIpAddress(text.to_string()))?;
            let addr: IpAddr = ip
                .parse()
                .map_err(|_| CidrError::InvalidIpAddress(text.to_string()))?;
            let prefix: u8 = prefix
                .parse()
                .map_err(|_| CidrError::InvalidNotation(text.to_string()))?;
            Ok(Cidr::new(addr, prefix)?.network())
        }
    }
}

/// Strip leading zeros from each octet of an IPv4 address string
///
/// # Examples
///
/// ```
/// use ipwhois_cidr::ipv4_lstrip_zeros;
///
/// assert_eq!(ipv4_lstrip_zeros("074.125.000.001"), "74.125.0.1");
/// ```
pub fn ipv4_lstrip_zeros(address: &str) -> String {
    address
        .trim()
        .split('.')
        .map(|octet| {
            let stripped = octet.trim_start_matches('0');
            if stripped.is_empty() {
                "0"
            } else {
                stripped
            }
        })
        .collect::<Vec<_>>()
        .join(".")
}

/// Render an inclusive range the way registry results report it
pub fn range_string(first: IpAddr, last: IpAddr) -> String {
    format!("{} - {}", first, last)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn strings(nets: &[Cidr]) -> Vec<String> {
        nets.iter().map(Cidr::to_string).collect()
    }

    #[test]
    fn test_parse_cidr() {
        let cidr = Cidr::parse("192.168.1.0/24").unwrap();
        assert_eq!(cidr.network(), ip("192.168.1.0"));
        assert_eq!(cidr.prefix_len(), 24);
        assert_eq!(cidr.family(), Family::V4);
    }

    #[test]
    fn test_parse_ipv6() {
        let cidr = Cidr::parse("2001:4860::/32").unwrap();
        assert_eq!(cidr.family(), Family::V6);
        assert_eq!(cidr.last(), ip("2001:4860:ffff:ffff:ffff:ffff:ffff:ffff"));
        assert_eq!(cidr.to_string(), "2001:4860::/32");
    }

    #[test]
    fn test_parse_bare_address() {
        let cidr = Cidr::parse("8.8.8.8").unwrap();
        assert_eq!(cidr.prefix_len(), 32);
        assert_eq!(cidr.size(), 1);
    }

    #[test]
    fn test_parse_invalid_cidr() {
        assert!(Cidr::parse("192.168.1.0/33").is_err());
        assert!(Cidr::parse("256.0.0.0/24").is_err());
        assert!(Cidr::parse("192.168.1.0/x").is_err());
        assert!(matches!(
            Cidr::parse("10.0.0.1/8"),
            Err(CidrError::HostBitsSet(_))
        ));
    }

    #[test]
    fn test_cidr_new_masks_host_bits() {
        let cidr = Cidr::new(ip("10.1.2.3"), 8).unwrap();
        assert_eq!(cidr.to_string(), "10.0.0.0/8");
    }

    #[test]
    fn test_cidr_contains() {
        let cidr = Cidr::parse("192.168.1.0/24").unwrap();
        assert!(cidr.contains(ip("192.168.1.255")));
        assert!(!cidr.contains(ip("192.168.2.0")));
        assert!(!cidr.contains(ip("::1")));
    }

    #[test]
    fn test_cidr_size() {
        assert_eq!(Cidr::parse("10.0.0.0/8").unwrap().size(), 16_777_216);
        assert_eq!(Cidr::parse("::/0").unwrap().size(), u128::MAX);
        assert_eq!(Cidr::parse("0.0.0.0/0").unwrap().size(), 1u128 << 32);
    }

    #[test]
    fn test_summarize_range_aligned() {
        let nets = summarize_range(ip("74.125.0.0"), ip("74.125.255.255")).unwrap();
        assert_eq!(strings(&nets), vec!["74.125.0.0/16"]);
    }

    #[test]
    fn test_summarize_range_unaligned() {
        let nets = summarize_range(ip("10.0.0.1"), ip("10.0.0.6")).unwrap();
        assert_eq!(
            strings(&nets),
            vec!["10.0.0.1/32", "10.0.0.2/31", "10.0.0.4/31", "10.0.0.6/32"]
        );
    }

    #[test]
    fn test_summarize_full_space() {
        let nets = summarize_range(ip("0.0.0.0"), ip("255.255.255.255")).unwrap();
        assert_eq!(strings(&nets), vec!["0.0.0.0/0"]);

        let nets = summarize_range(ip("::"), ip("ffff:ffff:ffff:ffff:ffff:ffff:ffff:ffff")).unwrap();
        assert_eq!(strings(&nets), vec!["::/0"]);
    }

    #[test]
    fn test_summarize_range_errors() {
        assert!(matches!(
            summarize_range(ip("10.0.0.0"), ip("::1")),
            Err(CidrError::FamilyMismatch(_, _))
        ));
        assert!(matches!(
            summarize_range(ip("10.0.0.9"), ip("10.0.0.1")),
            Err(CidrError::InvertedRange(_, _))
        ));
    }

    #[test]
    fn test_collapse_adjacent_and_overlapping() {
        let nets = vec![
            Cidr::parse("10.0.1.0/24").unwrap(),
            Cidr::parse("10.0.0.0/24").unwrap(),
            Cidr::parse("10.0.0.128/25").unwrap(),
            Cidr::parse("2001:db8::/33").unwrap(),
            Cidr::parse("2001:db8:8000::/33").unwrap(),
        ];
        assert_eq!(
            strings(&collapse(&nets)),
            vec!["10.0.0.0/23", "2001:db8::/32"]
        );
    }

    #[test]
    fn test_calculate_cidr() {
        assert_eq!(
            calculate_cidr("10.0.0.0", "10.0.2.255").unwrap(),
            vec!["10.0.0.0/23", "10.0.2.0/24"]
        );
        assert_eq!(
            calculate_cidr("2001:db8::/48", "2001:db8:0:ffff:ffff:ffff:ffff:ffff").unwrap(),
            vec!["2001:db8::/48"]
        );
        assert!(calculate_cidr("nope", "10.0.0.1").is_err());
    }

    #[test]
    fn test_ipv4_lstrip_zeros() {
        assert_eq!(ipv4_lstrip_zeros("074.125.000.001"), "74.125.0.1");
        assert_eq!(ipv4_lstrip_zeros("10.0.0.0"), "10.0.0.0");
    }

    #[test]
    fn test_range_string() {
        assert_eq!(
            range_string(ip("10.0.0.0"), ip("10.0.0.255")),
            "10.0.0.0 - 10.0.0.255"
        );
    }

    #[test]
    fn test_cidr_serde() {
        let cidr = Cidr::parse("192.168.1.0/24").unwrap();
        let json = serde_json::to_string(&cidr).unwrap();
        assert_eq!(json, "\"192.168.1.0/24\"");
        let back: Cidr = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cidr);
    }
}
