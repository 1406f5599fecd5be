//! Lookup targets and special-use address detection

use crate::error::{LookupError, Result};
use ipwhois_cidr::Cidr;
use once_cell::sync::Lazy;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// Cymru zone for IPv4 origin lookups
pub const IPV4_DNS_ZONE: &str = "origin.asn.cymru.com";

/// Cymru zone for IPv6 origin lookups
pub const IPV6_DNS_ZONE: &str = "origin6.asn.cymru.com";

/// Assignment name and RFC reference for a special-use range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reservation {
    pub name: &'static str,
    pub rfc: &'static str,
}

type ReservedTable = Vec<(Cidr, Reservation)>;

fn table(entries: &[(&str, &'static str, &'static str)]) -> ReservedTable {
    entries
        .iter()
        .map(|&(net, name, rfc)| {
            let cidr = Cidr::parse(net).expect("reserved range table entry");
            (cidr, Reservation { name, rfc })
        })
        .collect()
}

// Checked in order; the first match names the assignment.
static IPV4_RESERVED: Lazy<ReservedTable> = Lazy::new(|| {
    table(&[
        ("0.0.0.0/8", "This Network", "RFC 1122, Section 3.2.1.3"),
        ("127.0.0.0/8", "Loopback", "RFC 1122, Section 3.2.1.3"),
        ("169.254.0.0/16", "Link Local", "RFC 3927"),
        ("192.0.0.0/24", "IETF Protocol Assignments", "RFC 5736"),
        ("192.0.2.0/24", "TEST-NET-1", "RFC 5737"),
        ("192.88.99.0/24", "6to4 Relay Anycast", "RFC 3068"),
        (
            "198.18.0.0/15",
            "Network Interconnect Device Benchmark Testing",
            "RFC 2544",
        ),
        ("198.51.100.0/24", "TEST-NET-2", "RFC 5737"),
        ("203.0.113.0/24", "TEST-NET-3", "RFC 5737"),
        ("224.0.0.0/4", "Multicast", "RFC 3171"),
        ("255.255.255.255/32", "Limited Broadcast", "RFC 919, Section 7"),
        ("10.0.0.0/8", "Private-Use Networks", "RFC 1918"),
        ("172.16.0.0/12", "Private-Use Networks", "RFC 1918"),
        ("192.168.0.0/16", "Private-Use Networks", "RFC 1918"),
        ("100.64.0.0/10", "Shared Address Space", "RFC 6598"),
        ("240.0.0.0/4", "Reserved for Future Use", "RFC 1112, Section 4"),
    ])
});

static IPV6_RESERVED: Lazy<ReservedTable> = Lazy::new(|| {
    let mut entries = vec![
        ("ff00::/8", "Multicast", "RFC 4291, Section 2.7"),
        ("::/128", "Unspecified", "RFC 4291, Section 2.5.2"),
        ("::1/128", "Loopback", "RFC 4291, Section 2.5.3"),
    ];
    for net in [
        "::/8", "100::/8", "200::/7", "400::/6", "800::/5", "1000::/4", "4000::/3", "6000::/3",
        "8000::/3", "a000::/3", "c000::/3", "e000::/4", "f000::/5", "f800::/6", "fe00::/9",
    ] {
        entries.push((net, "Reserved", "RFC 4291"));
    }
    entries.extend([
        ("fe80::/10", "Link-Local", "RFC 4291, Section 2.5.6"),
        ("fec0::/10", "Site-Local", "RFC 4291, Section 2.5.7"),
        ("2001:db8::/32", "Documentation", "RFC 3849"),
        ("2001::/23", "IETF Protocol Assignments", "RFC 2928"),
        ("fc00::/7", "Unique Local Unicast", "RFC 4193"),
    ]);
    table(&entries)
});

fn find(table: &ReservedTable, addr: IpAddr) -> Option<Reservation> {
    table
        .iter()
        .find(|(cidr, _)| cidr.contains(addr))
        .map(|(_, reservation)| *reservation)
}

/// Return the special-use assignment an IPv4 address falls in, if any
pub fn ipv4_is_defined(addr: Ipv4Addr) -> Option<Reservation> {
    find(&IPV4_RESERVED, IpAddr::V4(addr))
}

/// Return the special-use assignment an IPv6 address falls in, if any
pub fn ipv6_is_defined(addr: Ipv6Addr) -> Option<Reservation> {
    find(&IPV6_RESERVED, IpAddr::V6(addr))
}

/// A publicly routable address ready for resolution
///
/// Holds the canonical address, the label-reversed form used by Cymru, and
/// the derived DNS zone for the terse origin query.
///
/// # Examples
///
/// ```
/// use ipwhois_core::LookupTarget;
///
/// let target: LookupTarget = "74.125.225.229".parse().unwrap();
/// assert_eq!(target.dns_zone(), "229.225.125.74.origin.asn.cymru.com");
///
/// assert!("127.0.0.1".parse::<LookupTarget>().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LookupTarget {
    address: IpAddr,
    reversed: String,
    dns_zone: String,
}

impl LookupTarget {
    /// Build a target, rejecting special-use addresses
    pub fn new(address: IpAddr) -> Result<Self> {
        let (version, reservation) = match address {
            IpAddr::V4(v4) => (4, ipv4_is_defined(v4)),
            IpAddr::V6(v6) => (6, ipv6_is_defined(v6)),
        };
        if let Some(reservation) = reservation {
            return Err(LookupError::IpDefined {
                version,
                address: address.to_string(),
                name: reservation.name.to_string(),
                rfc: reservation.rfc.to_string(),
            });
        }

        let (reversed, zone) = match address {
            IpAddr::V4(v4) => {
                let mut octets: Vec<String> = v4.octets().iter().map(u8::to_string).collect();
                octets.reverse();
                (octets.join("."), IPV4_DNS_ZONE)
            }
            IpAddr::V6(v6) => (reverse_nibbles(v6), IPV6_DNS_ZONE),
        };
        let dns_zone = format!("{}.{}", reversed, zone);

        Ok(Self {
            address,
            reversed,
            dns_zone,
        })
    }

    /// Parse and build a target
    pub fn parse(address: &str) -> Result<Self> {
        let addr: IpAddr = address
            .trim()
            .parse()
            .map_err(|_| LookupError::Net(format!("{} is not a valid IP address", address)))?;
        Self::new(addr)
    }

    /// The address being resolved
    pub fn address(&self) -> IpAddr {
        self.address
    }

    /// IP version, 4 or 6
    pub fn version(&self) -> u8 {
        match self.address {
            IpAddr::V4(_) => 4,
            IpAddr::V6(_) => 6,
        }
    }

    /// Label-reversed address as used in the Cymru zones
    pub fn reversed(&self) -> &str {
        &self.reversed
    }

    /// Full name for the terse Cymru TXT query
    pub fn dns_zone(&self) -> &str {
        &self.dns_zone
    }

    /// PTR query name (`in-addr.arpa` / `ip6.arpa`)
    pub fn reverse_pointer(&self) -> String {
        match self.address {
            IpAddr::V4(v4) => {
                let o = v4.octets();
                format!("{}.{}.{}.{}.in-addr.arpa", o[3], o[2], o[1], o[0])
            }
            IpAddr::V6(v6) => {
                let hex: String = v6.octets().iter().map(|b| format!("{:02x}", b)).collect();
                let mut labels: Vec<String> = hex.chars().rev().map(String::from).collect();
                labels.push("ip6.arpa".to_string());
                labels.join(".")
            }
        }
    }
}

// Cymru times out on trailing all-zero groups, so those are dropped before
// the nibbles are reversed.
fn reverse_nibbles(addr: Ipv6Addr) -> String {
    let mut groups: Vec<String> = addr.segments().iter().map(|g| format!("{:04x}", g)).collect();
    while groups.last().map(|g| g == "0000").unwrap_or(false) {
        groups.pop();
    }
    let nibbles: String = groups.concat();
    nibbles
        .chars()
        .rev()
        .map(String::from)
        .collect::<Vec<_>>()
        .join(".")
}

impl fmt::Display for LookupTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.address)
    }
}

impl FromStr for LookupTarget {
    type Err = LookupError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<IpAddr> for LookupTarget {
    type Error = LookupError;

    fn try_from(address: IpAddr) -> Result<Self> {
        Self::new(address)
    }
}

impl Serialize for LookupTarget {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for LookupTarget {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}
