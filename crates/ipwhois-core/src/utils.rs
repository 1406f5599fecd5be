//! Small helpers shared by the resolvers

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::hash::Hash;
use std::net::IpAddr;

/// De-duplicate while keeping first-seen order
///
/// # Examples
///
/// ```
/// use ipwhois_core::utils::unique_everseen;
///
/// assert_eq!(unique_everseen(vec!["b", "a", "b", "c", "a"]), vec!["b", "a", "c"]);
/// ```
pub fn unique_everseen<T, I>(items: I) -> Vec<T>
where
    T: Eq + Hash + Clone,
    I: IntoIterator<Item = T>,
{
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

/// Occurrences of one address in free text
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressCount {
    pub count: usize,
    pub ports: BTreeMap<u16, usize>,
}

static IPV4_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?P<ip>\b(?:\d{1,3}\.){3}\d{1,3})(?:/(?P<prefix>\d{1,2}))?(?::(?P<port>\d{1,5}))?")
        .expect("valid IPv4 token regex")
});

static IPV6_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\[(?P<bracketed>[0-9A-Fa-f:.]+)\](?::(?P<port>\d{1,5}))?|(?P<bare>[0-9A-Fa-f]{0,4}:[0-9A-Fa-f:.]*[0-9A-Fa-f:])(?:/(?P<prefix>\d{1,3}))?",
    )
    .expect("valid IPv6 token regex")
});

/// Count unique IPv4/IPv6 addresses and networks found in text
///
/// Keys are canonical address or CIDR strings; ports following an address
/// (`1.2.3.4:80`, `[2001:db8::1]:443`) are tallied per address.
pub fn unique_addresses(text: &str) -> BTreeMap<String, AddressCount> {
    let mut found: BTreeMap<String, AddressCount> = BTreeMap::new();

    let mut record = |key: String, port: Option<u16>| {
        let entry = found.entry(key).or_default();
        entry.count += 1;
        if let Some(port) = port {
            *entry.ports.entry(port).or_default() += 1;
        }
    };

    for caps in IPV4_TOKEN.captures_iter(text) {
        let Some(addr) = caps.name("ip").and_then(|m| m.as_str().parse::<IpAddr>().ok()) else {
            continue;
        };
        let port = caps.name("port").and_then(|m| m.as_str().parse().ok());
        match caps.name("prefix").and_then(|m| m.as_str().parse::<u8>().ok()) {
            Some(prefix) => {
                if let Ok(net) = ipwhois_cidr::Cidr::new(addr, prefix) {
                    record(net.to_string(), None);
                }
            }
            None => record(addr.to_string(), port),
        }
    }

    for caps in IPV6_TOKEN.captures_iter(text) {
        let (raw, port) = match caps.name("bracketed") {
            Some(m) => (
                m.as_str(),
                caps.name("port").and_then(|p| p.as_str().parse().ok()),
            ),
            None => match caps.name("bare") {
                Some(m) => (m.as_str(), None),
                None => continue,
            },
        };
        let Ok(addr @ IpAddr::V6(_)) = raw.parse::<IpAddr>() else {
            continue;
        };
        match caps.name("prefix").and_then(|m| m.as_str().parse::<u8>().ok()) {
            Some(prefix) => {
                if let Ok(net) = ipwhois_cidr::Cidr::new(addr, prefix) {
                    record(net.to_string(), None);
                }
            }
            None => record(addr.to_string(), port),
        }
    }

    found
}
