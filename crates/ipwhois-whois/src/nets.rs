//! Splitting WHOIS responses into network sections

use ipwhois_cidr::{collapse, range_string, summarize_range, Cidr, CidrError};
use ipwhois_parse::Section;
use once_cell::sync::Lazy;
use regex::Regex;
use std::net::IpAddr;
use tracing::debug;

static ARIN_RANGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^NetRange:[^\S\n]+(.+)$").expect("NetRange pattern is valid"));

static ARIN_CIDR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^CIDR:[^\S\n]+(.+?,[^\S\n].+|.+)$").expect("CIDR pattern is valid")
});

static LACNIC_NET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^(inetnum|inet6num|route):[^\S\n]+(.+?,[^\S\n].+|.+)$")
        .expect("inetnum pattern is valid")
});

static OTHER_NET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^(inetnum|inet6num|route):[^\S\n]+((.+?)[^\S\n]-[^\S\n](.+)|.+)$")
        .expect("inetnum pattern is valid")
});

/// A network block found in a response, with its header span
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetSection {
    pub cidr: String,
    pub range: Option<String>,
    pub section: Section,
}

/// `first - last` for prefix notation, the text itself otherwise
fn display_range(net_range: &str) -> String {
    if net_range.contains('/') {
        if let Ok(cidr) = Cidr::parse(net_range) {
            return range_string(cidr.network(), cidr.last());
        }
    }
    net_range.to_string()
}

fn join_cidrs(nets: &[Cidr]) -> String {
    nets.iter().map(Cidr::to_string).collect::<Vec<_>>().join(", ")
}

fn parse_cidr_list(text: &str) -> Result<String, CidrError> {
    let nets = text
        .split(", ")
        .map(|c| Cidr::parse(c.trim()))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(join_cidrs(&nets))
}

/// Sections of an ARIN response, anchored on `CIDR:` lines
///
/// Each block takes the closest `NetRange:` line above its `CIDR:` line.
pub fn get_nets_arin(response: &str) -> Vec<NetSection> {
    let ranges: Vec<(usize, String)> = ARIN_RANGE
        .captures_iter(response)
        .filter_map(|caps| Some((caps.get(0)?.start(), caps.get(1)?.as_str().trim().to_string())))
        .collect();

    let mut nets = Vec::new();
    let mut previous_end = 0;

    for caps in ARIN_CIDR.captures_iter(response) {
        let (Some(whole), Some(value)) = (caps.get(0), caps.get(1)) else {
            continue;
        };

        let range = ranges
            .iter()
            .rev()
            .find(|(start, _)| *start < whole.start() && *start >= previous_end)
            .map(|(_, net_range)| display_range(net_range));
        previous_end = whole.end();

        match parse_cidr_list(value.as_str()) {
            Ok(cidr) => nets.push(NetSection {
                cidr,
                range,
                section: Section::from_match(&whole),
            }),
            Err(e) => debug!(cidr = value.as_str(), error = %e, "Skipping ARIN network"),
        }
    }

    nets
}

/// Complete an abbreviated LACNIC prefix such as `200.160/14`
fn expand_lacnic_prefix(addr: &str) -> String {
    let addr = addr.trim();
    let dots = addr.matches('.').count();
    if dots == 0 || dots >= 3 {
        return addr.to_string();
    }

    let (ip, prefix) = match addr.split_once('/') {
        Some((ip, prefix)) => (ip, Some(prefix)),
        None => (addr, None),
    };
    let mut ip = ip.to_string();
    for _ in dots..3 {
        ip.push_str(".0");
    }

    match prefix {
        Some(prefix) => format!("{}/{}", ip, prefix),
        None => ip,
    }
}

/// Sections of a LACNIC response, anchored on `inetnum:`/`inet6num:`/`route:`
pub fn get_nets_lacnic(response: &str) -> Vec<NetSection> {
    LACNIC_NET
        .captures_iter(response)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let net_range = caps.get(2)?.as_str().trim();

            let nets = net_range
                .split(", ")
                .map(|addr| Cidr::parse(&expand_lacnic_prefix(addr)))
                .collect::<Result<Vec<_>, _>>();

            match nets {
                Ok(nets) => Some(NetSection {
                    cidr: join_cidrs(&nets),
                    range: Some(display_range(net_range)),
                    section: Section::from_match(&whole),
                }),
                Err(e) => {
                    debug!(range = net_range, error = %e, "Skipping LACNIC network");
                    None
                }
            }
        })
        .collect()
}

fn covering_cidrs(first: &str, last: &str) -> Result<String, CidrError> {
    let first: IpAddr = first
        .trim()
        .parse()
        .map_err(|_| CidrError::InvalidIpAddress(first.to_string()))?;
    let last: IpAddr = last
        .trim()
        .parse()
        .map_err(|_| CidrError::InvalidIpAddress(last.to_string()))?;
    Ok(join_cidrs(&collapse(&summarize_range(first, last)?)))
}

/// Sections of a RIPE NCC, APNIC or AFRINIC response
///
/// Address ranges become the minimal covering CIDR list.
pub fn get_nets_other(response: &str) -> Vec<NetSection> {
    OTHER_NET
        .captures_iter(response)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let net_range = caps.get(2)?.as_str().trim();

            let cidr = match (caps.get(3), caps.get(4)) {
                (Some(first), Some(last)) => covering_cidrs(first.as_str(), last.as_str()),
                _ => Cidr::parse(net_range).map(|cidr| cidr.to_string()),
            };

            match cidr {
                Ok(cidr) => Some(NetSection {
                    cidr,
                    range: Some(display_range(net_range)),
                    section: Section::from_match(&whole),
                }),
                Err(e) => {
                    debug!(range = net_range, error = %e, "Skipping network");
                    None
                }
            }
        })
        .collect()
}
