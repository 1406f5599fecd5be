//! Registry WHOIS parsing for ipwhois
//!
//! Splits a port-43 response into its network blocks, then extracts each
//! block's fields with the registry's pattern table:
//! - ARIN blocks are anchored on `CIDR:` lines
//! - LACNIC blocks on `inetnum:`/`inet6num:`/`route:`, completing abbreviated
//!   prefixes
//! - RIPE NCC, APNIC and AFRINIC blocks on the same keys, converting address
//!   ranges to CIDR lists
//!
//! An optional RWHOIS referral hop is parsed with a generic table.
//!
//! # Examples
//!
//! ```
//! use ipwhois_core::Rir;
//! use ipwhois_whois::parse_nets;
//!
//! let response = "NetRange:       74.125.0.0 - 74.125.255.255\n\
//! CIDR:           74.125.0.0/16\n\
//! NetName:        GOOGLE\n\
//! Country:        US\n";
//!
//! let nets = parse_nets(response, Rir::Arin, None);
//! assert_eq!(nets[0].cidr.as_deref(), Some("74.125.0.0/16"));
//! assert_eq!(nets[0].name.as_deref(), Some("GOOGLE"));
//! ```

pub mod nets;
pub mod tables;
pub mod whois;

pub use nets::{get_nets_arin, get_nets_lacnic, get_nets_other, NetSection};
pub use tables::{rir_fields, EMAIL_PATTERN, RWHOIS};
pub use whois::{
    find_referral, parse_nets, parse_referral, Whois, WhoisNet, WhoisOptions, WhoisResult,
};
