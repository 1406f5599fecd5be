//! ASN resolution for ipwhois
//!
//! This crate provides:
//! - [`IpAsn`] - Registry and AS lookup for an address, trying DNS, Cymru
//!   WHOIS and the ARIN REST fallback in caller order
//! - [`AsnOrigin`] - Routes originated by an AS, from RADB
//!
//! The response parsers are plain functions so they can run on captured text.
//!
//! # Examples
//!
//! ```
//! use ipwhois_asn::parse_fields_dns;
//! use ipwhois_core::Rir;
//!
//! let record = parse_fields_dns("15169 | 74.125.225.0/24 | US | arin | 2007-03-13").unwrap();
//! assert_eq!(record.asn_registry, Rir::Arin);
//! assert_eq!(record.prefix_len(), Some(24));
//! ```

pub mod asn;
pub mod origin;

pub use asn::{
    most_specific, parse_fields_dns, parse_fields_http, parse_fields_verbose_dns,
    parse_fields_whois, AsnLookupOptions, IpAsn, ORG_MAP,
};
pub use origin::{
    get_nets_radb, parse_routes, AsnOrigin, OriginMethod, OriginNet, OriginOptions, OriginResult,
    RADB_QUERY_URL,
};
