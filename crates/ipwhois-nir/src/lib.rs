//! National Internet Registry lookups
//!
//! JPNIC and KRNIC publish WHOIS data as HTML pages rather than RDAP. This
//! crate fetches those pages, splits them into networks, extracts fields with
//! per-registry tables, and resolves the admin and tech contacts each network
//! names. Contacts are cached by handle for the length of one lookup.
//!
//! # Examples
//!
//! ```
//! use ipwhois_core::Nir;
//! use ipwhois_nir::parse_nets;
//!
//! let page = "IPv4 Address       : 115.0.0.0 - 115.23.255.255 (/12+/13)\n\
//! Organization Name  : Korea Telecom\n\
//! Registered Date    : 20090409\n";
//!
//! let nets = parse_nets(page, Nir::Krnic, None);
//! assert_eq!(nets[0].name.as_deref(), Some("Korea Telecom"));
//! assert_eq!(nets[0].created.as_deref(), Some("2009-04-09T00:00:00"));
//! ```

pub mod nir;
pub mod tables;

pub use nir::{parse_nets, NirContact, NirContacts, NirNet, NirOptions, NirResult, NirWhois};
pub use tables::{nir_config, NirConfig};
