//! RDAP resolution for ipwhois
//!
//! Queries a registry's RDAP service (or ARIN's bootstrap redirector) for the
//! IP network covering an address, decodes it and its entities, and follows
//! entity references to a caller-chosen depth. Entities are stored once per
//! handle, which also breaks reference cycles.
//!
//! # Examples
//!
//! ```
//! use ipwhois_rdap::RdapNetwork;
//! use serde_json::json;
//!
//! let network = RdapNetwork::parse(&json!({
//!     "handle": "NET-74-125-0-0-1",
//!     "startAddress": "074.125.000.000",
//!     "endAddress": "074.125.255.255",
//! }))
//! .unwrap();
//!
//! assert_eq!(network.cidr.as_deref(), Some("74.125.0.0/16"));
//! ```

pub mod objects;
pub mod rdap;
pub mod vcard;

pub use objects::{RdapCommon, RdapEntity, RdapEvent, RdapNetwork, RdapNotice};
pub use rdap::{Rdap, RdapEndpoints, RdapOptions, RdapResult, BOOTSTRAP_URL};
pub use vcard::{parse_vcard, ContactValue, RdapContact};
