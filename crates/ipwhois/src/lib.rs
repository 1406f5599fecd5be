//! IP address WHOIS, RDAP and ASN resolution
//!
//! [`IpWhois`] ties the resolver crates together. Given an address it:
//! - finds the registry and AS through Team Cymru (DNS, then WHOIS, then the
//!   ARIN REST fallback)
//! - queries that registry over port-43 WHOIS or RDAP
//! - consults JPNIC or KRNIC when the AS is registered in Japan or Korea
//!
//! Results are plain serializable structs whose field names follow the usual
//! `{query, asn, asn_cidr, asn_registry, ..., nets, nir}` layout.
//!
//! # Examples
//!
//! ```no_run
//! use ipwhois::{IpWhois, RdapLookupOptions};
//! use ipwhois_core::config::LookupConfig;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let whois = IpWhois::new("74.125.225.229", LookupConfig::from_env()?)?;
//!
//! let options = RdapLookupOptions {
//!     depth: 1,
//!     ..RdapLookupOptions::default()
//! };
//! let result = whois.lookup_rdap(&options).await?;
//! println!("{}", serde_json::to_string_pretty(&result)?);
//! # Ok(())
//! # }
//! ```

pub mod lookup;

pub use lookup::{
    IpWhois, LookupOptions, RdapLookup, RdapLookupOptions, WhoisLookup, WhoisLookupOptions,
};

pub use ipwhois_core::{LookupError, LookupTarget, Nir, Result, Rir};
