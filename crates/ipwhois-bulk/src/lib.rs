//! Bulk lookups for ipwhois
//!
//! Resolves many addresses at once. A single Team Cymru bulk WHOIS session
//! classifies every address by registry; RDAP lookups are then scheduled
//! round-robin across registries (LACNIC first), each registry limited to
//! nine requests per window. Per-address failures are retried on later passes
//! and reported in [`BulkStats`] rather than failing the run.
//!
//! # Examples
//!
//! ```no_run
//! use ipwhois_bulk::{bulk_lookup_rdap, BulkOptions};
//! use ipwhois_core::config::LookupConfig;
//! use ipwhois_net::Transport;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = Transport::new(LookupConfig::from_env()?)?;
//! let addresses = ["74.125.225.229", "200.57.141.161", "2001:43f8:7b0::"];
//!
//! let lookup = bulk_lookup_rdap(&transport, &addresses, &BulkOptions::default()).await?;
//! for (address, result) in &lookup.results {
//!     println!("{} {}", address, result.network.handle);
//! }
//! println!("unallocated: {:?}", lookup.stats.unallocated_addresses);
//! # Ok(())
//! # }
//! ```

pub mod bulk;
pub mod window;

pub use bulk::{
    bulk_lookup_rdap, get_bulk_asn_whois, parse_bulk_asn, BulkLookup, BulkOptions, BulkStats,
    RegistryStats, REGISTRY_ORDER,
};
pub use window::{RateWindow, WINDOW_LIMIT};
