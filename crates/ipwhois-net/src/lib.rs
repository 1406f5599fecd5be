//! Network transport for ipwhois
//!
//! Performs the raw round trips every resolver is built on:
//! - DNS TXT queries against the Cymru origin zones
//! - WHOIS port-43 queries (Cymru, RIRs, RADB, RWHOIS referrals)
//! - HTTP(S) JSON and text fetches (RDAP, ARIN REST, RADB, NIR gateways)
//!
//! Transient failures are retried inside an explicit attempt budget and then
//! surface as one typed [`LookupError`](ipwhois_core::LookupError). Nothing is
//! cached between calls.
//!
//! All I/O goes through the traits in [`backend`], so the same code runs
//! against the stubs in `testing` (feature `test-util`).
//!
//! # Examples
//!
//! ```no_run
//! use ipwhois_core::{LookupTarget, Rir};
//! use ipwhois_core::config::LookupConfig;
//! use ipwhois_net::{Net, WhoisRequest};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let net = Net::new(LookupTarget::parse("74.125.225.229")?, LookupConfig::from_env()?)?;
//! let text = net.get_whois(&WhoisRequest::new(Rir::Arin)).await?;
//! println!("{}", text);
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod net;
pub mod system;
pub mod transport;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use backend::{
    Clock, DnsBackend, DnsFailure, FetchError, HttpFetcher, HttpMethod, HttpReply, HttpRequest,
    WhoisConnector,
};
pub use net::{rir_whois_server, HostInfo, Net, WhoisRequest, WHOIS_PORT};
pub use transport::{decode_ascii, is_blacklisted, Transport, WhoisQuery, WhoisStage, BLACKLIST};
