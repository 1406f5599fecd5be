//! Look up an address over WHOIS and RDAP and print the merged results
//!
//! ```text
//! cargo run -p ipwhois --example lookup -- 74.125.225.229
//! ```

use anyhow::Context;
use ipwhois::{IpWhois, RdapLookupOptions, WhoisLookupOptions};
use ipwhois_core::config::LookupConfig;
use tracing::Level;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::DEBUG).init();

    let address = std::env::args()
        .nth(1)
        .context("usage: lookup <ip address>")?;

    let config = LookupConfig::from_env()?;
    tracing::info!(proxy = ?config.masked_proxy(), timeout = ?config.timeout, "Using configuration");

    let whois = IpWhois::new(&address, config)?;

    let result = whois.lookup_whois(&WhoisLookupOptions::default()).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);

    let options = RdapLookupOptions {
        depth: 1,
        ..RdapLookupOptions::default()
    };
    let result = whois.lookup_rdap(&options).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);

    Ok(())
}
