//! Registry-facing queries for one lookup target

use crate::backend::HttpMethod;
use crate::transport::{Transport, WhoisQuery, WhoisStage};
use ipwhois_core::config::LookupConfig;
use ipwhois_core::{LookupError, LookupTarget, Result, Rir};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Cymru WHOIS server for ASN queries
pub const CYMRU_WHOIS: &str = "whois.cymru.com";

/// RADB WHOIS server for ASN origin queries
pub const RADB_WHOIS: &str = "whois.radb.net";

/// Standard WHOIS port
pub const WHOIS_PORT: u16 = 43;

/// ARIN REST endpoint used as the last-resort ASN registry lookup
pub const ARIN_NETS_URL: &str = "http://whois.arin.net/rest/nets;q={0}?showDetails=true&showARIN=true&showNonArinTopLevelNet=true&ext=netref2";

/// Cymru zone holding verbose AS descriptions
pub const ASN_DESCRIPTION_ZONE: &str = "asn.cymru.com";

/// Port-43 server for each RIR
pub fn rir_whois_server(rir: Rir) -> &'static str {
    match rir {
        Rir::Arin => "whois.arin.net",
        Rir::RipeNcc => "whois.ripe.net",
        Rir::Apnic => "whois.apnic.net",
        Rir::Lacnic => "whois.lacnic.net",
        Rir::Afrinic => "whois.afrinic.net",
    }
}

/// Parameters for a registry WHOIS query
#[derive(Debug, Clone)]
pub struct WhoisRequest {
    pub asn_registry: Rir,
    pub retry_count: u32,
    /// Overrides the registry's default server (used for referrals)
    pub server: Option<String>,
    pub port: u16,
    pub extra_blacklist: Vec<String>,
}

impl WhoisRequest {
    pub fn new(asn_registry: Rir) -> Self {
        Self {
            asn_registry,
            retry_count: 3,
            server: None,
            port: WHOIS_PORT,
            extra_blacklist: Vec::new(),
        }
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    pub fn with_server(mut self, server: impl Into<String>, port: u16) -> Self {
        self.server = Some(server.into());
        self.port = port;
        self
    }

    pub fn with_extra_blacklist(mut self, extra_blacklist: Vec<String>) -> Self {
        self.extra_blacklist = extra_blacklist;
        self
    }
}

/// Result of a reverse hostname lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostInfo {
    pub hostname: String,
    pub aliases: Vec<String>,
    pub addresses: Vec<String>,
}

/// Network access for one IP address
///
/// # Examples
///
/// ```no_run
/// use ipwhois_core::LookupTarget;
/// use ipwhois_core::config::LookupConfig;
/// use ipwhois_net::Net;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let net = Net::new(LookupTarget::parse("74.125.225.229")?, LookupConfig::new())?;
/// let answers = net.get_asn_dns().await?;
/// println!("{:?}", answers);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Net {
    target: LookupTarget,
    transport: Transport,
}

impl Net {
    /// Net over the real network
    pub fn new(target: LookupTarget, config: LookupConfig) -> Result<Self> {
        Ok(Self {
            target,
            transport: Transport::new(config)?,
        })
    }

    /// Net over an existing transport
    pub fn with_transport(target: LookupTarget, transport: Transport) -> Self {
        Self { target, transport }
    }

    pub fn target(&self) -> &LookupTarget {
        &self.target
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Configured timeout for socket, DNS and HTTP operations
    pub fn timeout(&self) -> Duration {
        self.transport.config().timeout
    }

    fn address(&self) -> String {
        self.target.to_string()
    }

    /// Terse Cymru TXT answers for the target
    pub async fn get_asn_dns(&self) -> Result<Vec<String>> {
        self.transport
            .dns_query(self.target.dns_zone(), &self.address())
            .await
    }

    /// Verbose Cymru TXT answer for an AS number (without the `AS` prefix)
    pub async fn get_asn_verbose_dns(&self, asn: &str) -> Result<String> {
        let asn = asn.trim();
        let asn = asn
            .strip_prefix("AS")
            .or_else(|| asn.strip_prefix("as"))
            .unwrap_or(asn);
        let zone = format!("AS{}.{}", asn, ASN_DESCRIPTION_ZONE);

        let answers = self.transport.dns_query(&zone, &format!("AS{}", asn)).await?;
        answers
            .into_iter()
            .next()
            .ok_or_else(|| LookupError::AsnLookup(format!("ASN lookup failed for AS{}.", asn)))
    }

    /// Cymru WHOIS line for the target
    pub async fn get_asn_whois(&self, retry_count: u32) -> Result<String> {
        let address = self.address();
        self.transport
            .whois_query(&WhoisQuery {
                server: CYMRU_WHOIS,
                port: WHOIS_PORT,
                query: format!(" -r -a -c -p -f {}\r\n", address),
                retry_count,
                stage: WhoisStage::Asn,
                subject: &address,
                extra_blacklist: &[],
            })
            .await
    }

    /// ARIN REST nets document for the target
    ///
    /// Only good enough to identify the registry.
    pub async fn get_asn_http(&self, retry_count: u32) -> Result<Value> {
        let address = self.address();
        let url = ARIN_NETS_URL.replace("{0}", &address);

        self.transport
            .http_json(
                &url,
                Some(&[("Accept", "application/json")]),
                retry_count,
                self.transport.config().rate_limit_timeout,
            )
            .await
            .map_err(|e| {
                debug!(url = %url, error = %e, "ASN HTTP query failed");
                LookupError::AsnLookup(format!("ASN lookup failed for {}.", address))
            })
    }

    /// RADB routes originated by an ASN
    pub async fn get_asn_origin_whois(
        &self,
        asn: &str,
        retry_count: u32,
        server: Option<&str>,
        port: u16,
    ) -> Result<String> {
        self.transport
            .whois_query(&WhoisQuery {
                server: server.unwrap_or(RADB_WHOIS),
                port,
                query: format!(" -i origin {}\r\n", asn),
                retry_count,
                stage: WhoisStage::AsnOrigin,
                subject: asn,
                extra_blacklist: &[],
            })
            .await
    }

    /// Registry WHOIS text for the target
    pub async fn get_whois(&self, request: &WhoisRequest) -> Result<String> {
        let address = self.address();
        let server = request
            .server
            .as_deref()
            .unwrap_or_else(|| rir_whois_server(request.asn_registry));

        let query = if request.asn_registry == Rir::Arin && request.server.is_none() {
            format!("n + {}\r\n", address)
        } else {
            format!("{}\r\n", address)
        };

        self.transport
            .whois_query(&WhoisQuery {
                server,
                port: request.port,
                query,
                retry_count: request.retry_count,
                stage: WhoisStage::Whois,
                subject: &address,
                extra_blacklist: &request.extra_blacklist,
            })
            .await
    }

    /// JSON document over HTTP
    pub async fn get_http_json(
        &self,
        url: &str,
        retry_count: u32,
        rate_limit_timeout: Duration,
        headers: Option<&[(&str, &str)]>,
    ) -> Result<Value> {
        self.transport
            .http_json(url, headers, retry_count, rate_limit_timeout)
            .await
    }

    /// Text document over HTTP
    pub async fn get_http_raw(
        &self,
        url: &str,
        retry_count: u32,
        headers: Option<&[(&str, &str)]>,
        method: HttpMethod,
        form_data: Option<&[(&str, &str)]>,
    ) -> Result<String> {
        self.transport
            .http_raw(url, headers, method, form_data, retry_count)
            .await
    }

    /// Reverse hostname for the target
    pub async fn get_host(&self, retry_count: u32) -> Result<HostInfo> {
        let address = self.address();
        let attempts = retry_count.max(1);

        for attempt in 1..=attempts {
            debug!(address = %address, attempt, "Host query");
            match self.transport.reverse_lookup(self.target.address()).await {
                Ok(mut names) if !names.is_empty() => {
                    let hostname = names.remove(0);
                    return Ok(HostInfo {
                        hostname,
                        aliases: names,
                        addresses: vec![address],
                    });
                }
                Ok(_) => break,
                Err(e) => debug!(address = %address, attempt, error = %e, "Host query failed"),
            }
        }

        Err(LookupError::HostLookup(format!(
            "Host lookup failed for {}.",
            address
        )))
    }
}
