//! Network round trips with bounded retries
//!
//! Retries are an explicit loop over an attempt budget. `retry_count` is the
//! total number of attempts, with a floor of one. Sleeps go through the
//! transport's [`Clock`].

use crate::backend::{
    Clock, DnsBackend, DnsFailure, HttpFetcher, HttpMethod, HttpReply, HttpRequest,
    WhoisConnector,
};
use crate::system::{HickoryDns, ReqwestFetcher, TcpWhois, TokioClock};
use ipwhois_core::config::LookupConfig;
use ipwhois_core::{LookupError, Result};
use serde_json::Value;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Servers that must never be queried
pub const BLACKLIST: &[&str] = &["root.rwhois.net"];

/// Marker a WHOIS server sends when throttling
const WHOIS_RATE_LIMIT_MARKER: &str = "Query rate limit exceeded";

/// Markers of a registry-side query error
const WHOIS_ERROR_MARKERS: &[&str] = &["error 501", "error 230"];

/// Sleep between rate-limited WHOIS attempts
pub const WHOIS_RATE_LIMIT_SLEEP: Duration = Duration::from_secs(1);

/// Notice title RDAP servers use for throttling
const RDAP_RATE_LIMIT_NOTICE: &str = "Rate Limit Notice";

/// True when a server is in the global or caller blacklist
pub fn is_blacklisted(server: &str, extra_blacklist: &[String]) -> bool {
    BLACKLIST.contains(&server) || extra_blacklist.iter().any(|s| s == server)
}

/// Drop every non-ASCII byte
pub fn decode_ascii(bytes: &[u8]) -> String {
    bytes
        .iter()
        .filter(|b| b.is_ascii())
        .map(|&b| b as char)
        .collect()
}

/// Which lookup a WHOIS query belongs to; decides the error surfaced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhoisStage {
    Whois,
    Asn,
    AsnOrigin,
}

impl WhoisStage {
    fn failure(self, subject: &str) -> LookupError {
        match self {
            WhoisStage::Whois => {
                LookupError::WhoisLookup(format!("WHOIS lookup failed for {}.", subject))
            }
            WhoisStage::Asn => LookupError::AsnLookup(format!("ASN lookup failed for {}.", subject)),
            WhoisStage::AsnOrigin => LookupError::AsnOriginLookup(format!(
                "ASN origin WHOIS lookup failed for {}.",
                subject
            )),
        }
    }
}

/// A WHOIS query and its retry policy
#[derive(Debug, Clone)]
pub struct WhoisQuery<'a> {
    pub server: &'a str,
    pub port: u16,
    /// Full query line including the trailing CRLF
    pub query: String,
    pub retry_count: u32,
    pub stage: WhoisStage,
    /// Address or ASN named in error messages
    pub subject: &'a str,
    pub extra_blacklist: &'a [String],
}

enum Body<T> {
    Ready(T),
    RateLimited,
    Invalid(LookupError),
}

/// Bundle of network backends plus the settings they run with
///
/// Cheap to clone; backends are shared.
#[derive(Clone)]
pub struct Transport {
    config: LookupConfig,
    whois: Arc<dyn WhoisConnector>,
    http: Arc<dyn HttpFetcher>,
    dns: Arc<dyn DnsBackend>,
    clock: Arc<dyn Clock>,
}

impl Transport {
    /// Transport over real sockets, DNS and HTTP
    pub fn new(config: LookupConfig) -> Result<Self> {
        let http = ReqwestFetcher::new(&config)?;
        let dns = HickoryDns::new(config.timeout);

        Ok(Self {
            config,
            whois: Arc::new(TcpWhois),
            http: Arc::new(http),
            dns: Arc::new(dns),
            clock: Arc::new(TokioClock),
        })
    }

    /// Transport over caller-supplied backends
    pub fn from_parts(
        config: LookupConfig,
        whois: Arc<dyn WhoisConnector>,
        http: Arc<dyn HttpFetcher>,
        dns: Arc<dyn DnsBackend>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            whois,
            http,
            dns,
            clock,
        }
    }

    /// Settings in effect
    pub fn config(&self) -> &LookupConfig {
        &self.config
    }

    /// Time source used for sleeps
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Resolve TXT records; every failure class is an ASN lookup error
    pub async fn dns_query(&self, name: &str, subject: &str) -> Result<Vec<String>> {
        debug!(zone = name, "ASN DNS query");
        self.dns.txt(name).await.map_err(|e| match e {
            DnsFailure::Other(reason) => {
                debug!(zone = name, %reason, "ASN DNS query failed");
                LookupError::AsnLookup(format!("ASN lookup failed for {}.", subject))
            }
            class => LookupError::AsnLookup(format!(
                "ASN lookup failed (DNS {}) for {}.",
                class, subject
            )),
        })
    }

    /// PTR names for an address
    pub async fn reverse_lookup(&self, addr: IpAddr) -> std::result::Result<Vec<String>, DnsFailure> {
        self.dns.reverse(addr).await
    }

    /// One WHOIS exchange with rate-limit and socket-error retries
    pub async fn whois_query(&self, query: &WhoisQuery<'_>) -> Result<String> {
        if is_blacklisted(query.server, query.extra_blacklist) {
            return Err(LookupError::Blacklist(format!(
                "The server {} is blacklisted.",
                query.server
            )));
        }

        let attempts = query.retry_count.max(1);
        for attempt in 1..=attempts {
            debug!(
                server = query.server,
                port = query.port,
                attempt,
                "WHOIS query for {}",
                query.subject
            );

            let bytes = match self
                .whois
                .exchange(query.server, query.port, &query.query, self.config.timeout)
                .await
            {
                Ok(bytes) => bytes,
                Err(e) => {
                    debug!(server = query.server, attempt, error = %e, "WHOIS query socket error");
                    continue;
                }
            };

            let response = decode_ascii(&bytes);
            if response.contains(WHOIS_RATE_LIMIT_MARKER) {
                if attempt == attempts {
                    return Err(LookupError::WhoisRateLimit(format!(
                        "Whois lookup failed for {}. Rate limit exceeded, wait and try again (possibly a temporary block).",
                        query.subject
                    )));
                }
                debug!(server = query.server, "WHOIS query rate limit exceeded. Waiting...");
                self.clock.sleep(WHOIS_RATE_LIMIT_SLEEP).await;
                continue;
            }

            if WHOIS_ERROR_MARKERS.iter().any(|m| response.contains(m)) {
                debug!(server = query.server, "WHOIS query error: {}", response.trim());
                return Err(query.stage.failure(query.subject));
            }

            return Ok(response);
        }

        Err(query.stage.failure(query.subject))
    }

    /// GET a JSON document
    ///
    /// `headers` defaults to `Accept: application/rdap+json`.
    pub async fn http_json(
        &self,
        url: &str,
        headers: Option<&[(&str, &str)]>,
        retry_count: u32,
        rate_limit_timeout: Duration,
    ) -> Result<Value> {
        let request = build_request(
            url,
            headers.unwrap_or(&[("Accept", "application/rdap+json")]),
            HttpMethod::Get,
            None,
        );

        self.http_attempts(&request, retry_count, rate_limit_timeout, |body| {
            let text = String::from_utf8_lossy(&body);
            match serde_json::from_str::<Value>(&text) {
                Ok(json) if has_rate_limit_notice(&json) => Body::RateLimited,
                Ok(json) => Body::Ready(json),
                Err(e) => {
                    debug!(url, error = %e, "HTTP response is not JSON");
                    Body::Invalid(LookupError::HttpLookup(format!(
                        "HTTP lookup failed for {}.",
                        url
                    )))
                }
            }
        })
        .await
    }

    /// Fetch a document as ASCII text, with an optional URL-encoded form
    ///
    /// `headers` defaults to `Accept: text/html`.
    pub async fn http_raw(
        &self,
        url: &str,
        headers: Option<&[(&str, &str)]>,
        method: HttpMethod,
        form_data: Option<&[(&str, &str)]>,
        retry_count: u32,
    ) -> Result<String> {
        let request = build_request(
            url,
            headers.unwrap_or(&[("Accept", "text/html")]),
            method,
            form_data,
        );

        self.http_attempts(
            &request,
            retry_count,
            self.config.rate_limit_timeout,
            |body| Body::Ready(decode_ascii(&body)),
        )
        .await
    }

    async fn http_attempts<T, F>(
        &self,
        request: &HttpRequest,
        retry_count: u32,
        rate_limit_timeout: Duration,
        mut accept: F,
    ) -> Result<T>
    where
        F: FnMut(Vec<u8>) -> Body<T>,
    {
        let url = request.url.as_str();
        let attempts = retry_count.max(1);
        let mut last_status = None;

        for attempt in 1..=attempts {
            debug!(url, method = %request.method, attempt, "HTTP query");

            let reply: HttpReply = match self.http.fetch(request).await {
                Ok(reply) => reply,
                Err(e) => {
                    debug!(url, attempt, error = %e, "HTTP query socket error");
                    continue;
                }
            };

            let rate_limited = if reply.status == 429 {
                true
            } else if !reply.is_success() {
                debug!(url, attempt, status = reply.status, "HTTP query error status");
                last_status = Some(reply.status);
                continue;
            } else {
                match accept(reply.body) {
                    Body::Ready(value) => return Ok(value),
                    Body::Invalid(e) => return Err(e),
                    Body::RateLimited => true,
                }
            };

            if rate_limited {
                if attempt == attempts {
                    return Err(LookupError::HttpRateLimit(format!(
                        "HTTP lookup failed for {}. Rate limit exceeded, wait and try again (possibly a temporary block).",
                        url
                    )));
                }
                debug!(url, "HTTP query rate limit exceeded. Waiting {:?}...", rate_limit_timeout);
                self.clock.sleep(rate_limit_timeout).await;
            }
        }

        Err(match last_status {
            Some(status) => LookupError::HttpLookup(format!(
                "HTTP lookup failed for {} with error code {}.",
                url, status
            )),
            None => LookupError::HttpLookup(format!("HTTP lookup failed for {}.", url)),
        })
    }
}

fn build_request(
    url: &str,
    headers: &[(&str, &str)],
    method: HttpMethod,
    form_data: Option<&[(&str, &str)]>,
) -> HttpRequest {
    HttpRequest {
        url: url.to_string(),
        method,
        headers: headers
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        form: form_data.map(|pairs| {
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect()
        }),
    }
}

fn has_rate_limit_notice(json: &Value) -> bool {
    json.get("notices")
        .and_then(Value::as_array)
        .map(|notices| {
            notices
                .iter()
                .any(|n| n.get("title").and_then(Value::as_str) == Some(RDAP_RATE_LIMIT_NOTICE))
        })
        .unwrap_or(false)
}
