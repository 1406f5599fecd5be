//! Backends that talk to the real network

use crate::backend::{
    Clock, DnsBackend, DnsFailure, FetchError, HttpFetcher, HttpMethod, HttpReply, HttpRequest,
    WhoisConnector,
};
use async_trait::async_trait;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::error::{ResolveError, ResolveErrorKind};
use hickory_resolver::proto::op::ResponseCode;
use hickory_resolver::TokioAsyncResolver;
use ipwhois_core::config::LookupConfig;
use ipwhois_core::{LookupError, Result};
use reqwest::Client;
use std::io;
use std::net::IpAddr;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

/// WHOIS over tokio TCP sockets
#[derive(Debug, Clone, Default)]
pub struct TcpWhois;

#[async_trait]
impl WhoisConnector for TcpWhois {
    async fn exchange(
        &self,
        server: &str,
        port: u16,
        query: &str,
        timeout: Duration,
    ) -> io::Result<Vec<u8>> {
        let timed_out = || io::Error::new(io::ErrorKind::TimedOut, "WHOIS query timed out");

        let mut stream = tokio::time::timeout(timeout, TcpStream::connect((server, port)))
            .await
            .map_err(|_| timed_out())??;

        stream.write_all(query.as_bytes()).await?;

        let mut response = Vec::new();
        tokio::time::timeout(timeout, stream.read_to_end(&mut response))
            .await
            .map_err(|_| timed_out())??;

        Ok(response)
    }
}

/// HTTP via a pooled reqwest client
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: Client,
}

impl ReqwestFetcher {
    /// Build a client honoring the timeout, user agent and proxy settings
    pub fn new(config: &LookupConfig) -> Result<Self> {
        let mut builder = Client::builder()
            .pool_max_idle_per_host(10)
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone());

        if let Some(proxy) = &config.proxy {
            let proxy = reqwest::Proxy::all(proxy.as_str()).map_err(|e| {
                LookupError::Net(format!(
                    "Invalid proxy {}: {}",
                    config.masked_proxy().unwrap_or_default(),
                    e
                ))
            })?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| LookupError::Net(format!("HTTP client setup failed: {}", e)))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl HttpFetcher for ReqwestFetcher {
    async fn fetch(&self, request: &HttpRequest) -> std::result::Result<HttpReply, FetchError> {
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(form) = &request.form {
            builder = builder.form(form);
        }

        let classify = |e: reqwest::Error| {
            if e.is_timeout() {
                FetchError::Timeout
            } else {
                FetchError::Transport(e.to_string())
            }
        };

        let response = builder.send().await.map_err(classify)?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(classify)?;

        Ok(HttpReply {
            status,
            body: body.to_vec(),
        })
    }
}

/// DNS through hickory, using the system resolver configuration when available
pub struct HickoryDns {
    resolver: TokioAsyncResolver,
}

impl HickoryDns {
    pub fn new(timeout: Duration) -> Self {
        let (config, mut opts) = match hickory_resolver::system_conf::read_system_conf() {
            Ok(conf) => conf,
            Err(e) => {
                debug!(error = %e, "system resolver config unavailable, using defaults");
                (ResolverConfig::default(), ResolverOpts::default())
            }
        };
        opts.timeout = timeout;
        opts.attempts = 1;

        Self {
            resolver: TokioAsyncResolver::tokio(config, opts),
        }
    }
}

fn classify_dns(e: ResolveError) -> DnsFailure {
    match e.kind() {
        ResolveErrorKind::NoRecordsFound { response_code, .. } => {
            if *response_code == ResponseCode::NXDomain {
                DnsFailure::NxDomain
            } else {
                DnsFailure::NoAnswer
            }
        }
        ResolveErrorKind::NoConnections => DnsFailure::NoNameservers,
        ResolveErrorKind::Timeout => DnsFailure::Timeout,
        _ => DnsFailure::Other(e.to_string()),
    }
}

#[async_trait]
impl DnsBackend for HickoryDns {
    async fn txt(&self, name: &str) -> std::result::Result<Vec<String>, DnsFailure> {
        let lookup = self.resolver.txt_lookup(name).await.map_err(classify_dns)?;
        let answers: Vec<String> = lookup
            .iter()
            .map(|txt| {
                txt.txt_data()
                    .iter()
                    .map(|part| String::from_utf8_lossy(part).into_owned())
                    .collect::<String>()
            })
            .collect();

        if answers.is_empty() {
            return Err(DnsFailure::NoAnswer);
        }
        Ok(answers)
    }

    async fn reverse(&self, addr: IpAddr) -> std::result::Result<Vec<String>, DnsFailure> {
        let lookup = self
            .resolver
            .reverse_lookup(addr)
            .await
            .map_err(classify_dns)?;
        let names: Vec<String> = lookup
            .iter()
            .map(|ptr| ptr.to_string().trim_end_matches('.').to_string())
            .collect();

        if names.is_empty() {
            return Err(DnsFailure::NoAnswer);
        }
        Ok(names)
    }
}

/// Wall clock backed by tokio timers
#[derive(Debug, Clone, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
