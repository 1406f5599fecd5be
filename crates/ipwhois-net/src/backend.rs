//! Pluggable I/O backends
//!
//! Each network primitive sits behind an object-safe trait so lookups can run
//! against real sockets or against in-memory stubs.

use async_trait::async_trait;
use std::fmt;
use std::io;
use std::net::IpAddr;
use std::time::{Duration, Instant};
use thiserror::Error;

/// One WHOIS round trip over TCP
#[async_trait]
pub trait WhoisConnector: Send + Sync {
    /// Connect, send `query`, and read until the server closes the connection
    async fn exchange(
        &self,
        server: &str,
        port: u16,
        query: &str,
        timeout: Duration,
    ) -> io::Result<Vec<u8>>;
}

/// HTTP request method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpMethod::Get => f.write_str("GET"),
            HttpMethod::Post => f.write_str("POST"),
        }
    }
}

/// A single HTTP request
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HttpRequest {
    pub url: String,
    pub method: HttpMethod,
    pub headers: Vec<(String, String)>,
    /// URL-encoded form body
    pub form: Option<Vec<(String, String)>>,
}

impl HttpRequest {
    /// GET request with no extra headers
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Add a header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Status and body of an HTTP response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpReply {
    /// Reply with the given status and text body
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// True for 2xx statuses
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP transport failures (no response received)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Request timed out
    #[error("request timed out")]
    Timeout,

    /// Connection or protocol failure
    #[error("{0}")]
    Transport(String),
}

/// Performs HTTP requests
#[async_trait]
pub trait HttpFetcher: Send + Sync {
    async fn fetch(&self, request: &HttpRequest) -> Result<HttpReply, FetchError>;
}

/// DNS failure classes
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DnsFailure {
    #[error("NXDOMAIN")]
    NxDomain,

    #[error("NoNameservers")]
    NoNameservers,

    #[error("NoAnswer")]
    NoAnswer,

    #[error("Timeout")]
    Timeout,

    #[error("{0}")]
    Other(String),
}

/// TXT and PTR lookups
#[async_trait]
pub trait DnsBackend: Send + Sync {
    /// TXT records for `name`, each record's strings concatenated
    async fn txt(&self, name: &str) -> Result<Vec<String>, DnsFailure>;

    /// PTR names for an address, without the trailing dot
    async fn reverse(&self, addr: IpAddr) -> Result<Vec<String>, DnsFailure>;
}

/// Time source for retry sleeps and rate-limit windows
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;

    async fn sleep(&self, duration: Duration);
}
