//! Lookup configuration
//!
//! Timeouts, retry budget and proxy settings shared by every transport.
//! Values come from code or from `IPWHOIS_*` environment variables.

use std::env;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Environment variable could not be parsed
    #[error("Invalid value for {var}: {value:?} ({reason})")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: String,
    },

    /// Proxy URL is not usable
    #[error("Invalid proxy URL: {0}")]
    InvalidProxy(String),
}

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

pub const ENV_TIMEOUT: &str = "IPWHOIS_TIMEOUT";
pub const ENV_RETRY_COUNT: &str = "IPWHOIS_RETRY_COUNT";
pub const ENV_RATE_LIMIT_TIMEOUT: &str = "IPWHOIS_RATE_LIMIT_TIMEOUT";
pub const ENV_PROXY: &str = "IPWHOIS_PROXY";

/// Settings for network lookups
///
/// `retry_count` is the total attempt budget for one transport call; a
/// value of zero still allows a single attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupConfig {
    /// Socket, DNS and HTTP timeout
    pub timeout: Duration,
    /// Attempts per transport call
    pub retry_count: u32,
    /// Sleep after an HTTP rate limit response
    pub rate_limit_timeout: Duration,
    /// HTTP(S) proxy URL
    pub proxy: Option<String>,
    /// User-Agent sent on HTTP requests
    pub user_agent: String,
}

impl LookupConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            retry_count: 3,
            rate_limit_timeout: Duration::from_secs(120),
            proxy: None,
            user_agent: format!("ipwhois-rs/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Defaults overlaid with `IPWHOIS_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|name| env::var(name).ok())
    }

    /// Defaults overlaid with values from an arbitrary variable source
    pub fn from_vars<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::new();

        if let Some(value) = lookup(ENV_TIMEOUT) {
            config.timeout = Duration::from_secs(parse_u64(ENV_TIMEOUT, &value)?);
        }
        if let Some(value) = lookup(ENV_RETRY_COUNT) {
            config.retry_count = parse_u32(ENV_RETRY_COUNT, &value)?;
        }
        if let Some(value) = lookup(ENV_RATE_LIMIT_TIMEOUT) {
            config.rate_limit_timeout =
                Duration::from_secs(parse_u64(ENV_RATE_LIMIT_TIMEOUT, &value)?);
        }
        if let Some(value) = lookup(ENV_PROXY) {
            if !value.trim().is_empty() {
                config.proxy = Some(value.trim().to_string());
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Set the transport timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the attempt budget
    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    /// Set the HTTP rate limit sleep
    pub fn with_rate_limit_timeout(mut self, timeout: Duration) -> Self {
        self.rate_limit_timeout = timeout;
        self
    }

    /// Route HTTP requests through a proxy
    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    /// Number of attempts a transport call may make
    pub fn attempts(&self) -> u32 {
        self.retry_count.max(1)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                var: ENV_TIMEOUT,
                value: "0".to_string(),
                reason: "timeout must be positive".to_string(),
            });
        }

        if let Some(proxy) = &self.proxy {
            let scheme = proxy.split_once("://").map(|(s, _)| s);
            if !matches!(scheme, Some("http") | Some("https") | Some("socks5")) {
                return Err(ConfigError::InvalidProxy(mask_url(proxy)));
            }
        }

        Ok(())
    }

    /// Proxy URL for display, with credentials hidden
    pub fn masked_proxy(&self) -> Option<String> {
        self.proxy.as_deref().map(mask_url)
    }
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_u64(var: &'static str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|e: std::num::ParseIntError| ConfigError::InvalidValue {
            var,
            value: value.to_string(),
            reason: e.to_string(),
        })
}

fn parse_u32(var: &'static str, value: &str) -> Result<u32> {
    let wide = parse_u64(var, value)?;
    u32::try_from(wide).map_err(|e| ConfigError::InvalidValue {
        var,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn mask_url(url: &str) -> String {
    let (scheme, rest) = match url.split_once("://") {
        Some(parts) => parts,
        None => ("", url),
    };
    let host = match rest.rsplit_once('@') {
        Some((_, host)) => format!("****@{}", host),
        None => rest.to_string(),
    };
    if scheme.is_empty() {
        host
    } else {
        format!("{}://{}", scheme, host)
    }
}
