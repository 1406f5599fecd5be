//! Lookup error taxonomy
//!
//! Every failure a lookup can surface is one variant of [`LookupError`].
//! Transport variants are produced once retries are exhausted; registry
//! mismatches (`AsnRegistry`) are caught by fallback loops and only surface
//! when every method has failed.

use thiserror::Error;

/// Error types for lookup operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    /// Invalid argument while building a lookup
    #[error("{0}")]
    Net(String),

    /// Address is reserved or special-use
    #[error("IPv{version} address {address} is already defined as {name} via {rfc}.")]
    IpDefined {
        version: u8,
        address: String,
        name: String,
        rfc: String,
    },

    /// ASN lookup over DNS/WHOIS/HTTP failed
    #[error("{0}")]
    AsnLookup(String),

    /// Registry missing or not one of the known RIRs
    #[error("{0}")]
    AsnRegistry(String),

    /// ASN response could not be parsed
    #[error("{0}")]
    AsnParse(String),

    /// ASN origin (RADB) lookup failed
    #[error("{0}")]
    AsnOriginLookup(String),

    /// WHOIS query failed
    #[error("{0}")]
    WhoisLookup(String),

    /// WHOIS server kept answering with a rate limit notice
    #[error("{0}")]
    WhoisRateLimit(String),

    /// Server is on the do-not-query list
    #[error("{0}")]
    Blacklist(String),

    /// HTTP query failed
    #[error("{0}")]
    HttpLookup(String),

    /// HTTP server kept rate limiting
    #[error("{0}")]
    HttpRateLimit(String),

    /// Reverse hostname lookup failed
    #[error("{0}")]
    HostLookup(String),

    /// RDAP network object is malformed
    #[error("{0}")]
    InvalidNetworkObject(String),

    /// RDAP entity object is malformed
    #[error("{0}")]
    InvalidEntityObject(String),

    /// RDAP vCard contact is malformed
    #[error("{0}")]
    InvalidEntityContactObject(String),
}

impl LookupError {
    /// True for rate limit failures from either transport
    pub fn is_rate_limit(&self) -> bool {
        matches!(
            self,
            LookupError::WhoisRateLimit(_) | LookupError::HttpRateLimit(_)
        )
    }

    /// Short stable name, used as a log field
    pub fn kind(&self) -> &'static str {
        match self {
            LookupError::Net(_) => "net",
            LookupError::IpDefined { .. } => "ip_defined",
            LookupError::AsnLookup(_) => "asn_lookup",
            LookupError::AsnRegistry(_) => "asn_registry",
            LookupError::AsnParse(_) => "asn_parse",
            LookupError::AsnOriginLookup(_) => "asn_origin_lookup",
            LookupError::WhoisLookup(_) => "whois_lookup",
            LookupError::WhoisRateLimit(_) => "whois_rate_limit",
            LookupError::Blacklist(_) => "blacklist",
            LookupError::HttpLookup(_) => "http_lookup",
            LookupError::HttpRateLimit(_) => "http_rate_limit",
            LookupError::HostLookup(_) => "host_lookup",
            LookupError::InvalidNetworkObject(_) => "invalid_network_object",
            LookupError::InvalidEntityObject(_) => "invalid_entity_object",
            LookupError::InvalidEntityContactObject(_) => "invalid_entity_contact_object",
        }
    }
}

/// Result type alias for lookup operations
pub type Result<T> = std::result::Result<T, LookupError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LookupError::IpDefined {
            version: 4,
            address: "127.0.0.1".to_string(),
            name: "Loopback".to_string(),
            rfc: "RFC 1122, Section 3.2.1.3".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "IPv4 address 127.0.0.1 is already defined as Loopback via RFC 1122, Section 3.2.1.3."
        );

        let err = LookupError::Blacklist("The server root.rwhois.net is blacklisted.".to_string());
        assert_eq!(err.to_string(), "The server root.rwhois.net is blacklisted.");
    }

    #[test]
    fn test_rate_limit_classification() {
        assert!(LookupError::HttpRateLimit(String::new()).is_rate_limit());
        assert!(LookupError::WhoisRateLimit(String::new()).is_rate_limit());
        assert!(!LookupError::HttpLookup(String::new()).is_rate_limit());
        assert_eq!(LookupError::AsnRegistry(String::new()).kind(), "asn_registry");
    }
}
