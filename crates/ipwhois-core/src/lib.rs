//! Core types for ipwhois
//!
//! This crate provides the foundational types used by every resolver:
//! - [`LookupTarget`] - A validated, publicly routable IP address
//! - [`Rir`] / [`Nir`] - Registry identifiers
//! - [`AsnRecord`] - Result of an ASN lookup
//! - [`LookupError`] - Error taxonomy
//! - [`config::LookupConfig`] - Timeouts, retries and proxy settings
//!
//! ```
//! use ipwhois_core::{Asn, LookupTarget, Rir};
//!
//! let target = LookupTarget::parse("74.125.225.229").unwrap();
//! let registry: Rir = "arin".parse().unwrap();
//! let asn: Asn = "AS15169".parse().unwrap();
//! assert_eq!(asn.to_string(), "AS15169");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod config;
pub mod error;
pub mod target;
pub mod utils;

pub use error::{LookupError, Result};
pub use target::{ipv4_is_defined, ipv6_is_defined, LookupTarget, Reservation};

/// Autonomous System Number (ASN)
///
/// # Examples
///
/// ```
/// use ipwhois_core::Asn;
///
/// let google: Asn = "15169".parse().unwrap();
/// let same: Asn = "as15169".parse().unwrap();
/// assert_eq!(google, same);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Asn(pub u32);

impl fmt::Display for Asn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AS{}", self.0)
    }
}

impl From<u32> for Asn {
    fn from(value: u32) -> Self {
        Asn(value)
    }
}

impl FromStr for Asn {
    type Err = LookupError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let digits = match trimmed.get(..2) {
            Some(prefix) if prefix.eq_ignore_ascii_case("as") => &trimmed[2..],
            _ => trimmed,
        };
        digits
            .parse()
            .map(Asn)
            .map_err(|_| LookupError::Net(format!("Invalid ASN: {}", s)))
    }
}

/// Regional Internet Registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rir {
    Arin,
    RipeNcc,
    Apnic,
    Lacnic,
    Afrinic,
}

impl Rir {
    /// All registries
    pub const ALL: [Rir; 5] = [Rir::Arin, Rir::RipeNcc, Rir::Apnic, Rir::Lacnic, Rir::Afrinic];

    /// Lowercase registry name as reported by Cymru
    pub fn as_str(&self) -> &'static str {
        match self {
            Rir::Arin => "arin",
            Rir::RipeNcc => "ripencc",
            Rir::Apnic => "apnic",
            Rir::Lacnic => "lacnic",
            Rir::Afrinic => "afrinic",
        }
    }
}

impl fmt::Display for Rir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Rir {
    type Err = LookupError;

    fn from_str(s: &str) -> Result<Self> {
        Rir::ALL
            .into_iter()
            .find(|rir| rir.as_str() == s)
            .ok_or_else(|| LookupError::AsnRegistry(format!("ASN registry {} is not known.", s)))
    }
}

/// National Internet Registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Nir {
    Jpnic,
    Krnic,
}

impl Nir {
    /// Registry name
    pub fn as_str(&self) -> &'static str {
        match self {
            Nir::Jpnic => "jpnic",
            Nir::Krnic => "krnic",
        }
    }

    /// ISO country code the registry serves
    pub fn country_code(&self) -> &'static str {
        match self {
            Nir::Jpnic => "JP",
            Nir::Krnic => "KR",
        }
    }

    /// NIR responsible for a country, if any
    pub fn from_country_code(cc: &str) -> Option<Nir> {
        match cc.to_ascii_uppercase().as_str() {
            "JP" => Some(Nir::Jpnic),
            "KR" => Some(Nir::Krnic),
            _ => None,
        }
    }
}

impl fmt::Display for Nir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Nir {
    type Err = LookupError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "jpnic" => Ok(Nir::Jpnic),
            "krnic" => Ok(Nir::Krnic),
            _ => Err(LookupError::Net(format!("Unknown NIR: {}", s))),
        }
    }
}

/// Which ASN lookup method produced a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AsnSource {
    #[default]
    Dns,
    Whois,
    Http,
}

/// Result of an ASN lookup
///
/// Records from the ARIN HTTP fallback only identify the registry; every
/// other field is `None` and [`AsnRecord::is_partial`] returns true.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AsnRecord {
    pub asn_registry: Rir,
    pub asn: Option<String>,
    pub asn_cidr: Option<String>,
    pub asn_country_code: Option<String>,
    pub asn_date: Option<String>,
    pub asn_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
    #[serde(default)]
    pub asn_source: AsnSource,
}

impl AsnRecord {
    /// Record with only the registry known
    pub fn registry_only(asn_registry: Rir, asn_source: AsnSource) -> Self {
        Self {
            asn_registry,
            asn: None,
            asn_cidr: None,
            asn_country_code: None,
            asn_date: None,
            asn_description: None,
            raw: None,
            asn_source,
        }
    }

    /// True when the record came from the degraded HTTP fallback
    pub fn is_partial(&self) -> bool {
        self.asn_source == AsnSource::Http
    }

    /// Prefix length of `asn_cidr`, used to rank competing answers
    pub fn prefix_len(&self) -> Option<u8> {
        self.asn_cidr
            .as_deref()
            .and_then(|cidr| cidr.rsplit_once('/'))
            .and_then(|(_, len)| len.trim().parse().ok())
    }

    /// NIR to consult for this record's country
    pub fn nir(&self) -> Option<Nir> {
        self.asn_country_code
            .as_deref()
            .and_then(Nir::from_country_code)
    }
}
