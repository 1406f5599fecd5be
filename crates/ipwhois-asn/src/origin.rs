//! Routes originated by an ASN (RADB)

use ipwhois_cidr::Cidr;
use ipwhois_core::{Asn, LookupError, Result};
use ipwhois_net::{HttpMethod, Net, WHOIS_PORT};
use ipwhois_parse::{parse_fields, section_bounds, FieldKind, FieldMap, FieldTable, Section};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// RADB web query form
pub const RADB_QUERY_URL: &str = "http://www.radb.net/query";

const RADB_FORM: &[(&str, &str)] = &[
    ("advanced_query", "1"),
    ("query", "Query"),
    ("-T option", "inet-rtr"),
    ("ip_option", ""),
    ("-i", "1"),
    ("-i option", "origin"),
];

static WHOIS_FIELDS: Lazy<FieldTable> = Lazy::new(|| {
    FieldTable::new(
        &[
            ("description", r"(descr):[^\S\n]+(?P<val>.+?)\n", FieldKind::Text),
            ("maintainer", r"(mnt-by):[^\S\n]+(?P<val>.+?)\n", FieldKind::Text),
            ("updated", r"(changed):[^\S\n]+(?P<val>.+?)\n", FieldKind::Text),
            ("source", r"(source):[^\S\n]+(?P<val>.+?)\n", FieldKind::Text),
        ],
        None,
        true,
    )
    .expect("RADB WHOIS field patterns are valid")
});

static HTTP_FIELDS: Lazy<FieldTable> = Lazy::new(|| {
    FieldTable::new(
        &[
            ("description", r"(descr):[^\S\n]+(?P<val>.+?)<br>", FieldKind::Text),
            ("maintainer", r"(mnt-by):[^\S\n]+(?P<val>.+?)<br>", FieldKind::Text),
            ("updated", r"(changed):[^\S\n]+(?P<val>.+?)<br>", FieldKind::Text),
            ("source", r"(source):[^\S\n]+(?P<val>.+?)<br>", FieldKind::Text),
        ],
        None,
        true,
    )
    .expect("RADB HTTP field patterns are valid")
});

static WHOIS_ROUTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^route(?:6)?:[^\S\n]+(?P<val>.+)$").expect("route pattern is valid")
});

static HTTP_ROUTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"route(?:6)?:[^\S\n]+(?P<val>.+?)<br>").expect("route pattern is valid")
});

/// Lookup method for [`AsnOrigin::lookup`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OriginMethod {
    Whois,
    Http,
}

/// One route originated by the ASN
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginNet {
    pub cidr: Option<String>,
    pub description: Option<String>,
    pub maintainer: Option<String>,
    pub updated: Option<String>,
    pub source: Option<String>,
}

impl OriginNet {
    fn apply(&mut self, fields: &FieldMap) {
        self.description = fields.string("description");
        self.maintainer = fields.string("maintainer");
        self.updated = fields.string("updated");
        self.source = fields.string("source");
    }
}

/// Result of an ASN origin lookup
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginResult {
    /// The ASN queried, `AS` prefixed
    pub query: String,
    pub nets: Vec<OriginNet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

/// Options for [`AsnOrigin::lookup`]
#[derive(Debug, Clone)]
pub struct OriginOptions {
    pub retry_count: u32,
    /// Parse this text instead of querying
    pub response: Option<String>,
    /// Whether `response` is the HTML of the web form
    pub response_is_http: bool,
    /// Restrict parsed fields
    pub field_list: Option<Vec<&'static str>>,
    pub methods: Vec<OriginMethod>,
    pub inc_raw: bool,
}

impl Default for OriginOptions {
    fn default() -> Self {
        Self {
            retry_count: 3,
            response: None,
            response_is_http: false,
            field_list: None,
            methods: vec![OriginMethod::Whois, OriginMethod::Http],
            inc_raw: false,
        }
    }
}

/// Split a RADB response into route sections
///
/// Routes that are not valid CIDR networks are skipped.
pub fn get_nets_radb(response: &str, is_http: bool) -> Vec<(OriginNet, Section)> {
    let pattern = if is_http { &*HTTP_ROUTE } else { &*WHOIS_ROUTE };

    pattern
        .captures_iter(response)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let value = caps.name("val")?.as_str().trim();
            match Cidr::parse(value) {
                Ok(cidr) => Some((
                    OriginNet {
                        cidr: Some(cidr.to_string()),
                        ..OriginNet::default()
                    },
                    Section::from_match(&whole),
                )),
                Err(e) => {
                    debug!(route = value, error = %e, "Skipping invalid route");
                    None
                }
            }
        })
        .collect()
}

/// Parse route sections and their fields
pub fn parse_routes(response: &str, is_http: bool, field_list: Option<&[&str]>) -> Vec<OriginNet> {
    let table = if is_http { &*HTTP_FIELDS } else { &*WHOIS_FIELDS };
    let found = get_nets_radb(response, is_http);
    let sections: Vec<Section> = found.iter().map(|(_, section)| *section).collect();

    found
        .into_iter()
        .enumerate()
        .map(|(index, (mut net, _))| {
            let fields = parse_fields(response, table, section_bounds(&sections, index), field_list);
            net.apply(&fields);
            net
        })
        .collect()
}

/// ASN origin resolver
#[derive(Clone)]
pub struct AsnOrigin {
    net: Net,
}

impl AsnOrigin {
    pub fn new(net: Net) -> Self {
        Self { net }
    }

    /// Routes originated by `asn` (with or without the `AS` prefix)
    pub async fn lookup(&self, asn: &str, options: &OriginOptions) -> Result<OriginResult> {
        let asn = asn.parse::<Asn>()?.to_string();

        let (response, is_http) = match &options.response {
            Some(response) => (response.clone(), options.response_is_http),
            None => self.fetch(&asn, options).await?,
        };

        let field_list = options.field_list.as_deref();
        Ok(OriginResult {
            nets: parse_routes(&response, is_http, field_list),
            raw: options.inc_raw.then(|| response.clone()),
            query: asn,
        })
    }

    async fn fetch(&self, asn: &str, options: &OriginOptions) -> Result<(String, bool)> {
        for method in &options.methods {
            let attempt = match method {
                OriginMethod::Whois => self
                    .net
                    .get_asn_origin_whois(asn, options.retry_count, None, WHOIS_PORT)
                    .await
                    .map(|text| (text, false)),
                OriginMethod::Http => {
                    let mut form: Vec<(&str, &str)> = RADB_FORM.to_vec();
                    form.push(("keywords", asn));
                    self.net
                        .get_http_raw(
                            RADB_QUERY_URL,
                            options.retry_count,
                            None,
                            HttpMethod::Post,
                            Some(&form),
                        )
                        .await
                        .map(|text| (text, true))
                }
            };

            match attempt {
                Ok((text, is_http)) if !text.trim().is_empty() => return Ok((text, is_http)),
                Ok(_) => debug!(asn, method = ?method, "ASN origin lookup returned nothing"),
                Err(e) => debug!(asn, method = ?method, error = %e, "ASN origin lookup failed"),
            }
        }

        Err(LookupError::AsnOriginLookup(
            "ASN origin lookup failed with no more methods to try.".to_string(),
        ))
    }
}
