//! ASN registry resolution with a method fallback chain

use ipwhois_core::{AsnRecord, AsnSource, LookupError, Result, Rir};
use ipwhois_net::Net;
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

/// Map of ARIN `orgRef` handles to the registry they delegate to
pub const ORG_MAP: &[(&str, Rir)] = &[
    ("ARIN", Rir::Arin),
    ("VR-ARIN", Rir::Arin),
    ("RIPE", Rir::RipeNcc),
    ("APNIC", Rir::Apnic),
    ("LACNIC", Rir::Lacnic),
    ("AFRINIC", Rir::Afrinic),
    ("DNIC", Rir::Arin),
];

/// Options for [`IpAsn::lookup`]
#[derive(Debug, Clone)]
pub struct AsnLookupOptions {
    /// Keep the raw response on the record
    pub inc_raw: bool,
    pub retry_count: u32,
    /// Extra `orgRef` handle mappings for the HTTP method
    pub extra_org_map: HashMap<String, Rir>,
    /// Methods to try, in order
    pub asn_methods: Vec<AsnSource>,
    /// Fetch the AS description with a second DNS query after a DNS success
    pub get_asn_description: bool,
}

impl Default for AsnLookupOptions {
    fn default() -> Self {
        Self {
            inc_raw: false,
            retry_count: 3,
            extra_org_map: HashMap::new(),
            asn_methods: vec![AsnSource::Dns, AsnSource::Whois, AsnSource::Http],
            get_asn_description: true,
        }
    }
}

impl AsnLookupOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_methods(mut self, methods: Vec<AsnSource>) -> Self {
        self.asn_methods = methods;
        self
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    pub fn with_raw(mut self, inc_raw: bool) -> Self {
        self.inc_raw = inc_raw;
        self
    }

    pub fn with_description(mut self, get_asn_description: bool) -> Self {
        self.get_asn_description = get_asn_description;
        self
    }

    pub fn with_org(mut self, handle: impl Into<String>, registry: Rir) -> Self {
        self.extra_org_map.insert(handle.into().to_uppercase(), registry);
        self
    }
}

fn parse_failure(response: &str, reason: &str) -> LookupError {
    LookupError::AsnParse(format!(
        "Parsing failed for \"{}\" with exception: {}.",
        response, reason
    ))
}

fn split_fields<'a>(response: &'a str, expected: usize) -> Result<Vec<&'a str>> {
    let fields: Vec<&str> = response.split('|').collect();
    if fields.len() < expected {
        return Err(parse_failure(
            response,
            &format!("expected {} fields, found {}", expected, fields.len()),
        ));
    }
    Ok(fields)
}

fn clean(field: &str) -> String {
    field.trim_matches(|c: char| c == ' ' || c == '"' || c == '\n' || c == '\r').to_string()
}

fn registry(field: &str) -> Result<Rir> {
    clean(field).parse()
}

fn optional(field: &str) -> Option<String> {
    Some(clean(field)).filter(|s| !s.is_empty())
}

/// Parse one terse Cymru TXT answer
///
/// `ASN | CIDR | CC | REGISTRY | DATE`
pub fn parse_fields_dns(response: &str) -> Result<AsnRecord> {
    let fields = split_fields(response, 5)?;
    let asn_registry = registry(fields[3])?;

    Ok(AsnRecord {
        asn_registry,
        asn: optional(fields[0]),
        asn_cidr: optional(fields[1]),
        asn_country_code: optional(fields[2]).map(|cc| cc.to_uppercase()),
        asn_date: optional(fields[4]),
        asn_description: None,
        raw: None,
        asn_source: AsnSource::Dns,
    })
}

/// Parse a verbose Cymru TXT answer
///
/// `ASN | CC | REGISTRY | DATE | DESCRIPTION`
pub fn parse_fields_verbose_dns(response: &str) -> Result<AsnRecord> {
    let fields = split_fields(response, 5)?;
    let asn_registry = registry(fields[2])?;

    Ok(AsnRecord {
        asn_registry,
        asn: optional(fields[0]),
        asn_cidr: None,
        asn_country_code: optional(fields[1]).map(|cc| cc.to_uppercase()),
        asn_date: optional(fields[3]),
        asn_description: optional(fields[4]),
        raw: None,
        asn_source: AsnSource::Dns,
    })
}

/// Parse a Cymru WHOIS line
///
/// `ASN | IP | CIDR | CC | REGISTRY | DATE | DESCRIPTION`
pub fn parse_fields_whois(response: &str) -> Result<AsnRecord> {
    let line = response
        .lines()
        .find(|line| line.contains('|'))
        .unwrap_or(response);
    let fields = split_fields(line, 7)?;
    let asn_registry = registry(fields[4])?;

    Ok(AsnRecord {
        asn_registry,
        asn: optional(fields[0]),
        asn_cidr: optional(fields[2]),
        asn_country_code: optional(fields[3]).map(|cc| cc.to_uppercase()),
        asn_date: optional(fields[5]),
        asn_description: optional(fields[6]),
        raw: None,
        asn_source: AsnSource::Whois,
    })
}

/// Identify the registry from an ARIN REST nets document
///
/// Only the registry can be recovered; the record is partial.
pub fn parse_fields_http(response: &Value, extra_org_map: &HashMap<String, Rir>) -> Result<AsnRecord> {
    let mut org_map: HashMap<String, Rir> = ORG_MAP
        .iter()
        .map(|&(handle, rir)| (handle.to_string(), rir))
        .collect();
    org_map.extend(
        extra_org_map
            .iter()
            .map(|(handle, rir)| (handle.to_uppercase(), *rir)),
    );

    let nets = match response.pointer("/nets/net") {
        Some(Value::Array(nets)) => nets.iter().collect(),
        Some(net @ Value::Object(_)) => vec![net],
        _ => {
            debug!("No networks found");
            Vec::new()
        }
    };

    let found = nets.into_iter().rev().find_map(|net| {
        let handle = net.pointer("/orgRef/@handle").and_then(Value::as_str)?;
        let rir = org_map.get(&handle.to_uppercase()).copied();
        if rir.is_none() {
            debug!(handle, "Could not parse ASN registry via HTTP");
        }
        rir
    });

    match found {
        Some(rir) => Ok(AsnRecord::registry_only(rir, AsnSource::Http)),
        None => Err(LookupError::AsnRegistry("ASN registry lookup failed.".to_string())),
    }
}

/// Pick the answer with the most specific CIDR; the first wins ties
pub fn most_specific(records: Vec<AsnRecord>) -> Option<AsnRecord> {
    let mut best: Option<AsnRecord> = None;
    for record in records {
        let better = match &best {
            None => true,
            Some(current) => match (record.prefix_len(), current.prefix_len()) {
                (Some(candidate), Some(held)) => candidate > held,
                (Some(_), None) => true,
                _ => false,
            },
        };
        if better {
            best = Some(record);
        }
    }
    best
}

/// ASN resolver for one target
///
/// # Examples
///
/// ```no_run
/// use ipwhois_asn::{AsnLookupOptions, IpAsn};
/// use ipwhois_core::LookupTarget;
/// use ipwhois_core::config::LookupConfig;
/// use ipwhois_net::Net;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let net = Net::new(LookupTarget::parse("74.125.225.229")?, LookupConfig::new())?;
/// let record = IpAsn::new(net).lookup(&AsnLookupOptions::default()).await?;
/// println!("{} {:?}", record.asn_registry, record.asn);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct IpAsn {
    net: Net,
}

impl IpAsn {
    pub fn new(net: Net) -> Self {
        Self { net }
    }

    pub fn net(&self) -> &Net {
        &self.net
    }

    /// Resolve the registry and AS of the target
    ///
    /// Methods run in the given order. Lookup and registry failures move on
    /// to the next method; parse failures are returned as-is.
    pub async fn lookup(&self, options: &AsnLookupOptions) -> Result<AsnRecord> {
        if options.asn_methods.is_empty() {
            return Err(LookupError::Net(
                "methods argument requires at least one of dns, whois, http.".to_string(),
            ));
        }

        let address = self.net.target().to_string();
        let mut found: Option<(AsnRecord, String)> = None;

        for method in &options.asn_methods {
            let attempt = match method {
                AsnSource::Dns => self.lookup_dns().await,
                AsnSource::Whois => self.lookup_whois(options.retry_count).await,
                AsnSource::Http => self.lookup_http(options).await,
            };

            match attempt {
                Ok(result) => {
                    found = Some(result);
                    break;
                }
                Err(e @ (LookupError::AsnLookup(_) | LookupError::AsnRegistry(_))) => {
                    debug!(address = %address, method = ?method, error = %e, "ASN lookup method failed");
                }
                Err(e) => return Err(e),
            }
        }

        let (mut record, raw) = found.ok_or_else(|| {
            LookupError::AsnRegistry("ASN lookup failed with no more methods to try.".to_string())
        })?;

        if options.get_asn_description && record.asn_source == AsnSource::Dns {
            record.asn_description = self.description(&record).await;
        }

        if options.inc_raw {
            record.raw = Some(raw);
        }

        Ok(record)
    }

    async fn lookup_dns(&self) -> Result<(AsnRecord, String)> {
        let answers = self.net.get_asn_dns().await?;
        let records = answers
            .iter()
            .map(|answer| parse_fields_dns(answer))
            .collect::<Result<Vec<_>>>()?;

        let record = most_specific(records).ok_or_else(|| {
            LookupError::AsnLookup(format!("ASN lookup failed for {}.", self.net.target()))
        })?;
        Ok((record, answers.join("\n")))
    }

    async fn lookup_whois(&self, retry_count: u32) -> Result<(AsnRecord, String)> {
        let response = self.net.get_asn_whois(retry_count).await?;
        let record = parse_fields_whois(&response)?;
        Ok((record, response))
    }

    async fn lookup_http(&self, options: &AsnLookupOptions) -> Result<(AsnRecord, String)> {
        let response = self.net.get_asn_http(options.retry_count).await?;
        let record = parse_fields_http(&response, &options.extra_org_map)?;
        Ok((record, response.to_string()))
    }

    async fn description(&self, record: &AsnRecord) -> Option<String> {
        let asn = record.asn.as_deref()?;
        // Multi-origin answers list several ASNs; describe the first.
        let asn = asn.split_whitespace().next()?;

        match self.net.get_asn_verbose_dns(asn).await {
            Ok(response) => match parse_fields_verbose_dns(&response) {
                Ok(verbose) => verbose.asn_description,
                Err(e) => {
                    debug!(asn, error = %e, "ASN description parse failed");
                    None
                }
            },
            Err(e) => {
                debug!(asn, error = %e, "ASN description lookup failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ipwhois_core::LookupTarget;
    use ipwhois_net::testing::StubNetwork;
    use ipwhois_net::DnsFailure;
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    const ZONE: &str = "229.225.125.74.origin.asn.cymru.com";
    const ARIN_URL: &str = "http://whois.arin.net/rest/nets;q=74.125.225.229?showDetails=true&showARIN=true&showNonArinTopLevelNet=true&ext=netref2";

    fn resolver(stub: &StubNetwork) -> IpAsn {
        let target = LookupTarget::parse("74.125.225.229").unwrap();
        IpAsn::new(Net::with_transport(target, stub.transport.clone()))
    }

    #[test]
    fn test_parse_fields_dns() {
        let record = assert_ok!(parse_fields_dns("\"15169 | 74.125.225.0/24 | us | arin | 2007-03-13\""));
        assert_eq!(record.asn.as_deref(), Some("15169"));
        assert_eq!(record.asn_cidr.as_deref(), Some("74.125.225.0/24"));
        assert_eq!(record.asn_country_code.as_deref(), Some("US"));
        assert_eq!(record.asn_registry, Rir::Arin);
        assert_eq!(record.asn_date.as_deref(), Some("2007-03-13"));
        assert!(record.asn_description.is_none());
    }

    #[test]
    fn test_parse_fields_dns_errors() {
        assert!(matches!(
            parse_fields_dns("15169 | 74.125.225.0/24 | US | nic | 2007-03-13"),
            Err(LookupError::AsnRegistry(_))
        ));
        assert!(matches!(
            parse_fields_dns("15169 | 74.125.225.0/24"),
            Err(LookupError::AsnParse(_))
        ));
    }

    #[test]
    fn test_parse_fields_verbose_dns() {
        let record = assert_ok!(parse_fields_verbose_dns(
            "15169 | US | arin | 2000-03-30 | GOOGLE - Google LLC, US"
        ));
        assert_eq!(record.asn_description.as_deref(), Some("GOOGLE - Google LLC, US"));
        assert_eq!(record.asn_date.as_deref(), Some("2000-03-30"));
    }

    #[test]
    fn test_parse_fields_whois() {
        let record = assert_ok!(parse_fields_whois(
            "15169   | 74.125.225.229   | 74.125.225.0/24     | US | arin     | 2007-03-13 | GOOGLE - Google LLC, US\n"
        ));
        assert_eq!(record.asn.as_deref(), Some("15169"));
        assert_eq!(record.asn_cidr.as_deref(), Some("74.125.225.0/24"));
        assert_eq!(record.asn_description.as_deref(), Some("GOOGLE - Google LLC, US"));
        assert_eq!(record.asn_source, AsnSource::Whois);

        assert!(matches!(
            parse_fields_whois("15169 | 74.125.225.229 | 74.125.225.0/24 | US | xxx | 2007-03-13 | G"),
            Err(LookupError::AsnRegistry(_))
        ));
    }

    #[test]
    fn test_parse_fields_http() {
        let single = json!({"nets": {"net": {"orgRef": {"@handle": "RIPE"}}}});
        let record = assert_ok!(parse_fields_http(&single, &HashMap::new()));
        assert_eq!(record.asn_registry, Rir::RipeNcc);
        assert!(record.is_partial());
        assert!(record.asn.is_none());

        // Last known handle wins.
        let many = json!({"nets": {"net": [
            {"orgRef": {"@handle": "APNIC"}},
            {"orgRef": {"@handle": "UNKNOWN"}}
        ]}});
        assert_eq!(assert_ok!(parse_fields_http(&many, &HashMap::new())).asn_registry, Rir::Apnic);

        let extra = HashMap::from([("UNKNOWN".to_string(), Rir::Afrinic)]);
        assert_eq!(assert_ok!(parse_fields_http(&many, &extra)).asn_registry, Rir::Afrinic);

        assert!(matches!(
            parse_fields_http(&json!({"nets": null}), &HashMap::new()),
            Err(LookupError::AsnRegistry(_))
        ));
    }

    #[tokio::test]
    async fn test_dns_picks_most_specific_answer() {
        let stub = StubNetwork::new();
        stub.dns.answer_txt(
            ZONE,
            &[
                "15169 | 74.125.0.0/16 | US | arin | 2007-03-13",
                "15169 | 74.125.225.0/24 | US | arin | 2007-03-13",
                "36040 | 74.125.224.0/19 | US | arin | 2007-03-13",
            ],
        );
        stub.dns.answer_txt(
            "AS15169.asn.cymru.com",
            &["15169 | US | arin | 2000-03-30 | GOOGLE - Google LLC, US"],
        );

        let record = assert_ok!(resolver(&stub).lookup(&AsnLookupOptions::default()).await);
        assert_eq!(record.asn_cidr.as_deref(), Some("74.125.225.0/24"));
        assert_eq!(record.asn_description.as_deref(), Some("GOOGLE - Google LLC, US"));
        assert_eq!(record.asn_source, AsnSource::Dns);
        assert!(record.raw.is_none());
    }

    #[tokio::test]
    async fn test_description_failure_is_not_fatal() {
        let stub = StubNetwork::new();
        stub.dns.answer_txt(ZONE, &["15169 | 74.125.225.0/24 | US | arin | 2007-03-13"]);
        stub.dns.fail_txt("AS15169.asn.cymru.com", DnsFailure::Timeout);

        let record = assert_ok!(resolver(&stub).lookup(&AsnLookupOptions::default()).await);
        assert_eq!(record.asn.as_deref(), Some("15169"));
        assert!(record.asn_description.is_none());
    }

    #[tokio::test]
    async fn test_falls_back_to_whois() {
        let stub = StubNetwork::new();
        stub.dns.fail_txt(ZONE, DnsFailure::NxDomain);
        stub.whois.respond(
            "whois.cymru.com",
            "15169 | 74.125.225.229 | 74.125.225.0/24 | US | arin | 2007-03-13 | GOOGLE - Google LLC, US\n",
        );

        let options = AsnLookupOptions::default().with_raw(true);
        let record = assert_ok!(resolver(&stub).lookup(&options).await);
        assert_eq!(record.asn_source, AsnSource::Whois);
        assert_eq!(record.asn_description.as_deref(), Some("GOOGLE - Google LLC, US"));
        assert!(record.raw.as_deref().unwrap_or_default().contains("GOOGLE"));
        // No verbose DNS query after a non-DNS success.
        assert_eq!(stub.dns.calls(), vec![ZONE.to_string()]);
        assert_eq!(stub.whois.calls()[0].2, " -r -a -c -p -f 74.125.225.229\r\n");
    }

    #[tokio::test]
    async fn test_unknown_registry_tries_next_method() {
        let stub = StubNetwork::new();
        stub.dns.answer_txt(ZONE, &["15169 | 74.125.225.0/24 | US | bogus | 2007-03-13"]);
        stub.whois.respond("whois.cymru.com", "15169 | a | 74.125.225.0/24 | US | bogus | d | x\n");
        stub.http.respond_json(ARIN_URL, &json!({"nets": {"net": {"orgRef": {"@handle": "ARIN"}}}}));

        let record = assert_ok!(resolver(&stub).lookup(&AsnLookupOptions::default()).await);
        assert_eq!(record.asn_registry, Rir::Arin);
        assert!(record.is_partial());
        let accept = ("Accept".to_string(), "application/json".to_string());
        assert!(stub.http.calls()[0].headers.contains(&accept));
    }

    #[tokio::test]
    async fn test_all_methods_failing() {
        let stub = StubNetwork::new();
        let options = AsnLookupOptions::default().with_retry_count(1);

        let err = assert_err!(resolver(&stub).lookup(&options).await);
        assert_eq!(
            err,
            LookupError::AsnRegistry("ASN lookup failed with no more methods to try.".to_string())
        );
    }

    #[tokio::test]
    async fn test_method_order_is_respected() {
        let stub = StubNetwork::new();
        stub.dns.answer_txt(ZONE, &["15169 | 74.125.225.0/24 | US | arin | 2007-03-13"]);
        stub.whois.respond(
            "whois.cymru.com",
            "15169 | 74.125.225.229 | 74.125.0.0/16 | US | arin | 2007-03-13 | GOOGLE\n",
        );

        let options = AsnLookupOptions::default().with_methods(vec![AsnSource::Whois, AsnSource::Dns]);
        let record = assert_ok!(resolver(&stub).lookup(&options).await);
        assert_eq!(record.asn_cidr.as_deref(), Some("74.125.0.0/16"));
        assert!(stub.dns.calls().is_empty());
    }

    #[tokio::test]
    async fn test_empty_method_list_is_rejected() {
        let stub = StubNetwork::new();
        let options = AsnLookupOptions::default().with_methods(Vec::new());
        assert!(matches!(
            resolver(&stub).lookup(&options).await,
            Err(LookupError::Net(_))
        ));
    }

    #[tokio::test]
    async fn test_parse_error_is_fatal() {
        let stub = StubNetwork::new();
        stub.dns.answer_txt(ZONE, &["garbage"]);

        assert!(matches!(
            resolver(&stub).lookup(&AsnLookupOptions::default()).await,
            Err(LookupError::AsnParse(_))
        ));
        assert_eq!(stub.whois.call_count(), 0);
    }
}
