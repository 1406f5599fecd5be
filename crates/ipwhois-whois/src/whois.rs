//! Registry WHOIS lookup

use crate::nets::{get_nets_arin, get_nets_lacnic, get_nets_other, NetSection};
use crate::tables::{rir_fields, RWHOIS};
use ipwhois_core::{LookupError, Result, Rir};
use ipwhois_net::{Net, WhoisRequest};
use ipwhois_parse::{parse_fields, section_bounds, Bounds, FieldMap, Section};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

static REFERRAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^ReferralServer:[^\S\n]+(.+:[0-9]+)$").expect("referral pattern is valid")
});

/// One network block from a WHOIS response
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhoisNet {
    pub cidr: Option<String>,
    pub name: Option<String>,
    pub handle: Option<String>,
    pub range: Option<String>,
    pub description: Option<String>,
    pub country: Option<String>,
    pub state: Option<String>,
    pub city: Option<String>,
    pub address: Option<String>,
    pub postal_code: Option<String>,
    pub emails: Option<Vec<String>>,
    pub created: Option<String>,
    pub updated: Option<String>,
}

impl WhoisNet {
    fn from_section(net: NetSection) -> Self {
        Self {
            cidr: Some(net.cidr),
            range: net.range,
            ..Self::default()
        }
    }

    /// Overlay parsed fields; keys absent from `fields` are left alone
    pub fn apply(&mut self, fields: &FieldMap) {
        let slots: [(&str, &mut Option<String>); 11] = [
            ("cidr", &mut self.cidr),
            ("name", &mut self.name),
            ("handle", &mut self.handle),
            ("description", &mut self.description),
            ("country", &mut self.country),
            ("state", &mut self.state),
            ("city", &mut self.city),
            ("address", &mut self.address),
            ("postal_code", &mut self.postal_code),
            ("created", &mut self.created),
            ("updated", &mut self.updated),
        ];
        for (name, slot) in slots {
            if let Some(value) = fields.string(name) {
                *slot = Some(value);
            }
        }
        if let Some(emails) = fields.list("emails") {
            self.emails = Some(emails);
        }
    }
}

/// Result of a WHOIS lookup
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhoisResult {
    pub query: String,
    pub nets: Vec<WhoisNet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
    pub referral: Option<WhoisNet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_referral: Option<String>,
}

/// Options for [`Whois::lookup`]
#[derive(Debug, Clone)]
pub struct WhoisOptions {
    pub inc_raw: bool,
    pub retry_count: u32,
    /// Parse this text instead of querying
    pub response: Option<String>,
    /// Follow a `ReferralServer: rwhois://` line
    pub get_referral: bool,
    pub extra_blacklist: Vec<String>,
    /// Swallow blacklist and lookup failures on the referral server
    pub ignore_referral_errors: bool,
    pub field_list: Option<Vec<&'static str>>,
    /// Never touch the network; `response` is required
    pub is_offline: bool,
}

impl Default for WhoisOptions {
    fn default() -> Self {
        Self {
            inc_raw: false,
            retry_count: 3,
            response: None,
            get_referral: false,
            extra_blacklist: Vec::new(),
            ignore_referral_errors: false,
            field_list: None,
            is_offline: false,
        }
    }
}

impl WhoisOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Options that parse `response` without any network access
    pub fn offline(response: impl Into<String>) -> Self {
        Self {
            response: Some(response.into()),
            is_offline: true,
            ..Self::default()
        }
    }
}

/// First usable `rwhois://host:port` referral in a response
pub fn find_referral(response: &str) -> Option<(String, u16)> {
    REFERRAL.captures_iter(response).find_map(|caps| {
        let target = caps.get(1)?.as_str().trim();
        let Some(rest) = target.strip_prefix("rwhois://") else {
            debug!(referral = target, "Ignoring non-RWHOIS referral");
            return None;
        };
        let (host, port) = rest.split_once(':')?;
        let port: u16 = port.trim().parse().ok()?;
        Some((host.to_string(), port))
    })
}

/// Split a registry response into networks and parse each section's fields
pub fn parse_nets(response: &str, asn_registry: Rir, field_list: Option<&[&str]>) -> Vec<WhoisNet> {
    let found = match asn_registry {
        Rir::Arin => get_nets_arin(response),
        Rir::Lacnic => get_nets_lacnic(response),
        _ => get_nets_other(response),
    };
    let sections: Vec<Section> = found.iter().map(|net| net.section).collect();
    let table = rir_fields(asn_registry);

    found
        .into_iter()
        .enumerate()
        .map(|(index, net)| {
            let fields = parse_fields(response, table, section_bounds(&sections, index), field_list);
            let mut whois_net = WhoisNet::from_section(net);
            whois_net.apply(&fields);
            whois_net
        })
        .collect()
}

/// Parse an RWHOIS referral response
pub fn parse_referral(response: &str, field_list: Option<&[&str]>) -> WhoisNet {
    let mut net = WhoisNet::default();
    net.apply(&parse_fields(response, &RWHOIS, Bounds::all(), field_list));
    net
}

/// WHOIS resolver for one target
#[derive(Clone)]
pub struct Whois {
    net: Net,
}

impl Whois {
    pub fn new(net: Net) -> Self {
        Self { net }
    }

    /// Fetch (or take) the registry WHOIS text and parse its networks
    pub async fn lookup(&self, asn_registry: Rir, options: &WhoisOptions) -> Result<WhoisResult> {
        if options.is_offline && options.response.is_none() {
            return Err(LookupError::Net(
                "response argument required when is_offline is set".to_string(),
            ));
        }

        let query = self.net.target().to_string();
        let response = match &options.response {
            Some(response) => response.clone(),
            None => {
                let request = WhoisRequest::new(asn_registry)
                    .with_retry_count(options.retry_count)
                    .with_extra_blacklist(options.extra_blacklist.clone());
                self.net.get_whois(&request).await?
            }
        };

        let field_list = options.field_list.as_deref();
        let mut result = WhoisResult {
            nets: parse_nets(&response, asn_registry, field_list),
            raw: options.inc_raw.then(|| response.clone()),
            query,
            ..WhoisResult::default()
        };

        if options.get_referral && !options.is_offline {
            if let Some((server, port)) = find_referral(&response) {
                if let Some(raw_referral) = self.referral(asn_registry, &server, port, options).await? {
                    result.referral = Some(parse_referral(&raw_referral, field_list));
                    if options.inc_raw {
                        result.raw_referral = Some(raw_referral);
                    }
                }
            }
        }

        Ok(result)
    }

    async fn referral(
        &self,
        asn_registry: Rir,
        server: &str,
        port: u16,
        options: &WhoisOptions,
    ) -> Result<Option<String>> {
        let request = WhoisRequest::new(asn_registry)
            .with_retry_count(options.retry_count)
            .with_server(server, port)
            .with_extra_blacklist(options.extra_blacklist.clone());

        match self.net.get_whois(&request).await {
            Ok(text) => Ok(Some(text)),
            Err(e @ (LookupError::Blacklist(_) | LookupError::WhoisLookup(_)))
                if options.ignore_referral_errors =>
            {
                debug!(server, port, error = %e, "Referral lookup failed, ignoring");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ipwhois_core::LookupTarget;
    use ipwhois_net::testing::StubNetwork;
    use tokio_test::{assert_err, assert_ok};

    const RIPE: &str = "inetnum:        193.0.0.0 - 193.0.7.255\n\
netname:        RIPE-NCC\n\
descr:          RIPE Network Coordination Centre\n\
country:        NL\n\
created:        2003-03-17T12:15:57Z\n\
\n\
route:          193.0.0.0/21\n\
descr:          RIPE-NCC\n\
origin:         AS3333\n";

    const ARIN_REFERRAL: &str = "NetRange:       192.0.2.0 - 192.0.2.255\n\
CIDR:           192.0.2.0/24\n\
NetName:        EXAMPLE\n\
ReferralServer: rwhois://rwhois.example.net:4321\n\
\n";

    const RWHOIS_TEXT: &str = "network:ID:NET-EXAMPLE-1\nnetwork:Org-Name:Example Hosting\n";

    fn whois(stub: &StubNetwork) -> Whois {
        let target = LookupTarget::parse("74.125.225.229").unwrap();
        Whois::new(Net::with_transport(target, stub.transport.clone()))
    }

    #[test]
    fn test_find_referral() {
        assert_eq!(
            find_referral(ARIN_REFERRAL),
            Some(("rwhois.example.net".to_string(), 4321))
        );
        assert_eq!(find_referral("ReferralServer: whois://whois.example.net:43\n"), None);
        assert_eq!(find_referral("ReferralServer: rwhois://bad.example.net:99999\n"), None);
        assert_eq!(find_referral("NetName: X\n"), None);
    }

    #[test]
    fn test_parse_nets_other_sections() {
        let nets = parse_nets(RIPE, Rir::RipeNcc, None);
        assert_eq!(nets.len(), 2);
        assert_eq!(nets[0].name.as_deref(), Some("RIPE-NCC"));
        assert_eq!(nets[0].description.as_deref(), Some("RIPE Network Coordination Centre"));
        assert_eq!(nets[0].created.as_deref(), Some("2003-03-17T12:15:57"));
        assert_eq!(nets[1].cidr.as_deref(), Some("193.0.0.0/21"));
        assert_eq!(nets[1].description.as_deref(), Some("RIPE-NCC"));
        assert!(nets[1].country.is_none());
    }

    #[tokio::test]
    async fn test_lookup_queries_registry_server() {
        let stub = StubNetwork::new();
        stub.whois.respond("whois.ripe.net", RIPE);

        let options = WhoisOptions {
            inc_raw: true,
            ..WhoisOptions::default()
        };
        let result = assert_ok!(whois(&stub).lookup(Rir::RipeNcc, &options).await);
        assert_eq!(result.query, "74.125.225.229");
        assert_eq!(result.nets.len(), 2);
        assert_eq!(result.raw.as_deref(), Some(RIPE));
        assert!(result.referral.is_none());
        assert_eq!(stub.whois.calls()[0].2, "74.125.225.229\r\n");
    }

    #[tokio::test]
    async fn test_lookup_follows_referral() {
        let stub = StubNetwork::new();
        stub.whois.respond("whois.arin.net", ARIN_REFERRAL);
        stub.whois.respond("rwhois.example.net", RWHOIS_TEXT);

        let options = WhoisOptions {
            get_referral: true,
            inc_raw: true,
            ..WhoisOptions::default()
        };
        let result = assert_ok!(whois(&stub).lookup(Rir::Arin, &options).await);
        let referral = result.referral.unwrap_or_default();
        assert_eq!(referral.name.as_deref(), Some("NET-EXAMPLE-1"));
        assert_eq!(referral.description.as_deref(), Some("Example Hosting"));
        assert_eq!(result.raw_referral.as_deref(), Some(RWHOIS_TEXT));

        let calls = stub.whois.calls();
        assert_eq!(calls[0].2, "n + 74.125.225.229\r\n");
        assert_eq!(calls[1], ("rwhois.example.net".to_string(), 4321, "74.125.225.229\r\n".to_string()));
    }

    #[tokio::test]
    async fn test_referral_errors() {
        let stub = StubNetwork::new();
        stub.whois.respond("whois.arin.net", ARIN_REFERRAL);

        let strict = WhoisOptions {
            get_referral: true,
            retry_count: 1,
            extra_blacklist: vec!["rwhois.example.net".to_string()],
            ..WhoisOptions::default()
        };
        let err = assert_err!(whois(&stub).lookup(Rir::Arin, &strict).await);
        assert!(matches!(err, LookupError::Blacklist(_)));

        let lenient = WhoisOptions {
            ignore_referral_errors: true,
            ..strict
        };
        let result = assert_ok!(whois(&stub).lookup(Rir::Arin, &lenient).await);
        assert!(result.referral.is_none());
        assert_eq!(result.nets.len(), 1);
        // The blacklisted server is never contacted.
        assert!(stub.whois.calls().iter().all(|(server, _, _)| server == "whois.arin.net"));
    }

    #[tokio::test]
    async fn test_offline_requires_response() {
        let stub = StubNetwork::new();
        let options = WhoisOptions {
            is_offline: true,
            ..WhoisOptions::default()
        };
        assert!(matches!(
            whois(&stub).lookup(Rir::Arin, &options).await,
            Err(LookupError::Net(_))
        ));

        let result = assert_ok!(whois(&stub).lookup(Rir::RipeNcc, &WhoisOptions::offline(RIPE)).await);
        assert_eq!(result.nets.len(), 2);
        assert_eq!(stub.whois.call_count(), 0);
    }
}
