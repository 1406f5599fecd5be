//! RDAP lookup with bounded entity traversal

use crate::objects::{child_roles, RdapEntity, RdapNetwork};
use ipwhois_core::{LookupError, Result, Rir};
use ipwhois_net::Net;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::debug;

/// ARIN's RDAP bootstrap service; redirects to the authoritative registry
pub const BOOTSTRAP_URL: &str = "http://rdap.arin.net/bootstrap";

/// IP and entity query URLs of one RDAP service; `{0}` is the key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RdapEndpoints {
    pub ip_url: &'static str,
    pub entity_url: &'static str,
}

impl RdapEndpoints {
    pub const BOOTSTRAP: RdapEndpoints = RdapEndpoints {
        ip_url: "http://rdap.arin.net/bootstrap/ip/{0}",
        entity_url: "http://rdap.arin.net/bootstrap/entity/{0}",
    };

    /// Endpoints of a registry's own RDAP service
    pub fn for_registry(rir: Rir) -> Self {
        match rir {
            Rir::Arin => Self {
                ip_url: "http://rdap.arin.net/registry/ip/{0}",
                entity_url: "http://rdap.arin.net/registry/entity/{0}",
            },
            Rir::RipeNcc => Self {
                ip_url: "http://rdap.db.ripe.net/ip/{0}",
                entity_url: "http://rdap.db.ripe.net/entity/{0}",
            },
            Rir::Apnic => Self {
                ip_url: "http://rdap.apnic.net/ip/{0}",
                entity_url: "http://rdap.apnic.net/entity/{0}",
            },
            Rir::Lacnic => Self {
                ip_url: "http://rdap.lacnic.net/rdap/ip/{0}",
                entity_url: "http://rdap.lacnic.net/rdap/entity/{0}",
            },
            Rir::Afrinic => Self {
                ip_url: "http://rdap.afrinic.net/rdap/ip/{0}",
                entity_url: "http://rdap.afrinic.net/rdap/entity/{0}",
            },
        }
    }

    pub fn ip(&self, address: &str) -> String {
        self.ip_url.replace("{0}", address)
    }

    pub fn entity(&self, handle: &str) -> String {
        self.entity_url.replace("{0}", handle)
    }
}

/// Options for [`Rdap::lookup`]
#[derive(Debug, Clone)]
pub struct RdapOptions {
    /// Keep the network JSON on the result
    pub inc_raw: bool,
    pub retry_count: u32,
    /// Levels of referenced entities to fetch beyond the root entities
    pub depth: u32,
    /// Handles never fetched or stored
    pub excluded_entities: Vec<String>,
    /// Network object to parse instead of querying
    pub response: Option<Value>,
    /// Query the ARIN bootstrap service instead of the registry
    pub bootstrap: bool,
    pub rate_limit_timeout: Duration,
    /// Fetch root entities that were returned without a vCard
    pub root_ent_check: bool,
}

impl Default for RdapOptions {
    fn default() -> Self {
        Self {
            inc_raw: false,
            retry_count: 3,
            depth: 0,
            excluded_entities: Vec::new(),
            response: None,
            bootstrap: false,
            rate_limit_timeout: Duration::from_secs(120),
            root_ent_check: true,
        }
    }
}

impl RdapOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    pub fn with_bootstrap(mut self, bootstrap: bool) -> Self {
        self.bootstrap = bootstrap;
        self
    }

    pub fn with_excluded_entities(mut self, handles: Vec<String>) -> Self {
        self.excluded_entities = handles;
        self
    }

    pub fn with_response(mut self, response: Value) -> Self {
        self.response = Some(response);
        self
    }

    pub fn with_raw(mut self, inc_raw: bool) -> Self {
        self.inc_raw = inc_raw;
        self
    }

    fn is_excluded(&self, handle: &str) -> bool {
        self.excluded_entities.iter().any(|h| h == handle)
    }
}

/// Result of an RDAP lookup
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RdapResult {
    pub query: String,
    pub network: RdapNetwork,
    /// Root entity handles, in response order
    pub entities: Vec<String>,
    /// Every resolved entity, keyed by handle
    pub objects: BTreeMap<String, RdapEntity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<Value>,
}

/// State for one traversal: fetched entities plus the roles parents assign
struct EntityWalk<'a> {
    net: &'a Net,
    endpoints: RdapEndpoints,
    options: &'a RdapOptions,
    objects: BTreeMap<String, RdapEntity>,
    roles: HashMap<String, Vec<String>>,
}

impl EntityWalk<'_> {
    fn visited(&self, handle: &str) -> bool {
        self.objects.contains_key(handle) || self.options.is_excluded(handle)
    }

    fn learn_roles(&mut self, json: &Value) {
        for (handle, roles) in child_roles(json) {
            self.roles.entry(handle).or_insert(roles);
        }
    }

    async fn fetch(&mut self, handle: &str) -> Result<RdapEntity> {
        let url = self.endpoints.entity(handle);
        debug!(handle, url = %url, "Fetching RDAP entity");

        let json = self
            .net
            .get_http_json(&url, self.options.retry_count, self.options.rate_limit_timeout, None)
            .await?;

        let mut entity = RdapEntity::parse(&json)?;
        if let Some(roles) = self.roles.get(handle) {
            entity.roles = Some(roles.clone());
        }
        self.learn_roles(&json);
        Ok(entity)
    }

    /// Resolve `depth` levels below `frontier`, fetching each handle once
    async fn descend(&mut self, mut frontier: Vec<String>, depth: u32) -> Result<()> {
        for level in 0..depth {
            let mut next = Vec::new();

            for parent in &frontier {
                let children = self
                    .objects
                    .get(parent)
                    .and_then(|entity| entity.entities.clone())
                    .unwrap_or_default();

                for child in children {
                    if self.visited(&child) {
                        continue;
                    }
                    let entity = self.fetch(&child).await?;
                    self.objects.insert(child.clone(), entity);
                    next.push(child);
                }
            }

            debug!(level, fetched = next.len(), "RDAP entity level resolved");
            if next.is_empty() {
                break;
            }
            frontier = next;
        }
        Ok(())
    }
}

/// RDAP resolver for one target
#[derive(Clone)]
pub struct Rdap {
    net: Net,
}

impl Rdap {
    pub fn new(net: Net) -> Self {
        Self { net }
    }

    /// Fetch and parse the network object and its entities
    ///
    /// `registry` selects the RDAP service; it may be `None` only in
    /// bootstrap mode. Each entity handle is fetched at most once.
    pub async fn lookup(&self, registry: Option<Rir>, options: &RdapOptions) -> Result<RdapResult> {
        let query = self.net.target().to_string();

        let endpoints = match (options.bootstrap, registry) {
            (true, _) => RdapEndpoints::BOOTSTRAP,
            (false, Some(rir)) => RdapEndpoints::for_registry(rir),
            (false, None) => {
                return Err(LookupError::Net(
                    "asn_registry is required unless bootstrap is set".to_string(),
                ))
            }
        };

        let response = match &options.response {
            Some(response) => response.clone(),
            None => {
                let url = endpoints.ip(&query);
                debug!(address = %query, url = %url, "RDAP network query");
                self.net
                    .get_http_json(&url, options.retry_count, options.rate_limit_timeout, None)
                    .await?
            }
        };

        let network = RdapNetwork::parse(&response)?;

        let mut walk = EntityWalk {
            net: &self.net,
            endpoints,
            options,
            objects: BTreeMap::new(),
            roles: HashMap::new(),
        };
        walk.learn_roles(&response);

        let mut entities: Vec<String> = Vec::new();
        let roots = response
            .get("entities")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        for root in roots {
            let handle = root.get("handle").and_then(Value::as_str).ok_or_else(|| {
                LookupError::InvalidEntityObject("Handle missing, json output not parsed.".to_string())
            })?;
            if entities.iter().any(|h| h == handle) || options.is_excluded(handle) {
                continue;
            }

            let entity = if options.root_ent_check && !RdapEntity::has_contact(root) {
                walk.fetch(handle).await?
            } else {
                walk.learn_roles(root);
                RdapEntity::parse(root)?
            };

            walk.objects.insert(handle.to_string(), entity);
            entities.push(handle.to_string());
        }

        walk.descend(entities.clone(), options.depth).await?;

        Ok(RdapResult {
            query,
            network,
            entities,
            objects: walk.objects,
            raw: options.inc_raw.then_some(response),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ipwhois_core::LookupTarget;
    use ipwhois_net::testing::StubNetwork;
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    const IP_URL: &str = "http://rdap.arin.net/registry/ip/74.125.225.229";
    const ENTITY_URL: &str = "http://rdap.arin.net/registry/entity/";

    fn resolver(stub: &StubNetwork) -> Rdap {
        let target = LookupTarget::parse("74.125.225.229").unwrap();
        Rdap::new(Net::with_transport(target, stub.transport.clone()))
    }

    fn vcard(name: &str) -> Value {
        json!(["vcard", [["version", {}, "text", "4.0"], ["fn", {}, "text", name]]])
    }

    fn network(entities: Value) -> Value {
        json!({
            "handle": "NET-74-125-0-0-1",
            "startAddress": "74.125.0.0",
            "endAddress": "74.125.255.255",
            "ipVersion": "v4",
            "name": "GOOGLE",
            "entities": entities
        })
    }

    fn entity_url(handle: &str) -> String {
        format!("{}{}", ENTITY_URL, handle)
    }

    #[test]
    fn test_endpoints() {
        assert_eq!(
            RdapEndpoints::for_registry(Rir::Lacnic).ip("200.57.141.161"),
            "http://rdap.lacnic.net/rdap/ip/200.57.141.161"
        );
        assert_eq!(
            RdapEndpoints::for_registry(Rir::RipeNcc).entity("RIPE-NCC-HM-MNT"),
            "http://rdap.db.ripe.net/entity/RIPE-NCC-HM-MNT"
        );
        assert_eq!(RdapEndpoints::BOOTSTRAP.ip("1.2.3.4"), format!("{}/ip/1.2.3.4", BOOTSTRAP_URL));
    }

    #[tokio::test]
    async fn test_lookup_network_and_root_entities() {
        let stub = StubNetwork::new();
        stub.http.respond_json(
            IP_URL,
            &network(json!([
                {"handle": "GOGL", "roles": ["registrant"], "vcardArray": vcard("Google LLC")}
            ])),
        );

        let result = assert_ok!(resolver(&stub).lookup(Some(Rir::Arin), &RdapOptions::default()).await);
        assert_eq!(result.query, "74.125.225.229");
        assert_eq!(result.network.cidr.as_deref(), Some("74.125.0.0/16"));
        assert_eq!(result.entities, vec!["GOGL".to_string()]);

        let gogl = &result.objects["GOGL"];
        assert_eq!(gogl.roles, Some(vec!["registrant".to_string()]));
        assert_eq!(gogl.contact.as_ref().and_then(|c| c.name.as_deref()), Some("Google LLC"));
        assert!(result.raw.is_none());
        assert_eq!(stub.http.call_count(), 1);

        let request = &stub.http.calls()[0];
        assert!(request
            .headers
            .contains(&("Accept".to_string(), "application/rdap+json".to_string())));
    }

    #[tokio::test]
    async fn test_entity_cycle_is_fetched_once() {
        let stub = StubNetwork::new();
        stub.http.respond_json(
            IP_URL,
            &network(json!([{
                "handle": "A",
                "roles": ["registrant"],
                "vcardArray": vcard("Entity A"),
                "entities": [{"handle": "B", "roles": ["technical"]}]
            }])),
        );
        stub.http.respond_json(
            &entity_url("B"),
            &json!({"handle": "B", "vcardArray": vcard("Entity B"), "entities": [{"handle": "A"}]}),
        );
        stub.http.respond_json(
            &entity_url("A"),
            &json!({"handle": "A", "vcardArray": vcard("Entity A"), "entities": [{"handle": "B"}]}),
        );

        let options = RdapOptions::new().with_depth(2);
        let result = assert_ok!(resolver(&stub).lookup(Some(Rir::Arin), &options).await);

        assert_eq!(result.objects.len(), 2);
        assert_eq!(result.objects["B"].roles, Some(vec!["technical".to_string()]));
        assert_eq!(result.objects["B"].entities, Some(vec!["A".to_string()]));
        assert_eq!(stub.http.calls_to(&entity_url("B")), 1);
        assert_eq!(stub.http.calls_to(&entity_url("A")), 0);
    }

    #[tokio::test]
    async fn test_depth_zero_skips_referenced_entities() {
        let stub = StubNetwork::new();
        stub.http.respond_json(
            IP_URL,
            &network(json!([{
                "handle": "A",
                "vcardArray": vcard("Entity A"),
                "entities": [{"handle": "B"}]
            }])),
        );

        let result = assert_ok!(resolver(&stub).lookup(Some(Rir::Arin), &RdapOptions::default()).await);
        assert_eq!(result.objects.keys().collect::<Vec<_>>(), vec!["A"]);
        assert_eq!(stub.http.call_count(), 1);
    }

    #[tokio::test]
    async fn test_root_entity_without_vcard_is_fetched() {
        let stub = StubNetwork::new();
        stub.http.respond_json(IP_URL, &network(json!([{"handle": "ABUSE", "roles": ["abuse"]}])));
        stub.http.respond_json(
            &entity_url("ABUSE"),
            &json!({"handle": "ABUSE", "vcardArray": vcard("Abuse Desk")}),
        );

        let result = assert_ok!(resolver(&stub).lookup(Some(Rir::Arin), &RdapOptions::default()).await);
        let abuse = &result.objects["ABUSE"];
        assert_eq!(abuse.roles, Some(vec!["abuse".to_string()]));
        assert_eq!(abuse.contact.as_ref().and_then(|c| c.name.as_deref()), Some("Abuse Desk"));

        let options = RdapOptions {
            root_ent_check: false,
            ..RdapOptions::default()
        };
        let result = assert_ok!(resolver(&stub).lookup(Some(Rir::Arin), &options).await);
        assert!(result.objects["ABUSE"].contact.is_none());
        assert_eq!(stub.http.calls_to(&entity_url("ABUSE")), 1);
    }

    #[tokio::test]
    async fn test_excluded_entities() {
        let stub = StubNetwork::new();
        stub.http.respond_json(
            IP_URL,
            &network(json!([
                {"handle": "A", "vcardArray": vcard("Entity A"), "entities": [{"handle": "B"}]},
                {"handle": "C", "vcardArray": vcard("Entity C")}
            ])),
        );

        let options = RdapOptions::new()
            .with_depth(1)
            .with_excluded_entities(vec!["B".to_string(), "C".to_string()]);
        let result = assert_ok!(resolver(&stub).lookup(Some(Rir::Arin), &options).await);
        assert_eq!(result.entities, vec!["A".to_string()]);
        assert_eq!(result.objects.len(), 1);
        assert_eq!(stub.http.call_count(), 1);
    }

    #[tokio::test]
    async fn test_bootstrap_and_offline_response() {
        let stub = StubNetwork::new();
        let url = RdapEndpoints::BOOTSTRAP.ip("74.125.225.229");
        stub.http.respond_json(&url, &network(json!([])));

        let options = RdapOptions::new().with_bootstrap(true).with_raw(true);
        let result = assert_ok!(resolver(&stub).lookup(None, &options).await);
        assert!(result.raw.is_some());
        assert_eq!(stub.http.calls_to(&url), 1);

        let options = RdapOptions::new().with_response(network(json!([])));
        let result = assert_ok!(resolver(&stub).lookup(Some(Rir::Arin), &options).await);
        assert_eq!(result.network.handle, "NET-74-125-0-0-1");
        assert_eq!(stub.http.call_count(), 1);

        let err = assert_err!(resolver(&stub).lookup(None, &RdapOptions::default()).await);
        assert!(matches!(err, LookupError::Net(_)));
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let stub = StubNetwork::new();
        stub.http.push_status(IP_URL, 503);
        stub.http.push_failure(IP_URL);
        stub.http.respond_json(IP_URL, &network(json!([])));

        let options = RdapOptions::new().with_retry_count(3);
        assert_ok!(resolver(&stub).lookup(Some(Rir::Arin), &options).await);
        assert_eq!(stub.http.calls_to(IP_URL), 3);

        let stub = StubNetwork::new();
        for _ in 0..3 {
            stub.http.push_status(IP_URL, 503);
        }
        stub.http.respond_json(IP_URL, &network(json!([])));
        let err = assert_err!(resolver(&stub).lookup(Some(Rir::Arin), &options).await);
        assert!(matches!(err, LookupError::HttpLookup(_)));
        assert_eq!(stub.http.calls_to(IP_URL), 3);
    }

    #[tokio::test]
    async fn test_rate_limit_notice() {
        let stub = StubNetwork::new();
        stub.http.respond_json(
            IP_URL,
            &json!({"notices": [{"title": "Rate Limit Notice", "description": ["slow down"]}]}),
        );

        let options = RdapOptions {
            retry_count: 2,
            rate_limit_timeout: Duration::from_secs(5),
            ..RdapOptions::default()
        };
        let err = assert_err!(resolver(&stub).lookup(Some(Rir::Arin), &options).await);
        assert!(err.is_rate_limit());
        assert_eq!(stub.clock.sleeps(), vec![Duration::from_secs(5)]);
    }

    #[tokio::test]
    async fn test_invalid_network_object() {
        let stub = StubNetwork::new();
        stub.http.respond_json(IP_URL, &json!({"name": "NO-HANDLE"}));

        let err = assert_err!(resolver(&stub).lookup(Some(Rir::Arin), &RdapOptions::default()).await);
        assert!(matches!(err, LookupError::InvalidNetworkObject(_)));
    }
}
