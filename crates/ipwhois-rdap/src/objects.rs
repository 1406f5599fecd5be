//! RDAP network and entity objects
//!
//! Decodes the RFC 7483 JSON shapes into flat structs. Members that are
//! missing or of the wrong type become `None`; only a missing `handle` (or a
//! non-object document) is an error.

use crate::vcard::{parse_vcard, RdapContact};
use ipwhois_cidr::{calculate_cidr, ipv4_lstrip_zeros};
use ipwhois_core::utils::unique_everseen;
use ipwhois_core::{LookupError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

/// A notice or remark
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RdapNotice {
    pub title: Option<String>,
    /// Description lines joined by newlines
    pub description: Option<String>,
    pub links: Option<Vec<String>>,
}

/// A dated event such as registration or last change
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RdapEvent {
    pub action: Option<String>,
    pub timestamp: Option<String>,
    pub actor: Option<String>,
}

/// Members shared by networks and entities
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RdapCommon {
    pub status: Option<Vec<String>>,
    pub links: Option<Vec<String>>,
    pub notices: Option<Vec<RdapNotice>>,
    pub remarks: Option<Vec<RdapNotice>>,
    pub events: Option<Vec<RdapEvent>>,
}

impl RdapCommon {
    fn parse(object: &Map<String, Value>) -> Self {
        Self {
            status: object.get("status").and_then(strings),
            links: object.get("links").and_then(summarize_links),
            notices: object.get("notices").and_then(summarize_notices),
            remarks: object.get("remarks").and_then(summarize_notices),
            events: object.get("events").and_then(summarize_events),
        }
    }
}

fn string(object: &Map<String, Value>, key: &str) -> Option<String> {
    object.get(key).and_then(Value::as_str).map(str::to_string)
}

fn strings(value: &Value) -> Option<Vec<String>> {
    let items: Vec<String> = value
        .as_array()?
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect();
    (!items.is_empty()).then_some(items)
}

/// Unique `href` values of a links array
pub fn summarize_links(links: &Value) -> Option<Vec<String>> {
    let hrefs: Vec<String> = links
        .as_array()?
        .iter()
        .filter_map(|link| link.get("href").and_then(Value::as_str))
        .map(str::to_string)
        .collect();
    let hrefs = unique_everseen(hrefs);
    (!hrefs.is_empty()).then_some(hrefs)
}

/// Notices or remarks with descriptions flattened to text
pub fn summarize_notices(notices: &Value) -> Option<Vec<RdapNotice>> {
    let notices: Vec<RdapNotice> = notices
        .as_array()?
        .iter()
        .filter(|notice| notice.is_object())
        .map(|notice| RdapNotice {
            title: notice.get("title").and_then(Value::as_str).map(str::to_string),
            description: notice
                .get("description")
                .and_then(strings)
                .map(|lines| lines.join("\n")),
            links: notice.get("links").and_then(summarize_links),
        })
        .collect();
    (!notices.is_empty()).then_some(notices)
}

/// Events as action / timestamp / actor
pub fn summarize_events(events: &Value) -> Option<Vec<RdapEvent>> {
    let events: Vec<RdapEvent> = events
        .as_array()?
        .iter()
        .filter(|event| event.is_object())
        .map(|event| RdapEvent {
            action: event.get("eventAction").and_then(Value::as_str).map(str::to_string),
            timestamp: event.get("eventDate").and_then(Value::as_str).map(str::to_string),
            actor: event.get("eventActor").and_then(Value::as_str).map(str::to_string),
        })
        .collect();
    (!events.is_empty()).then_some(events)
}

/// RDAP IP network
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RdapNetwork {
    pub handle: String,
    pub name: Option<String>,
    /// Comma-separated CIDRs covering `start_address`..`end_address`
    pub cidr: Option<String>,
    pub start_address: Option<String>,
    pub end_address: Option<String>,
    pub ip_version: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub country: Option<String>,
    pub parent_handle: Option<String>,
    #[serde(flatten)]
    pub common: RdapCommon,
}

impl RdapNetwork {
    pub fn parse(json: &Value) -> Result<Self> {
        let object = json.as_object().ok_or_else(|| {
            LookupError::InvalidNetworkObject("JSON result must be a dict.".to_string())
        })?;
        let handle = string(object, "handle").ok_or_else(|| {
            LookupError::InvalidNetworkObject("Handle missing, json output not parsed.".to_string())
        })?;

        let ip_version = string(object, "ipVersion");
        let address = |key: &str| {
            string(object, key).map(|a| match ip_version.as_deref() {
                Some("v6") => a,
                _ if a.contains('.') => ipv4_lstrip_zeros(&a),
                _ => a,
            })
        };
        let start_address = address("startAddress");
        let end_address = address("endAddress");

        let cidr = match (&start_address, &end_address) {
            (Some(start), Some(end)) => match calculate_cidr(start, end) {
                Ok(cidrs) => Some(cidrs.join(", ")),
                Err(e) => {
                    debug!(handle = %handle, error = %e, "Network range does not convert to CIDR");
                    None
                }
            },
            _ => None,
        };

        Ok(Self {
            name: string(object, "name"),
            cidr,
            start_address,
            end_address,
            ip_version,
            kind: string(object, "type"),
            country: string(object, "country"),
            parent_handle: string(object, "parentHandle"),
            common: RdapCommon::parse(object),
            handle,
        })
    }
}

/// RDAP entity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RdapEntity {
    pub handle: String,
    pub roles: Option<Vec<String>>,
    pub contact: Option<RdapContact>,
    /// Handles of entities this one references
    pub entities: Option<Vec<String>>,
    pub events_actor: Option<Vec<RdapEvent>>,
    #[serde(flatten)]
    pub common: RdapCommon,
}

impl RdapEntity {
    pub fn parse(json: &Value) -> Result<Self> {
        let object = json.as_object().ok_or_else(|| {
            LookupError::InvalidEntityObject("JSON result must be a dict.".to_string())
        })?;
        let handle = string(object, "handle").ok_or_else(|| {
            LookupError::InvalidEntityObject("Handle missing, json output not parsed.".to_string())
        })?;

        let contact = match object.get("vcardArray") {
            Some(vcard) => {
                let properties = vcard.get(1).ok_or_else(|| {
                    LookupError::InvalidEntityContactObject("JSON result must be a list.".to_string())
                })?;
                Some(parse_vcard(properties)?)
            }
            None => None,
        };

        let entities = object.get("entities").and_then(Value::as_array).and_then(|children| {
            let handles = unique_everseen(
                children
                    .iter()
                    .filter_map(|child| child.get("handle").and_then(Value::as_str))
                    .map(str::to_string),
            );
            (!handles.is_empty()).then_some(handles)
        });

        Ok(Self {
            roles: object.get("roles").and_then(strings),
            contact,
            entities,
            events_actor: object.get("asEventActor").and_then(summarize_events),
            common: RdapCommon::parse(object),
            handle,
        })
    }

    /// True when the object carries a vCard
    pub fn has_contact(json: &Value) -> bool {
        json.get("vcardArray").is_some()
    }
}

/// Roles that a parent object assigns to each child entity handle
pub fn child_roles(json: &Value) -> Vec<(String, Vec<String>)> {
    json.get("entities")
        .and_then(Value::as_array)
        .map(|children| {
            children
                .iter()
                .filter_map(|child| {
                    let handle = child.get("handle")?.as_str()?.to_string();
                    let roles = child.get("roles").and_then(strings)?;
                    Some((handle, roles))
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn network_json() -> Value {
        json!({
            "objectClassName": "ip network",
            "handle": "NET-74-125-0-0-1",
            "startAddress": "074.125.000.000",
            "endAddress": "074.125.255.255",
            "ipVersion": "v4",
            "name": "GOOGLE",
            "type": "DIRECT ALLOCATION",
            "parentHandle": "NET-74-0-0-0-0",
            "status": ["active"],
            "events": [
                {"eventAction": "last changed", "eventDate": "2012-02-24T09:44:34-05:00"},
                {"eventAction": "registration", "eventDate": "2007-03-13T12:09:54-04:00"}
            ],
            "links": [
                {"href": "https://rdap.arin.net/registry/ip/74.125.0.0"},
                {"href": "https://rdap.arin.net/registry/ip/74.125.0.0"},
                {"href": "https://whois.arin.net/rest/net/NET-74-125-0-0-1"}
            ],
            "notices": [
                {"title": "Terms of Service", "description": ["By using the ARIN RDAP/Whois service,", "you are agreeing to the RDAP/Whois Terms of Use"]}
            ],
            "remarks": [{"description": ["Addresses within this block are non-portable."]}]
        })
    }

    #[test]
    fn test_parse_network() {
        let net = RdapNetwork::parse(&network_json()).unwrap();
        assert_eq!(net.handle, "NET-74-125-0-0-1");
        assert_eq!(net.start_address.as_deref(), Some("74.125.0.0"));
        assert_eq!(net.end_address.as_deref(), Some("74.125.255.255"));
        assert_eq!(net.cidr.as_deref(), Some("74.125.0.0/16"));
        assert_eq!(net.kind.as_deref(), Some("DIRECT ALLOCATION"));
        assert_eq!(net.parent_handle.as_deref(), Some("NET-74-0-0-0-0"));
        assert!(net.country.is_none());
        assert_eq!(net.common.status, Some(vec!["active".to_string()]));
        assert_eq!(net.common.links.as_ref().map(Vec::len), Some(2));
        assert_eq!(
            net.common.events.as_ref().unwrap()[1].action.as_deref(),
            Some("registration")
        );

        let notice = &net.common.notices.as_ref().unwrap()[0];
        assert_eq!(notice.title.as_deref(), Some("Terms of Service"));
        assert_eq!(
            notice.description.as_deref(),
            Some("By using the ARIN RDAP/Whois service,\nyou are agreeing to the RDAP/Whois Terms of Use")
        );
        assert!(net.common.remarks.as_ref().unwrap()[0].title.is_none());
    }

    #[test]
    fn test_network_serializes_flat() {
        let net = RdapNetwork::parse(&network_json()).unwrap();
        let value = serde_json::to_value(&net).unwrap();
        assert_eq!(value["type"], "DIRECT ALLOCATION");
        assert_eq!(value["status"][0], "active");
        assert!(value.get("common").is_none());
    }

    #[test]
    fn test_network_without_handle() {
        let err = RdapNetwork::parse(&json!({"startAddress": "1.0.0.0"})).unwrap_err();
        assert_eq!(
            err,
            LookupError::InvalidNetworkObject("Handle missing, json output not parsed.".to_string())
        );
        assert!(matches!(
            RdapNetwork::parse(&json!([])),
            Err(LookupError::InvalidNetworkObject(_))
        ));
    }

    #[test]
    fn test_parse_entity() {
        let entity = RdapEntity::parse(&json!({
            "handle": "GOGL",
            "roles": ["registrant"],
            "vcardArray": ["vcard", [["fn", {}, "text", "Google LLC"]]],
            "entities": [
                {"handle": "ABUSE5250-ARIN", "roles": ["abuse"]},
                {"handle": "ZG39-ARIN", "roles": ["technical"]},
                {"handle": "ABUSE5250-ARIN"}
            ],
            "asEventActor": [{"eventAction": "last changed", "eventDate": "2019-10-31T15:45:45-04:00"}]
        }))
        .unwrap();

        assert_eq!(entity.handle, "GOGL");
        assert_eq!(entity.roles, Some(vec!["registrant".to_string()]));
        assert_eq!(entity.contact.unwrap().name.as_deref(), Some("Google LLC"));
        assert_eq!(
            entity.entities,
            Some(vec!["ABUSE5250-ARIN".to_string(), "ZG39-ARIN".to_string()])
        );
        assert_eq!(entity.events_actor.unwrap().len(), 1);
    }

    #[test]
    fn test_entity_errors() {
        assert!(matches!(
            RdapEntity::parse(&json!({"roles": ["abuse"]})),
            Err(LookupError::InvalidEntityObject(_))
        ));
        assert!(matches!(
            RdapEntity::parse(&json!({"handle": "X", "vcardArray": ["vcard", {"fn": "x"}]})),
            Err(LookupError::InvalidEntityContactObject(_))
        ));
    }

    #[test]
    fn test_child_roles() {
        let roles = child_roles(&json!({
            "entities": [{"handle": "A", "roles": ["abuse"]}, {"handle": "B"}]
        }));
        assert_eq!(roles, vec![("A".to_string(), vec!["abuse".to_string()])]);
    }
}
