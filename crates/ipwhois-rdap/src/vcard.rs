//! jCard decoding for RDAP entity contacts
//!
//! RDAP carries contacts as `["vcard", [[name, params, type, value], ...]]`.
//! Only the properties a WHOIS-style contact needs are decoded: `fn`, `kind`,
//! `adr`, `tel`, `email`, `role` and `title`. Everything else is ignored.

use ipwhois_core::{LookupError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::trace;

/// A typed contact value such as a phone number or postal address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactValue {
    /// vCard `type` parameter, e.g. `work` or `voice`
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub value: String,
}

/// Decoded vCard contact
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RdapContact {
    pub name: Option<String>,
    pub kind: Option<String>,
    pub address: Option<Vec<ContactValue>>,
    pub phone: Option<Vec<ContactValue>>,
    pub email: Option<Vec<ContactValue>>,
    pub role: Option<String>,
    pub title: Option<String>,
}

/// Decode the property list of a `vcardArray`
///
/// `properties` is the second element of the array. Properties that are not
/// four-element arrays are skipped.
pub fn parse_vcard(properties: &Value) -> Result<RdapContact> {
    let properties = properties.as_array().ok_or_else(|| {
        LookupError::InvalidEntityContactObject("JSON result must be a list.".to_string())
    })?;

    let mut contact = RdapContact::default();

    for property in properties {
        let Some([name, params, _value_type, value]) = property.as_array().map(Vec::as_slice).and_then(four) else {
            trace!(property = %property, "Skipping malformed vCard property");
            continue;
        };

        match name.as_str() {
            Some("fn") => contact.name = text(value),
            Some("kind") => contact.kind = text(value),
            Some("role") => contact.role = text(value),
            Some("title") => contact.title = text(value),
            Some("adr") => push(&mut contact.address, address(params, value)),
            Some("tel") => push(&mut contact.phone, typed(params, value)),
            Some("email") => push(&mut contact.email, typed(params, value)),
            _ => {}
        }
    }

    Ok(contact)
}

fn four(items: &[Value]) -> Option<&[Value; 4]> {
    items.get(..4)?.try_into().ok()
}

fn text(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn push(slot: &mut Option<Vec<ContactValue>>, value: Option<ContactValue>) {
    if let Some(value) = value {
        slot.get_or_insert_with(Vec::new).push(value);
    }
}

/// `type` parameter; multiple types are comma-joined
fn param_type(params: &Value) -> Option<String> {
    match params.get("type")? {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => {
            let joined = items
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(",");
            (!joined.is_empty()).then_some(joined)
        }
        _ => None,
    }
}

fn typed(params: &Value, value: &Value) -> Option<ContactValue> {
    Some(ContactValue {
        kind: param_type(params),
        value: text(value)?,
    })
}

/// Postal address: the `label` parameter when present, else the structured
/// components joined by newlines
fn address(params: &Value, value: &Value) -> Option<ContactValue> {
    let label = params
        .get("label")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    let value = label.or_else(|| {
        let mut parts = Vec::new();
        flatten(value, &mut parts);
        let joined = parts.join("\n");
        (!joined.is_empty()).then_some(joined)
    })?;

    Some(ContactValue {
        kind: param_type(params),
        value,
    })
}

fn flatten(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) if !s.trim().is_empty() => out.push(s.trim().to_string()),
        Value::Array(items) => items.iter().for_each(|item| flatten(item, out)),
        _ => {}
    }
}
