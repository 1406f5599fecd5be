//! NIR lookup over the JPNIC and KRNIC web gateways

use crate::tables::{nir_config, NirConfig};
use ipwhois_cidr::{collapse, range_string, summarize_range, Cidr, CidrError};
use ipwhois_core::{LookupError, Nir, Result};
use ipwhois_net::Net;
use ipwhois_parse::{parse_fields, section_bounds, Bounds, FieldMap, Section};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;
use tracing::debug;

static JPNIC_NET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^.*?(\[Network Number\])[^\S\n]+.+?>(?P<val>.+?)</A>$")
        .expect("JPNIC network pattern is valid")
});

static KRNIC_NET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^(IPv4 Address)[\s]+:[^\S\n]+((.+?)[^\S\n]-[^\S\n](.+?)[^\S\n](.+?)|.+)$")
        .expect("KRNIC network pattern is valid")
});

/// Contact details behind an admin or tech handle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NirContact {
    pub name: Option<String>,
    pub email: Option<String>,
    pub reply_email: Option<String>,
    pub organization: Option<String>,
    pub division: Option<String>,
    pub title: Option<String>,
    pub phone: Option<String>,
    pub fax: Option<String>,
    pub updated: Option<String>,
}

impl NirContact {
    fn from_fields(fields: &FieldMap) -> Self {
        Self {
            name: fields.string("name"),
            email: fields.string("email"),
            reply_email: fields.string("reply_email"),
            organization: fields.string("organization"),
            division: fields.string("division"),
            title: fields.string("title"),
            phone: fields.string("phone"),
            fax: fields.string("fax"),
            updated: fields.string("updated"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NirContacts {
    pub admin: Option<NirContact>,
    pub tech: Option<NirContact>,
}

/// One network from a NIR page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NirNet {
    pub cidr: Option<String>,
    pub name: Option<String>,
    pub handle: Option<String>,
    pub range: Option<String>,
    pub country: Option<String>,
    pub address: Option<String>,
    pub postal_code: Option<String>,
    pub nameservers: Option<Vec<String>>,
    pub created: Option<String>,
    pub updated: Option<String>,
    pub contacts: NirContacts,
}

/// Result of a NIR lookup
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NirResult {
    pub query: String,
    pub nets: Vec<NirNet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

/// Options for [`NirWhois::lookup`]
#[derive(Debug, Clone)]
pub struct NirOptions {
    pub inc_raw: bool,
    pub retry_count: u32,
    /// Parse this page instead of querying
    pub response: Option<String>,
    pub field_list: Option<Vec<&'static str>>,
    /// Never touch the network; contacts are not resolved
    pub is_offline: bool,
}

impl Default for NirOptions {
    fn default() -> Self {
        Self {
            inc_raw: false,
            retry_count: 3,
            response: None,
            field_list: None,
            is_offline: false,
        }
    }
}

struct RawNet {
    cidr: String,
    range: String,
    section: Section,
}

/// Network sections of a JPNIC page
fn get_nets_jpnic(response: &str) -> Vec<RawNet> {
    JPNIC_NET
        .captures_iter(response)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let value = caps.name("val")?.as_str().trim();
            match Cidr::parse(value) {
                Ok(cidr) => Some(RawNet {
                    cidr: cidr.to_string(),
                    range: range_string(cidr.network(), cidr.last()),
                    section: Section::from_match(&whole),
                }),
                Err(e) => {
                    debug!(network = value, error = %e, "Skipping JPNIC network");
                    None
                }
            }
        })
        .collect()
}

fn covering(first: &str, last: &str) -> std::result::Result<String, CidrError> {
    let first: IpAddr = first
        .trim()
        .parse()
        .map_err(|_| CidrError::InvalidIpAddress(first.to_string()))?;
    let last: IpAddr = last
        .trim()
        .parse()
        .map_err(|_| CidrError::InvalidIpAddress(last.to_string()))?;
    Ok(collapse(&summarize_range(first, last)?)
        .iter()
        .map(Cidr::to_string)
        .collect::<Vec<_>>()
        .join(", "))
}

/// Network sections of a KRNIC page
fn get_nets_krnic(response: &str) -> Vec<RawNet> {
    KRNIC_NET
        .captures_iter(response)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let net_range = caps.get(2)?.as_str().trim();

            let parsed = match (caps.get(3), caps.get(4)) {
                (Some(first), Some(last)) => covering(first.as_str(), last.as_str()).map(|cidr| {
                    (cidr, format!("{} - {}", first.as_str().trim(), last.as_str().trim()))
                }),
                _ => Cidr::parse(net_range).map(|cidr| (cidr.to_string(), net_range.to_string())),
            };

            match parsed {
                Ok((cidr, range)) => Some(RawNet {
                    cidr,
                    range,
                    section: Section::from_match(&whole),
                }),
                Err(e) => {
                    debug!(range = net_range, error = %e, "Skipping KRNIC network");
                    None
                }
            }
        })
        .collect()
}

/// Parse a NIR page into networks without resolving contacts
pub fn parse_nets(response: &str, nir: Nir, field_list: Option<&[&str]>) -> Vec<NirNet> {
    parse_sections(response, nir_config(nir), field_list)
        .into_iter()
        .map(|(net, _)| net)
        .collect()
}

/// Networks plus the admin and tech contact keys found in each
fn parse_sections(
    response: &str,
    config: &NirConfig,
    field_list: Option<&[&str]>,
) -> Vec<(NirNet, [(ContactRole, Vec<String>); 2])> {
    let response = format!("{}\n", response);
    let found = match config.nir {
        Nir::Jpnic => get_nets_jpnic(&response),
        Nir::Krnic => get_nets_krnic(&response),
    };
    let sections: Vec<Section> = found.iter().map(|net| net.section).collect();

    found
        .into_iter()
        .enumerate()
        .map(|(index, raw)| {
            let fields = parse_fields(
                &response,
                &config.fields,
                section_bounds(&sections, index),
                field_list,
            );

            let net = NirNet {
                cidr: Some(raw.cidr),
                range: Some(raw.range),
                country: Some(config.nir.country_code().to_string()),
                name: fields.string("name"),
                handle: fields.string("handle"),
                address: fields.string("address"),
                postal_code: fields.string("postal_code"),
                nameservers: fields.list("nameservers"),
                created: fields.string("created"),
                updated: fields.string("updated"),
                contacts: NirContacts::default(),
            };

            // JPNIC lists contact handles one per line; a KRNIC contact is
            // the whole embedded block.
            let keys = |name: &str| -> Vec<String> {
                match (fields.text(name), config.nir) {
                    (Some(text), Nir::Jpnic) => text
                        .lines()
                        .map(str::trim)
                        .filter(|line| !line.is_empty())
                        .map(str::to_string)
                        .collect(),
                    (Some(text), Nir::Krnic) => vec![text.to_string()],
                    (None, _) => Vec::new(),
                }
            };
            let contacts = [
                (ContactRole::Admin, keys("contact_admin")),
                (ContactRole::Tech, keys("contact_tech")),
            ];

            (net, contacts)
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContactRole {
    Admin,
    Tech,
}

/// NIR resolver for one target
#[derive(Clone)]
pub struct NirWhois {
    net: Net,
}

impl NirWhois {
    pub fn new(net: Net) -> Self {
        Self { net }
    }

    /// Fetch (or take) the NIR page for the target and parse its networks
    ///
    /// Contact handles are resolved once per lookup; repeated handles reuse
    /// the first answer.
    pub async fn lookup(&self, nir: Nir, options: &NirOptions) -> Result<NirResult> {
        let config = nir_config(nir);
        let query = self.net.target().to_string();

        let response = match (&options.response, options.is_offline) {
            (Some(response), _) => response.clone(),
            (None, true) => {
                return Err(LookupError::Net(
                    "response argument required when is_offline is set".to_string(),
                ))
            }
            (None, false) => self.fetch_network(config, &query, options.retry_count).await?,
        };

        let mut contacts_seen: HashMap<String, NirContact> = HashMap::new();
        let mut nets = Vec::new();

        for (mut net, contact_keys) in parse_sections(&response, config, options.field_list.as_deref()) {
            if !options.is_offline {
                for (role, keys) in contact_keys {
                    for key in keys {
                        let contact = match contacts_seen.get(&key) {
                            Some(contact) => contact.clone(),
                            None => {
                                let contact = self.get_contact(config, &key, options.retry_count).await?;
                                contacts_seen.insert(key, contact.clone());
                                contact
                            }
                        };
                        match role {
                            ContactRole::Admin => net.contacts.admin = Some(contact),
                            ContactRole::Tech => net.contacts.tech = Some(contact),
                        }
                    }
                }
            }
            nets.push(net);
        }

        Ok(NirResult {
            query,
            nets,
            raw: options.inc_raw.then_some(response),
        })
    }

    async fn fetch_network(&self, config: &NirConfig, address: &str, retry_count: u32) -> Result<String> {
        let form: Option<Vec<(&str, &str)>> = config.form_ip_field.map(|field| vec![(field, address)]);
        self.net
            .get_http_raw(
                &config.url_for(address),
                retry_count,
                None,
                config.method,
                form.as_deref(),
            )
            .await
    }

    /// Contact details for a handle
    ///
    /// JPNIC contacts are separate pages; KRNIC embeds them, so `key` is
    /// already the contact text.
    async fn get_contact(&self, config: &NirConfig, key: &str, retry_count: u32) -> Result<NirContact> {
        let text = match config.nir {
            Nir::Krnic => key.to_string(),
            Nir::Jpnic => {
                debug!(handle = key, "Fetching JPNIC contact");
                self.net
                    .get_http_raw(&config.url_for(key), retry_count, None, config.method, None)
                    .await?
            }
        };

        let text = format!("{}\n", text);
        Ok(NirContact::from_fields(&parse_fields(
            &text,
            &config.contact_fields,
            Bounds::all(),
            None,
        )))
    }
}
