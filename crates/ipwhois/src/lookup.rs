//! Combined ASN, registry and NIR lookups for one address

use ipwhois_asn::{AsnLookupOptions, IpAsn};
use ipwhois_core::config::LookupConfig;
use ipwhois_core::{AsnRecord, AsnSource, LookupTarget, Result, Rir};
use ipwhois_net::Net;
use ipwhois_nir::{NirOptions, NirResult, NirWhois};
use ipwhois_rdap::{Rdap, RdapEntity, RdapNetwork, RdapOptions};
use ipwhois_whois::{Whois, WhoisNet, WhoisOptions};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::debug;

/// Options shared by both lookup kinds
#[derive(Debug, Clone)]
pub struct LookupOptions {
    /// Keep the registry response on the result
    pub inc_raw: bool,
    pub retry_count: u32,
    pub asn_methods: Vec<AsnSource>,
    pub extra_org_map: HashMap<String, Rir>,
    pub get_asn_description: bool,
    /// Query JPNIC or KRNIC when the ASN country is JP or KR
    pub inc_nir: bool,
    pub nir_field_list: Option<Vec<&'static str>>,
}

impl Default for LookupOptions {
    fn default() -> Self {
        let asn = AsnLookupOptions::default();
        Self {
            inc_raw: false,
            retry_count: 3,
            asn_methods: asn.asn_methods,
            extra_org_map: asn.extra_org_map,
            get_asn_description: asn.get_asn_description,
            inc_nir: true,
            nir_field_list: None,
        }
    }
}

impl LookupOptions {
    fn asn(&self) -> AsnLookupOptions {
        // The registry's raw response takes the `raw` slot of the merged result.
        AsnLookupOptions {
            inc_raw: false,
            retry_count: self.retry_count,
            extra_org_map: self.extra_org_map.clone(),
            asn_methods: self.asn_methods.clone(),
            get_asn_description: self.get_asn_description,
        }
    }

    fn nir(&self) -> NirOptions {
        NirOptions {
            inc_raw: self.inc_raw,
            retry_count: self.retry_count,
            field_list: self.nir_field_list.clone(),
            ..NirOptions::default()
        }
    }
}

/// Options for [`IpWhois::lookup_whois`]
#[derive(Debug, Clone, Default)]
pub struct WhoisLookupOptions {
    pub common: LookupOptions,
    pub get_referral: bool,
    pub extra_blacklist: Vec<String>,
    pub ignore_referral_errors: bool,
    pub field_list: Option<Vec<&'static str>>,
}

/// Options for [`IpWhois::lookup_rdap`]
#[derive(Debug, Clone)]
pub struct RdapLookupOptions {
    pub common: LookupOptions,
    pub depth: u32,
    pub excluded_entities: Vec<String>,
    /// Skip the ASN lookup and ask ARIN's bootstrap service
    pub bootstrap: bool,
    pub rate_limit_timeout: Duration,
    pub root_ent_check: bool,
}

impl Default for RdapLookupOptions {
    fn default() -> Self {
        let rdap = RdapOptions::default();
        Self {
            common: LookupOptions::default(),
            depth: rdap.depth,
            excluded_entities: rdap.excluded_entities,
            bootstrap: rdap.bootstrap,
            rate_limit_timeout: rdap.rate_limit_timeout,
            root_ent_check: rdap.root_ent_check,
        }
    }
}

/// Merged result of [`IpWhois::lookup_whois`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhoisLookup {
    pub query: String,
    #[serde(flatten)]
    pub asn: AsnRecord,
    pub nets: Vec<WhoisNet>,
    pub referral: Option<WhoisNet>,
    pub nir: Option<NirResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_referral: Option<String>,
}

/// Merged result of [`IpWhois::lookup_rdap`]
///
/// `asn` is `None` in bootstrap mode, where no ASN lookup runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RdapLookup {
    pub query: String,
    #[serde(flatten)]
    pub asn: Option<AsnRecord>,
    pub network: RdapNetwork,
    pub entities: Vec<String>,
    pub objects: BTreeMap<String, RdapEntity>,
    pub nir: Option<NirResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<Value>,
}

/// WHOIS and RDAP lookups for one IP address
///
/// # Examples
///
/// ```no_run
/// use ipwhois::IpWhois;
/// use ipwhois::WhoisLookupOptions;
/// use ipwhois_core::config::LookupConfig;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let whois = IpWhois::new("74.125.225.229", LookupConfig::new())?;
/// let result = whois.lookup_whois(&WhoisLookupOptions::default()).await?;
/// println!("{} {:?}", result.asn.asn_registry, result.nets[0].cidr);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct IpWhois {
    net: Net,
}

impl IpWhois {
    /// Lookups for `address` over the real network
    ///
    /// Reserved and special-use addresses are rejected here.
    pub fn new(address: &str, config: LookupConfig) -> Result<Self> {
        let target = LookupTarget::parse(address)?;
        Ok(Self {
            net: Net::new(target, config)?,
        })
    }

    /// Lookups over an existing [`Net`]
    pub fn with_net(net: Net) -> Self {
        Self { net }
    }

    pub fn net(&self) -> &Net {
        &self.net
    }

    /// ASN lookup, then the registry's port-43 WHOIS, then the NIR if any
    pub async fn lookup_whois(&self, options: &WhoisLookupOptions) -> Result<WhoisLookup> {
        let common = &options.common;
        let asn = IpAsn::new(self.net.clone()).lookup(&common.asn()).await?;
        debug!(address = %self.net.target(), registry = %asn.asn_registry, "WHOIS lookup");

        let whois = Whois::new(self.net.clone())
            .lookup(
                asn.asn_registry,
                &WhoisOptions {
                    inc_raw: common.inc_raw,
                    retry_count: common.retry_count,
                    get_referral: options.get_referral,
                    extra_blacklist: options.extra_blacklist.clone(),
                    ignore_referral_errors: options.ignore_referral_errors,
                    field_list: options.field_list.clone(),
                    ..WhoisOptions::default()
                },
            )
            .await?;

        let nir = self.lookup_nir(Some(&asn), common).await?;

        Ok(WhoisLookup {
            query: whois.query,
            asn,
            nets: whois.nets,
            referral: whois.referral,
            nir,
            raw: whois.raw,
            raw_referral: whois.raw_referral,
        })
    }

    /// ASN lookup (unless bootstrapping), then RDAP, then the NIR if any
    pub async fn lookup_rdap(&self, options: &RdapLookupOptions) -> Result<RdapLookup> {
        let common = &options.common;

        let asn = if options.bootstrap {
            None
        } else {
            Some(IpAsn::new(self.net.clone()).lookup(&common.asn()).await?)
        };
        debug!(
            address = %self.net.target(),
            registry = ?asn.as_ref().map(|a| a.asn_registry),
            bootstrap = options.bootstrap,
            "RDAP lookup"
        );

        let rdap = Rdap::new(self.net.clone())
            .lookup(
                asn.as_ref().map(|a| a.asn_registry),
                &RdapOptions {
                    inc_raw: common.inc_raw,
                    retry_count: common.retry_count,
                    depth: options.depth,
                    excluded_entities: options.excluded_entities.clone(),
                    response: None,
                    bootstrap: options.bootstrap,
                    rate_limit_timeout: options.rate_limit_timeout,
                    root_ent_check: options.root_ent_check,
                },
            )
            .await?;

        let nir = self.lookup_nir(asn.as_ref(), common).await?;

        Ok(RdapLookup {
            query: rdap.query,
            asn,
            network: rdap.network,
            entities: rdap.entities,
            objects: rdap.objects,
            nir,
            raw: rdap.raw,
        })
    }

    async fn lookup_nir(&self, asn: Option<&AsnRecord>, options: &LookupOptions) -> Result<Option<NirResult>> {
        if !options.inc_nir {
            return Ok(None);
        }
        let Some(nir) = asn.and_then(AsnRecord::nir) else {
            return Ok(None);
        };

        debug!(address = %self.net.target(), nir = %nir, "NIR lookup");
        let result = NirWhois::new(self.net.clone()).lookup(nir, &options.nir()).await?;
        Ok(Some(result))
    }
}
