//! Gateway settings and field tables for each NIR

use ipwhois_core::Nir;
use ipwhois_net::HttpMethod;
use ipwhois_parse::{DatePolicy, FieldKind, FieldTable};
use once_cell::sync::Lazy;

use FieldKind::{List, Text, Timestamp};

/// How to query one NIR and read its pages
#[derive(Debug)]
pub struct NirConfig {
    pub nir: Nir,
    /// Query URL; `{0}` is replaced by the address or contact handle
    pub url: &'static str,
    pub method: HttpMethod,
    /// Form field carrying the address for POST queries
    pub form_ip_field: Option<&'static str>,
    pub fields: FieldTable,
    pub contact_fields: FieldTable,
}

impl NirConfig {
    pub fn url_for(&self, key: &str) -> String {
        self.url.replace("{0}", key)
    }
}

fn compile(entries: &[(&'static str, &str, FieldKind)], dates: DatePolicy) -> FieldTable {
    FieldTable::new(entries, Some(dates), false).expect("NIR field patterns are valid")
}

const JPNIC_DATES: DatePolicy = DatePolicy::new("%Y/%m/%d %H:%M:%S(JST)")
    .with_fallback("%Y/%m/%d")
    .with_hour_offset(9);

const KRNIC_DATES: DatePolicy = DatePolicy::new("%Y%m%d").with_fallback("%Y/%m/%d");

static JPNIC: Lazy<NirConfig> = Lazy::new(|| NirConfig {
    nir: Nir::Jpnic,
    url: "http://whois.nic.ad.jp/cgi-bin/whois_gw?lang=%2Fe&key={0}&submit=query",
    method: HttpMethod::Get,
    form_ip_field: None,
    fields: compile(
        &[
            ("name", r"(\[Organization\])[^\S\n]+(?P<val>.*?)\n", Text),
            ("handle", r"(\[Network Name\])[^\S\n]+(?P<val>.*?)\n", Text),
            ("created", r"(\[Assigned Date\])[^\S\n]+(?P<val>.*?)\n", Timestamp),
            ("updated", r"(\[Last Update\])[^\S\n]+(?P<val>.*?)\n", Timestamp),
            ("nameservers", r"(\[Nameserver\])[^\S\n]+(?P<val>.*?)\n", List),
            (
                "contact_admin",
                r"(\[Administrative Contact\])[^\S\n]+.+?>(?P<val>.+?)</A>\n",
                Text,
            ),
            (
                "contact_tech",
                r"(\[Technical Contact\])[^\S\n]+.+?>(?P<val>.+?)</A>\n",
                Text,
            ),
        ],
        JPNIC_DATES,
    ),
    contact_fields: compile(
        &[
            ("name", r"(\[Last, First\])[^\S\n]+(?P<val>.*?)\n", Text),
            ("email", r"(\[E-Mail\])[^\S\n]+(?P<val>.*?)\n", Text),
            ("reply_email", r"(\[Reply Mail\])[^\S\n]+(?P<val>.*?)\n", Text),
            ("organization", r"(\[Organization\])[^\S\n]+(?P<val>.*?)\n", Text),
            ("division", r"(\[Division\])[^\S\n]+(?P<val>.*?)\n", Text),
            ("title", r"(\[Title\])[^\S\n]+(?P<val>.*?)\n", Text),
            ("phone", r"(\[TEL\])[^\S\n]+(?P<val>.*?)\n", Text),
            ("fax", r"(\[FAX\])[^\S\n]+(?P<val>.*?)\n", Text),
            ("updated", r"(\[Last Update\])[^\S\n]+(?P<val>.*?)\n", Timestamp),
        ],
        JPNIC_DATES,
    ),
});

static KRNIC: Lazy<NirConfig> = Lazy::new(|| NirConfig {
    nir: Nir::Krnic,
    url: "https://xn--c79as89aj0e29b77z.xn--3e0b707e/eng/whois.jsc",
    method: HttpMethod::Post,
    form_ip_field: Some("query"),
    fields: compile(
        &[
            ("name", r"(Organization Name)[\s]+:[^\S\n]+(?P<val>.+?)\n", Text),
            ("handle", r"(Service Name|Network Type)[\s]+:[^\S\n]+(?P<val>.+?)\n", Text),
            ("address", r"(Address)[\s]+:[^\S\n]+(?P<val>.+?)\n", Text),
            ("postal_code", r"(Zip Code)[\s]+:[^\S\n]+(?P<val>.+?)\n", Text),
            ("created", r"(Registered Date)[\s]+:[^\S\n]+(?P<val>.+?)\n", Timestamp),
            ("contact_admin", r#"(id="eng_isp_contact").+?>(?P<val>.*?)<\n"#, Text),
            ("contact_tech", r#"(id="eng_user_contact").+?>(?P<val>.*?)<\n"#, Text),
        ],
        KRNIC_DATES,
    ),
    contact_fields: compile(
        &[
            ("name", r"(Name)[^\S\n]+?:[^\S\n]+?(?P<val>.*?)\n", Text),
            ("email", r"(E-Mail)[^\S\n]+?:[^\S\n]+?(?P<val>.*?)\n", Text),
            ("phone", r"(Phone)[^\S\n]+?:[^\S\n]+?(?P<val>.*?)\n", Text),
        ],
        KRNIC_DATES,
    ),
});

/// Settings for a registry
pub fn nir_config(nir: Nir) -> &'static NirConfig {
    match nir {
        Nir::Jpnic => &JPNIC,
        Nir::Krnic => &KRNIC,
    }
}
