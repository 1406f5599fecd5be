//! Field tables for each registry's WHOIS output

use ipwhois_core::Rir;
use ipwhois_parse::{DatePolicy, FieldKind, FieldTable};
use once_cell::sync::Lazy;

use FieldKind::{Country, List, Text, Timestamp};

/// Email addresses anywhere in a `key: value` line
pub const EMAIL_PATTERN: &str =
    r".+?:.*?[^\S\n]+(?P<val>[\w\-\.]+?@[\w\-\.]+\.[\w\-]+)([^\S\n]+.*?)*?\n";

fn compile(
    entries: &[(&'static str, &str, FieldKind)],
    dates: Option<DatePolicy>,
) -> FieldTable {
    FieldTable::new(entries, dates, true).expect("WHOIS field patterns are valid")
}

static ARIN: Lazy<FieldTable> = Lazy::new(|| {
    compile(
        &[
            ("name", r"(NetName):[^\S\n]+(?P<val>.+?)\n", Text),
            ("handle", r"(NetHandle):[^\S\n]+(?P<val>.+?)\n", Text),
            ("description", r"(OrgName|CustName):[^\S\n]+(?P<val>.+?)(?P<stop>\n\S)", Text),
            ("country", r"(Country):[^\S\n]+(?P<val>.+?)\n", Country),
            ("state", r"(StateProv):[^\S\n]+(?P<val>.+?)\n", Text),
            ("city", r"(City):[^\S\n]+(?P<val>.+?)\n", Text),
            ("address", r"(Address):[^\S\n]+(?P<val>.+?)(?P<stop>\n\S)", Text),
            ("postal_code", r"(PostalCode):[^\S\n]+(?P<val>.+?)\n", Text),
            ("emails", EMAIL_PATTERN, List),
            ("created", r"(RegDate):[^\S\n]+(?P<val>.+?)\n", Timestamp),
            ("updated", r"(Updated):[^\S\n]+(?P<val>.+?)\n", Timestamp),
        ],
        Some(DatePolicy::new("%Y-%m-%d")),
    )
});

static RIPENCC: Lazy<FieldTable> = Lazy::new(|| {
    compile(
        &[
            ("name", r"(netname):[^\S\n]+(?P<val>.+?)\n", Text),
            ("handle", r"(nic-hdl):[^\S\n]+(?P<val>.+?)\n", Text),
            ("description", r"(descr):[^\S\n]+(?P<val>.+?)(?P<stop>\n\S)", Text),
            ("country", r"(country):[^\S\n]+(?P<val>.+?)\n", Country),
            ("address", r"(address):[^\S\n]+(?P<val>.+?)(?P<stop>\n\S)", Text),
            ("emails", EMAIL_PATTERN, List),
            (
                "created",
                r"(created):[^\S\n]+(?P<val>[0-9]{4}-[0-9]{2}-[0-9]{2}T[0-9]{2}:[0-9]{2}:[0-9]{2}Z).*?\n",
                Timestamp,
            ),
            (
                "updated",
                r"(last-modified):[^\S\n]+(?P<val>[0-9]{4}-[0-9]{2}-[0-9]{2}T[0-9]{2}:[0-9]{2}:[0-9]{2}Z).*?\n",
                Timestamp,
            ),
        ],
        Some(DatePolicy::new("%Y-%m-%dT%H:%M:%SZ")),
    )
});

static APNIC: Lazy<FieldTable> = Lazy::new(|| {
    compile(
        &[
            ("name", r"(netname):[^\S\n]+(?P<val>.+?)\n", Text),
            ("handle", r"(nic-hdl):[^\S\n]+(?P<val>.+?)\n", Text),
            ("description", r"(descr):[^\S\n]+(?P<val>.+?)(?P<stop>\n\S)", Text),
            ("country", r"(country):[^\S\n]+(?P<val>.+?)\n", Country),
            ("address", r"(address):[^\S\n]+(?P<val>.+?)(?P<stop>\n\S)", Text),
            ("emails", EMAIL_PATTERN, List),
            ("updated", r"(changed):[^\S\n]+.*(?P<val>[0-9]{8}).*?\n", Timestamp),
        ],
        Some(DatePolicy::new("%Y%m%d")),
    )
});

static LACNIC: Lazy<FieldTable> = Lazy::new(|| {
    compile(
        &[
            ("handle", r"(nic-hdl):[^\S\n]+(?P<val>.+?)\n", Text),
            ("description", r"(owner):[^\S\n]+(?P<val>.+?)(?P<stop>\n\S)", Text),
            ("country", r"(country):[^\S\n]+(?P<val>.+?)\n", Country),
            ("emails", EMAIL_PATTERN, List),
            ("created", r"(created):[^\S\n]+(?P<val>[0-9]+?)\n", Timestamp),
            ("updated", r"(changed):[^\S\n]+(?P<val>[0-9]+?)\n", Timestamp),
        ],
        Some(DatePolicy::new("%Y%m%d")),
    )
});

static AFRINIC: Lazy<FieldTable> = Lazy::new(|| {
    compile(
        &[
            ("name", r"(netname):[^\S\n]+(?P<val>.+?)\n", Text),
            ("handle", r"(nic-hdl):[^\S\n]+(?P<val>.+?)\n", Text),
            ("description", r"(descr):[^\S\n]+(?P<val>.+?)(?P<stop>\n\S)", Text),
            ("country", r"(country):[^\S\n]+(?P<val>.+?)\n", Country),
            ("address", r"(address):[^\S\n]+(?P<val>.+?)(?P<stop>\n\S)", Text),
            ("emails", EMAIL_PATTERN, List),
        ],
        None,
    )
});

/// Generic RWHOIS `network:` record fields
pub static RWHOIS: Lazy<FieldTable> = Lazy::new(|| {
    compile(
        &[
            ("cidr", r"(network:IP-Network):(?P<val>.+?)\n", Text),
            ("name", r"(network:ID):(?P<val>.+?)\n", Text),
            ("description", r"(network:(Org-Name|Organization(;I)?)):(?P<val>.+?)\n", Text),
            ("country", r"(network:(Country|Country-Code)):(?P<val>.+?)\n", Country),
            ("state", r"(network:State):(?P<val>.+?)\n", Text),
            ("city", r"(network:City):(?P<val>.+?)\n", Text),
            ("address", r"(network:Street-Address):(?P<val>.+?)\n", Text),
            ("postal_code", r"(network:Postal-Code):(?P<val>.+?)\n", Text),
            ("emails", EMAIL_PATTERN, List),
            ("created", r"(network:Created):(?P<val>.+?)\n", Timestamp),
            ("updated", r"(network:Updated):(?P<val>.+?)\n", Timestamp),
        ],
        None,
    )
});

/// Field table for a registry's WHOIS output
pub fn rir_fields(rir: Rir) -> &'static FieldTable {
    match rir {
        Rir::Arin => &ARIN,
        Rir::RipeNcc => &RIPENCC,
        Rir::Apnic => &APNIC,
        Rir::Lacnic => &LACNIC,
        Rir::Afrinic => &AFRINIC,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ipwhois_parse::{parse_fields, Bounds};

    #[test]
    fn test_tables_compile() {
        for rir in Rir::ALL {
            assert!(rir_fields(rir).names().any(|name| name == "emails"));
        }
        assert_eq!(RWHOIS.fields.len(), 11);
    }

    #[test]
    fn test_ripencc_fields() {
        let text = "inetnum:        193.0.0.0 - 193.0.7.255\n\
netname:        RIPE-NCC\n\
descr:          RIPE Network Coordination Centre\n\
descr:          Amsterdam, Netherlands\n\
country:        nl\n\
created:        2003-03-17T12:15:57Z\n\
last-modified:  2017-12-04T14:42:31Z\n\
source:         RIPE\n";

        let fields = parse_fields(text, rir_fields(Rir::RipeNcc), Bounds::all(), None);
        assert_eq!(fields.text("name"), Some("RIPE-NCC"));
        assert_eq!(
            fields.text("description"),
            Some("RIPE Network Coordination Centre\nAmsterdam, Netherlands")
        );
        assert_eq!(fields.text("country"), Some("NL"));
        assert_eq!(fields.text("created"), Some("2003-03-17T12:15:57"));
        assert_eq!(fields.text("updated"), Some("2017-12-04T14:42:31"));
    }

    #[test]
    fn test_apnic_changed_date() {
        let text = "netname:  APNIC-LABS\nchanged:  hm-changed@apnic.net 20160520\nsource: APNIC\n";
        let fields = parse_fields(text, rir_fields(Rir::Apnic), Bounds::all(), None);
        assert_eq!(fields.text("updated"), Some("2016-05-20T00:00:00"));
        assert_eq!(fields.list("emails"), Some(vec!["hm-changed@apnic.net".to_string()]));
    }

    #[test]
    fn test_lacnic_dates() {
        let text = "owner:    Example SA\nownerid:  BR-EXSA-LACNIC\ncreated:  19980101\nchanged:  20170808\n";
        let fields = parse_fields(text, rir_fields(Rir::Lacnic), Bounds::all(), None);
        assert_eq!(fields.text("description"), Some("Example SA"));
        assert_eq!(fields.text("created"), Some("1998-01-01T00:00:00"));
        assert_eq!(fields.text("updated"), Some("2017-08-08T00:00:00"));
    }

    #[test]
    fn test_rwhois_fields() {
        let text = "network:ID:NET-EXAMPLE-1\n\
network:Org-Name:Example Hosting\n\
network:IP-Network:192.0.2.0/24\n\
network:Country-Code:us\n\
network:Created:20100101\n";
        let fields = parse_fields(text, &RWHOIS, Bounds::all(), None);
        assert_eq!(fields.text("name"), Some("NET-EXAMPLE-1"));
        assert_eq!(fields.text("description"), Some("Example Hosting"));
        assert_eq!(fields.text("cidr"), Some("192.0.2.0/24"));
        assert_eq!(fields.text("country"), Some("US"));
        assert_eq!(fields.text("created"), Some("20100101"));
    }
}
