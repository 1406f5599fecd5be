use ipwhois_core::{LookupTarget, Rir};
use ipwhois_net::testing::StubNetwork;
use ipwhois_net::Net;
use ipwhois_whois::{Whois, WhoisOptions};

const ARIN_TWO_BLOCKS: &str = "\
#
# ARIN WHOIS data and services are subject to the Terms of Use
#

NetRange:       74.125.0.0 - 74.125.255.255
CIDR:           74.125.0.0/16
NetName:        GOOGLE
NetHandle:      NET-74-125-0-0-1
Parent:         NET74 (NET-74-0-0-0-0)
NetType:        Direct Allocation
Organization:   Google LLC (GOGL)
RegDate:        2007-03-13
Updated:        2012-02-24

OrgName:        Google LLC
OrgId:          GOGL
Address:        1600 Amphitheatre Parkway
Address:        Building 40
City:           Mountain View
StateProv:      CA
PostalCode:     94043
Country:        US
OrgAbuseEmail:  network-abuse@google.com

NetRange:       74.125.225.0 - 74.125.225.255
CIDR:           74.125.225.0/24
NetName:        GOOGLE-CUSTOMER
NetHandle:      NET-74-125-225-0-1
RegDate:        2011-06-01
Updated:        2011-06-02

CustName:       Example Customer
Address:        1 Main Street
City:           Springfield
StateProv:      IL
PostalCode:     62701
Country:        us
OrgTechEmail:   noc@example.com

";

fn offline() -> Whois {
    let stub = StubNetwork::new();
    let target = LookupTarget::parse("74.125.225.229").unwrap();
    Whois::new(Net::with_transport(target, stub.transport.clone()))
}

#[tokio::test]
async fn test_arin_two_blocks_end_to_end() {
    let result = offline()
        .lookup(Rir::Arin, &WhoisOptions::offline(ARIN_TWO_BLOCKS))
        .await
        .unwrap();

    assert_eq!(result.nets.len(), 2);

    let first = &result.nets[0];
    assert_eq!(first.cidr.as_deref(), Some("74.125.0.0/16"));
    assert_eq!(first.range.as_deref(), Some("74.125.0.0 - 74.125.255.255"));
    assert_eq!(first.name.as_deref(), Some("GOOGLE"));
    assert_eq!(first.handle.as_deref(), Some("NET-74-125-0-0-1"));
    assert_eq!(first.description.as_deref(), Some("Google LLC"));
    assert_eq!(first.country.as_deref(), Some("US"));
    assert_eq!(first.state.as_deref(), Some("CA"));
    assert_eq!(first.city.as_deref(), Some("Mountain View"));
    assert_eq!(
        first.address.as_deref(),
        Some("1600 Amphitheatre Parkway\nBuilding 40")
    );
    assert_eq!(first.postal_code.as_deref(), Some("94043"));
    assert_eq!(first.emails, Some(vec!["network-abuse@google.com".to_string()]));
    assert_eq!(first.created.as_deref(), Some("2007-03-13T00:00:00"));
    assert_eq!(first.updated.as_deref(), Some("2012-02-24T00:00:00"));

    let second = &result.nets[1];
    assert_eq!(second.cidr.as_deref(), Some("74.125.225.0/24"));
    assert_eq!(second.range.as_deref(), Some("74.125.225.0 - 74.125.225.255"));
    assert_eq!(second.name.as_deref(), Some("GOOGLE-CUSTOMER"));
    assert_eq!(second.description.as_deref(), Some("Example Customer"));
    assert_eq!(second.country.as_deref(), Some("US"));
    assert_eq!(second.address.as_deref(), Some("1 Main Street"));
    assert_eq!(second.emails, Some(vec!["noc@example.com".to_string()]));
    assert_eq!(second.created.as_deref(), Some("2011-06-01T00:00:00"));
}

#[tokio::test]
async fn test_result_has_no_section_offsets() {
    let result = offline()
        .lookup(Rir::Arin, &WhoisOptions::offline(ARIN_TWO_BLOCKS))
        .await
        .unwrap();

    let json = serde_json::to_value(&result).unwrap();
    for net in json["nets"].as_array().unwrap() {
        let object = net.as_object().unwrap();
        assert!(!object.contains_key("start"));
        assert!(!object.contains_key("end"));
        assert!(!object.contains_key("section"));
    }
    assert!(json.get("raw").is_none());
}

#[tokio::test]
async fn test_field_list_limits_parsing() {
    let options = WhoisOptions {
        field_list: Some(vec!["name", "country"]),
        ..WhoisOptions::offline(ARIN_TWO_BLOCKS)
    };
    let result = offline().lookup(Rir::Arin, &options).await.unwrap();

    assert_eq!(result.nets[0].name.as_deref(), Some("GOOGLE"));
    assert_eq!(result.nets[0].country.as_deref(), Some("US"));
    assert!(result.nets[0].address.is_none());
    assert!(result.nets[0].emails.is_none());
    // CIDR and range come from sectioning, not the field list.
    assert!(result.nets[0].cidr.is_some());
}
