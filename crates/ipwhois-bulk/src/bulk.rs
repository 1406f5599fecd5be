//! Bulk ASN classification and RDAP scheduling

use crate::window::RateWindow;
use ipwhois::RdapLookup;
use ipwhois_asn::parse_fields_whois;
use ipwhois_core::utils::unique_everseen;
use ipwhois_core::{AsnRecord, LookupError, LookupTarget, Result, Rir};
use ipwhois_net::net::CYMRU_WHOIS;
use ipwhois_net::{Net, Transport, WhoisQuery, WhoisStage, WHOIS_PORT};
use ipwhois_rdap::{Rdap, RdapOptions};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;
use tracing::{debug, warn};

/// Registries in scheduling order; LACNIC has the tightest limits and goes
/// first
pub const REGISTRY_ORDER: [Rir; 5] = [Rir::Lacnic, Rir::RipeNcc, Rir::Apnic, Rir::Afrinic, Rir::Arin];

/// Classify many addresses with one Cymru WHOIS session
///
/// Returns the raw verbose bulk output: a header line, then one
/// `ASN | IP | CIDR | CC | REGISTRY | DATE | DESCRIPTION` line per address.
pub async fn get_bulk_asn_whois<S: AsRef<str>>(
    transport: &Transport,
    addresses: &[S],
    retry_count: u32,
) -> Result<String> {
    let listing = addresses
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join("\n");

    transport
        .whois_query(&WhoisQuery {
            server: CYMRU_WHOIS,
            port: WHOIS_PORT,
            query: format!("begin\nverbose\n{}\nend", listing),
            retry_count,
            stage: WhoisStage::Asn,
            subject: "bulk",
            extra_blacklist: &[],
        })
        .await
        .map_err(|e| match e {
            LookupError::AsnLookup(_) => LookupError::AsnLookup("ASN bulk lookup failed.".to_string()),
            other => other,
        })
}

/// Options for [`bulk_lookup_rdap`]
#[derive(Debug, Clone)]
pub struct BulkOptions {
    pub inc_raw: bool,
    /// RDAP attempts per address, spread over scheduling passes
    pub retry_count: u32,
    /// Attempts for the bulk ASN query
    pub asn_retry_count: u32,
    pub depth: u32,
    pub excluded_entities: Vec<String>,
    /// Length of each registry's request window
    pub rate_limit_timeout: Duration,
}

impl Default for BulkOptions {
    fn default() -> Self {
        Self {
            inc_raw: false,
            retry_count: 3,
            asn_retry_count: 3,
            depth: 0,
            excluded_entities: Vec::new(),
            rate_limit_timeout: Duration::from_secs(60),
        }
    }
}

/// Outcome counters for one registry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryStats {
    /// Addresses that used up their attempts
    pub failed: Vec<String>,
    /// Addresses that hit a rate limit at least once
    pub rate_limited: Vec<String>,
    /// Addresses classified to this registry
    pub total: usize,
}

/// Statistics for a bulk run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkStats {
    pub ip_input_total: usize,
    pub ip_unique_total: usize,
    /// Addresses with a usable ASN record
    pub ip_lookup_total: usize,
    #[serde(flatten)]
    pub registries: BTreeMap<Rir, RegistryStats>,
    /// Input addresses the ASN step could not place with a registry
    pub unallocated_addresses: Vec<String>,
}

impl BulkStats {
    fn new(input_total: usize, unique_total: usize) -> Self {
        Self {
            ip_input_total: input_total,
            ip_unique_total: unique_total,
            registries: REGISTRY_ORDER
                .iter()
                .map(|&rir| (rir, RegistryStats::default()))
                .collect(),
            ..Self::default()
        }
    }

    fn registry(&mut self, rir: Rir) -> &mut RegistryStats {
        self.registries.entry(rir).or_default()
    }
}

/// Results of a bulk run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkLookup {
    /// Successful lookups keyed by address
    pub results: BTreeMap<String, RdapLookup>,
    pub stats: BulkStats,
}

/// Parse verbose bulk output into records for the requested addresses
///
/// Lines whose registry is missing or unknown are skipped, which leaves those
/// addresses unallocated.
pub fn parse_bulk_asn(response: &str, wanted: &HashSet<&str>) -> Vec<(String, AsnRecord)> {
    response
        .lines()
        .skip(1)
        .filter_map(|line| {
            let ip = line.split('|').nth(1)?.trim();
            if !wanted.contains(ip) {
                return None;
            }
            match parse_fields_whois(line) {
                Ok(record) => Some((ip.to_string(), record)),
                Err(e) => {
                    debug!(address = ip, error = %e, "Bulk ASN line skipped");
                    None
                }
            }
        })
        .collect()
}

struct Scheduler<'a> {
    transport: &'a Transport,
    options: &'a BulkOptions,
    pending: Vec<(String, AsnRecord)>,
    windows: HashMap<Rir, RateWindow>,
    failures: HashMap<String, u32>,
    rate_limited: HashSet<String>,
    lookup: BulkLookup,
}

impl Scheduler<'_> {
    fn lacnic_pending(&self) -> bool {
        self.pending.iter().any(|(_, r)| r.asn_registry == Rir::Lacnic)
    }

    fn window(&mut self, rir: Rir) -> &mut RateWindow {
        let now = self.transport.clock().now();
        self.windows.entry(rir).or_insert_with(|| RateWindow::new(now))
    }

    fn is_exhausted(&self, rir: Rir) -> bool {
        let now = self.transport.clock().now();
        self.windows
            .get(&rir)
            .map(|w| w.exhausted(now, self.options.rate_limit_timeout))
            .unwrap_or(false)
    }

    fn remove(&mut self, ip: &str) -> Option<AsnRecord> {
        let index = self.pending.iter().position(|(pending, _)| pending == ip)?;
        Some(self.pending.remove(index).1)
    }

    async fn lookup_one(&self, ip: &str, record: &AsnRecord) -> Result<RdapLookup> {
        let target = LookupTarget::parse(ip)?;
        let net = Net::with_transport(target, self.transport.clone());

        // One attempt per pass; retries are counted here, across passes.
        let rdap = Rdap::new(net)
            .lookup(
                Some(record.asn_registry),
                &RdapOptions {
                    inc_raw: self.options.inc_raw,
                    retry_count: 1,
                    depth: self.options.depth,
                    excluded_entities: self.options.excluded_entities.clone(),
                    rate_limit_timeout: self.options.rate_limit_timeout,
                    ..RdapOptions::default()
                },
            )
            .await?;

        Ok(RdapLookup {
            query: rdap.query,
            asn: Some(record.clone()),
            network: rdap.network,
            entities: rdap.entities,
            objects: rdap.objects,
            nir: None,
            raw: rdap.raw,
        })
    }

    /// Count a failed attempt; once the address is out of attempts it moves
    /// to the registry's failed list
    fn record_failure(&mut self, rir: Rir, ip: &str) -> u32 {
        let failures = self.failures.entry(ip.to_string()).or_insert(0);
        *failures += 1;
        let failures = *failures;

        if failures >= self.options.retry_count.max(1) {
            self.remove(ip);
            self.lookup.stats.registry(rir).failed.push(ip.to_string());
        }
        failures
    }

    /// Work through one registry's queue until its window fills or a lookup
    /// fails; returns whether any lookup was attempted
    async fn run_registry(&mut self, rir: Rir) -> bool {
        let now = self.transport.clock().now();
        let length = self.options.rate_limit_timeout;

        if self.window(rir).expired(now, length) {
            self.window(rir).reset(now);
        }

        let queue: Vec<(String, AsnRecord)> = self
            .pending
            .iter()
            .filter(|(_, record)| record.asn_registry == rir)
            .cloned()
            .collect();

        let mut attempted = false;
        for (ip, record) in queue {
            attempted = true;
            let outcome = self.lookup_one(&ip, &record).await;
            let full = self.window(rir).record();

            match outcome {
                Ok(result) => {
                    self.remove(&ip);
                    self.lookup.results.insert(ip, result);
                    if full {
                        debug!(registry = %rir, "Request window full");
                        break;
                    }
                }
                Err(e) if e.is_rate_limit() => {
                    let attempt = self.record_failure(rir, &ip);
                    warn!(registry = %rir, address = %ip, attempt, "Rate limited, closing request window");
                    if self.rate_limited.insert(ip.clone()) {
                        self.lookup.stats.registry(rir).rate_limited.push(ip);
                    }
                    let now = self.transport.clock().now();
                    self.window(rir).saturate(now);
                    break;
                }
                Err(e) => {
                    let attempt = self.record_failure(rir, &ip);
                    debug!(registry = %rir, address = %ip, attempt, error = %e, "RDAP lookup failed");
                    break;
                }
            }
        }
        attempted
    }

    /// Sleep until the earliest window among registries with pending work
    /// reopens
    async fn wait_for_window(&self) {
        let now = self.transport.clock().now();
        let length = self.options.rate_limit_timeout;

        let wait = self
            .pending
            .iter()
            .filter_map(|(_, record)| self.windows.get(&record.asn_registry))
            .map(|window| window.remaining(now, length))
            .min()
            .unwrap_or(length);

        debug!(wait = ?wait, pending = self.pending.len(), "All request windows full, waiting");
        self.transport.clock().sleep(wait).await;
    }

    async fn run(&mut self) {
        while !self.pending.is_empty() {
            let mut attempted = false;

            for rir in REGISTRY_ORDER {
                // While LACNIC work remains, other registries only run once
                // LACNIC's window is full.
                if rir != Rir::Lacnic && self.lacnic_pending() && !self.is_exhausted(Rir::Lacnic) {
                    continue;
                }
                if self.is_exhausted(rir) {
                    continue;
                }
                attempted |= self.run_registry(rir).await;
            }

            if !attempted && !self.pending.is_empty() {
                self.wait_for_window().await;
            }
        }
    }
}

/// ASN-classify `addresses` in bulk, then look each one up over RDAP
///
/// Each registry gets at most nine requests per `rate_limit_timeout` window.
/// A rate limit closes that registry's window and its addresses wait for the
/// next one. Every request counts against the window, failed or not. A
/// failing or rate limited address is retried on later passes until it has
/// used `retry_count` attempts, without affecting other addresses. Only the bulk
/// ASN query can fail the whole run.
pub async fn bulk_lookup_rdap<S: AsRef<str>>(
    transport: &Transport,
    addresses: &[S],
    options: &BulkOptions,
) -> Result<BulkLookup> {
    let unique = unique_everseen(addresses.iter().map(|a| a.as_ref().trim().to_string()));
    let mut stats = BulkStats::new(addresses.len(), unique.len());

    let asn_response = get_bulk_asn_whois(transport, &unique, options.asn_retry_count).await?;
    let wanted: HashSet<&str> = unique.iter().map(String::as_str).collect();
    let pending = parse_bulk_asn(&asn_response, &wanted);

    for (_, record) in &pending {
        stats.registry(record.asn_registry).total += 1;
    }
    let classified: HashSet<&str> = pending.iter().map(|(ip, _)| ip.as_str()).collect();
    stats.unallocated_addresses = addresses
        .iter()
        .map(|a| a.as_ref().trim())
        .filter(|a| !classified.contains(a))
        .map(str::to_string)
        .collect();
    stats.ip_lookup_total = pending.len();

    debug!(
        total = stats.ip_input_total,
        unique = stats.ip_unique_total,
        lookups = stats.ip_lookup_total,
        unallocated = stats.unallocated_addresses.len(),
        "Bulk ASN classification done"
    );

    let mut scheduler = Scheduler {
        transport,
        options,
        pending,
        windows: HashMap::new(),
        failures: HashMap::new(),
        rate_limited: HashSet::new(),
        lookup: BulkLookup {
            results: BTreeMap::new(),
            stats,
        },
    };
    scheduler.run().await;

    Ok(scheduler.lookup)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ipwhois_net::testing::StubNetwork;
    use serde_json::json;
    use std::io;
    use tokio_test::{assert_err, assert_ok};

    const HEADER: &str = "Bulk mode; whois.cymru.com [2017-07-06 14:08:24 +0000]";

    fn cymru_line(ip: &str, registry: &str) -> String {
        format!(
            "15169   | {:<16} | 74.125.0.0/16       | US | {:<8} | 2007-03-13 | EXAMPLE-AS, US",
            ip, registry
        )
    }

    fn rdap_url(rir: Rir, ip: &str) -> String {
        ipwhois_rdap::RdapEndpoints::for_registry(rir).ip(ip)
    }

    fn network(handle: &str) -> serde_json::Value {
        json!({"handle": handle, "startAddress": "74.125.0.0", "endAddress": "74.125.255.255"})
    }

    fn arin_addresses(n: u8) -> Vec<String> {
        (1..=n).map(|i| format!("74.125.0.{}", i)).collect()
    }

    fn stub_with(lines: &[String]) -> StubNetwork {
        let stub = StubNetwork::new();
        let body = format!("{}\n{}\n", HEADER, lines.join("\n"));
        stub.whois.respond(CYMRU_WHOIS, &body);
        stub
    }

    #[test]
    fn test_parse_bulk_asn() {
        let response = format!(
            "{}\n{}\n{}\nNA      | 10.0.0.1 | NA | | | | NA\n",
            HEADER,
            cymru_line("74.125.225.229", "arin"),
            cymru_line("8.8.4.4", "arin"),
        );
        let wanted: HashSet<&str> = ["74.125.225.229", "10.0.0.1"].into_iter().collect();

        let records = parse_bulk_asn(&response, &wanted);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].0, "74.125.225.229");
        assert_eq!(records[0].1.asn_registry, Rir::Arin);
        assert_eq!(records[0].1.asn_description.as_deref(), Some("EXAMPLE-AS, US"));
    }

    #[tokio::test]
    async fn test_bulk_query_format() {
        let stub = stub_with(&[]);
        let addresses = ["1.2.3.4", "5.6.7.8"];

        assert_ok!(get_bulk_asn_whois(&stub.transport, &addresses, 1).await);
        let calls = stub.whois.calls();
        assert_eq!(calls[0].0, CYMRU_WHOIS);
        assert_eq!(calls[0].1, WHOIS_PORT);
        assert_eq!(calls[0].2, "begin\nverbose\n1.2.3.4\n5.6.7.8\nend");
    }

    #[tokio::test]
    async fn test_bulk_query_failure() {
        let stub = StubNetwork::new();
        stub.whois.push_err(CYMRU_WHOIS, io::ErrorKind::TimedOut);

        let err = assert_err!(get_bulk_asn_whois(&stub.transport, &["1.2.3.4"], 1).await);
        assert_eq!(err, LookupError::AsnLookup("ASN bulk lookup failed.".to_string()));
    }

    #[tokio::test]
    async fn test_bulk_lookup_with_unallocated() {
        let stub = stub_with(&[
            cymru_line("200.57.141.161", "lacnic"),
            cymru_line("74.125.225.229", "arin"),
            "NA      | 10.0.0.1         | NA | | | | NA".to_string(),
        ]);
        stub.http.respond_json(&rdap_url(Rir::Lacnic, "200.57.141.161"), &network("LACNIC-NET"));
        stub.http.respond_json(&rdap_url(Rir::Arin, "74.125.225.229"), &network("ARIN-NET"));

        let addresses = ["74.125.225.229", "200.57.141.161", "10.0.0.1", "74.125.225.229"];
        let lookup = assert_ok!(bulk_lookup_rdap(&stub.transport, &addresses, &BulkOptions::default()).await);

        assert_eq!(lookup.results.len(), 2);
        assert_eq!(lookup.results["200.57.141.161"].network.handle, "LACNIC-NET");
        assert!(lookup.results["74.125.225.229"].nir.is_none());

        let stats = &lookup.stats;
        assert_eq!(stats.ip_input_total, 4);
        assert_eq!(stats.ip_unique_total, 3);
        assert_eq!(stats.ip_lookup_total, 2);
        assert_eq!(stats.unallocated_addresses, vec!["10.0.0.1".to_string()]);
        assert_eq!(stats.registries[&Rir::Lacnic].total, 1);
        assert_eq!(stats.registries[&Rir::Arin].total, 1);

        // LACNIC is scheduled first.
        let calls = stub.http.calls();
        assert_eq!(calls[0].url, rdap_url(Rir::Lacnic, "200.57.141.161"));

        let value = serde_json::to_value(&lookup.stats).unwrap();
        assert_eq!(value["lacnic"]["total"], 1);
        assert!(stub.clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_window_limits_requests_per_registry() {
        let addresses = arin_addresses(10);
        let lines: Vec<String> = addresses.iter().map(|ip| cymru_line(ip, "arin")).collect();
        let stub = stub_with(&lines);
        for ip in &addresses {
            stub.http.respond_json(&rdap_url(Rir::Arin, ip), &network(ip));
        }

        let options = BulkOptions {
            rate_limit_timeout: Duration::from_secs(60),
            ..BulkOptions::default()
        };
        let lookup = assert_ok!(bulk_lookup_rdap(&stub.transport, &addresses, &options).await);

        assert_eq!(lookup.results.len(), 10);
        assert_eq!(stub.http.call_count(), 10);
        assert_eq!(stub.clock.sleeps(), vec![Duration::from_secs(60)]);
    }

    #[tokio::test]
    async fn test_rate_limit_defers_address() {
        let ip = "74.125.225.229";
        let stub = stub_with(&[cymru_line(ip, "arin")]);
        let url = rdap_url(Rir::Arin, ip);
        stub.http.push_status(&url, 429);
        stub.http.respond_json(&url, &network("ARIN-NET"));

        let options = BulkOptions {
            rate_limit_timeout: Duration::from_secs(30),
            ..BulkOptions::default()
        };
        let lookup = assert_ok!(bulk_lookup_rdap(&stub.transport, &[ip], &options).await);

        assert!(lookup.results.contains_key(ip));
        assert_eq!(lookup.stats.registries[&Rir::Arin].rate_limited, vec![ip.to_string()]);
        assert!(lookup.stats.registries[&Rir::Arin].failed.is_empty());
        assert_eq!(stub.http.calls_to(&url), 2);
        assert_eq!(stub.clock.sleeps(), vec![Duration::from_secs(30)]);
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let good = "74.125.225.229";
        let bad = "74.125.225.230";
        let stub = stub_with(&[cymru_line(bad, "arin"), cymru_line(good, "arin")]);
        stub.http.respond_json(&rdap_url(Rir::Arin, good), &network("ARIN-NET"));
        // No stubbed reply for `bad`: every attempt gets a 404.

        let options = BulkOptions {
            retry_count: 2,
            ..BulkOptions::default()
        };
        let lookup = assert_ok!(bulk_lookup_rdap(&stub.transport, &[bad, good], &options).await);

        assert_eq!(lookup.results.keys().collect::<Vec<_>>(), vec![good]);
        assert_eq!(lookup.stats.registries[&Rir::Arin].failed, vec![bad.to_string()]);
        assert_eq!(stub.http.calls_to(&rdap_url(Rir::Arin, bad)), 2);
        assert_eq!(stub.http.calls_to(&rdap_url(Rir::Arin, good)), 1);
    }

    #[tokio::test]
    async fn test_rate_limited_address_uses_up_attempts() {
        let ip = "74.125.225.229";
        let stub = stub_with(&[cymru_line(ip, "arin")]);
        let url = rdap_url(Rir::Arin, ip);
        for _ in 0..50 {
            stub.http.push_status(&url, 429);
        }
        stub.http.respond_json(&url, &network("ARIN-NET"));

        let options = BulkOptions {
            retry_count: 3,
            rate_limit_timeout: Duration::from_secs(30),
            ..BulkOptions::default()
        };
        let lookup = assert_ok!(bulk_lookup_rdap(&stub.transport, &[ip], &options).await);

        assert!(lookup.results.is_empty());
        let arin = &lookup.stats.registries[&Rir::Arin];
        assert_eq!(arin.failed, vec![ip.to_string()]);
        assert_eq!(arin.rate_limited, vec![ip.to_string()]);
        assert_eq!(stub.http.calls_to(&url), 3);
        assert_eq!(stub.clock.sleeps(), vec![Duration::from_secs(30); 2]);
    }

    #[tokio::test]
    async fn test_window_counts_failed_requests() {
        let addresses: Vec<String> = (1..=20).map(|i| format!("200.57.141.{}", i)).collect();
        let lines: Vec<String> = addresses.iter().map(|ip| cymru_line(ip, "lacnic")).collect();
        let stub = stub_with(&lines);
        for ip in &addresses {
            let url = rdap_url(Rir::Lacnic, ip);
            stub.http.push_status(&url, 500);
            stub.http.respond_json(&url, &network(ip));
        }

        let lookup = assert_ok!(bulk_lookup_rdap(&stub.transport, &addresses, &BulkOptions::default()).await);

        assert_eq!(lookup.results.len(), 20);
        assert!(lookup.stats.registries[&Rir::Lacnic].failed.is_empty());
        // 40 requests at nine per window need five windows.
        assert_eq!(stub.http.call_count(), 40);
        assert_eq!(stub.clock.sleeps(), vec![Duration::from_secs(60); 4]);
    }
}
