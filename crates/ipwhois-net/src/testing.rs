//! In-memory backends for offline tests
//!
//! Each stub answers from per-key queues first, then from a sticky default
//! response, and records every call it receives.

use crate::backend::{
    Clock, DnsBackend, DnsFailure, FetchError, HttpFetcher, HttpReply, HttpRequest,
    WhoisConnector,
};
use crate::transport::Transport;
use async_trait::async_trait;
use ipwhois_core::config::LookupConfig;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

struct Script<T: Clone> {
    queued: HashMap<String, VecDeque<T>>,
    sticky: HashMap<String, T>,
}

impl<T: Clone> Default for Script<T> {
    fn default() -> Self {
        Self {
            queued: HashMap::new(),
            sticky: HashMap::new(),
        }
    }
}

impl<T: Clone> Script<T> {
    fn next(&mut self, key: &str) -> Option<T> {
        if let Some(item) = self.queued.get_mut(key).and_then(VecDeque::pop_front) {
            return Some(item);
        }
        self.sticky.get(key).cloned()
    }
}

type WhoisOutcome = Result<Vec<u8>, io::ErrorKind>;

/// Scripted WHOIS server, keyed by host name
#[derive(Default)]
pub struct StubWhois {
    script: Mutex<Script<WhoisOutcome>>,
    calls: Mutex<Vec<(String, u16, String)>>,
}

impl StubWhois {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every query to `server` with `text` once queued items run out
    pub fn respond(&self, server: &str, text: &str) {
        self.respond_bytes(server, text.as_bytes().to_vec());
    }

    pub fn respond_bytes(&self, server: &str, bytes: Vec<u8>) {
        let mut script = self.script.lock().unwrap();
        script.sticky.insert(server.to_string(), Ok(bytes));
    }

    /// Queue a one-off answer
    pub fn push(&self, server: &str, text: &str) {
        let mut script = self.script.lock().unwrap();
        script
            .queued
            .entry(server.to_string())
            .or_default()
            .push_back(Ok(text.as_bytes().to_vec()));
    }

    /// Queue a one-off socket error
    pub fn push_err(&self, server: &str, kind: io::ErrorKind) {
        let mut script = self.script.lock().unwrap();
        script
            .queued
            .entry(server.to_string())
            .or_default()
            .push_back(Err(kind));
    }

    /// Every (server, port, query) received
    pub fn calls(&self) -> Vec<(String, u16, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl WhoisConnector for StubWhois {
    async fn exchange(
        &self,
        server: &str,
        port: u16,
        query: &str,
        _timeout: Duration,
    ) -> io::Result<Vec<u8>> {
        self.calls
            .lock()
            .unwrap()
            .push((server.to_string(), port, query.to_string()));

        let outcome = self.script.lock().unwrap().next(server);
        match outcome {
            Some(Ok(bytes)) => Ok(bytes),
            Some(Err(kind)) => Err(io::Error::new(kind, "scripted WHOIS failure")),
            None => Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("no scripted response for {}", server),
            )),
        }
    }
}

type HttpOutcome = Result<HttpReply, FetchError>;

/// Scripted HTTP server, keyed by exact URL; unknown URLs get a 404
#[derive(Default)]
pub struct StubHttp {
    script: Mutex<Script<HttpOutcome>>,
    calls: Mutex<Vec<HttpRequest>>,
}

impl StubHttp {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sticky reply for `url`
    pub fn respond(&self, url: &str, status: u16, body: &str) {
        self.respond_bytes(url, status, body.as_bytes().to_vec());
    }

    pub fn respond_bytes(&self, url: &str, status: u16, body: Vec<u8>) {
        let mut script = self.script.lock().unwrap();
        script
            .sticky
            .insert(url.to_string(), Ok(HttpReply::new(status, body)));
    }

    /// Sticky JSON reply with status 200
    pub fn respond_json(&self, url: &str, json: &serde_json::Value) {
        self.respond(url, 200, &json.to_string());
    }

    /// Queue a one-off reply
    pub fn push(&self, url: &str, status: u16, body: &str) {
        self.enqueue(url, Ok(HttpReply::new(status, body)));
    }

    /// Queue a one-off empty reply with the given status
    pub fn push_status(&self, url: &str, status: u16) {
        self.push(url, status, "");
    }

    /// Queue a one-off transport failure
    pub fn push_failure(&self, url: &str) {
        self.enqueue(
            url,
            Err(FetchError::Transport("scripted connection reset".to_string())),
        );
    }

    fn enqueue(&self, url: &str, outcome: HttpOutcome) {
        let mut script = self.script.lock().unwrap();
        script
            .queued
            .entry(url.to_string())
            .or_default()
            .push_back(outcome);
    }

    pub fn calls(&self) -> Vec<HttpRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Requests made to one URL
    pub fn calls_to(&self, url: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.url == url)
            .count()
    }
}

#[async_trait]
impl HttpFetcher for StubHttp {
    async fn fetch(&self, request: &HttpRequest) -> Result<HttpReply, FetchError> {
        self.calls.lock().unwrap().push(request.clone());

        let outcome = self.script.lock().unwrap().next(&request.url);
        outcome.unwrap_or_else(|| Ok(HttpReply::new(404, "")))
    }
}

/// Scripted DNS answers
#[derive(Default)]
pub struct StubDns {
    txt: Mutex<HashMap<String, Result<Vec<String>, DnsFailure>>>,
    ptr: Mutex<HashMap<IpAddr, Result<Vec<String>, DnsFailure>>>,
    calls: Mutex<Vec<String>>,
}

impl StubDns {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answer_txt(&self, name: &str, answers: &[&str]) {
        self.txt.lock().unwrap().insert(
            name.to_string(),
            Ok(answers.iter().map(|a| a.to_string()).collect()),
        );
    }

    pub fn fail_txt(&self, name: &str, failure: DnsFailure) {
        self.txt
            .lock()
            .unwrap()
            .insert(name.to_string(), Err(failure));
    }

    pub fn answer_ptr(&self, addr: IpAddr, names: &[&str]) {
        self.ptr.lock().unwrap().insert(
            addr,
            Ok(names.iter().map(|n| n.to_string()).collect()),
        );
    }

    pub fn fail_ptr(&self, addr: IpAddr, failure: DnsFailure) {
        self.ptr.lock().unwrap().insert(addr, Err(failure));
    }

    /// Every name queried (PTR queries recorded as the address)
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl DnsBackend for StubDns {
    async fn txt(&self, name: &str) -> Result<Vec<String>, DnsFailure> {
        self.calls.lock().unwrap().push(name.to_string());
        self.txt
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .unwrap_or(Err(DnsFailure::NxDomain))
    }

    async fn reverse(&self, addr: IpAddr) -> Result<Vec<String>, DnsFailure> {
        self.calls.lock().unwrap().push(addr.to_string());
        self.ptr
            .lock()
            .unwrap()
            .get(&addr)
            .cloned()
            .unwrap_or(Err(DnsFailure::NxDomain))
    }
}

/// Clock that only moves when slept on or advanced
pub struct ManualClock {
    base: Instant,
    elapsed: Mutex<Duration>,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            elapsed: Mutex::new(Duration::ZERO),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.elapsed.lock().unwrap() += by;
    }

    /// Every sleep requested, in order
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }

    pub fn total_slept(&self) -> Duration {
        self.sleeps.lock().unwrap().iter().sum()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.elapsed.lock().unwrap()
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
        self.advance(duration);
    }
}

/// Stub backends wired into a [`Transport`]
pub struct StubNetwork {
    pub whois: Arc<StubWhois>,
    pub http: Arc<StubHttp>,
    pub dns: Arc<StubDns>,
    pub clock: Arc<ManualClock>,
    pub transport: Transport,
}

impl StubNetwork {
    pub fn new() -> Self {
        Self::with_config(LookupConfig::new())
    }

    pub fn with_config(config: LookupConfig) -> Self {
        let whois = Arc::new(StubWhois::new());
        let http = Arc::new(StubHttp::new());
        let dns = Arc::new(StubDns::new());
        let clock = Arc::new(ManualClock::new());
        let transport = Transport::from_parts(
            config,
            whois.clone(),
            http.clone(),
            dns.clone(),
            clock.clone(),
        );

        Self {
            whois,
            http,
            dns,
            clock,
            transport,
        }
    }
}

impl Default for StubNetwork {
    fn default() -> Self {
        Self::new()
    }
}
