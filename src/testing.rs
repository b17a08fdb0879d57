//! Scripted collaborators shared by the unit tests.

use crate::error::{ParseError, StoreError};
use crate::http::{HttpRequest, HttpResponse, HttpTransport, TransportError, TransportErrorKind};
use crate::models::{ListingRecord, RawBatch};
use crate::scrapers::{PageParse, Parser};
use crate::store::{CatalogStore, RecordFilter};
use crate::throttle::Clock;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug)]
struct ClockState {
    base: Instant,
    offset: Duration,
    sleeps: Vec<Duration>,
}

/// Virtual clock: sleeping advances time instantly and is recorded.
#[derive(Debug, Clone)]
pub struct ManualClock {
    state: Arc<Mutex<ClockState>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ClockState {
                base: Instant::now(),
                offset: Duration::ZERO,
                sleeps: Vec::new(),
            })),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.state.lock().unwrap().offset += by;
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.state.lock().unwrap().sleeps.clone()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let state = self.state.lock().unwrap();
        state.base + state.offset
    }

    async fn sleep(&self, duration: Duration) {
        let mut state = self.state.lock().unwrap();
        state.offset += duration;
        state.sleeps.push(duration);
    }
}

pub type Outcome = Result<HttpResponse, TransportError>;

pub fn ok(body: &str) -> Outcome {
    Ok(HttpResponse {
        status: 200,
        body: body.to_string(),
    })
}

pub fn status(code: u16) -> Outcome {
    Ok(HttpResponse {
        status: code,
        body: String::new(),
    })
}

pub fn fail(kind: TransportErrorKind) -> Outcome {
    Err(TransportError::new(kind, "scripted failure"))
}

/// Transport answering from a script.
///
/// Lookup order: outcome registered for the request's proxy, then for its
/// URL, then the next queued outcome.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    by_proxy: HashMap<String, Outcome>,
    by_url: HashMap<String, Outcome>,
    queue: Mutex<VecDeque<Outcome>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn sequence(outcomes: Vec<Outcome>) -> Self {
        Self {
            queue: Mutex::new(outcomes.into()),
            ..Self::default()
        }
    }

    pub fn per_proxy(outcomes: Vec<(&str, Outcome)>) -> Self {
        Self {
            by_proxy: outcomes
                .into_iter()
                .map(|(proxy, outcome)| (proxy.to_string(), outcome))
                .collect(),
            ..Self::default()
        }
    }

    pub fn per_url(outcomes: Vec<(&str, Outcome)>) -> Self {
        Self {
            by_url: outcomes
                .into_iter()
                .map(|(url, outcome)| (url.to_string(), outcome))
                .collect(),
            ..Self::default()
        }
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl HttpTransport for ScriptedTransport {
    async fn get(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(outcome) = request.proxy.as_ref().and_then(|p| self.by_proxy.get(p)) {
            return outcome.clone();
        }
        if let Some(outcome) = self.by_url.get(&request.url) {
            return outcome.clone();
        }
        self.queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| fail(TransportErrorKind::Other))
    }
}

/// Parser returning pre-built results keyed by page body.
#[derive(Debug, Default)]
pub struct ScriptedParser {
    pages: HashMap<String, PageParse>,
}

impl ScriptedParser {
    pub fn new(pages: Vec<(&str, PageParse)>) -> Self {
        Self {
            pages: pages
                .into_iter()
                .map(|(body, parse)| (body.to_string(), parse))
                .collect(),
        }
    }
}

impl Parser for ScriptedParser {
    fn parse(&self, body: &str) -> Result<PageParse, ParseError> {
        self.pages
            .get(body)
            .cloned()
            .ok_or(ParseError::UnrecognizedPage)
    }
}

/// A one-page batch holding the given URLs and nothing else.
pub fn batch_of(urls: &[&str]) -> RawBatch {
    let mut batch = RawBatch::new();
    for url in urls {
        for field in crate::models::ListingField::ALL {
            let value = match field {
                crate::models::ListingField::Url => Some(url.to_string()),
                _ => None,
            };
            batch.push(field, value);
        }
    }
    batch
}

/// In-memory catalog; can be switched offline to simulate an outage.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<Vec<ListingRecord>>,
    offline: bool,
    reads: Mutex<usize>,
}

impl MemoryStore {
    pub fn with_urls(urls: &[&str]) -> Self {
        Self {
            records: Mutex::new(urls.iter().map(|u| ListingRecord::with_url(*u)).collect()),
            ..Self::default()
        }
    }

    pub fn offline() -> Self {
        Self {
            offline: true,
            ..Self::default()
        }
    }

    pub fn reads(&self) -> usize {
        *self.reads.lock().unwrap()
    }

    pub fn urls(&self) -> Vec<String> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.url.clone())
            .collect()
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline {
            Err(StoreError::Io {
                path: "memory".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "memory store offline"),
            })
        } else {
            Ok(())
        }
    }
}

impl CatalogStore for MemoryStore {
    async fn read(&self, filter: &RecordFilter) -> Result<Vec<ListingRecord>, StoreError> {
        self.check_online()?;
        *self.reads.lock().unwrap() += 1;
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect())
    }

    async fn insert(&self, records: &[ListingRecord]) -> Result<usize, StoreError> {
        self.check_online()?;
        self.records.lock().unwrap().extend_from_slice(records);
        Ok(records.len())
    }

    async fn delete_all(&self) -> Result<usize, StoreError> {
        self.check_online()?;
        let mut records = self.records.lock().unwrap();
        let removed = records.len();
        records.clear();
        Ok(removed)
    }
}
