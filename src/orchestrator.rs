//! Page-range driver.
//!
//! For every page in `[start, end]` the orchestrator draws one proxy and one
//! header set, fetches `base_url + page`, hands the body to the site parser
//! and flattens the resulting batch. Any failure stops the whole run: pages
//! are never skipped. Records gathered before the stop are kept and
//! reconciled against the catalog once, at the end. Both pools start over
//! from their first item on every run.

use crate::error::{ReconcileError, ScrapeError};
use crate::fetcher::RetryingFetcher;
use crate::http::HttpTransport;
use crate::models::{HeaderSet, ListingRecord, VerifiedProxy};
use crate::pool::RotatingPool;
use crate::reconcile::{InsertDelta, ReconciliationEngine};
use crate::scrapers::{PageParse, Parser};
use crate::store::CatalogStore;
use crate::throttle::Clock;
use std::time::Instant;
use tracing::{error, info, instrument};

/// Why the page loop ended.
#[derive(Debug)]
pub enum StopReason {
    /// Every page in the range was scraped.
    Completed,
    /// The site reported no more results on `page`.
    EndOfResults { page: u32 },
    /// `page` failed; later pages were not attempted.
    Halted { page: u32, error: ScrapeError },
}

impl StopReason {
    pub fn is_halt(&self) -> bool {
        matches!(self, StopReason::Halted { .. })
    }
}

/// Outcome of one page-range run.
#[derive(Debug)]
pub struct RunReport {
    /// Pages whose body was downloaded, including an end-of-results page.
    pub pages_fetched: u32,
    /// Every record scraped before the run stopped.
    pub records: Vec<ListingRecord>,
    pub stop: StopReason,
    /// The records absent from the catalog, or why the catalog could not be queried.
    pub delta: Result<InsertDelta, ReconcileError>,
}

pub struct Orchestrator<T, C> {
    fetcher: RetryingFetcher<T, C>,
    proxies: RotatingPool<VerifiedProxy>,
    headers: RotatingPool<HeaderSet>,
    parser: Box<dyn Parser>,
    base_url: String,
    attempts: u32,
}

impl<T, C> Orchestrator<T, C>
where
    T: HttpTransport,
    C: Clock + Clone,
{
    pub fn new(
        fetcher: RetryingFetcher<T, C>,
        proxies: RotatingPool<VerifiedProxy>,
        headers: RotatingPool<HeaderSet>,
        parser: Box<dyn Parser>,
        base_url: impl Into<String>,
        attempts: u32,
    ) -> Self {
        Self {
            fetcher,
            proxies,
            headers,
            parser,
            base_url: base_url.into(),
            attempts,
        }
    }

    pub fn fetcher(&self) -> &RetryingFetcher<T, C> {
        &self.fetcher
    }

    /// Scrape `[start, end]` and reconcile what was found against `store`.
    ///
    /// Never fails as a whole: a page failure ends the loop and is reported
    /// in [`RunReport::stop`], a catalog failure in [`RunReport::delta`].
    #[instrument(level = "info", skip_all, fields(start = start, end = end, base_url = %self.base_url))]
    pub async fn run<S: CatalogStore>(&mut self, start: u32, end: u32, store: &S) -> RunReport {
        let t0 = Instant::now();
        let mut records = Vec::new();
        let mut pages_fetched = 0;
        let mut stop = StopReason::Completed;
        self.proxies.restart();
        self.headers.restart();

        for page in start..=end {
            let body = match self.fetch_page(page).await {
                Ok(body) => body,
                Err(error) => {
                    error!(page, error = %error, "Page fetch failed; stopping run");
                    stop = StopReason::Halted { page, error };
                    break;
                }
            };
            pages_fetched += 1;

            match self.extract(page, &body) {
                Ok(Some(mut rows)) => {
                    info!(page, rows = rows.len(), "Scraped page");
                    records.append(&mut rows);
                }
                Ok(None) => {
                    info!(page, "No more results; stopping run");
                    stop = StopReason::EndOfResults { page };
                    break;
                }
                Err(error) => {
                    error!(page, error = %error, "Page could not be processed; stopping run");
                    stop = StopReason::Halted { page, error };
                    break;
                }
            }
        }

        info!(
            elapsed_ms = t0.elapsed().as_millis() as u64,
            pages_fetched,
            records = records.len(),
            "Finished scraping"
        );

        let delta = ReconciliationEngine::new(store).reconcile(&records).await;
        RunReport {
            pages_fetched,
            records,
            stop,
            delta,
        }
    }

    async fn fetch_page(&mut self, page: u32) -> Result<String, ScrapeError> {
        let proxy = self.proxies.next()?;
        let headers = self.headers.next()?;
        let url = format!("{}{page}", self.base_url);
        self.fetcher
            .fetch(&url, &proxy, &headers, self.attempts)
            .await
            .map_err(|source| ScrapeError::Fetch { page, source })
    }

    /// `None` when the page marks the end of results.
    fn extract(&self, page: u32, body: &str) -> Result<Option<Vec<ListingRecord>>, ScrapeError> {
        match self
            .parser
            .parse(body)
            .map_err(|source| ScrapeError::Parse { page, source })?
        {
            PageParse::EndOfResults => Ok(None),
            PageParse::Batch(batch) => batch
                .into_records()
                .map(Some)
                .map_err(|source| ScrapeError::Flatten { page, source }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FetchError, FlattenError};
    use crate::models::{ListingField, ProxyCandidate, RawBatch};
    use crate::testing::{batch_of, ok, status, ManualClock, MemoryStore, ScriptedParser, ScriptedTransport};
    use crate::throttle::{FetchBudget, Throttle};
    use std::time::Duration;

    const BASE: &str = "https://cars.example/list?page=";

    fn proxy(addr: &str) -> VerifiedProxy {
        VerifiedProxy {
            address: ProxyCandidate::new(addr),
            egress: format!("egress-of-{addr}"),
        }
    }

    fn agent(name: &str) -> HeaderSet {
        HeaderSet::from([("User-Agent".to_string(), name.to_string())])
    }

    fn orchestrator(
        transport: ScriptedTransport,
        parser: ScriptedParser,
        proxies: Vec<VerifiedProxy>,
    ) -> Orchestrator<ScriptedTransport, ManualClock> {
        let clock = ManualClock::new();
        let throttle = Throttle::new(FetchBudget::new(100, Duration::from_secs(10), 0), clock.clone());
        Orchestrator::new(
            RetryingFetcher::new(transport, throttle, clock),
            RotatingPool::new("proxy", proxies),
            RotatingPool::new("header", vec![agent("a"), agent("b")]),
            Box::new(parser),
            BASE,
            2,
        )
    }

    fn page(n: u32) -> String {
        format!("{BASE}{n}")
    }

    #[tokio::test]
    async fn test_end_of_results_stops_after_first_page() {
        let transport = ScriptedTransport::per_url(vec![
            (page(1).as_str(), ok("body-1")),
            (page(2).as_str(), ok("body-2")),
            (page(3).as_str(), ok("body-3")),
        ]);
        let parser = ScriptedParser::new(vec![
            ("body-1", PageParse::Batch(batch_of(&["A", "B"]))),
            ("body-2", PageParse::EndOfResults),
            ("body-3", PageParse::Batch(batch_of(&["C"]))),
        ]);
        let store = MemoryStore::with_urls(&["A"]);
        let mut orchestrator = orchestrator(transport, parser, vec![proxy("p1:1")]);

        let report = orchestrator.run(1, 3, &store).await;

        assert!(matches!(report.stop, StopReason::EndOfResults { page: 2 }));
        assert_eq!(report.pages_fetched, 2);
        let urls: Vec<_> = report.records.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, vec!["A", "B"]);
        let delta = report.delta.unwrap();
        assert_eq!(delta.records(), &[ListingRecord::with_url("B")]);
        assert_eq!(orchestrator.fetcher().throttle().budget().calls_made, 2);
    }

    #[tokio::test]
    async fn test_pools_rotate_per_page() {
        let transport = ScriptedTransport::per_url(vec![
            (page(1).as_str(), ok("x")),
            (page(2).as_str(), ok("x")),
            (page(3).as_str(), ok("x")),
        ]);
        let parser = ScriptedParser::new(vec![("x", PageParse::Batch(RawBatch::new()))]);
        let mut orchestrator = orchestrator(transport, parser, vec![proxy("p1:1"), proxy("p2:2")]);

        let report = orchestrator.run(1, 3, &MemoryStore::default()).await;
        assert!(matches!(report.stop, StopReason::Completed));

        let requests = orchestrator.fetcher().transport().requests();
        let proxies: Vec<_> = requests.iter().filter_map(|r| r.proxy.clone()).collect();
        assert_eq!(proxies, vec!["http://p1:1", "http://p2:2", "http://p1:1"]);
        let agents: Vec<_> = requests.iter().map(|r| r.headers["User-Agent"].clone()).collect();
        assert_eq!(agents, vec!["a", "b", "a"]);
    }

    #[tokio::test]
    async fn test_fetch_failure_halts_and_keeps_earlier_records() {
        let transport = ScriptedTransport::per_url(vec![
            (page(1).as_str(), ok("body-1")),
            (page(2).as_str(), status(503)),
            (page(3).as_str(), ok("body-1")),
        ]);
        let parser = ScriptedParser::new(vec![("body-1", PageParse::Batch(batch_of(&["A"])))]);
        let mut orchestrator = orchestrator(transport, parser, vec![proxy("p1:1")]);

        let report = orchestrator.run(1, 3, &MemoryStore::default()).await;

        assert!(matches!(
            report.stop,
            StopReason::Halted {
                page: 2,
                error: ScrapeError::Fetch {
                    source: FetchError::Permanent { status: 503 },
                    ..
                }
            }
        ));
        assert_eq!(report.pages_fetched, 1);
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.delta.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_proxy_pool_halts_before_any_request() {
        let transport = ScriptedTransport::sequence(vec![ok("x")]);
        let parser = ScriptedParser::default();
        let mut orchestrator = orchestrator(transport, parser, Vec::new());

        let report = orchestrator.run(1, 2, &MemoryStore::default()).await;

        assert!(matches!(
            report.stop,
            StopReason::Halted { page: 1, error: ScrapeError::Pool(_) }
        ));
        assert!(orchestrator.fetcher().transport().requests().is_empty());
        assert!(report.delta.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_misaligned_batch_halts_run() {
        let transport = ScriptedTransport::per_url(vec![(page(1).as_str(), ok("skewed"))]);
        let batch = batch_of(&["A", "B"]).with_column(ListingField::Price, vec![Some("1".into())]);
        let parser = ScriptedParser::new(vec![("skewed", PageParse::Batch(batch))]);
        let mut orchestrator = orchestrator(transport, parser, vec![proxy("p1:1")]);

        let report = orchestrator.run(1, 1, &MemoryStore::default()).await;

        match report.stop {
            StopReason::Halted {
                page: 1,
                error: ScrapeError::Flatten { source, .. },
            } => assert!(matches!(source, FlattenError::LengthMismatch { .. })),
            other => panic!("unexpected stop {other:?}"),
        }
        assert!(report.records.is_empty());
    }

    #[tokio::test]
    async fn test_unrecognized_page_halts_run() {
        let transport = ScriptedTransport::per_url(vec![(page(4).as_str(), ok("captcha"))]);
        let mut orchestrator = orchestrator(transport, ScriptedParser::default(), vec![proxy("p1:1")]);

        let report = orchestrator.run(4, 6, &MemoryStore::default()).await;

        assert!(report.stop.is_halt());
        assert!(matches!(report.stop, StopReason::Halted { page: 4, error: ScrapeError::Parse { .. } }));
        assert_eq!(report.pages_fetched, 1);
    }

    #[tokio::test]
    async fn test_catalog_outage_keeps_scraped_records() {
        let transport = ScriptedTransport::per_url(vec![(page(1).as_str(), ok("body-1"))]);
        let parser = ScriptedParser::new(vec![("body-1", PageParse::Batch(batch_of(&["A"])))]);
        let mut orchestrator = orchestrator(transport, parser, vec![proxy("p1:1")]);

        let report = orchestrator.run(1, 1, &MemoryStore::offline()).await;

        assert!(matches!(report.stop, StopReason::Completed));
        assert!(report.delta.is_err());
        assert_eq!(report.records, vec![ListingRecord::with_url("A")]);
    }
}
