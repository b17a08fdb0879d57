//! # Listing Harvest
//!
//! Harvests vehicle listings from rate-limited Czech car marketplaces
//! (AAA Auto, SAuto, TipCars), routing every page request through a rotating
//! pool of verified egress proxies, and keeps only the listings that are not
//! yet in the catalog.
//!
//! ## Usage
//!
//! ```sh
//! listing_harvest -c harvest.yaml scrape --site sauto --start 1 --end 20 --insert
//! ```
//!
//! ## Architecture
//!
//! A scrape session is a single sequential pipeline:
//! 1. **Acquire**: sample candidate proxies from the configured source
//! 2. **Check**: probe the candidates and keep the ones that answer
//! 3. **Scrape**: walk the page range, rotating proxies and user agents per
//!    page, under a burst-then-stall request budget with retrying fetches
//! 4. **Reconcile**: diff the scraped listings against the catalog
//! 5. **Output**: optionally insert the new listings and export them as JSON

use chrono::Local;
use clap::Parser as _;
use std::error::Error;
use tracing::{debug, error, info, instrument, warn};

mod cli;
mod config;
mod error;
mod fetcher;
mod http;
mod logging;
mod models;
mod orchestrator;
mod outputs;
mod pool;
mod proxy;
mod reconcile;
mod scrapers;
mod store;
mod throttle;
mod utils;

#[cfg(test)]
mod testing;

use cli::{Cli, Command, ScrapeArgs};
use config::Config;
use error::ScrapeError;
use fetcher::RetryingFetcher;
use http::ReqwestTransport;
use models::VerifiedProxy;
use orchestrator::{Orchestrator, StopReason};
use outputs::json;
use pool::RotatingPool;
use proxy::{health, ProxyAcquirer, ProxyHealthChecker, ProxySource};
use scrapers::Site;
use store::{CatalogStore, JsonFileStore, RecordFilter};
use throttle::{Throttle, TokioClock};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let start_time = std::time::Instant::now();
    let args = Cli::parse();

    // --- Tracing init ---
    // the log directory comes from the config, so load it first
    let config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            logging::init(None)?;
            error!(error = %e, "Cannot start session");
            return Err(e.into());
        }
    };
    let _log_guards = logging::init(config.logging.dir.as_deref())?;
    info!("listing_harvest starting up");
    debug!(config = %args.config.display(), command = ?args.command, "Parsed CLI arguments");
    info!(
        path = %args.config.display(),
        sites = config.sites.len(),
        log_dir = ?config.logging.dir,
        "Loaded configuration"
    );

    let store = JsonFileStore::new(&config.catalog.path);

    let result = match args.command {
        Command::Scrape(scrape) => run_scrape(&config, &store, scrape).await,
        Command::CheckProxies { site, proxies } => run_check_proxies(&config, site, proxies).await,
        Command::Show => show_catalog(&store).await,
        Command::Purge => purge_catalog(&store).await,
    };

    if let Err(e) = &result {
        error!(error = %e, "Session failed");
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );
    result
}

async fn run_check_proxies(
    config: &Config,
    site: Option<Site>,
    desired: Option<usize>,
) -> Result<(), Box<dyn Error>> {
    let (source, check_url) = config.proxy_endpoints(site)?;
    let transport = ReqwestTransport::new(config.fetch_timeout());
    let verified = verify_proxies(config, &transport, source, &check_url, desired).await?;
    for proxy in &verified {
        println!("{}\t{}", proxy.address, proxy.egress);
    }
    info!(count = verified.len(), "Verified proxies");
    Ok(())
}

async fn show_catalog(store: &JsonFileStore) -> Result<(), Box<dyn Error>> {
    let records = store.read(&RecordFilter::All).await?;
    println!("{}", serde_json::to_string_pretty(&records)?);
    info!(count = records.len(), "Listed catalog");
    Ok(())
}

async fn purge_catalog(store: &JsonFileStore) -> Result<(), Box<dyn Error>> {
    let removed = store.delete_all().await?;
    println!("Removed {removed} record(s)");
    Ok(())
}

/// Acquire candidates and keep the ones that pass the probe.
async fn verify_proxies(
    config: &Config,
    transport: &ReqwestTransport,
    source: ProxySource,
    check_url: &str,
    desired: Option<usize>,
) -> Result<Vec<VerifiedProxy>, ScrapeError> {
    let candidates = ProxyAcquirer::new(source, config.settings().proxy_count, transport)
        .acquire(desired)
        .await?;
    let results = ProxyHealthChecker::new(transport)
        .with_concurrency(config.proxy.probe_concurrency)
        .check(&candidates, check_url, config.probe_timeout())
        .await;
    Ok(health::verified(&results))
}

/// One full session: proxies, page range, reconciliation, then output.
#[instrument(level = "info", skip_all, fields(site = %args.site, start = args.start, end = args.end))]
async fn run_scrape(config: &Config, store: &JsonFileStore, args: ScrapeArgs) -> Result<(), Box<dyn Error>> {
    args.validate()?;
    let settings = config.settings();
    let profile = config.site(args.site)?;

    let transport = ReqwestTransport::new(config.fetch_timeout());
    let verified = verify_proxies(
        config,
        &transport,
        profile.proxy_source.clone(),
        &profile.check_url,
        args.proxies,
    )
    .await?;
    let proxy_pool = RotatingPool::new("proxy", verified);
    let header_pool = RotatingPool::new("header", profile.header_sets.clone());
    if proxy_pool.is_empty() {
        warn!("No proxy passed the health check; the run will stop at the first page");
    }
    info!(proxies = proxy_pool.len(), header_sets = header_pool.len(), "Built rotating pools");

    let fetcher = RetryingFetcher::new(transport, Throttle::new(settings.budget(), TokioClock), TokioClock);
    let mut orchestrator = Orchestrator::new(
        fetcher,
        proxy_pool,
        header_pool,
        args.site.parser(Local::now().date_naive()),
        profile.base_url.clone(),
        settings.attempts,
    );

    let report = orchestrator.run(args.start, args.end, store).await;
    debug!(
        calls_made = orchestrator.fetcher().throttle().budget().calls_made,
        "Request budget after run"
    );
    if report.stop.is_halt() {
        warn!(records = report.records.len(), "Run halted early; keeping the listings scraped so far");
    }
    match &report.stop {
        StopReason::Completed => println!("Scraped pages {}-{}", args.start, args.end),
        StopReason::EndOfResults { page } => println!("No more results at page {page}"),
        StopReason::Halted { page, error } => println!("Stopped at page {page}: {error}"),
    }
    println!(
        "Fetched {} page(s), {} listing(s)",
        report.pages_fetched,
        report.records.len()
    );

    let delta = match report.delta {
        Ok(delta) => delta,
        Err(e) => {
            // keep what was scraped so it can be reconciled later
            if let Some(dir) = &args.export {
                let path = json::write_delta(&report.records, args.site, dir, Local::now().naive_local()).await?;
                warn!(path = %path.display(), "Catalog unreachable; exported all scraped listings instead");
            }
            return Err(e.into());
        }
    };
    println!("{} new listing(s)", delta.len());

    if args.insert && !delta.is_empty() {
        let inserted = store.insert(delta.records()).await?;
        println!("Inserted {inserted} listing(s) into {}", store.path().display());
    }
    if let Some(dir) = &args.export {
        let path = json::write_delta(delta.records(), args.site, dir, Local::now().naive_local()).await?;
        println!("Exported to {}", path.display());
    }
    Ok(())
}
