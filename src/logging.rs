//! Tracing setup.
//!
//! Everything goes to the console. With a log directory configured, events
//! are also written through non-blocking appenders to one file per concern:
//!
//! - `main.log`: every event
//! - `scraping.log`: throttle, fetcher, parsers, orchestrator, reconciliation
//! - `proxies.log`: acquisition, health checks, rotation
//! - `catalog.log`: catalog reads and writes
//!
//! `RUST_LOG` filters all of them, defaulting to `info`.

use std::error::Error;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::{FilterExt, LevelFilter, Targets};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt as tfmt, EnvFilter, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

const SCRAPING_TARGETS: &[&str] = &[
    "listing_harvest::throttle",
    "listing_harvest::fetcher",
    "listing_harvest::scrapers",
    "listing_harvest::orchestrator",
    "listing_harvest::reconcile",
];

const PROXY_TARGETS: &[&str] = &["listing_harvest::proxy", "listing_harvest::pool"];

const CATALOG_TARGETS: &[&str] = &["listing_harvest::store"];

/// File name stem and routed targets; `None` takes every event.
const LOG_FILES: [(&str, Option<&[&str]>); 4] = [
    ("main", None),
    ("scraping", Some(SCRAPING_TARGETS)),
    ("proxies", Some(PROXY_TARGETS)),
    ("catalog", Some(CATALOG_TARGETS)),
];

/// Install the global subscriber.
///
/// # Arguments
///
/// * `dir` - Directory for the per-concern log files, created if missing.
///   `None` logs to the console only.
///
/// # Returns
///
/// The appender guards. Keep them alive for the whole session; dropping
/// them flushes and closes the log files.
///
/// # Errors
///
/// Returns an error if the directory or a log file cannot be created.
pub fn init(dir: Option<&Path>) -> Result<Vec<WorkerGuard>, Box<dyn Error>> {
    let mut layers = vec![console_layer()];
    let mut guards = Vec::new();
    if let Some(dir) = dir {
        let (files, file_guards) = file_layers(dir)?;
        layers.extend(files);
        guards = file_guards;
    }
    tracing_subscriber::registry().with(layers).init();
    Ok(guards)
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

fn console_layer() -> BoxedLayer {
    tfmt::layer()
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(UtcTime::rfc_3339())
        .with_filter(env_filter())
        .boxed()
}

fn file_layers(dir: &Path) -> Result<(Vec<BoxedLayer>, Vec<WorkerGuard>), Box<dyn Error>> {
    std::fs::create_dir_all(dir)?;
    let mut layers = Vec::with_capacity(LOG_FILES.len());
    let mut guards = Vec::with_capacity(LOG_FILES.len());
    for (name, targets) in LOG_FILES {
        let (layer, guard) = file_layer(dir, name, targets)?;
        layers.push(layer);
        guards.push(guard);
    }
    Ok((layers, guards))
}

fn file_layer(dir: &Path, name: &str, targets: Option<&[&str]>) -> Result<(BoxedLayer, WorkerGuard), Box<dyn Error>> {
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(name)
        .filename_suffix("log")
        .build(dir)?;
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let layer = tfmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_timer(UtcTime::rfc_3339());

    let layer = match targets {
        None => layer.with_filter(env_filter()).boxed(),
        Some(targets) => {
            let routed = targets
                .iter()
                .fold(Targets::new(), |routed, target| routed.with_target(*target, LevelFilter::TRACE));
            layer.with_filter(env_filter().and(routed)).boxed()
        }
    };
    Ok((layer, guard))
}
