//! Error taxonomy for a harvesting session.
//!
//! Each stage of the pipeline has its own error type; [`ScrapeError`] wraps
//! them so the orchestrator and `main` can propagate with `?`. Transient
//! network failures never show up here directly: they are retried inside the
//! fetcher and only surface as [`FetchError::Exhausted`].

use crate::http::TransportError;
use thiserror::Error;

/// A required setting is absent or invalid. Fatal at session start.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("missing required setting `{0}`")]
    MissingKey(String),
    #[error("invalid setting `{key}`: {reason}")]
    Invalid { key: String, reason: String },
}

/// The proxy candidate source could not be used.
#[derive(Debug, Error)]
pub enum ProxySourceError {
    #[error("proxy source not found: {0}")]
    NotFound(String),
    #[error("proxy source is empty: {0}")]
    Empty(String),
    #[error("failed to read proxy source {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to fetch proxy source {url}: {reason}")]
    Fetch { url: String, reason: String },
}

/// Acquisition failures, all fatal to the session.
#[derive(Debug, Error)]
pub enum AcquireError {
    #[error(transparent)]
    Source(#[from] ProxySourceError),
    #[error("requested {requested} proxies but only {available} candidates are available")]
    InsufficientCandidates { requested: usize, available: usize },
}

/// A rotating pool was drawn from while empty.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{pool} pool is empty")]
pub struct PoolExhausted {
    pub pool: &'static str,
}

/// One logical page fetch failed.
#[derive(Debug, Error)]
pub enum FetchError {
    /// A response arrived with a non-2xx status. Never retried.
    #[error("server answered with status {status}")]
    Permanent { status: u16 },
    /// Every attempt ended in a transport failure.
    #[error("gave up after {attempts} attempt(s)")]
    Exhausted {
        attempts: u32,
        #[source]
        last: Option<TransportError>,
    },
}

/// A parser could not make sense of a page body.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("page matches neither the results layout nor the end-of-results layout")]
    UnrecognizedPage,
}

/// A page's column batch could not be aligned into rows.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FlattenError {
    #[error("column `{0}` is missing from the parsed batch")]
    MissingField(&'static str),
    #[error("columns have different lengths: {lengths:?}")]
    LengthMismatch { lengths: Vec<(&'static str, usize)> },
    #[error("row {index} has an unparseable added_date `{value}`")]
    InvalidDate { index: usize, value: String },
}

/// The catalog store failed.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("catalog I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("catalog file {path} is corrupt: {source}")]
    Corrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Reconciliation could not query the catalog. The scraped batch is untouched.
#[derive(Debug, Error)]
#[error("reconciliation failed: {0}")]
pub struct ReconcileError(#[from] pub StoreError);

/// Anything that stops a session or a page-range run.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Acquire(#[from] AcquireError),
    #[error(transparent)]
    Pool(#[from] PoolExhausted),
    #[error("page {page}: {source}")]
    Fetch {
        page: u32,
        #[source]
        source: FetchError,
    },
    #[error("page {page}: {source}")]
    Parse {
        page: u32,
        #[source]
        source: ParseError,
    },
    #[error("page {page}: {source}")]
    Flatten {
        page: u32,
        #[source]
        source: FlattenError,
    },
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
    #[error(transparent)]
    Store(#[from] StoreError),
}
