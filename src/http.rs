//! HTTP transport abstraction and transport-failure classification.
//!
//! The pipeline never talks to `reqwest` directly. It goes through
//! [`HttpTransport`], so the fetcher and the proxy checker can be driven by
//! scripted transports in tests.
//!
//! # Failure taxonomy
//!
//! Transport-level failures (no response at all) are classified into a fixed
//! set of [`TransportErrorKind`]s. The same taxonomy tags dead proxies in the
//! health checker and marks transient failures in the retrying fetcher.

use crate::models::HeaderSet;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::error::Error as StdError;
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, instrument, warn};

/// A single GET request.
#[derive(Debug, Clone, Default)]
pub struct HttpRequest {
    pub url: String,
    /// Proxy URL (`http://host:port`) to route through, if any.
    pub proxy: Option<String>,
    pub headers: HeaderSet,
    /// Whole-request timeout; the transport default applies when `None`.
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn via_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    pub fn with_headers(mut self, headers: HeaderSet) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A completed response, whatever its status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Why a request produced no response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    ConnectTimeout,
    Connection,
    InvalidUrl,
    Proxy,
    Tls,
    Timeout,
    TooManyRedirects,
    Other,
}

impl TransportErrorKind {
    /// Stable tag used in logs and probe results.
    pub fn as_str(self) -> &'static str {
        match self {
            TransportErrorKind::ConnectTimeout => "connect-timeout",
            TransportErrorKind::Connection => "connection-error",
            TransportErrorKind::InvalidUrl => "invalid-url",
            TransportErrorKind::Proxy => "proxy-error",
            TransportErrorKind::Tls => "tls-error",
            TransportErrorKind::Timeout => "timeout",
            TransportErrorKind::TooManyRedirects => "too-many-redirects",
            TransportErrorKind::Other => "other",
        }
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A transport-level failure: the request never produced a response.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Something that can perform a GET and hand back the status and body.
pub trait HttpTransport {
    async fn get(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// [`HttpTransport`] backed by `reqwest`.
///
/// `reqwest` fixes the proxy per client, so a client is built per request.
/// Both `http` and `https` targets are routed through the proxy. Requests
/// without a proxy go direct and ignore `HTTP(S)_PROXY` from the environment.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    default_timeout: Duration,
}

impl ReqwestTransport {
    pub fn new(default_timeout: Duration) -> Self {
        Self { default_timeout }
    }

    fn client_for(&self, request: &HttpRequest) -> Result<reqwest::Client, TransportError> {
        let mut builder = reqwest::Client::builder()
            .timeout(request.timeout.unwrap_or(self.default_timeout))
            .default_headers(header_map(&request.headers)?);
        if let Some(proxy) = &request.proxy {
            let proxy = reqwest::Proxy::all(proxy.as_str()).map_err(|e| {
                TransportError::new(TransportErrorKind::InvalidUrl, format!("bad proxy {proxy}: {e}"))
            })?;
            builder = builder.proxy(proxy);
        } else {
            builder = builder.no_proxy();
        }
        builder.build().map_err(|e| classify(&e))
    }
}

impl HttpTransport for ReqwestTransport {
    #[instrument(level = "debug", skip_all, fields(url = %request.url, proxy = ?request.proxy))]
    async fn get(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let t0 = Instant::now();
        let client = self.client_for(request)?;
        let result = async {
            let response = client.get(&request.url).send().await?;
            let status = response.status().as_u16();
            let body = response.text().await?;
            Ok::<_, reqwest::Error>(HttpResponse { status, body })
        }
        .await;
        let dt = t0.elapsed();

        match result {
            Ok(response) => {
                debug!(status = response.status, elapsed_ms = dt.as_millis() as u64, "GET completed");
                Ok(response)
            }
            Err(e) => {
                let error = classify_routed(&e, request.proxy.is_some());
                warn!(kind = %error.kind, elapsed_ms = dt.as_millis() as u64, error = %error.message, "GET failed");
                Err(error)
            }
        }
    }
}

fn header_map(headers: &HeaderSet) -> Result<HeaderMap, TransportError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
            TransportError::new(TransportErrorKind::Other, format!("bad header name {name}: {e}"))
        })?;
        let value = HeaderValue::from_str(value).map_err(|e| {
            TransportError::new(TransportErrorKind::Other, format!("bad header value: {e}"))
        })?;
        map.insert(name, value);
    }
    Ok(map)
}

/// Map a `reqwest` error onto the transport taxonomy.
///
/// `reqwest` does not expose proxy or TLS failures as distinct kinds, so
/// those are recognised from the error chain text of connect failures.
pub fn classify(error: &reqwest::Error) -> TransportError {
    let chain = error_chain(error);
    let kind = if error.is_builder() || error.url().is_some_and(|u| u.host().is_none()) {
        TransportErrorKind::InvalidUrl
    } else if error.is_redirect() {
        TransportErrorKind::TooManyRedirects
    } else if error.is_timeout() && error.is_connect() {
        TransportErrorKind::ConnectTimeout
    } else if error.is_timeout() {
        TransportErrorKind::Timeout
    } else if error.is_connect() {
        kind_from_connect_chain(&chain)
    } else {
        TransportErrorKind::Other
    };
    TransportError::new(kind, chain)
}

/// [`classify`], knowing whether the request was routed through a proxy.
///
/// A proxied request dials the proxy first, so a plain connection failure
/// means the proxy itself is unreachable and is reported as `proxy-error`.
pub fn classify_routed(error: &reqwest::Error, proxied: bool) -> TransportError {
    let mut classified = classify(error);
    if proxied && classified.kind == TransportErrorKind::Connection {
        classified.kind = TransportErrorKind::Proxy;
    }
    classified
}

fn kind_from_connect_chain(chain: &str) -> TransportErrorKind {
    let lower = chain.to_lowercase();
    if lower.contains("tunnel") || lower.contains("proxy") {
        TransportErrorKind::Proxy
    } else if lower.contains("certificate") || lower.contains("tls") || lower.contains("handshake") {
        TransportErrorKind::Tls
    } else if lower.contains("timed out") {
        TransportErrorKind::ConnectTimeout
    } else {
        TransportErrorKind::Connection
    }
}

fn error_chain(error: &(dyn StdError + 'static)) -> String {
    let mut parts = vec![error.to_string()];
    let mut source = error.source();
    while let Some(inner) = source {
        parts.push(inner.to_string());
        source = inner.source();
    }
    parts.join(": ")
}
