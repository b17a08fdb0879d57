//! Proxy health checking against an echo endpoint.
//!
//! Each candidate is asked to fetch the probe URL (an `httpbin.org/ip`-style
//! endpoint answering `{"origin": "<ip>"}`) within a short timeout. A 200 with
//! an origin makes the candidate alive; everything else is dead, tagged with
//! the transport taxonomy or `other`.
//!
//! One candidate's failure never stops the batch. Probes run through a
//! `futures` stream with a configurable concurrency; at the default of 1 they
//! are strictly sequential, so the worst case is `candidates * timeout`.

use crate::http::{HttpRequest, HttpTransport, TransportErrorKind};
use crate::models::{ProxyCandidate, VerifiedProxy};
use crate::utils::truncate_for_log;
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{error, info, instrument};

/// Default per-probe timeout.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Why a candidate was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeadReason {
    /// No response: classified transport failure.
    Transport(TransportErrorKind),
    /// A response other than 200.
    Status(u16),
    /// A 200 whose body carried no origin.
    NoOrigin,
}

impl DeadReason {
    /// Taxonomy tag: the transport kind, or `other` for anything that did respond.
    pub fn tag(&self) -> &'static str {
        match self {
            DeadReason::Transport(kind) => kind.as_str(),
            DeadReason::Status(_) | DeadReason::NoOrigin => TransportErrorKind::Other.as_str(),
        }
    }
}

impl fmt::Display for DeadReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeadReason::Transport(kind) => write!(f, "{kind}"),
            DeadReason::Status(code) => write!(f, "other (status {code})"),
            DeadReason::NoOrigin => f.write_str("other (no origin in probe body)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The probe endpoint saw this origin.
    Alive(String),
    Dead(DeadReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyHealthResult {
    pub candidate: ProxyCandidate,
    pub verdict: Verdict,
}

impl ProxyHealthResult {
    pub fn is_alive(&self) -> bool {
        matches!(self.verdict, Verdict::Alive(_))
    }
}

#[derive(Debug, Deserialize)]
struct ProbeBody {
    origin: String,
}

/// Probes candidates through an [`HttpTransport`].
#[derive(Debug)]
pub struct ProxyHealthChecker<'a, T> {
    transport: &'a T,
    concurrency: usize,
}

impl<'a, T: HttpTransport> ProxyHealthChecker<'a, T> {
    pub fn new(transport: &'a T) -> Self {
        Self {
            transport,
            concurrency: 1,
        }
    }

    /// Allow up to `concurrency` probes in flight; result order is then unspecified.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Probe every candidate and report a verdict for each.
    #[instrument(level = "info", skip_all, fields(count = candidates.len(), %probe_url, ?timeout))]
    pub async fn check(
        &self,
        candidates: &[ProxyCandidate],
        probe_url: &str,
        timeout: Duration,
    ) -> Vec<ProxyHealthResult> {
        let t0 = Instant::now();
        info!(count = candidates.len(), "Checking proxies");

        let results: Vec<ProxyHealthResult> = stream::iter(candidates.iter().enumerate())
            .map(|(i, candidate)| async move {
                let verdict = self.probe(candidate, probe_url, timeout).await;
                match &verdict {
                    Verdict::Alive(origin) => {
                        info!(index = i + 1, proxy = %candidate, %origin, "Proxy available")
                    }
                    Verdict::Dead(reason) => {
                        error!(index = i + 1, proxy = %candidate, reason = reason.tag(), detail = %reason, "Proxy not available")
                    }
                }
                ProxyHealthResult {
                    candidate: candidate.clone(),
                    verdict,
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let alive = results.iter().filter(|r| r.is_alive()).count();
        info!(
            elapsed_ms = t0.elapsed().as_millis() as u64,
            alive,
            dead = results.len() - alive,
            "Finished checking proxies"
        );
        results
    }

    async fn probe(&self, candidate: &ProxyCandidate, probe_url: &str, timeout: Duration) -> Verdict {
        let request = HttpRequest::get(probe_url)
            .via_proxy(candidate.to_url())
            .with_timeout(timeout);

        match self.transport.get(&request).await {
            Err(e) => Verdict::Dead(DeadReason::Transport(e.kind)),
            Ok(response) if response.status != 200 => Verdict::Dead(DeadReason::Status(response.status)),
            Ok(response) => match serde_json::from_str::<ProbeBody>(&response.body) {
                Ok(body) if !body.origin.trim().is_empty() => Verdict::Alive(body.origin.trim().to_string()),
                _ => {
                    error!(proxy = %candidate, body = %truncate_for_log(&response.body, 120), "Probe body has no origin");
                    Verdict::Dead(DeadReason::NoOrigin)
                }
            },
        }
    }
}

/// Keep the alive candidates, paired with their observed egress identity.
pub fn verified(results: &[ProxyHealthResult]) -> Vec<VerifiedProxy> {
    results
        .iter()
        .filter_map(|result| match &result.verdict {
            Verdict::Alive(origin) => Some(VerifiedProxy {
                address: result.candidate.clone(),
                egress: origin.clone(),
            }),
            Verdict::Dead(_) => None,
        })
        .collect()
}
