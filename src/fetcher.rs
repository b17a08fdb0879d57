//! Page fetching with bounded retries and exponential backoff.
//!
//! # Retry Strategy
//!
//! - Every attempt first passes through the [`Throttle`]
//! - Transport failures (refused, timed out, TLS, malformed URL, ...) are
//!   transient: sleep `2^attempt` seconds (1s, 2s, 4s, ...) and try again
//! - A response with a non-2xx status is permanent: fail at once, no retry
//! - A 2xx response is recorded against the budget and its body returned
//!
//! The backoff schedule is `1, 2, 4, … 2^(attempts-1)` seconds, one entry
//! per attempt, but the sleep belonging to the final attempt is never taken:
//! a fetch that has used its last attempt fails immediately, so with
//! `attempts = 3` the waits are 1s and 2s. The orchestrator halts the run on
//! that failure and a trailing sleep would only delay it.

use crate::error::FetchError;
use crate::http::{HttpRequest, HttpTransport, TransportError};
use crate::models::{HeaderSet, VerifiedProxy};
use crate::throttle::{Clock, Throttle};
use crate::utils::truncate_for_log;
use std::time::{Duration, Instant};
use tracing::{error, info, instrument, warn};

/// Issues one logical GET with retries, owning the session's request budget.
#[derive(Debug)]
pub struct RetryingFetcher<T, C> {
    transport: T,
    throttle: Throttle<C>,
    clock: C,
    base_delay: Duration,
}

impl<T, C> RetryingFetcher<T, C>
where
    T: HttpTransport,
    C: Clock + Clone,
{
    /// Creates a fetcher with a one-second base backoff.
    ///
    /// # Arguments
    ///
    /// * `transport` - Performs the actual GETs
    /// * `throttle` - The session's request budget, consulted before every attempt
    /// * `clock` - Used for backoff sleeps and timing logs
    pub fn new(transport: T, throttle: Throttle<C>, clock: C) -> Self {
        Self {
            transport,
            throttle,
            clock,
            base_delay: Duration::from_secs(1),
        }
    }

    /// The throttle, for reading the budget after a run.
    pub fn throttle(&self) -> &Throttle<C> {
        &self.throttle
    }

    #[cfg(test)]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Backoff before the retry that follows attempt `attempt` (0-based).
    fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(1u32 << attempt.min(16))
    }

    /// Fetch `url` through `proxy` with `headers`, trying up to `attempts` times.
    ///
    /// # Errors
    ///
    /// - [`FetchError::Permanent`] on the first non-2xx response
    /// - [`FetchError::Exhausted`] when every attempt failed at the transport level
    #[instrument(level = "info", skip_all, fields(%url, proxy = %proxy.address, egress = %proxy.egress))]
    pub async fn fetch(
        &mut self,
        url: &str,
        proxy: &VerifiedProxy,
        headers: &HeaderSet,
        attempts: u32,
    ) -> Result<String, FetchError> {
        let total_t0 = Instant::now();
        let request = HttpRequest::get(url)
            .via_proxy(proxy.address.to_url())
            .with_headers(headers.clone());
        let mut last: Option<TransportError> = None;

        for attempt in 0..attempts {
            self.throttle.before_request().await;

            match self.transport.get(&request).await {
                Ok(response) if response.is_success() => {
                    self.throttle.after_request(true);
                    info!(
                        attempt = attempt + 1,
                        status = response.status,
                        bytes = response.body.len(),
                        elapsed_ms_total = total_t0.elapsed().as_millis() as u64,
                        "Fetched page"
                    );
                    return Ok(response.body);
                }
                Ok(response) => {
                    error!(
                        attempt = attempt + 1,
                        status = response.status,
                        body_preview = %truncate_for_log(&response.body, 200),
                        "Page request rejected; not retrying"
                    );
                    return Err(FetchError::Permanent {
                        status: response.status,
                    });
                }
                Err(e) => {
                    let is_last = attempt + 1 == attempts;
                    if is_last {
                        warn!(attempt = attempt + 1, max = attempts, kind = %e.kind, error = %e.message, "Fetch attempt failed");
                    } else {
                        let delay = self.backoff(attempt);
                        warn!(
                            attempt = attempt + 1,
                            max = attempts,
                            kind = %e.kind,
                            ?delay,
                            error = %e.message,
                            "Fetch attempt failed; backing off"
                        );
                        self.clock.sleep(delay).await;
                    }
                    last = Some(e);
                }
            }
        }

        error!(
            attempts,
            elapsed_ms_total = total_t0.elapsed().as_millis() as u64,
            "Fetch exhausted retries"
        );
        Err(FetchError::Exhausted { attempts, last })
    }
}
