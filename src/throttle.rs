//! Request budget enforcement.
//!
//! The throttle implements a burst-then-stall policy: callers may issue up to
//! `call_limit` successful requests back to back. Only once the budget is
//! exhausted does the next request wait out whatever remains of
//! `period` since the last completed request, after which the counter starts
//! over. A caller that is slower than the limit never waits.
//!
//! Time is read and slept through [`Clock`] so tests can run on virtual time.

use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Source of time and of sleeping.
pub trait Clock {
    fn now(&self) -> Instant;
    async fn sleep(&self, duration: Duration);
}

/// [`Clock`] on the tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Budget state for one scraping session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchBudget {
    pub call_limit: u32,
    pub period: Duration,
    pub calls_made: u32,
    /// Time of the last successful request.
    pub window_anchor: Option<Instant>,
}

impl FetchBudget {
    /// A budget with no window anchored yet.
    ///
    /// # Arguments
    ///
    /// * `call_limit` - Successful requests allowed before a stall
    /// * `period` - Length of the window the stall waits out
    /// * `calls_made` - Requests already spent when the session starts
    pub fn new(call_limit: u32, period: Duration, calls_made: u32) -> Self {
        Self {
            call_limit,
            period,
            calls_made,
            window_anchor: None,
        }
    }

    /// `true` once `calls_made` has reached `call_limit`.
    pub fn is_exhausted(&self) -> bool {
        self.calls_made >= self.call_limit
    }
}

/// Gatekeeper in front of every request attempt.
#[derive(Debug)]
pub struct Throttle<C> {
    budget: FetchBudget,
    clock: C,
}

impl<C: Clock> Throttle<C> {
    /// Take ownership of `budget`; all waiting goes through `clock`.
    pub fn new(budget: FetchBudget, clock: C) -> Self {
        Self { budget, clock }
    }

    pub fn budget(&self) -> &FetchBudget {
        &self.budget
    }

    /// Wait if the budget is spent, then reset it.
    ///
    /// The budget is only examined here; nothing stops `calls_made` from
    /// exceeding the limit between checks.
    pub async fn before_request(&mut self) {
        if !self.budget.is_exhausted() {
            return;
        }

        if let Some(anchor) = self.budget.window_anchor {
            let elapsed = self.clock.now().saturating_duration_since(anchor);
            if elapsed < self.budget.period {
                let wait = self.budget.period - elapsed;
                info!(
                    calls_made = self.budget.calls_made,
                    call_limit = self.budget.call_limit,
                    wait_ms = wait.as_millis() as u64,
                    "Request budget exhausted; stalling"
                );
                self.clock.sleep(wait).await;
            }
        }
        debug!("Request budget reset");
        self.budget.calls_made = 0;
    }

    /// Record the outcome of a request. Only successes consume budget.
    pub fn after_request(&mut self, success: bool) {
        if success {
            self.budget.calls_made += 1;
            self.budget.window_anchor = Some(self.clock.now());
        }
    }
}
