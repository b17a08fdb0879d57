//! Egress proxy acquisition and verification.
//!
//! A session obtains its proxies in two phases:
//!
//! 1. **Acquire**: load the candidate list from the configured source and draw
//!    a random sample of the requested size ([`acquirer`])
//! 2. **Check**: probe each sampled candidate against an echo endpoint and keep
//!    the ones that answer, together with the origin the endpoint observed
//!    ([`health`])
//!
//! The verified set then feeds the session's proxy [`RotatingPool`](crate::pool::RotatingPool).

pub mod acquirer;
pub mod health;

pub use acquirer::{ProxyAcquirer, ProxySource};
pub use health::{DeadReason, ProxyHealthChecker, ProxyHealthResult, Verdict};
