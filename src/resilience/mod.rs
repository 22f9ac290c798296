//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Outbound admin/probe call:
//!     → transport (per-call timeout from the client)
//!     → On transport error or 5xx: retries.rs (classify, budget)
//!     → backoff.rs (200ms doubling, 2s cap) → next attempt
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - 2xx–4xx short-circuit: the server answered, retrying will not help
//! - Backoff is deterministic so operators can predict failover latency

pub mod backoff;
pub mod retries;

pub use retries::{is_retryable, RetryPolicy};
