//! Switch engine subsystem.
//!
//! # Data Flow
//! ```text
//! SwitchTarget (CLI argument or monitor leader change)
//!     → engine.rs: discovery gating, GET servers per endpoint, loop order
//!     → per (endpoint, server, domain): find route → rewrite → compare
//!     → changed: PATCH route, cache.rs records the policy
//!     → unchanged: no-change counter, halt past the threshold
//!     → report.rs: applied / unchanged / skipped / failed, run outcome
//! ```
//!
//! # Design Decisions
//! - Endpoints are independent; failures are collected, not propagated
//! - The monitor talks to the engine through the [`Switcher`] trait

pub mod cache;
pub mod engine;
pub mod report;

pub use cache::{CacheEntry, PolicyCache};
pub use engine::{PolicyRow, SwitchEngine, SwitchError, Switcher};
pub use report::{RunOutcome, SwitchFailure, SwitchOutcome, SwitchReport};
