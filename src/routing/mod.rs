//! Route resolution and rewriting for the proxy admin document.
//!
//! # Data Flow
//! ```text
//! GET servers document
//!     → resolver.rs (server → routes[] → first host match with a reverse_proxy)
//!     → mutation.rs (pin-first swap or named policy on every reverse_proxy handler)
//!     → rewritten route, compared with the original for no-op detection
//! ```
//!
//! # Design Decisions
//! - Plain recursive functions over `serde_json::Value`, no query language
//! - Mutations return a copy; the original stays available for comparison
//! - Key order is preserved so unchanged fields round-trip byte for byte

pub mod mutation;
pub mod resolver;

pub use mutation::{apply_target, describe_route, HandlerSummary, SwitchTarget, TargetError};
pub use resolver::{find_route, server_names, RouteError};
