//! Cluster leader probing.
//!
//! # Data Flow
//! ```text
//! Mapping (probe endpoints, port, timeout)
//!     → prober.rs: one task per endpoint, GET {endpoint}/cluster
//!     → types.rs: decode ClusterStatus, pick leader/master member
//!     → first success over the result channel wins
//!     → timeout / aggregate error otherwise
//! ```
//!
//! # Design Decisions
//! - Race, not quorum: availability over agreement
//! - Endpoint URLs appear in every aggregated failure reason

pub mod prober;
pub mod types;

pub use prober::{ClusterProber, EndpointFailure, ProbeError};
pub use types::{ClusterStatus, NodeStatus};
