//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! patroni-monitor:
//!     Load config → Validate → Build monitor → start()
//!     SIGTERM/SIGINT (signals.rs) → monitor.stop() → exit 0
//! ```
//!
//! # Design Decisions
//! - Fail fast: an invalid config at startup is fatal
//! - Shutdown waits for the in-flight tick to be cancelled, not drained

pub mod signals;

pub use signals::shutdown_signal;
