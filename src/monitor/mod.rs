//! Leader monitoring subsystem.
//!
//! # Data Flow
//! ```text
//! every check_interval:
//!     for each mapping:
//!         cluster prober → current primary
//!         compare with last_primary[cluster]
//!         changed → node map → SwitchTarget → Switcher::switch
//!                 → last_primary updated, alert sent
//! ```
//!
//! # Design Decisions
//! - One background task per monitor, cancelled through a token
//! - Probe failures skip the mapping for this tick; the loop keeps going
//! - `start()` primes the last primary so a restart does not re-switch

pub mod patroni;
pub mod state;

pub use patroni::{MonitorError, PatroniMonitor};
pub use state::MonitorState;
