//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, one per named configuration)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks, descriptor parsing)
//!     → ControllerConfig (validated, immutable)
//!     → passed by value / Arc into prober, switch engine, monitor
//!
//! On file change (patroni-monitor only):
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → old monitor stopped, new monitor built from the new config
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a new monitor
//! - All fields have defaults to allow minimal configs
//! - Endpoint descriptors are parsed into records, never at call sites

pub mod endpoint;
pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use endpoint::{NodeTarget, ProxyEndpoint};
pub use loader::{load_config, ConfigError};
pub use schema::{
    AlertConfig, CacheConfig, ControllerConfig, HttpConfig, LoopOrder, Mapping, MonitorConfig,
    ObservabilityConfig, SwitchConfig,
};
