//! Load-balancer failover controller.
//!
//! Watches the primary of replicated database clusters and rewrites the
//! routes of a reverse-proxy fleet so traffic follows the current primary.
//!
//! # Architecture Overview
//!
//! ```text
//!   ┌──────────┐   ┌──────────┐   ┌─────────────────────────────────────┐
//!   │  config  │──▶│ monitor  │──▶│               switch                │
//!   │ (TOML)   │   │ tick loop│   │ resolve route → rewrite → PATCH     │
//!   └──────────┘   └────┬─────┘   └──────┬───────────────┬──────────────┘
//!                       │                │               │
//!                       ▼                ▼               ▼
//!                 ┌──────────┐     ┌──────────┐    ┌───────────┐
//!                 │ cluster  │     │ routing  │    │ transport │──▶ proxy admin API
//!                 │ prober   │     │ (JSON)   │    │ + retries │
//!                 └────┬─────┘     └──────────┘    └───────────┘
//!                      ▼
//!               cluster /cluster endpoints
//!
//!   Cross-cutting: alerts, observability, resilience, lifecycle
//! ```

// Core subsystems
pub mod cluster;
pub mod config;
pub mod monitor;
pub mod routing;
pub mod switch;
pub mod transport;

// Cross-cutting concerns
pub mod alerts;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::ControllerConfig;
pub use monitor::PatroniMonitor;
pub use switch::SwitchEngine;
