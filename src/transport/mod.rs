//! Outbound HTTP.
//!
//! One [`HttpTransport`] per named configuration; the prober, the switch
//! engine and the webhook alert sink all borrow its pooled client.

pub mod client;

pub use client::{HttpTransport, TransportError};
