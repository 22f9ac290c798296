//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for one named
//! failover configuration. All types derive Serde traits for deserialization
//! from TOML files. Descriptor strings deserialize into the typed records of
//! [`crate::config::endpoint`].

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::endpoint::{NodeTarget, ProxyEndpoint};
use crate::resilience::backoff::{DEFAULT_BASE_DELAY_MS, DEFAULT_MAX_DELAY_MS};

/// Minimum monitor tick interval.
pub const MIN_CHECK_INTERVAL_SECS: u64 = 5;

/// Root configuration for one named failover configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ControllerConfig {
    /// Leader monitoring (Patroni clusters).
    pub monitor: MonitorConfig,

    /// Proxy fleet and switch behaviour.
    pub switch: SwitchConfig,

    /// Outbound HTTP client settings.
    pub http: HttpConfig,

    /// On-disk policy cache.
    pub cache: CacheConfig,

    /// Alert routing.
    pub alerts: AlertConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Monitor loop configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Enable the long-running monitor.
    pub enabled: bool,

    /// Seconds between ticks (at least [`MIN_CHECK_INTERVAL_SECS`]).
    pub check_interval_secs: u64,

    /// Log intended switches without sending mutations.
    pub dry_run: bool,

    /// Cluster-to-target mappings.
    pub mappings: Vec<Mapping>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            check_interval_secs: 10,
            dry_run: false,
            mappings: Vec::new(),
        }
    }
}

impl MonitorConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }
}

/// One replicated cluster and how its leader maps to switch targets.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Mapping {
    /// Logical cluster name (used as the cache key for the last primary).
    pub cluster_name: String,

    /// Ordered `"node:target"` entries.
    #[serde(default)]
    pub node_to_target: Vec<NodeTarget>,

    /// Target used when the observed leader is not in `node_to_target`.
    /// Defaults to the first entry's target.
    #[serde(default)]
    pub default_switch_target: Option<String>,

    /// Redundant cluster status endpoints (e.g. `http://10.0.0.1:8008`).
    #[serde(default)]
    pub probe_endpoints: Vec<String>,

    /// Port applied to endpoints that do not carry one.
    #[serde(default = "default_probe_port")]
    pub probe_port: u16,

    /// Shared deadline for one probe round, in seconds.
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
}

fn default_probe_port() -> u16 {
    8008
}

fn default_probe_timeout() -> u64 {
    5
}

impl Mapping {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    /// Raw target for an observed leader, falling back to the default.
    pub fn target_for(&self, node: &str) -> Option<String> {
        if let Some(found) = self.node_to_target.iter().find(|t| t.node == node) {
            return Some(found.target.clone());
        }
        self.default_switch_target
            .clone()
            .or_else(|| self.node_to_target.first().map(|t| t.target.clone()))
    }
}

/// Iteration order for a switch run.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
pub enum LoopOrder {
    /// Endpoint, then server, then domain.
    #[default]
    #[serde(rename = "API_URLS")]
    ApiUrls,
    /// Server (collected across all endpoints), then endpoint, then domain.
    #[serde(rename = "SERVERS")]
    Servers,
}

/// Switch engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SwitchConfig {
    /// Written as `"user:pass@adminURL;identifier"`.
    pub proxy_endpoints: Vec<ProxyEndpoint>,

    /// Hostnames whose routes are rewritten.
    pub domains_to_switch: Vec<String>,

    pub loop_order: LoopOrder,

    /// Always PATCH, even when the computed route equals the current one.
    pub override_config: bool,

    /// Halt the run once this many no-op switches were seen (0 disables).
    pub no_change_exit_threshold: u32,

    /// Pause after each applied PATCH, in milliseconds.
    pub inter_switch_sleep_ms: u64,

    /// Gate proxy endpoints on `discovery_health_urls`.
    pub dynamic_endpoint_discovery: bool,

    pub discovery_health_urls: Vec<String>,
}

impl Default for SwitchConfig {
    fn default() -> Self {
        Self {
            proxy_endpoints: Vec::new(),
            domains_to_switch: Vec::new(),
            loop_order: LoopOrder::ApiUrls,
            override_config: false,
            no_change_exit_threshold: 0,
            inter_switch_sleep_ms: 0,
            dynamic_endpoint_discovery: false,
            discovery_health_urls: Vec::new(),
        }
    }
}

impl SwitchConfig {
    pub fn inter_switch_sleep(&self) -> Duration {
        Duration::from_millis(self.inter_switch_sleep_ms)
    }
}

/// Outbound HTTP client configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Attempts per request in the retry wrapper.
    pub max_attempts: u32,

    /// First backoff delay in milliseconds.
    pub base_delay_ms: u64,

    /// Backoff cap in milliseconds.
    pub max_delay_ms: u64,

    pub connect_timeout_secs: u64,

    /// Total time for one request/response exchange.
    pub request_timeout_secs: u64,

    /// Idle connections kept per host.
    pub pool_max_idle_per_host: usize,

    pub pool_idle_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            connect_timeout_secs: 5,
            request_timeout_secs: 10,
            pool_max_idle_per_host: 10,
            pool_idle_timeout_secs: 90,
        }
    }
}

/// Policy cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Root directory; files land at `{root}/{target}/{identifier}/lb_policy`.
    pub root: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root: "/var/lib/lb-failover".to_string(),
        }
    }
}

/// Alert routing configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AlertConfig {
    pub channel: String,
    pub topic: String,
    pub use_topic_routing: bool,

    /// When set, alerts are POSTed here; otherwise they only go to the log.
    pub webhook_url: Option<String>,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            channel: "ops".to_string(),
            topic: "lb-failover".to_string(),
            use_topic_routing: false,
            webhook_url: None,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable the Prometheus scrape endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9187".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(entries: &[&str], default: Option<&str>) -> Mapping {
        Mapping {
            cluster_name: "pg-cluster".into(),
            node_to_target: entries.iter().map(|s| s.parse().unwrap()).collect(),
            default_switch_target: default.map(String::from),
            probe_endpoints: vec!["http://127.0.0.1:8008".into()],
            probe_port: 8008,
            probe_timeout_secs: 5,
        }
    }

    #[test]
    fn test_target_lookup() {
        let m = mapping(&["pg-1:dc1", "pg-2:dc2"], None);
        assert_eq!(m.target_for("pg-2").as_deref(), Some("dc2"));
        // Unmapped node falls back to the first entry
        assert_eq!(m.target_for("pg-9").as_deref(), Some("dc1"));

        let m = mapping(&["pg-1:dc1"], Some("round_robin"));
        assert_eq!(m.target_for("pg-9").as_deref(), Some("round_robin"));
    }

    #[test]
    fn test_minimal_toml() {
        let config: ControllerConfig = toml::from_str(
            r#"
            [monitor]
            enabled = true

            [[monitor.mappings]]
            cluster_name = "pg"
            node_to_target = ["pg-1:dc1"]
            probe_endpoints = ["http://10.0.0.1"]

            [switch]
            loop_order = "SERVERS"
            "#,
        )
        .unwrap();

        assert!(config.monitor.enabled);
        assert_eq!(config.monitor.check_interval_secs, 10);
        assert_eq!(config.monitor.mappings[0].probe_port, 8008);
        assert_eq!(config.switch.loop_order, LoopOrder::Servers);
        assert_eq!(config.http.max_attempts, 5);
        assert_eq!(config.http.base_delay_ms, 200);
    }

    #[test]
    fn test_malformed_descriptors_fail_to_parse() {
        let err = toml::from_str::<ControllerConfig>(
            r#"
            [switch]
            proxy_endpoints = ["admin:pw@http://10.0.0.1:2019;a", "nopass@http://10.9.9.9:2019;edge-x"]
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("credentials must be 'user:pass'"), "{}", err);

        let err = toml::from_str::<ControllerConfig>(
            r#"
            [[monitor.mappings]]
            cluster_name = "pg"
            node_to_target = ["pg-1"]
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("node map entry"), "{}", err);
    }
}
