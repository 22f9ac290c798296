//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Parse switch targets and check probe/health URLs are usable
//! - Validate value ranges (intervals, attempts, delays)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure: ControllerConfig → Result<(), Vec<ValidationError>>
//! - Monitor-specific rules run separately, right before a monitor starts

use std::collections::HashSet;
use thiserror::Error;
use url::Url;

use crate::config::schema::{ControllerConfig, Mapping, MonitorConfig, MIN_CHECK_INTERVAL_SECS};
use crate::routing::SwitchTarget;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Validate everything that must hold for any command.
pub fn validate_config(config: &ControllerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    for (i, domain) in config.switch.domains_to_switch.iter().enumerate() {
        if domain.trim().is_empty() {
            errors.push(ValidationError::new(format!("switch.domains_to_switch[{}]", i), "empty domain"));
        }
    }

    if config.switch.dynamic_endpoint_discovery && config.switch.discovery_health_urls.is_empty() {
        errors.push(ValidationError::new(
            "switch.discovery_health_urls",
            "dynamic endpoint discovery requires at least one health URL",
        ));
    }
    for (i, raw) in config.switch.discovery_health_urls.iter().enumerate() {
        if let Err(e) = check_http_url(raw) {
            errors.push(ValidationError::new(format!("switch.discovery_health_urls[{}]", i), e));
        }
    }

    if config.http.max_attempts == 0 {
        errors.push(ValidationError::new("http.max_attempts", "must be at least 1"));
    }
    if config.http.base_delay_ms > config.http.max_delay_ms {
        errors.push(ValidationError::new("http.base_delay_ms", "must not exceed http.max_delay_ms"));
    }
    if config.http.request_timeout_secs == 0 {
        errors.push(ValidationError::new("http.request_timeout_secs", "must be greater than 0"));
    }

    if config.cache.root.trim().is_empty() {
        errors.push(ValidationError::new("cache.root", "must not be empty"));
    }

    let mut seen = HashSet::new();
    for (i, mapping) in config.monitor.mappings.iter().enumerate() {
        validate_mapping(&format!("monitor.mappings[{}]", i), mapping, &mut errors);
        if !seen.insert(mapping.cluster_name.as_str()) {
            errors.push(ValidationError::new(
                format!("monitor.mappings[{}].cluster_name", i),
                format!("duplicate cluster '{}'", mapping.cluster_name),
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Rules that apply only when a monitor is about to start.
pub fn validate_monitor(monitor: &MonitorConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if !monitor.enabled {
        errors.push(ValidationError::new("monitor.enabled", "monitor is disabled"));
    }
    if monitor.mappings.is_empty() {
        errors.push(ValidationError::new("monitor.mappings", "at least one mapping is required"));
    }
    if monitor.check_interval_secs < MIN_CHECK_INTERVAL_SECS {
        errors.push(ValidationError::new(
            "monitor.check_interval_secs",
            format!("must be at least {} seconds", MIN_CHECK_INTERVAL_SECS),
        ));
    }
    for (i, mapping) in monitor.mappings.iter().enumerate() {
        validate_mapping(&format!("monitor.mappings[{}]", i), mapping, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_mapping(prefix: &str, mapping: &Mapping, errors: &mut Vec<ValidationError>) {
    if mapping.cluster_name.trim().is_empty() {
        errors.push(ValidationError::new(format!("{}.cluster_name", prefix), "must not be empty"));
    }

    if mapping.probe_endpoints.is_empty() {
        errors.push(ValidationError::new(
            format!("{}.probe_endpoints", prefix),
            "at least one probe endpoint is required",
        ));
    }
    for (i, raw) in mapping.probe_endpoints.iter().enumerate() {
        if let Err(e) = check_http_url(raw) {
            errors.push(ValidationError::new(format!("{}.probe_endpoints[{}]", prefix, i), e));
        }
    }

    if mapping.probe_timeout_secs == 0 {
        errors.push(ValidationError::new(format!("{}.probe_timeout_secs", prefix), "must be greater than 0"));
    }

    if mapping.node_to_target.is_empty() && mapping.default_switch_target.is_none() {
        errors.push(ValidationError::new(
            format!("{}.node_to_target", prefix),
            "needs at least one entry or a default_switch_target",
        ));
    }
    for (i, entry) in mapping.node_to_target.iter().enumerate() {
        if let Err(e) = SwitchTarget::from_mapping(&entry.target) {
            errors.push(ValidationError::new(format!("{}.node_to_target[{}]", prefix, i), e.to_string()));
        }
    }

    if let Some(target) = &mapping.default_switch_target {
        if let Err(e) = SwitchTarget::from_mapping(target) {
            errors.push(ValidationError::new(format!("{}.default_switch_target", prefix), e.to_string()));
        }
    }
}

/// An absolute http(s) URL with a host. `patroni1:8008` parses as a URL
/// with scheme `patroni1`, so parsing alone is not enough.
fn check_http_url(raw: &str) -> Result<(), String> {
    let url = Url::parse(raw).map_err(|e| e.to_string())?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("scheme must be http or https, got '{}'", url.scheme()));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err("URL has no host".to_string());
    }
    Ok(())
}
