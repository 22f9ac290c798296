//! Switch engine: applies a switch target across the proxy fleet.
//!
//! # Responsibilities
//! - Resolve the route for (server, domain), compute the rewritten route
//! - Detect no-ops and count them against the no-change threshold
//! - PATCH changed routes, record the applied policy, alert on failures
//! - Walk endpoints/servers/domains in the configured loop order
//!
//! # Design Decisions
//! - One endpoint failing never aborts the run; the report says "partial"
//! - Route resolution failures are skips, not failures
//! - Breaching the no-change threshold ends the run with a `Halted` report;
//!   the caller decides what happens next

use async_trait::async_trait;
use futures_util::future::join_all;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use thiserror::Error;
use tracing::Instrument;

use crate::alerts::Alerter;
use crate::config::endpoint::url_host;
use crate::config::{LoopOrder, ProxyEndpoint, SwitchConfig};
use crate::observability::metrics;
use crate::routing::{apply_target, describe_route, find_route, server_names, RouteError, SwitchTarget};
use crate::switch::cache::PolicyCache;
use crate::switch::report::{RunOutcome, SwitchFailure, SwitchOutcome, SwitchReport};
use crate::transport::{HttpTransport, TransportError};

/// Errors from a single switch.
#[derive(Debug, Error)]
pub enum SwitchError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Route(#[from] RouteError),

    #[error("no-change threshold exceeded: {count} unchanged switches (threshold {threshold})")]
    NoChangeThresholdExceeded { count: u32, threshold: u32 },
}

/// Anything that can move the fleet to a target. The monitor depends on
/// this rather than on [`SwitchEngine`] directly.
#[async_trait]
pub trait Switcher: Send + Sync {
    async fn switch(&self, target: &SwitchTarget) -> SwitchReport;
}

/// Live view of one route, for the `list` command.
#[derive(Debug, Clone)]
pub struct PolicyRow {
    pub endpoint: String,
    pub server: String,
    pub domain: String,
    pub live_policy: String,
    pub first_upstream: String,
    pub cached_policy: String,
}

/// Applies switch targets to every configured proxy endpoint.
#[derive(Debug)]
pub struct SwitchEngine {
    transport: HttpTransport,
    config: SwitchConfig,
    cache: PolicyCache,
    alerter: Alerter,
    no_change: AtomicU32,
}

impl SwitchEngine {
    pub fn new(transport: HttpTransport, config: SwitchConfig, cache: PolicyCache, alerter: Alerter) -> Self {
        Self {
            transport,
            config,
            cache,
            alerter,
            no_change: AtomicU32::new(0),
        }
    }

    /// No-op switches seen since the last run started.
    pub fn no_change_count(&self) -> u32 {
        self.no_change.load(Ordering::SeqCst)
    }

    /// Move one (server, domain) route on one proxy to `target`.
    pub async fn switch_to(
        &self,
        target: &SwitchTarget,
        identifier: &str,
        endpoint: &ProxyEndpoint,
        server: &str,
        domain: &str,
    ) -> Result<SwitchOutcome, SwitchError> {
        let doc = self.transport.get_servers(endpoint).await?;
        self.switch_in(&doc, target, identifier, endpoint, server, domain).await
    }

    /// Like [`Self::switch_to`], against an already fetched servers document.
    async fn switch_in(
        &self,
        doc: &Value,
        target: &SwitchTarget,
        identifier: &str,
        endpoint: &ProxyEndpoint,
        server: &str,
        domain: &str,
    ) -> Result<SwitchOutcome, SwitchError> {
        let (index, route) = find_route(doc, server, domain)?;
        let updated = apply_target(route, target)?;

        if !self.config.override_config && updated == *route {
            let count = self.no_change.fetch_add(1, Ordering::SeqCst) + 1;
            metrics::record_noop();
            tracing::info!(
                endpoint = %endpoint, server, domain, switch_target = %target, no_change_count = count,
                "Route already matches target, skipping"
            );

            let threshold = self.config.no_change_exit_threshold;
            if threshold > 0 && count > threshold {
                return Err(SwitchError::NoChangeThresholdExceeded { count, threshold });
            }
            return Ok(SwitchOutcome::Unchanged);
        }

        if let Err(e) = self.transport.patch_route(endpoint, server, index, &updated).await {
            metrics::record_switch("failed");
            tracing::error!(endpoint = %endpoint, server, domain, route_index = index, error = %e, "Route update failed");
            self.alerter
                .critical(&format!(
                    "failed to switch {} on {} (server {}) to {}: {}",
                    domain, endpoint, server, target, e
                ))
                .await;
            return Err(e.into());
        }

        if let Err(e) = self.cache.record(target, identifier) {
            tracing::error!(switch_target = %target, identifier, error = %e, "Failed to write policy cache");
        }

        metrics::record_switch("applied");
        tracing::info!(endpoint = %endpoint, server, domain, route_index = index, switch_target = %target, "Route switched");
        Ok(SwitchOutcome::Applied)
    }

    /// Switch every (endpoint, server, domain) to `target`.
    pub async fn run(&self, target: &SwitchTarget) -> SwitchReport {
        let mut report = SwitchReport::new(target.clone());
        let span = tracing::info_span!("switch_run", run_id = %report.run_id, switch_target = %target);
        self.run_inner(target, &mut report).instrument(span).await;
        report
    }

    async fn run_inner(&self, target: &SwitchTarget, report: &mut SwitchReport) {
        self.no_change.store(0, Ordering::SeqCst);

        let endpoints = self.active_endpoints(report).await;
        let (plan, mut fresh) = self.plan(endpoints, report).await;
        let pairs = order_pairs(&plan, self.config.loop_order);
        tracing::info!(endpoints = plan.len(), pairs = pairs.len(), domains = self.config.domains_to_switch.len(), "Switch run starting");

        'pairs: for (endpoint, server) in pairs {
            for domain in &self.config.domains_to_switch {
                // A document stays fresh until this run PATCHes its endpoint.
                let key = endpoint.to_string();
                let doc = match fresh.remove(&key) {
                    Some(doc) => doc,
                    None => match self.transport.get_servers(endpoint).await {
                        Ok(doc) => doc,
                        Err(e) => {
                            report.failures.push(SwitchFailure {
                                endpoint: key,
                                domain: Some(domain.clone()),
                                reason: e.to_string(),
                            });
                            continue;
                        }
                    },
                };

                let result = self.switch_in(&doc, target, &endpoint.identifier, endpoint, server, domain).await;
                if matches!(result, Ok(SwitchOutcome::Unchanged) | Err(SwitchError::Route(_))) {
                    fresh.insert(key, doc);
                }

                match result {
                    Ok(SwitchOutcome::Applied) => {
                        report.applied += 1;
                        let pause = self.config.inter_switch_sleep();
                        if !pause.is_zero() {
                            tokio::time::sleep(pause).await;
                        }
                    }
                    Ok(SwitchOutcome::Unchanged) => report.unchanged += 1,
                    Err(SwitchError::Route(e)) => {
                        tracing::info!(endpoint = %endpoint, server, domain = %domain, reason = %e, "Skipping route");
                        report.skipped.push(format!("{} {} {}: {}", endpoint, server, domain, e));
                    }
                    Err(e @ SwitchError::NoChangeThresholdExceeded { .. }) => {
                        tracing::warn!(error = %e, "Stopping switch run");
                        report.halted = true;
                        break 'pairs;
                    }
                    Err(SwitchError::Transport(e)) => {
                        report.failures.push(SwitchFailure {
                            endpoint: endpoint.to_string(),
                            domain: Some(domain.clone()),
                            reason: e.to_string(),
                        });
                    }
                }
            }
        }

        let summary = report.summary();
        match report.outcome() {
            RunOutcome::Complete | RunOutcome::Partial => {
                tracing::info!(outcome = %report.outcome(), "{}", summary);
                self.alerter.info(&summary).await;
            }
            RunOutcome::Halted => tracing::warn!("{}", summary),
        }
    }

    /// Configured endpoints, minus those gated out by discovery health checks.
    async fn active_endpoints(&self, report: &mut SwitchReport) -> Vec<ProxyEndpoint> {
        let endpoints = self.config.proxy_endpoints.clone();
        if !self.config.dynamic_endpoint_discovery {
            return endpoints;
        }

        let checks: Vec<(Option<String>, bool)> = join_all(
            self.config
                .discovery_health_urls
                .iter()
                .map(|url| async move { (url_host(url), self.transport.is_healthy(url).await) }),
        )
        .await;

        endpoints
            .into_iter()
            .filter(|endpoint| {
                let host = endpoint.host();
                let mut governing = checks.iter().filter(|(h, _)| h.is_some() && *h == host).peekable();
                if governing.peek().is_none() || governing.any(|(_, healthy)| *healthy) {
                    return true;
                }
                tracing::warn!(endpoint = %endpoint, "Endpoint failed discovery health check, skipping");
                report.skipped.push(format!("{}: discovery health check failed", endpoint));
                false
            })
            .collect()
    }

    /// Fetch each endpoint's server names; unreachable endpoints become failures.
    /// The fetched documents are returned keyed by endpoint.
    async fn plan(
        &self,
        endpoints: Vec<ProxyEndpoint>,
        report: &mut SwitchReport,
    ) -> (Vec<(ProxyEndpoint, Vec<String>)>, HashMap<String, Value>) {
        let mut plan = Vec::with_capacity(endpoints.len());
        let mut docs = HashMap::new();
        for endpoint in endpoints {
            match self.transport.get_servers(&endpoint).await {
                Ok(doc) => {
                    let names = server_names(&doc);
                    docs.insert(endpoint.to_string(), doc);
                    plan.push((endpoint, names));
                }
                Err(e) => {
                    tracing::error!(endpoint = %endpoint, error = %e, "Cannot read proxy configuration");
                    report.failures.push(SwitchFailure {
                        endpoint: endpoint.to_string(),
                        domain: None,
                        reason: e.to_string(),
                    });
                }
            }
        }
        (plan, docs)
    }

    /// Current policy per (endpoint, server, domain), plus the cached one.
    pub async fn inspect(&self) -> Vec<PolicyRow> {
        let mut rows = Vec::new();
        for endpoint in &self.config.proxy_endpoints {
            let cached_policy = match self.cache.latest_for(&endpoint.identifier) {
                Ok(Some(entry)) => entry.policy,
                Ok(None) => "-".to_string(),
                Err(e) => format!("error: {}", e),
            };

            let doc = match self.transport.get_servers(endpoint).await {
                Ok(doc) => doc,
                Err(e) => {
                    rows.push(PolicyRow {
                        endpoint: endpoint.to_string(),
                        server: "-".into(),
                        domain: "-".into(),
                        live_policy: format!("error: {}", e),
                        first_upstream: "-".into(),
                        cached_policy,
                    });
                    continue;
                }
            };

            for server in server_names(&doc) {
                for domain in &self.config.domains_to_switch {
                    let Ok((_, route)) = find_route(&doc, &server, domain) else {
                        continue;
                    };
                    let handlers = describe_route(route);
                    let first = handlers.first();
                    rows.push(PolicyRow {
                        endpoint: endpoint.to_string(),
                        server: server.clone(),
                        domain: domain.clone(),
                        live_policy: first
                            .and_then(|h| h.policy.clone())
                            .unwrap_or_else(|| "(default)".into()),
                        first_upstream: first
                            .and_then(|h| h.upstreams.first().cloned())
                            .unwrap_or_else(|| "-".into()),
                        cached_policy: cached_policy.clone(),
                    });
                }
            }
        }
        rows
    }
}

#[async_trait]
impl Switcher for SwitchEngine {
    async fn switch(&self, target: &SwitchTarget) -> SwitchReport {
        self.run(target).await
    }
}

/// Flatten a plan into (endpoint, server) pairs in loop order.
fn order_pairs(plan: &[(ProxyEndpoint, Vec<String>)], order: LoopOrder) -> Vec<(&ProxyEndpoint, &str)> {
    match order {
        LoopOrder::ApiUrls => plan
            .iter()
            .flat_map(|(endpoint, servers)| servers.iter().map(move |s| (endpoint, s.as_str())))
            .collect(),
        LoopOrder::Servers => {
            let mut names: Vec<&str> = Vec::new();
            for (_, servers) in plan {
                for server in servers {
                    if !names.contains(&server.as_str()) {
                        names.push(server.as_str());
                    }
                }
            }
            names
                .into_iter()
                .flat_map(|name| {
                    plan.iter()
                        .filter(move |(_, servers)| servers.iter().any(|s| s == name))
                        .map(move |(endpoint, _)| (endpoint, name))
                })
                .collect()
        }
    }
}
