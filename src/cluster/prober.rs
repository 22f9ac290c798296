//! Leader probing across redundant cluster endpoints.
//!
//! Every configured endpoint is queried concurrently under one shared
//! deadline. The first endpoint to answer successfully wins; no agreement
//! between endpoints is checked. Losing probes are not cancelled, they run
//! out on their own request timeout.

use reqwest::Client;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use url::Url;

use crate::cluster::types::ClusterStatus;
use crate::config::Mapping;
use crate::observability::metrics;

/// One endpoint's failure reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointFailure {
    pub endpoint: String,
    pub reason: String,
}

impl fmt::Display for EndpointFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.endpoint, self.reason)
    }
}

/// Probe errors.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("cluster {cluster}: no probe endpoints configured")]
    NoEndpoints { cluster: String },

    #[error("cluster {cluster}: no endpoint answered within {timeout:?}")]
    Timeout { cluster: String, timeout: Duration },

    #[error("cluster {cluster}: all probes failed: {}", join_failures(.failures))]
    AllFailed {
        cluster: String,
        failures: Vec<EndpointFailure>,
    },
}

fn join_failures(failures: &[EndpointFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Queries cluster status endpoints.
#[derive(Debug, Clone)]
pub struct ClusterProber {
    client: Client,
}

impl ClusterProber {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Name of the current primary, per the first endpoint to report one.
    pub async fn probe_primary(&self, mapping: &Mapping) -> Result<String, ProbeError> {
        self.race(mapping, |status| match status.leader() {
            Some(leader) if !leader.name.is_empty() => Ok(leader.name.clone()),
            Some(_) => Err("leader member has no name".to_string()),
            None => Err("no member with a leader role".to_string()),
        })
        .await
    }

    /// Full member list, per the first endpoint to answer.
    pub async fn probe_status(&self, mapping: &Mapping) -> Result<ClusterStatus, ProbeError> {
        self.race(mapping, Ok).await
    }

    async fn race<T>(
        &self,
        mapping: &Mapping,
        extract: fn(ClusterStatus) -> Result<T, String>,
    ) -> Result<T, ProbeError>
    where
        T: Send + 'static,
    {
        let cluster = mapping.cluster_name.clone();
        if mapping.probe_endpoints.is_empty() {
            return Err(ProbeError::NoEndpoints { cluster });
        }

        let timeout = mapping.probe_timeout();
        let (tx, mut rx) = mpsc::channel(mapping.probe_endpoints.len());

        for endpoint in &mapping.probe_endpoints {
            let tx = tx.clone();
            let client = self.client.clone();
            let endpoint = endpoint.clone();
            let url = probe_url(&endpoint, mapping.probe_port);

            tokio::spawn(async move {
                let outcome = match url {
                    Ok(url) => fetch_status(&client, url, timeout).await.and_then(extract),
                    Err(reason) => Err(reason),
                };
                let _ = tx.send((endpoint, outcome)).await;
            });
        }
        drop(tx);

        let first_success = async {
            let mut failures = Vec::new();
            while let Some((endpoint, outcome)) = rx.recv().await {
                match outcome {
                    Ok(value) => return Ok((endpoint, value)),
                    Err(reason) => {
                        tracing::debug!(cluster = %cluster, endpoint = %endpoint, reason = %reason, "Probe failed");
                        failures.push(EndpointFailure { endpoint, reason });
                    }
                }
            }
            Err::<(String, T), _>(failures)
        };

        match tokio::time::timeout(timeout, first_success).await {
            Ok(Ok((endpoint, value))) => {
                tracing::debug!(cluster = %cluster, endpoint = %endpoint, "Probe answered");
                metrics::record_probe(&cluster, "success");
                Ok(value)
            }
            Ok(Err(failures)) => {
                metrics::record_probe(&cluster, "failed");
                Err(ProbeError::AllFailed { cluster, failures })
            }
            Err(_) => {
                metrics::record_probe(&cluster, "timeout");
                Err(ProbeError::Timeout { cluster, timeout })
            }
        }
    }
}

/// `{endpoint}/cluster`, with `port` filled in when the endpoint has none.
pub fn probe_url(endpoint: &str, port: u16) -> Result<Url, String> {
    let mut url = Url::parse(endpoint).map_err(|e| format!("invalid endpoint URL: {}", e))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("endpoint scheme must be http or https, got '{}'", url.scheme()));
    }
    // Url drops a written default port (`:80`, `:443`), so look at the text.
    if !has_explicit_port(endpoint) {
        url.set_port(Some(port))
            .map_err(|_| "endpoint URL cannot carry a port".to_string())?;
    }
    let path = format!("{}/cluster", url.path().trim_end_matches('/'));
    url.set_path(&path);
    Ok(url)
}

fn has_explicit_port(endpoint: &str) -> bool {
    let rest = endpoint.split_once("://").map_or(endpoint, |(_, rest)| rest);
    let authority = rest.split(|c: char| matches!(c, '/' | '?' | '#')).next().unwrap_or(rest);
    let host_port = authority.rsplit_once('@').map_or(authority, |(_, hp)| hp);
    match host_port.rsplit_once(']') {
        Some((_, tail)) => tail.starts_with(':'),
        None => host_port.contains(':'),
    }
}

async fn fetch_status(client: &Client, url: Url, timeout: Duration) -> Result<ClusterStatus, String> {
    let response = client
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| e.to_string())?;

    let status = response.status();
    if !status.is_success() {
        return Err(format!("HTTP {}", status));
    }

    response
        .json::<ClusterStatus>()
        .await
        .map_err(|e| format!("malformed cluster status: {}", e))
}
