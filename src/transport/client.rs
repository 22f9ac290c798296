//! Pooled HTTP client for probe and admin calls.
//!
//! # Responsibilities
//! - Own one `reqwest::Client` (bounded idle pool, connect/response timeouts)
//! - Retry transport errors and 5xx with backoff (`do_with_retry`)
//! - Speak the proxy admin protocol: GET servers, PATCH one route

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

use crate::config::{HttpConfig, ProxyEndpoint};
use crate::observability::metrics;
use crate::resilience::{is_retryable, RetryPolicy};

const USER_AGENT: &str = concat!("lb-failover/", env!("CARGO_PKG_VERSION"));

/// Errors surfaced by the transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),

    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}: {body}")]
    Status {
        url: String,
        status: StatusCode,
        body: String,
    },

    #[error("invalid JSON from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Shared HTTP transport. Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    retry: RetryPolicy,
}

impl HttpTransport {
    /// Build a transport from configuration.
    pub fn new(config: &HttpConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .pool_idle_timeout(Duration::from_secs(config.pool_idle_timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(TransportError::Build)?;

        Ok(Self {
            client,
            retry: RetryPolicy::from(config),
        })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Send the request built by `factory`, retrying transport errors and
    /// 5xx responses up to `max_attempts` times.
    ///
    /// `factory` is called once per attempt so the body is rebuilt each time.
    /// Any 2xx–4xx response is returned immediately. Once the budget is spent
    /// the last response (or error) is returned.
    pub async fn do_with_retry<F>(&self, factory: F, max_attempts: u32) -> Result<Response, reqwest::Error>
    where
        F: Fn() -> RequestBuilder,
    {
        let max_attempts = max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let request = factory().build()?;
            let method = request.method().clone();
            let url = request.url().to_string();

            let result = self.client.execute(request).await;
            let retryable = match &result {
                Ok(response) => is_retryable(Some(response.status()), false),
                Err(_) => is_retryable(None, true),
            };

            if !retryable || attempt >= max_attempts {
                return result;
            }

            let delay = self.retry.delay_for(attempt);
            match &result {
                Ok(response) => tracing::warn!(
                    method = %method, url = %url, attempt, status = %response.status(), delay = ?delay,
                    "Server error, retrying"
                ),
                Err(e) => tracing::warn!(
                    method = %method, url = %url, attempt, error = %e, delay = ?delay,
                    "Request failed, retrying"
                ),
            }
            metrics::record_http_retry(method.as_str());
            tokio::time::sleep(delay).await;
        }
    }

    /// `GET {adminURL}/config/apps/http/servers`.
    pub async fn get_servers(&self, endpoint: &ProxyEndpoint) -> Result<Value, TransportError> {
        let url = format!("{}/config/apps/http/servers", endpoint.admin_url);
        let response = self
            .do_with_retry(|| with_auth(self.client.get(&url), endpoint), self.retry.max_attempts)
            .await
            .map_err(|source| TransportError::Request { url: url.clone(), source })?;

        let response = ensure_success(&url, response).await?;
        response
            .json::<Value>()
            .await
            .map_err(|source| TransportError::Decode { url, source })
    }

    /// `PATCH {adminURL}/config/apps/http/servers/{server}/routes/{index}` with a full route body.
    pub async fn patch_route(
        &self,
        endpoint: &ProxyEndpoint,
        server: &str,
        index: usize,
        route: &Value,
    ) -> Result<(), TransportError> {
        let url = format!(
            "{}/config/apps/http/servers/{}/routes/{}",
            endpoint.admin_url, server, index
        );
        let response = self
            .do_with_retry(
                || with_auth(self.client.patch(&url), endpoint).json(route),
                self.retry.max_attempts,
            )
            .await
            .map_err(|source| TransportError::Request { url: url.clone(), source })?;

        ensure_success(&url, response).await?;
        Ok(())
    }

    /// Single GET; true on any 2xx. Used for discovery health gating.
    pub async fn is_healthy(&self, url: &str) -> bool {
        match self.client.get(url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "Health URL unreachable");
                false
            }
        }
    }
}

fn with_auth(builder: RequestBuilder, endpoint: &ProxyEndpoint) -> RequestBuilder {
    match endpoint.basic_auth() {
        Some((user, pass)) => builder.basic_auth(user, pass),
        None => builder,
    }
}

async fn ensure_success(url: &str, response: Response) -> Result<Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(TransportError::Status {
        url: url.to_string(),
        status,
        body,
    })
}
