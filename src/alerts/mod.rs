//! Alert delivery.
//!
//! The controller only needs `alert(message, channel, topic, use_topic_routing)`.
//! Delivery itself is a black box: the log sink writes a structured event,
//! the webhook sink POSTs JSON and never fails the caller.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;

use crate::config::AlertConfig;

/// Destination for operator-facing alerts.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn alert(&self, message: &str, channel: &str, topic: &str, use_topic_routing: bool);
}

/// Writes alerts to the log only.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAlertSink;

#[async_trait]
impl AlertSink for TracingAlertSink {
    async fn alert(&self, message: &str, channel: &str, topic: &str, use_topic_routing: bool) {
        tracing::warn!(channel = %channel, topic = %topic, topic_routing = use_topic_routing, "ALERT: {}", message);
    }
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    message: &'a str,
    channel: &'a str,
    topic: &'a str,
}

/// POSTs alerts as JSON. With topic routing the topic is appended to the URL path.
#[derive(Debug, Clone)]
pub struct WebhookAlertSink {
    client: Client,
    url: String,
}

impl WebhookAlertSink {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into().trim_end_matches('/').to_string(),
        }
    }

    fn target_url(&self, topic: &str, use_topic_routing: bool) -> String {
        if use_topic_routing {
            format!("{}/{}", self.url, topic)
        } else {
            self.url.clone()
        }
    }
}

#[async_trait]
impl AlertSink for WebhookAlertSink {
    async fn alert(&self, message: &str, channel: &str, topic: &str, use_topic_routing: bool) {
        let url = self.target_url(topic, use_topic_routing);
        let payload = WebhookPayload { message, channel, topic };

        match self.client.post(&url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {
                tracing::debug!(url = %url, "Alert delivered");
            }
            Ok(response) => {
                tracing::warn!(url = %url, status = %response.status(), "Alert webhook rejected alert: {}", message);
            }
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Alert webhook unreachable: {}", message);
            }
        }
    }
}

/// Alert sink bound to one configuration's channel and topic.
#[derive(Clone)]
pub struct Alerter {
    sink: Arc<dyn AlertSink>,
    config: AlertConfig,
}

impl Alerter {
    pub fn new(sink: Arc<dyn AlertSink>, config: AlertConfig) -> Self {
        Self { sink, config }
    }

    /// Webhook sink when a URL is configured, log sink otherwise.
    pub fn from_config(config: &AlertConfig, client: Client) -> Self {
        let sink: Arc<dyn AlertSink> = match &config.webhook_url {
            Some(url) => Arc::new(WebhookAlertSink::new(client, url.clone())),
            None => Arc::new(TracingAlertSink),
        };
        Self::new(sink, config.clone())
    }

    pub async fn info(&self, message: &str) {
        self.send(message).await;
    }

    pub async fn critical(&self, message: &str) {
        self.send(&format!("CRITICAL: {}", message)).await;
    }

    async fn send(&self, message: &str) {
        self.sink
            .alert(
                message,
                &self.config.channel,
                &self.config.topic,
                self.config.use_topic_routing,
            )
            .await;
    }
}

impl std::fmt::Debug for Alerter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Alerter")
            .field("channel", &self.config.channel)
            .field("topic", &self.config.topic)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<(String, String, String, bool)>>);

    #[async_trait]
    impl AlertSink for Recorder {
        async fn alert(&self, message: &str, channel: &str, topic: &str, use_topic_routing: bool) {
            self.0.lock().unwrap().push((message.into(), channel.into(), topic.into(), use_topic_routing));
        }
    }

    #[tokio::test]
    async fn test_alerter_routes_config() {
        let recorder = Arc::new(Recorder::default());
        let config = AlertConfig {
            channel: "dba".into(),
            topic: "pg".into(),
            use_topic_routing: true,
            webhook_url: None,
        };
        let alerter = Alerter::new(recorder.clone(), config);

        alerter.info("switched").await;
        alerter.critical("patch failed").await;

        let seen = recorder.0.lock().unwrap();
        assert_eq!(seen[0], ("switched".into(), "dba".into(), "pg".into(), true));
        assert_eq!(seen[1].0, "CRITICAL: patch failed");
    }

    #[test]
    fn test_topic_routing_url() {
        let sink = WebhookAlertSink::new(Client::new(), "https://ntfy.internal/");
        assert_eq!(sink.target_url("pg", true), "https://ntfy.internal/pg");
        assert_eq!(sink.target_url("pg", false), "https://ntfy.internal");
    }
}
