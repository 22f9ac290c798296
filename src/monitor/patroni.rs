//! Patroni leader monitor.
//!
//! # Responsibilities
//! - Probe every mapping's cluster on a fixed interval
//! - Detect primary changes and drive the switcher
//! - Alert on every observed change, successful switch or not
//!
//! # Design Decisions
//! - `lastPrimary` and the lifecycle state share one `RwLock`; it is never
//!   held across an await point
//! - Cancellation reaches in-flight probes, not only the ticker

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::alerts::Alerter;
use crate::cluster::ClusterProber;
use crate::config::validation::{validate_monitor, ValidationError};
use crate::config::{ControllerConfig, MonitorConfig};
use crate::monitor::state::MonitorState;
use crate::observability::metrics;
use crate::routing::SwitchTarget;
use crate::switch::{PolicyCache, SwitchEngine, Switcher};
use crate::transport::{HttpTransport, TransportError};

/// Monitor lifecycle errors.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("monitor is disabled in configuration")]
    Disabled,

    #[error("invalid monitor configuration: {}", join_errors(.0))]
    Invalid(Vec<ValidationError>),

    #[error("monitor already started")]
    AlreadyStarted,

    #[error("monitor was stopped; build a new one to restart")]
    Stopped,
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Default)]
struct Shared {
    state: MonitorState,
    last_primary: HashMap<String, String>,
}

struct Inner {
    config: MonitorConfig,
    prober: ClusterProber,
    switcher: Arc<dyn Switcher>,
    alerter: Alerter,
    shared: RwLock<Shared>,
}

/// Periodic leader watcher for a set of cluster mappings.
pub struct PatroniMonitor {
    inner: Arc<Inner>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PatroniMonitor {
    pub fn new(config: MonitorConfig, prober: ClusterProber, switcher: Arc<dyn Switcher>, alerter: Alerter) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                prober,
                switcher,
                alerter,
                shared: RwLock::new(Shared::default()),
            }),
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
        }
    }

    /// Wire a monitor and its switch engine from one named configuration.
    pub fn from_config(config: &ControllerConfig) -> Result<Self, TransportError> {
        let transport = HttpTransport::new(&config.http)?;
        let alerter = Alerter::from_config(&config.alerts, transport.client().clone());
        let engine = SwitchEngine::new(
            transport.clone(),
            config.switch.clone(),
            PolicyCache::new(&config.cache.root),
            alerter.clone(),
        );

        Ok(Self::new(
            config.monitor.clone(),
            ClusterProber::new(transport.client().clone()),
            Arc::new(engine),
            alerter,
        ))
    }

    /// Validate, prime the last-known primaries and spawn the tick loop.
    pub async fn start(&self) -> Result<(), MonitorError> {
        if !self.inner.config.enabled {
            return Err(MonitorError::Disabled);
        }
        validate_monitor(&self.inner.config).map_err(MonitorError::Invalid)?;

        match self.state() {
            MonitorState::Idle => {}
            MonitorState::Running => return Err(MonitorError::AlreadyStarted),
            MonitorState::Stopped => return Err(MonitorError::Stopped),
        }

        for mapping in &self.inner.config.mappings {
            match self.inner.prober.probe_primary(mapping).await {
                Ok(primary) => {
                    tracing::info!(cluster = %mapping.cluster_name, primary = %primary, "Primed current primary");
                    self.inner.write().last_primary.insert(mapping.cluster_name.clone(), primary);
                }
                Err(e) => {
                    tracing::warn!(cluster = %mapping.cluster_name, error = %e, "Could not prime primary, first tick will decide");
                }
            }
        }

        {
            let mut shared = self.inner.write();
            if shared.state != MonitorState::Idle {
                return Err(MonitorError::AlreadyStarted);
            }
            shared.state = MonitorState::Running;
        }

        let inner = Arc::clone(&self.inner);
        let cancel = self.cancel.clone();
        let handle = tokio::spawn(async move { inner.run(cancel).await });
        *self.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);

        tracing::info!(
            interval_secs = self.inner.config.check_interval_secs,
            mappings = self.inner.config.mappings.len(),
            dry_run = self.inner.config.dry_run,
            "Patroni monitor started"
        );
        Ok(())
    }

    /// Cancel the tick loop and wait for it to finish. No-op unless running.
    pub async fn stop(&self) {
        {
            let mut shared = self.inner.write();
            if shared.state != MonitorState::Running {
                return;
            }
            shared.state = MonitorState::Stopped;
        }

        self.cancel.cancel();
        let handle = self.task.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Monitor task ended abnormally");
            }
        }
        tracing::info!("Patroni monitor stopped");
    }

    pub fn is_running(&self) -> bool {
        self.state() == MonitorState::Running
    }

    pub fn state(&self) -> MonitorState {
        self.inner.read().state
    }

    pub fn last_primary(&self, cluster: &str) -> Option<String> {
        self.inner.read().last_primary.get(cluster).cloned()
    }

    /// Current state and every known primary.
    pub fn status(&self) -> (MonitorState, HashMap<String, String>) {
        let shared = self.inner.read();
        (shared.state, shared.last_primary.clone())
    }

    /// Run one probe-compare-switch pass over all mappings. Returns early once
    /// the monitor is stopped.
    pub async fn tick(&self) {
        tokio::select! {
            _ = self.cancel.cancelled() => tracing::debug!("Tick abandoned, monitor stopped"),
            _ = self.inner.tick() => {}
        }
    }
}

impl Drop for PatroniMonitor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl Inner {
    fn read(&self) -> std::sync::RwLockReadGuard<'_, Shared> {
        self.shared.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Shared> {
        self.shared.write().unwrap_or_else(PoisonError::into_inner)
    }

    async fn run(&self, cancel: CancellationToken) {
        let period = self.config.check_interval();
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = self.tick() => {}
                    }
                }
            }
        }
        tracing::debug!("Monitor loop exited");
    }

    async fn tick(&self) {
        for mapping in &self.config.mappings {
            let cluster = &mapping.cluster_name;
            let primary = match self.prober.probe_primary(mapping).await {
                Ok(primary) => primary,
                Err(e) => {
                    tracing::warn!(cluster = %cluster, error = %e, "Probe failed, skipping cluster this tick");
                    continue;
                }
            };

            let previous = self.read().last_primary.get(cluster).cloned();
            if previous.as_deref() == Some(primary.as_str()) {
                tracing::debug!(cluster = %cluster, primary = %primary, "Primary unchanged");
                continue;
            }

            metrics::record_leader_change(cluster);
            let previous_label = previous.as_deref().unwrap_or("(none)");
            tracing::info!(cluster = %cluster, previous = %previous_label, primary = %primary, "Primary changed");

            let target = match mapping.target_for(&primary).map(|raw| SwitchTarget::from_mapping(&raw)) {
                Some(Ok(target)) => target,
                Some(Err(e)) => {
                    tracing::error!(cluster = %cluster, primary = %primary, error = %e, "Cannot resolve switch target");
                    self.alerter
                        .critical(&format!("{}: primary {} -> {} but no usable switch target: {}", cluster, previous_label, primary, e))
                        .await;
                    self.write().last_primary.insert(cluster.clone(), primary);
                    continue;
                }
                None => {
                    tracing::error!(cluster = %cluster, primary = %primary, "Mapping has no switch target");
                    self.write().last_primary.insert(cluster.clone(), primary);
                    continue;
                }
            };

            let outcome = if self.config.dry_run {
                tracing::info!(cluster = %cluster, primary = %primary, switch_target = %target, "Dry run: would switch");
                "dry run".to_string()
            } else {
                self.switcher.switch(&target).await.summary()
            };

            self.write().last_primary.insert(cluster.clone(), primary.clone());

            self.alerter
                .info(&format!(
                    "{}: primary {} -> {}, target {}: {}",
                    cluster, previous_label, primary, target, outcome
                ))
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::TracingAlertSink;
    use crate::config::{AlertConfig, Mapping};
    use crate::switch::SwitchReport;
    use async_trait::async_trait;

    #[derive(Default)]
    struct NoopSwitcher;

    #[async_trait]
    impl Switcher for NoopSwitcher {
        async fn switch(&self, target: &SwitchTarget) -> SwitchReport {
            SwitchReport::new(target.clone())
        }
    }

    fn monitor(config: MonitorConfig) -> PatroniMonitor {
        PatroniMonitor::new(
            config,
            ClusterProber::new(reqwest::Client::new()),
            Arc::new(NoopSwitcher),
            Alerter::new(Arc::new(TracingAlertSink), AlertConfig::default()),
        )
    }

    fn mapping() -> Mapping {
        Mapping {
            cluster_name: "pg-cluster".into(),
            node_to_target: vec!["pg-1:dc1".parse().unwrap()],
            default_switch_target: None,
            probe_endpoints: vec!["http://127.0.0.1:1".into()],
            probe_port: 8008,
            probe_timeout_secs: 1,
        }
    }

    #[tokio::test]
    async fn test_disabled_monitor_refuses_to_start() {
        let m = monitor(MonitorConfig::default());
        assert!(matches!(m.start().await, Err(MonitorError::Disabled)));
        assert_eq!(m.state(), MonitorState::Idle);
    }

    #[tokio::test]
    async fn test_invalid_interval_refuses_to_start() {
        let m = monitor(MonitorConfig {
            enabled: true,
            check_interval_secs: 1,
            dry_run: false,
            mappings: vec![mapping()],
        });
        assert!(matches!(m.start().await, Err(MonitorError::Invalid(_))));
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let m = monitor(MonitorConfig {
            enabled: true,
            check_interval_secs: 5,
            dry_run: true,
            mappings: vec![mapping()],
        });

        // Stop before start is a no-op.
        m.stop().await;
        assert_eq!(m.state(), MonitorState::Idle);

        m.start().await.unwrap();
        assert!(m.is_running());
        assert!(matches!(m.start().await, Err(MonitorError::AlreadyStarted)));
        // Priming failed against a closed port; nothing recorded.
        assert_eq!(m.last_primary("pg-cluster"), None);

        m.stop().await;
        m.stop().await;
        assert_eq!(m.state(), MonitorState::Stopped);
        assert!(matches!(m.start().await, Err(MonitorError::Stopped)));
    }
}
