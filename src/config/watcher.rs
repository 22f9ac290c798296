//! Configuration file watcher for hot reload.
//!
//! A running monitor never sees its configuration change. The watcher only
//! hands out freshly loaded, validated configs; the caller builds a new
//! monitor from each one.
//!
//! The parent directory is watched rather than the file, so editors that
//! save by writing a temp file and renaming it still trigger a reload.
//! Events that leave the file content unchanged are dropped. A save is only
//! read once two reads [`SETTLE`] apart agree, so a truncated or half-written
//! file never reaches the parser.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::parse_config;
use crate::config::schema::ControllerConfig;

/// Quiet period between the reads that must agree.
pub const SETTLE: Duration = Duration::from_millis(150);

const MAX_SETTLE_ROUNDS: usize = 20;

/// Watches one configuration file and emits each valid new version.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<ControllerConfig>,
}

impl ConfigWatcher {
    /// Returns the watcher and a receiver for configuration updates.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<ControllerConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (Self {
            path: path.to_path_buf(),
            update_tx,
        }, update_rx)
    }

    /// Start watching. Keep the returned handle alive for as long as updates
    /// are wanted.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.update_tx;
        let path = self.path.clone();
        let file_name = self.path.file_name().map(|n| n.to_os_string());
        let mut last_content = fs::read_to_string(&self.path).ok();

        let mut watcher = RecommendedWatcher::new(move |res: notify::Result<Event>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    tracing::error!(error = ?e, "Watch error");
                    return;
                }
            };
            if !(event.kind.is_modify() || event.kind.is_create()) {
                return;
            }
            if !event.paths.iter().any(|p| p.file_name().map(|n| n.to_os_string()) == file_name) {
                return;
            }

            let content = match read_settled(&path) {
                Ok(content) => content,
                Err(e) => {
                    tracing::warn!(path = ?path, error = %e, "Config file unreadable, keeping current configuration");
                    return;
                }
            };
            if last_content.as_deref() == Some(content.as_str()) {
                return;
            }

            tracing::info!(path = ?path, "Config file change detected, reloading");
            let parsed = parse_config(&content);
            last_content = Some(content);
            match parsed {
                Ok(new_config) => {
                    let _ = tx.send(new_config);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to reload config, keeping current configuration");
                }
            }
        }, Config::default())?;

        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        watcher.watch(dir, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Config watcher started");
        Ok(watcher)
    }
}

/// Read until two reads [`SETTLE`] apart return the same text. Runs on the
/// notify thread; queued events wait and are deduplicated afterwards.
fn read_settled(path: &Path) -> std::io::Result<String> {
    thread::sleep(SETTLE);
    let mut previous = fs::read_to_string(path)?;
    for _ in 0..MAX_SETTLE_ROUNDS {
        thread::sleep(SETTLE);
        let current = fs::read_to_string(path)?;
        if current == previous {
            return Ok(current);
        }
        previous = current;
    }
    tracing::warn!(path = ?path, "Config file still changing, reading latest version");
    Ok(previous)
}
