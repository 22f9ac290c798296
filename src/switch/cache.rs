//! Last-applied policy persistence.
//!
//! One plain-text file per `(switch target, identifier)`:
//! `{root}/{target}/{identifier}/lb_policy`, holding the target string.
//! Files are created on the first successful switch, overwritten after
//! every later one, and never deleted. Nothing coordinates through these
//! files; two controllers sharing a root will simply overwrite each other.

use std::fs;
use std::io;
use std::path::PathBuf;
use std::time::SystemTime;

use crate::routing::SwitchTarget;

const POLICY_FILE: &str = "lb_policy";

/// One cached policy file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub target: String,
    pub identifier: String,
    pub policy: String,
    pub modified: Option<SystemTime>,
}

/// On-disk cache of applied switch targets.
#[derive(Debug, Clone)]
pub struct PolicyCache {
    root: PathBuf,
}

impl PolicyCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, target: &str, identifier: &str) -> PathBuf {
        self.root
            .join(path_component(target))
            .join(path_component(identifier))
            .join(POLICY_FILE)
    }

    /// Persist `target` as the last applied policy for `identifier`.
    pub fn record(&self, target: &SwitchTarget, identifier: &str) -> io::Result<()> {
        let target = target.to_string();
        let path = self.path_for(&target, identifier);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }

        // Readers never see a half-written file.
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, &target)?;
        fs::rename(&tmp, &path)?;

        tracing::debug!(path = ?path, "Policy cache updated");
        Ok(())
    }

    pub fn read(&self, target: &str, identifier: &str) -> io::Result<Option<String>> {
        match fs::read_to_string(self.path_for(target, identifier)) {
            Ok(content) => Ok(Some(content.trim().to_string())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Every cached policy file under the root.
    pub fn entries(&self) -> io::Result<Vec<CacheEntry>> {
        let mut entries = Vec::new();
        let targets = match fs::read_dir(&self.root) {
            Ok(dir) => dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(entries),
            Err(e) => return Err(e),
        };

        for target_dir in targets {
            let target_dir = target_dir?;
            if !target_dir.file_type()?.is_dir() {
                continue;
            }
            for id_dir in fs::read_dir(target_dir.path())? {
                let id_dir = id_dir?;
                let file = id_dir.path().join(POLICY_FILE);
                let Ok(policy) = fs::read_to_string(&file) else {
                    continue;
                };
                entries.push(CacheEntry {
                    target: target_dir.file_name().to_string_lossy().into_owned(),
                    identifier: id_dir.file_name().to_string_lossy().into_owned(),
                    policy: policy.trim().to_string(),
                    modified: fs::metadata(&file).and_then(|m| m.modified()).ok(),
                });
            }
        }

        entries.sort_by(|a, b| (&a.target, &a.identifier).cmp(&(&b.target, &b.identifier)));
        Ok(entries)
    }

    /// Most recently written entry for `identifier`, across all targets.
    pub fn latest_for(&self, identifier: &str) -> io::Result<Option<CacheEntry>> {
        let wanted = path_component(identifier);
        Ok(self
            .entries()?
            .into_iter()
            .filter(|e| e.identifier == wanted)
            .max_by_key(|e| e.modified))
    }
}

/// Keep free-form identifiers inside their directory.
fn path_component(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| if matches!(c, '/' | '\\') || c.is_control() { '_' } else { c })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => cleaned,
    }
}
