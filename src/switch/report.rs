//! Outcome of a switch run across the proxy fleet.

use std::fmt;
use uuid::Uuid;

use crate::routing::SwitchTarget;

/// Result of one (endpoint, server, domain) switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchOutcome {
    /// Route PATCHed and cache written.
    Applied,
    /// Computed route equals the live one; nothing sent.
    Unchanged,
}

/// Classification of a whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every reachable endpoint was handled.
    Complete,
    /// At least one endpoint failed.
    Partial,
    /// Stopped early by the no-change threshold.
    Halted,
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunOutcome::Complete => "complete",
            RunOutcome::Partial => "partial",
            RunOutcome::Halted => "halted",
        })
    }
}

/// A failed endpoint (or one route on it).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchFailure {
    pub endpoint: String,
    pub domain: Option<String>,
    pub reason: String,
}

/// Summary of a switch run.
#[derive(Debug, Clone)]
pub struct SwitchReport {
    pub run_id: Uuid,
    pub target: SwitchTarget,
    pub applied: usize,
    pub unchanged: usize,
    /// Pairs skipped without counting as failures (no route, gated endpoint).
    pub skipped: Vec<String>,
    pub failures: Vec<SwitchFailure>,
    pub halted: bool,
}

impl SwitchReport {
    pub fn new(target: SwitchTarget) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            target,
            applied: 0,
            unchanged: 0,
            skipped: Vec::new(),
            failures: Vec::new(),
            halted: false,
        }
    }

    pub fn outcome(&self) -> RunOutcome {
        if self.halted {
            RunOutcome::Halted
        } else if !self.failures.is_empty() {
            RunOutcome::Partial
        } else {
            RunOutcome::Complete
        }
    }

    /// Distinct failed endpoints, in first-failure order.
    pub fn failed_endpoints(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for failure in &self.failures {
            if !seen.contains(&failure.endpoint.as_str()) {
                seen.push(&failure.endpoint);
            }
        }
        seen
    }

    pub fn summary(&self) -> String {
        let mut text = format!(
            "switch to {} {}: {} applied, {} unchanged, {} skipped",
            self.target,
            self.outcome(),
            self.applied,
            self.unchanged,
            self.skipped.len()
        );
        if !self.failures.is_empty() {
            text.push_str(&format!("; failed endpoints: {}", self.failed_endpoints().join(", ")));
        }
        text
    }
}
