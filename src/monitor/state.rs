//! Monitor lifecycle state.
//!
//! # State Transitions
//! ```text
//! Idle → Running: start() after successful validation
//! Running → Stopped: stop()
//! Stopped is terminal; build a new monitor to monitor again.
//! ```

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MonitorState {
    #[default]
    Idle,
    Running,
    Stopped,
}

impl fmt::Display for MonitorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MonitorState::Idle => "idle",
            MonitorState::Running => "running",
            MonitorState::Stopped => "stopped",
        })
    }
}
