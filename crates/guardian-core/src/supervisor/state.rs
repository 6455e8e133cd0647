//! Lifecycle transition table.
//!
//! ```text
//!            Start / TaskRemoved / PeriodicCheck
//!   Stopped ─────────────────────────────────────> Starting ──> Running
//!      ^                                                           │
//!      └──────────── Stopping <──────────── Stop ──────────────────┘
//!                                  Killed: close, then open again
//! ```
//!
//! The table is pure. The supervisor takes the [`Action`] and performs the
//! side effects.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    #[default]
    Stopped,
    Starting,
    Running,
    Stopping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Input {
    Start,
    Stop,
    /// The process hosting the pump was killed by the platform.
    Killed,
    /// The user swiped the app away.
    TaskRemoved,
    /// Reconciliation tick.
    PeriodicCheck,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Declare channels, post the indicator, open the stream.
    Open,
    /// Close the stream and withdraw the indicator.
    Close,
    /// Close, then open again without outside help.
    Restart,
    Noop,
}

impl ServiceState {
    pub fn on(self, input: Input) -> Action {
        use Input::*;
        match (self, input) {
            (ServiceState::Stopped, Start | TaskRemoved | PeriodicCheck) => Action::Open,
            (ServiceState::Stopped, Stop | Killed) => Action::Noop,
            (ServiceState::Running, Stop) => Action::Close,
            (ServiceState::Running, Killed) => Action::Restart,
            (ServiceState::Running, Start | TaskRemoved | PeriodicCheck) => Action::Noop,
            // Transitional states only exist while the slot lock is held.
            (ServiceState::Starting | ServiceState::Stopping, _) => Action::Noop,
        }
    }

    pub fn is_running(self) -> bool {
        self == ServiceState::Running
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ServiceState::Stopped => "stopped",
            ServiceState::Starting => "starting",
            ServiceState::Running => "running",
            ServiceState::Stopping => "stopping",
        }
    }
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
