#[cfg(test)]
mod state_test;

use serde::Serialize;
use std::fmt;

/// Overall state of an ICE session.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub enum SessionState {
    /// At least one checklist still has pairs left to try.
    #[default]
    #[serde(rename = "running")]
    Running,

    /// Every component has a nominated pair.
    #[serde(rename = "completed")]
    Completed,

    /// Some component ran out of pairs without a nomination.
    #[serde(rename = "failed")]
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            Self::Running => "Running",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
        };
        write!(f, "{s}")
    }
}

/// ICE role of this agent. The controlling agent nominates.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum Role {
    #[default]
    #[serde(rename = "controlling")]
    Controlling,
    #[serde(rename = "controlled")]
    Controlled,
}

impl Role {
    pub fn is_controlling(self) -> bool {
        self == Self::Controlling
    }

    /// The role the peer is expected to hold.
    pub fn opposite(self) -> Self {
        match self {
            Self::Controlling => Self::Controlled,
            Self::Controlled => Self::Controlling,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            Self::Controlling => "controlling",
            Self::Controlled => "controlled",
        };
        write!(f, "{s}")
    }
}
