// Job Control State Machine (local view of one run)

use crate::domain::error::{DomainError, Result};
use crate::domain::job::JobStatus;
use serde::{Deserialize, Serialize};

/// State of the session driving (or about to drive) a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlState {
    #[default]
    Idle,
    Validating,
    Sending,
    Paused,
    Completed,
    Cancelled,
    Failed,
}

/// Inputs that move the machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    Start,
    GatewayReady,
    GatewayUnavailable,
    Pause,
    Resume,
    Cancel,
    Finished,
    Crashed,
}

impl ControlState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlState::Idle => "idle",
            ControlState::Validating => "validating",
            ControlState::Sending => "sending",
            ControlState::Paused => "paused",
            ControlState::Completed => "completed",
            ControlState::Cancelled => "cancelled",
            ControlState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ControlState::Completed | ControlState::Cancelled)
    }

    /// Compute the next state, rejecting pairs the machine does not define
    pub fn apply(self, event: ControlEvent) -> Result<ControlState> {
        use ControlEvent as E;
        use ControlState as S;

        let next = match (self, event) {
            (S::Idle, E::Start) | (S::Failed, E::Start) => S::Validating,
            (S::Validating, E::GatewayReady) => S::Sending,
            (S::Validating, E::GatewayUnavailable) => S::Idle,
            (S::Sending, E::Pause) => S::Paused,
            (S::Sending, E::Cancel) | (S::Paused, E::Cancel) => S::Cancelled,
            (S::Sending, E::Finished) => S::Completed,
            (S::Sending, E::Crashed) | (S::Paused, E::Crashed) => S::Failed,
            (S::Paused, E::Resume) => S::Sending,
            (state, event) => {
                return Err(DomainError::InvalidStateTransition {
                    from: state.to_string(),
                    to: format!("{:?}", event),
                })
            }
        };
        Ok(next)
    }

    /// Durable status implied by this local state (None while nothing is committed)
    pub fn job_status(&self) -> Option<JobStatus> {
        match self {
            ControlState::Idle | ControlState::Validating => None,
            ControlState::Sending => Some(JobStatus::Running),
            ControlState::Paused => Some(JobStatus::Paused),
            ControlState::Completed => Some(JobStatus::Completed),
            ControlState::Cancelled => Some(JobStatus::Cancelled),
            ControlState::Failed => Some(JobStatus::Failed),
        }
    }
}

impl std::fmt::Display for ControlState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
