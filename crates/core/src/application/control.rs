// Per-run control token: cancel/halt signal, pause gate, local control state

use crate::domain::{ControlEvent, ControlState};
use std::sync::{Arc, OnceLock};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Why a run was told to stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Operator cancelled the job (locally or from another session)
    Cancelled,
    /// This process is going away; the job stays resumable
    Halted,
}

/// Control handle for one dispatch run
///
/// Cloning shares the same signals. Every run owns its own token; the remote
/// status poller flips it based on durable state.
#[derive(Clone)]
pub struct RunControl {
    stop: CancellationToken,
    stop_reason: Arc<OnceLock<StopReason>>,
    paused: Arc<watch::Sender<bool>>,
    state: Arc<watch::Sender<ControlState>>,
}

impl RunControl {
    pub fn new() -> Self {
        let (paused, _) = watch::channel(false);
        let (state, _) = watch::channel(ControlState::Idle);
        Self {
            stop: CancellationToken::new(),
            stop_reason: Arc::new(OnceLock::new()),
            paused: Arc::new(paused),
            state: Arc::new(state),
        }
    }

    /// Request a pause (honored at the next check)
    pub fn pause(&self) {
        self.paused.send_replace(true);
    }

    /// Lift a pause
    pub fn resume(&self) {
        self.paused.send_replace(false);
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    /// Receiver that observes pause/resume flips
    pub fn pause_watch(&self) -> watch::Receiver<bool> {
        self.paused.subscribe()
    }

    /// Cancel the job. The first stop request wins.
    pub fn cancel(&self) {
        self.stop_with(StopReason::Cancelled);
    }

    /// Stop the loop without touching durable state
    pub fn halt(&self) {
        self.stop_with(StopReason::Halted);
    }

    fn stop_with(&self, reason: StopReason) {
        let _ = self.stop_reason.set(reason);
        self.stop.cancel();
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        if self.stop.is_cancelled() {
            self.stop_reason.get().copied()
        } else {
            None
        }
    }

    /// Resolves once cancel or halt was requested
    pub async fn stopped(&self) {
        self.stop.cancelled().await
    }

    /// Current local state
    pub fn state(&self) -> ControlState {
        *self.state.borrow()
    }

    /// Receiver for observers of the local state
    pub fn state_watch(&self) -> watch::Receiver<ControlState> {
        self.state.subscribe()
    }

    /// Feed an event to the state machine and publish the new state
    pub fn transition(&self, event: ControlEvent) -> crate::domain::error::Result<ControlState> {
        let current = self.state();
        let next = current.apply(event)?;
        if next != current {
            debug!(from = %current, to = %next, ?event, "control state changed");
            self.state.send_replace(next);
        }
        Ok(next)
    }
}

impl Default for RunControl {
    fn default() -> Self {
        Self::new()
    }
}
