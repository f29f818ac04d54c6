//! Rate Controller - turns the two configured delays into interruptible waits
//!
//! A wait is a [`Countdown`] advanced one tick at a time. Each tick re-checks
//! the run's control token, so pause/cancel latency is bounded by one tick no
//! matter how long the configured delay is. The controller only emits data
//! (remaining time); rendering a "next send in ..." indicator is up to observers.

use crate::application::control::RunControl;
use crate::domain::BroadcastPayload;
use std::time::Duration;
use tokio::time::sleep;

/// Result of advancing a countdown by one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// One tick slept, this much is left
    Remaining(Duration),
    /// The full delay has passed
    Elapsed,
    /// A pause is pending; the countdown is frozen until the caller resumes it
    Paused,
    /// Cancel or halt was requested
    Stopped,
}

/// A pausable, cancellable wait of fixed length
#[derive(Debug, Clone)]
pub struct Countdown {
    remaining: Duration,
    tick: Duration,
}

impl Countdown {
    pub fn new(total: Duration, tick: Duration) -> Self {
        Self {
            remaining: total,
            tick: if tick.is_zero() {
                Duration::from_millis(1)
            } else {
                tick
            },
        }
    }

    pub fn remaining(&self) -> Duration {
        self.remaining
    }

    /// Remaining time rounded up to whole seconds
    pub fn remaining_secs(&self) -> u64 {
        let secs = self.remaining.as_secs();
        if self.remaining.subsec_nanos() > 0 {
            secs + 1
        } else {
            secs
        }
    }

    /// Sleep at most one tick, unless the control token says otherwise
    pub async fn tick(&mut self, control: &RunControl) -> Tick {
        if self.remaining.is_zero() {
            return Tick::Elapsed;
        }
        if control.stop_reason().is_some() {
            return Tick::Stopped;
        }
        if control.is_paused() {
            return Tick::Paused;
        }

        let step = self.tick.min(self.remaining);
        tokio::select! {
            _ = control.stopped() => return Tick::Stopped,
            _ = sleep(step) => {}
        }

        self.remaining -= step;
        if self.remaining.is_zero() {
            Tick::Elapsed
        } else {
            Tick::Remaining(self.remaining)
        }
    }
}

/// Inter-destination and inter-item delays of one run
#[derive(Debug, Clone)]
pub struct RateController {
    tick: Duration,
    inter_destination: Duration,
    inter_item: Duration,
}

impl RateController {
    pub fn new(tick: Duration, inter_destination: Duration, inter_item: Duration) -> Self {
        Self {
            tick,
            inter_destination,
            inter_item,
        }
    }

    pub fn for_payload(payload: &BroadcastPayload, tick: Duration) -> Self {
        Self::new(
            tick,
            payload.inter_destination_delay(),
            payload.inter_item_delay(),
        )
    }

    pub fn tick(&self) -> Duration {
        self.tick
    }

    /// Wait between two destinations of the same item (None when the delay is zero)
    pub fn destination_gap(&self) -> Option<Countdown> {
        self.countdown(self.inter_destination)
    }

    /// Wait after item `item_index`; none after the last item or when the delay is zero
    pub fn item_gap(&self, item_index: usize, item_count: usize) -> Option<Countdown> {
        if item_index + 1 >= item_count {
            return None;
        }
        self.countdown(self.inter_item)
    }

    /// Countdown for an explicit remainder (e.g. a wait interrupted by a restart)
    pub fn countdown(&self, total: Duration) -> Option<Countdown> {
        if total.is_zero() {
            None
        } else {
            Some(Countdown::new(total, self.tick))
        }
    }
}
