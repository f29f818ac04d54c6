// Application Layer - Use Cases and the Dispatch Loop

pub mod broadcast;
pub mod constants;
pub mod control;
pub mod dispatcher;
pub mod progress;
pub mod rate_controller;
pub mod recovery;
pub mod status_poller;

// Re-exports
pub use broadcast::{BroadcastService, StartBroadcast};
pub use control::{RunControl, StopReason};
pub use dispatcher::{DispatchSettings, Dispatcher, PreparedRun, RunOutcome, RunSummary};
pub use progress::{Progress, ProgressReporter};
pub use rate_controller::{Countdown, RateController, Tick};
pub use recovery::RecoveryService;
pub use status_poller::RemoteStatusPoller;
