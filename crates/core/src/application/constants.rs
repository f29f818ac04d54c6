// Dispatch constants (no magic values in the loop)
use std::time::Duration;

/// Granularity of every interruptible wait (pause/cancel latency bound).
/// Inter-item waits write the checkpoint once per tick to publish the countdown,
/// so a smaller tick means proportionally more store writes.
pub const DEFAULT_TICK: Duration = Duration::from_secs(1);

/// Remote status is re-read every N ticks during waits
pub const DEFAULT_POLL_EVERY_TICKS: u32 = 5;

/// How often a paused loop re-reads the store for remote resume/cancel
pub const DEFAULT_PAUSED_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// A parked loop that missed this many paused polls is presumed gone
pub const PARKED_LEASE_POLLS: u32 = 3;

/// Upper bound for the inter-destination delay (1 hour)
pub const MAX_INTER_DESTINATION_DELAY_SECONDS: u64 = 60 * 60;

/// Upper bound for the inter-item delay (1 day)
pub const MAX_INTER_ITEM_DELAY_MINUTES: u64 = 24 * 60;

/// Upper bound for a message template
pub const MAX_TEMPLATE_LEN: usize = 4096;

/// Upper bound for (items x destinations) in one broadcast
pub const MAX_TOTAL_UNITS: u64 = 100_000;
