// Domain Layer - Pure business logic and entities

pub mod catalog;
pub mod control;
pub mod error;
pub mod job;

// Re-exports
pub use catalog::{Destination, Item};
pub use control::{ControlEvent, ControlState};
pub use error::DomainError;
pub use job::{
    BroadcastPayload, Checkpoint, JobId, JobRecord, JobStatus, JobType, BROADCAST_JOB_TYPE,
};
