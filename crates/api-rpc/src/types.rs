//! RPC Request/Response Types
//!
//! JSON-RPC method parameters and results.

use sendflow_core::application::StartBroadcast;
use sendflow_core::domain::{ControlState, JobRecord, JobStatus};
use serde::{Deserialize, Serialize};

/// broadcast.start.v1 - Start a broadcast
pub type StartRequest = StartBroadcast;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub total_units: u64,
}

/// broadcast.pause.v1 / resume.v1 / cancel.v1 / progress.v1 - Address one job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequest {
    pub job_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlResponse {
    pub job_id: String,
    pub status: JobStatus,
    /// Set when this daemon drives the run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_state: Option<ControlState>,
}

/// broadcast.active.v1 - Most recently touched running or paused broadcast
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActiveRequest {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveJob {
    pub job_id: String,
    pub status: JobStatus,
    pub processed_units: u64,
    pub total_units: u64,
    pub sent_count: u64,
    pub error_count: u64,
    pub updated_at: i64,
}

impl From<JobRecord> for ActiveJob {
    fn from(record: JobRecord) -> Self {
        Self {
            job_id: record.id,
            status: record.status,
            processed_units: record.processed_units,
            total_units: record.total_units,
            sent_count: record.checkpoint.sent_count,
            error_count: record.checkpoint.error_count,
            updated_at: record.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveResponse {
    pub job: Option<ActiveJob>,
}
