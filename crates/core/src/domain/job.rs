// Job Record Domain Model

use crate::domain::error::{DomainError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Job ID (UUID v4)
pub type JobId = String;

/// Tag used by this engine for its records in a shared store
pub const BROADCAST_JOB_TYPE: &str = "BROADCAST";

/// Durable job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Cancelled,
    Failed,
}

impl JobStatus {
    pub const ALL: [JobStatus; 6] = [
        JobStatus::Pending,
        JobStatus::Running,
        JobStatus::Paused,
        JobStatus::Completed,
        JobStatus::Cancelled,
        JobStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Paused => "paused",
            JobStatus::Completed => "completed",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Failed => "failed",
        }
    }

    /// Completed and cancelled records never change again (until re-armed).
    /// Failed keeps its checkpoint and can be resumed like a pause.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Cancelled)
    }

    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Cancelled)
                | (Running, Paused)
                | (Running, Cancelled)
                | (Running, Completed)
                | (Running, Failed)
                | (Paused, Running)
                | (Paused, Cancelled)
                | (Paused, Failed)
                | (Failed, Running)
                | (Failed, Cancelled)
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "paused" => Ok(JobStatus::Paused),
            "completed" => Ok(JobStatus::Completed),
            "cancelled" => Ok(JobStatus::Cancelled),
            "failed" => Ok(JobStatus::Failed),
            other => Err(DomainError::UnknownStatus(other.to_string())),
        }
    }
}

/// Job Type tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobType(String);

impl JobType {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn broadcast() -> Self {
        Self::new(BROADCAST_JOB_TYPE)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Broadcast definition, immutable for the lifetime of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastPayload {
    /// Operator priority order, never re-sorted
    pub item_ids: Vec<String>,
    /// Selection order
    pub destination_ids: Vec<String>,
    pub template: String,
    #[serde(default)]
    pub inter_destination_delay_seconds: u64,
    #[serde(default)]
    pub inter_item_delay_minutes: u64,
}

impl BroadcastPayload {
    pub fn total_units(&self) -> u64 {
        (self.item_ids.len() * self.destination_ids.len()) as u64
    }

    pub fn inter_destination_delay(&self) -> Duration {
        Duration::from_secs(self.inter_destination_delay_seconds)
    }

    pub fn inter_item_delay(&self) -> Duration {
        Duration::from_secs(self.inter_item_delay_minutes * 60)
    }

    /// Reject definitions that cannot produce a meaningful run
    pub fn validate(&self) -> Result<()> {
        if self.item_ids.is_empty() {
            return Err(DomainError::ValidationError(
                "at least one item must be selected".to_string(),
            ));
        }
        if self.destination_ids.is_empty() {
            return Err(DomainError::ValidationError(
                "at least one destination must be selected".to_string(),
            ));
        }
        if self.template.trim().is_empty() {
            return Err(DomainError::ValidationError(
                "message template is empty".to_string(),
            ));
        }
        if let Some(dup) = first_duplicate(&self.item_ids) {
            return Err(DomainError::ValidationError(format!(
                "item {} selected more than once",
                dup
            )));
        }
        if let Some(dup) = first_duplicate(&self.destination_ids) {
            return Err(DomainError::ValidationError(format!(
                "destination {} selected more than once",
                dup
            )));
        }
        Ok(())
    }
}

fn first_duplicate(ids: &[String]) -> Option<&str> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.iter().map(String::as_str).find(|id| !seen.insert(*id))
}

/// Resumable cursor and counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub current_item_index: usize,
    pub current_destination_index: usize,
    pub sent_count: u64,
    pub error_count: u64,
    pub countdown_seconds: u64,
    pub is_waiting: bool,
    /// A live loop is blocked in pause and refreshes the record while it waits
    #[serde(default)]
    pub is_parked: bool,
}

impl Checkpoint {
    pub fn processed(&self) -> u64 {
        self.sent_count + self.error_count
    }

    /// Count one attempt and move the cursor to the next pair.
    ///
    /// The destination index wraps to 0 whenever the item index advances.
    pub fn record_attempt(&mut self, delivered: bool, destination_count: usize) {
        if delivered {
            self.sent_count += 1;
        } else {
            self.error_count += 1;
        }

        if self.current_destination_index + 1 < destination_count {
            self.current_destination_index += 1;
        } else {
            self.current_item_index += 1;
            self.current_destination_index = 0;
        }
    }

    pub fn start_waiting(&mut self, countdown_seconds: u64) {
        self.is_waiting = true;
        self.countdown_seconds = countdown_seconds;
    }

    pub fn stop_waiting(&mut self) {
        self.is_waiting = false;
        self.countdown_seconds = 0;
    }
}

/// Job Record Entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub job_type: JobType,
    pub status: JobStatus,
    pub total_units: u64,
    pub processed_units: u64,
    pub checkpoint: Checkpoint,
    pub payload: BroadcastPayload,
    pub created_at: i64, // epoch ms
    pub updated_at: i64, // epoch ms
}

impl JobRecord {
    /// Create a new pending record
    ///
    /// # Arguments
    ///
    /// * `id` - Unique job ID (injected, not generated)
    /// * `job_type` - Tag separating this engine's jobs from others in the store
    /// * `payload` - Broadcast definition
    /// * `total_units` - Number of (item, destination) pairs
    /// * `now_millis` - Creation timestamp (injected, not system time)
    pub fn new(
        id: impl Into<String>,
        job_type: JobType,
        payload: BroadcastPayload,
        total_units: u64,
        now_millis: i64,
    ) -> Self {
        Self {
            id: id.into(),
            job_type,
            status: JobStatus::Pending,
            total_units,
            processed_units: 0,
            checkpoint: Checkpoint::default(),
            payload,
            created_at: now_millis,
            updated_at: now_millis,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Move to `next`. Returns `Ok(false)` when the record already has that status.
    pub fn transition_to(&mut self, next: JobStatus, now_millis: i64) -> Result<bool> {
        if self.status == next {
            return Ok(false);
        }
        if !self.status.can_transition_to(next) {
            return Err(DomainError::InvalidStateTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        self.updated_at = now_millis;
        Ok(true)
    }

    /// Overwrite counters and cursor. Status is never touched here.
    pub fn apply_checkpoint(
        &mut self,
        processed_units: u64,
        checkpoint: &Checkpoint,
        now_millis: i64,
    ) -> Result<()> {
        if self.is_terminal() {
            return Err(DomainError::InvalidStateTransition {
                from: self.status.to_string(),
                to: "checkpoint".to_string(),
            });
        }
        validate_progress(self, processed_units)?;
        self.processed_units = processed_units;
        self.checkpoint = checkpoint.clone();
        self.updated_at = now_millis;
        Ok(())
    }

    /// A paused loop still holds this record: parked and refreshed within `lease_millis`
    pub fn has_parked_loop(&self, now_millis: i64, lease_millis: i64) -> bool {
        self.status == JobStatus::Paused
            && self.checkpoint.is_parked
            && now_millis.saturating_sub(self.updated_at) <= lease_millis
    }

    /// Turn a finished record back into a fresh pending one, keeping its payload
    pub fn rearm(&mut self, now_millis: i64) -> Result<()> {
        if !self.is_terminal() {
            return Err(DomainError::InvalidStateTransition {
                from: self.status.to_string(),
                to: JobStatus::Pending.to_string(),
            });
        }
        self.status = JobStatus::Pending;
        self.processed_units = 0;
        self.checkpoint = Checkpoint::default();
        self.updated_at = now_millis;
        Ok(())
    }
}

/// Shared by every store implementation so they refuse the same writes
pub fn validate_progress(record: &JobRecord, processed_units: u64) -> Result<()> {
    if processed_units > record.total_units {
        return Err(DomainError::ValidationError(format!(
            "processed units {} exceed total {}",
            processed_units, record.total_units
        )));
    }
    if processed_units < record.processed_units {
        return Err(DomainError::ValidationError(format!(
            "processed units cannot go backwards ({} -> {})",
            record.processed_units, processed_units
        )));
    }
    Ok(())
}
