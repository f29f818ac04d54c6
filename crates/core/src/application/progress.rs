// Progress Reporter - read projection of a JobRecord for observers

use crate::domain::{JobId, JobRecord, JobStatus};
use crate::error::Result;
use crate::port::JobRecordStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// What an observer needs to render a progress bar and a countdown
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub job_id: JobId,
    pub status: JobStatus,
    pub sent_count: u64,
    pub error_count: u64,
    pub total_units: u64,
    pub processed_units: u64,
    pub current_item_index: usize,
    pub item_count: usize,
    pub is_waiting: bool,
    pub countdown_seconds: u64,
    /// Sum of the waits still ahead; gateway latency is not included
    pub estimated_remaining_seconds: u64,
    pub updated_at: i64,
}

pub struct ProgressReporter {
    store: Arc<dyn JobRecordStore>,
}

impl ProgressReporter {
    pub fn new(store: Arc<dyn JobRecordStore>) -> Self {
        Self { store }
    }

    pub async fn report(&self, job_id: &JobId) -> Result<Progress> {
        let record = self.store.read(job_id).await?;
        Ok(Self::project(&record))
    }

    pub fn project(record: &JobRecord) -> Progress {
        let cp = &record.checkpoint;
        Progress {
            job_id: record.id.clone(),
            status: record.status,
            sent_count: cp.sent_count,
            error_count: cp.error_count,
            total_units: record.total_units,
            processed_units: record.processed_units,
            current_item_index: cp.current_item_index,
            item_count: record.payload.item_ids.len(),
            is_waiting: cp.is_waiting,
            countdown_seconds: cp.countdown_seconds,
            estimated_remaining_seconds: estimate_remaining_seconds(record),
            updated_at: record.updated_at,
        }
    }
}

/// Waits still ahead of the cursor
pub fn estimate_remaining_seconds(record: &JobRecord) -> u64 {
    let cp = &record.checkpoint;
    let items = record.payload.item_ids.len() as u64;
    let destinations = record.payload.destination_ids.len() as u64;
    let item_index = cp.current_item_index as u64;

    if record.is_terminal() || item_index >= items || destinations == 0 {
        return 0;
    }

    let destination_gap = record.payload.inter_destination_delay_seconds;
    let item_gap = record.payload.inter_item_delay().as_secs();
    let destination_index = (cp.current_destination_index as u64).min(destinations - 1);

    // Gaps left inside the current item
    let current = (destinations - 1 - destination_index) * destination_gap;
    // Each remaining item: its own destination gaps plus the item gap before it
    let later = (items - item_index - 1) * ((destinations - 1) * destination_gap + item_gap);
    let countdown = if cp.is_waiting { cp.countdown_seconds } else { 0 };

    current + later + countdown
}
