// Job Record Store Port (Interface)

use crate::domain::{BroadcastPayload, Checkpoint, JobId, JobRecord, JobStatus, JobType};
use crate::error::Result;
use async_trait::async_trait;

/// Durable store for job records, shared by every session
///
/// Single-field writes are last-write-wins. The dispatch loop owning a run is
/// the only writer of checkpoint fields; any session may write `status`.
#[async_trait]
pub trait JobRecordStore: Send + Sync {
    /// Create a pending record with a zero checkpoint
    async fn create(
        &self,
        job_type: &JobType,
        payload: &BroadcastPayload,
        total_units: u64,
    ) -> Result<JobId>;

    /// Read a record (`AppError::NotFound` if absent)
    async fn read(&self, id: &JobId) -> Result<JobRecord>;

    /// Write counters and cursor (never status)
    ///
    /// # Errors
    /// - `AppError::InvalidState` if the record is terminal
    /// - `AppError::Validation` if `processed_units` exceeds the total or goes backwards
    async fn update_checkpoint(
        &self,
        id: &JobId,
        processed_units: u64,
        checkpoint: &Checkpoint,
    ) -> Result<()>;

    /// Change status; writing the current status again is a no-op
    ///
    /// # Errors
    /// - `AppError::InvalidState` if the record is terminal or the transition is illegal
    async fn set_status(&self, id: &JobId, status: JobStatus) -> Result<()>;

    /// Most recently updated non-terminal record of a type (used to offer resume)
    async fn find_active(&self, job_type: &JobType) -> Result<Option<JobRecord>>;

    /// All records of a type in a given status, oldest first
    async fn list_by_status(&self, job_type: &JobType, status: JobStatus)
        -> Result<Vec<JobRecord>>;

    /// Turn a terminal record back into a fresh pending one
    async fn rearm(&self, id: &JobId) -> Result<()>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use crate::port::time_provider::TimeProvider;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Inner {
        records: HashMap<JobId, JobRecord>,
        next_id: u64,
        checkpoint_writes: usize,
        fail_checkpoints_after: Option<usize>,
        history: Vec<(u64, Checkpoint)>,
    }

    /// In-memory store with failure injection and a log of checkpoint writes
    pub struct InMemoryJobStore {
        inner: Arc<Mutex<Inner>>,
        time_provider: Arc<dyn TimeProvider>,
    }

    impl InMemoryJobStore {
        pub fn new(time_provider: Arc<dyn TimeProvider>) -> Self {
            Self {
                inner: Arc::new(Mutex::new(Inner::default())),
                time_provider,
            }
        }

        /// Let `n` checkpoint writes succeed, then fail every following one
        pub fn fail_checkpoints_after(&self, n: usize) {
            self.inner.lock().unwrap().fail_checkpoints_after = Some(n);
        }

        /// Every accepted checkpoint write, in order
        pub fn checkpoint_history(&self) -> Vec<(u64, Checkpoint)> {
            self.inner.lock().unwrap().history.clone()
        }

        /// Insert a record as-is (for seeding odd states in tests)
        pub fn put(&self, record: JobRecord) {
            self.inner
                .lock()
                .unwrap()
                .records
                .insert(record.id.clone(), record);
        }

        fn not_found(id: &JobId) -> AppError {
            AppError::NotFound(format!("Job {} not found", id))
        }
    }

    #[async_trait]
    impl JobRecordStore for InMemoryJobStore {
        async fn create(
            &self,
            job_type: &JobType,
            payload: &BroadcastPayload,
            total_units: u64,
        ) -> Result<JobId> {
            let now = self.time_provider.now_millis();
            let mut inner = self.inner.lock().unwrap();
            inner.next_id += 1;
            let id = format!("job-{}", inner.next_id);
            let record = JobRecord::new(
                id.clone(),
                job_type.clone(),
                payload.clone(),
                total_units,
                now,
            );
            inner.records.insert(id.clone(), record);
            Ok(id)
        }

        async fn read(&self, id: &JobId) -> Result<JobRecord> {
            self.inner
                .lock()
                .unwrap()
                .records
                .get(id)
                .cloned()
                .ok_or_else(|| Self::not_found(id))
        }

        async fn update_checkpoint(
            &self,
            id: &JobId,
            processed_units: u64,
            checkpoint: &Checkpoint,
        ) -> Result<()> {
            let now = self.time_provider.now_millis();
            let mut inner = self.inner.lock().unwrap();

            if let Some(limit) = inner.fail_checkpoints_after {
                if inner.checkpoint_writes >= limit {
                    return Err(AppError::Database("injected checkpoint failure".to_string()));
                }
            }

            let record = inner.records.get_mut(id).ok_or_else(|| Self::not_found(id))?;
            record.apply_checkpoint(processed_units, checkpoint, now)?;
            inner.checkpoint_writes += 1;
            inner.history.push((processed_units, checkpoint.clone()));
            Ok(())
        }

        async fn set_status(&self, id: &JobId, status: JobStatus) -> Result<()> {
            let now = self.time_provider.now_millis();
            let mut inner = self.inner.lock().unwrap();
            let record = inner.records.get_mut(id).ok_or_else(|| Self::not_found(id))?;
            record.transition_to(status, now)?;
            Ok(())
        }

        async fn find_active(&self, job_type: &JobType) -> Result<Option<JobRecord>> {
            let inner = self.inner.lock().unwrap();
            Ok(inner
                .records
                .values()
                .filter(|r| &r.job_type == job_type && !r.is_terminal())
                .max_by(|a, b| a.updated_at.cmp(&b.updated_at).then(a.id.cmp(&b.id)))
                .cloned())
        }

        async fn list_by_status(
            &self,
            job_type: &JobType,
            status: JobStatus,
        ) -> Result<Vec<JobRecord>> {
            let inner = self.inner.lock().unwrap();
            let mut records: Vec<JobRecord> = inner
                .records
                .values()
                .filter(|r| &r.job_type == job_type && r.status == status)
                .cloned()
                .collect();
            records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
            Ok(records)
        }

        async fn rearm(&self, id: &JobId) -> Result<()> {
            let now = self.time_provider.now_millis();
            let mut inner = self.inner.lock().unwrap();
            let record = inner.records.get_mut(id).ok_or_else(|| Self::not_found(id))?;
            record.rearm(now)?;
            Ok(())
        }
    }
}
