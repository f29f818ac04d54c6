// Remote Status Poller - bridges durable status written by any session to the local token

use crate::application::control::RunControl;
use crate::domain::{JobId, JobStatus};
use crate::port::JobRecordStore;
use std::sync::Arc;
use tracing::{info, warn};

/// Re-reads a job's status and flips the run's control token to match
pub struct RemoteStatusPoller {
    store: Arc<dyn JobRecordStore>,
    job_id: JobId,
}

impl RemoteStatusPoller {
    pub fn new(store: Arc<dyn JobRecordStore>, job_id: JobId) -> Self {
        Self { store, job_id }
    }

    /// Read the status once and apply it
    ///
    /// A failed read is logged and skipped: the next checkpoint write surfaces
    /// a store that stays unreachable.
    pub async fn poll(&self, control: &RunControl) -> Option<JobStatus> {
        let status = match self.store.read(&self.job_id).await {
            Ok(record) => record.status,
            Err(e) => {
                warn!(job_id = %self.job_id, error = %e, "Status poll failed");
                return None;
            }
        };

        if control.stop_reason().is_some() {
            return Some(status);
        }

        match status {
            JobStatus::Paused if !control.is_paused() => {
                info!(job_id = %self.job_id, "Pause requested by another session");
                control.pause();
            }
            JobStatus::Running if control.is_paused() => {
                info!(job_id = %self.job_id, "Resume requested by another session");
                control.resume();
            }
            JobStatus::Cancelled => {
                info!(job_id = %self.job_id, "Cancel requested by another session");
                control.cancel();
            }
            JobStatus::Completed => {
                // Another loop finished this job; nothing left for us to do
                warn!(job_id = %self.job_id, "Job completed elsewhere, halting local run");
                control.halt();
            }
            _ => {}
        }
        Some(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::control::StopReason;
    use crate::domain::{BroadcastPayload, JobType};
    use crate::port::job_store::mocks::InMemoryJobStore;
    use crate::port::time_provider::SystemTimeProvider;

    async fn running_job(store: &InMemoryJobStore) -> JobId {
        let payload = BroadcastPayload {
            item_ids: vec!["a".to_string()],
            destination_ids: vec!["x".to_string()],
            template: "{name}".to_string(),
            inter_destination_delay_seconds: 0,
            inter_item_delay_minutes: 0,
        };
        let id = store
            .create(&JobType::broadcast(), &payload, 1)
            .await
            .unwrap();
        store.set_status(&id, JobStatus::Running).await.unwrap();
        id
    }

    #[tokio::test]
    async fn test_remote_pause_and_resume() {
        let store = Arc::new(InMemoryJobStore::new(Arc::new(SystemTimeProvider)));
        let id = running_job(&store).await;
        let poller = RemoteStatusPoller::new(store.clone(), id.clone());
        let control = RunControl::new();

        assert_eq!(poller.poll(&control).await, Some(JobStatus::Running));
        assert!(!control.is_paused());

        store.set_status(&id, JobStatus::Paused).await.unwrap();
        poller.poll(&control).await;
        assert!(control.is_paused());

        store.set_status(&id, JobStatus::Running).await.unwrap();
        poller.poll(&control).await;
        assert!(!control.is_paused());
    }

    #[tokio::test]
    async fn test_remote_cancel() {
        let store = Arc::new(InMemoryJobStore::new(Arc::new(SystemTimeProvider)));
        let id = running_job(&store).await;
        let poller = RemoteStatusPoller::new(store.clone(), id.clone());
        let control = RunControl::new();

        store.set_status(&id, JobStatus::Cancelled).await.unwrap();
        assert_eq!(poller.poll(&control).await, Some(JobStatus::Cancelled));
        assert_eq!(control.stop_reason(), Some(StopReason::Cancelled));
    }

    #[tokio::test]
    async fn test_missing_record_is_not_fatal() {
        let store = Arc::new(InMemoryJobStore::new(Arc::new(SystemTimeProvider)));
        let poller = RemoteStatusPoller::new(store, "job-404".to_string());
        let control = RunControl::new();

        assert_eq!(poller.poll(&control).await, None);
        assert_eq!(control.stop_reason(), None);
    }
}
