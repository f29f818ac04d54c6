// Startup recovery for runs orphaned by a crash
use crate::domain::{JobStatus, JobType};
use crate::port::JobRecordStore;
use std::sync::Arc;
use tracing::{info, warn};

/// Crash recovery service
///
/// On daemon startup no dispatch loop is alive yet, so every record still
/// `running` was left behind by a dead process. Such records are marked
/// `failed`; their checkpoint stays intact and they resume like a pause.
pub struct RecoveryService {
    store: Arc<dyn JobRecordStore>,
    job_type: JobType,
}

impl RecoveryService {
    pub fn new(store: Arc<dyn JobRecordStore>, job_type: JobType) -> Self {
        Self { store, job_type }
    }

    /// Mark orphaned runs failed
    ///
    /// # Returns
    /// Number of records recovered
    pub async fn recover_interrupted(&self) -> crate::error::Result<usize> {
        let orphaned = self
            .store
            .list_by_status(&self.job_type, JobStatus::Running)
            .await?;

        if orphaned.is_empty() {
            return Ok(0);
        }
        info!(count = orphaned.len(), "Recovering interrupted broadcasts");

        let mut recovered = 0;
        for record in orphaned {
            match self.store.set_status(&record.id, JobStatus::Failed).await {
                Ok(()) => {
                    info!(
                        job_id = %record.id,
                        processed_units = record.processed_units,
                        total_units = record.total_units,
                        "Interrupted broadcast marked failed (resumable)"
                    );
                    recovered += 1;
                }
                Err(e) => {
                    // Another session may have changed it in between
                    warn!(job_id = %record.id, error = %e, "Failed to recover broadcast");
                }
            }
        }

        Ok(recovered)
    }
}
