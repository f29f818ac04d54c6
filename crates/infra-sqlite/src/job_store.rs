// SQLite JobRecordStore Implementation

use crate::error::{map_sqlx_error, placeholders, to_i64, to_u64, to_usize};
use async_trait::async_trait;
use sendflow_core::domain::{
    BroadcastPayload, Checkpoint, DomainError, JobId, JobRecord, JobStatus, JobType,
};
use sendflow_core::error::{AppError, Result};
use sendflow_core::port::{IdProvider, JobRecordStore, TimeProvider};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::debug;

const TERMINAL_STATUSES: &str = "('completed', 'cancelled')";

pub struct SqliteJobStore {
    pool: SqlitePool,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
}

impl SqliteJobStore {
    pub fn new(
        pool: SqlitePool,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            pool,
            id_provider,
            time_provider,
        }
    }

    async fn fetch(&self, id: &JobId) -> Result<Option<JobRecord>> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM broadcast_jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(JobRow::into_record).transpose()
    }

    fn not_found(id: &JobId) -> AppError {
        AppError::NotFound(format!("Job {} not found", id))
    }
}

#[async_trait]
impl JobRecordStore for SqliteJobStore {
    async fn create(
        &self,
        job_type: &JobType,
        payload: &BroadcastPayload,
        total_units: u64,
    ) -> Result<JobId> {
        let id = self.id_provider.generate_id();
        let now = self.time_provider.now_millis();
        let payload_json = serde_json::to_string(payload)?;

        sqlx::query(
            r#"
            INSERT INTO broadcast_jobs (
                id, job_type, status, total_units, processed_units,
                current_item_index, current_destination_index,
                sent_count, error_count, countdown_seconds, is_waiting,
                payload, created_at, updated_at
            ) VALUES (?, ?, ?, ?, 0, 0, 0, 0, 0, 0, 0, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(job_type.as_str())
        .bind(JobStatus::Pending.as_str())
        .bind(to_i64(total_units))
        .bind(&payload_json)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        debug!(job_id = %id, total_units, "Job record created");
        Ok(id)
    }

    async fn read(&self, id: &JobId) -> Result<JobRecord> {
        self.fetch(id).await?.ok_or_else(|| Self::not_found(id))
    }

    async fn update_checkpoint(
        &self,
        id: &JobId,
        processed_units: u64,
        checkpoint: &Checkpoint,
    ) -> Result<()> {
        let now = self.time_provider.now_millis();
        let processed = to_i64(processed_units);

        // Conditional update: terminal records and out-of-range counters are refused in SQL
        let result = sqlx::query(&format!(
            r#"
            UPDATE broadcast_jobs
            SET processed_units = ?,
                current_item_index = ?, current_destination_index = ?,
                sent_count = ?, error_count = ?,
                countdown_seconds = ?, is_waiting = ?, is_parked = ?,
                updated_at = ?
            WHERE id = ?
              AND status NOT IN {}
              AND ? <= total_units
              AND ? >= processed_units
            "#,
            TERMINAL_STATUSES
        ))
        .bind(processed)
        .bind(checkpoint.current_item_index as i64)
        .bind(checkpoint.current_destination_index as i64)
        .bind(to_i64(checkpoint.sent_count))
        .bind(to_i64(checkpoint.error_count))
        .bind(to_i64(checkpoint.countdown_seconds))
        .bind(checkpoint.is_waiting)
        .bind(checkpoint.is_parked)
        .bind(now)
        .bind(id)
        .bind(processed)
        .bind(processed)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() > 0 {
            return Ok(());
        }

        // Nothing written: let the domain explain why
        let mut record = self.fetch(id).await?.ok_or_else(|| Self::not_found(id))?;
        record.apply_checkpoint(processed_units, checkpoint, now)?;
        Err(AppError::InvalidState(format!(
            "Checkpoint for job {} changed concurrently",
            id
        )))
    }

    async fn set_status(&self, id: &JobId, status: JobStatus) -> Result<()> {
        let now = self.time_provider.now_millis();
        let allowed_from: Vec<&str> = JobStatus::ALL
            .iter()
            .filter(|from| from.can_transition_to(status))
            .map(JobStatus::as_str)
            .collect();

        if !allowed_from.is_empty() {
            // Conditional update: the transition table is enforced by the WHERE clause
            let sql = format!(
                "UPDATE broadcast_jobs SET status = ?, updated_at = ? WHERE id = ? AND status IN ({})",
                placeholders(allowed_from.len())
            );
            let mut query = sqlx::query(&sql).bind(status.as_str()).bind(now).bind(id);
            for from in &allowed_from {
                query = query.bind(*from);
            }
            let result = query.execute(&self.pool).await.map_err(map_sqlx_error)?;
            if result.rows_affected() > 0 {
                debug!(job_id = %id, status = %status, "Job status updated");
                return Ok(());
            }
        }

        let current: Option<String> =
            sqlx::query_scalar("SELECT status FROM broadcast_jobs WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        match current {
            None => Err(Self::not_found(id)),
            Some(current) if current == status.as_str() => Ok(()),
            Some(current) => Err(DomainError::InvalidStateTransition {
                from: current,
                to: status.to_string(),
            }
            .into()),
        }
    }

    async fn find_active(&self, job_type: &JobType) -> Result<Option<JobRecord>> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            r#"
            SELECT * FROM broadcast_jobs
            WHERE job_type = ? AND status NOT IN {}
            ORDER BY updated_at DESC, id DESC
            LIMIT 1
            "#,
            TERMINAL_STATUSES
        ))
        .bind(job_type.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(JobRow::into_record).transpose()
    }

    async fn list_by_status(
        &self,
        job_type: &JobType,
        status: JobStatus,
    ) -> Result<Vec<JobRecord>> {
        let rows: Vec<JobRow> = sqlx::query_as(
            r#"
            SELECT * FROM broadcast_jobs
            WHERE job_type = ? AND status = ?
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(job_type.as_str())
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(JobRow::into_record).collect()
    }

    async fn rearm(&self, id: &JobId) -> Result<()> {
        let now = self.time_provider.now_millis();

        let result = sqlx::query(&format!(
            r#"
            UPDATE broadcast_jobs
            SET status = 'pending', processed_units = 0,
                current_item_index = 0, current_destination_index = 0,
                sent_count = 0, error_count = 0,
                countdown_seconds = 0, is_waiting = 0, is_parked = 0,
                updated_at = ?
            WHERE id = ? AND status IN {}
            "#,
            TERMINAL_STATUSES
        ))
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() > 0 {
            return Ok(());
        }

        let mut record = self.fetch(id).await?.ok_or_else(|| Self::not_found(id))?;
        record.rearm(now)?;
        Err(AppError::InvalidState(format!(
            "Job {} changed concurrently",
            id
        )))
    }
}

/// SQLite row representation
#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: String,
    job_type: String,
    status: String,
    total_units: i64,
    processed_units: i64,
    current_item_index: i64,
    current_destination_index: i64,
    sent_count: i64,
    error_count: i64,
    countdown_seconds: i64,
    is_waiting: bool,
    is_parked: bool,
    payload: String,
    created_at: i64,
    updated_at: i64,
}

impl JobRow {
    fn into_record(self) -> Result<JobRecord> {
        let status: JobStatus = self.status.parse()?;
        let payload: BroadcastPayload = serde_json::from_str(&self.payload)?;

        Ok(JobRecord {
            id: self.id,
            job_type: JobType::new(self.job_type),
            status,
            total_units: to_u64(self.total_units),
            processed_units: to_u64(self.processed_units),
            checkpoint: Checkpoint {
                current_item_index: to_usize(self.current_item_index),
                current_destination_index: to_usize(self.current_destination_index),
                sent_count: to_u64(self.sent_count),
                error_count: to_u64(self.error_count),
                countdown_seconds: to_u64(self.countdown_seconds),
                is_waiting: self.is_waiting,
                is_parked: self.is_parked,
            },
            payload,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
