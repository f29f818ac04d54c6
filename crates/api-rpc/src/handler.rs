//! RPC Method Handlers
//!
//! Thin adapters from JSON-RPC params to the broadcast service.

use crate::error::to_rpc_error;
use crate::types::{
    ActiveRequest, ActiveResponse, ControlResponse, JobRequest, StartRequest, StartResponse,
};
use jsonrpsee::types::ErrorObjectOwned;
use sendflow_core::application::{BroadcastService, Progress};
use sendflow_core::error::AppError;
use std::sync::Arc;
use tracing::debug;

/// RPC Handler with injected dependencies
pub struct RpcHandler {
    service: Arc<BroadcastService>,
}

impl RpcHandler {
    pub fn new(service: Arc<BroadcastService>) -> Self {
        Self { service }
    }

    /// broadcast.start.v1
    pub async fn start(&self, params: StartRequest) -> Result<StartResponse, ErrorObjectOwned> {
        let job_id = self.service.start(params).await.map_err(to_rpc_error)?;
        let progress = self.service.progress(&job_id).await.map_err(to_rpc_error)?;

        Ok(StartResponse {
            job_id,
            status: progress.status,
            total_units: progress.total_units,
        })
    }

    /// broadcast.pause.v1
    pub async fn pause(&self, params: JobRequest) -> Result<ControlResponse, ErrorObjectOwned> {
        check_job_id(&params)?;
        self.service
            .pause(&params.job_id)
            .await
            .map_err(to_rpc_error)?;
        self.control_response(params.job_id).await
    }

    /// broadcast.resume.v1
    pub async fn resume(&self, params: JobRequest) -> Result<ControlResponse, ErrorObjectOwned> {
        check_job_id(&params)?;
        self.service
            .resume(&params.job_id)
            .await
            .map_err(to_rpc_error)?;
        self.control_response(params.job_id).await
    }

    /// broadcast.cancel.v1
    pub async fn cancel(&self, params: JobRequest) -> Result<ControlResponse, ErrorObjectOwned> {
        check_job_id(&params)?;
        self.service
            .cancel(&params.job_id)
            .await
            .map_err(to_rpc_error)?;
        self.control_response(params.job_id).await
    }

    /// broadcast.progress.v1
    pub async fn progress(&self, params: JobRequest) -> Result<Progress, ErrorObjectOwned> {
        check_job_id(&params)?;
        self.service
            .progress(&params.job_id)
            .await
            .map_err(to_rpc_error)
    }

    /// broadcast.active.v1
    pub async fn active(&self, _params: ActiveRequest) -> Result<ActiveResponse, ErrorObjectOwned> {
        let job = self.service.find_active().await.map_err(to_rpc_error)?;
        debug!(found = job.is_some(), "Active broadcast lookup");
        Ok(ActiveResponse {
            job: job.map(Into::into),
        })
    }

    async fn control_response(&self, job_id: String) -> Result<ControlResponse, ErrorObjectOwned> {
        let progress = self.service.progress(&job_id).await.map_err(to_rpc_error)?;
        let local_state = self.service.local_state(&job_id).await;
        Ok(ControlResponse {
            job_id,
            status: progress.status,
            local_state,
        })
    }
}

fn check_job_id(params: &JobRequest) -> Result<(), ErrorObjectOwned> {
    if params.job_id.trim().is_empty() {
        return Err(to_rpc_error(AppError::Validation(
            "job_id cannot be empty".to_string(),
        )));
    }
    Ok(())
}
