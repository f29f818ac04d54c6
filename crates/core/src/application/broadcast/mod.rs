// Broadcast Service - operator controls over broadcast runs

pub mod start;


pub use start::StartBroadcast;

use crate::application::constants::PARKED_LEASE_POLLS;
use crate::application::control::RunControl;
use crate::application::dispatcher::{DispatchSettings, Dispatcher, PreparedRun, RunOutcome};
use crate::application::progress::{Progress, ProgressReporter};
use crate::domain::{ControlEvent, ControlState, JobId, JobRecord, JobStatus, JobType};
use crate::error::{AppError, Result};
use crate::port::time_provider::{SystemTimeProvider, TimeProvider};
use crate::port::{Catalog, JobRecordStore, MessageRenderer, MessagingGateway};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{info, warn};

/// A dispatch loop owned by this process
struct LocalRun {
    control: RunControl,
    done: watch::Receiver<Option<RunOutcome>>,
}

impl LocalRun {
    fn is_live(&self) -> bool {
        self.done.borrow().is_none() && self.done.has_changed().is_ok()
    }
}

/// Broadcast Service
///
/// Durable status is written first, then the local token (if this process
/// drives the job) is flipped. Runs driven by other processes pick the change
/// up through their status poller.
pub struct BroadcastService {
    store: Arc<dyn JobRecordStore>,
    catalog: Arc<dyn Catalog>,
    gateway: Arc<dyn MessagingGateway>,
    dispatcher: Arc<Dispatcher>,
    reporter: ProgressReporter,
    time_provider: Arc<dyn TimeProvider>,
    job_type: JobType,
    runs: Mutex<HashMap<JobId, LocalRun>>,
}

impl BroadcastService {
    pub fn new(
        store: Arc<dyn JobRecordStore>,
        catalog: Arc<dyn Catalog>,
        gateway: Arc<dyn MessagingGateway>,
        renderer: Arc<dyn MessageRenderer>,
        settings: DispatchSettings,
    ) -> Self {
        let dispatcher = Arc::new(Dispatcher::new(
            store.clone(),
            gateway.clone(),
            renderer,
            settings,
        ));
        Self {
            reporter: ProgressReporter::new(store.clone()),
            store,
            catalog,
            gateway,
            dispatcher,
            time_provider: Arc::new(SystemTimeProvider),
            job_type: JobType::broadcast(),
            runs: Mutex::new(HashMap::new()),
        }
    }

    /// Clock used to judge whether a paused loop elsewhere is still alive
    pub fn with_time_provider(mut self, time_provider: Arc<dyn TimeProvider>) -> Self {
        self.time_provider = time_provider;
        self
    }

    pub fn job_type(&self) -> &JobType {
        &self.job_type
    }

    /// Validate, create and launch a new broadcast
    ///
    /// Nothing is persisted when validation fails, the gateway is not ready,
    /// or a selected id is unknown to the catalog.
    pub async fn start(&self, req: StartBroadcast) -> Result<JobId> {
        let payload = start::validate(req)?;

        let control = RunControl::new();
        control.transition(ControlEvent::Start)?;
        self.ensure_gateway(&control).await?;

        let items = self.catalog.resolve_items(&payload.item_ids).await?;
        let destinations = self
            .catalog
            .resolve_destinations(&payload.destination_ids)
            .await?;

        let job_id = self
            .store
            .create(&self.job_type, &payload, payload.total_units())
            .await?;
        self.store.set_status(&job_id, JobStatus::Running).await?;
        let record = self.store.read(&job_id).await?;

        control.transition(ControlEvent::GatewayReady)?;
        info!(
            job_id = %job_id,
            items = items.len(),
            destinations = destinations.len(),
            total_units = record.total_units,
            "Broadcast started"
        );
        self.launch(
            PreparedRun {
                record,
                items,
                destinations,
            },
            control,
        )
        .await;
        Ok(job_id)
    }

    /// Pause a job (honored by its loop at the next check)
    pub async fn pause(&self, job_id: &JobId) -> Result<()> {
        self.store.set_status(job_id, JobStatus::Paused).await?;
        if let Some(control) = self.live_control(job_id).await {
            control.pause();
        }
        info!(job_id = %job_id, "Pause requested");
        Ok(())
    }

    /// Resume a paused or failed job
    ///
    /// A loop of this process, or one parked in another session that still
    /// holds its lease, is woken through the status alone. Otherwise a new
    /// loop is launched from the checkpoint.
    pub async fn resume(&self, job_id: &JobId) -> Result<()> {
        if let Some(control) = self.live_control(job_id).await {
            self.store.set_status(job_id, JobStatus::Running).await?;
            control.resume();
            info!(job_id = %job_id, "Resume requested");
            return Ok(());
        }

        let record = self.store.read(job_id).await?;
        if record.is_terminal() {
            return Err(AppError::InvalidState(format!(
                "job {} is {} and cannot be resumed",
                job_id, record.status
            )));
        }
        if record.status == JobStatus::Running {
            return Err(AppError::InvalidState(format!(
                "job {} is already running in another session",
                job_id
            )));
        }
        if record.has_parked_loop(self.time_provider.now_millis(), self.parked_lease_millis()) {
            self.store.set_status(job_id, JobStatus::Running).await?;
            info!(job_id = %job_id, "Resume handed to the loop parked in another session");
            return Ok(());
        }

        let control = RunControl::new();
        control.transition(ControlEvent::Start)?;

        let mut run = match PreparedRun::resolve(record, self.catalog.as_ref()).await {
            Ok(run) => run,
            Err(e @ (AppError::Unresolvable(_) | AppError::Validation(_))) => {
                warn!(job_id = %job_id, error = %e, "Resume refused, cancelling job");
                if let Err(err) = self.store.set_status(job_id, JobStatus::Cancelled).await {
                    warn!(job_id = %job_id, error = %err, "Could not cancel unresumable job");
                }
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        self.ensure_gateway(&control).await?;
        self.store.set_status(job_id, JobStatus::Running).await?;
        run.record.status = JobStatus::Running;
        control.transition(ControlEvent::GatewayReady)?;

        info!(
            job_id = %job_id,
            item_index = run.record.checkpoint.current_item_index,
            destination_index = run.record.checkpoint.current_destination_index,
            "Broadcast resumed from checkpoint"
        );
        self.launch(run, control).await;
        Ok(())
    }

    /// Cancel a job; its checkpoint is kept as-is
    pub async fn cancel(&self, job_id: &JobId) -> Result<()> {
        self.store.set_status(job_id, JobStatus::Cancelled).await?;
        if let Some(control) = self.live_control(job_id).await {
            control.cancel();
        }
        info!(job_id = %job_id, "Cancel requested");
        Ok(())
    }

    pub async fn progress(&self, job_id: &JobId) -> Result<Progress> {
        self.reporter.report(job_id).await
    }

    /// Most recent non-terminal broadcast (offered for resume)
    pub async fn find_active(&self) -> Result<Option<JobRecord>> {
        self.store.find_active(&self.job_type).await
    }

    /// Control state of a loop started by this process
    pub async fn local_state(&self, job_id: &JobId) -> Option<ControlState> {
        self.runs
            .lock()
            .await
            .get(job_id)
            .map(|run| run.control.state())
    }

    /// Wait for a local loop to end
    pub async fn wait(&self, job_id: &JobId) -> Result<RunOutcome> {
        let done = self
            .runs
            .lock()
            .await
            .get(job_id)
            .map(|run| run.done.clone());
        let Some(mut done) = done else {
            return Err(AppError::NotFound(format!(
                "no local run for job {}",
                job_id
            )));
        };

        let outcome = done
            .wait_for(Option::is_some)
            .await
            .map_err(|_| AppError::Internal(format!("dispatch task for job {} died", job_id)))?;
        outcome
            .clone()
            .ok_or_else(|| AppError::Internal("dispatch outcome missing".to_string()))
    }

    /// Halt every local loop and leave interrupted jobs `paused`
    ///
    /// # Returns
    /// Number of loops halted
    pub async fn shutdown(&self) -> usize {
        let runs: Vec<(JobId, LocalRun)> = self.runs.lock().await.drain().collect();
        let mut halted = 0;

        for (job_id, mut run) in runs {
            if !run.is_live() {
                continue;
            }
            run.control.halt();

            let outcome = match run.done.wait_for(Option::is_some).await {
                Ok(outcome) => outcome.clone(),
                Err(_) => None,
            };
            if let Some(RunOutcome::Halted(summary)) = outcome {
                if let Err(e) = self.store.set_status(&job_id, JobStatus::Paused).await {
                    warn!(job_id = %job_id, error = %e, "Could not mark halted job paused");
                }
                info!(
                    job_id = %job_id,
                    sent_count = summary.sent_count,
                    error_count = summary.error_count,
                    "Broadcast halted for shutdown"
                );
                halted += 1;
            }
        }

        halted
    }

    async fn ensure_gateway(&self, control: &RunControl) -> Result<()> {
        if self.gateway.check_ready().await {
            return Ok(());
        }
        control.transition(ControlEvent::GatewayUnavailable)?;
        warn!("Messaging gateway not ready, broadcast not started");
        Err(AppError::GatewayUnavailable(
            "messaging gateway is not ready".to_string(),
        ))
    }

    fn parked_lease_millis(&self) -> i64 {
        let lease = self.dispatcher.settings().paused_poll_interval * PARKED_LEASE_POLLS;
        i64::try_from(lease.as_millis()).unwrap_or(i64::MAX)
    }

    async fn live_control(&self, job_id: &JobId) -> Option<RunControl> {
        self.runs
            .lock()
            .await
            .get(job_id)
            .filter(|run| run.is_live())
            .map(|run| run.control.clone())
    }

    async fn launch(&self, run: PreparedRun, control: RunControl) {
        let job_id = run.record.id.clone();
        let (done_tx, done_rx) = watch::channel(None);
        let dispatcher = Arc::clone(&self.dispatcher);
        let task_control = control.clone();

        tokio::spawn(async move {
            let outcome = dispatcher.run(run, task_control).await;
            done_tx.send_replace(Some(outcome));
        });

        self.runs.lock().await.insert(
            job_id,
            LocalRun {
                control,
                done: done_rx,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Destination, Item};
    use crate::port::catalog::mocks::InMemoryCatalog;
    use crate::port::job_store::mocks::InMemoryJobStore;
    use crate::port::messaging_gateway::mocks::MockGateway;
    use crate::port::time_provider::{FixedTimeProvider, SystemTimeProvider};
    use crate::port::PlaceholderRenderer;
    use std::time::Duration;

    struct Fixture {
        store: Arc<InMemoryJobStore>,
        catalog: Arc<InMemoryCatalog>,
        gateway: Arc<MockGateway>,
    }

    impl Fixture {
        fn new() -> Self {
            let catalog = InMemoryCatalog::new(
                vec![
                    Item::new("shoe", "Runner", "SH-1", 49.9).with_image("img/shoe.png"),
                    Item::new("bag", "Tote", "BG-2", 19.0),
                ],
                vec![
                    Destination::new("g1", "Group 1", "addr-1"),
                    Destination::new("g2", "Group 2", "addr-2"),
                ],
            );
            Self {
                store: Arc::new(InMemoryJobStore::new(Arc::new(SystemTimeProvider))),
                catalog: Arc::new(catalog),
                gateway: Arc::new(MockGateway::new()),
            }
        }

        /// A service instance; several may share one store (one per session)
        fn service(&self) -> BroadcastService {
            BroadcastService::new(
                self.store.clone(),
                self.catalog.clone(),
                self.gateway.clone(),
                Arc::new(PlaceholderRenderer),
                DispatchSettings::default(),
            )
        }
    }

    fn request(destination_delay_secs: u64, item_delay_minutes: u64) -> StartBroadcast {
        StartBroadcast {
            item_ids: vec!["shoe".to_string(), "bag".to_string()],
            destination_ids: vec!["g1".to_string(), "g2".to_string()],
            template: "{name} ({code}) {price}".to_string(),
            inter_destination_delay_seconds: destination_delay_secs,
            inter_item_delay_minutes: item_delay_minutes,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_runs_to_completion() {
        let fx = Fixture::new();
        let service = fx.service();

        let job_id = service.start(request(0, 0)).await.unwrap();
        let outcome = service.wait(&job_id).await.unwrap();

        assert!(matches!(outcome, RunOutcome::Completed(_)));
        assert_eq!(outcome.summary().sent_count, 4);
        assert_eq!(service.local_state(&job_id).await, Some(ControlState::Completed));

        let calls = fx.gateway.calls();
        assert_eq!(calls[0].message, "Runner (SH-1) 49.90");
        assert_eq!(calls[0].image_ref.as_deref(), Some("img/shoe.png"));
        assert_eq!(calls[2].image_ref, None);

        let progress = service.progress(&job_id).await.unwrap();
        assert_eq!(progress.status, JobStatus::Completed);
        assert_eq!(progress.processed_units, 4);
        assert!(service.find_active().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rejected_start_leaves_no_record() {
        let fx = Fixture::new();
        let service = fx.service();

        let mut bad = request(0, 0);
        bad.template = String::new();
        assert!(matches!(
            service.start(bad).await.unwrap_err(),
            AppError::Validation(_)
        ));

        fx.gateway.set_ready(false);
        assert!(matches!(
            service.start(request(0, 0)).await.unwrap_err(),
            AppError::GatewayUnavailable(_)
        ));

        fx.gateway.set_ready(true);
        let mut unknown = request(0, 0);
        unknown.item_ids.push("ghost".to_string());
        assert!(matches!(
            service.start(unknown).await.unwrap_err(),
            AppError::Unresolvable(_)
        ));

        assert!(service.find_active().await.unwrap().is_none());
        assert_eq!(fx.gateway.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_and_resume_local_run() {
        let fx = Fixture::new();
        let service = fx.service();

        let job_id = service.start(request(30, 0)).await.unwrap();
        fx.gateway.wait_for_calls(1).await;

        service.pause(&job_id).await.unwrap();
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(fx.gateway.call_count(), 1);
        assert_eq!(service.local_state(&job_id).await, Some(ControlState::Paused));
        assert_eq!(
            service.progress(&job_id).await.unwrap().status,
            JobStatus::Paused
        );

        service.resume(&job_id).await.unwrap();
        let outcome = service.wait(&job_id).await.unwrap();
        assert!(matches!(outcome, RunOutcome::Completed(_)));
        assert_eq!(fx.gateway.call_count(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_from_another_session() {
        let fx = Fixture::new();
        let owner = fx.service();
        let observer = fx.service();

        let job_id = owner.start(request(0, 5)).await.unwrap();
        fx.gateway.wait_for_calls(2).await;

        let active = observer.find_active().await.unwrap().unwrap();
        assert_eq!(active.id, job_id);
        observer.cancel(&job_id).await.unwrap();

        let outcome = owner.wait(&job_id).await.unwrap();
        assert!(matches!(outcome, RunOutcome::Cancelled(_)));
        assert_eq!(fx.gateway.call_count(), 2);
        assert_eq!(
            observer.progress(&job_id).await.unwrap().processed_units,
            2
        );

        let err = observer.resume(&job_id).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_and_resume_from_another_session_reuse_owner_loop() {
        let fx = Fixture::new();
        let owner = fx.service();
        let other = fx.service();

        let job_id = owner.start(request(30, 0)).await.unwrap();
        fx.gateway.wait_for_calls(1).await;

        other.pause(&job_id).await.unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(owner.local_state(&job_id).await, Some(ControlState::Paused));
        assert_eq!(fx.gateway.call_count(), 1);

        other.resume(&job_id).await.unwrap();
        assert_eq!(other.local_state(&job_id).await, None);

        let outcome = owner.wait(&job_id).await.unwrap();
        assert!(matches!(outcome, RunOutcome::Completed(_)));
        assert_eq!(outcome.summary().sent_count, 4);

        let pairs = fx.gateway.sent_pairs();
        assert_eq!(pairs.len(), 4);
        let distinct: std::collections::HashSet<_> = pairs.iter().collect();
        assert_eq!(distinct.len(), 4);
    }

    fn parked_record(updated_at: i64) -> JobRecord {
        let payload = request(0, 0).into_payload();
        let total = payload.total_units();
        let mut record = JobRecord::new("job-parked", JobType::broadcast(), payload, total, 0);
        record.status = JobStatus::Paused;
        record.checkpoint.is_parked = true;
        record.updated_at = updated_at;
        record
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_hands_over_to_fresh_parked_loop() {
        let fx = Fixture::new();
        fx.store.put(parked_record(0));
        let service = fx
            .service()
            .with_time_provider(Arc::new(FixedTimeProvider::new(1_000)));
        let job_id = "job-parked".to_string();

        service.resume(&job_id).await.unwrap();

        assert_eq!(service.local_state(&job_id).await, None);
        assert_eq!(
            service.progress(&job_id).await.unwrap().status,
            JobStatus::Running
        );
        assert_eq!(fx.gateway.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_relaunches_when_parked_lease_expired() {
        let fx = Fixture::new();
        fx.store.put(parked_record(0));
        let service = fx
            .service()
            .with_time_provider(Arc::new(FixedTimeProvider::new(60_000)));
        let job_id = "job-parked".to_string();

        service.resume(&job_id).await.unwrap();
        let outcome = service.wait(&job_id).await.unwrap();

        assert!(matches!(outcome, RunOutcome::Completed(_)));
        assert_eq!(fx.gateway.call_count(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_leaves_job_resumable_after_restart() {
        let fx = Fixture::new();
        let before = fx.service();

        let job_id = before.start(request(0, 5)).await.unwrap();
        fx.gateway.wait_for_calls(2).await;

        assert_eq!(before.shutdown().await, 1);
        assert_eq!(
            before.progress(&job_id).await.unwrap().status,
            JobStatus::Paused
        );

        let after = fx.service();
        after.resume(&job_id).await.unwrap();
        let outcome = after.wait(&job_id).await.unwrap();

        assert!(matches!(outcome, RunOutcome::Completed(_)));
        assert_eq!(fx.gateway.call_count(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_with_deleted_item_cancels_job() {
        let fx = Fixture::new();
        let before = fx.service();

        let job_id = before.start(request(0, 5)).await.unwrap();
        fx.gateway.wait_for_calls(2).await;
        before.shutdown().await;

        fx.catalog.remove_item("bag");
        let after = fx.service();
        let err = after.resume(&job_id).await.unwrap_err();

        assert!(matches!(err, AppError::Unresolvable(_)));
        assert_eq!(
            after.progress(&job_id).await.unwrap().status,
            JobStatus::Cancelled
        );
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let fx = Fixture::new();
        let service = fx.service();
        let missing = "job-404".to_string();

        assert!(matches!(
            service.pause(&missing).await.unwrap_err(),
            AppError::NotFound(_)
        ));
        assert!(matches!(
            service.wait(&missing).await.unwrap_err(),
            AppError::NotFound(_)
        ));
        assert_eq!(service.local_state(&missing).await, None);
    }
}
