// Dispatch Loop - walks items x destinations, one send per pair, checkpoint after each


use crate::application::constants::{
    DEFAULT_PAUSED_POLL_INTERVAL, DEFAULT_POLL_EVERY_TICKS, DEFAULT_TICK,
};
use crate::application::control::{RunControl, StopReason};
use crate::application::rate_controller::{Countdown, RateController, Tick};
use crate::application::status_poller::RemoteStatusPoller;
use crate::domain::{Checkpoint, ControlEvent, Destination, Item, JobId, JobRecord, JobStatus};
use crate::error::{AppError, Result};
use crate::port::{Catalog, JobRecordStore, MessageRenderer, MessagingGateway};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Timing knobs of the loop
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    /// Granularity of every wait
    pub tick: Duration,
    /// Remote status is re-read every N ticks during waits
    pub poll_every_ticks: u32,
    /// Store re-read interval while paused
    pub paused_poll_interval: Duration,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            tick: DEFAULT_TICK,
            poll_every_ticks: DEFAULT_POLL_EVERY_TICKS,
            paused_poll_interval: DEFAULT_PAUSED_POLL_INTERVAL,
        }
    }
}

/// A record whose payload was resolved against the catalog
#[derive(Debug, Clone)]
pub struct PreparedRun {
    pub record: JobRecord,
    pub items: Vec<Item>,
    pub destinations: Vec<Destination>,
}

impl PreparedRun {
    /// Resolve the persisted ids and check the checkpoint still fits them
    ///
    /// # Errors
    /// - `AppError::Validation` if the payload itself is invalid
    /// - `AppError::Unresolvable` if ids are gone or the cursor points outside the payload
    pub async fn resolve(record: JobRecord, catalog: &dyn Catalog) -> Result<Self> {
        record.payload.validate()?;

        let items = catalog.resolve_items(&record.payload.item_ids).await?;
        let destinations = catalog
            .resolve_destinations(&record.payload.destination_ids)
            .await?;

        let cp = &record.checkpoint;
        let cursor_fits = if cp.current_item_index == items.len() {
            cp.current_destination_index == 0
        } else {
            cp.current_item_index < items.len() && cp.current_destination_index < destinations.len()
        };
        if !cursor_fits {
            return Err(AppError::Unresolvable(format!(
                "checkpoint ({}, {}) outside {} items x {} destinations",
                cp.current_item_index,
                cp.current_destination_index,
                items.len(),
                destinations.len()
            )));
        }
        if record.total_units != record.payload.total_units() {
            return Err(AppError::Unresolvable(format!(
                "total units {} do not match payload ({})",
                record.total_units,
                record.payload.total_units()
            )));
        }

        Ok(Self {
            record,
            items,
            destinations,
        })
    }
}

/// Final counters of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub job_id: JobId,
    pub sent_count: u64,
    pub error_count: u64,
    pub total_units: u64,
}

impl RunSummary {
    fn from_checkpoint(job_id: &JobId, total_units: u64, cp: &Checkpoint) -> Self {
        Self {
            job_id: job_id.clone(),
            sent_count: cp.sent_count,
            error_count: cp.error_count,
            total_units,
        }
    }
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed(RunSummary),
    Cancelled(RunSummary),
    /// Stopped by shutdown; the record stays resumable
    Halted(RunSummary),
    Failed { summary: RunSummary, reason: String },
}

impl RunOutcome {
    pub fn summary(&self) -> &RunSummary {
        match self {
            RunOutcome::Completed(s) | RunOutcome::Cancelled(s) | RunOutcome::Halted(s) => s,
            RunOutcome::Failed { summary, .. } => summary,
        }
    }
}

enum Exit {
    Finished,
    Stopped(StopReason),
}

/// In-memory cursor plus the last checkpoint the store accepted
struct RunState {
    cursor: Checkpoint,
    durable: Checkpoint,
}

/// Sequential worker for one job at a time
pub struct Dispatcher {
    store: Arc<dyn JobRecordStore>,
    gateway: Arc<dyn MessagingGateway>,
    renderer: Arc<dyn MessageRenderer>,
    settings: DispatchSettings,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn JobRecordStore>,
        gateway: Arc<dyn MessagingGateway>,
        renderer: Arc<dyn MessageRenderer>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            store,
            gateway,
            renderer,
            settings,
        }
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    /// Drive a prepared run until it completes, stops or fails
    ///
    /// The record must already be `running`. Never returns an error: storage
    /// failures end the run as `Failed` with the status written best-effort.
    pub async fn run(&self, run: PreparedRun, control: RunControl) -> RunOutcome {
        let span = info_span!("dispatch", job_id = %run.record.id);
        self.execute(run, control).instrument(span).await
    }

    async fn execute(&self, run: PreparedRun, control: RunControl) -> RunOutcome {
        let job_id = run.record.id.clone();
        let total_units = run.record.total_units;
        let mut cursor = run.record.checkpoint.clone();
        // Left over by a loop that died while paused
        cursor.is_parked = false;
        let mut state = RunState {
            cursor,
            durable: run.record.checkpoint.clone(),
        };

        info!(
            items = run.items.len(),
            destinations = run.destinations.len(),
            item_index = state.cursor.current_item_index,
            destination_index = state.cursor.current_destination_index,
            sent_count = state.cursor.sent_count,
            error_count = state.cursor.error_count,
            "Dispatch started"
        );

        let result = self.drive(&run, &mut state, &control).await;
        let summary = RunSummary::from_checkpoint(&job_id, total_units, &state.durable);

        match result {
            Ok(Exit::Finished) => match self.store.set_status(&job_id, JobStatus::Completed).await {
                Ok(()) => {
                    mark(&control, ControlEvent::Finished);
                    info!(
                        sent_count = summary.sent_count,
                        error_count = summary.error_count,
                        total_units,
                        "Broadcast completed"
                    );
                    RunOutcome::Completed(summary)
                }
                Err(e) => self.fail(&job_id, &control, summary, e).await,
            },
            Ok(Exit::Stopped(StopReason::Cancelled)) => {
                // No-op when another session already wrote it
                if let Err(e) = self.store.set_status(&job_id, JobStatus::Cancelled).await {
                    warn!(error = %e, "Could not record cancellation");
                }
                mark(&control, ControlEvent::Cancel);
                info!(
                    sent_count = summary.sent_count,
                    error_count = summary.error_count,
                    "Broadcast cancelled"
                );
                RunOutcome::Cancelled(summary)
            }
            Ok(Exit::Stopped(StopReason::Halted)) => {
                info!(
                    processed_units = state.durable.processed(),
                    "Dispatch halted, job left resumable"
                );
                RunOutcome::Halted(summary)
            }
            Err(e) => self.fail(&job_id, &control, summary, e).await,
        }
    }

    async fn fail(
        &self,
        job_id: &JobId,
        control: &RunControl,
        summary: RunSummary,
        err: AppError,
    ) -> RunOutcome {
        // A write refused because the record was cancelled meanwhile is not a crash
        if let Ok(record) = self.store.read(job_id).await {
            if record.status == JobStatus::Cancelled {
                control.cancel();
                mark(control, ControlEvent::Cancel);
                info!("Broadcast cancelled by another session");
                return RunOutcome::Cancelled(summary);
            }
        }

        error!(error = %err, "Dispatch failed");
        mark(control, ControlEvent::Crashed);
        if let Err(e) = self.store.set_status(job_id, JobStatus::Failed).await {
            warn!(error = %e, "Could not record failure");
        }
        RunOutcome::Failed {
            summary,
            reason: err.to_string(),
        }
    }

    async fn drive(
        &self,
        run: &PreparedRun,
        state: &mut RunState,
        control: &RunControl,
    ) -> Result<Exit> {
        let job_id = &run.record.id;
        let poller = RemoteStatusPoller::new(self.store.clone(), job_id.clone());
        let rate = RateController::for_payload(&run.record.payload, self.settings.tick);
        let item_count = run.items.len();
        let destination_count = run.destinations.len();

        // Restarted in the middle of an inter-item wait: finish what was left of it
        if state.cursor.is_waiting {
            let left = Duration::from_secs(state.cursor.countdown_seconds);
            if let Some(exit) = self
                .wait(rate.countdown(left), job_id, state, &poller, control, true)
                .await?
            {
                return Ok(exit);
            }
        }

        while state.cursor.current_item_index < item_count {
            let item_index = state.cursor.current_item_index;
            let item = &run.items[item_index];

            let message = match self.renderer.render(&run.record.payload.template, item) {
                Ok(message) => Some(message),
                Err(e) => {
                    warn!(item_index, item_id = %item.id, error = %e, "Message render failed, counting item as errors");
                    None
                }
            };

            while state.cursor.current_item_index == item_index {
                let destination_index = state.cursor.current_destination_index;
                let destination = &run.destinations[destination_index];

                poller.poll(control).await;
                if let Some(reason) = self.gate(job_id, state, &poller, control).await? {
                    return Ok(Exit::Stopped(reason));
                }

                let delivered = match &message {
                    Some(text) => {
                        match self
                            .gateway
                            .send(destination, text, item.image_ref.as_deref())
                            .await
                        {
                            Ok(()) => {
                                debug!(item_index, destination_index, destination_id = %destination.id, "Delivered");
                                true
                            }
                            Err(e) => {
                                warn!(item_index, destination_index, destination_id = %destination.id, error = %e, "Delivery failed");
                                false
                            }
                        }
                    }
                    None => false,
                };

                state.cursor.record_attempt(delivered, destination_count);
                if let Some(reason) = self.persist(job_id, state, control).await? {
                    return Ok(Exit::Stopped(reason));
                }

                if state.cursor.current_item_index == item_index {
                    if let Some(exit) = self
                        .wait(rate.destination_gap(), job_id, state, &poller, control, false)
                        .await?
                    {
                        return Ok(exit);
                    }
                }
            }

            info!(
                item_index,
                sent_count = state.cursor.sent_count,
                error_count = state.cursor.error_count,
                "Item dispatched"
            );

            if let Some(exit) = self
                .wait(rate.item_gap(item_index, item_count), job_id, state, &poller, control, true)
                .await?
            {
                return Ok(exit);
            }
        }

        Ok(Exit::Finished)
    }

    /// Block while paused; report a pending stop
    async fn gate(
        &self,
        job_id: &JobId,
        state: &mut RunState,
        poller: &RemoteStatusPoller,
        control: &RunControl,
    ) -> Result<Option<StopReason>> {
        self.hold(job_id, state, poller, control).await?;
        Ok(control.stop_reason())
    }

    /// Park the loop until resumed or stopped, re-reading the store meanwhile
    ///
    /// While parked the checkpoint carries `is_parked` and is rewritten after
    /// every paused poll. A session resuming the job from elsewhere uses that
    /// lease to hand the job back to this loop instead of starting another one.
    async fn hold(
        &self,
        job_id: &JobId,
        state: &mut RunState,
        poller: &RemoteStatusPoller,
        control: &RunControl,
    ) -> Result<()> {
        if !control.is_paused() || control.stop_reason().is_some() {
            return Ok(());
        }

        mark(control, ControlEvent::Pause);
        info!("Dispatch paused");

        state.cursor.is_parked = true;
        self.persist(job_id, state, control).await?;

        let mut pause_rx = control.pause_watch();
        while control.is_paused() && control.stop_reason().is_none() {
            tokio::select! {
                _ = control.stopped() => break,
                changed = pause_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = sleep(self.settings.paused_poll_interval) => {
                    poller.poll(control).await;
                    if control.is_paused() && control.stop_reason().is_none() {
                        self.persist(job_id, state, control).await?;
                    }
                }
            }
        }

        state.cursor.is_parked = false;
        self.persist(job_id, state, control).await?;

        if control.stop_reason().is_none() {
            mark(control, ControlEvent::Resume);
            info!("Dispatch resumed");
        }
        Ok(())
    }

    /// Run a countdown to the end. `publish` mirrors it into the checkpoint.
    async fn wait(
        &self,
        countdown: Option<Countdown>,
        job_id: &JobId,
        state: &mut RunState,
        poller: &RemoteStatusPoller,
        control: &RunControl,
        publish: bool,
    ) -> Result<Option<Exit>> {
        let Some(mut countdown) = countdown else {
            if publish && state.cursor.is_waiting {
                state.cursor.stop_waiting();
                if let Some(reason) = self.persist(job_id, state, control).await? {
                    return Ok(Some(Exit::Stopped(reason)));
                }
            }
            return Ok(None);
        };

        debug!(seconds = countdown.remaining_secs(), publish, "Waiting");
        if publish {
            state.cursor.start_waiting(countdown.remaining_secs());
            if let Some(reason) = self.persist(job_id, state, control).await? {
                return Ok(Some(Exit::Stopped(reason)));
            }
        }

        let poll_every = self.settings.poll_every_ticks.max(1);
        let mut ticks: u32 = 0;
        loop {
            match countdown.tick(control).await {
                Tick::Elapsed => break,
                Tick::Remaining(_) => {
                    ticks = ticks.wrapping_add(1);
                    if publish {
                        state.cursor.countdown_seconds = countdown.remaining_secs();
                        if let Some(reason) = self.persist(job_id, state, control).await? {
                            return Ok(Some(Exit::Stopped(reason)));
                        }
                    }
                    if ticks % poll_every == 0 {
                        poller.poll(control).await;
                    }
                }
                Tick::Paused => self.hold(job_id, state, poller, control).await?,
                Tick::Stopped => {
                    let reason = control.stop_reason().unwrap_or(StopReason::Halted);
                    return Ok(Some(Exit::Stopped(reason)));
                }
            }
        }

        if publish {
            state.cursor.stop_waiting();
            if let Some(reason) = self.persist(job_id, state, control).await? {
                return Ok(Some(Exit::Stopped(reason)));
            }
        }
        Ok(None)
    }

    /// Write the cursor. A refusal caused by a remote terminal status stops the run.
    async fn persist(
        &self,
        job_id: &JobId,
        state: &mut RunState,
        control: &RunControl,
    ) -> Result<Option<StopReason>> {
        let processed = state.cursor.processed();
        let err = match self
            .store
            .update_checkpoint(job_id, processed, &state.cursor)
            .await
        {
            Ok(()) => {
                state.durable = state.cursor.clone();
                return Ok(None);
            }
            Err(e) => e,
        };

        match self.store.read(job_id).await {
            Ok(record) if record.status == JobStatus::Cancelled => {
                info!(processed_units = record.processed_units, "Checkpoint refused, job cancelled by another session");
                state.durable = record.checkpoint;
                control.cancel();
                Ok(Some(StopReason::Cancelled))
            }
            Ok(record) if record.status == JobStatus::Completed => {
                warn!("Checkpoint refused, job completed elsewhere");
                state.durable = record.checkpoint;
                control.halt();
                Ok(Some(StopReason::Halted))
            }
            _ => Err(err),
        }
    }
}

/// Apply a control event; a rejected one is logged, never fatal to the run
fn mark(control: &RunControl, event: ControlEvent) {
    if let Err(e) = control.transition(event) {
        debug!(?event, error = %e, "Control event ignored");
    }
}
