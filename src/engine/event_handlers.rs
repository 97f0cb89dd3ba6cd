// src/engine/event_handlers.rs

//! Event handling logic for the core runtime.

use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::resources::ResourceDescription;
use crate::scheduler::{ProfileStore, SchedulerCommand, TaskScheduler};
use crate::types::ActionId;

use super::{RuntimeEvent, RuntimeOptions};

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone)]
pub enum CoreCommand<D> {
    /// Side effect requested by the scheduler.
    Scheduler(SchedulerCommand<D>),
    /// Write the profile snapshot (shutdown only).
    PersistProfiles(ProfileStore),
    /// Request that the process exits.
    RequestExit,
}

/// Decision returned by the core after handling a single `RuntimeEvent`.
#[derive(Debug, Clone)]
pub struct CoreStep<D> {
    pub commands: Vec<CoreCommand<D>>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

impl<D> CoreStep<D> {
    fn running(commands: Vec<CoreCommand<D>>) -> Self {
        Self {
            commands,
            keep_running: true,
        }
    }
}

/// Apply one event to the scheduler.
///
/// Returns `true` if the event closes task submissions.
pub fn apply_event<D: ResourceDescription>(
    scheduler: &mut TaskScheduler<D>,
    event: RuntimeEvent<D>,
) -> Result<bool> {
    match event {
        RuntimeEvent::NewTask(request) => {
            scheduler.submit(request)?;
        }
        RuntimeEvent::CancelTask { task_id } => scheduler.cancel_task(task_id)?,
        RuntimeEvent::SubmissionsClosed => {
            debug!("task submissions closed");
            return Ok(true);
        }
        RuntimeEvent::TransfersCompleted { action, worker } => {
            if is_current_worker(scheduler, action, &worker) {
                scheduler.transfers_completed(action)?;
            }
        }
        RuntimeEvent::TransfersFailed {
            action,
            worker,
            reason,
        } => {
            warn!(action, worker = %worker, %reason, "input transfer failed");
            if is_current_worker(scheduler, action, &worker) {
                scheduler.transfers_failed(action)?;
            }
        }
        RuntimeEvent::JobStarted { action, job } => scheduler.job_started(action, job),
        RuntimeEvent::JobCompleted {
            action,
            job,
            elapsed_ms,
        } => scheduler.job_completed(action, job, elapsed_ms)?,
        RuntimeEvent::JobFailed {
            action,
            job,
            reason,
        } => {
            warn!(action, job, %reason, "job failed");
            scheduler.job_failed(action, job)?;
        }
        RuntimeEvent::WorkerStarted { action } => scheduler.worker_started(action)?,
        RuntimeEvent::WorkerStartFailed { action, reason } => {
            warn!(action, %reason, "worker start failed");
            scheduler.worker_start_failed(action)?;
        }
        RuntimeEvent::WorkerStopped { action } => scheduler.worker_stopped(action)?,
        RuntimeEvent::WorkerReduceFailed { action, reason } => {
            warn!(action, %reason, "worker reduction failed");
            scheduler.worker_reduce_failed(action)?;
        }
        RuntimeEvent::WorkerUpdate { worker, update } => {
            scheduler.update_worker(&worker, update)?;
        }
        RuntimeEvent::CoreElementsUpdated => scheduler.core_elements_updated()?,
        RuntimeEvent::ShutdownRequested => {}
    }
    Ok(false)
}

/// Transfer notifications from an aborted attempt on another worker are
/// stale.
fn is_current_worker<D: ResourceDescription>(scheduler: &TaskScheduler<D>, action: ActionId, worker: &str) -> bool {
    let current = scheduler
        .action(action)
        .and_then(|a| a.assigned_resource())
        .is_some_and(|w| w == worker);
    if !current {
        debug!(action, worker, "ignoring stale transfer notification");
    }
    current
}

/// Commands the scheduler produced, wrapped for the shell.
pub fn drain_scheduler<D: ResourceDescription>(scheduler: &mut TaskScheduler<D>) -> Vec<CoreCommand<D>> {
    scheduler
        .drain_commands()
        .into_iter()
        .map(CoreCommand::Scheduler)
        .collect()
}

/// Build the step following an ordinary event.
///
/// In idle-exit mode the core stops once submissions are closed and every
/// task is finished.
pub fn finish_step<D: ResourceDescription>(
    scheduler: &mut TaskScheduler<D>,
    options: &RuntimeOptions,
    submissions_closed: bool,
) -> CoreStep<D> {
    let mut commands = drain_scheduler(scheduler);
    if options.exit_when_idle && submissions_closed && scheduler.all_tasks_finished() {
        info!(tasks = scheduler.task_count(), "all tasks finished");
        commands.extend(shutdown_commands(scheduler));
        return CoreStep {
            commands,
            keep_running: false,
        };
    }
    CoreStep::running(commands)
}

/// Handle a shutdown request.
pub fn handle_shutdown<D: ResourceDescription>(scheduler: &mut TaskScheduler<D>) -> CoreStep<D> {
    info!("shutdown requested");
    let mut commands = drain_scheduler(scheduler);
    commands.extend(shutdown_commands(scheduler));
    CoreStep {
        commands,
        keep_running: false,
    }
}

fn shutdown_commands<D: ResourceDescription>(scheduler: &mut TaskScheduler<D>) -> Vec<CoreCommand<D>> {
    let summary = scheduler.task_summary();
    for (worker, counts) in &summary.per_worker {
        info!(worker = %worker, executions = ?counts, "task summary");
    }
    info!(total = summary.total_executions(), "executions this session");

    vec![
        CoreCommand::PersistProfiles(scheduler.take_profile_store()),
        CoreCommand::RequestExit,
    ]
}
