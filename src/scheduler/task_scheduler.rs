// src/scheduler/task_scheduler.rs

//! The scheduling engine.
//!
//! `TaskScheduler` owns every action, every per-worker scheduler, the global
//! blocked set and the ready counters. It is a synchronous state machine:
//! operations mutate state and append [`SchedulerCommand`]s to an outbox
//! that the caller drains and executes. It must only ever be driven from a
//! single owner (see `engine::CoreRuntime`).

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use crate::core_elements::CoreManager;
use crate::errors::{FlowschedError, Result};
use crate::resources::{ResourceDescription, ResourceUpdate, UpdateKind};
use crate::scheduler::action::{
    Action, ActionArena, ActionKind, ActionState, AttemptOutcome, ExecutionTask,
};
use crate::scheduler::action_set::ActionSet;
use crate::scheduler::assignment::{ScheduleOutcome, candidate_workers, find_assignment};
use crate::scheduler::commands::{
    JobSpec, SchedulerCommand, TaskOutcome, TaskReport, TaskRequest,
};
use crate::scheduler::execution::{
    ErrorDecision, ExecutionState, RetryPolicy, SubmissionDecision, TransferDecision,
};
use crate::scheduler::profile::Profile;
use crate::scheduler::resource_scheduler::ResourceScheduler;
use crate::scheduler::score::Score;
use crate::scheduler::scoring::Scorer;
use crate::scheduler::state::ProfileStore;
use crate::scheduler::workload::{
    CoreWorkload, GraphEdge, GraphNode, SchedulerSnapshot, TaskSummary, WorkerView, WorkloadState,
};
use crate::types::{ActionId, CoreId, ImplId, JobId, OnFailure, TaskId, WorkerName};

/// Where an action currently lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionLocation {
    /// Running on the worker.
    Hosted(WorkerName),
    /// Assigned and queued for capacity on the worker.
    Waiting(WorkerName),
    /// Assigned, not launched yet (usually waiting for predecessors).
    Assigned(WorkerName),
    /// In the global blocked set.
    Blocked,
    Finished(ActionState),
}

/// What happened on a launch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchOutcome {
    Launched,
    /// Queued on its worker until capacity frees up.
    Waiting,
    /// Not assigned, not data-free, or already waiting.
    NotReady,
    /// The assignment no longer held and was redone.
    InvalidScheduling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct QueuedAction {
    score: Score,
    seq: Reverse<usize>,
    id: ActionId,
}

pub struct TaskScheduler<D: ResourceDescription> {
    cores: Arc<dyn CoreManager<D>>,
    scorer: Arc<dyn Scorer<D>>,
    retry: RetryPolicy,
    core_count: usize,
    actions: ActionArena<D>,
    tasks: BTreeMap<TaskId, ActionId>,
    workers: BTreeMap<WorkerName, ResourceScheduler<D>>,
    blocked: ActionSet,
    ready: ActionSet,
    /// Workers able to run each core.
    executors: Vec<BTreeSet<WorkerName>>,
    /// Profiles of decommissioned workers.
    offline_profiles: Vec<Vec<Profile>>,
    profile_store: ProfileStore,
    /// Actions taken off a worker's waiting queue because capacity freed up.
    resumable: BTreeSet<ActionId>,
    next_job: JobId,
    outbox: Vec<SchedulerCommand<D>>,
}

impl<D: ResourceDescription> fmt::Debug for TaskScheduler<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskScheduler")
            .field("core_count", &self.core_count)
            .field("actions", &self.actions.len())
            .field("workers", &self.workers.keys().collect::<Vec<_>>())
            .field("blocked", &self.blocked.len())
            .field("ready", &self.ready.len())
            .finish_non_exhaustive()
    }
}

impl<D: ResourceDescription> TaskScheduler<D> {
    pub fn new(
        cores: Arc<dyn CoreManager<D>>,
        scorer: Arc<dyn Scorer<D>>,
        retry: RetryPolicy,
        profile_store: ProfileStore,
    ) -> Self {
        let core_count = cores.core_count();
        let offline_profiles = signature_table(cores.as_ref())
            .iter()
            .map(|row| vec![Profile::default(); row.len()])
            .collect();
        Self {
            cores,
            scorer,
            retry,
            core_count,
            actions: ActionArena::new(),
            tasks: BTreeMap::new(),
            workers: BTreeMap::new(),
            blocked: ActionSet::new(core_count),
            ready: ActionSet::new(core_count),
            executors: vec![BTreeSet::new(); core_count],
            offline_profiles,
            profile_store,
            resumable: BTreeSet::new(),
            next_job: 1,
            outbox: Vec::new(),
        }
    }

    /// Take every command produced since the last call.
    pub fn drain_commands(&mut self) -> Vec<SchedulerCommand<D>> {
        std::mem::take(&mut self.outbox)
    }

    // ------------------------------------------------------------------
    // Submission and scheduling
    // ------------------------------------------------------------------

    /// Register a new task and try to place it.
    ///
    /// Every exit path leaves the action assigned to a worker (launched if
    /// possible) or in the blocked set. Depending on a failed or cancelled
    /// task cancels it right away.
    pub fn submit(&mut self, request: TaskRequest) -> Result<ActionId> {
        if request.core_id >= self.cores.core_count() {
            return Err(FlowschedError::ConfigError(format!(
                "task '{}' refers to unknown core {}",
                request.name, request.core_id
            )));
        }
        if self.tasks.contains_key(&request.task_id) {
            return Err(FlowschedError::ConfigError(format!(
                "task id {} submitted twice",
                request.task_id
            )));
        }

        let mut predecessors = BTreeSet::new();
        let mut doomed = false;
        for task in &request.after {
            let pred_id = self.task_action_or_err(*task)?;
            let Some(pred) = self.actions.get(pred_id) else {
                continue;
            };
            match pred.state() {
                ActionState::Completed => {}
                ActionState::Failed if pred.on_failure() == OnFailure::Ignore => {}
                ActionState::Failed | ActionState::Cancelled => doomed = true,
                _ => {
                    predecessors.insert(pred_id);
                }
            }
        }
        let mut constraints = Vec::new();
        for task in &request.colocate_with {
            constraints.push(self.task_action_or_err(*task)?);
        }

        let id = self.actions.insert(ActionKind::Execution(ExecutionTask {
            task_id: request.task_id,
            name: request.name.clone(),
            core_id: request.core_id,
            priority: request.priority,
            group_priority: request.group_priority,
            on_failure: request.on_failure,
            inputs: request.inputs,
            outputs: request.outputs,
        }));
        for pred in &predecessors {
            if let Some(p) = self.actions.get_mut(*pred) {
                p.data_successors.insert(id);
            }
        }
        if let Some(action) = self.actions.get_mut(id) {
            action.data_predecessors = predecessors;
            action.resource_constraints = constraints;
            action.enforced_target = request.worker;
        }
        self.tasks.insert(request.task_id, id);
        info!(action = id, task = %request.name, core = request.core_id, "task submitted");

        if doomed {
            warn!(action = id, task = %request.name, "a predecessor already failed; cancelling");
            let mut freed = Vec::new();
            self.cancel_cascade(id, &mut freed);
            return Ok(id);
        }

        self.new_allocatable_action(id)?;
        Ok(id)
    }

    fn task_action_or_err(&self, task: TaskId) -> Result<ActionId> {
        self.tasks
            .get(&task)
            .copied()
            .ok_or_else(|| FlowschedError::TaskNotFound(task.to_string()))
    }

    fn new_allocatable_action(&mut self, id: ActionId) -> Result<()> {
        self.sync_ready(id);
        let score = self.action_score(id);
        match self.schedule_action(id, &score)? {
            ScheduleOutcome::Scheduled(_) => self.try_to_launch(id).map(|_| ()),
            _ => {
                self.add_to_blocked(id);
                Ok(())
            }
        }
    }

    /// Run the assignment algorithm and record its choice.
    ///
    /// `Unassigned` means the engine has nowhere to keep the action: it is
    /// turned into a fatal [`FlowschedError::LostAction`].
    pub fn schedule_action(&mut self, id: ActionId, score: &Score) -> Result<ScheduleOutcome> {
        let Some(action) = self.actions.get(id) else {
            return Err(self.lost_action(id, "unknown action"));
        };
        let candidates = candidate_workers(action, &self.actions, &self.workers);
        let outcome = find_assignment(
            action,
            &candidates,
            &self.workers,
            self.scorer.as_ref(),
            score,
        );
        match &outcome {
            ScheduleOutcome::Scheduled(assignment) => {
                let worker = assignment.worker.clone();
                self.assign(id, &worker, Some(assignment.implementation));
            }
            ScheduleOutcome::Blocked => {}
            ScheduleOutcome::Unassigned => {
                return Err(self.lost_action(id, "candidate workers exist but none accepted it"));
            }
        }
        Ok(outcome)
    }

    fn lost_action(&self, id: ActionId, reason: &str) -> FlowschedError {
        error!(action = id, reason, "action lost by the scheduler");
        FlowschedError::LostAction {
            action: id,
            reason: reason.to_string(),
        }
    }

    fn assign(&mut self, id: ActionId, worker: &str, implementation: Option<ImplId>) {
        self.blocked.remove(id);
        if let Some(action) = self.actions.get_mut(id) {
            action.assign(worker, implementation);
        }
        if let Some(rs) = self.workers.get_mut(worker) {
            rs.initial_schedule(id);
        }
        self.sync_ready(id);
        debug!(action = id, worker, ?implementation, "action assigned");
    }

    fn add_to_blocked(&mut self, id: ActionId) {
        let Some(action) = self.actions.get_mut(id) else {
            return;
        };
        if action.state().is_terminal() {
            return;
        }
        action.unassign();
        action.state = ActionState::Blocked;
        let core = action.core_id().unwrap_or_default();
        self.blocked.add(id, core);
        self.resumable.remove(&id);
        self.sync_ready(id);
        info!(action = id, core, "action blocked: no worker can run it");
    }

    /// Keep the ready counters in line with the action's current state.
    fn sync_ready(&mut self, id: ActionId) {
        let Some(action) = self.actions.get(id) else {
            return;
        };
        let Some(core) = action.core_id() else {
            return;
        };
        let ready = !action.has_data_predecessors()
            && matches!(
                action.state(),
                ActionState::Unscheduled | ActionState::Scheduled
            );
        if ready {
            self.ready.add(id, core);
        } else {
            self.ready.remove(id);
        }
    }

    fn action_score(&self, id: ActionId) -> Score {
        self.actions
            .get(id)
            .map(|a| self.scorer.action_score(a))
            .unwrap_or_default()
    }

    /// Score of an action on the worker it is assigned to.
    fn local_score(&self, action: &Action<D>, rs: &ResourceScheduler<D>) -> Score {
        let base = self.scorer.action_score(action);
        let Some(resource) = self.scorer.resource_score(action, rs, &base) else {
            return base;
        };
        match action.assigned_implementation() {
            Some(implementation) if action.core_id().is_some() => {
                self.scorer
                    .implementation_score(action, rs, implementation, &resource)
            }
            _ => resource,
        }
    }

    // ------------------------------------------------------------------
    // Launching
    // ------------------------------------------------------------------

    /// Start the action if it is assigned, data-free and fits its worker.
    pub fn try_to_launch(&mut self, id: ActionId) -> Result<LaunchOutcome> {
        self.launch(id, true)
    }

    fn launch(&mut self, id: ActionId, allow_reschedule: bool) -> Result<LaunchOutcome> {
        let resume = self.resumable.remove(&id);
        let Some(action) = self.actions.get(id) else {
            return Ok(LaunchOutcome::NotReady);
        };
        if action.state() != ActionState::Scheduled || action.has_data_predecessors() {
            return Ok(LaunchOutcome::NotReady);
        }
        let Some(worker) = action.assigned_resource().map(str::to_string) else {
            return Ok(LaunchOutcome::NotReady);
        };
        if !self.scheduling_still_valid(action, &worker) {
            self.handle_invalid_scheduling(id, &worker, allow_reschedule)?;
            return Ok(LaunchOutcome::InvalidScheduling);
        }
        let Some(rs) = self.workers.get(&worker) else {
            return Ok(LaunchOutcome::NotReady);
        };
        if rs.is_blocked(id) {
            return Ok(LaunchOutcome::NotReady);
        }

        let requirements = requirements_of(action, rs);
        if let Some(req) = &requirements {
            if (!resume && rs.has_blocked_actions()) || !rs.can_run_now(req) {
                let score = self.local_score(action, rs);
                let req = req.clone();
                if let Some(rs) = self.workers.get_mut(&worker) {
                    rs.wait_on_resource(id, score, req);
                }
                debug!(action = id, worker = %worker, "waiting for resources");
                return Ok(LaunchOutcome::Waiting);
            }
        }

        self.run(id, &worker, requirements);
        Ok(LaunchOutcome::Launched)
    }

    fn scheduling_still_valid(&self, action: &Action<D>, worker: &str) -> bool {
        let Some(rs) = self.workers.get(worker) else {
            return false;
        };
        if rs.is_removed() && !action.is_to_stop_resource() {
            return false;
        }
        if action.enforced_target().is_some_and(|t| t != worker) {
            return false;
        }
        let misplaced = action.resource_constraints().iter().any(|pred| {
            self.actions
                .get(*pred)
                .and_then(|p| p.assigned_resource())
                .is_some_and(|w| w != worker)
        });
        if misplaced {
            return false;
        }
        match (action.core_id(), action.assigned_implementation()) {
            (Some(core), Some(implementation)) => rs.can_run(core, implementation),
            _ => true,
        }
    }

    fn handle_invalid_scheduling(&mut self, id: ActionId, worker: &str, allow_reschedule: bool) -> Result<()> {
        warn!(action = id, worker, "scheduling no longer valid at launch; rescheduling");
        let freed = self.unschedule_from(id, worker);
        if let Some(action) = self.actions.get_mut(id) {
            action.unassign();
        }
        self.sync_ready(id);

        let mut blocked_candidates = Vec::new();
        if allow_reschedule {
            let score = self.action_score(id);
            match self.schedule_action(id, &score)? {
                ScheduleOutcome::Scheduled(_) => {
                    self.launch(id, false)?;
                }
                _ => blocked_candidates.push(id),
            }
        } else {
            blocked_candidates.push(id);
        }

        self.handle_dependency_free_actions(Vec::new(), freed, &mut blocked_candidates, Some(worker))?;
        for action in blocked_candidates {
            self.add_to_blocked(action);
        }
        Ok(())
    }

    fn run(&mut self, id: ActionId, worker: &str, requirements: Option<D>) {
        if let Some(rs) = self.workers.get_mut(worker) {
            rs.host_action(id, requirements.unwrap_or_default());
        }
        let Some(action) = self.actions.get_mut(id) else {
            return;
        };
        action.state = ActionState::Running;
        action.started_at = Some(Instant::now());
        action.record_attempt(worker);

        let command = match &action.kind {
            ActionKind::Execution(task) => {
                action.lifecycle = ExecutionState::TransferringInputs;
                SchedulerCommand::TransferInputs {
                    action: id,
                    worker: worker.to_string(),
                    inputs: task.inputs.clone(),
                }
            }
            ActionKind::StartWorker => SchedulerCommand::StartWorker {
                action: id,
                worker: worker.to_string(),
            },
            ActionKind::StopWorker => SchedulerCommand::StopWorker {
                action: id,
                worker: worker.to_string(),
            },
            ActionKind::ReduceWorker { reduction } => SchedulerCommand::ReduceWorker {
                action: id,
                worker: worker.to_string(),
                reduction: reduction.clone(),
            },
        };
        info!(action = id, kind = action.kind.label(), worker, "action launched");
        self.outbox.push(command);
        self.sync_ready(id);
    }

    fn unschedule_from(&mut self, id: ActionId, worker: &str) -> Vec<ActionId> {
        match self.workers.get_mut(worker) {
            Some(rs) => match rs.unschedule_action(id) {
                Ok(freed) => freed,
                Err(err) => {
                    debug!(%err, "nothing to unschedule");
                    Vec::new()
                }
            },
            None => Vec::new(),
        }
    }

    /// Launch data-free and capacity-freed actions, best score first.
    ///
    /// Actions present in both lists are handled once. Unassigned ones go
    /// through the assignment algorithm; those that cannot be placed are
    /// pushed to `blocked_candidates` for the caller to block.
    pub fn handle_dependency_free_actions(
        &mut self,
        data_free: Vec<ActionId>,
        resource_free: Vec<ActionId>,
        blocked_candidates: &mut Vec<ActionId>,
        resource: Option<&str>,
    ) -> Result<()> {
        for id in &resource_free {
            self.resumable.insert(*id);
        }

        let data_free_len = data_free.len();
        let mut seen = BTreeSet::new();
        let mut queue = BinaryHeap::new();
        for (seq, id) in data_free.into_iter().chain(resource_free).enumerate() {
            if !seen.insert(id) {
                continue;
            }
            if seq < data_free_len {
                self.unblock(id);
            }
            let Some(action) = self.actions.get(id) else {
                continue;
            };
            if !matches!(
                action.state(),
                ActionState::Scheduled | ActionState::Unscheduled
            ) {
                self.resumable.remove(&id);
                continue;
            }
            let score = self.dependency_free_score(action);
            queue.push(QueuedAction {
                score,
                seq: Reverse(seq),
                id,
            });
        }

        if !queue.is_empty() {
            debug!(count = queue.len(), ?resource, "launching dependency-free actions");
        }

        while let Some(QueuedAction { id, .. }) = queue.pop() {
            let Some(state) = self.actions.get(id).map(Action::state) else {
                continue;
            };
            match state {
                ActionState::Scheduled => {
                    self.launch(id, true)?;
                }
                ActionState::Unscheduled => {
                    let score = self.action_score(id);
                    match self.schedule_action(id, &score)? {
                        ScheduleOutcome::Scheduled(_) => {
                            self.launch(id, true)?;
                        }
                        _ => blocked_candidates.push(id),
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Take a blocked action out of the global blocked set so it can be
    /// scheduled again.
    fn unblock(&mut self, id: ActionId) {
        let Some(action) = self.actions.get_mut(id) else {
            return;
        };
        if action.state() != ActionState::Blocked {
            return;
        }
        action.state = ActionState::Unscheduled;
        self.blocked.remove(id);
        self.sync_ready(id);
        debug!(action = id, "blocked action is data-free; rescheduling");
    }

    fn dependency_free_score(&self, action: &Action<D>) -> Score {
        match action
            .assigned_resource()
            .and_then(|w| self.workers.get(w))
        {
            Some(rs) => self.local_score(action, rs),
            None => self.scorer.action_score(action),
        }
    }

    // ------------------------------------------------------------------
    // Completion and errors
    // ------------------------------------------------------------------

    /// The action finished successfully.
    pub fn action_completed(&mut self, id: ActionId) -> Result<()> {
        let Some(action) = self.actions.get_mut(id) else {
            return Ok(());
        };
        if action.state().is_terminal() {
            return Ok(());
        }
        action.state = ActionState::Completed;
        if action.task().is_some() {
            action.lifecycle = ExecutionState::Completed;
        }
        action.close_attempt(AttemptOutcome::Completed);
        let worker = action.assigned_resource().map(str::to_string);
        let report = action.task().map(|task| TaskReport {
            task_id: task.task_id,
            name: task.name.clone(),
            outcome: TaskOutcome::Completed,
        });
        self.sync_ready(id);
        if let Some(report) = report {
            info!(action = id, task = %report.name, "task completed");
            self.outbox.push(SchedulerCommand::TaskFinished(report));
        }

        let freed = worker
            .as_deref()
            .map(|w| self.unschedule_from(id, w))
            .unwrap_or_default();
        let data_free = self.release_data_successors(id);

        let mut blocked_candidates = Vec::new();
        self.handle_dependency_free_actions(data_free, freed, &mut blocked_candidates, worker.as_deref())?;
        for action in blocked_candidates {
            self.add_to_blocked(action);
        }
        Ok(())
    }

    fn release_data_successors(&mut self, id: ActionId) -> Vec<ActionId> {
        let successors: Vec<ActionId> = self
            .actions
            .get(id)
            .map(|a| a.data_successors().collect())
            .unwrap_or_default();
        let mut free = Vec::new();
        for succ_id in successors {
            let Some(succ) = self.actions.get_mut(succ_id) else {
                continue;
            };
            succ.data_predecessors.remove(&id);
            if !succ.has_data_predecessors() && !succ.state().is_terminal() {
                free.push(succ_id);
            }
            self.sync_ready(succ_id);
        }
        free
    }

    /// The action ran out of transfer or submission chances on its worker.
    pub fn error_on_action(&mut self, id: ActionId) -> Result<()> {
        let Some(action) = self.actions.get(id) else {
            return Ok(());
        };
        if action.state().is_terminal() {
            return Ok(());
        }
        if action.is_cancel_requested() {
            return self.finish_cancellation(id);
        }
        let worker = action.assigned_resource().map(str::to_string);
        let decision = self.retry.on_error(action);

        let mut freed = worker
            .as_deref()
            .map(|w| self.unschedule_from(id, w))
            .unwrap_or_default();
        if let Some(action) = self.actions.get_mut(id) {
            action.unassign();
        }

        let mut data_free = Vec::new();
        match decision {
            ErrorDecision::Reschedule => {
                warn!(action = id, ?worker, "execution failed; rescheduling on another worker");
                data_free.push(id);
            }
            ErrorDecision::Ignore => {
                self.mark_failed(id, true);
                data_free = self.release_data_successors(id);
            }
            ErrorDecision::Fail => {
                self.mark_failed(id, false);
                self.cancel_successors(id, &mut freed);
            }
        }
        self.sync_ready(id);

        let mut blocked_candidates = Vec::new();
        self.handle_dependency_free_actions(data_free, freed, &mut blocked_candidates, worker.as_deref())?;
        for action in blocked_candidates {
            self.add_to_blocked(action);
        }
        Ok(())
    }

    fn mark_failed(&mut self, id: ActionId, ignored: bool) {
        let Some(action) = self.actions.get_mut(id) else {
            return;
        };
        action.state = ActionState::Failed;
        action.lifecycle = ExecutionState::Failed;
        let cause = action.failure_cause();
        let report = action.task().map(|task| TaskReport {
            task_id: task.task_id,
            name: task.name.clone(),
            outcome: TaskOutcome::Failed {
                cause: if ignored {
                    format!("{cause} (failure ignored)")
                } else {
                    cause.clone()
                },
            },
        });
        self.sync_ready(id);
        if let Some(report) = report {
            if ignored {
                warn!(action = id, task = %report.name, %cause, "task failed; failure ignored");
            } else {
                error!(action = id, task = %report.name, %cause, "task failed");
            }
            self.outbox.push(SchedulerCommand::TaskFinished(report));
        }
    }

    // ------------------------------------------------------------------
    // Execution lifecycle notifications
    // ------------------------------------------------------------------

    fn running_execution(&self, id: ActionId) -> Option<&Action<D>> {
        let action = self.actions.get(id)?;
        if action.state() != ActionState::Running || action.task().is_none() {
            warn!(action = id, state = ?action.state(), "ignoring notification for action that is not running");
            return None;
        }
        Some(action)
    }

    /// All inputs are on the worker: submit the job.
    pub fn transfers_completed(&mut self, id: ActionId) -> Result<()> {
        let Some(action) = self.running_execution(id) else {
            return Ok(());
        };
        if !matches!(
            action.lifecycle(),
            ExecutionState::TransferringInputs | ExecutionState::RetryTransfer
        ) {
            warn!(action = id, lifecycle = ?action.lifecycle(), "unexpected transfer notification");
            return Ok(());
        }
        if action.is_cancel_requested() {
            return self.finish_cancellation(id);
        }

        let job = self.next_job;
        self.next_job += 1;
        let Some(spec) = self.job_spec(id, job, false) else {
            warn!(action = id, "implementation vanished before submission");
            if let Some(action) = self.actions.get_mut(id) {
                action.close_attempt(AttemptOutcome::JobFailed);
            }
            return self.error_on_action(id);
        };
        if let Some(action) = self.actions.get_mut(id) {
            action.note_job(job);
            action.lifecycle = ExecutionState::Submitted;
        }
        debug!(action = id, job, worker = %spec.worker, "submitting job");
        self.outbox.push(SchedulerCommand::SubmitJob(spec));
        Ok(())
    }

    pub fn transfers_failed(&mut self, id: ActionId) -> Result<()> {
        let Some(action) = self.running_execution(id) else {
            return Ok(());
        };
        if action.is_cancel_requested() {
            return self.finish_cancellation(id);
        }
        let retry = self.retry;
        let Some(action) = self.actions.get_mut(id) else {
            return Ok(());
        };
        match retry.on_transfer_failure(action) {
            TransferDecision::Retry => {
                warn!(action = id, errors = action.attempt_transfer_errors(), "input transfer failed; retrying");
                let worker = action.assigned_resource().unwrap_or_default().to_string();
                let inputs = action.task().map(|t| t.inputs.clone()).unwrap_or_default();
                self.outbox.push(SchedulerCommand::TransferInputs {
                    action: id,
                    worker,
                    inputs,
                });
                Ok(())
            }
            TransferDecision::Error => {
                warn!(action = id, "input transfers out of chances");
                action.close_attempt(AttemptOutcome::TransferFailed);
                self.error_on_action(id)
            }
        }
    }

    pub fn job_started(&mut self, id: ActionId, job: JobId) {
        let Some(action) = self.actions.get_mut(id) else {
            return;
        };
        if action.state() == ActionState::Running
            && action.current_job() == Some(job)
            && matches!(
                action.lifecycle(),
                ExecutionState::Submitted | ExecutionState::RetrySubmit
            )
        {
            action.lifecycle = ExecutionState::Running;
        }
    }

    /// The job finished successfully after `elapsed_ms`.
    pub fn job_completed(&mut self, id: ActionId, job: JobId, elapsed_ms: u64) -> Result<()> {
        let Some(action) = self.running_execution(id) else {
            return Ok(());
        };
        if action.current_job() != Some(job) {
            warn!(action = id, job, "completion for a stale job");
            return Ok(());
        }
        if action.is_cancel_requested() {
            return self.finish_cancellation(id);
        }
        let worker = action.assigned_resource().map(str::to_string);
        let core = action.core_id();
        let implementation = action.assigned_implementation();
        let outputs = action.task().map(|t| t.outputs.clone()).unwrap_or_default();

        if let (Some(worker), Some(core), Some(implementation)) = (&worker, core, implementation) {
            if let Some(rs) = self.workers.get_mut(worker) {
                rs.profiled_execution(core, implementation, &Profile::single(elapsed_ms));
            }
            self.outbox.push(SchedulerCommand::RegisterOutputs {
                action: id,
                worker: worker.clone(),
                outputs,
            });
        }
        debug!(action = id, job, elapsed_ms, "job completed");
        self.action_completed(id)
    }

    pub fn job_failed(&mut self, id: ActionId, job: JobId) -> Result<()> {
        let Some(action) = self.running_execution(id) else {
            return Ok(());
        };
        if action.current_job() != Some(job) {
            warn!(action = id, job, "failure for a stale job");
            return Ok(());
        }
        if action.is_cancel_requested() {
            return self.finish_cancellation(id);
        }
        let retry = self.retry;
        let Some(action) = self.actions.get_mut(id) else {
            return Ok(());
        };
        match retry.on_job_failure(action) {
            SubmissionDecision::Resubmit => {
                warn!(action = id, job, "job failed; resubmitting to the same worker");
                match self.job_spec(id, job, true) {
                    Some(spec) => {
                        self.outbox.push(SchedulerCommand::SubmitJob(spec));
                        Ok(())
                    }
                    None => self.error_on_action(id),
                }
            }
            SubmissionDecision::Error => {
                warn!(action = id, job, "job failed; submission chances exhausted");
                action.close_attempt(AttemptOutcome::JobFailed);
                self.error_on_action(id)
            }
        }
    }

    fn job_spec(&self, id: ActionId, job: JobId, resubmission: bool) -> Option<JobSpec> {
        let action = self.actions.get(id)?;
        let task = action.task()?;
        let worker = action.assigned_resource()?;
        let implementation_id = action.assigned_implementation()?;
        let implementation = self.cores.implementation(task.core_id, implementation_id)?;
        Some(JobSpec {
            job,
            action: id,
            task_id: task.task_id,
            task_name: task.name.clone(),
            worker: worker.to_string(),
            core_id: task.core_id,
            implementation: implementation_id,
            signature: implementation.signature,
            command: implementation.command,
            inputs: task.inputs.clone(),
            outputs: task.outputs.clone(),
            resubmission,
        })
    }

    // ------------------------------------------------------------------
    // Cancellation
    // ------------------------------------------------------------------

    /// Cancel a task and everything depending on it.
    ///
    /// Running actions are only flagged; they finish cancelling at their
    /// next lifecycle notification.
    pub fn cancel_task(&mut self, task: TaskId) -> Result<()> {
        let id = self.task_action_or_err(task)?;
        let Some(state) = self.actions.get(id).map(Action::state) else {
            return Ok(());
        };
        if state.is_terminal() {
            return Ok(());
        }
        let worker = self
            .actions
            .get(id)
            .and_then(|a| a.assigned_resource())
            .map(str::to_string);

        let mut freed = Vec::new();
        self.cancel_cascade(id, &mut freed);

        let mut blocked_candidates = Vec::new();
        self.handle_dependency_free_actions(Vec::new(), freed, &mut blocked_candidates, worker.as_deref())?;
        for action in blocked_candidates {
            self.add_to_blocked(action);
        }
        Ok(())
    }

    fn cancel_cascade(&mut self, id: ActionId, freed: &mut Vec<ActionId>) {
        if self.cancel_single(id, freed) {
            self.cancel_successors(id, freed);
        }
    }

    fn cancel_successors(&mut self, id: ActionId, freed: &mut Vec<ActionId>) {
        let mut pending: Vec<ActionId> = self
            .actions
            .get(id)
            .map(|a| a.data_successors().collect())
            .unwrap_or_default();
        while let Some(succ) = pending.pop() {
            if self.cancel_single(succ, freed) {
                if let Some(action) = self.actions.get(succ) {
                    pending.extend(action.data_successors());
                }
            }
        }
    }

    /// Returns `true` if the action is cancelled now (as opposed to flagged
    /// or already finished).
    fn cancel_single(&mut self, id: ActionId, freed: &mut Vec<ActionId>) -> bool {
        let Some(action) = self.actions.get(id) else {
            return false;
        };
        match action.state() {
            state if state.is_terminal() => false,
            ActionState::Running => {
                self.request_cancel(id);
                false
            }
            _ => {
                if let Some(worker) = action.assigned_resource().map(str::to_string) {
                    freed.extend(self.unschedule_from(id, &worker));
                }
                self.blocked.remove(id);
                self.finalize_cancelled(id);
                true
            }
        }
    }

    fn request_cancel(&mut self, id: ActionId) {
        let Some(action) = self.actions.get_mut(id) else {
            return;
        };
        if action.cancel_requested {
            return;
        }
        action.cancel_requested = true;
        let worker = action.assigned_resource().unwrap_or_default().to_string();
        let job = action.current_job();
        info!(action = id, ?job, worker = %worker, "cancellation requested for running action");
        self.outbox.push(SchedulerCommand::CancelJob {
            action: id,
            job,
            worker,
        });
    }

    fn finalize_cancelled(&mut self, id: ActionId) {
        self.resumable.remove(&id);
        let Some(action) = self.actions.get_mut(id) else {
            return;
        };
        action.unassign();
        action.state = ActionState::Cancelled;
        action.close_attempt(AttemptOutcome::Cancelled);
        let report = action.task().map(|task| TaskReport {
            task_id: task.task_id,
            name: task.name.clone(),
            outcome: TaskOutcome::Cancelled,
        });
        self.sync_ready(id);
        if let Some(report) = report {
            info!(action = id, task = %report.name, "task cancelled");
            self.outbox.push(SchedulerCommand::TaskFinished(report));
        }
    }

    /// A running action flagged for cancellation reached a transition.
    fn finish_cancellation(&mut self, id: ActionId) -> Result<()> {
        let worker = self
            .actions
            .get(id)
            .and_then(|a| a.assigned_resource())
            .map(str::to_string);
        let mut freed = worker
            .as_deref()
            .map(|w| self.unschedule_from(id, w))
            .unwrap_or_default();
        self.finalize_cancelled(id);
        self.cancel_successors(id, &mut freed);

        let mut blocked_candidates = Vec::new();
        self.handle_dependency_free_actions(Vec::new(), freed, &mut blocked_candidates, worker.as_deref())?;
        for action in blocked_candidates {
            self.add_to_blocked(action);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Worker pool
    // ------------------------------------------------------------------

    /// Apply a capacity change pushed by the resource manager.
    ///
    /// The first update for an unknown worker registers it and launches a
    /// start action; later ones go to the update path.
    pub fn update_worker(&mut self, worker: &str, update: ResourceUpdate<D>) -> Result<()> {
        match self.workers.get(worker) {
            Some(rs) if rs.is_removed() => {
                warn!(worker, "update for a worker being stopped; ignoring");
                return Ok(());
            }
            Some(_) => {}
            None => self.add_worker(worker)?,
        }

        if update.is_completed() {
            self.completed_resource_update(worker, update)
        } else {
            self.pending_resource_update(worker, update)
        }
    }

    fn add_worker(&mut self, worker: &str) -> Result<()> {
        let mut rs = ResourceScheduler::new(worker, self.requirements_table());
        rs.seed_profiles(
            self.profile_store
                .seed_for(worker, &signature_table(self.cores.as_ref())),
        );
        self.workers.insert(worker.to_string(), rs);
        info!(worker, "worker registered");

        let id = self.actions.insert(ActionKind::StartWorker);
        if let Some(action) = self.actions.get_mut(id) {
            action.enforced_target = Some(worker.to_string());
        }
        self.assign(id, worker, None);
        self.try_to_launch(id)?;
        Ok(())
    }

    fn pending_resource_update(&mut self, worker: &str, update: ResourceUpdate<D>) -> Result<()> {
        match update.kind() {
            UpdateKind::Increase => {
                debug!(worker, "capacity increase requested; waiting for it to land");
                Ok(())
            }
            UpdateKind::Reduce => {
                let reduction = update.modification().clone();
                let id = self.actions.insert(ActionKind::ReduceWorker {
                    reduction: reduction.clone(),
                });
                if let Some(action) = self.actions.get_mut(id) {
                    action.enforced_target = Some(worker.to_string());
                }
                if let Some(rs) = self.workers.get_mut(worker) {
                    rs.add_pending_reduction(id, reduction);
                }
                info!(worker, action = id, "capacity reduction requested");
                self.assign(id, worker, None);
                self.try_to_launch(id)?;
                Ok(())
            }
        }
    }

    fn completed_resource_update(&mut self, worker: &str, update: ResourceUpdate<D>) -> Result<()> {
        match update.kind() {
            UpdateKind::Increase => {
                if let Some(rs) = self.workers.get_mut(worker) {
                    rs.increase_capacity(update.modification());
                    info!(worker, capacity = ?rs.capacity(), "worker capacity increased");
                }
                self.increased_worker(worker)
            }
            UpdateKind::Reduce => {
                let reduce_action = match self.workers.get_mut(worker) {
                    Some(rs) => {
                        rs.reduce_capacity(update.modification());
                        info!(worker, capacity = ?rs.capacity(), "worker capacity reduced");
                        rs.take_pending_reduction(update.modification())
                    }
                    None => None,
                };

                let mut freed = Vec::new();
                if let Some(reduce_id) = reduce_action {
                    freed = self.unschedule_from(reduce_id, worker);
                    if let Some(action) = self.actions.get_mut(reduce_id) {
                        action.state = ActionState::Completed;
                        action.close_attempt(AttemptOutcome::Completed);
                    }
                }

                if update.should_stop_worker() {
                    self.decommission(worker, true)
                } else {
                    self.reduced_worker(worker, freed)
                }
            }
        }
    }

    /// Capacity grew: serve the worker's own queue, then wake compatible
    /// actions from the global blocked set, best first.
    fn increased_worker(&mut self, worker: &str) -> Result<()> {
        self.refresh_executors();

        let freed = match self.workers.get_mut(worker) {
            Some(rs) if !rs.is_removed() => rs.take_launchable_blocked(),
            _ => return Ok(()),
        };
        let mut blocked_candidates = Vec::new();
        self.handle_dependency_free_actions(Vec::new(), freed, &mut blocked_candidates, Some(worker))?;

        let Some(rs) = self.workers.get(worker) else {
            return Ok(());
        };
        let actions = &self.actions;
        let woken = self.blocked.remove_matching(|id, core| {
            rs.can_run_core(core)
                && actions
                    .get(id)
                    .is_some_and(|a| a.enforced_target().is_none_or(|t| t == worker))
        });
        if !woken.is_empty() {
            info!(worker, count = woken.len(), "waking blocked actions");
        }

        for id in &woken {
            if let Some(action) = self.actions.get_mut(*id) {
                action.state = ActionState::Unscheduled;
            }
        }
        blocked_candidates.extend(self.schedule_best_first(woken)?);

        for action in blocked_candidates {
            self.add_to_blocked(action);
        }
        Ok(())
    }

    /// Partial reduction: move away actions that can no longer fit.
    fn reduced_worker(&mut self, worker: &str, freed: Vec<ActionId>) -> Result<()> {
        self.refresh_executors();
        let Some(rs) = self.workers.get(worker) else {
            return Ok(());
        };

        let mut displaced: Vec<ActionId> = rs.unfit_blocked_actions();
        for id in rs.assigned_actions() {
            let unfit = self.actions.get(id).is_some_and(|a| {
                match (a.core_id(), a.assigned_implementation()) {
                    (Some(core), Some(implementation)) => !rs.can_run(core, implementation),
                    _ => false,
                }
            });
            if unfit && !displaced.contains(&id) {
                displaced.push(id);
            }
        }
        let freed: Vec<ActionId> = freed.into_iter().filter(|id| !displaced.contains(id)).collect();

        for id in &displaced {
            self.unschedule_from(*id, worker);
            if let Some(action) = self.actions.get_mut(*id) {
                action.unassign();
            }
        }
        if !displaced.is_empty() {
            info!(worker, count = displaced.len(), "re-homing actions that no longer fit");
        }
        self.rehome(displaced)?;

        let mut blocked_candidates = Vec::new();
        self.handle_dependency_free_actions(Vec::new(), freed, &mut blocked_candidates, Some(worker))?;
        for action in blocked_candidates {
            self.add_to_blocked(action);
        }
        Ok(())
    }

    /// Schedule unassigned actions again, best first, blocking those that
    /// fit nowhere.
    fn rehome(&mut self, ids: Vec<ActionId>) -> Result<()> {
        for action in self.schedule_best_first(ids)? {
            self.add_to_blocked(action);
        }
        Ok(())
    }

    /// Schedule and launch unassigned actions best first. Returns the ones
    /// that found no worker.
    ///
    /// Passes repeat while they place something, so an action colocated
    /// with another one of the batch is retried once that one has a worker.
    fn schedule_best_first(&mut self, ids: Vec<ActionId>) -> Result<Vec<ActionId>> {
        let mut pending: Vec<(Score, ActionId)> = ids
            .into_iter()
            .map(|id| (self.action_score(id), id))
            .collect();
        pending.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

        loop {
            let mut unplaced = Vec::new();
            let mut placed_any = false;
            for (score, id) in pending {
                let unscheduled = self
                    .actions
                    .get(id)
                    .is_some_and(|a| a.state() == ActionState::Unscheduled);
                if !unscheduled {
                    continue;
                }
                self.sync_ready(id);
                match self.schedule_action(id, &score)? {
                    ScheduleOutcome::Scheduled(_) => {
                        placed_any = true;
                        self.try_to_launch(id)?;
                    }
                    _ => unplaced.push((score, id)),
                }
            }
            if !placed_any || unplaced.is_empty() {
                return Ok(unplaced.into_iter().map(|(_, id)| id).collect());
            }
            pending = unplaced;
        }
    }

    /// Take a worker out of the pool.
    ///
    /// Its profiles are folded into the off-line table, every action on it
    /// is moved elsewhere (running ones are aborted) and, if asked, a stop
    /// action is launched.
    fn decommission(&mut self, worker: &str, issue_stop: bool) -> Result<()> {
        let Some(rs) = self.workers.get_mut(worker) else {
            return Ok(());
        };
        rs.set_removed();
        let hosted = rs.hosted_actions();
        let assigned = rs.assigned_actions();
        info!(worker, hosted = hosted.len(), waiting = assigned.len(), "decommissioning worker");

        self.fold_offline_profiles(worker);
        self.refresh_executors();

        let mut displaced = Vec::new();
        let mut cancelled = Vec::new();
        for id in hosted.into_iter().chain(assigned) {
            self.unschedule_from(id, worker);
            let Some(action) = self.actions.get_mut(id) else {
                continue;
            };
            if action.task().is_none() {
                if !action.state().is_terminal() {
                    action.unassign();
                    action.state = ActionState::Cancelled;
                    action.close_attempt(AttemptOutcome::Aborted);
                }
                continue;
            }
            if action.state() == ActionState::Running {
                action.close_attempt(AttemptOutcome::Aborted);
                let job = action.current_job();
                if action.is_cancel_requested() {
                    cancelled.push(id);
                    continue;
                }
                self.outbox.push(SchedulerCommand::CancelJob {
                    action: id,
                    job,
                    worker: worker.to_string(),
                });
            }
            if let Some(action) = self.actions.get_mut(id) {
                action.unassign();
                action.lifecycle = ExecutionState::Created;
            }
            displaced.push(id);
        }

        for id in cancelled {
            self.finish_cancellation(id)?;
        }
        self.rehome(displaced)?;

        if issue_stop {
            let id = self.actions.insert(ActionKind::StopWorker);
            if let Some(action) = self.actions.get_mut(id) {
                action.enforced_target = Some(worker.to_string());
            }
            self.assign(id, worker, None);
            self.try_to_launch(id)?;
        }
        Ok(())
    }

    fn fold_offline_profiles(&mut self, worker: &str) {
        let signatures = signature_table(self.cores.as_ref());
        let Some(rs) = self.workers.get(worker) else {
            return;
        };
        for (core, row) in rs.profiles().iter().enumerate() {
            for (implementation, profile) in row.iter().enumerate() {
                if let Some(offline) = self
                    .offline_profiles
                    .get_mut(core)
                    .and_then(|r| r.get_mut(implementation))
                {
                    offline.accumulate(profile);
                }
            }
        }
        self.profile_store
            .record_resource(worker, &signatures, rs.profiles());
        self.profile_store
            .accumulate_implementations(&signatures, rs.session_profiles());
    }

    /// The start action of a worker finished.
    pub fn worker_started(&mut self, id: ActionId) -> Result<()> {
        match self.actions.get(id).map(Action::kind) {
            Some(ActionKind::StartWorker) => self.action_completed(id),
            _ => Ok(()),
        }
    }

    /// The worker could not be started: drop it from the pool.
    pub fn worker_start_failed(&mut self, id: ActionId) -> Result<()> {
        let Some(action) = self.actions.get_mut(id) else {
            return Ok(());
        };
        if !matches!(action.kind(), ActionKind::StartWorker) || action.state().is_terminal() {
            return Ok(());
        }
        action.state = ActionState::Failed;
        action.close_attempt(AttemptOutcome::JobFailed);
        let Some(worker) = action.assigned_resource().map(str::to_string) else {
            return Ok(());
        };
        error!(worker = %worker, "worker failed to start; removing it from the pool");
        self.unschedule_from(id, &worker);
        self.decommission(&worker, false)?;
        self.workers.remove(&worker);
        Ok(())
    }

    /// The stop action of a decommissioned worker finished.
    pub fn worker_stopped(&mut self, id: ActionId) -> Result<()> {
        let worker = match self.actions.get(id) {
            Some(action) if matches!(action.kind(), ActionKind::StopWorker) => {
                action.assigned_resource().map(str::to_string)
            }
            _ => return Ok(()),
        };
        self.action_completed(id)?;
        if let Some(worker) = worker {
            let idle = self.workers.get(&worker).is_some_and(|rs| {
                rs.is_removed() && rs.hosted_actions().is_empty() && rs.assigned_actions().is_empty()
            });
            if idle {
                self.workers.remove(&worker);
                info!(worker = %worker, "worker stopped and removed");
            }
        }
        Ok(())
    }

    /// The backend could not carry out a capacity reduction; the reserved
    /// capacity goes back to the worker.
    pub fn worker_reduce_failed(&mut self, id: ActionId) -> Result<()> {
        let worker = match self.actions.get(id) {
            Some(action) if matches!(action.kind(), ActionKind::ReduceWorker { .. }) => {
                if action.state().is_terminal() {
                    return Ok(());
                }
                action.assigned_resource().map(str::to_string)
            }
            _ => return Ok(()),
        };
        if let Some(rs) = worker.as_deref().and_then(|w| self.workers.get_mut(w)) {
            rs.drop_pending_reduction(id);
        }
        warn!(action = id, ?worker, "capacity reduction failed; keeping the capacity");
        let freed = worker
            .as_deref()
            .map(|w| self.unschedule_from(id, w))
            .unwrap_or_default();
        if let Some(action) = self.actions.get_mut(id) {
            action.state = ActionState::Failed;
            action.close_attempt(AttemptOutcome::JobFailed);
        }

        let mut blocked_candidates = Vec::new();
        self.handle_dependency_free_actions(Vec::new(), freed, &mut blocked_candidates, worker.as_deref())?;
        for action in blocked_candidates {
            self.add_to_blocked(action);
        }
        Ok(())
    }

    /// Adopt the current shape of the core registry.
    pub fn core_elements_updated(&mut self) -> Result<()> {
        let core_count = self.cores.core_count();
        self.core_count = core_count;
        self.ready.update_core_count(core_count);
        self.blocked.update_core_count(core_count);

        let signatures = signature_table(self.cores.as_ref());
        self.offline_profiles.resize_with(core_count, Vec::new);
        for (row, sigs) in self.offline_profiles.iter_mut().zip(&signatures) {
            row.resize_with(sigs.len(), Profile::default);
        }

        let table = self.requirements_table();
        for rs in self.workers.values_mut() {
            rs.updated_core_elements(table.clone());
        }
        self.refresh_executors();
        info!(core_count, "core elements updated");

        let live: Vec<WorkerName> = self
            .workers
            .values()
            .filter(|rs| !rs.is_removed())
            .map(|rs| rs.name().to_string())
            .collect();
        for worker in live {
            self.increased_worker(&worker)?;
        }
        Ok(())
    }

    fn refresh_executors(&mut self) {
        self.executors = (0..self.core_count)
            .map(|core| {
                self.workers
                    .values()
                    .filter(|rs| rs.can_run_core(core))
                    .map(|rs| rs.name().to_string())
                    .collect()
            })
            .collect();
    }

    fn requirements_table(&self) -> Vec<Vec<D>> {
        (0..self.cores.core_count())
            .map(|core| {
                self.cores
                    .implementations(core)
                    .into_iter()
                    .map(|i| i.requirements)
                    .collect()
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Read-only views
    // ------------------------------------------------------------------

    pub fn action(&self, id: ActionId) -> Option<&Action<D>> {
        self.actions.get(id)
    }

    pub fn actions(&self) -> impl Iterator<Item = &Action<D>> {
        self.actions.iter()
    }

    /// Action currently representing an application task.
    pub fn task_action(&self, task: TaskId) -> Option<ActionId> {
        self.tasks.get(&task).copied()
    }

    pub fn worker(&self, name: &str) -> Option<&ResourceScheduler<D>> {
        self.workers.get(name)
    }

    pub fn workers(&self) -> impl Iterator<Item = &ResourceScheduler<D>> {
        self.workers.values()
    }

    pub fn core_executors(&self, core: CoreId) -> Vec<WorkerName> {
        self.executors
            .get(core)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Actions in the global blocked set.
    pub fn blocked_actions(&self) -> Vec<ActionId> {
        self.blocked.actions()
    }

    pub fn hosted_actions(&self, worker: &str) -> Vec<ActionId> {
        self.workers
            .get(worker)
            .map(ResourceScheduler::hosted_actions)
            .unwrap_or_default()
    }

    pub fn resource_blocked_actions(&self, worker: &str) -> Vec<ActionId> {
        self.workers
            .get(worker)
            .map(ResourceScheduler::blocked_actions)
            .unwrap_or_default()
    }

    pub fn ready_counts(&self) -> Vec<usize> {
        self.ready.counts()
    }

    pub fn blocked_counts(&self) -> Vec<usize> {
        self.blocked.counts()
    }

    pub fn offline_profiles(&self) -> &[Vec<Profile>] {
        &self.offline_profiles
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Where the action currently is, or `None` if nothing tracks it.
    pub fn location(&self, id: ActionId) -> Option<ActionLocation> {
        let action = self.actions.get(id)?;
        if action.state().is_terminal() {
            return Some(ActionLocation::Finished(action.state()));
        }
        if self.blocked.contains(id) {
            return Some(ActionLocation::Blocked);
        }
        let worker = action.assigned_resource()?;
        let rs = self.workers.get(worker)?;
        if rs.is_hosted(id) {
            Some(ActionLocation::Hosted(worker.to_string()))
        } else if rs.is_blocked(id) {
            Some(ActionLocation::Waiting(worker.to_string()))
        } else if rs.is_assigned(id) {
            Some(ActionLocation::Assigned(worker.to_string()))
        } else {
            None
        }
    }

    /// `true` once every submitted task reached a final outcome.
    pub fn all_tasks_finished(&self) -> bool {
        self.tasks.values().all(|id| {
            self.actions
                .get(*id)
                .is_none_or(|a| a.state().is_terminal())
        })
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn workload(&self, now: Instant) -> WorkloadState {
        let mut cores: Vec<CoreWorkload> = (0..self.core_count)
            .map(|core| {
                let mut aggregate = Profile::default();
                if let Some(row) = self.offline_profiles.get(core) {
                    row.iter().for_each(|p| aggregate.accumulate(p));
                }
                for rs in self.workers.values().filter(|rs| !rs.is_removed()) {
                    if let Some(row) = rs.profiles().get(core) {
                        row.iter().for_each(|p| aggregate.accumulate(p));
                    }
                }
                let (min_time, max_time) = if aggregate.executions() == 0 {
                    (0, 0)
                } else {
                    (aggregate.min_time(), aggregate.max_time())
                };
                CoreWorkload {
                    core_id: core,
                    core_name: self.cores.core_name(core).unwrap_or_default(),
                    ready: self.ready.count(core),
                    no_resources: self.blocked.count(core),
                    running_elapsed_ms: Vec::new(),
                    min_time,
                    avg_time: aggregate.average_time(),
                    max_time,
                }
            })
            .collect();

        for rs in self.workers.values() {
            for id in rs.hosted_actions() {
                let Some(action) = self.actions.get(id) else {
                    continue;
                };
                let (Some(core), Some(started)) = (action.core_id(), action.started_at()) else {
                    continue;
                };
                if let Some(entry) = cores.get_mut(core) {
                    let elapsed = now.saturating_duration_since(started).as_millis();
                    entry.running_elapsed_ms.push(elapsed.min(u128::from(u64::MAX)) as u64);
                }
            }
        }

        WorkloadState { cores }
    }

    pub fn task_summary(&self) -> TaskSummary {
        let mut totals = vec![0u64; self.core_count];
        let mut per_worker = BTreeMap::new();
        for rs in self.workers.values() {
            let counts: Vec<u64> = (0..self.core_count).map(|c| rs.executed_count(c)).collect();
            for (total, count) in totals.iter_mut().zip(&counts) {
                *total += count;
            }
            per_worker.insert(rs.name().to_string(), counts);
        }
        TaskSummary { per_worker, totals }
    }

    pub fn snapshot(&self, now: Instant) -> SchedulerSnapshot {
        let workers = self
            .workers
            .values()
            .map(|rs| WorkerView {
                name: rs.name().to_string(),
                capacity: format!("{:?}", rs.capacity()),
                removed: rs.is_removed(),
                hosted: rs.hosted_actions(),
                blocked: rs.blocked_actions(),
            })
            .collect();

        let mut nodes = Vec::new();
        let mut edges = Vec::new();
        for action in self.actions.iter() {
            let Some(task) = action.task() else {
                continue;
            };
            nodes.push(GraphNode {
                action: action.id(),
                label: task.name.clone(),
                state: action.state(),
            });
            edges.extend(action.data_successors().map(|to| GraphEdge {
                from: action.id(),
                to,
            }));
        }

        SchedulerSnapshot {
            workload: self.workload(now),
            task_summary: self.task_summary(),
            workers,
            blocked_actions: self.blocked_actions(),
            nodes,
            edges,
        }
    }

    /// Fold live workers into the profile store and hand it over for
    /// persisting. Meant to be called once, at shutdown.
    pub fn take_profile_store(&mut self) -> ProfileStore {
        let signatures = signature_table(self.cores.as_ref());
        for rs in self.workers.values().filter(|rs| !rs.is_removed()) {
            self.profile_store
                .record_resource(rs.name(), &signatures, rs.profiles());
            self.profile_store
                .accumulate_implementations(&signatures, rs.session_profiles());
        }
        std::mem::take(&mut self.profile_store)
    }
}

fn requirements_of<D: ResourceDescription>(action: &Action<D>, rs: &ResourceScheduler<D>) -> Option<D> {
    match action.kind() {
        ActionKind::Execution(task) => action
            .assigned_implementation()
            .and_then(|i| rs.requirements(task.core_id, i).cloned()),
        ActionKind::ReduceWorker { reduction } => Some(reduction.clone()),
        ActionKind::StartWorker | ActionKind::StopWorker => None,
    }
}

fn signature_table<D>(cores: &dyn CoreManager<D>) -> Vec<Vec<String>> {
    (0..cores.core_count())
        .map(|core| {
            cores
                .implementations(core)
                .into_iter()
                .map(|i| i.signature)
                .collect()
        })
        .collect()
}
