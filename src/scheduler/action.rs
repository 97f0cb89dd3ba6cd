// src/scheduler/action.rs

//! Allocatable actions and the arena that owns them.
//!
//! Cross references (predecessors, successors, constraints) are stored as
//! [`ActionId`]s into the [`ActionArena`]; resources are referenced by
//! worker name.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use crate::data::DataKey;
use crate::scheduler::execution::ExecutionState;
use crate::types::{ActionId, CoreId, ImplId, JobId, OnFailure, TaskId, WorkerName};

/// Scheduling state of an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ActionState {
    /// Not assigned to any resource.
    Unscheduled,
    /// Assigned to a resource; possibly waiting for predecessors or for
    /// capacity on that resource.
    Scheduled,
    Running,
    /// In the engine's global blocked set: no worker can run it.
    Blocked,
    Completed,
    Failed,
    Cancelled,
}

impl ActionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ActionState::Completed | ActionState::Failed | ActionState::Cancelled
        )
    }
}

/// Application task carried by an execution action.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionTask {
    pub task_id: TaskId,
    pub name: String,
    pub core_id: CoreId,
    pub priority: bool,
    pub group_priority: i64,
    pub on_failure: OnFailure,
    pub inputs: Vec<DataKey>,
    pub outputs: Vec<DataKey>,
}

/// What an action does once it gets to run.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionKind<D> {
    /// Run a task implementation on a worker.
    Execution(ExecutionTask),
    /// Bring a freshly registered worker up.
    StartWorker,
    /// Shut a decommissioned worker down.
    StopWorker,
    /// Carry out a pending capacity reduction on a worker.
    ReduceWorker { reduction: D },
}

impl<D> ActionKind<D> {
    pub fn label(&self) -> &'static str {
        match self {
            ActionKind::Execution(_) => "execution",
            ActionKind::StartWorker => "start-worker",
            ActionKind::StopWorker => "stop-worker",
            ActionKind::ReduceWorker { .. } => "reduce-worker",
        }
    }
}

/// Result of one attempt of an action on a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    InProgress,
    Completed,
    TransferFailed,
    JobFailed,
    Aborted,
    Cancelled,
}

/// History entry: one launch of the action on one worker.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionRecord {
    pub worker: WorkerName,
    pub implementation: Option<ImplId>,
    pub jobs: Vec<JobId>,
    pub outcome: AttemptOutcome,
}

#[derive(Debug, Clone)]
pub struct Action<D> {
    pub(crate) id: ActionId,
    pub(crate) kind: ActionKind<D>,
    pub(crate) state: ActionState,
    pub(crate) lifecycle: ExecutionState,
    pub(crate) data_predecessors: BTreeSet<ActionId>,
    pub(crate) data_successors: BTreeSet<ActionId>,
    pub(crate) resource_constraints: Vec<ActionId>,
    pub(crate) enforced_target: Option<WorkerName>,
    pub(crate) assigned_resource: Option<WorkerName>,
    pub(crate) assigned_impl: Option<ImplId>,
    pub(crate) executing_resources: Vec<WorkerName>,
    pub(crate) executions: Vec<ExecutionRecord>,
    pub(crate) transfer_errors: u32,
    pub(crate) execution_errors: u32,
    pub(crate) attempt_base: (u32, u32),
    pub(crate) current_job: Option<JobId>,
    pub(crate) cancel_requested: bool,
    pub(crate) started_at: Option<Instant>,
}

impl<D> Action<D> {
    fn new(id: ActionId, kind: ActionKind<D>) -> Self {
        Self {
            id,
            kind,
            state: ActionState::Unscheduled,
            lifecycle: ExecutionState::Created,
            data_predecessors: BTreeSet::new(),
            data_successors: BTreeSet::new(),
            resource_constraints: Vec::new(),
            enforced_target: None,
            assigned_resource: None,
            assigned_impl: None,
            executing_resources: Vec::new(),
            executions: Vec::new(),
            transfer_errors: 0,
            execution_errors: 0,
            attempt_base: (0, 0),
            current_job: None,
            cancel_requested: false,
            started_at: None,
        }
    }

    pub fn id(&self) -> ActionId {
        self.id
    }

    pub fn kind(&self) -> &ActionKind<D> {
        &self.kind
    }

    pub fn state(&self) -> ActionState {
        self.state
    }

    pub fn lifecycle(&self) -> ExecutionState {
        self.lifecycle
    }

    pub fn task(&self) -> Option<&ExecutionTask> {
        match &self.kind {
            ActionKind::Execution(task) => Some(task),
            _ => None,
        }
    }

    pub fn core_id(&self) -> Option<CoreId> {
        self.task().map(|t| t.core_id)
    }

    pub fn task_id(&self) -> Option<TaskId> {
        self.task().map(|t| t.task_id)
    }

    pub fn on_failure(&self) -> OnFailure {
        self.task().map_or(OnFailure::CancelSuccessors, |t| t.on_failure)
    }

    /// Execution and reduce actions hold capacity while they run.
    pub fn needs_reservation(&self) -> bool {
        matches!(
            self.kind,
            ActionKind::Execution(_) | ActionKind::ReduceWorker { .. }
        )
    }

    /// Stop actions are the only ones allowed on a removed resource.
    pub fn is_to_stop_resource(&self) -> bool {
        matches!(self.kind, ActionKind::StopWorker)
    }

    pub fn has_data_predecessors(&self) -> bool {
        !self.data_predecessors.is_empty()
    }

    pub fn data_predecessors(&self) -> impl Iterator<Item = ActionId> + '_ {
        self.data_predecessors.iter().copied()
    }

    pub fn data_successors(&self) -> impl Iterator<Item = ActionId> + '_ {
        self.data_successors.iter().copied()
    }

    pub fn resource_constraints(&self) -> &[ActionId] {
        &self.resource_constraints
    }

    pub fn enforced_target(&self) -> Option<&str> {
        self.enforced_target.as_deref()
    }

    pub fn assigned_resource(&self) -> Option<&str> {
        self.assigned_resource.as_deref()
    }

    /// Worker the action is assigned to, else the one it last ran on.
    pub fn last_resource(&self) -> Option<&str> {
        self.assigned_resource()
            .or_else(|| self.executions.last().map(|e| e.worker.as_str()))
    }

    pub fn assigned_implementation(&self) -> Option<ImplId> {
        self.assigned_impl
    }

    /// Distinct workers this action has been launched on.
    pub fn executing_resources(&self) -> &[WorkerName] {
        &self.executing_resources
    }

    pub fn executions(&self) -> &[ExecutionRecord] {
        &self.executions
    }

    /// Launches that ended because the transfer or the job failed.
    pub fn failed_attempts(&self) -> usize {
        self.executions
            .iter()
            .filter(|e| {
                matches!(
                    e.outcome,
                    AttemptOutcome::TransferFailed | AttemptOutcome::JobFailed
                )
            })
            .count()
    }

    pub fn transfer_errors(&self) -> u32 {
        self.transfer_errors
    }

    pub fn execution_errors(&self) -> u32 {
        self.execution_errors
    }

    /// Transfer failures since the action was last launched.
    pub fn attempt_transfer_errors(&self) -> u32 {
        self.transfer_errors - self.attempt_base.0
    }

    /// Job failures since the action was last launched.
    pub fn attempt_execution_errors(&self) -> u32 {
        self.execution_errors - self.attempt_base.1
    }

    pub fn current_job(&self) -> Option<JobId> {
        self.current_job
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel_requested
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.started_at
    }

    pub(crate) fn assign(&mut self, worker: &str, implementation: Option<ImplId>) {
        self.assigned_resource = Some(worker.to_string());
        self.assigned_impl = implementation;
        self.state = ActionState::Scheduled;
        if self.lifecycle == ExecutionState::Created {
            self.lifecycle = ExecutionState::Scheduled;
        }
    }

    pub(crate) fn unassign(&mut self) {
        self.assigned_resource = None;
        self.assigned_impl = None;
        if !self.state.is_terminal() {
            self.state = ActionState::Unscheduled;
        }
    }

    pub(crate) fn record_attempt(&mut self, worker: &str) {
        if !self.executing_resources.iter().any(|w| w == worker) {
            self.executing_resources.push(worker.to_string());
        }
        self.attempt_base = (self.transfer_errors, self.execution_errors);
        self.current_job = None;
        self.executions.push(ExecutionRecord {
            worker: worker.to_string(),
            implementation: self.assigned_impl,
            jobs: Vec::new(),
            outcome: AttemptOutcome::InProgress,
        });
    }

    pub(crate) fn close_attempt(&mut self, outcome: AttemptOutcome) {
        if let Some(last) = self.executions.last_mut() {
            if last.outcome == AttemptOutcome::InProgress {
                last.outcome = outcome;
            }
        }
    }

    pub(crate) fn note_job(&mut self, job: JobId) {
        self.current_job = Some(job);
        if let Some(last) = self.executions.last_mut() {
            if !last.jobs.contains(&job) {
                last.jobs.push(job);
            }
        }
    }

    /// Human readable summary of every attempt, used when the action is
    /// declared failed.
    pub fn failure_cause(&self) -> String {
        if self.executions.is_empty() {
            return "action never reached a worker".to_string();
        }
        let attempts: Vec<String> = self
            .executions
            .iter()
            .map(|e| {
                let jobs: Vec<String> = e.jobs.iter().map(|j| format!("job{j}")).collect();
                format!("{} [{}] {:?}", e.worker, jobs.join(", "), e.outcome)
            })
            .collect();
        format!(
            "{} attempt(s) exhausted; check the logs of: {}",
            self.executions.len(),
            attempts.join("; ")
        )
    }
}

/// Owner of every action the engine knows about.
#[derive(Debug, Clone)]
pub struct ActionArena<D> {
    actions: BTreeMap<ActionId, Action<D>>,
    next_id: ActionId,
}

impl<D> Default for ActionArena<D> {
    fn default() -> Self {
        Self {
            actions: BTreeMap::new(),
            next_id: 1,
        }
    }
}

impl<D> ActionArena<D> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, kind: ActionKind<D>) -> ActionId {
        let id = self.next_id;
        self.next_id += 1;
        self.actions.insert(id, Action::new(id, kind));
        id
    }

    pub fn get(&self, id: ActionId) -> Option<&Action<D>> {
        self.actions.get(&id)
    }

    pub fn get_mut(&mut self, id: ActionId) -> Option<&mut Action<D>> {
        self.actions.get_mut(&id)
    }

    pub fn contains(&self, id: ActionId) -> bool {
        self.actions.contains_key(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Action<D>> {
        self.actions.values()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}
