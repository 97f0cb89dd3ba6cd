// src/scheduler/commands.rs

//! Requests into the engine and commands out of it.

use crate::data::DataKey;
use crate::types::{ActionId, CoreId, ImplId, JobId, OnFailure, TaskId, WorkerName};

/// A task as submitted by the application.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRequest {
    pub task_id: TaskId,
    pub name: String,
    pub core_id: CoreId,
    pub priority: bool,
    pub group_priority: i64,
    pub on_failure: OnFailure,
    /// Tasks producing data this one consumes.
    pub after: Vec<TaskId>,
    /// Tasks this one must share a worker with.
    pub colocate_with: Vec<TaskId>,
    /// Forced worker.
    pub worker: Option<WorkerName>,
    pub inputs: Vec<DataKey>,
    pub outputs: Vec<DataKey>,
}

impl TaskRequest {
    pub fn new(task_id: TaskId, name: impl Into<String>, core_id: CoreId) -> Self {
        Self {
            task_id,
            name: name.into(),
            core_id,
            priority: false,
            group_priority: 0,
            on_failure: OnFailure::default(),
            after: Vec::new(),
            colocate_with: Vec::new(),
            worker: None,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }
}

/// Everything a backend needs to run one job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSpec {
    pub job: JobId,
    pub action: ActionId,
    pub task_id: TaskId,
    pub task_name: String,
    pub worker: WorkerName,
    pub core_id: CoreId,
    pub implementation: ImplId,
    pub signature: String,
    pub command: String,
    pub inputs: Vec<DataKey>,
    pub outputs: Vec<DataKey>,
    /// Same job sent again to the same worker after a failure.
    pub resubmission: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed,
    Failed { cause: String },
    Cancelled,
}

/// Final word on an application task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskReport {
    pub task_id: TaskId,
    pub name: String,
    pub outcome: TaskOutcome,
}

/// Side effects requested by the engine. The engine never performs I/O;
/// whoever drives it executes these.
#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerCommand<D> {
    TransferInputs {
        action: ActionId,
        worker: WorkerName,
        inputs: Vec<DataKey>,
    },
    SubmitJob(JobSpec),
    CancelJob {
        action: ActionId,
        job: Option<JobId>,
        worker: WorkerName,
    },
    StartWorker {
        action: ActionId,
        worker: WorkerName,
    },
    StopWorker {
        action: ActionId,
        worker: WorkerName,
    },
    ReduceWorker {
        action: ActionId,
        worker: WorkerName,
        reduction: D,
    },
    RegisterOutputs {
        action: ActionId,
        worker: WorkerName,
        outputs: Vec<DataKey>,
    },
    TaskFinished(TaskReport),
}
