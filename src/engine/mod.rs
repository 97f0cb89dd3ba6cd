// src/engine/mod.rs

//! Orchestration engine for flowsched.
//!
//! Every request reaching the scheduler (new tasks, cancellations, backend
//! notifications, worker updates, core registry changes, shutdown) is a
//! [`RuntimeEvent`] on one channel. A single consumer applies them in
//! order, so the scheduler state has exactly one writer.
//!
//! The pure core state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`].

use crate::resources::ResourceUpdate;
use crate::scheduler::TaskRequest;
use crate::types::{ActionId, JobId, TaskId, WorkerName};

/// Runtime options used by both the core and the async shell.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeOptions {
    /// Exit once submissions are closed and every task reached a final
    /// outcome.
    pub exit_when_idle: bool,
}

/// Events flowing into the runtime from the application, the backend and
/// the resource manager.
#[derive(Debug, Clone)]
pub enum RuntimeEvent<D> {
    NewTask(TaskRequest),
    CancelTask { task_id: TaskId },
    /// No more tasks will be submitted.
    SubmissionsClosed,
    TransfersCompleted { action: ActionId, worker: WorkerName },
    TransfersFailed {
        action: ActionId,
        worker: WorkerName,
        reason: String,
    },
    JobStarted { action: ActionId, job: JobId },
    JobCompleted { action: ActionId, job: JobId, elapsed_ms: u64 },
    JobFailed { action: ActionId, job: JobId, reason: String },
    WorkerStarted { action: ActionId },
    WorkerStartFailed { action: ActionId, reason: String },
    WorkerStopped { action: ActionId },
    WorkerReduceFailed { action: ActionId, reason: String },
    /// Capacity change pushed by the resource manager.
    WorkerUpdate {
        worker: WorkerName,
        update: ResourceUpdate<D>,
    },
    /// The core registry changed shape.
    CoreElementsUpdated,
    /// Graceful shutdown requested (e.g. Ctrl-C).
    ShutdownRequested,
}

pub mod core;
pub mod event_handlers;
pub mod monitor;
pub mod runtime;

pub use core::CoreRuntime;
pub use event_handlers::{CoreCommand, CoreStep};
pub use monitor::MonitorHandle;
pub use runtime::Runtime;
