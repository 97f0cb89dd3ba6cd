// src/scheduler/mod.rs

//! Task scheduling and allocatable-action execution.
//!
//! - [`action`]: actions and the arena that owns them
//! - [`resource_scheduler`]: per-worker capacity, queues and profiles
//! - [`assignment`] / [`scoring`]: where an action should run
//! - [`execution`]: retry budgets of the execution lifecycle
//! - [`task_scheduler`]: the engine tying all of it together

pub mod action;
pub mod action_set;
pub mod assignment;
pub mod commands;
pub mod execution;
pub mod profile;
pub mod resource_scheduler;
pub mod score;
pub mod scoring;
pub mod state;
pub mod task_scheduler;
pub mod workload;

pub use action::{Action, ActionArena, ActionKind, ActionState, AttemptOutcome, ExecutionTask};
pub use assignment::{Assignment, ScheduleOutcome};
pub use commands::{JobSpec, SchedulerCommand, TaskOutcome, TaskReport, TaskRequest};
pub use execution::{ExecutionState, RetryPolicy};
pub use profile::{Profile, ProfileRecord};
pub use resource_scheduler::ResourceScheduler;
pub use score::Score;
pub use scoring::{DefaultScorer, Scorer};
pub use state::ProfileStore;
pub use task_scheduler::{ActionLocation, LaunchOutcome, TaskScheduler};
pub use workload::{SchedulerSnapshot, TaskSummary, WorkloadState};
