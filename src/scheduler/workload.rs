// src/scheduler/workload.rs

//! Read-only reports built from the engine state.

use std::collections::BTreeMap;

use crate::scheduler::action::ActionState;
use crate::types::{ActionId, CoreId, WorkerName};

/// Per-core load figures.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoreWorkload {
    pub core_id: CoreId,
    pub core_name: String,
    /// Data-free actions waiting to run.
    pub ready: usize,
    /// Actions no worker can host.
    pub no_resources: usize,
    /// Elapsed milliseconds of every running action of this core.
    pub running_elapsed_ms: Vec<u64>,
    pub min_time: u64,
    pub avg_time: u64,
    pub max_time: u64,
}

impl CoreWorkload {
    pub fn running(&self) -> usize {
        self.running_elapsed_ms.len()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkloadState {
    pub cores: Vec<CoreWorkload>,
}

impl WorkloadState {
    pub fn total_ready(&self) -> usize {
        self.cores.iter().map(|c| c.ready).sum()
    }

    pub fn total_no_resources(&self) -> usize {
        self.cores.iter().map(|c| c.no_resources).sum()
    }

    pub fn total_running(&self) -> usize {
        self.cores.iter().map(CoreWorkload::running).sum()
    }
}

/// Executions per core, per worker and overall.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskSummary {
    pub per_worker: BTreeMap<WorkerName, Vec<u64>>,
    pub totals: Vec<u64>,
}

impl TaskSummary {
    pub fn total_executions(&self) -> u64 {
        self.totals.iter().sum()
    }
}

/// What a monitor sees of one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerView {
    pub name: WorkerName,
    pub capacity: String,
    pub removed: bool,
    pub hosted: Vec<ActionId>,
    pub blocked: Vec<ActionId>,
}

/// DOT node descriptor of an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphNode {
    pub action: ActionId,
    pub label: String,
    pub state: ActionState,
}

/// DOT edge descriptor: `from` produces data `to` consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphEdge {
    pub from: ActionId,
    pub to: ActionId,
}

/// Consistent copy of everything monitors may read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerSnapshot {
    pub workload: WorkloadState,
    pub task_summary: TaskSummary,
    pub workers: Vec<WorkerView>,
    pub blocked_actions: Vec<ActionId>,
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}
