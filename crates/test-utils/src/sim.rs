#![allow(dead_code)]

//! Synchronous harness around `TaskScheduler`.
//!
//! `SimCluster` plays the part of the runtime shell and the backend at the
//! same time: it drains the scheduler's commands and answers them directly.
//! Worker start/stop/reduce and input transfers are acknowledged right away
//! (transfers can be held back); jobs stay running until the test completes
//! or fails them.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use flowsched::core_elements::CoreRegistry;
use flowsched::data::DataKey;
use flowsched::errors::Result;
use flowsched::resources::{MethodResources, ResourceUpdate};
use flowsched::scheduler::{
    DefaultScorer, JobSpec, ProfileStore, RetryPolicy, SchedulerCommand, Scorer, TaskOutcome,
    TaskReport, TaskScheduler,
};
use flowsched::types::{ActionId, JobId, TaskId, WorkerName};

/// Elapsed time reported by `complete`.
pub const DEFAULT_ELAPSED_MS: u64 = 10;

pub struct SimCluster {
    scheduler: TaskScheduler<MethodResources>,
    hold_transfers: bool,
    fail_reductions: bool,
    held_transfers: BTreeMap<ActionId, WorkerName>,
    jobs: BTreeMap<JobId, JobSpec>,
    submissions: Vec<JobSpec>,
    reports: Vec<TaskReport>,
    cancels: Vec<(ActionId, Option<JobId>, WorkerName)>,
    started: Vec<WorkerName>,
    stopped: Vec<WorkerName>,
    reductions: Vec<(WorkerName, MethodResources)>,
    registered: Vec<(DataKey, WorkerName)>,
}

impl SimCluster {
    pub fn new(registry: Arc<CoreRegistry<MethodResources>>) -> Self {
        Self::with_policy(registry, RetryPolicy::default())
    }

    pub fn with_policy(registry: Arc<CoreRegistry<MethodResources>>, retry: RetryPolicy) -> Self {
        Self::with_parts(registry, Arc::new(DefaultScorer), retry, ProfileStore::default())
    }

    pub fn with_parts(
        registry: Arc<CoreRegistry<MethodResources>>,
        scorer: Arc<dyn Scorer<MethodResources>>,
        retry: RetryPolicy,
        store: ProfileStore,
    ) -> Self {
        Self {
            scheduler: TaskScheduler::new(registry, scorer, retry, store),
            hold_transfers: false,
            fail_reductions: false,
            held_transfers: BTreeMap::new(),
            jobs: BTreeMap::new(),
            submissions: Vec::new(),
            reports: Vec::new(),
            cancels: Vec::new(),
            started: Vec::new(),
            stopped: Vec::new(),
            reductions: Vec::new(),
            registered: Vec::new(),
        }
    }

    /// Keep input transfers pending until `release_transfer` /
    /// `fail_transfer`.
    pub fn hold_transfers(&mut self, hold: bool) {
        self.hold_transfers = hold;
    }

    /// Answer every capacity reduction with a failure.
    pub fn fail_reductions(&mut self, fail: bool) {
        self.fail_reductions = fail;
    }

    pub fn scheduler(&self) -> &TaskScheduler<MethodResources> {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut TaskScheduler<MethodResources> {
        &mut self.scheduler
    }

    // ------------------------------------------------------------------
    // Inputs
    // ------------------------------------------------------------------

    pub fn add_worker(&mut self, name: &str, capacity: MethodResources) -> Result<()> {
        self.update_worker(name, ResourceUpdate::increase(capacity))
    }

    pub fn update_worker(&mut self, name: &str, update: ResourceUpdate<MethodResources>) -> Result<()> {
        self.scheduler.update_worker(name, update)?;
        self.pump()
    }

    /// Take the worker away for good (its whole capacity).
    pub fn remove_worker(&mut self, name: &str) -> Result<()> {
        let capacity = self
            .scheduler
            .worker(name)
            .map(|rs| rs.capacity().clone())
            .unwrap_or_default();
        self.update_worker(name, ResourceUpdate::decommission(capacity))
    }

    pub fn submit(&mut self, request: flowsched::scheduler::TaskRequest) -> Result<ActionId> {
        let id = self.scheduler.submit(request)?;
        self.pump()?;
        Ok(id)
    }

    pub fn cancel(&mut self, task: TaskId) -> Result<()> {
        self.scheduler.cancel_task(task)?;
        self.pump()
    }

    pub fn core_elements_updated(&mut self) -> Result<()> {
        self.scheduler.core_elements_updated()?;
        self.pump()
    }

    pub fn complete(&mut self, task: TaskId) -> Result<()> {
        self.complete_in(task, DEFAULT_ELAPSED_MS)
    }

    pub fn complete_in(&mut self, task: TaskId, elapsed_ms: u64) -> Result<()> {
        let spec = self.take_job(task);
        self.scheduler.job_started(spec.action, spec.job);
        self.scheduler.job_completed(spec.action, spec.job, elapsed_ms)?;
        self.pump()
    }

    pub fn fail(&mut self, task: TaskId) -> Result<()> {
        let spec = self.take_job(task);
        self.scheduler.job_failed(spec.action, spec.job)?;
        self.pump()
    }

    pub fn release_transfer(&mut self, task: TaskId) -> Result<()> {
        let action = self.action_of(task);
        self.held_transfers
            .remove(&action)
            .expect("no transfer held for task");
        self.scheduler.transfers_completed(action)?;
        self.pump()
    }

    pub fn fail_transfer(&mut self, task: TaskId) -> Result<()> {
        let action = self.action_of(task);
        self.held_transfers
            .remove(&action)
            .expect("no transfer held for task");
        self.scheduler.transfers_failed(action)?;
        self.pump()
    }

    /// Complete running jobs, oldest first, until none is left.
    pub fn run_to_completion(&mut self) -> Result<()> {
        for _ in 0..10_000 {
            let Some(task) = self.jobs.values().next().map(|spec| spec.task_id) else {
                return Ok(());
            };
            self.complete(task)?;
        }
        panic!("simulation did not settle");
    }

    // ------------------------------------------------------------------
    // Observations
    // ------------------------------------------------------------------

    pub fn action_of(&self, task: TaskId) -> ActionId {
        self.scheduler
            .task_action(task)
            .expect("task was never submitted")
    }

    /// Job currently running for `task`, if any.
    pub fn running_job(&self, task: TaskId) -> Option<&JobSpec> {
        self.jobs.values().find(|spec| spec.task_id == task)
    }

    pub fn running_tasks(&self) -> Vec<TaskId> {
        let mut tasks: Vec<TaskId> = self.jobs.values().map(|spec| spec.task_id).collect();
        tasks.sort_unstable();
        tasks
    }

    pub fn held_transfer_tasks(&self) -> Vec<TaskId> {
        self.held_transfers
            .keys()
            .filter_map(|id| self.scheduler.action(*id).and_then(|a| a.task_id()))
            .collect()
    }

    /// Every job submission, resubmissions included, in order.
    pub fn submissions(&self) -> &[JobSpec] {
        &self.submissions
    }

    pub fn reports(&self) -> &[TaskReport] {
        &self.reports
    }

    pub fn outcome(&self, task: TaskId) -> Option<&TaskOutcome> {
        self.reports
            .iter()
            .find(|r| r.task_id == task)
            .map(|r| &r.outcome)
    }

    pub fn cancels(&self) -> &[(ActionId, Option<JobId>, WorkerName)] {
        &self.cancels
    }

    pub fn started_workers(&self) -> &[WorkerName] {
        &self.started
    }

    pub fn stopped_workers(&self) -> &[WorkerName] {
        &self.stopped
    }

    pub fn reductions(&self) -> &[(WorkerName, MethodResources)] {
        &self.reductions
    }

    pub fn registered_outputs(&self) -> &[(DataKey, WorkerName)] {
        &self.registered
    }

    // ------------------------------------------------------------------
    // Command loop
    // ------------------------------------------------------------------

    fn take_job(&mut self, task: TaskId) -> JobSpec {
        let job = self
            .jobs
            .iter()
            .find(|(_, spec)| spec.task_id == task)
            .map(|(job, _)| *job)
            .expect("task has no running job");
        self.jobs.remove(&job).expect("job vanished")
    }

    /// Answer commands until the scheduler is quiet.
    pub fn pump(&mut self) -> Result<()> {
        let mut queue: VecDeque<SchedulerCommand<MethodResources>> = VecDeque::new();
        loop {
            queue.extend(self.scheduler.drain_commands());
            let Some(command) = queue.pop_front() else {
                return Ok(());
            };
            self.answer(command)?;
        }
    }

    fn answer(&mut self, command: SchedulerCommand<MethodResources>) -> Result<()> {
        match command {
            SchedulerCommand::TransferInputs { action, worker, .. } => {
                if self.hold_transfers {
                    self.held_transfers.insert(action, worker);
                } else {
                    self.scheduler.transfers_completed(action)?;
                }
            }
            SchedulerCommand::SubmitJob(spec) => {
                self.submissions.push(spec.clone());
                self.jobs.insert(spec.job, spec);
            }
            SchedulerCommand::CancelJob { action, job, worker } => {
                self.cancels.push((action, job, worker.clone()));
                match job {
                    Some(job) => {
                        let on_worker = self.jobs.get(&job).is_some_and(|s| s.worker == worker);
                        if on_worker {
                            self.jobs.remove(&job);
                            self.scheduler.job_failed(action, job)?;
                        }
                    }
                    None => {
                        let held_here = self.held_transfers.get(&action).is_some_and(|w| *w == worker);
                        if held_here {
                            self.held_transfers.remove(&action);
                            let cancelled = self
                                .scheduler
                                .action(action)
                                .is_some_and(|a| a.is_cancel_requested());
                            if cancelled {
                                self.scheduler.transfers_failed(action)?;
                            }
                        }
                    }
                }
            }
            SchedulerCommand::StartWorker { action, worker } => {
                self.started.push(worker);
                self.scheduler.worker_started(action)?;
            }
            SchedulerCommand::StopWorker { action, worker } => {
                self.stopped.push(worker);
                self.scheduler.worker_stopped(action)?;
            }
            SchedulerCommand::ReduceWorker {
                action,
                worker,
                reduction,
            } => {
                if self.fail_reductions {
                    self.scheduler.worker_reduce_failed(action)?;
                } else {
                    self.reductions.push((worker.clone(), reduction.clone()));
                    self.scheduler
                        .update_worker(&worker, ResourceUpdate::reduction(reduction))?;
                }
            }
            SchedulerCommand::RegisterOutputs { worker, outputs, .. } => {
                self.registered
                    .extend(outputs.into_iter().map(|o| (o, worker.clone())));
            }
            SchedulerCommand::TaskFinished(report) => self.reports.push(report),
        }
        Ok(())
    }
}
