use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;

use flowsched::data::DataKey;
use flowsched::errors::FlowschedError;
use flowsched::exec::{BackendFuture, JobResult, WorkerBackend};
use flowsched::resources::MethodResources;
use flowsched::scheduler::JobSpec;
use flowsched::types::{JobId, WorkerName};

/// One call made to the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    Transfer { worker: WorkerName, inputs: Vec<DataKey> },
    Submit(JobSpec),
    Cancel { worker: WorkerName, job: JobId },
    Start(WorkerName),
    Stop(WorkerName),
    Reduce { worker: WorkerName, reduction: MethodResources },
}

/// A fake backend that:
/// - records every call
/// - completes jobs after an optional delay, reporting a fixed elapsed time
/// - fails jobs and worker starts on request.
#[derive(Default)]
pub struct FakeBackend {
    calls: Arc<Mutex<Vec<BackendCall>>>,
    failing_tasks: BTreeSet<String>,
    /// Remaining failures per task name before it succeeds.
    flaky_tasks: Mutex<BTreeMap<String, u32>>,
    failing_starts: BTreeSet<String>,
    job_delay: Duration,
    elapsed_ms: u64,
    running: Mutex<HashMap<JobId, oneshot::Sender<()>>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            elapsed_ms: 5,
            ..Self::default()
        }
    }

    /// Every job of this task fails.
    pub fn fail_task(mut self, name: &str) -> Self {
        self.failing_tasks.insert(name.to_string());
        self
    }

    /// The first `failures` jobs of this task fail.
    pub fn flaky_task(self, name: &str, failures: u32) -> Self {
        self.flaky_tasks
            .lock()
            .unwrap()
            .insert(name.to_string(), failures);
        self
    }

    pub fn fail_start(mut self, worker: &str) -> Self {
        self.failing_starts.insert(worker.to_string());
        self
    }

    /// Jobs take `delay` and can be cancelled meanwhile.
    pub fn with_job_delay(mut self, delay: Duration) -> Self {
        self.job_delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Task names of every submitted job, in order.
    pub fn submitted_tasks(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                BackendCall::Submit(spec) => Some(spec.task_name),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: BackendCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn should_fail(&self, task: &str) -> bool {
        if self.failing_tasks.contains(task) {
            return true;
        }
        let mut flaky = self.flaky_tasks.lock().unwrap();
        match flaky.get_mut(task) {
            Some(left) if *left > 0 => {
                *left -= 1;
                true
            }
            _ => false,
        }
    }
}

impl WorkerBackend<MethodResources> for FakeBackend {
    fn transfer_inputs(&self, worker: WorkerName, inputs: Vec<DataKey>) -> BackendFuture<'_, ()> {
        Box::pin(async move {
            self.record(BackendCall::Transfer { worker, inputs });
            Ok(())
        })
    }

    fn submit_job(&self, job: JobSpec) -> BackendFuture<'_, JobResult> {
        Box::pin(async move {
            self.record(BackendCall::Submit(job.clone()));
            if !self.job_delay.is_zero() {
                let (tx, rx) = oneshot::channel();
                self.running.lock().unwrap().insert(job.job, tx);
                let cancelled = tokio::select! {
                    _ = tokio::time::sleep(self.job_delay) => false,
                    _ = rx => true,
                };
                self.running.lock().unwrap().remove(&job.job);
                if cancelled {
                    return Err(FlowschedError::from(anyhow::anyhow!("job {} cancelled", job.job)));
                }
            }
            if self.should_fail(&job.task_name) {
                return Err(FlowschedError::from(anyhow::anyhow!("task '{}' failed", job.task_name)));
            }
            Ok(JobResult {
                elapsed_ms: self.elapsed_ms,
            })
        })
    }

    fn cancel_job(&self, worker: WorkerName, job: JobId) -> BackendFuture<'_, ()> {
        Box::pin(async move {
            self.record(BackendCall::Cancel { worker, job });
            if let Some(tx) = self.running.lock().unwrap().remove(&job) {
                let _ = tx.send(());
            }
            Ok(())
        })
    }

    fn start_worker(&self, worker: WorkerName) -> BackendFuture<'_, ()> {
        Box::pin(async move {
            let fail = self.failing_starts.contains(&worker);
            self.record(BackendCall::Start(worker.clone()));
            if fail {
                return Err(FlowschedError::from(anyhow::anyhow!("worker {worker} refused to start")));
            }
            Ok(())
        })
    }

    fn stop_worker(&self, worker: WorkerName) -> BackendFuture<'_, ()> {
        Box::pin(async move {
            self.record(BackendCall::Stop(worker));
            Ok(())
        })
    }

    fn reduce_worker(&self, worker: WorkerName, reduction: MethodResources) -> BackendFuture<'_, ()> {
        Box::pin(async move {
            self.record(BackendCall::Reduce { worker, reduction });
            Ok(())
        })
    }
}
