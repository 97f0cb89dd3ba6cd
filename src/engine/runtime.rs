// src/engine/runtime.rs

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::data::DataRegistry;
use crate::errors::Result;
use crate::exec::{WorkerBackend, WorkerRetryPolicy, retry_with_timeout};
use crate::resources::{ResourceDescription, ResourceUpdate};
use crate::scheduler::{SchedulerCommand, SchedulerSnapshot, TaskOutcome, TaskReport};

use super::core::CoreRuntime;
use super::monitor::MonitorHandle;
use super::{CoreCommand, RuntimeEvent};

pub const DEFAULT_WORKER_TIMEOUT: Duration = Duration::from_secs(30);

/// Drives the scheduler in response to `RuntimeEvent`s and carries out the
/// commands it produces through a `WorkerBackend`.
///
/// This is a pure IO shell around `CoreRuntime`, which contains all the
/// scheduling semantics. Backend calls run in spawned tasks that report
/// back on the same event channel, so the loop never waits on a worker.
pub struct Runtime<D: ResourceDescription, B: WorkerBackend<D>> {
    core: CoreRuntime<D>,
    event_rx: mpsc::Receiver<RuntimeEvent<D>>,
    event_tx: mpsc::Sender<RuntimeEvent<D>>,
    backend: Arc<B>,
    data: Arc<dyn DataRegistry>,
    worker_retry: WorkerRetryPolicy,
    start_timeout: Duration,
    stop_timeout: Duration,
    snapshot_tx: watch::Sender<Arc<SchedulerSnapshot>>,
    reports: Option<mpsc::UnboundedSender<TaskReport>>,
    profile_output: Option<PathBuf>,
}

impl<D: ResourceDescription, B: WorkerBackend<D>> fmt::Debug for Runtime<D, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .field("worker_retry", &self.worker_retry)
            .field("profile_output", &self.profile_output)
            .finish_non_exhaustive()
    }
}

impl<D: ResourceDescription, B: WorkerBackend<D>> Runtime<D, B> {
    /// `event_tx` must feed `event_rx`; spawned backend calls use it to
    /// report back.
    pub fn new(
        core: CoreRuntime<D>,
        event_rx: mpsc::Receiver<RuntimeEvent<D>>,
        event_tx: mpsc::Sender<RuntimeEvent<D>>,
        backend: Arc<B>,
        data: Arc<dyn DataRegistry>,
    ) -> Self {
        let (snapshot_tx, _) = watch::channel(Arc::new(core.snapshot()));
        Self {
            core,
            event_rx,
            event_tx,
            backend,
            data,
            worker_retry: WorkerRetryPolicy::default(),
            start_timeout: DEFAULT_WORKER_TIMEOUT,
            stop_timeout: DEFAULT_WORKER_TIMEOUT,
            snapshot_tx,
            reports: None,
            profile_output: None,
        }
    }

    pub fn with_worker_policy(mut self, retry: WorkerRetryPolicy, start_timeout: Duration, stop_timeout: Duration) -> Self {
        self.worker_retry = retry;
        self.start_timeout = start_timeout;
        self.stop_timeout = stop_timeout;
        self
    }

    pub fn with_profile_output(mut self, path: Option<PathBuf>) -> Self {
        self.profile_output = path;
        self
    }

    /// Forward every final task report to `tx`.
    pub fn with_reports(mut self, tx: mpsc::UnboundedSender<TaskReport>) -> Self {
        self.reports = Some(tx);
        self
    }

    pub fn monitor(&self) -> MonitorHandle {
        MonitorHandle::new(self.snapshot_tx.subscribe())
    }

    /// Main event loop.
    ///
    /// - Consumes `RuntimeEvent`s from `event_rx`.
    /// - Feeds them into the core runtime.
    /// - Executes the commands returned by the core.
    /// - Publishes a fresh snapshot for monitors.
    pub async fn run(mut self) -> Result<()> {
        info!("flowsched runtime started");

        loop {
            let Some(event) = self.event_rx.recv().await else {
                info!("runtime event channel closed; exiting");
                break;
            };

            debug!(?event, "runtime received event");

            let step = self.core.step(event)?;

            for command in step.commands {
                self.execute_command(command)?;
            }

            self.snapshot_tx
                .send_replace(Arc::new(self.core.snapshot()));

            if !step.keep_running {
                info!("core requested exit; stopping runtime");
                break;
            }
        }

        info!("runtime exiting");
        Ok(())
    }

    fn execute_command(&mut self, command: CoreCommand<D>) -> Result<()> {
        match command {
            CoreCommand::Scheduler(command) => self.dispatch(command),
            CoreCommand::PersistProfiles(store) => {
                if let Some(path) = &self.profile_output {
                    store.write(path)?;
                }
            }
            CoreCommand::RequestExit => {
                info!("core issued RequestExit command");
            }
        }
        Ok(())
    }

    fn dispatch(&self, command: SchedulerCommand<D>) {
        match command {
            SchedulerCommand::TransferInputs {
                action,
                worker,
                inputs,
            } => {
                let missing: Vec<String> = inputs
                    .iter()
                    .filter(|key| key.version > 0)
                    .filter(|key| !self.data.get_data(key).is_some_and(|d| d.is_available()))
                    .map(ToString::to_string)
                    .collect();
                let backend = Arc::clone(&self.backend);
                let tx = self.event_tx.clone();
                tokio::spawn(async move {
                    let event = if !missing.is_empty() {
                        RuntimeEvent::TransfersFailed {
                            action,
                            worker,
                            reason: format!("inputs not produced yet: {}", missing.join(", ")),
                        }
                    } else {
                        match backend.transfer_inputs(worker.clone(), inputs).await {
                            Ok(()) => RuntimeEvent::TransfersCompleted { action, worker },
                            Err(err) => RuntimeEvent::TransfersFailed {
                                action,
                                worker,
                                reason: err.to_string(),
                            },
                        }
                    };
                    send_event(&tx, event).await;
                });
            }
            SchedulerCommand::SubmitJob(spec) => {
                let backend = Arc::clone(&self.backend);
                let tx = self.event_tx.clone();
                tokio::spawn(async move {
                    let (action, job) = (spec.action, spec.job);
                    send_event(&tx, RuntimeEvent::JobStarted { action, job }).await;
                    let event = match backend.submit_job(spec).await {
                        Ok(result) => RuntimeEvent::JobCompleted {
                            action,
                            job,
                            elapsed_ms: result.elapsed_ms,
                        },
                        Err(err) => RuntimeEvent::JobFailed {
                            action,
                            job,
                            reason: err.to_string(),
                        },
                    };
                    send_event(&tx, event).await;
                });
            }
            SchedulerCommand::CancelJob { action, job, worker } => {
                let Some(job) = job else {
                    debug!(action, "no job submitted yet; nothing to cancel");
                    return;
                };
                let backend = Arc::clone(&self.backend);
                tokio::spawn(async move {
                    if let Err(err) = backend.cancel_job(worker, job).await {
                        warn!(action, job, error = %err, "failed to cancel job");
                    }
                });
            }
            SchedulerCommand::StartWorker { action, worker } => {
                let backend = Arc::clone(&self.backend);
                let tx = self.event_tx.clone();
                let (policy, timeout) = (self.worker_retry, self.start_timeout);
                tokio::spawn(async move {
                    let backend: &B = &backend;
                    let name = worker.clone();
                    let result = retry_with_timeout("worker start", policy, timeout, move || {
                        backend.start_worker(name.clone())
                    })
                    .await;
                    let event = match result {
                        Ok(()) => {
                            info!(worker = %worker, "worker started");
                            RuntimeEvent::WorkerStarted { action }
                        }
                        Err(err) => RuntimeEvent::WorkerStartFailed {
                            action,
                            reason: err.to_string(),
                        },
                    };
                    send_event(&tx, event).await;
                });
            }
            SchedulerCommand::StopWorker { action, worker } => {
                let backend = Arc::clone(&self.backend);
                let tx = self.event_tx.clone();
                let (policy, timeout) = (self.worker_retry, self.stop_timeout);
                tokio::spawn(async move {
                    let backend: &B = &backend;
                    let name = worker.clone();
                    let result = retry_with_timeout("worker stop", policy, timeout, move || {
                        backend.stop_worker(name.clone())
                    })
                    .await;
                    if let Err(err) = result {
                        error!(worker = %worker, error = %err, "worker did not stop cleanly; forgetting it");
                    }
                    send_event(&tx, RuntimeEvent::WorkerStopped { action }).await;
                });
            }
            SchedulerCommand::ReduceWorker {
                action,
                worker,
                reduction,
            } => {
                let backend = Arc::clone(&self.backend);
                let tx = self.event_tx.clone();
                tokio::spawn(async move {
                    let event = match backend.reduce_worker(worker.clone(), reduction.clone()).await {
                        Ok(()) => RuntimeEvent::WorkerUpdate {
                            worker,
                            update: ResourceUpdate::reduction(reduction),
                        },
                        Err(err) => RuntimeEvent::WorkerReduceFailed {
                            action,
                            reason: err.to_string(),
                        },
                    };
                    send_event(&tx, event).await;
                });
            }
            SchedulerCommand::RegisterOutputs {
                action,
                worker,
                outputs,
            } => {
                for output in &outputs {
                    if self.data.register_location(output, &worker) {
                        debug!(action, data = %output, worker = %worker, "output registered");
                    }
                }
            }
            SchedulerCommand::TaskFinished(report) => {
                match &report.outcome {
                    TaskOutcome::Completed => info!(task = %report.name, "task finished"),
                    TaskOutcome::Failed { cause } => error!(task = %report.name, %cause, "task failed"),
                    TaskOutcome::Cancelled => warn!(task = %report.name, "task cancelled"),
                }
                if let Some(tx) = &self.reports {
                    let _ = tx.send(report);
                }
            }
        }
    }
}

async fn send_event<D>(tx: &mpsc::Sender<RuntimeEvent<D>>, event: RuntimeEvent<D>) {
    if tx.send(event).await.is_err() {
        debug!("runtime gone; dropping backend notification");
    }
}
