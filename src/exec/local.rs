// src/exec/local.rs

//! Backend running every worker on the local machine.
//!
//! Jobs are shell commands (`sh -c`, `cmd /C` on Windows) run from the
//! configured root directory. Worker start, stop and reduce requests have
//! nothing to do locally and succeed at once.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use anyhow::{Context, anyhow};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::data::{DataKey, DataRegistry};
use crate::exec::backend::{BackendFuture, JobResult, WorkerBackend};
use crate::resources::ResourceDescription;
use crate::scheduler::JobSpec;
use crate::types::{JobId, WorkerName};

pub struct LocalBackend {
    root: PathBuf,
    data: Arc<dyn DataRegistry>,
    running: Mutex<HashMap<JobId, oneshot::Sender<()>>>,
}

impl std::fmt::Debug for LocalBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalBackend")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl LocalBackend {
    pub fn new(root: impl Into<PathBuf>, data: Arc<dyn DataRegistry>) -> Self {
        Self {
            root: root.into(),
            data,
            running: Mutex::new(HashMap::new()),
        }
    }

    /// Version 0 inputs not produced by any task must exist on disk.
    fn check_inputs(&self, worker: &str, inputs: &[DataKey]) -> crate::errors::Result<()> {
        for input in inputs {
            let known = self
                .data
                .get_data(input)
                .is_some_and(|d| d.is_available());
            if known {
                continue;
            }
            if input.version == 0 && self.root.join(&input.name).exists() {
                self.data.register_location(input, worker);
                continue;
            }
            return Err(anyhow!("input {input} is not available for worker {worker}").into());
        }
        Ok(())
    }

    fn shell_command(&self, job: &JobSpec) -> Command {
        let mut cmd = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(&job.command);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(&job.command);
            c
        };
        cmd.current_dir(&self.root)
            .env("FLOWSCHED_TASK", &job.task_name)
            .env("FLOWSCHED_WORKER", &job.worker)
            .env("FLOWSCHED_JOB", job.job.to_string())
            .env("FLOWSCHED_IMPLEMENTATION", &job.signature)
            .env("FLOWSCHED_INPUTS", join_names(&job.inputs))
            .env("FLOWSCHED_OUTPUTS", join_names(&job.outputs))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    async fn run_job(&self, job: JobSpec, mut cancel_rx: oneshot::Receiver<()>) -> crate::errors::Result<JobResult> {
        info!(
            task = %job.task_name,
            job = job.job,
            worker = %job.worker,
            cmd = %job.command,
            "starting job process"
        );

        let started = Instant::now();
        let mut child = self
            .shell_command(&job)
            .spawn()
            .with_context(|| format!("spawning process for task '{}'", job.task_name))?;

        if let Some(stdout) = child.stdout.take() {
            let task_name = job.task_name.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    info!(task = %task_name, "stdout: {}", line);
                }
            });
        }
        if let Some(stderr) = child.stderr.take() {
            let task_name = job.task_name.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(task = %task_name, "stderr: {}", line);
                }
            });
        }

        tokio::select! {
            status = child.wait() => {
                let status = status.with_context(|| {
                    format!("waiting for process of task '{}'", job.task_name)
                })?;
                let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                let code = status.code().unwrap_or(-1);
                info!(
                    task = %job.task_name,
                    job = job.job,
                    exit_code = code,
                    elapsed_ms,
                    "job process exited"
                );
                if status.success() {
                    Ok(JobResult { elapsed_ms })
                } else {
                    Err(anyhow!("task '{}' exited with code {code}", job.task_name).into())
                }
            }
            _ = &mut cancel_rx => {
                info!(task = %job.task_name, job = job.job, "cancellation requested; killing process");
                if let Err(err) = child.kill().await {
                    warn!(task = %job.task_name, error = %err, "failed to kill job process");
                }
                Err(anyhow!("job {} cancelled", job.job).into())
            }
        }
    }
}

impl<D: ResourceDescription> WorkerBackend<D> for LocalBackend {
    fn transfer_inputs(&self, worker: WorkerName, inputs: Vec<DataKey>) -> BackendFuture<'_, ()> {
        Box::pin(async move { self.check_inputs(&worker, &inputs) })
    }

    fn submit_job(&self, job: JobSpec) -> BackendFuture<'_, JobResult> {
        Box::pin(async move {
            let (cancel_tx, cancel_rx) = oneshot::channel();
            let id = job.job;
            self.running
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(id, cancel_tx);
            let result = self.run_job(job, cancel_rx).await;
            self.running
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&id);
            result
        })
    }

    fn cancel_job(&self, worker: WorkerName, job: JobId) -> BackendFuture<'_, ()> {
        Box::pin(async move {
            let sender = self
                .running
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&job);
            match sender {
                Some(tx) => {
                    if tx.send(()).is_err() {
                        debug!(job, worker = %worker, "job already finished while cancelling");
                    }
                }
                None => debug!(job, worker = %worker, "no running process for job"),
            }
            Ok(())
        })
    }

    fn start_worker(&self, worker: WorkerName) -> BackendFuture<'_, ()> {
        Box::pin(async move {
            debug!(worker = %worker, "local worker ready");
            Ok(())
        })
    }

    fn stop_worker(&self, worker: WorkerName) -> BackendFuture<'_, ()> {
        Box::pin(async move {
            debug!(worker = %worker, "local worker stopped");
            Ok(())
        })
    }

    fn reduce_worker(&self, worker: WorkerName, reduction: D) -> BackendFuture<'_, ()> {
        Box::pin(async move {
            debug!(worker = %worker, ?reduction, "local worker reduced");
            Ok(())
        })
    }
}

fn join_names(keys: &[DataKey]) -> String {
    keys.iter()
        .map(|k| k.name.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}
