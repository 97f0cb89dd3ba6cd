// src/exec/backend.rs

//! Pluggable worker backend abstraction.
//!
//! The runtime talks to a `WorkerBackend` for everything that touches a
//! worker: moving inputs, running jobs, starting, stopping and shrinking
//! workers. Calls are made from spawned tasks, so a slow worker never
//! stalls the engine.
//!
//! - [`LocalBackend`](super::LocalBackend) runs jobs as local processes.
//! - Tests provide their own implementation that records calls and
//!   completes them on demand.

use std::future::Future;
use std::pin::Pin;

use crate::data::DataKey;
use crate::errors::Result;
use crate::scheduler::JobSpec;
use crate::types::{JobId, WorkerName};

pub type BackendFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// What a finished job reports back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobResult {
    pub elapsed_ms: u64,
}

/// Trait abstracting how work reaches the workers.
///
/// Implementations are shared behind an `Arc` and must tolerate concurrent
/// calls.
pub trait WorkerBackend<D>: Send + Sync + 'static {
    /// Make `inputs` available on `worker`.
    fn transfer_inputs(&self, worker: WorkerName, inputs: Vec<DataKey>) -> BackendFuture<'_, ()>;

    /// Run a job to completion. An error means the job failed.
    fn submit_job(&self, job: JobSpec) -> BackendFuture<'_, JobResult>;

    /// Ask a running job to stop. Its `submit_job` future then resolves
    /// with an error.
    fn cancel_job(&self, worker: WorkerName, job: JobId) -> BackendFuture<'_, ()>;

    fn start_worker(&self, worker: WorkerName) -> BackendFuture<'_, ()>;

    fn stop_worker(&self, worker: WorkerName) -> BackendFuture<'_, ()>;

    /// Give `reduction` back to the resource manager.
    fn reduce_worker(&self, worker: WorkerName, reduction: D) -> BackendFuture<'_, ()>;
}
