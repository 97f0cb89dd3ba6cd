// src/exec/mod.rs

//! Worker execution layer.
//!
//! - [`backend`] provides the `WorkerBackend` trait the runtime drives.
//! - [`local`] runs jobs as local processes with `tokio::process::Command`.
//! - [`retry`] bounds worker start / stop requests with timeouts and
//!   exponential backoff.

pub mod backend;
pub mod local;
pub mod retry;

pub use backend::{BackendFuture, JobResult, WorkerBackend};
pub use local::LocalBackend;
pub use retry::{WorkerRetryPolicy, retry_with_timeout};
