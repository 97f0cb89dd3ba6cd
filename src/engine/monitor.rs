// src/engine/monitor.rs

use std::sync::Arc;

use tokio::sync::watch;

use crate::scheduler::SchedulerSnapshot;

/// Read-only view of the engine for monitors.
///
/// Holds the latest snapshot published by the runtime; reading never
/// touches live scheduler state.
#[derive(Debug, Clone)]
pub struct MonitorHandle {
    rx: watch::Receiver<Arc<SchedulerSnapshot>>,
}

impl MonitorHandle {
    pub(crate) fn new(rx: watch::Receiver<Arc<SchedulerSnapshot>>) -> Self {
        Self { rx }
    }

    pub fn snapshot(&self) -> Arc<SchedulerSnapshot> {
        Arc::clone(&self.rx.borrow())
    }

    /// Wait for the next published snapshot. Returns `None` once the
    /// runtime is gone.
    pub async fn changed(&mut self) -> Option<Arc<SchedulerSnapshot>> {
        self.rx.changed().await.ok()?;
        Some(Arc::clone(&self.rx.borrow_and_update()))
    }
}
