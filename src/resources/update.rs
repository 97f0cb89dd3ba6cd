// src/resources/update.rs

/// Direction of a capacity change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateKind {
    Increase,
    Reduce,
}

/// A capacity change pushed by the resource manager into the engine.
///
/// `completed == false` means the change has been requested but has not
/// landed on the worker yet; for reductions the engine then reserves the
/// amount on the worker so no new work is placed on it.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceUpdate<D> {
    kind: UpdateKind,
    modification: D,
    completed: bool,
    stop_worker: bool,
}

impl<D> ResourceUpdate<D> {
    /// Capacity that is available right now (new worker, grown worker).
    pub fn increase(modification: D) -> Self {
        Self {
            kind: UpdateKind::Increase,
            modification,
            completed: true,
            stop_worker: false,
        }
    }

    /// Capacity that has been requested but is not usable yet.
    pub fn pending_increase(modification: D) -> Self {
        Self {
            kind: UpdateKind::Increase,
            modification,
            completed: false,
            stop_worker: false,
        }
    }

    /// Reduction that still has to be carried out on the worker.
    pub fn pending_reduction(modification: D) -> Self {
        Self {
            kind: UpdateKind::Reduce,
            modification,
            completed: false,
            stop_worker: false,
        }
    }

    /// Reduction already carried out; the worker keeps running.
    pub fn reduction(modification: D) -> Self {
        Self {
            kind: UpdateKind::Reduce,
            modification,
            completed: true,
            stop_worker: false,
        }
    }

    /// Reduction already carried out after which the worker must go away.
    pub fn decommission(modification: D) -> Self {
        Self {
            kind: UpdateKind::Reduce,
            modification,
            completed: true,
            stop_worker: true,
        }
    }

    pub fn kind(&self) -> UpdateKind {
        self.kind
    }

    pub fn modification(&self) -> &D {
        &self.modification
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn should_stop_worker(&self) -> bool {
        self.stop_worker
    }
}
