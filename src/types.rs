// src/types.rs

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Index of an action in the engine's action arena.
pub type ActionId = u64;

/// Application-level task identifier (one task may spawn several actions
/// over its lifetime, e.g. after cancellation and resubmission).
pub type TaskId = u64;

/// Index of a core element (logical operation) in the core registry.
pub type CoreId = usize;

/// Index of an implementation within its core element.
pub type ImplId = usize;

/// Identifier of a job submitted to a worker.
pub type JobId = u64;

/// Worker names double as resource identifiers.
pub type WorkerName = String;

/// What to do when an action runs out of chances on a worker.
///
/// - `Retry`: walk the transfer / submission / scheduling budgets before
///   giving up (default).
/// - `Ignore`: treat the failure as if the task finished; successors run.
/// - `CancelSuccessors`: fail on the first error and cancel every
///   dependent action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OnFailure {
    Retry,
    Ignore,
    CancelSuccessors,
}

impl Default for OnFailure {
    fn default() -> Self {
        OnFailure::Retry
    }
}

impl FromStr for OnFailure {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "retry" => Ok(OnFailure::Retry),
            "ignore" => Ok(OnFailure::Ignore),
            "cancel_successors" | "cancel-successors" => Ok(OnFailure::CancelSuccessors),
            other => Err(format!(
                "invalid on_failure: {other} (expected \"retry\", \"ignore\" or \"cancel_successors\")"
            )),
        }
    }
}

impl fmt::Display for OnFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OnFailure::Retry => "retry",
            OnFailure::Ignore => "ignore",
            OnFailure::CancelSuccessors => "cancel_successors",
        };
        f.write_str(s)
    }
}
