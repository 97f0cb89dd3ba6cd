// src/scheduler/execution.rs

//! Execution lifecycle of an action on a worker and the retry budgets that
//! govern it.
//!
//! Three independent budgets apply:
//! - transfer chances: input transfers to the current worker
//! - submission chances: job (re)submissions to the current worker
//! - scheduling chances: distinct workers the action may be tried on

use crate::scheduler::action::Action;
use crate::types::OnFailure;

pub const DEFAULT_TRANSFER_CHANCES: u32 = 2;
pub const DEFAULT_SUBMISSION_CHANCES: u32 = 2;
pub const DEFAULT_SCHEDULING_CHANCES: u32 = 2;

/// Where an action is in its execution lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionState {
    Created,
    Scheduled,
    TransferringInputs,
    Submitted,
    Running,
    Completed,
    RetryTransfer,
    RetrySubmit,
    Failed,
}

/// Reaction to a failed input transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDecision {
    Retry,
    Error,
}

/// Reaction to a failed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionDecision {
    Resubmit,
    Error,
}

/// Reaction of the action itself once it has been reported as errored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorDecision {
    /// Try again on another worker.
    Reschedule,
    /// Out of chances: fail permanently and cancel dependents.
    Fail,
    /// Failure tolerated: release dependents as if completed.
    Ignore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub transfer_chances: u32,
    pub submission_chances: u32,
    pub scheduling_chances: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            transfer_chances: DEFAULT_TRANSFER_CHANCES,
            submission_chances: DEFAULT_SUBMISSION_CHANCES,
            scheduling_chances: DEFAULT_SCHEDULING_CHANCES,
        }
    }
}

impl RetryPolicy {
    /// Count a transfer failure and decide whether to try again.
    ///
    /// The `transfer_chances`-th failure on the same launch reports the
    /// action as errored.
    pub fn on_transfer_failure<D>(&self, action: &mut Action<D>) -> TransferDecision {
        action.transfer_errors += 1;
        if action.attempt_transfer_errors() < self.transfer_chances
            && action.on_failure() == OnFailure::Retry
        {
            action.lifecycle = ExecutionState::RetryTransfer;
            TransferDecision::Retry
        } else {
            TransferDecision::Error
        }
    }

    /// Count a job failure and decide whether to resubmit to the same worker.
    ///
    /// Transfer and job failures of the current launch share the
    /// submission budget.
    pub fn on_job_failure<D>(&self, action: &mut Action<D>) -> SubmissionDecision {
        action.execution_errors += 1;
        let spent = action.attempt_transfer_errors() + action.attempt_execution_errors();
        if spent < self.submission_chances && action.on_failure() == OnFailure::Retry {
            action.lifecycle = ExecutionState::RetrySubmit;
            SubmissionDecision::Resubmit
        } else {
            SubmissionDecision::Error
        }
    }

    /// Decide the fate of an errored action.
    ///
    /// Failed launches are counted rather than distinct workers so that an
    /// action pinned to a single worker still runs out of chances.
    pub fn on_error<D>(&self, action: &Action<D>) -> ErrorDecision {
        match action.on_failure() {
            OnFailure::Ignore => ErrorDecision::Ignore,
            OnFailure::CancelSuccessors => ErrorDecision::Fail,
            OnFailure::Retry => {
                if action.failed_attempts() as u32 >= self.scheduling_chances {
                    ErrorDecision::Fail
                } else {
                    ErrorDecision::Reschedule
                }
            }
        }
    }
}
