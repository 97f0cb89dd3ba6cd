// src/scheduler/scoring.rs

//! Pluggable scoring used by the assignment algorithm.

use std::fmt;

use crate::resources::ResourceDescription;
use crate::scheduler::action::Action;
use crate::scheduler::resource_scheduler::ResourceScheduler;
use crate::scheduler::score::Score;
use crate::types::ImplId;

/// Two-stage scoring hook.
///
/// `resource_score` is computed once per candidate resource and then used
/// as the seed of `implementation_score` for each implementation on it.
pub trait Scorer<D>: Send + Sync + fmt::Debug {
    /// Baseline score of an action, independent of any resource.
    fn action_score(&self, action: &Action<D>) -> Score;

    /// Score of a resource for this action. `None` skips the resource.
    fn resource_score(
        &self,
        action: &Action<D>,
        resource: &ResourceScheduler<D>,
        base: &Score,
    ) -> Option<Score>;

    /// Score of running `implementation` on `resource`.
    fn implementation_score(
        &self,
        action: &Action<D>,
        resource: &ResourceScheduler<D>,
        implementation: ImplId,
        resource_score: &Score,
    ) -> Score;
}

/// Penalty applied to implementations that do not fit right now.
pub const BUSY_PENALTY: i64 = i32::MAX as i64;

/// Default heuristic:
/// - priority tasks first, then lower group priority
/// - fewer actions waiting on the resource is better
/// - implementations that fit now beat those that would wait
/// - lower average execution time is better
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultScorer;

impl<D: ResourceDescription> Scorer<D> for DefaultScorer {
    fn action_score(&self, action: &Action<D>) -> Score {
        match action.task() {
            Some(task) => Score::for_action(i64::from(task.priority), task.group_priority),
            None => Score::for_action(1, 0),
        }
    }

    fn resource_score(
        &self,
        _action: &Action<D>,
        resource: &ResourceScheduler<D>,
        base: &Score,
    ) -> Option<Score> {
        let waiting = resource.blocked_actions().len() as i64;
        Some(Score {
            waiting: base.waiting - waiting,
            ..*base
        })
    }

    fn implementation_score(
        &self,
        action: &Action<D>,
        resource: &ResourceScheduler<D>,
        implementation: ImplId,
        resource_score: &Score,
    ) -> Score {
        let Some(core) = action.core_id() else {
            return *resource_score;
        };
        let mut score = *resource_score;
        let fits_now = resource
            .requirements(core, implementation)
            .is_some_and(|req| resource.can_run_now(req));
        if !fits_now {
            score.resource -= BUSY_PENALTY;
        }
        let average = resource.profile(core, implementation).average_time();
        score.implementation = -(average.min(i64::MAX as u64) as i64);
        score
    }
}
