// src/scheduler/assignment.rs

//! Choice of a (worker, implementation) pair for an execution action.
//!
//! Candidates are visited in worker-name order and the first best score
//! wins, so repeated calls over the same state give the same answer.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::resources::ResourceDescription;
use crate::scheduler::action::{Action, ActionArena};
use crate::scheduler::resource_scheduler::ResourceScheduler;
use crate::scheduler::score::Score;
use crate::scheduler::scoring::Scorer;
use crate::types::{ImplId, WorkerName};

/// Chosen home for an action.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub worker: WorkerName,
    pub implementation: ImplId,
    pub score: Score,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScheduleOutcome {
    Scheduled(Assignment),
    /// No candidate worker can ever run the action with the current pool.
    Blocked,
    /// Candidates exist but none of them accepted the action.
    Unassigned,
}

/// Workers the action may be placed on.
///
/// Precedence: a forced worker, else the workers of the actions it must be
/// colocated with, else every worker able to run its core.
///
/// A colocation predecessor that is no longer assigned counts with the
/// worker it last ran on. Constraints on finished predecessors that never
/// ran anywhere are dropped.
pub fn candidate_workers<D: ResourceDescription>(
    action: &Action<D>,
    arena: &ActionArena<D>,
    workers: &BTreeMap<WorkerName, ResourceScheduler<D>>,
) -> Vec<WorkerName> {
    if let Some(target) = action.enforced_target() {
        return workers
            .get(target)
            .filter(|rs| !rs.is_removed())
            .map(|rs| vec![rs.name().to_string()])
            .unwrap_or_default();
    }

    let binding: Vec<&Action<D>> = action
        .resource_constraints()
        .iter()
        .filter_map(|pred| arena.get(*pred))
        .filter(|pred| pred.last_resource().is_some() || !pred.state().is_terminal())
        .collect();
    if !binding.is_empty() {
        let mut candidates: Vec<WorkerName> = Vec::new();
        for pred in binding {
            let Some(worker) = pred.last_resource() else {
                continue;
            };
            let usable = workers.get(worker).is_some_and(|rs| !rs.is_removed());
            if usable && !candidates.iter().any(|c| c == worker) {
                candidates.push(worker.to_string());
            }
        }
        return candidates;
    }

    let Some(core) = action.core_id() else {
        return Vec::new();
    };
    workers
        .values()
        .filter(|rs| rs.can_run_core(core))
        .map(|rs| rs.name().to_string())
        .collect()
}

/// Score every candidate and pick the best (worker, implementation).
///
/// Workers the action already ran on are skipped while an untried candidate
/// able to run it is left.
pub fn find_assignment<D: ResourceDescription>(
    action: &Action<D>,
    candidates: &[WorkerName],
    workers: &BTreeMap<WorkerName, ResourceScheduler<D>>,
    scorer: &dyn Scorer<D>,
    base: &Score,
) -> ScheduleOutcome {
    let Some(core) = action.core_id() else {
        return ScheduleOutcome::Blocked;
    };

    let tried = |name: &WorkerName| action.executing_resources().iter().any(|w| w == name);
    let untried_left = candidates.iter().any(|name| {
        !tried(name)
            && workers
                .get(name)
                .is_some_and(|rs| !rs.is_removed() && !rs.executable_implementations(core).is_empty())
    });
    let mut useful_resources = 0usize;
    let mut best: Option<Assignment> = None;

    for name in candidates {
        let Some(rs) = workers.get(name) else {
            continue;
        };
        if rs.is_removed() {
            continue;
        }
        let implementations = rs.executable_implementations(core);
        if implementations.is_empty() {
            continue;
        }
        if untried_left && tried(name) {
            debug!(action = action.id(), worker = %name, "already ran on worker; skipping");
            continue;
        }

        useful_resources += 1;
        let Some(resource_score) = scorer.resource_score(action, rs, base) else {
            continue;
        };

        for implementation in implementations {
            let score = scorer.implementation_score(action, rs, implementation, &resource_score);
            if Score::is_better_option(&score, best.as_ref().map(|b| &b.score)) {
                best = Some(Assignment {
                    worker: name.clone(),
                    implementation,
                    score,
                });
            }
        }
    }

    match best {
        Some(assignment) => ScheduleOutcome::Scheduled(assignment),
        None if useful_resources == 0 => {
            warn!(action = action.id(), core, "no worker can run action");
            ScheduleOutcome::Blocked
        }
        None => ScheduleOutcome::Unassigned,
    }
}
