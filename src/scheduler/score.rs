// src/scheduler/score.rs

use std::cmp::Ordering;

/// Ranking tuple for (action, resource, implementation) candidates.
///
/// Components are compared in order:
/// 1. `priority`: higher wins
/// 2. `group_priority`: lower wins (earlier groups go first)
/// 3. `resource`: higher wins
/// 4. `waiting`: higher wins
/// 5. `implementation`: higher wins
///
/// `Ord` follows that rule, so `a > b` means "a is better than b" and the
/// order is total.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Score {
    pub priority: i64,
    pub group_priority: i64,
    pub resource: i64,
    pub waiting: i64,
    pub implementation: i64,
}

impl Score {
    pub fn new(priority: i64, group_priority: i64, resource: i64, waiting: i64, implementation: i64) -> Self {
        Self {
            priority,
            group_priority,
            resource,
            waiting,
            implementation,
        }
    }

    /// Baseline for an action: only the priority components are set.
    pub fn for_action(priority: i64, group_priority: i64) -> Self {
        Self::new(priority, group_priority, 0, 0, 0)
    }

    /// Strictly better; equal scores are not better than each other.
    pub fn is_better(&self, other: &Score) -> bool {
        self > other
    }

    /// Pick the better of two optional scores, keeping `current` on ties.
    pub fn is_better_option(candidate: &Score, current: Option<&Score>) -> bool {
        match current {
            None => true,
            Some(current) => candidate.is_better(current),
        }
    }
}

impl Ord for Score {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.group_priority.cmp(&self.group_priority))
            .then_with(|| self.resource.cmp(&other.resource))
            .then_with(|| self.waiting.cmp(&other.waiting))
            .then_with(|| self.implementation.cmp(&other.implementation))
    }
}

impl PartialOrd for Score {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
