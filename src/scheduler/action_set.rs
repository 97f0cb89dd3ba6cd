// src/scheduler/action_set.rs

use std::collections::{BTreeMap, BTreeSet};

use crate::types::{ActionId, CoreId};

/// Actions grouped by core element.
///
/// Used for the engine's global blocked set and for the ready counters.
/// Insertion and removal are idempotent, so per-core counts can never drift
/// from the actual membership.
#[derive(Debug, Clone, Default)]
pub struct ActionSet {
    per_core: Vec<BTreeSet<ActionId>>,
    members: BTreeMap<ActionId, CoreId>,
}

impl ActionSet {
    pub fn new(core_count: usize) -> Self {
        Self {
            per_core: vec![BTreeSet::new(); core_count],
            members: BTreeMap::new(),
        }
    }

    /// Grow or shrink the per-core table, keeping rows by index.
    ///
    /// Members of dropped cores stay in the set and are reported under no
    /// core until the table grows back.
    pub fn update_core_count(&mut self, core_count: usize) {
        self.per_core.resize_with(core_count, BTreeSet::new);
        for (action, core) in &self.members {
            if let Some(row) = self.per_core.get_mut(*core) {
                row.insert(*action);
            }
        }
    }

    /// Returns `true` if the action was not in the set yet.
    pub fn add(&mut self, action: ActionId, core: CoreId) -> bool {
        if self.members.contains_key(&action) {
            return false;
        }
        if core >= self.per_core.len() {
            self.per_core.resize_with(core + 1, BTreeSet::new);
        }
        self.per_core[core].insert(action);
        self.members.insert(action, core);
        true
    }

    /// Returns `true` if the action was in the set.
    pub fn remove(&mut self, action: ActionId) -> bool {
        match self.members.remove(&action) {
            Some(core) => {
                if let Some(row) = self.per_core.get_mut(core) {
                    row.remove(&action);
                }
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, action: ActionId) -> bool {
        self.members.contains_key(&action)
    }

    /// Remove and return, in id order, every member accepted by `pred`.
    pub fn remove_matching<F>(&mut self, mut pred: F) -> Vec<ActionId>
    where
        F: FnMut(ActionId, CoreId) -> bool,
    {
        let matching: Vec<ActionId> = self
            .members
            .iter()
            .filter(|(action, core)| pred(**action, **core))
            .map(|(action, _)| *action)
            .collect();
        for action in &matching {
            self.remove(*action);
        }
        matching
    }

    pub fn count(&self, core: CoreId) -> usize {
        self.per_core.get(core).map_or(0, BTreeSet::len)
    }

    pub fn counts(&self) -> Vec<usize> {
        self.per_core.iter().map(BTreeSet::len).collect()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn actions(&self) -> Vec<ActionId> {
        self.members.keys().copied().collect()
    }
}
