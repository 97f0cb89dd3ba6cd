// src/scheduler/resource_scheduler.rs

//! Per-worker scheduling state.
//!
//! A [`ResourceScheduler`] knows:
//! - the worker's declared capacity and the consumption of hosted actions
//! - which actions are assigned to it but not running yet
//! - which of those are waiting for capacity, in launch order
//! - execution profiles per (core, implementation)

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use thiserror::Error;
use tracing::debug;

use crate::resources::ResourceDescription;
use crate::scheduler::profile::Profile;
use crate::scheduler::score::Score;
use crate::types::{ActionId, CoreId, ImplId, WorkerName};

/// The action was not hosted, blocked or assigned on this resource.
///
/// Callers treat it as a benign race (the action already moved on).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("action {action} not found on worker {worker}")]
pub struct ActionNotFound {
    pub action: ActionId,
    pub worker: WorkerName,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct BlockedKey {
    score: Reverse<Score>,
    seq: u64,
}

#[derive(Debug, Clone)]
struct BlockedEntry<D> {
    key: BlockedKey,
    requirements: D,
}

#[derive(Debug, Clone)]
pub struct ResourceScheduler<D> {
    name: WorkerName,
    capacity: D,
    /// Requirements per core, per implementation.
    requirements: Vec<Vec<D>>,
    hosted: BTreeMap<ActionId, D>,
    assigned: BTreeSet<ActionId>,
    blocked: BTreeMap<BlockedKey, ActionId>,
    blocked_index: HashMap<ActionId, BlockedEntry<D>>,
    profiles: Vec<Vec<Profile>>,
    session_profiles: Vec<Vec<Profile>>,
    pending_reductions: Vec<(ActionId, D)>,
    removed: bool,
    seq: u64,
}

impl<D: ResourceDescription> ResourceScheduler<D> {
    /// New scheduler for `name` with no capacity yet.
    ///
    /// `requirements[core][impl]` mirrors the core registry.
    pub fn new(name: impl Into<WorkerName>, requirements: Vec<Vec<D>>) -> Self {
        let profiles = empty_profiles(&requirements);
        Self {
            name: name.into(),
            capacity: D::default(),
            session_profiles: profiles.clone(),
            profiles,
            requirements,
            hosted: BTreeMap::new(),
            assigned: BTreeSet::new(),
            blocked: BTreeMap::new(),
            blocked_index: HashMap::new(),
            pending_reductions: Vec::new(),
            removed: false,
            seq: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> &D {
        &self.capacity
    }

    /// Capacity not consumed by hosted actions.
    pub fn available(&self) -> D {
        let mut free = self.capacity.clone();
        for consumption in self.hosted.values() {
            free.reduce(consumption);
        }
        free
    }

    pub fn is_removed(&self) -> bool {
        self.removed
    }

    pub fn set_removed(&mut self) {
        self.removed = true;
    }

    pub fn increase_capacity(&mut self, increment: &D) {
        self.capacity.increase(increment);
    }

    pub fn reduce_capacity(&mut self, reduction: &D) {
        self.capacity.reduce(reduction);
    }

    pub fn requirements(&self, core: CoreId, implementation: ImplId) -> Option<&D> {
        self.requirements.get(core).and_then(|impls| impls.get(implementation))
    }

    /// Whether the implementation fits the declared capacity at all.
    pub fn can_run(&self, core: CoreId, implementation: ImplId) -> bool {
        self.requirements(core, implementation)
            .is_some_and(|req| self.capacity.can_host(req))
    }

    /// Whether the requirements fit in what is free right now.
    pub fn can_run_now(&self, requirements: &D) -> bool {
        self.available().can_host(requirements)
    }

    pub fn can_run_core(&self, core: CoreId) -> bool {
        !self.removed && !self.executable_implementations(core).is_empty()
    }

    /// Implementations of `core` that fit the declared capacity.
    pub fn executable_implementations(&self, core: CoreId) -> Vec<ImplId> {
        match self.requirements.get(core) {
            Some(impls) => (0..impls.len())
                .filter(|&i| self.capacity.can_host(&impls[i]))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Cores this worker can execute, ascending.
    pub fn executable_cores(&self) -> Vec<CoreId> {
        (0..self.requirements.len())
            .filter(|&core| self.can_run_core(core))
            .collect()
    }

    /// Record an action as tentatively assigned here.
    pub fn initial_schedule(&mut self, action: ActionId) {
        self.assigned.insert(action);
    }

    pub fn is_assigned(&self, action: ActionId) -> bool {
        self.assigned.contains(&action)
    }

    /// Move an assigned action to the hosted set, consuming `requirements`.
    pub fn host_action(&mut self, action: ActionId, requirements: D) {
        self.assigned.remove(&action);
        self.remove_blocked(action);
        self.hosted.insert(action, requirements);
    }

    pub fn is_hosted(&self, action: ActionId) -> bool {
        self.hosted.contains_key(&action)
    }

    pub fn hosted_actions(&self) -> Vec<ActionId> {
        self.hosted.keys().copied().collect()
    }

    pub fn assigned_actions(&self) -> Vec<ActionId> {
        self.assigned.iter().copied().collect()
    }

    /// Park an assigned action until enough capacity is free.
    pub fn wait_on_resource(&mut self, action: ActionId, score: Score, requirements: D) {
        self.remove_blocked(action);
        self.assigned.insert(action);
        self.seq += 1;
        let key = BlockedKey {
            score: Reverse(score),
            seq: self.seq,
        };
        self.blocked.insert(key, action);
        self.blocked_index
            .insert(action, BlockedEntry { key, requirements });
    }

    pub fn has_blocked_actions(&self) -> bool {
        !self.blocked.is_empty()
    }

    /// Actions waiting for capacity, best score first (FIFO among equals).
    pub fn blocked_actions(&self) -> Vec<ActionId> {
        self.blocked.values().copied().collect()
    }

    pub fn is_blocked(&self, action: ActionId) -> bool {
        self.blocked_index.contains_key(&action)
    }

    fn remove_blocked(&mut self, action: ActionId) -> bool {
        match self.blocked_index.remove(&action) {
            Some(entry) => {
                self.blocked.remove(&entry.key);
                true
            }
            None => false,
        }
    }

    /// Forget `action` and return the waiting actions that now fit.
    ///
    /// Hosted actions give their consumption back and a removed queue head
    /// stops holding back the ones behind it. The returned actions are
    /// taken off the waiting queue (they stay assigned) in launch order.
    pub fn unschedule_action(&mut self, action: ActionId) -> Result<Vec<ActionId>, ActionNotFound> {
        let was_hosted = self.hosted.remove(&action).is_some();
        let was_blocked = self.remove_blocked(action);
        let was_assigned = self.assigned.remove(&action);

        if !(was_hosted || was_blocked || was_assigned) {
            return Err(ActionNotFound {
                action,
                worker: self.name.clone(),
            });
        }

        if was_hosted || was_blocked {
            Ok(self.take_launchable_blocked())
        } else {
            Ok(Vec::new())
        }
    }

    /// Pop waiting actions from the head of the queue while they fit in the
    /// free capacity, accounting for each other.
    pub fn take_launchable_blocked(&mut self) -> Vec<ActionId> {
        let mut budget = self.available();
        let mut freed = Vec::new();

        loop {
            let Some((key, action)) = self.blocked.first_key_value().map(|(k, a)| (*k, *a)) else {
                break;
            };
            let fits = match self.blocked_index.get(&action) {
                Some(entry) => budget.try_reserve(&entry.requirements),
                None => true,
            };
            if !fits {
                break;
            }
            self.blocked.remove(&key);
            self.blocked_index.remove(&action);
            freed.push(action);
        }

        if !freed.is_empty() {
            debug!(worker = %self.name, ?freed, "capacity freed for waiting actions");
        }
        freed
    }

    /// Waiting actions whose requirements no longer fit the declared
    /// capacity.
    pub fn unfit_blocked_actions(&self) -> Vec<ActionId> {
        self.blocked
            .values()
            .copied()
            .filter(|action| {
                self.blocked_index
                    .get(action)
                    .is_some_and(|e| !self.capacity.can_host(&e.requirements))
            })
            .collect()
    }

    pub fn profile(&self, core: CoreId, implementation: ImplId) -> Profile {
        self.profiles
            .get(core)
            .and_then(|impls| impls.get(implementation))
            .cloned()
            .unwrap_or_default()
    }

    /// Merge a finished run into the (core, implementation) profile.
    pub fn profiled_execution(&mut self, core: CoreId, implementation: ImplId, profile: &Profile) {
        if let Some(p) = self
            .profiles
            .get_mut(core)
            .and_then(|impls| impls.get_mut(implementation))
        {
            p.accumulate(profile);
        }
        if let Some(p) = self
            .session_profiles
            .get_mut(core)
            .and_then(|impls| impls.get_mut(implementation))
        {
            p.accumulate(profile);
        }
    }

    /// Replace the starting profiles (loaded from a previous run).
    pub fn seed_profiles(&mut self, seeds: Vec<Vec<Profile>>) {
        for (core, impls) in seeds.into_iter().enumerate() {
            for (implementation, seed) in impls.into_iter().enumerate() {
                if let Some(p) = self
                    .profiles
                    .get_mut(core)
                    .and_then(|row| row.get_mut(implementation))
                {
                    *p = seed;
                }
            }
        }
    }

    /// Profiles including what was loaded at startup.
    pub fn profiles(&self) -> &[Vec<Profile>] {
        &self.profiles
    }

    /// Profiles of runs observed by this process only.
    pub fn session_profiles(&self) -> &[Vec<Profile>] {
        &self.session_profiles
    }

    /// Runs of `core` completed on this worker during this session.
    pub fn executed_count(&self, core: CoreId) -> u64 {
        self.session_profiles
            .get(core)
            .map_or(0, |impls| impls.iter().map(Profile::executions).sum())
    }

    /// Adopt a new core registry shape, keeping existing rows by index.
    pub fn updated_core_elements(&mut self, requirements: Vec<Vec<D>>) {
        resize_profiles(&mut self.profiles, &requirements);
        resize_profiles(&mut self.session_profiles, &requirements);
        self.requirements = requirements;
    }

    pub fn add_pending_reduction(&mut self, action: ActionId, reduction: D) {
        self.pending_reductions.push((action, reduction));
    }

    /// The reduce action created for a pending reduction equal to
    /// `reduction`, if any.
    pub fn take_pending_reduction(&mut self, reduction: &D) -> Option<ActionId> {
        let idx = self
            .pending_reductions
            .iter()
            .position(|(_, r)| r == reduction)?;
        Some(self.pending_reductions.remove(idx).0)
    }

    /// Forget the pending reduction carried by `action`.
    pub fn drop_pending_reduction(&mut self, action: ActionId) -> Option<D> {
        let idx = self.pending_reductions.iter().position(|(a, _)| *a == action)?;
        Some(self.pending_reductions.remove(idx).1)
    }

    pub fn pending_reductions(&self) -> impl Iterator<Item = ActionId> + '_ {
        self.pending_reductions.iter().map(|(action, _)| *action)
    }
}

fn empty_profiles<D>(requirements: &[Vec<D>]) -> Vec<Vec<Profile>> {
    requirements
        .iter()
        .map(|impls| vec![Profile::default(); impls.len()])
        .collect()
}

fn resize_profiles<D>(profiles: &mut Vec<Vec<Profile>>, requirements: &[Vec<D>]) {
    profiles.resize_with(requirements.len(), Vec::new);
    for (row, impls) in profiles.iter_mut().zip(requirements) {
        row.resize_with(impls.len(), Profile::default);
    }
}
