// src/core_elements.rs

//! Registry of core elements (logical operations) and their interchangeable
//! implementations.
//!
//! The engine only reads from a [`CoreManager`]. Whoever mutates the
//! registry is responsible for notifying the engine afterwards
//! (`RuntimeEvent::CoreElementsUpdated`).

use std::sync::{PoisonError, RwLock};

use crate::resources::ResourceDescription;
use crate::types::{CoreId, ImplId};

/// One way of running a core element.
#[derive(Debug, Clone, PartialEq)]
pub struct Implementation<D> {
    pub core_id: CoreId,
    pub impl_id: ImplId,
    pub name: String,
    /// Stable key used by persisted profiles: `<core>.<implementation>`.
    pub signature: String,
    pub requirements: D,
    /// Shell command run by the local backend.
    pub command: String,
}

/// Read-only view of the operation registry.
pub trait CoreManager<D>: Send + Sync {
    fn core_count(&self) -> usize;

    fn implementation_count(&self, core: CoreId) -> usize;

    fn implementations(&self, core: CoreId) -> Vec<Implementation<D>>;

    fn core_name(&self, core: CoreId) -> Option<String>;

    fn implementation(&self, core: CoreId, implementation: ImplId) -> Option<Implementation<D>> {
        self.implementations(core).into_iter().nth(implementation)
    }
}

#[derive(Debug, Clone)]
struct CoreElement<D> {
    name: String,
    implementations: Vec<Implementation<D>>,
}

/// Declaration of an implementation before it gets ids assigned.
#[derive(Debug, Clone)]
pub struct ImplementationSpec<D> {
    pub name: String,
    pub command: String,
    pub requirements: D,
}

/// In-memory [`CoreManager`], safe to share behind an `Arc`.
#[derive(Debug)]
pub struct CoreRegistry<D> {
    cores: RwLock<Vec<CoreElement<D>>>,
}

impl<D: ResourceDescription> Default for CoreRegistry<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: ResourceDescription> CoreRegistry<D> {
    pub fn new() -> Self {
        Self {
            cores: RwLock::new(Vec::new()),
        }
    }

    /// Register a core element, or extend it if the name is already known.
    ///
    /// Implementations whose name already exists for that core are skipped.
    pub fn register_core(&self, name: &str, implementations: Vec<ImplementationSpec<D>>) -> CoreId {
        let mut cores = self.cores.write().unwrap_or_else(PoisonError::into_inner);

        let core_id = match cores.iter().position(|c| c.name == name) {
            Some(id) => id,
            None => {
                cores.push(CoreElement {
                    name: name.to_string(),
                    implementations: Vec::new(),
                });
                cores.len() - 1
            }
        };

        let element = &mut cores[core_id];
        for spec in implementations {
            if element.implementations.iter().any(|i| i.name == spec.name) {
                continue;
            }
            let impl_id = element.implementations.len();
            element.implementations.push(Implementation {
                core_id,
                impl_id,
                signature: format!("{}.{}", element.name, spec.name),
                name: spec.name,
                requirements: spec.requirements,
                command: spec.command,
            });
        }

        core_id
    }

    pub fn core_id(&self, name: &str) -> Option<CoreId> {
        let cores = self.cores.read().unwrap_or_else(PoisonError::into_inner);
        cores.iter().position(|c| c.name == name)
    }
}

impl<D: ResourceDescription> CoreManager<D> for CoreRegistry<D> {
    fn core_count(&self) -> usize {
        self.cores.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn implementation_count(&self, core: CoreId) -> usize {
        let cores = self.cores.read().unwrap_or_else(PoisonError::into_inner);
        cores.get(core).map_or(0, |c| c.implementations.len())
    }

    fn implementations(&self, core: CoreId) -> Vec<Implementation<D>> {
        let cores = self.cores.read().unwrap_or_else(PoisonError::into_inner);
        cores
            .get(core)
            .map(|c| c.implementations.clone())
            .unwrap_or_default()
    }

    fn core_name(&self, core: CoreId) -> Option<String> {
        let cores = self.cores.read().unwrap_or_else(PoisonError::into_inner);
        cores.get(core).map(|c| c.name.clone())
    }
}
