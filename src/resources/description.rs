// src/resources/description.rs

use std::fmt;

use serde::{Deserialize, Serialize};

/// Capacity vector of a worker, or requirement vector of an implementation.
///
/// The same type is used for both sides: a worker's capacity `can_host` an
/// implementation's requirements when every component fits.
pub trait ResourceDescription:
    Clone + fmt::Debug + Default + PartialEq + Send + Sync + 'static
{
    /// `true` if `requirements` fit entirely inside `self`.
    fn can_host(&self, requirements: &Self) -> bool;

    /// Merge `increment` into `self`.
    fn increase(&mut self, increment: &Self);

    /// Remove `reduction` from `self`, saturating at zero per component.
    fn reduce(&mut self, reduction: &Self);

    /// `true` when nothing is left to host work with.
    fn is_empty(&self) -> bool;

    /// Take `requirements` out of `self` if they fit.
    fn try_reserve(&mut self, requirements: &Self) -> bool {
        if !self.can_host(requirements) {
            return false;
        }
        self.reduce(requirements);
        true
    }
}

/// CPU / GPU / memory description used by method implementations and
/// worker declarations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodResources {
    #[serde(default)]
    pub cpus: u32,
    #[serde(default)]
    pub gpus: u32,
    #[serde(default)]
    pub memory_mb: u64,
}

impl MethodResources {
    pub fn new(cpus: u32, gpus: u32, memory_mb: u64) -> Self {
        Self {
            cpus,
            gpus,
            memory_mb,
        }
    }

    pub fn cpus(cpus: u32) -> Self {
        Self::new(cpus, 0, 0)
    }
}

impl ResourceDescription for MethodResources {
    fn can_host(&self, requirements: &Self) -> bool {
        self.cpus >= requirements.cpus
            && self.gpus >= requirements.gpus
            && self.memory_mb >= requirements.memory_mb
    }

    fn increase(&mut self, increment: &Self) {
        self.cpus = self.cpus.saturating_add(increment.cpus);
        self.gpus = self.gpus.saturating_add(increment.gpus);
        self.memory_mb = self.memory_mb.saturating_add(increment.memory_mb);
    }

    fn reduce(&mut self, reduction: &Self) {
        self.cpus = self.cpus.saturating_sub(reduction.cpus);
        self.gpus = self.gpus.saturating_sub(reduction.gpus);
        self.memory_mb = self.memory_mb.saturating_sub(reduction.memory_mb);
    }

    fn is_empty(&self) -> bool {
        self.cpus == 0 && self.gpus == 0 && self.memory_mb == 0
    }
}

impl fmt::Display for MethodResources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cpus={} gpus={} memory={}MB",
            self.cpus, self.gpus, self.memory_mb
        )
    }
}
