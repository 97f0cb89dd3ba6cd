// src/config/model.rs

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::core_elements::{CoreRegistry, ImplementationSpec};
use crate::data::DataKey;
use crate::errors::{FlowschedError, Result};
use crate::exec::WorkerRetryPolicy;
use crate::resources::MethodResources;
use crate::scheduler::execution::{
    DEFAULT_SCHEDULING_CHANCES, DEFAULT_SUBMISSION_CHANCES, DEFAULT_TRANSFER_CHANCES,
};
use crate::scheduler::{RetryPolicy, TaskRequest};
use crate::types::{OnFailure, TaskId};

/// Configuration exactly as read from a TOML file, before validation.
///
/// ```toml
/// [scheduler]
/// scheduling_chances = 2
///
/// [worker.w1]
/// cpus = 4
/// memory_mb = 8192
///
/// [core.compute]
/// [[core.compute.implementations]]
/// name = "default"
/// cmd = "./compute.sh"
/// cpus = 1
///
/// [task.a]
/// core = "compute"
/// outputs = ["out.dat"]
///
/// [task.b]
/// core = "compute"
/// after = ["a"]
/// inputs = ["out.dat"]
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub scheduler: SchedulerSection,

    /// Workers from `[worker.<name>]`, keyed by name.
    #[serde(default)]
    pub worker: BTreeMap<String, MethodResources>,

    /// Core elements from `[core.<name>]`.
    #[serde(default)]
    pub core: BTreeMap<String, CoreConfig>,

    /// Tasks from `[task.<name>]`.
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,
}

/// `[scheduler]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SchedulerSection {
    pub transfer_chances: u32,
    pub submission_chances: u32,
    /// Failed launches tolerated before a task fails for good.
    pub scheduling_chances: u32,
    pub worker_start_timeout_ms: u64,
    pub worker_stop_timeout_ms: u64,
    pub worker_max_retries: u32,
    pub worker_base_backoff_ms: u64,
    pub worker_max_backoff_ms: u64,
    /// Profile snapshot loaded at startup.
    pub profile_input: Option<PathBuf>,
    /// Profile snapshot written on shutdown.
    pub profile_output: Option<PathBuf>,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        let worker = WorkerRetryPolicy::default();
        Self {
            transfer_chances: DEFAULT_TRANSFER_CHANCES,
            submission_chances: DEFAULT_SUBMISSION_CHANCES,
            scheduling_chances: DEFAULT_SCHEDULING_CHANCES,
            worker_start_timeout_ms: 30_000,
            worker_stop_timeout_ms: 30_000,
            worker_max_retries: worker.max_retries,
            worker_base_backoff_ms: worker.base_backoff_ms,
            worker_max_backoff_ms: worker.max_backoff_ms,
            profile_input: None,
            profile_output: None,
        }
    }
}

impl SchedulerSection {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            transfer_chances: self.transfer_chances,
            submission_chances: self.submission_chances,
            scheduling_chances: self.scheduling_chances,
        }
    }

    pub fn worker_retry_policy(&self) -> WorkerRetryPolicy {
        WorkerRetryPolicy {
            max_retries: self.worker_max_retries,
            base_backoff_ms: self.worker_base_backoff_ms,
            max_backoff_ms: self.worker_max_backoff_ms,
        }
    }

    pub fn worker_start_timeout(&self) -> Duration {
        Duration::from_millis(self.worker_start_timeout_ms)
    }

    pub fn worker_stop_timeout(&self) -> Duration {
        Duration::from_millis(self.worker_stop_timeout_ms)
    }
}

/// `[core.<name>]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CoreConfig {
    #[serde(default)]
    pub implementations: Vec<ImplementationConfig>,
}

/// One `[[core.<name>.implementations]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct ImplementationConfig {
    pub name: String,

    /// Shell command run for each task of this core.
    pub cmd: String,

    /// Requirements: `cpus`, `gpus`, `memory_mb`.
    #[serde(flatten)]
    pub resources: MethodResources,
}

/// `[task.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskConfig {
    /// Core element this task runs.
    pub core: String,

    /// Tasks that must finish first.
    #[serde(default)]
    pub after: Vec<String>,

    /// Data names read by the task.
    #[serde(default)]
    pub inputs: Vec<String>,

    /// Data names written by the task.
    #[serde(default)]
    pub outputs: Vec<String>,

    #[serde(default)]
    pub priority: bool,

    /// Lower groups are scheduled first.
    #[serde(default)]
    pub group_priority: i64,

    #[serde(default)]
    pub on_failure: OnFailure,

    /// Force the task onto this worker.
    #[serde(default)]
    pub worker: Option<String>,

    /// Tasks (also listed in `after`) whose worker this task must share.
    #[serde(default)]
    pub colocate_with: Vec<String>,
}

/// Validated configuration.
///
/// Only built through `TryFrom<RawConfigFile>`, which checks references,
/// budgets and the absence of cycles.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub scheduler: SchedulerSection,
    pub worker: BTreeMap<String, MethodResources>,
    pub core: BTreeMap<String, CoreConfig>,
    pub task: BTreeMap<String, TaskConfig>,
    /// Task names in dependency order.
    order: Vec<String>,
    /// Transitive `after` closure of every task.
    ancestors: BTreeMap<String, BTreeSet<String>>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile, order: Vec<String>) -> Self {
        let ancestors = ancestor_sets(&raw.task, &order);
        Self {
            scheduler: raw.scheduler,
            worker: raw.worker,
            core: raw.core,
            task: raw.task,
            order,
            ancestors,
        }
    }

    /// Task names in an order where every task follows its dependencies.
    pub fn task_order(&self) -> &[String] {
        &self.order
    }

    /// Whether `ancestor` must finish before `task` can start.
    pub fn depends_on(&self, task: &str, ancestor: &str) -> bool {
        self.ancestors
            .get(task)
            .is_some_and(|set| set.contains(ancestor))
    }

    /// Register every declared core with its implementations.
    pub fn build_registry(&self) -> CoreRegistry<MethodResources> {
        let registry = CoreRegistry::new();
        for (name, core) in &self.core {
            let specs = core
                .implementations
                .iter()
                .map(|i| ImplementationSpec {
                    name: i.name.clone(),
                    command: i.cmd.clone(),
                    requirements: i.resources.clone(),
                })
                .collect();
            registry.register_core(name, specs);
        }
        registry
    }

    /// Build the task requests in dependency order.
    ///
    /// Task ids follow that order starting at 1. Every task writing a data
    /// name produces the next version of it; readers get the version of
    /// their latest writing ancestor, or version 0 (pre-existing data).
    pub fn task_requests(&self, registry: &CoreRegistry<MethodResources>) -> Result<Vec<TaskRequest>> {
        let ids: BTreeMap<&str, TaskId> = self
            .order
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.as_str(), idx as TaskId + 1))
            .collect();

        let mut next_version: BTreeMap<&str, u32> = BTreeMap::new();
        let mut written: BTreeMap<(&str, &str), u32> = BTreeMap::new();
        let mut requests = Vec::with_capacity(self.order.len());

        for name in &self.order {
            let (Some(task), Some(&task_id)) = (self.task.get(name), ids.get(name.as_str())) else {
                continue;
            };
            let core_id = registry.core_id(&task.core).ok_or_else(|| {
                FlowschedError::ConfigError(format!("task '{name}' uses unknown core '{}'", task.core))
            })?;

            let inputs = task
                .inputs
                .iter()
                .map(|data| {
                    let version = self.order
                        .iter()
                        .filter(|writer| self.depends_on(name, writer))
                        .filter_map(|writer| written.get(&(writer.as_str(), data.as_str())))
                        .max()
                        .copied()
                        .unwrap_or(0);
                    DataKey::new(data.clone(), version)
                })
                .collect();

            let mut outputs = Vec::with_capacity(task.outputs.len());
            for data in &task.outputs {
                let version = next_version.entry(data.as_str()).or_insert(0);
                *version += 1;
                written.insert((name.as_str(), data.as_str()), *version);
                outputs.push(DataKey::new(data.clone(), *version));
            }

            let lookup = |dep: &String| ids.get(dep.as_str()).copied();
            let mut request = TaskRequest::new(task_id, name.clone(), core_id);
            request.priority = task.priority;
            request.group_priority = task.group_priority;
            request.on_failure = task.on_failure;
            request.after = task.after.iter().filter_map(lookup).collect();
            request.colocate_with = task.colocate_with.iter().filter_map(lookup).collect();
            request.worker = task.worker.clone();
            request.inputs = inputs;
            request.outputs = outputs;
            requests.push(request);
        }

        Ok(requests)
    }
}

fn ancestor_sets(
    tasks: &BTreeMap<String, TaskConfig>,
    order: &[String],
) -> BTreeMap<String, BTreeSet<String>> {
    let mut ancestors: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for name in order {
        let mut set = BTreeSet::new();
        if let Some(task) = tasks.get(name) {
            for dep in &task.after {
                set.insert(dep.clone());
                if let Some(inherited) = ancestors.get(dep) {
                    set.extend(inherited.iter().cloned());
                }
            }
        }
        ancestors.insert(name.clone(), set);
    }
    ancestors
}
