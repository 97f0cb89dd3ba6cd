#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use flowsched::config::{
    ConfigFile, CoreConfig, ImplementationConfig, RawConfigFile, SchedulerSection, TaskConfig,
};
use flowsched::core_elements::{CoreRegistry, ImplementationSpec};
use flowsched::data::DataKey;
use flowsched::errors::Result;
use flowsched::resources::MethodResources;
use flowsched::scheduler::TaskRequest;
use flowsched::types::{OnFailure, TaskId};

/// Shorthand for a CPU-only resource vector.
pub fn cpus(n: u32) -> MethodResources {
    MethodResources::cpus(n)
}

/// Builder for an in-memory core registry.
///
/// Implementation commands default to `true`.
#[derive(Default)]
pub struct RegistryBuilder {
    cores: Vec<(String, Vec<ImplementationSpec<MethodResources>>)>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Core with a single implementation called `default`.
    pub fn core(self, name: &str, requirements: MethodResources) -> Self {
        self.core_with(name, &[("default", requirements)])
    }

    pub fn core_with(mut self, name: &str, implementations: &[(&str, MethodResources)]) -> Self {
        let specs = implementations
            .iter()
            .map(|(impl_name, requirements)| ImplementationSpec {
                name: impl_name.to_string(),
                command: "true".to_string(),
                requirements: requirements.clone(),
            })
            .collect();
        self.cores.push((name.to_string(), specs));
        self
    }

    pub fn build(self) -> Arc<CoreRegistry<MethodResources>> {
        let registry = CoreRegistry::new();
        for (name, specs) in self.cores {
            registry.register_core(&name, specs);
        }
        Arc::new(registry)
    }
}

/// Builder for `TaskRequest`.
pub struct TaskRequestBuilder {
    request: TaskRequest,
}

impl TaskRequestBuilder {
    pub fn new(task_id: TaskId, core_id: usize) -> Self {
        Self {
            request: TaskRequest::new(task_id, format!("t{task_id}"), core_id),
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.request.name = name.to_string();
        self
    }

    pub fn after(mut self, task: TaskId) -> Self {
        self.request.after.push(task);
        self
    }

    /// Depend on `task` and share its worker.
    pub fn colocate_with(mut self, task: TaskId) -> Self {
        if !self.request.after.contains(&task) {
            self.request.after.push(task);
        }
        self.request.colocate_with.push(task);
        self
    }

    pub fn worker(mut self, worker: &str) -> Self {
        self.request.worker = Some(worker.to_string());
        self
    }

    pub fn priority(mut self, val: bool) -> Self {
        self.request.priority = val;
        self
    }

    pub fn group_priority(mut self, group: i64) -> Self {
        self.request.group_priority = group;
        self
    }

    pub fn on_failure(mut self, on_failure: OnFailure) -> Self {
        self.request.on_failure = on_failure;
        self
    }

    pub fn input(mut self, name: &str, version: u32) -> Self {
        self.request.inputs.push(DataKey::new(name, version));
        self
    }

    pub fn output(mut self, name: &str, version: u32) -> Self {
        self.request.outputs.push(DataKey::new(name, version));
        self
    }

    pub fn build(self) -> TaskRequest {
        self.request
    }
}

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                scheduler: SchedulerSection::default(),
                worker: BTreeMap::new(),
                core: BTreeMap::new(),
                task: BTreeMap::new(),
            },
        }
    }

    pub fn with_worker(mut self, name: &str, capacity: MethodResources) -> Self {
        self.config.worker.insert(name.to_string(), capacity);
        self
    }

    /// Core with one implementation per `(name, cmd, requirements)`.
    pub fn with_core(mut self, name: &str, implementations: &[(&str, &str, MethodResources)]) -> Self {
        let implementations = implementations
            .iter()
            .map(|(impl_name, cmd, resources)| ImplementationConfig {
                name: impl_name.to_string(),
                cmd: cmd.to_string(),
                resources: resources.clone(),
            })
            .collect();
        self.config
            .core
            .insert(name.to_string(), CoreConfig { implementations });
        self
    }

    pub fn with_task(mut self, name: &str, task: TaskConfig) -> Self {
        self.config.task.insert(name.to_string(), task);
        self
    }

    pub fn with_scheduler(mut self, f: impl FnOnce(&mut SchedulerSection)) -> Self {
        f(&mut self.config.scheduler);
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn try_build(self) -> Result<ConfigFile> {
        ConfigFile::try_from(self.config)
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskConfig`.
pub struct TaskConfigBuilder {
    task: TaskConfig,
}

impl TaskConfigBuilder {
    pub fn new(core: &str) -> Self {
        Self {
            task: TaskConfig {
                core: core.to_string(),
                after: vec![],
                inputs: vec![],
                outputs: vec![],
                priority: false,
                group_priority: 0,
                on_failure: OnFailure::default(),
                worker: None,
                colocate_with: vec![],
            },
        }
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.task.after.push(dep.to_string());
        self
    }

    pub fn input(mut self, data: &str) -> Self {
        self.task.inputs.push(data.to_string());
        self
    }

    pub fn output(mut self, data: &str) -> Self {
        self.task.outputs.push(data.to_string());
        self
    }

    pub fn worker(mut self, worker: &str) -> Self {
        self.task.worker = Some(worker.to_string());
        self
    }

    pub fn colocate_with(mut self, other: &str) -> Self {
        self.task.colocate_with.push(other.to_string());
        self
    }

    pub fn on_failure(mut self, on_failure: OnFailure) -> Self {
        self.task.on_failure = on_failure;
        self
    }

    pub fn priority(mut self, val: bool) -> Self {
        self.task.priority = val;
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}
