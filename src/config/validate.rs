// src/config/validate.rs

use std::collections::BTreeSet;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{FlowschedError, Result};
use crate::resources::ResourceDescription;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = FlowschedError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let order = validate_raw_config(&raw)?;
        let config = ConfigFile::new_unchecked(raw, order);
        validate_data_flow(&config)?;
        Ok(config)
    }
}

/// Run every structural check and return the tasks in dependency order.
fn validate_raw_config(cfg: &RawConfigFile) -> Result<Vec<String>> {
    ensure_has_tasks(cfg)?;
    validate_scheduler_section(cfg)?;
    validate_cores(cfg)?;
    validate_task_references(cfg)?;
    validate_placement(cfg)?;
    validate_dag(cfg)
}

fn config_error(msg: impl Into<String>) -> FlowschedError {
    FlowschedError::ConfigError(msg.into())
}

fn ensure_has_tasks(cfg: &RawConfigFile) -> Result<()> {
    if cfg.task.is_empty() {
        return Err(config_error(
            "config must contain at least one [task.<name>] section",
        ));
    }
    Ok(())
}

fn validate_scheduler_section(cfg: &RawConfigFile) -> Result<()> {
    let s = &cfg.scheduler;
    for (name, value) in [
        ("transfer_chances", s.transfer_chances),
        ("submission_chances", s.submission_chances),
        ("scheduling_chances", s.scheduling_chances),
    ] {
        if value == 0 {
            return Err(config_error(format!(
                "[scheduler].{name} must be >= 1 (got 0)"
            )));
        }
    }
    if s.worker_base_backoff_ms > s.worker_max_backoff_ms {
        return Err(config_error(
            "[scheduler].worker_base_backoff_ms must not exceed worker_max_backoff_ms",
        ));
    }
    Ok(())
}

fn validate_cores(cfg: &RawConfigFile) -> Result<()> {
    for (name, core) in &cfg.core {
        if core.implementations.is_empty() {
            return Err(config_error(format!(
                "core '{name}' declares no implementations"
            )));
        }
        let mut seen = BTreeSet::new();
        for implementation in &core.implementations {
            if !seen.insert(implementation.name.as_str()) {
                return Err(config_error(format!(
                    "core '{name}' declares implementation '{}' twice",
                    implementation.name
                )));
            }
        }
    }
    Ok(())
}

fn validate_task_references(cfg: &RawConfigFile) -> Result<()> {
    for (name, task) in &cfg.task {
        if !cfg.core.contains_key(&task.core) {
            return Err(config_error(format!(
                "task '{name}' uses unknown core '{}'",
                task.core
            )));
        }
        for dep in &task.after {
            if !cfg.task.contains_key(dep) {
                return Err(config_error(format!(
                    "task '{name}' has unknown dependency '{dep}' in `after`"
                )));
            }
            if dep == name {
                return Err(config_error(format!(
                    "task '{name}' cannot depend on itself in `after`"
                )));
            }
        }
        for other in &task.colocate_with {
            if !task.after.contains(other) {
                return Err(config_error(format!(
                    "task '{name}' lists '{other}' in `colocate_with` but not in `after`"
                )));
            }
        }
        if let Some(worker) = &task.worker {
            if !cfg.worker.contains_key(worker) {
                return Err(config_error(format!(
                    "task '{name}' is forced onto undeclared worker '{worker}'"
                )));
            }
        }
    }
    Ok(())
}

/// Every task must fit on at least one declared worker, otherwise it would
/// stay blocked forever.
fn validate_placement(cfg: &RawConfigFile) -> Result<()> {
    for (name, task) in &cfg.task {
        let Some(core) = cfg.core.get(&task.core) else {
            continue;
        };
        let mut workers = cfg
            .worker
            .iter()
            .filter(|(worker, _)| task.worker.as_ref().is_none_or(|forced| forced == *worker));
        let placeable = workers.any(|(_, capacity)| {
            core.implementations
                .iter()
                .any(|i| capacity.can_host(&i.resources))
        });
        if !placeable {
            return Err(config_error(format!(
                "no declared worker can run task '{name}' (core '{}')",
                task.core
            )));
        }
    }
    Ok(())
}

fn validate_dag(cfg: &RawConfigFile) -> Result<Vec<String>> {
    // Edge direction: dep -> task
    // For:
    //   [task.B]
    //   after = ["A"]
    // we add edge A -> B.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in cfg.task.keys() {
        graph.add_node(name.as_str());
    }

    for (name, task) in &cfg.task {
        for dep in &task.after {
            graph.add_edge(dep.as_str(), name.as_str(), ());
        }
    }

    match toposort(&graph, None) {
        Ok(order) => Ok(order.into_iter().map(str::to_string).collect()),
        Err(cycle) => Err(FlowschedError::DagCycle(format!(
            "cycle detected in task DAG involving task '{}'",
            cycle.node_id()
        ))),
    }
}

/// A task reading data another task writes must be ordered with it.
fn validate_data_flow(cfg: &ConfigFile) -> Result<()> {
    for (reader, task) in &cfg.task {
        for data in &task.inputs {
            for (writer, other) in &cfg.task {
                if writer == reader || !other.outputs.contains(data) {
                    continue;
                }
                if !cfg.depends_on(reader, writer) && !cfg.depends_on(writer, reader) {
                    return Err(config_error(format!(
                        "task '{reader}' reads '{data}' written by unordered task '{writer}'; \
                         add an `after` dependency"
                    )));
                }
            }
        }
    }
    Ok(())
}
