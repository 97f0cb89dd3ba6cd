// src/lib.rs

pub mod cli;
pub mod config;
pub mod core_elements;
pub mod data;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod resources;
pub mod scheduler;
pub mod types;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::{ConfigFile, load_and_validate, resolve_relative};
use crate::core_elements::CoreManager;
use crate::data::{DataRegistry, InMemoryDataRegistry};
use crate::engine::{CoreRuntime, Runtime, RuntimeEvent, RuntimeOptions};
use crate::exec::LocalBackend;
use crate::resources::{MethodResources, ResourceUpdate};
use crate::scheduler::{DefaultScorer, ProfileStore, TaskScheduler};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - core registry, profile store and scheduler
/// - the local worker backend
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)?;

    if args.dry_run {
        print_dry_run(&cfg)?;
        return Ok(());
    }

    let profile_in = args
        .profile_in
        .clone()
        .or_else(|| cfg.scheduler.profile_input.clone())
        .map(|p| resolve_relative(&config_path, &p));
    let profile_out = args
        .profile_out
        .clone()
        .or_else(|| cfg.scheduler.profile_output.clone())
        .map(|p| resolve_relative(&config_path, &p));

    let store = match &profile_in {
        Some(path) => ProfileStore::load(path)?,
        None => ProfileStore::default(),
    };

    let registry = Arc::new(cfg.build_registry());
    let requests = cfg.task_requests(&registry)?;
    let scheduler = TaskScheduler::new(
        registry,
        Arc::new(DefaultScorer),
        cfg.scheduler.retry_policy(),
        store,
    );

    // Runtime event channel.
    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent<MethodResources>>(256);

    let data: Arc<dyn DataRegistry> = Arc::new(InMemoryDataRegistry::new());
    let root_dir = config::config_root_dir(&config_path);
    let backend = Arc::new(LocalBackend::new(root_dir, Arc::clone(&data)));

    // Ctrl-C → graceful shutdown.
    {
        let tx = rt_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            let _ = tx.send(RuntimeEvent::ShutdownRequested).await;
        });
    }

    // Seed workers, then tasks in dependency order. Sending from a separate
    // task keeps the runtime draining the channel while we feed it.
    {
        let tx = rt_tx.clone();
        let workers: Vec<(String, MethodResources)> = cfg
            .worker
            .iter()
            .map(|(name, capacity)| (name.clone(), capacity.clone()))
            .collect();
        info!(workers = workers.len(), tasks = requests.len(), "seeding runtime");
        tokio::spawn(async move {
            for (worker, capacity) in workers {
                let event = RuntimeEvent::WorkerUpdate {
                    worker,
                    update: ResourceUpdate::increase(capacity),
                };
                if tx.send(event).await.is_err() {
                    return;
                }
            }
            for request in requests {
                if tx.send(RuntimeEvent::NewTask(request)).await.is_err() {
                    return;
                }
            }
            let _ = tx.send(RuntimeEvent::SubmissionsClosed).await;
        });
    }

    let options = RuntimeOptions {
        exit_when_idle: true,
    };

    // Construct the pure core runtime (single source of truth for semantics).
    let core = CoreRuntime::new(scheduler, options);

    // Construct the async IO shell around the core.
    let runtime = Runtime::new(core, rt_rx, rt_tx, backend, data)
        .with_worker_policy(
            cfg.scheduler.worker_retry_policy(),
            cfg.scheduler.worker_start_timeout(),
            cfg.scheduler.worker_stop_timeout(),
        )
        .with_profile_output(profile_out);
    runtime.run().await?;
    Ok(())
}

/// Simple dry-run output: print workers, cores and tasks.
fn print_dry_run(cfg: &ConfigFile) -> Result<()> {
    println!("flowsched dry-run");
    println!(
        "  scheduler: transfer_chances = {}, submission_chances = {}, scheduling_chances = {}",
        cfg.scheduler.transfer_chances,
        cfg.scheduler.submission_chances,
        cfg.scheduler.scheduling_chances
    );
    println!();

    println!("workers ({}):", cfg.worker.len());
    for (name, capacity) in &cfg.worker {
        println!("  - {name}: {capacity}");
    }
    println!();

    let registry = cfg.build_registry();
    println!("cores ({}):", registry.core_count());
    for core in 0..registry.core_count() {
        println!("  - {}", registry.core_name(core).unwrap_or_default());
        for implementation in registry.implementations(core) {
            println!(
                "      {} [{}]: {}",
                implementation.signature, implementation.requirements, implementation.command
            );
        }
    }
    println!();

    let requests = cfg.task_requests(&registry)?;
    println!("tasks ({}, in submission order):", requests.len());
    for request in &requests {
        println!("  - {} (id {})", request.name, request.task_id);
        if !request.after.is_empty() {
            println!("      after: {:?}", request.after);
        }
        if !request.inputs.is_empty() {
            let inputs: Vec<String> = request.inputs.iter().map(ToString::to_string).collect();
            println!("      inputs: {}", inputs.join(", "));
        }
        if !request.outputs.is_empty() {
            let outputs: Vec<String> = request.outputs.iter().map(ToString::to_string).collect();
            println!("      outputs: {}", outputs.join(", "));
        }
        if let Some(worker) = &request.worker {
            println!("      worker: {worker}");
        }
        println!("      on_failure: {}", request.on_failure);
    }

    debug!("dry-run complete (no execution)");
    Ok(())
}
