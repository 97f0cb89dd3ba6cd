// tests/core_runtime.rs

use std::error::Error;
use std::sync::Arc;

use flowsched::engine::{CoreCommand, CoreRuntime, CoreStep, RuntimeEvent, RuntimeOptions};
use flowsched::resources::{MethodResources, ResourceUpdate};
use flowsched::scheduler::{
    DefaultScorer, JobSpec, ProfileStore, RetryPolicy, SchedulerCommand, TaskOutcome, TaskScheduler,
};
use flowsched::types::ActionId;
use flowsched_test_utils::builders::{RegistryBuilder, TaskRequestBuilder, cpus};
use flowsched_test_utils::init_tracing;

type TestResult = Result<(), Box<dyn Error>>;
type Step = CoreStep<MethodResources>;

fn core(exit_when_idle: bool) -> CoreRuntime<MethodResources> {
    let registry = RegistryBuilder::new().core("compute", cpus(1)).build();
    let scheduler = TaskScheduler::new(
        registry,
        Arc::new(DefaultScorer),
        RetryPolicy::default(),
        ProfileStore::default(),
    );
    CoreRuntime::new(scheduler, RuntimeOptions { exit_when_idle })
}

fn start_action(step: &Step) -> Option<ActionId> {
    step.commands.iter().find_map(|c| match c {
        CoreCommand::Scheduler(SchedulerCommand::StartWorker { action, .. }) => Some(*action),
        _ => None,
    })
}

fn transfer_action(step: &Step) -> Option<ActionId> {
    step.commands.iter().find_map(|c| match c {
        CoreCommand::Scheduler(SchedulerCommand::TransferInputs { action, .. }) => Some(*action),
        _ => None,
    })
}

fn submitted_job(step: &Step) -> Option<JobSpec> {
    step.commands.iter().find_map(|c| match c {
        CoreCommand::Scheduler(SchedulerCommand::SubmitJob(spec)) => Some(spec.clone()),
        _ => None,
    })
}

fn finished_outcomes(step: &Step) -> Vec<TaskOutcome> {
    step.commands
        .iter()
        .filter_map(|c| match c {
            CoreCommand::Scheduler(SchedulerCommand::TaskFinished(report)) => {
                Some(report.outcome.clone())
            }
            _ => None,
        })
        .collect()
}

fn is_exit(step: &Step) -> bool {
    let persists = step
        .commands
        .iter()
        .any(|c| matches!(c, CoreCommand::PersistProfiles(_)));
    let last_is_exit = matches!(step.commands.last(), Some(CoreCommand::RequestExit));
    !step.keep_running && persists && last_is_exit
}

/// Register a started worker and a single task, returning the job that was
/// submitted for it.
fn run_one_task(core: &mut CoreRuntime<MethodResources>) -> Result<JobSpec, Box<dyn Error>> {
    let step = core.step(RuntimeEvent::WorkerUpdate {
        worker: "w1".to_string(),
        update: ResourceUpdate::increase(cpus(1)),
    })?;
    let start = start_action(&step).ok_or("worker start not requested")?;
    core.step(RuntimeEvent::WorkerStarted { action: start })?;

    let step = core.step(RuntimeEvent::NewTask(TaskRequestBuilder::new(1, 0).build()))?;
    let action = transfer_action(&step).ok_or("task not launched")?;
    let step = core.step(RuntimeEvent::TransfersCompleted {
        action,
        worker: "w1".to_string(),
    })?;
    let job = submitted_job(&step).ok_or("job not submitted")?;
    core.step(RuntimeEvent::JobStarted {
        action: job.action,
        job: job.job,
    })?;
    Ok(job)
}

#[test]
fn idle_exit_waits_for_submissions_to_close() -> TestResult {
    init_tracing();
    let mut core = core(true);
    let job = run_one_task(&mut core)?;

    let step = core.step(RuntimeEvent::JobCompleted {
        action: job.action,
        job: job.job,
        elapsed_ms: 8,
    })?;
    assert_eq!(finished_outcomes(&step), vec![TaskOutcome::Completed]);
    assert!(step.keep_running);

    let step = core.step(RuntimeEvent::SubmissionsClosed)?;
    assert!(is_exit(&step));
    assert!(core.is_stopped());
    Ok(())
}

#[test]
fn idle_exit_follows_the_last_completion() -> TestResult {
    init_tracing();
    let mut core = core(true);
    let job = run_one_task(&mut core)?;

    let step = core.step(RuntimeEvent::SubmissionsClosed)?;
    assert!(step.keep_running);

    let step = core.step(RuntimeEvent::JobCompleted {
        action: job.action,
        job: job.job,
        elapsed_ms: 8,
    })?;
    assert_eq!(finished_outcomes(&step), vec![TaskOutcome::Completed]);
    assert!(is_exit(&step));

    let persisted = step.commands.iter().find_map(|c| match c {
        CoreCommand::PersistProfiles(store) => Some(store.clone()),
        _ => None,
    });
    let store = persisted.ok_or("no profile snapshot")?;
    let record = store
        .implementations
        .get("compute.default")
        .ok_or("no global profile")?;
    assert_eq!(record.exec_count, 1);
    assert_eq!(record.avg_time, 8);
    Ok(())
}

#[test]
fn without_idle_exit_the_core_keeps_running() -> TestResult {
    init_tracing();
    let mut core = core(false);
    let job = run_one_task(&mut core)?;

    core.step(RuntimeEvent::SubmissionsClosed)?;
    let step = core.step(RuntimeEvent::JobCompleted {
        action: job.action,
        job: job.job,
        elapsed_ms: 8,
    })?;
    assert!(step.keep_running);
    assert!(core.scheduler().all_tasks_finished());
    Ok(())
}

#[test]
fn shutdown_stops_with_work_in_flight() -> TestResult {
    init_tracing();
    let mut core = core(true);
    run_one_task(&mut core)?;

    let step = core.step(RuntimeEvent::ShutdownRequested)?;
    assert!(is_exit(&step));
    assert!(finished_outcomes(&step).is_empty());

    let after = core.step(RuntimeEvent::NewTask(TaskRequestBuilder::new(2, 0).build()))?;
    assert!(after.commands.is_empty());
    assert!(!after.keep_running);
    Ok(())
}

#[test]
fn invalid_task_stops_the_step_with_an_error() {
    init_tracing();
    let mut core = core(true);
    let result = core.step(RuntimeEvent::NewTask(TaskRequestBuilder::new(1, 7).build()));
    assert!(result.is_err());
}
