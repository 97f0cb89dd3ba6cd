// tests/engine_lifecycle.rs

use std::error::Error;

use flowsched::scheduler::{ActionLocation, ActionState, RetryPolicy, TaskOutcome};
use flowsched::types::OnFailure;
use flowsched_test_utils::builders::{RegistryBuilder, TaskRequestBuilder, cpus};
use flowsched_test_utils::init_tracing;
use flowsched_test_utils::sim::SimCluster;

type TestResult = Result<(), Box<dyn Error>>;

fn cluster(workers: &[&str]) -> Result<SimCluster, Box<dyn Error>> {
    let mut sim = SimCluster::new(RegistryBuilder::new().core("compute", cpus(1)).build());
    for worker in workers {
        sim.add_worker(worker, cpus(1))?;
    }
    Ok(sim)
}

#[test]
fn completed_task_is_reported_and_frees_its_worker() -> TestResult {
    init_tracing();
    let mut sim = cluster(&["w1"])?;
    sim.submit(TaskRequestBuilder::new(1, 0).output("out", 1).build())?;
    sim.submit(TaskRequestBuilder::new(2, 0).build())?;
    assert_eq!(sim.running_tasks(), vec![1]);

    sim.complete(1)?;
    assert_eq!(sim.outcome(1), Some(&TaskOutcome::Completed));
    assert_eq!(sim.running_tasks(), vec![2]);
    assert_eq!(sim.registered_outputs().len(), 1);
    assert_eq!(sim.registered_outputs()[0].0.name, "out");
    assert_eq!(sim.registered_outputs()[0].1, "w1");

    let rs = sim.scheduler().worker("w1").ok_or("w1 missing")?;
    assert_eq!(rs.profile(0, 0).executions(), 1);
    assert_eq!(rs.profile(0, 0).average_time(), 10);
    Ok(())
}

#[test]
fn successor_waits_for_its_predecessor() -> TestResult {
    init_tracing();
    let mut sim = cluster(&["w1", "w2"])?;
    sim.submit(TaskRequestBuilder::new(1, 0).build())?;
    let second = sim.submit(TaskRequestBuilder::new(2, 0).after(1).build())?;

    assert_eq!(sim.running_tasks(), vec![1]);
    assert_eq!(sim.scheduler().ready_counts(), vec![0]);
    assert!(sim.scheduler().action(second).is_some_and(|a| a.has_data_predecessors()));

    sim.complete(1)?;
    assert_eq!(sim.running_tasks(), vec![2]);
    sim.complete(2)?;
    assert!(sim.scheduler().all_tasks_finished());
    Ok(())
}

#[test]
fn ready_counts_track_queued_tasks() -> TestResult {
    init_tracing();
    let mut sim = cluster(&["w1"])?;
    sim.submit(TaskRequestBuilder::new(1, 0).build())?;
    sim.submit(TaskRequestBuilder::new(2, 0).build())?;
    sim.submit(TaskRequestBuilder::new(3, 0).after(1).build())?;
    assert_eq!(sim.scheduler().ready_counts(), vec![1], "only task 2 is ready");

    sim.complete(1)?;
    assert_eq!(sim.running_tasks().len(), 1);
    assert_eq!(sim.scheduler().ready_counts(), vec![1], "one of tasks 2 and 3 still queued");

    sim.run_to_completion()?;
    assert_eq!(sim.scheduler().ready_counts(), vec![0]);
    assert!(sim.scheduler().all_tasks_finished());
    Ok(())
}

#[test]
fn failing_task_uses_every_budget_on_a_single_worker() -> TestResult {
    init_tracing();
    let mut sim = cluster(&["w1"])?;
    sim.submit(TaskRequestBuilder::new(1, 0).build())?;

    for _ in 0..4 {
        sim.fail(1)?;
    }

    let flags: Vec<bool> = sim.submissions().iter().map(|s| s.resubmission).collect();
    assert_eq!(flags, vec![false, true, false, true]);
    assert!(sim.submissions().iter().all(|s| s.worker == "w1"));

    let Some(TaskOutcome::Failed { cause }) = sim.outcome(1) else {
        return Err("task 1 should have failed".into());
    };
    assert!(cause.starts_with("2 attempt(s) exhausted"), "cause: {cause}");
    assert!(sim.running_tasks().is_empty());

    let action = sim.scheduler().action(sim.action_of(1)).ok_or("action missing")?;
    assert_eq!(action.execution_errors(), 4);
    assert_eq!(action.failed_attempts(), 2);
    Ok(())
}

#[test]
fn second_attempt_moves_to_another_worker() -> TestResult {
    init_tracing();
    let mut sim = cluster(&["w1", "w2"])?;
    sim.submit(TaskRequestBuilder::new(1, 0).build())?;
    sim.fail(1)?;
    sim.fail(1)?;

    assert_eq!(sim.running_job(1).map(|j| j.worker.as_str()), Some("w2"));
    sim.complete(1)?;
    assert_eq!(sim.outcome(1), Some(&TaskOutcome::Completed));

    let action = sim.scheduler().action(sim.action_of(1)).ok_or("action missing")?;
    assert_eq!(action.executing_resources(), ["w1".to_string(), "w2".to_string()]);
    Ok(())
}

#[test]
fn custom_policy_without_resubmission_fails_fast() -> TestResult {
    init_tracing();
    let policy = RetryPolicy {
        transfer_chances: 1,
        submission_chances: 1,
        scheduling_chances: 1,
    };
    let mut sim = SimCluster::with_policy(RegistryBuilder::new().core("compute", cpus(1)).build(), policy);
    sim.add_worker("w1", cpus(1))?;
    sim.submit(TaskRequestBuilder::new(1, 0).build())?;
    sim.fail(1)?;

    assert_eq!(sim.submissions().len(), 1);
    assert!(matches!(sim.outcome(1), Some(TaskOutcome::Failed { .. })));
    Ok(())
}

#[test]
fn failure_chain_cancels_dependents() -> TestResult {
    init_tracing();
    let mut sim = cluster(&["w1"])?;
    sim.submit(TaskRequestBuilder::new(1, 0).build())?;
    sim.submit(TaskRequestBuilder::new(2, 0).after(1).build())?;
    sim.submit(TaskRequestBuilder::new(3, 0).after(2).build())?;

    for _ in 0..4 {
        sim.fail(1)?;
    }

    assert!(matches!(sim.outcome(1), Some(TaskOutcome::Failed { .. })));
    assert_eq!(sim.outcome(2), Some(&TaskOutcome::Cancelled));
    assert_eq!(sim.outcome(3), Some(&TaskOutcome::Cancelled));
    assert!(sim.scheduler().all_tasks_finished());
    Ok(())
}

#[test]
fn ignored_failure_releases_successors() -> TestResult {
    init_tracing();
    let mut sim = cluster(&["w1"])?;
    sim.submit(TaskRequestBuilder::new(1, 0).on_failure(OnFailure::Ignore).build())?;
    sim.submit(TaskRequestBuilder::new(2, 0).after(1).build())?;
    sim.fail(1)?;

    assert_eq!(sim.submissions().len(), 2, "no resubmission, then task 2");
    let Some(TaskOutcome::Failed { cause }) = sim.outcome(1) else {
        return Err("task 1 should have failed".into());
    };
    assert!(cause.ends_with("(failure ignored)"), "cause: {cause}");
    assert_eq!(sim.running_tasks(), vec![2]);

    sim.submit(TaskRequestBuilder::new(3, 0).after(1).build())?;
    sim.run_to_completion()?;
    assert_eq!(sim.outcome(3), Some(&TaskOutcome::Completed));
    Ok(())
}

#[test]
fn cancel_successors_fails_on_first_error() -> TestResult {
    init_tracing();
    let mut sim = cluster(&["w1", "w2"])?;
    sim.submit(
        TaskRequestBuilder::new(1, 0)
            .on_failure(OnFailure::CancelSuccessors)
            .build(),
    )?;
    sim.submit(TaskRequestBuilder::new(2, 0).after(1).build())?;
    sim.fail(1)?;

    assert_eq!(sim.submissions().len(), 1);
    assert!(matches!(sim.outcome(1), Some(TaskOutcome::Failed { .. })));
    assert_eq!(sim.outcome(2), Some(&TaskOutcome::Cancelled));

    let late = sim.submit(TaskRequestBuilder::new(3, 0).after(1).build())?;
    assert_eq!(sim.outcome(3), Some(&TaskOutcome::Cancelled));
    assert_eq!(
        sim.scheduler().location(late),
        Some(ActionLocation::Finished(ActionState::Cancelled))
    );
    Ok(())
}

#[test]
fn cancelling_a_running_task_cancels_its_successors() -> TestResult {
    init_tracing();
    let mut sim = cluster(&["w1"])?;
    sim.submit(TaskRequestBuilder::new(1, 0).build())?;
    sim.submit(TaskRequestBuilder::new(2, 0).after(1).build())?;
    sim.submit(TaskRequestBuilder::new(3, 0).build())?;

    sim.cancel(1)?;
    assert_eq!(sim.cancels().len(), 1);
    assert_eq!(sim.cancels()[0].2, "w1");
    assert!(sim.cancels()[0].1.is_some());

    assert_eq!(sim.outcome(1), Some(&TaskOutcome::Cancelled));
    assert_eq!(sim.outcome(2), Some(&TaskOutcome::Cancelled));
    assert_eq!(sim.running_tasks(), vec![3], "the freed slot goes to task 3");
    Ok(())
}

#[test]
fn cancelling_a_waiting_task_needs_no_backend_call() -> TestResult {
    init_tracing();
    let mut sim = cluster(&["w1"])?;
    sim.submit(TaskRequestBuilder::new(1, 0).build())?;
    let waiting = sim.submit(TaskRequestBuilder::new(2, 0).build())?;
    assert_eq!(
        sim.scheduler().location(waiting),
        Some(ActionLocation::Waiting("w1".to_string()))
    );

    sim.cancel(2)?;
    assert!(sim.cancels().is_empty());
    assert_eq!(sim.outcome(2), Some(&TaskOutcome::Cancelled));
    assert!(sim.scheduler().resource_blocked_actions("w1").is_empty());

    sim.cancel(2)?;
    assert_eq!(sim.reports().len(), 1, "cancelling twice reports once");
    Ok(())
}

#[test]
fn cancelling_during_input_transfer() -> TestResult {
    init_tracing();
    let mut sim = cluster(&["w1"])?;
    sim.hold_transfers(true);
    sim.submit(TaskRequestBuilder::new(1, 0).input("data", 0).build())?;
    assert_eq!(sim.held_transfer_tasks(), vec![1]);

    sim.cancel(1)?;
    assert_eq!(sim.cancels().len(), 1);
    assert_eq!(sim.cancels()[0].1, None, "no job was submitted yet");
    assert_eq!(sim.outcome(1), Some(&TaskOutcome::Cancelled));
    assert!(sim.submissions().is_empty());
    Ok(())
}

#[test]
fn transfer_failures_retry_then_reschedule() -> TestResult {
    init_tracing();
    let mut sim = cluster(&["w1"])?;
    sim.hold_transfers(true);
    sim.submit(TaskRequestBuilder::new(1, 0).input("data", 0).build())?;

    sim.fail_transfer(1)?;
    assert_eq!(sim.held_transfer_tasks(), vec![1], "retried on the same launch");
    sim.fail_transfer(1)?;
    assert_eq!(sim.held_transfer_tasks(), vec![1], "relaunched after the error");

    let action = sim.scheduler().action(sim.action_of(1)).ok_or("action missing")?;
    assert_eq!(action.transfer_errors(), 2);
    assert_eq!(action.failed_attempts(), 1);
    assert_eq!(action.attempt_transfer_errors(), 0);

    sim.release_transfer(1)?;
    assert_eq!(sim.submissions().len(), 1);
    sim.complete(1)?;
    assert_eq!(sim.outcome(1), Some(&TaskOutcome::Completed));
    Ok(())
}

#[test]
fn transfer_failures_exhaust_every_budget() -> TestResult {
    init_tracing();
    let mut sim = cluster(&["w1"])?;
    sim.hold_transfers(true);
    sim.submit(TaskRequestBuilder::new(1, 0).input("data", 0).build())?;
    for _ in 0..4 {
        sim.fail_transfer(1)?;
    }
    assert!(sim.held_transfer_tasks().is_empty());
    assert!(sim.submissions().is_empty());
    assert!(matches!(sim.outcome(1), Some(TaskOutcome::Failed { .. })));
    Ok(())
}

#[test]
fn priority_tasks_jump_the_queue() -> TestResult {
    init_tracing();
    let mut sim = cluster(&["w1"])?;
    sim.submit(TaskRequestBuilder::new(1, 0).build())?;
    sim.submit(TaskRequestBuilder::new(2, 0).build())?;
    sim.submit(TaskRequestBuilder::new(3, 0).priority(true).build())?;

    sim.complete(1)?;
    assert_eq!(sim.running_tasks(), vec![3]);
    sim.complete(3)?;
    assert_eq!(sim.running_tasks(), vec![2]);
    Ok(())
}

#[test]
fn lower_group_priority_runs_first() -> TestResult {
    init_tracing();
    let mut sim = cluster(&["w1"])?;
    sim.submit(TaskRequestBuilder::new(1, 0).build())?;
    sim.submit(TaskRequestBuilder::new(2, 0).group_priority(5).build())?;
    sim.submit(TaskRequestBuilder::new(3, 0).group_priority(1).build())?;

    sim.complete(1)?;
    assert_eq!(sim.running_tasks(), vec![3]);
    Ok(())
}

#[test]
fn notifications_for_finished_actions_are_ignored() -> TestResult {
    init_tracing();
    let mut sim = cluster(&["w1"])?;
    sim.submit(TaskRequestBuilder::new(1, 0).build())?;
    let job = sim.running_job(1).map(|j| (j.action, j.job)).ok_or("no job")?;
    sim.complete(1)?;

    sim.scheduler_mut().job_failed(job.0, job.1)?;
    sim.scheduler_mut().job_completed(job.0, job.1, 99)?;
    sim.scheduler_mut().transfers_failed(job.0)?;
    sim.pump()?;
    assert_eq!(sim.reports().len(), 1);
    assert_eq!(sim.outcome(1), Some(&TaskOutcome::Completed));
    Ok(())
}
