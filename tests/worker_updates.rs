// tests/worker_updates.rs

use std::error::Error;

use flowsched::core_elements::ImplementationSpec;
use flowsched::resources::ResourceUpdate;
use flowsched::scheduler::{ActionLocation, TaskOutcome};
use flowsched_test_utils::builders::{RegistryBuilder, TaskRequestBuilder, cpus};
use flowsched_test_utils::init_tracing;
use flowsched_test_utils::sim::SimCluster;

type TestResult = Result<(), Box<dyn Error>>;

#[test]
fn new_worker_is_started_before_use() -> TestResult {
    init_tracing();
    let mut sim = SimCluster::new(RegistryBuilder::new().core("compute", cpus(1)).build());
    sim.add_worker("w1", cpus(2))?;
    sim.add_worker("w1", cpus(2))?;

    assert_eq!(sim.started_workers(), ["w1".to_string()], "started once");
    let rs = sim.scheduler().worker("w1").ok_or("w1 missing")?;
    assert_eq!(rs.capacity(), &cpus(4));
    assert_eq!(sim.scheduler().core_executors(0), vec!["w1".to_string()]);
    Ok(())
}

#[test]
fn pending_increase_changes_nothing_yet() -> TestResult {
    init_tracing();
    let mut sim = SimCluster::new(RegistryBuilder::new().core("compute", cpus(1)).build());
    sim.add_worker("w1", cpus(1))?;
    sim.update_worker("w1", ResourceUpdate::pending_increase(cpus(3)))?;

    let rs = sim.scheduler().worker("w1").ok_or("w1 missing")?;
    assert_eq!(rs.capacity(), &cpus(1));
    Ok(())
}

#[test]
fn growing_a_worker_wakes_blocked_tasks() -> TestResult {
    init_tracing();
    let registry = RegistryBuilder::new().core("wide", cpus(4)).build();
    let mut sim = SimCluster::new(registry);
    sim.add_worker("w1", cpus(2))?;

    let id = sim.submit(TaskRequestBuilder::new(1, 0).build())?;
    assert_eq!(sim.scheduler().location(id), Some(ActionLocation::Blocked));

    sim.add_worker("w1", cpus(2))?;
    assert_eq!(sim.running_tasks(), vec![1]);
    assert_eq!(sim.scheduler().blocked_counts(), vec![0]);
    Ok(())
}

#[test]
fn growing_a_worker_serves_its_own_queue() -> TestResult {
    init_tracing();
    let mut sim = SimCluster::new(RegistryBuilder::new().core("compute", cpus(1)).build());
    sim.add_worker("w1", cpus(1))?;
    sim.submit(TaskRequestBuilder::new(1, 0).build())?;
    sim.submit(TaskRequestBuilder::new(2, 0).build())?;
    sim.submit(TaskRequestBuilder::new(3, 0).build())?;
    assert_eq!(sim.scheduler().resource_blocked_actions("w1").len(), 2);

    sim.add_worker("w1", cpus(2))?;
    assert_eq!(sim.running_tasks(), vec![1, 2, 3]);
    Ok(())
}

#[test]
fn decommission_moves_running_work_elsewhere() -> TestResult {
    init_tracing();
    let mut sim = SimCluster::new(RegistryBuilder::new().core("compute", cpus(1)).build());
    sim.add_worker("w1", cpus(1))?;
    sim.add_worker("w2", cpus(1))?;

    sim.submit(TaskRequestBuilder::new(1, 0).build())?;
    sim.complete(1)?;
    sim.submit(TaskRequestBuilder::new(2, 0).build())?;
    assert_eq!(
        sim.running_job(2).map(|j| j.worker.as_str()),
        Some("w1"),
        "w1 has the faster history"
    );
    let old_job = sim.running_job(2).map(|j| j.job).ok_or("no job")?;

    sim.remove_worker("w1")?;

    assert_eq!(sim.cancels().len(), 1);
    assert_eq!(sim.cancels()[0].1, Some(old_job));
    let job = sim.running_job(2).ok_or("task 2 should run again")?;
    assert_eq!(job.worker, "w2");
    assert_ne!(job.job, old_job);

    assert_eq!(sim.stopped_workers(), ["w1".to_string()]);
    assert!(sim.scheduler().worker("w1").is_none());
    assert_eq!(sim.scheduler().offline_profiles()[0][0].executions(), 1);

    sim.complete(2)?;
    assert_eq!(sim.outcome(2), Some(&TaskOutcome::Completed));
    Ok(())
}

#[test]
fn decommission_with_nowhere_to_go_blocks() -> TestResult {
    init_tracing();
    let mut sim = SimCluster::new(RegistryBuilder::new().core("compute", cpus(1)).build());
    sim.add_worker("w1", cpus(1))?;
    let running = sim.submit(TaskRequestBuilder::new(1, 0).build())?;
    let waiting = sim.submit(TaskRequestBuilder::new(2, 0).build())?;

    sim.remove_worker("w1")?;
    assert_eq!(sim.scheduler().location(running), Some(ActionLocation::Blocked));
    assert_eq!(sim.scheduler().location(waiting), Some(ActionLocation::Blocked));
    assert!(sim.scheduler().core_executors(0).is_empty());

    sim.add_worker("w2", cpus(2))?;
    assert_eq!(sim.running_tasks(), vec![1, 2]);
    Ok(())
}

#[test]
fn stopped_worker_can_rejoin() -> TestResult {
    init_tracing();
    let mut sim = SimCluster::new(RegistryBuilder::new().core("compute", cpus(1)).build());
    sim.add_worker("w1", cpus(1))?;
    let id = sim.submit(TaskRequestBuilder::new(1, 0).worker("w1").build())?;
    sim.remove_worker("w1")?;

    assert!(sim.scheduler().worker("w1").is_none());
    assert_eq!(sim.scheduler().location(id), Some(ActionLocation::Blocked));

    sim.add_worker("w1", cpus(4))?;
    assert_eq!(sim.started_workers(), ["w1".to_string(), "w1".to_string()]);
    assert_eq!(sim.running_tasks(), vec![1]);
    Ok(())
}

#[test]
fn retry_goes_back_to_a_tried_worker_when_no_other_is_left() -> TestResult {
    init_tracing();
    let mut sim = SimCluster::new(RegistryBuilder::new().core("compute", cpus(1)).build());
    sim.add_worker("w1", cpus(1))?;
    sim.add_worker("w2", cpus(1))?;
    let id = sim.submit(TaskRequestBuilder::new(1, 0).build())?;
    assert_eq!(sim.running_job(1).map(|j| j.worker.as_str()), Some("w1"));

    sim.remove_worker("w1")?;
    assert_eq!(sim.running_job(1).map(|j| j.worker.as_str()), Some("w2"));
    sim.add_worker("w1", cpus(1))?;

    // Both workers have seen the task once; the retry must not block.
    sim.fail(1)?;
    sim.fail(1)?;
    assert!(sim.running_job(1).is_some(), "task 1 should run again");
    assert_ne!(sim.scheduler().location(id), Some(ActionLocation::Blocked));

    sim.complete(1)?;
    assert_eq!(sim.outcome(1), Some(&TaskOutcome::Completed));
    Ok(())
}

#[test]
fn pending_reduction_waits_for_capacity() -> TestResult {
    init_tracing();
    let mut sim = SimCluster::new(RegistryBuilder::new().core("compute", cpus(1)).build());
    sim.add_worker("w1", cpus(4))?;
    sim.submit(TaskRequestBuilder::new(1, 0).build())?;
    sim.submit(TaskRequestBuilder::new(2, 0).build())?;

    sim.update_worker("w1", ResourceUpdate::pending_reduction(cpus(3)))?;
    assert!(sim.reductions().is_empty(), "two cpus are busy");
    assert_eq!(
        sim.scheduler()
            .worker("w1")
            .map(|rs| rs.pending_reductions().count()),
        Some(1)
    );

    sim.submit(TaskRequestBuilder::new(3, 0).build())?;
    assert_eq!(sim.running_tasks(), vec![1, 2], "queued behind the reduction");

    sim.complete(1)?;
    assert_eq!(sim.reductions(), [("w1".to_string(), cpus(3))]);
    let rs = sim.scheduler().worker("w1").ok_or("w1 missing")?;
    assert_eq!(rs.capacity(), &cpus(1));
    assert_eq!(rs.pending_reductions().count(), 0);
    assert_eq!(sim.running_tasks(), vec![2]);

    sim.complete(2)?;
    assert_eq!(sim.running_tasks(), vec![3]);
    Ok(())
}

#[test]
fn failed_reduction_returns_the_capacity() -> TestResult {
    init_tracing();
    let mut sim = SimCluster::new(RegistryBuilder::new().core("pair", cpus(2)).build());
    sim.add_worker("w1", cpus(2))?;
    sim.fail_reductions(true);

    sim.update_worker("w1", ResourceUpdate::pending_reduction(cpus(1)))?;
    assert!(sim.reductions().is_empty());
    let rs = sim.scheduler().worker("w1").ok_or("w1 missing")?;
    assert_eq!(rs.capacity(), &cpus(2));
    assert_eq!(rs.pending_reductions().count(), 0);

    sim.submit(TaskRequestBuilder::new(1, 0).build())?;
    assert_eq!(sim.running_tasks(), vec![1]);
    Ok(())
}

#[test]
fn completed_reduction_rehomes_tasks_that_no_longer_fit() -> TestResult {
    init_tracing();
    let mut sim = SimCluster::new(RegistryBuilder::new().core("pair", cpus(2)).build());
    sim.add_worker("w1", cpus(4))?;
    sim.submit(TaskRequestBuilder::new(1, 0).build())?;
    sim.submit(TaskRequestBuilder::new(2, 0).build())?;
    let waiting = sim.submit(TaskRequestBuilder::new(3, 0).build())?;
    assert_eq!(
        sim.scheduler().location(waiting),
        Some(ActionLocation::Waiting("w1".to_string()))
    );

    sim.update_worker("w1", ResourceUpdate::reduction(cpus(3)))?;
    assert_eq!(sim.scheduler().location(waiting), Some(ActionLocation::Blocked));
    assert_eq!(sim.running_tasks(), vec![1, 2], "running work is left alone");

    sim.add_worker("w2", cpus(2))?;
    assert_eq!(sim.running_job(3).map(|j| j.worker.as_str()), Some("w2"));
    Ok(())
}

#[test]
fn new_cores_become_schedulable_after_an_update() -> TestResult {
    init_tracing();
    let registry = RegistryBuilder::new().core("compute", cpus(1)).build();
    let mut sim = SimCluster::new(registry.clone());
    sim.add_worker("w1", cpus(2))?;
    sim.submit(TaskRequestBuilder::new(1, 0).build())?;
    sim.complete(1)?;

    let core = registry.register_core(
        "render",
        vec![ImplementationSpec {
            name: "default".to_string(),
            command: "true".to_string(),
            requirements: cpus(2),
        }],
    );
    sim.core_elements_updated()?;
    assert_eq!(sim.scheduler().ready_counts().len(), 2);
    assert_eq!(sim.scheduler().core_executors(core), vec!["w1".to_string()]);

    sim.submit(TaskRequestBuilder::new(2, core).build())?;
    assert_eq!(sim.running_job(2).map(|j| j.signature.as_str()), Some("render.default"));

    let rs = sim.scheduler().worker("w1").ok_or("w1 missing")?;
    assert_eq!(rs.profile(0, 0).executions(), 1, "existing history kept");
    Ok(())
}
