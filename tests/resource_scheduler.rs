// tests/resource_scheduler.rs

use std::error::Error;

use flowsched::resources::{MethodResources, ResourceDescription};
use flowsched::scheduler::resource_scheduler::ActionNotFound;
use flowsched::scheduler::{Profile, ResourceScheduler, Score};
use flowsched_test_utils::builders::cpus;

type TestResult = Result<(), Box<dyn Error>>;

/// One core with a 1-cpu and a 3-cpu implementation.
fn worker(capacity: u32) -> ResourceScheduler<MethodResources> {
    let mut rs = ResourceScheduler::new("w1", vec![vec![cpus(1), cpus(3)]]);
    rs.increase_capacity(&cpus(capacity));
    rs
}

#[test]
fn new_worker_has_no_capacity() {
    let rs = ResourceScheduler::new("w1", vec![vec![cpus(1)]]);
    assert!(rs.capacity().is_empty());
    assert!(!rs.can_run(0, 0));
    assert!(!rs.can_run_core(0));
    assert!(rs.executable_cores().is_empty());
}

#[test]
fn executable_implementations_follow_capacity() {
    let mut rs = worker(2);
    assert_eq!(rs.executable_implementations(0), vec![0]);
    rs.increase_capacity(&cpus(1));
    assert_eq!(rs.executable_implementations(0), vec![0, 1]);
    rs.set_removed();
    assert!(!rs.can_run_core(0), "removed workers run nothing");
}

#[test]
fn hosted_actions_consume_capacity() {
    let mut rs = worker(4);
    rs.initial_schedule(1);
    rs.host_action(1, cpus(3));
    assert!(rs.is_hosted(1));
    assert!(!rs.is_assigned(1));
    assert_eq!(rs.available(), cpus(1));
    assert!(rs.can_run_now(&cpus(1)));
    assert!(!rs.can_run_now(&cpus(2)));
}

#[test]
fn waiting_queue_orders_by_score_then_arrival() {
    let mut rs = worker(1);
    rs.wait_on_resource(10, Score::for_action(0, 0), cpus(1));
    rs.wait_on_resource(11, Score::for_action(1, 0), cpus(1));
    rs.wait_on_resource(12, Score::for_action(0, 0), cpus(1));
    assert_eq!(rs.blocked_actions(), vec![11, 10, 12]);
    assert!(rs.is_blocked(10));
    assert!(rs.is_assigned(10), "waiting actions stay assigned");
}

#[test]
fn unscheduling_a_hosted_action_frees_waiting_ones() -> TestResult {
    let mut rs = worker(2);
    rs.host_action(1, cpus(2));
    rs.wait_on_resource(2, Score::default(), cpus(1));
    rs.wait_on_resource(3, Score::default(), cpus(1));
    rs.wait_on_resource(4, Score::default(), cpus(1));

    let freed = rs.unschedule_action(1)?;
    assert_eq!(freed, vec![2, 3], "freed actions account for each other");
    assert_eq!(rs.blocked_actions(), vec![4]);
    assert!(rs.is_assigned(2));
    Ok(())
}

#[test]
fn queue_head_holds_back_smaller_actions() -> TestResult {
    let mut rs = worker(3);
    rs.host_action(1, cpus(2));
    rs.wait_on_resource(2, Score::for_action(1, 0), cpus(3));
    rs.wait_on_resource(3, Score::default(), cpus(1));

    assert!(rs.take_launchable_blocked().is_empty(), "head does not fit yet");

    let freed = rs.unschedule_action(2)?;
    assert_eq!(freed, vec![3], "removing the head lets the next one through");
    Ok(())
}

#[test]
fn unscheduling_an_unknown_action_is_reported() {
    let mut rs = worker(1);
    let err = rs.unschedule_action(42).unwrap_err();
    assert_eq!(
        err,
        ActionNotFound {
            action: 42,
            worker: "w1".to_string()
        }
    );
}

#[test]
fn unscheduling_an_assigned_action_frees_nothing() -> TestResult {
    let mut rs = worker(1);
    rs.initial_schedule(5);
    rs.host_action(6, cpus(1));
    rs.wait_on_resource(7, Score::default(), cpus(1));
    assert!(rs.unschedule_action(5)?.is_empty());
    assert!(!rs.is_assigned(5));
    Ok(())
}

#[test]
fn reduction_exposes_unfit_waiting_actions() {
    let mut rs = worker(4);
    rs.host_action(1, cpus(4));
    rs.wait_on_resource(2, Score::default(), cpus(3));
    rs.wait_on_resource(3, Score::default(), cpus(1));
    rs.reduce_capacity(&cpus(2));
    assert_eq!(rs.capacity(), &cpus(2));
    assert_eq!(rs.unfit_blocked_actions(), vec![2]);
    assert!(!rs.can_run(0, 1));
}

#[test]
fn pending_reductions_are_matched_by_amount() {
    let mut rs = worker(4);
    rs.add_pending_reduction(8, cpus(1));
    rs.add_pending_reduction(9, cpus(2));
    assert_eq!(rs.take_pending_reduction(&cpus(2)), Some(9));
    assert_eq!(rs.take_pending_reduction(&cpus(2)), None);
    assert_eq!(rs.drop_pending_reduction(8), Some(cpus(1)));
    assert_eq!(rs.pending_reductions().count(), 0);
}

#[test]
fn profiles_split_loaded_history_from_session_runs() {
    let mut rs = worker(4);
    rs.seed_profiles(vec![vec![Profile::single(100), Profile::default()]]);
    rs.profiled_execution(0, 0, &Profile::single(20));

    assert_eq!(rs.profile(0, 0).executions(), 2);
    assert_eq!(rs.profile(0, 0).average_time(), 60);
    assert_eq!(rs.session_profiles()[0][0].executions(), 1);
    assert_eq!(rs.executed_count(0), 1);
    assert_eq!(rs.executed_count(5), 0);
}

#[test]
fn core_registry_growth_keeps_existing_profiles() {
    let mut rs = worker(4);
    rs.profiled_execution(0, 1, &Profile::single(7));
    rs.updated_core_elements(vec![vec![cpus(1), cpus(3)], vec![cpus(2)]]);

    assert_eq!(rs.profiles().len(), 2);
    assert_eq!(rs.profile(0, 1).executions(), 1);
    assert_eq!(rs.profile(1, 0).executions(), 0);
    assert!(rs.can_run_core(1));
}
