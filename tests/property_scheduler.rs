// tests/property_scheduler.rs

use std::collections::{BTreeMap, BTreeSet};

use flowsched::errors::FlowschedError;
use flowsched::resources::{MethodResources, ResourceUpdate};
use flowsched::scheduler::{
    ActionState, DefaultScorer, Profile, Score, Scorer, TaskOutcome, TaskScheduler,
};
use flowsched_test_utils::builders::{RegistryBuilder, TaskRequestBuilder, cpus};
use flowsched_test_utils::sim::SimCluster;
use proptest::prelude::*;

const MAX_WORKERS: usize = 3;

/// Change to the worker pool applied between two job completions.
#[derive(Debug, Clone, Copy)]
enum PoolEvent {
    Idle,
    /// Register the worker, or grow it by one cpu if it is already there.
    Join(usize),
    /// Take one cpu away from a worker that has at least two.
    Shrink(usize),
    Decommission(usize),
}

#[derive(Debug, Clone)]
struct Scenario {
    /// `deps[i]` lists earlier tasks task `i` runs after.
    deps: Vec<BTreeSet<usize>>,
    /// Capacity of every worker the scenario may use.
    workers: Vec<u32>,
    /// Workers registered before the first task.
    initial: BTreeSet<usize>,
    failing: BTreeSet<usize>,
    /// Tasks that share a worker with their first predecessor.
    colocated: BTreeSet<usize>,
    forced: BTreeMap<usize, usize>,
    prioritized: BTreeSet<usize>,
    events: Vec<PoolEvent>,
    picks: Vec<usize>,
}

fn pool_event_strategy() -> impl Strategy<Value = PoolEvent> {
    prop_oneof![
        3 => Just(PoolEvent::Idle),
        1 => (0..MAX_WORKERS).prop_map(PoolEvent::Join),
        1 => (0..MAX_WORKERS).prop_map(PoolEvent::Shrink),
        1 => (0..MAX_WORKERS).prop_map(PoolEvent::Decommission),
    ]
}

// Task `i` only depends on tasks `0..i`, so the graph is acyclic.
fn scenario_strategy(max_tasks: usize) -> impl Strategy<Value = Scenario> {
    (1..=max_tasks, 1..=MAX_WORKERS).prop_flat_map(|(num_tasks, num_workers)| {
        (
            (
                proptest::collection::vec(proptest::collection::vec(any::<usize>(), 0..3), num_tasks),
                proptest::collection::vec(1..=3u32, num_workers),
                proptest::collection::btree_set(0..num_workers, 1..=num_workers),
                proptest::collection::btree_set(0..num_tasks, 0..=num_tasks / 3),
            ),
            (
                proptest::collection::btree_set(0..num_tasks, 0..=num_tasks / 2),
                proptest::collection::btree_map(0..num_tasks, 0..num_workers, 0..=num_tasks / 4),
                proptest::collection::btree_set(0..num_tasks, 0..=num_tasks / 3),
                proptest::collection::vec(pool_event_strategy(), 0..16),
                proptest::collection::vec(any::<usize>(), 1..32),
            ),
        )
            .prop_map(
                move |((raw_deps, workers, initial, failing), (colocated, forced, prioritized, events, picks))| {
                    let deps = raw_deps
                        .into_iter()
                        .enumerate()
                        .map(|(i, potential)| {
                            if i == 0 {
                                BTreeSet::new()
                            } else {
                                potential.into_iter().map(|d| d % i).collect()
                            }
                        })
                        .collect();
                    let events = events
                        .into_iter()
                        .map(|event| match event {
                            PoolEvent::Join(w) => PoolEvent::Join(w % num_workers),
                            PoolEvent::Shrink(w) => PoolEvent::Shrink(w % num_workers),
                            PoolEvent::Decommission(w) => PoolEvent::Decommission(w % num_workers),
                            PoolEvent::Idle => PoolEvent::Idle,
                        })
                        .collect();
                    Scenario {
                        deps,
                        workers,
                        initial,
                        failing,
                        colocated,
                        forced,
                        prioritized,
                        events,
                        picks,
                    }
                },
            )
    })
}

fn task_id(index: usize) -> u64 {
    index as u64 + 1
}

fn worker_name(index: usize) -> String {
    format!("w{index}")
}

fn engine_error(err: FlowschedError) -> TestCaseError {
    TestCaseError::fail(err.to_string())
}

fn profile_of(samples: &[u64]) -> Profile {
    let mut profile = Profile::default();
    for sample in samples {
        profile.accumulate(&Profile::single(*sample));
    }
    profile
}

/// Every live task action sits in exactly one tracked place and the ready
/// counters match the actions that are free to go.
fn check_bookkeeping(scheduler: &TaskScheduler<MethodResources>) -> Result<(), TestCaseError> {
    let mut expected_ready = vec![0usize; scheduler.ready_counts().len()];
    for action in scheduler.actions() {
        let Some(core) = action.core_id() else {
            continue;
        };
        prop_assert!(
            scheduler.location(action.id()).is_some(),
            "action {} is not tracked anywhere (state {:?})",
            action.id(),
            action.state()
        );
        let ready = !action.has_data_predecessors()
            && matches!(action.state(), ActionState::Unscheduled | ActionState::Scheduled);
        if ready {
            expected_ready[core] += 1;
        }
    }
    prop_assert_eq!(scheduler.ready_counts(), expected_ready);
    for rs in scheduler.workers() {
        prop_assert!(
            rs.hosted_actions().len() <= rs.capacity().cpus as usize,
            "worker {} hosts more than it holds",
            rs.name()
        );
    }
    Ok(())
}

fn apply_pool_event(
    sim: &mut SimCluster,
    scenario: &Scenario,
    event: PoolEvent,
) -> Result<(), TestCaseError> {
    let pending = |sim: &SimCluster, name: &str| {
        sim.scheduler()
            .worker(name)
            .map(|rs| rs.pending_reductions().count())
    };
    match event {
        PoolEvent::Idle => {}
        PoolEvent::Join(w) => {
            let name = worker_name(w);
            let capacity = match sim.scheduler().worker(&name) {
                Some(_) => 1,
                None => scenario.workers[w],
            };
            sim.add_worker(&name, cpus(capacity)).map_err(engine_error)?;
        }
        PoolEvent::Shrink(w) => {
            let name = worker_name(w);
            let cpus_now = sim.scheduler().worker(&name).map(|rs| rs.capacity().cpus);
            if cpus_now.is_some_and(|c| c >= 2) && pending(sim, &name) == Some(0) {
                sim.update_worker(&name, ResourceUpdate::pending_reduction(cpus(1)))
                    .map_err(engine_error)?;
            }
        }
        PoolEvent::Decommission(w) => {
            let name = worker_name(w);
            if pending(sim, &name) == Some(0) {
                sim.remove_worker(&name).map_err(engine_error)?;
            }
        }
    }
    Ok(())
}

/// Finish or fail running jobs until none is left, applying pool events
/// along the way.
fn drive(
    sim: &mut SimCluster,
    scenario: &Scenario,
    events: &[PoolEvent],
    step: &mut usize,
) -> Result<(), TestCaseError> {
    let failing: BTreeSet<u64> = scenario.failing.iter().map(|i| task_id(*i)).collect();
    let mut events = events.iter();
    loop {
        prop_assert!(*step < 10_000, "simulation did not settle");
        let event = events.next();
        if let Some(event) = event {
            apply_pool_event(sim, scenario, *event)?;
            check_bookkeeping(sim.scheduler())?;
        }

        let running = sim.running_tasks();
        if running.is_empty() {
            if event.is_none() {
                return Ok(());
            }
            continue;
        }
        let pick = scenario.picks[*step % scenario.picks.len()] % running.len();
        let task = running[pick];
        if failing.contains(&task) {
            sim.fail(task).map_err(engine_error)?;
        } else {
            sim.complete(task).map_err(engine_error)?;
        }
        check_bookkeeping(sim.scheduler())?;
        *step += 1;
    }
}

fn run_scenario(scenario: &Scenario) -> Result<SimCluster, TestCaseError> {
    let registry = RegistryBuilder::new().core("compute", cpus(1)).build();
    let mut sim = SimCluster::new(registry);
    for w in &scenario.initial {
        sim.add_worker(&worker_name(*w), cpus(scenario.workers[*w]))
            .map_err(engine_error)?;
    }

    for (i, deps) in scenario.deps.iter().enumerate() {
        let mut request = TaskRequestBuilder::new(task_id(i), 0)
            .priority(scenario.prioritized.contains(&i));
        for dep in deps {
            request = request.after(task_id(*dep));
        }
        if scenario.colocated.contains(&i) {
            if let Some(first) = deps.iter().next() {
                request = request.colocate_with(task_id(*first));
            }
        }
        if let Some(w) = scenario.forced.get(&i) {
            request = request.worker(&worker_name(*w));
        }
        sim.submit(request.build()).map_err(engine_error)?;
        check_bookkeeping(sim.scheduler())?;
    }

    let mut step = 0usize;
    drive(&mut sim, scenario, &scenario.events, &mut step)?;

    // Bring every worker back so nothing is left waiting for the pool.
    for (w, capacity) in scenario.workers.iter().enumerate() {
        let name = worker_name(w);
        if sim.scheduler().worker(&name).is_none() {
            sim.add_worker(&name, cpus(*capacity)).map_err(engine_error)?;
            check_bookkeeping(sim.scheduler())?;
        }
    }
    drive(&mut sim, scenario, &[], &mut step)?;
    Ok(sim)
}

fn launch_order(priorities: &[(bool, i64)]) -> Result<(Vec<u64>, Vec<Score>), TestCaseError> {
    let registry = RegistryBuilder::new().core("compute", cpus(1)).build();
    let mut sim = SimCluster::new(registry);
    sim.add_worker("w1", cpus(priorities.len() as u32 + 1))
        .map_err(engine_error)?;
    sim.submit(TaskRequestBuilder::new(1, 0).build()).map_err(engine_error)?;
    for (i, (priority, group)) in priorities.iter().enumerate() {
        sim.submit(
            TaskRequestBuilder::new(task_id(i + 1), 0)
                .after(1)
                .priority(*priority)
                .group_priority(*group)
                .build(),
        )
        .map_err(engine_error)?;
    }
    prop_assert_eq!(sim.running_tasks(), vec![1]);
    sim.complete(1).map_err(engine_error)?;

    let scorer = DefaultScorer;
    let launched = &sim.submissions()[1..];
    let order = launched.iter().map(|spec| spec.task_id).collect();
    let mut scores = Vec::new();
    for spec in launched {
        let action = sim
            .scheduler()
            .action(spec.action)
            .ok_or_else(|| TestCaseError::fail("launched action is unknown"))?;
        scores.push(Scorer::<MethodResources>::action_score(&scorer, action));
    }
    Ok((order, scores))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn released_actions_launch_best_first_and_repeatably(
        priorities in proptest::collection::vec((any::<bool>(), -2..3i64), 1..8),
    ) {
        let (order, scores) = launch_order(&priorities)?;
        let (again, _) = launch_order(&priorities)?;

        prop_assert_eq!(order.len(), priorities.len());
        prop_assert_eq!(&order, &again);
        for pair in scores.windows(2) {
            prop_assert!(pair[0] >= pair[1], "launched {:?} before {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn every_task_reaches_exactly_one_outcome(scenario in scenario_strategy(12)) {
        let sim = run_scenario(&scenario)?;

        prop_assert!(sim.scheduler().all_tasks_finished());
        prop_assert_eq!(sim.reports().len(), scenario.deps.len());
        let reported: BTreeSet<u64> = sim.reports().iter().map(|r| r.task_id).collect();
        prop_assert_eq!(reported.len(), scenario.deps.len());
    }

    #[test]
    fn tasks_complete_only_after_their_predecessors(scenario in scenario_strategy(12)) {
        let sim = run_scenario(&scenario)?;

        let outcomes: BTreeMap<u64, TaskOutcome> = sim
            .reports()
            .iter()
            .map(|r| (r.task_id, r.outcome.clone()))
            .collect();
        let position: BTreeMap<u64, usize> = sim
            .reports()
            .iter()
            .enumerate()
            .map(|(pos, r)| (r.task_id, pos))
            .collect();

        for (i, deps) in scenario.deps.iter().enumerate() {
            let id = task_id(i);
            for dep in deps {
                let dep_id = task_id(*dep);
                match outcomes.get(&id) {
                    Some(TaskOutcome::Completed) => {
                        prop_assert_eq!(outcomes.get(&dep_id), Some(&TaskOutcome::Completed));
                        prop_assert!(position[&dep_id] < position[&id]);
                    }
                    Some(_) => {}
                    None => prop_assert!(false, "task {} has no outcome", id),
                }
                if scenario.failing.contains(dep) {
                    prop_assert_eq!(outcomes.get(&id), Some(&TaskOutcome::Cancelled));
                }
            }
            if scenario.failing.contains(&i) {
                let failed = matches!(outcomes.get(&id), Some(TaskOutcome::Failed { .. }) | Some(TaskOutcome::Cancelled));
                prop_assert!(failed, "failing task {} ended as {:?}", id, outcomes.get(&id));
            }
        }
    }

    #[test]
    fn hosted_consumption_never_exceeds_capacity(scenario in scenario_strategy(10)) {
        let registry = RegistryBuilder::new().core("compute", cpus(1)).build();
        let mut sim = SimCluster::new(registry);
        for (i, capacity) in scenario.workers.iter().enumerate() {
            sim.add_worker(&worker_name(i), cpus(*capacity)).map_err(engine_error)?;
        }
        for i in 0..scenario.deps.len() {
            sim.submit(TaskRequestBuilder::new(task_id(i), 0).build()).map_err(engine_error)?;
        }

        let total: u32 = scenario.workers.iter().sum();
        prop_assert_eq!(sim.running_tasks().len(), scenario.deps.len().min(total as usize));
        for rs in sim.scheduler().workers() {
            prop_assert!(rs.hosted_actions().len() <= rs.capacity().cpus as usize);
        }
    }

    #[test]
    fn profile_accumulation_is_associative(
        a in proptest::collection::vec(0..10_000u64, 0..5),
        b in proptest::collection::vec(0..10_000u64, 0..5),
        c in proptest::collection::vec(0..10_000u64, 0..5),
    ) {
        let (pa, pb, pc) = (profile_of(&a), profile_of(&b), profile_of(&c));

        let mut left = pa.clone();
        left.accumulate(&pb);
        left.accumulate(&pc);

        let mut right_tail = pb.clone();
        right_tail.accumulate(&pc);
        let mut right = pa.clone();
        right.accumulate(&right_tail);

        prop_assert_eq!(left.executions(), right.executions());
        prop_assert_eq!(left.total_time(), right.total_time());
        prop_assert_eq!(left.average_time(), right.average_time());
        if left.executions() > 0 {
            prop_assert_eq!(left.min_time(), right.min_time());
            prop_assert_eq!(left.max_time(), right.max_time());
        }
    }

    #[test]
    fn score_order_is_antisymmetric(
        a in proptest::array::uniform5(-3i64..3),
        b in proptest::array::uniform5(-3i64..3),
    ) {
        let sa = Score::new(a[0], a[1], a[2], a[3], a[4]);
        let sb = Score::new(b[0], b[1], b[2], b[3], b[4]);

        prop_assert_eq!(sa.cmp(&sb), sb.cmp(&sa).reverse());
        prop_assert!(!(sa.is_better(&sb) && sb.is_better(&sa)));
        prop_assert_eq!(sa == sb, !sa.is_better(&sb) && !sb.is_better(&sa));
    }
}
