//! Integration tests for hook graph resolution.
//!
//! Covers ordering guarantees, deduplication, cycle detection and dependency
//! timing validation through the public `resolve` entry point and the
//! scheduler's pre-flight `resolve`.


use std::sync::{Arc, OnceLock};

use cadence_hooks::prelude::*;
use cadence_hooks::resolver::resolve;
use proptest::prelude::*;
use test_utils::noop;

/// A hook whose dependencies are wired after construction, so that true
/// reference cycles can be built.
struct LateBound {
    name: String,
    requires: OnceLock<Vec<HookRef>>,
}

impl LateBound {
    fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            requires: OnceLock::new(),
        })
    }
}

impl Hook for LateBound {
    fn name(&self) -> &str {
        &self.name
    }

    fn required_hooks(&self) -> &[HookRef] {
        self.requires.get().map_or(&[], Vec::as_slice)
    }

    fn invoke(&self, _ctx: &mut HookContext<'_>) -> Result<(), HookError> {
        Ok(())
    }
}

fn position(schedule: &ResolvedSchedule, name: &str) -> usize {
    schedule
        .position(name)
        .unwrap_or_else(|| panic!("{name} missing from {:?}", schedule.names()))
}

// ═══════════════════════════════════════════════════════════════════════════════
// ORDERING
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn dependencies_run_before_dependents_regardless_of_priority() {
    let load = noop("load").priority(10).into_ref();
    let train = noop("train").priority(-10).requires(Arc::clone(&load)).into_ref();
    let log = noop("log").priority(-5).into_ref();

    let schedule = resolve(&[train, log]).unwrap();

    assert_eq!(schedule.names(), vec!["log", "load", "train"]);
}

#[test]
fn priority_only_reorders_independent_hooks() {
    let a = noop("a").priority(2).into_ref();
    let b = noop("b").priority(-1).into_ref();
    let c = noop("c").into_ref();
    let d = noop("d").into_ref();

    let schedule = resolve(&[a, b, c, d]).unwrap();

    // Equal priorities keep registration order.
    assert_eq!(schedule.names(), vec!["b", "c", "d", "a"]);
}

#[test]
fn transitive_dependencies_are_discovered_breadth_first() {
    let leaf = noop("leaf").into_ref();
    let left = noop("left").requires(Arc::clone(&leaf)).into_ref();
    let right = noop("right").requires(Arc::clone(&leaf)).into_ref();
    let root = noop("root")
        .requires(Arc::clone(&left))
        .requires(Arc::clone(&right))
        .into_ref();

    let schedule = resolve(&[root]).unwrap();

    assert_eq!(schedule.len(), 4);
    assert_eq!(schedule.names(), vec!["leaf", "left", "right", "root"]);
    let root_node = &schedule.nodes()[position(&schedule, "root")];
    assert_eq!(root_node.requires().len(), 2);
    assert_eq!(root_node.sequence(), 0);
    assert_eq!(root_node.registration(), Some(0));
}

// ═══════════════════════════════════════════════════════════════════════════════
// DEDUPLICATION
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn equivalent_dependencies_collapse_to_one_node() {
    let shared_a = noop("normalise").equivalence_key("normalise").into_ref();
    let shared_b = noop("normalise").equivalence_key("normalise").into_ref();
    let first = noop("first").requires(shared_a).into_ref();
    let second = noop("second").requires(shared_b).into_ref();

    let schedule = resolve(&[first, second]).unwrap();

    assert_eq!(schedule.len(), 3);
    assert_eq!(schedule.collapsed(), 1);
    let normalise = &schedule.nodes()[position(&schedule, "normalise")];
    assert_eq!(normalise.merged(), ["normalise".to_string()]);
    assert!(position(&schedule, "normalise") < position(&schedule, "second"));
}

#[test]
fn earliest_registration_flags_win_on_collapse() {
    let early = noop("early").equivalence_key("k").priority(5).into_ref();
    let late = noop("late").equivalence_key("k").priority(-5).into_ref();
    let other = noop("other").into_ref();

    let schedule = resolve(&[early, other, late]).unwrap();

    assert_eq!(schedule.names(), vec!["other", "early"]);
}

// ═══════════════════════════════════════════════════════════════════════════════
// VALIDATION
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn coarser_dependency_is_rejected() {
    let every_five = noop("every_five").every(5).into_ref();
    let every_one = noop("every_one").requires(every_five).into_ref();

    let err = resolve(&[every_one]).unwrap_err();

    assert_eq!(
        err,
        ResolutionError::InvalidDependencyTiming {
            dependent: "every_one".to_string(),
            required: "every_five".to_string(),
            dependent_step: TimeStep::every_iteration(),
            required_step: TimeStep::every_iterations(5),
        }
    );
}

#[test]
fn epoch_dependency_of_iteration_hook_is_rejected() {
    let per_epoch = noop("per_epoch").every_epochs(1).into_ref();
    let per_iteration = noop("per_iteration").every(100).requires(per_epoch).into_ref();

    assert!(matches!(
        resolve(&[per_iteration]),
        Err(ResolutionError::InvalidDependencyTiming { .. })
    ));
}

#[test]
fn finer_and_divisible_dependencies_are_accepted() {
    let every_two = noop("every_two").every(2).into_ref();
    let every_iteration = noop("every_iteration").into_ref();
    let every_ten = noop("every_ten")
        .every(10)
        .requires(every_two)
        .into_ref();
    let per_epoch = noop("per_epoch")
        .every_epochs(3)
        .requires(every_iteration)
        .into_ref();

    assert_eq!(resolve(&[every_ten, per_epoch]).unwrap().len(), 4);
}

#[test]
fn limited_dependency_of_unlimited_hook_is_rejected() {
    let once = noop("once").live_time(1).into_ref();
    let forever = noop("forever").requires(once).into_ref();

    assert!(matches!(
        resolve(&[forever]),
        Err(ResolutionError::InvalidDependencyTiming { .. })
    ));
}

#[test]
fn inline_hook_requiring_background_hook_is_rejected() {
    let export = noop("export").background().into_ref();
    let consume = noop("consume").requires(export).into_ref();

    assert_eq!(
        resolve(&[consume]).unwrap_err(),
        ResolutionError::InlineRequiresBackground {
            dependent: "consume".to_string(),
            required: "export".to_string(),
        }
    );
}

#[test]
fn background_hook_may_require_inline_or_background_hooks() {
    let compute = noop("compute").into_ref();
    let export = noop("export").background().into_ref();
    let upload = noop("upload")
        .background()
        .requires(compute)
        .requires(export)
        .into_ref();

    assert_eq!(resolve(&[upload]).unwrap().len(), 3);
}

#[test]
fn two_hook_cycle_is_reported_with_names() {
    let a = LateBound::new("a");
    let b = LateBound::new("b");
    a.requires.set(vec![Arc::clone(&b) as HookRef]).ok();
    b.requires.set(vec![Arc::clone(&a) as HookRef]).ok();

    let err = resolve(&[a as HookRef]).unwrap_err();

    assert_eq!(
        err,
        ResolutionError::DependencyCycle {
            cycle: vec!["a".to_string(), "b".to_string(), "a".to_string()],
        }
    );
}

#[test]
fn cycle_created_by_collapsing_is_detected() {
    let inner = noop("outer").equivalence_key("outer").into_ref();
    let middle = noop("middle").requires(inner).into_ref();
    let outer = noop("outer")
        .equivalence_key("outer")
        .requires(middle)
        .into_ref();

    assert!(matches!(
        resolve(&[outer]),
        Err(ResolutionError::DependencyCycle { .. })
    ));
}

#[test]
fn scheduler_fails_fast_before_first_tick() {
    let coarse = noop("coarse").every(3).into_ref();
    let mut scheduler = HookScheduler::new(OperatorId::next());
    scheduler.add(noop("fine").requires(coarse).into_ref());

    assert!(scheduler.resolve().is_err());
    assert!(scheduler.schedule().is_none());

    let mut registry = cadence_registry::ParameterRegistry::new();
    let err = scheduler
        .tick(TickCounters::at_iteration(1), &mut registry)
        .unwrap_err();
    assert!(matches!(err, ScheduleError::Resolution(_)));
}

// ═══════════════════════════════════════════════════════════════════════════════
// PROPERTIES
// ═══════════════════════════════════════════════════════════════════════════════

/// Random DAGs: hook `i` may require any hook `j < i`.
fn dag() -> impl Strategy<Value = (Vec<Vec<bool>>, Vec<i32>)> {
    (1usize..12).prop_flat_map(|n| {
        (
            prop::collection::vec(prop::collection::vec(any::<bool>(), n), n),
            prop::collection::vec(-3i32..=3, n),
        )
    })
}

fn build(edges: &[Vec<bool>], priorities: &[i32]) -> Vec<HookRef> {
    let mut hooks: Vec<HookRef> = Vec::with_capacity(priorities.len());
    for (i, priority) in priorities.iter().enumerate() {
        let mut builder = noop(&format!("h{i}")).priority(*priority);
        for (j, required) in hooks.iter().enumerate() {
            if edges[i][j] {
                builder = builder.requires(Arc::clone(required));
            }
        }
        hooks.push(builder.into_ref());
    }
    hooks
}

proptest! {
    #[test]
    fn every_dependency_precedes_its_dependents((edges, priorities) in dag(), reverse in any::<bool>()) {
        let mut hooks = build(&edges, &priorities);
        if reverse {
            hooks.reverse();
        }

        let schedule = resolve(&hooks).unwrap();
        prop_assert_eq!(schedule.len(), priorities.len());

        for (index, node) in schedule.iter().enumerate() {
            for required in node.requires() {
                let required_index = schedule
                    .nodes()
                    .iter()
                    .position(|candidate| candidate.id() == *required)
                    .unwrap();
                prop_assert!(required_index < index);
            }
        }
    }

    #[test]
    fn resolution_is_deterministic((edges, priorities) in dag()) {
        let hooks = build(&edges, &priorities);
        let first = resolve(&hooks).unwrap();
        let second = resolve(&hooks).unwrap();
        prop_assert_eq!(first.names(), second.names());
    }
}
