use std::collections::{HashSet, VecDeque};

use proptest::prelude::*;
use dagrun::config::{Dag, Step};
use dagrun::dag::{RunState, Scheduler};
use dagrun::engine::StepOutcome;

// Strategy to generate a valid DAG together with which steps fail.
// Acyclicity is guaranteed by only allowing step N to depend on steps 0..N-1.
fn dag_strategy(max_steps: usize) -> impl Strategy<Value = (Dag, Vec<bool>)> {
    (1..=max_steps).prop_flat_map(|num_steps| {
        let deps = proptest::collection::vec(
            proptest::collection::vec(any::<usize>(), 0..num_steps),
            num_steps,
        );
        let failures = proptest::collection::vec(any::<bool>(), num_steps);

        (deps, failures).prop_map(move |(raw_deps, failures)| {
            let steps = raw_deps
                .into_iter()
                .enumerate()
                .map(|(i, potential)| {
                    let valid: HashSet<usize> = if i == 0 {
                        HashSet::new()
                    } else {
                        potential.into_iter().map(|d| d % i).collect()
                    };
                    let mut valid: Vec<usize> = valid.into_iter().collect();
                    valid.sort_unstable();
                    valid
                        .into_iter()
                        .fold(Step::new(format!("step_{i}"), "true"), |s, d| s.after(format!("step_{d}")))
                })
                .collect();
            (Dag::new_unchecked("prop", "/prop/dag.toml", steps), failures)
        })
    })
}

fn index_of(name: &str) -> usize {
    name.trim_start_matches("step_").parse().unwrap()
}

proptest! {
    #[test]
    fn run_always_terminates_with_consistent_states((dag, failures) in dag_strategy(10)) {
        let mut scheduler = Scheduler::from_dag(&dag);
        let mut ready: VecDeque<String> = scheduler
            .start()
            .newly_scheduled
            .into_iter()
            .map(|s| s.name)
            .collect();
        let mut dispatched = HashSet::new();

        while let Some(name) = ready.pop_front() {
            // Never dispatched twice, never before its dependencies.
            prop_assert!(dispatched.insert(name.clone()), "{} dispatched twice", name);
            prop_assert_eq!(scheduler.deps_satisfied(&name), Some(true));

            let outcome = if failures[index_of(&name)] {
                StepOutcome::Failed(1)
            } else {
                StepOutcome::Success
            };
            let step = scheduler.handle_completion(&name, outcome);
            ready.extend(step.newly_scheduled.into_iter().map(|s| s.name));
        }

        prop_assert!(scheduler.is_finished());
        prop_assert!(!scheduler.has_running());

        for step in &dag.steps {
            let state = scheduler.state_of(&step.name).unwrap();
            prop_assert!(state.is_terminal(), "{} left in {:?}", step.name, state);

            let any_dep_bad = step.after.iter().any(|d| {
                !scheduler.state_of(d).unwrap().satisfies_dependents()
            });
            if any_dep_bad {
                prop_assert_eq!(state, RunState::Canceled);
            } else {
                prop_assert!(dispatched.contains(&step.name));
            }
        }

        let expect_failed = dag
            .steps
            .iter()
            .any(|s| failures[index_of(&s.name)] && dispatched.contains(&s.name));
        prop_assert_eq!(scheduler.any_failed(), expect_failed);
    }
}
