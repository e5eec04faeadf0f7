//! Property-based tests for dependency graph invariants.
//!
//! These tests verify the behavioral contracts of the graph crate:
//! - Antichain batches never contain a dependent pair
//! - Every condemned state is scheduled exactly once
//! - Dependents are always scheduled before their dependencies
//! - `depending_on` only ever returns resources listed after the roots

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use converge_core::{ResourceState, Urn};
use converge_graph::{delete_antichains, DependencyGraph};
use proptest::prelude::*;

fn urn(i: usize) -> Urn {
    format!("urn:deploy:dev::web::::t:m:R::r{i}")
        .parse()
        .unwrap()
}

/// Generate a DAG as a list of dependency index sets; resource `i` may only
/// depend on resources with lower indices, which keeps the list a valid
/// registration order.
fn dag_strategy(max: usize) -> impl Strategy<Value = Vec<Vec<usize>>> {
    (1..=max).prop_flat_map(|n| {
        let per_node: Vec<_> = (0..n)
            .map(|i| {
                if i == 0 {
                    Just(Vec::new()).boxed()
                } else {
                    proptest::collection::vec(0..i, 0..=i.min(3))
                        .prop_map(|mut deps| {
                            deps.sort_unstable();
                            deps.dedup();
                            deps
                        })
                        .boxed()
                }
            })
            .collect();
        per_node
    })
}

fn materialize(dag: &[Vec<usize>]) -> Vec<Arc<ResourceState>> {
    dag.iter()
        .enumerate()
        .map(|(i, deps)| {
            let mut state = ResourceState::new(urn(i));
            state.dependencies = deps.iter().map(|&d| urn(d)).collect();
            Arc::new(state)
        })
        .collect()
}

proptest! {
    #[test]
    fn antichains_cover_every_state_exactly_once(dag in dag_strategy(12)) {
        let states = materialize(&dag);
        let refs: Vec<&ResourceState> = states.iter().map(AsRef::as_ref).collect();
        let batches = delete_antichains(&refs);

        let mut seen = HashSet::new();
        for batch in &batches {
            for &i in batch {
                prop_assert!(seen.insert(i), "state {i} scheduled twice");
            }
        }
        prop_assert_eq!(seen.len(), states.len());
    }

    #[test]
    fn antichain_batches_hold_no_dependent_pairs(dag in dag_strategy(12)) {
        let states = materialize(&dag);
        let refs: Vec<&ResourceState> = states.iter().map(AsRef::as_ref).collect();

        for batch in delete_antichains(&refs) {
            let members: HashSet<usize> = batch.iter().copied().collect();
            for &i in &batch {
                for dep in &dag[i] {
                    prop_assert!(
                        !members.contains(dep),
                        "batch holds {i} together with its dependency {dep}"
                    );
                }
            }
        }
    }

    #[test]
    fn dependents_are_deleted_before_their_dependencies(dag in dag_strategy(12)) {
        let states = materialize(&dag);
        let refs: Vec<&ResourceState> = states.iter().map(AsRef::as_ref).collect();
        let batches = delete_antichains(&refs);

        let mut batch_of: HashMap<usize, usize> = HashMap::new();
        for (b, batch) in batches.iter().enumerate() {
            for &i in batch {
                batch_of.insert(i, b);
            }
        }

        // If i depends on d, i must be deleted strictly earlier.
        for (i, deps) in dag.iter().enumerate() {
            for &d in deps {
                prop_assert!(
                    batch_of[&i] < batch_of[&d],
                    "dependent {i} scheduled at {} but dependency {d} at {}",
                    batch_of[&i],
                    batch_of[&d]
                );
            }
        }
    }

    #[test]
    fn depending_on_returns_only_later_resources(dag in dag_strategy(12)) {
        let states = materialize(&dag);
        let graph = DependencyGraph::new(&states);
        prop_assert!(graph.validate().is_ok());

        let root = urn(0);
        let dependents = graph.depending_on(&[&root], &HashSet::new(), false);
        for r in dependents {
            prop_assert!(r.urn != root);
            // Transitivity: some chain from r leads back to the root.
            let mut frontier = vec![r.as_ref().clone()];
            let mut reachable = false;
            let mut visited = HashSet::new();
            while let Some(cur) = frontier.pop() {
                if !visited.insert(cur.urn.clone()) {
                    continue;
                }
                if cur.all_dependencies().any(|d| *d == root) {
                    reachable = true;
                    break;
                }
                for dep in graph.dependencies_of(&cur) {
                    frontier.push(dep.as_ref().clone());
                }
            }
            prop_assert!(reachable, "{} does not reach the root", r.urn);
        }
    }
}
