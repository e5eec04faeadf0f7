//! Antichain decomposition for parallel delete scheduling.
//!
//! Given the set of states condemned in one run, deletions must proceed from
//! leaves toward roots: a resource may only be deleted once everything that
//! depends on it is gone. Within one antichain no element depends on another,
//! so its deletions may run concurrently.

use std::collections::{HashMap, HashSet};

use converge_core::{ResourceState, Urn};
use tracing::debug;

/// Decomposes `condemned` into antichains ordered for deletion.
///
/// Each returned batch holds indices into `condemned`. Batches are ordered so
/// that every resource's dependents appear in an earlier batch; elements of
/// one batch are pairwise independent.
#[must_use]
pub fn delete_antichains(condemned: &[&ResourceState]) -> Vec<Vec<usize>> {
    let by_urn: HashMap<&Urn, usize> = condemned
        .iter()
        .enumerate()
        .map(|(i, r)| (&r.urn, i))
        .collect();

    let mut remaining: HashSet<usize> = (0..condemned.len()).collect();
    let mut peeled: Vec<Vec<usize>> = Vec::new();

    while !remaining.is_empty() {
        // Peel everything whose outgoing edges all point outside the
        // remaining set.
        let mut batch: Vec<usize> = remaining
            .iter()
            .copied()
            .filter(|&i| {
                condemned[i]
                    .all_dependencies()
                    .all(|dep| by_urn.get(dep).is_none_or(|j| !remaining.contains(j)))
            })
            .collect();

        if batch.is_empty() {
            // A dependency cycle among condemned states; fall back to one
            // batch per remaining element in list order.
            let mut rest: Vec<usize> = remaining.drain().collect();
            rest.sort_unstable();
            for i in rest.into_iter().rev() {
                peeled.push(vec![i]);
            }
            break;
        }

        batch.sort_unstable();
        for &i in &batch {
            remaining.remove(&i);
        }
        peeled.push(batch);
    }

    peeled.reverse();
    debug!(states = condemned.len(), batches = peeled.len(), "scheduled deletions");
    peeled
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn urn(name: &str) -> Urn {
        format!("urn:deploy:dev::web::::t:m:R::{name}").parse().unwrap()
    }

    fn res(name: &str, deps: &[&str]) -> Arc<ResourceState> {
        let mut state = ResourceState::new(urn(name));
        state.dependencies = deps.iter().map(|d| urn(d)).collect();
        Arc::new(state)
    }

    fn batches_of_names(list: &[Arc<ResourceState>]) -> Vec<Vec<String>> {
        let refs: Vec<&ResourceState> = list.iter().map(AsRef::as_ref).collect();
        delete_antichains(&refs)
            .into_iter()
            .map(|batch| {
                batch
                    .into_iter()
                    .map(|i| refs[i].urn.name().to_string())
                    .collect()
            })
            .collect()
    }

    #[test]
    fn chain_deletes_leaves_first() {
        // c depends on b depends on a: delete c, then b, then a.
        let list = vec![res("a", &[]), res("b", &["a"]), res("c", &["b"])];
        assert_eq!(
            batches_of_names(&list),
            vec![vec!["c"], vec!["b"], vec!["a"]]
        );
    }

    #[test]
    fn independent_states_share_a_batch() {
        let list = vec![res("a", &[]), res("b", &[]), res("c", &["a", "b"])];
        assert_eq!(batches_of_names(&list), vec![vec!["c"], vec!["a", "b"]]);
    }

    #[test]
    fn dependencies_outside_the_set_are_ignored() {
        // b depends on x, which is not condemned.
        let list = vec![res("b", &["x"])];
        assert_eq!(batches_of_names(&list), vec![vec!["b"]]);
    }

    #[test]
    fn no_batch_contains_a_dependency_pair() {
        let list = vec![
            res("a", &[]),
            res("b", &["a"]),
            res("c", &["a"]),
            res("d", &["b", "c"]),
        ];
        let refs: Vec<&ResourceState> = list.iter().map(AsRef::as_ref).collect();
        for batch in delete_antichains(&refs) {
            for &i in &batch {
                for &j in &batch {
                    if i == j {
                        continue;
                    }
                    let depends = refs[i].all_dependencies().any(|d| d == &refs[j].urn);
                    assert!(!depends, "batch holds dependent pair {i} -> {j}");
                }
            }
        }
    }

    #[test]
    fn empty_input_yields_no_batches() {
        assert!(delete_antichains(&[]).is_empty());
    }
}
