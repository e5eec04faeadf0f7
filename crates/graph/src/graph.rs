//! Dependency queries over a snapshot's resource list.
//!
//! The resource list is kept in registration order, which is a topological
//! order of the dependency relation; every query below leans on that order
//! instead of materializing adjacency both ways.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use converge_core::{ResourceState, Urn};
use petgraph::algo::is_cyclic_directed;
use petgraph::graph::DiGraph;
use tracing::debug;

use crate::error::{Error, Result};

/// Dependency graph over an ordered resource list.
///
/// The list order is the topological witness: a resource may only depend on
/// resources listed before it.
pub struct DependencyGraph<'a> {
    resources: &'a [Arc<ResourceState>],
    by_urn: HashMap<&'a Urn, usize>,
}

impl<'a> DependencyGraph<'a> {
    /// Builds the graph over `resources` in registration order.
    ///
    /// When several entries share a URN (a condemned copy next to its live
    /// successor), the earliest entry wins the index; queries by URN resolve
    /// to it.
    #[must_use]
    pub fn new(resources: &'a [Arc<ResourceState>]) -> Self {
        let mut by_urn = HashMap::with_capacity(resources.len());
        for (i, r) in resources.iter().enumerate() {
            by_urn.entry(&r.urn).or_insert(i);
        }
        Self { resources, by_urn }
    }

    /// The resources this graph was built over.
    #[must_use]
    pub fn resources(&self) -> &'a [Arc<ResourceState>] {
        self.resources
    }

    /// Whether `urn` names a resource in the list.
    #[must_use]
    pub fn contains(&self, urn: &Urn) -> bool {
        self.by_urn.contains_key(urn)
    }

    /// The resources `resource` directly depends on: parent, dependencies,
    /// property dependencies, and `deletedWith`, resolved through the list.
    ///
    /// URNs that do not resolve (e.g. references to resources deleted in the
    /// same run) are skipped.
    #[must_use]
    pub fn dependencies_of(&self, resource: &ResourceState) -> Vec<&'a Arc<ResourceState>> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for urn in resource.all_dependencies() {
            if let Some(&i) = self.by_urn.get(urn) {
                if seen.insert(i) {
                    out.push(&self.resources[i]);
                }
            }
        }
        out
    }

    /// The transitive set of resources listed after `roots` that depend on
    /// them, in list order.
    ///
    /// A candidate joins the set when any of its dependency edges touches the
    /// growing set, or, with `include_children`, when its parent is in the
    /// set. `excluded` URNs never join.
    #[must_use]
    pub fn depending_on(
        &self,
        roots: &[&Urn],
        excluded: &HashSet<Urn>,
        include_children: bool,
    ) -> Vec<&'a Arc<ResourceState>> {
        let mut set: HashSet<&Urn> = roots.iter().copied().collect();
        let start = roots
            .iter()
            .filter_map(|u| self.by_urn.get(*u).copied())
            .min()
            .unwrap_or(self.resources.len());

        let mut out = Vec::new();
        for r in &self.resources[start..] {
            if set.contains(&r.urn) || excluded.contains(&r.urn) {
                continue;
            }
            let touches = r.all_dependencies().any(|d| set.contains(d))
                || (include_children
                    && r.parent.as_ref().is_some_and(|p| set.contains(p)));
            if touches {
                set.insert(&r.urn);
                out.push(r);
            }
        }
        debug!(roots = roots.len(), dependents = out.len(), "computed dependent set");
        out
    }

    /// Validates that the list order is a topological order and the relation
    /// is acyclic.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first forward reference, or a cycle error
    /// when the relation loops through aliases of the same list positions.
    pub fn validate(&self) -> Result<()> {
        let mut graph: DiGraph<usize, ()> = DiGraph::new();
        let nodes: Vec<_> = (0..self.resources.len()).map(|i| graph.add_node(i)).collect();

        for (i, r) in self.resources.iter().enumerate() {
            for dep in r.all_dependencies() {
                let Some(&j) = self.by_urn.get(dep) else {
                    continue;
                };
                if j > i {
                    return Err(Error::ForwardReference {
                        resource: r.urn.to_string(),
                        dependency: dep.to_string(),
                    });
                }
                if j != i {
                    graph.add_edge(nodes[i], nodes[j], ());
                }
            }
        }

        if is_cyclic_directed(&graph) {
            return Err(Error::CycleDetected);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use converge_core::PropertyMap;

    fn urn(name: &str) -> Urn {
        format!("urn:deploy:dev::web::::t:m:R::{name}").parse().unwrap()
    }

    fn res(name: &str, deps: &[&str]) -> Arc<ResourceState> {
        let mut state = ResourceState::new(urn(name));
        state.custom = true;
        state.inputs = PropertyMap::new();
        state.dependencies = deps.iter().map(|d| urn(d)).collect();
        Arc::new(state)
    }

    fn child(name: &str, parent: &str) -> Arc<ResourceState> {
        let mut state = ResourceState::new(urn(name));
        state.parent = Some(urn(parent));
        Arc::new(state)
    }

    #[test]
    fn dependencies_resolve_through_the_list() {
        let list = vec![res("a", &[]), res("b", &["a"]), res("c", &["a", "b"])];
        let graph = DependencyGraph::new(&list);

        let deps = graph.dependencies_of(&list[2]);
        let names: Vec<&str> = deps.iter().map(|r| r.urn.name()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(graph.dependencies_of(&list[0]).is_empty());
    }

    #[test]
    fn depending_on_walks_forward_transitively() {
        let list = vec![res("a", &[]), res("b", &["a"]), res("c", &["b"]), res("d", &[])];
        let graph = DependencyGraph::new(&list);

        let root = urn("a");
        let dependents = graph.depending_on(&[&root], &HashSet::new(), false);
        let names: Vec<&str> = dependents.iter().map(|r| r.urn.name()).collect();
        assert_eq!(names, vec!["b", "c"]);
    }

    #[test]
    fn excluded_urns_never_join() {
        let list = vec![res("a", &[]), res("b", &["a"]), res("c", &["b"])];
        let graph = DependencyGraph::new(&list);

        let root = urn("a");
        let excluded: HashSet<Urn> = [urn("b")].into_iter().collect();
        let dependents = graph.depending_on(&[&root], &excluded, false);
        // With b excluded the chain to c is broken.
        assert!(dependents.is_empty());
    }

    #[test]
    fn children_join_only_when_requested() {
        let list = vec![res("a", &[]), child("kid", "a")];
        let graph = DependencyGraph::new(&list);

        let root = urn("a");
        let without = graph.depending_on(&[&root], &HashSet::new(), false);
        let with: Vec<&str> = graph
            .depending_on(&[&root], &HashSet::new(), true)
            .iter()
            .map(|r| r.urn.name())
            .collect();
        // The parent edge is part of all_dependencies, so the child joins
        // either way; include_children keeps that explicit for callers.
        assert_eq!(without.len(), 1);
        assert_eq!(with, vec!["kid"]);
    }

    #[test]
    fn validate_rejects_forward_references() {
        let list = vec![res("a", &["b"]), res("b", &[])];
        let graph = DependencyGraph::new(&list);
        assert!(graph.validate().is_err());
    }

    #[test]
    fn validate_accepts_registration_order() {
        let list = vec![res("a", &[]), res("b", &["a"]), res("c", &["a", "b"])];
        let graph = DependencyGraph::new(&list);
        assert!(graph.validate().is_ok());
    }
}
