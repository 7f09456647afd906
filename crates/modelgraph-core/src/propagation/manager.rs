use std::collections::{HashMap, HashSet, VecDeque};

use parking_lot::RwLock;
use tracing::trace;

/// Tracks property dependencies using a bidirectional adjacency structure.
///
/// Edges keep declaration order so notification order is deterministic.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// source -> properties that depend on it (edges out)
    forward: RwLock<HashMap<String, Vec<String>>>,
    /// dependent -> properties it depends on (edges in)
    reverse: RwLock<HashMap<String, Vec<String>>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare that `dependent` must be re-notified whenever any of `sources` changes.
    pub fn depend_on(&self, dependent: &str, sources: &[&str]) {
        for source in sources {
            self.add_edge(source, dependent);
        }
    }

    /// Add a single `source -> dependent` edge (idempotent).
    pub fn add_edge(&self, source: &str, dependent: &str) {
        let mut fwd = self.forward.write();
        let mut rev = self.reverse.write();

        let out = fwd.entry(source.to_string()).or_default();
        if !out.iter().any(|d| d == dependent) {
            out.push(dependent.to_string());
        }
        let inc = rev.entry(dependent.to_string()).or_default();
        if !inc.iter().any(|s| s == source) {
            inc.push(source.to_string());
        }
    }

    /// Properties that directly depend on `source`.
    pub fn dependents_of(&self, source: &str) -> Vec<String> {
        self.forward.read().get(source).cloned().unwrap_or_default()
    }

    /// Properties that `dependent` directly depends on.
    pub fn sources_of(&self, dependent: &str) -> Vec<String> {
        self.reverse.read().get(dependent).cloned().unwrap_or_default()
    }

    pub fn contains_edge(&self, source: &str, dependent: &str) -> bool {
        self.forward
            .read()
            .get(source)
            .map(|out| out.iter().any(|d| d == dependent))
            .unwrap_or(false)
    }

    pub fn edge_count(&self) -> usize {
        self.forward.read().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.edge_count() == 0
    }
}

/// Walks the dependency graph for a batch of changed properties.
#[derive(Debug, Default)]
pub struct PropagationManager {
    graph: DependencyGraph,
}

impl PropagationManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_graph(graph: DependencyGraph) -> Self {
        Self { graph }
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Calls `emit` for every changed property and then every transitive dependent.
    ///
    /// Breadth-first from `changed` in order; each name is emitted at most once,
    /// so cycles terminate. No lock is held while `emit` runs. Returns the
    /// emitted names in emission order.
    pub fn propagate<S, F>(&self, changed: &[S], mut emit: F) -> Vec<String>
    where
        S: AsRef<str>,
        F: FnMut(&str),
    {
        let mut visited: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<String> =
            changed.iter().map(|s| s.as_ref().to_string()).collect();
        let mut order = Vec::new();

        while let Some(name) = queue.pop_front() {
            if !visited.insert(name.clone()) {
                continue;
            }
            emit(&name);
            for dependent in self.graph.dependents_of(&name) {
                if !visited.contains(&dependent) {
                    queue.push_back(dependent);
                }
            }
            order.push(name);
        }

        trace!(count = order.len(), "propagated property changes");
        order
    }

    /// Same traversal as `propagate`, without emitting.
    pub fn impacted<S: AsRef<str>>(&self, changed: &[S]) -> Vec<String> {
        self.propagate(changed, |_| {})
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_notifies_in_breadth_first_order() {
        let manager = PropagationManager::new();
        manager.graph().depend_on("full_name", &["name", "last_name"]);
        manager.graph().depend_on("greeting", &["full_name"]);

        let mut seen = Vec::new();
        let order = manager.propagate(&["name"], |p| seen.push(p.to_string()));
        assert_eq!(order, vec!["name", "full_name", "greeting"]);
        assert_eq!(seen, order);
        assert_eq!(manager.graph().sources_of("full_name"), vec!["name", "last_name"]);
    }

    #[test]
    fn diamond_emits_each_property_once() {
        let manager = PropagationManager::new();
        manager.graph().depend_on("b", &["a"]);
        manager.graph().depend_on("c", &["a"]);
        manager.graph().depend_on("d", &["b", "c"]);

        let order = manager.impacted(&["a"]);
        assert_eq!(order, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn cycle_terminates() {
        let manager = PropagationManager::new();
        manager.graph().depend_on("a", &["b"]);
        manager.graph().depend_on("b", &["a"]);

        let order = manager.impacted(&["a"]);
        assert_eq!(order, vec!["a", "b"]);
    }

    #[test]
    fn batch_deduplicates_changed_names() {
        let manager = PropagationManager::new();
        manager.graph().depend_on("full_name", &["name", "last_name"]);

        let order = manager.impacted(&["name", "last_name", "name"]);
        assert_eq!(order, vec!["name", "last_name", "full_name"]);
    }

    #[test]
    fn duplicate_edges_are_ignored() {
        let graph = DependencyGraph::new();
        graph.add_edge("a", "b");
        graph.add_edge("a", "b");
        assert_eq!(graph.edge_count(), 1);
        assert!(graph.contains_edge("a", "b"));
        assert!(!graph.contains_edge("b", "a"));
    }
}
