use parking_lot::RwLock;
use petgraph::algo::tarjan_scc;
use petgraph::graphmap::DiGraphMap;
use petgraph::Direction;
use std::collections::{HashMap, HashSet, VecDeque};

use crate::types::UnitId;

/// Interned unit-level dependency graph.
///
/// An edge A -> B means "A's transpiled correctness may depend on B".
/// Strongly-connected components are recomputed once per mutation and
/// collapsed into atomic impact nodes, so cycles never cause non-termination
/// and no edge is ever silently dropped.
pub struct DependencyGraph {
    inner: RwLock<Inner>,
}

struct Inner {
    graph: DiGraphMap<usize, ()>,
    ids: Vec<UnitId>,
    index_of: HashMap<UnitId, usize>,
    /// Component index per node, rebuilt lazily after mutation
    scc: Option<Vec<usize>>,
}

impl Inner {
    fn intern(&mut self, id: &UnitId) -> usize {
        if let Some(&idx) = self.index_of.get(id) {
            return idx;
        }
        let idx = self.ids.len();
        self.ids.push(id.clone());
        self.index_of.insert(id.clone(), idx);
        self.graph.add_node(idx);
        self.scc = None;
        idx
    }

    fn components(&mut self) -> Vec<usize> {
        if let Some(comp_of) = &self.scc {
            return comp_of.clone();
        }
        let sccs = tarjan_scc(&self.graph);
        let mut comp_of = vec![0usize; self.ids.len()];
        for (comp, members) in sccs.iter().enumerate() {
            for &node in members {
                comp_of[node] = comp;
            }
        }
        self.scc = Some(comp_of.clone());
        comp_of
    }
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                graph: DiGraphMap::new(),
                ids: Vec::new(),
                index_of: HashMap::new(),
                scc: None,
            }),
        }
    }

    /// Rebuild a graph from a persisted edge list
    pub fn from_edges(edges: &[(UnitId, UnitId)]) -> Self {
        let graph = Self::new();
        for (from, to) in edges {
            graph.add_edge(from.clone(), to.clone());
        }
        graph
    }

    /// Register a unit with no edges yet
    pub fn add_unit(&self, id: UnitId) {
        self.inner.write().intern(&id);
    }

    /// Record that `from` depends on `to`
    pub fn add_edge(&self, from: UnitId, to: UnitId) {
        let mut inner = self.inner.write();
        let a = inner.intern(&from);
        let b = inner.intern(&to);
        inner.graph.add_edge(a, b, ());
        inner.scc = None;
    }

    /// Transitive closure of units affected by a change: everything reachable
    /// by following edges backward from any changed unit, plus the changed
    /// units themselves. Returned sorted by unit id for deterministic logging.
    pub fn impact_set(&self, changed: &[UnitId]) -> Vec<UnitId> {
        if changed.is_empty() {
            return Vec::new();
        }

        let mut inner = self.inner.write();
        let comp_of = inner.components();

        // Seed with the changed units; unknown units still count as impacted
        // (they are new or renamed)
        let mut frontier: VecDeque<usize> = VecDeque::new();
        let mut unknown: Vec<UnitId> = Vec::new();
        for id in changed {
            match inner.index_of.get(id) {
                Some(&node) => frontier.push_back(node),
                None => unknown.push(id.clone()),
            }
        }

        // Backward BFS, expanding whole strongly-connected components so a
        // cycle is treated as one atomic impact node
        let mut seen_nodes: HashSet<usize> = HashSet::new();
        while let Some(node) = frontier.pop_front() {
            if !seen_nodes.insert(node) {
                continue;
            }
            let comp = comp_of[node];
            for (other, &other_comp) in comp_of.iter().enumerate() {
                if other_comp == comp && !seen_nodes.contains(&other) {
                    frontier.push_back(other);
                }
            }
            for dependent in inner.graph.neighbors_directed(node, Direction::Incoming) {
                if !seen_nodes.contains(&dependent) {
                    frontier.push_back(dependent);
                }
            }
        }

        let mut result: Vec<UnitId> = seen_nodes
            .into_iter()
            .map(|node| inner.ids[node].clone())
            .chain(unknown)
            .collect();
        result.sort();
        result.dedup();
        result
    }

    /// Direct dependents of a unit (read-only diagnostic query)
    pub fn dependents_of(&self, id: &UnitId) -> Vec<UnitId> {
        let inner = self.inner.read();
        let Some(&node) = inner.index_of.get(id) else {
            return Vec::new();
        };
        let mut result: Vec<UnitId> = inner
            .graph
            .neighbors_directed(node, Direction::Incoming)
            .map(|n| inner.ids[n].clone())
            .collect();
        result.sort();
        result
    }

    /// Direct dependencies of a unit (read-only diagnostic query)
    pub fn dependencies_of(&self, id: &UnitId) -> Vec<UnitId> {
        let inner = self.inner.read();
        let Some(&node) = inner.index_of.get(id) else {
            return Vec::new();
        };
        let mut result: Vec<UnitId> = inner
            .graph
            .neighbors_directed(node, Direction::Outgoing)
            .map(|n| inner.ids[n].clone())
            .collect();
        result.sort();
        result
    }

    pub fn unit_count(&self) -> usize {
        self.inner.read().ids.len()
    }

    pub fn edge_count(&self) -> usize {
        self.inner.read().graph.edge_count()
    }

    /// Edge list for cross-run persistence, sorted for determinism
    pub fn edges(&self) -> Vec<(UnitId, UnitId)> {
        let inner = self.inner.read();
        let mut edges: Vec<(UnitId, UnitId)> = inner
            .graph
            .all_edges()
            .map(|(a, b, _)| (inner.ids[a].clone(), inner.ids[b].clone()))
            .collect();
        edges.sort();
        edges
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> UnitId {
        UnitId::from(s)
    }

    #[test]
    fn test_empty_changed_set_has_empty_impact() {
        let graph = DependencyGraph::new();
        graph.add_edge(id("b"), id("a"));
        assert!(graph.impact_set(&[]).is_empty());
    }

    #[test]
    fn test_impact_includes_changed_units() {
        let graph = DependencyGraph::new();
        graph.add_unit(id("a"));
        assert_eq!(graph.impact_set(&[id("a")]), vec![id("a")]);
    }

    #[test]
    fn test_edgeless_graph_degenerates_to_changed_units() {
        let graph = DependencyGraph::new();
        for name in ["a", "b", "c"] {
            graph.add_unit(id(name));
        }
        assert_eq!(graph.impact_set(&[id("b")]), vec![id("b")]);
    }

    #[test]
    fn test_change_propagates_to_dependents() {
        // b depends on a: changing a impacts both
        let graph = DependencyGraph::new();
        graph.add_edge(id("b"), id("a"));

        assert_eq!(graph.impact_set(&[id("a")]), vec![id("a"), id("b")]);
        // Changing b impacts only b; a does not depend on b
        assert_eq!(graph.impact_set(&[id("b")]), vec![id("b")]);
    }

    #[test]
    fn test_transitive_impact() {
        // c -> b -> a
        let graph = DependencyGraph::new();
        graph.add_edge(id("c"), id("b"));
        graph.add_edge(id("b"), id("a"));

        assert_eq!(
            graph.impact_set(&[id("a")]),
            vec![id("a"), id("b"), id("c")]
        );
        assert_eq!(graph.impact_set(&[id("b")]), vec![id("b"), id("c")]);
    }

    #[test]
    fn test_cycle_terminates_and_collapses() {
        // a <-> b cycle, c depends on a
        let graph = DependencyGraph::new();
        graph.add_edge(id("a"), id("b"));
        graph.add_edge(id("b"), id("a"));
        graph.add_edge(id("c"), id("a"));

        // Changing b pulls in its whole component plus dependents
        assert_eq!(
            graph.impact_set(&[id("b")]),
            vec![id("a"), id("b"), id("c")]
        );
    }

    #[test]
    fn test_unknown_changed_unit_still_reported() {
        let graph = DependencyGraph::new();
        graph.add_edge(id("b"), id("a"));
        assert_eq!(graph.impact_set(&[id("new")]), vec![id("new")]);
    }

    #[test]
    fn test_diagnostic_queries() {
        let graph = DependencyGraph::new();
        graph.add_edge(id("b"), id("a"));
        graph.add_edge(id("c"), id("a"));

        assert_eq!(graph.dependents_of(&id("a")), vec![id("b"), id("c")]);
        assert_eq!(graph.dependencies_of(&id("b")), vec![id("a")]);
        assert_eq!(graph.unit_count(), 3);
        assert_eq!(graph.edge_count(), 2);
    }

    #[test]
    fn test_edge_list_roundtrip() {
        let graph = DependencyGraph::new();
        graph.add_edge(id("b"), id("a"));
        graph.add_edge(id("c"), id("b"));

        let rebuilt = DependencyGraph::from_edges(&graph.edges());
        assert_eq!(rebuilt.edges(), graph.edges());
        assert_eq!(
            rebuilt.impact_set(&[id("a")]),
            vec![id("a"), id("b"), id("c")]
        );
    }
}
