use std::collections::HashSet;
use tracing::debug;

use crate::graph::DependencyGraph;
use crate::types::{UnitId, ValidationTask};

/// Dependency-aware regression test selection.
///
/// Selection is safety-conservative: it may re-validate more than strictly
/// necessary, but never skips a task whose target could be affected by a
/// change. Returned tasks keep the deterministic (unit-id sorted) order of
/// the impact set.
pub fn select(
    changed: &[UnitId],
    graph: &DependencyGraph,
    all_tasks: &[ValidationTask],
) -> Vec<ValidationTask> {
    if changed.is_empty() {
        return Vec::new();
    }

    let impact = graph.impact_set(changed);
    debug!(
        "Impact set for {} changed unit(s): {} unit(s)",
        changed.len(),
        impact.len()
    );
    let impacted: HashSet<&UnitId> = impact.iter().collect();

    let mut selected: Vec<ValidationTask> = all_tasks
        .iter()
        .filter(|task| impacted.contains(&task.unit_id))
        .cloned()
        .collect();
    selected.sort_by(|a, b| a.unit_id.cmp(&b.unit_id));
    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> UnitId {
        UnitId::from(s)
    }

    fn tasks_for(names: &[&str]) -> Vec<ValidationTask> {
        names.iter().map(|n| ValidationTask::new(id(n))).collect()
    }

    #[test]
    fn test_empty_change_selects_nothing() {
        let graph = DependencyGraph::new();
        graph.add_edge(id("b"), id("a"));
        let tasks = tasks_for(&["a", "b"]);

        assert!(select(&[], &graph, &tasks).is_empty());
    }

    #[test]
    fn test_edgeless_graph_selects_exactly_changed() {
        let graph = DependencyGraph::new();
        for n in ["a", "b", "c"] {
            graph.add_unit(id(n));
        }
        let tasks = tasks_for(&["a", "b", "c"]);

        let selected = select(&[id("b")], &graph, &tasks);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].unit_id, id("b"));
    }

    #[test]
    fn test_dependents_are_selected() {
        // b depends on a; changing a re-validates both
        let graph = DependencyGraph::new();
        graph.add_edge(id("b"), id("a"));
        let tasks = tasks_for(&["a", "b"]);

        let selected = select(&[id("a")], &graph, &tasks);
        let ids: Vec<&UnitId> = selected.iter().map(|t| &t.unit_id).collect();
        assert_eq!(ids, vec![&id("a"), &id("b")]);
    }

    #[test]
    fn test_unrelated_tasks_not_selected() {
        let graph = DependencyGraph::new();
        graph.add_edge(id("b"), id("a"));
        graph.add_unit(id("z"));
        let tasks = tasks_for(&["a", "b", "z"]);

        let selected = select(&[id("a")], &graph, &tasks);
        assert!(selected.iter().all(|t| t.unit_id != id("z")));
    }

    #[test]
    fn test_units_without_tasks_are_skipped() {
        let graph = DependencyGraph::new();
        graph.add_edge(id("b"), id("a"));
        let tasks = tasks_for(&["b"]); // no task registered for a

        let selected = select(&[id("a")], &graph, &tasks);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].unit_id, id("b"));
    }
}
