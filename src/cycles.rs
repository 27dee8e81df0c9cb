//! Circular-dependency detection.
//!
//! Classic three-color depth-first search over the dependency graph. Nodes
//! start white, turn gray while on the recursion path and black once fully
//! explored; an edge into a gray node closes a cycle. The path stack is
//! bounded by `max_depth`: a branch that would exceed it is abandoned with a
//! `depth-limit-exceeded` diagnostic, so callers can always tell "no cycle
//! found" apart from "search truncated". Black nodes are never re-expanded,
//! which keeps one top-level traversal at O(V+E).

use crate::diagnostics::Diagnostic;
use crate::model::{Cycle, CycleSearch, DependencyGraph};
use std::collections::{HashMap, HashSet};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

struct Frame<'a> {
    id: &'a str,
    next_edge: usize,
}

pub fn detect(graph: &DependencyGraph, max_depth: usize) -> CycleSearch {
    let adjacency = graph.adjacency();
    let mut color: HashMap<&str, Color> = graph
        .units
        .keys()
        .map(|id| (id.as_str(), Color::White))
        .collect();

    let mut search = CycleSearch::default();
    let mut seen_cycles: HashSet<Vec<String>> = HashSet::new();
    let mut abandoned: HashSet<&str> = HashSet::new();
    let max_depth = max_depth.max(1);

    // BTreeMap key order fixes the traversal root order, and each node's
    // outgoing edges are already sorted by target, so the whole search is
    // deterministic.
    for start in graph.units.keys() {
        if color[start.as_str()] != Color::White {
            continue;
        }
        let mut stack: Vec<Frame> = Vec::new();
        let mut path: Vec<String> = Vec::new();
        color.insert(start.as_str(), Color::Gray);
        path.push(start.clone());
        stack.push(Frame {
            id: start.as_str(),
            next_edge: 0,
        });

        while let Some(frame) = stack.last_mut() {
            let edges = adjacency.get(frame.id).map(|v| v.as_slice()).unwrap_or(&[]);
            if frame.next_edge >= edges.len() {
                color.insert(frame.id, Color::Black);
                path.pop();
                stack.pop();
                continue;
            }
            let edge = edges[frame.next_edge];
            frame.next_edge += 1;
            let to = edge.to_unit_id.as_str();
            match color.get(to).copied().unwrap_or(Color::Black) {
                Color::Gray => {
                    let Some(pos) = path.iter().position(|id| id == to) else {
                        continue;
                    };
                    let slice = &path[pos..];
                    if slice.len() < 2 {
                        continue;
                    }
                    let cycle = Cycle::from_path(slice);
                    if seen_cycles.insert(cycle.nodes.clone()) {
                        search.cycles.push(cycle);
                    }
                }
                Color::White => {
                    if path.len() + 1 > max_depth {
                        search.truncated = true;
                        if abandoned.insert(to) {
                            search
                                .diagnostics
                                .push(Diagnostic::depth_limit_exceeded(to, max_depth));
                        }
                        continue;
                    }
                    color.insert(to, Color::Gray);
                    path.push(to.to_string());
                    stack.push(Frame {
                        id: to,
                        next_edge: 0,
                    });
                }
                Color::Black => {}
            }
        }
    }

    search
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DependencyEdge, EdgeKind, SourceUnit, UnitKind};

    fn graph_of(edges: &[(&str, &str)]) -> DependencyGraph {
        let mut graph = DependencyGraph::default();
        for (from, to) in edges {
            for id in [from, to] {
                graph.units.entry(id.to_string()).or_insert(SourceUnit {
                    id: id.to_string(),
                    qualified_name: id.to_string(),
                    file_path: format!("{id}.py"),
                    language: "python".to_string(),
                    kind: UnitKind::Module,
                    line_count: 10,
                });
            }
            graph
                .edges
                .insert(DependencyEdge::new(*from, *to, EdgeKind::Import));
        }
        graph
    }

    #[test]
    fn acyclic_graph_reports_nothing() {
        let graph = graph_of(&[("a", "b"), ("b", "c"), ("a", "c")]);
        let search = detect(&graph, 10);
        assert!(search.cycles.is_empty());
        assert!(!search.truncated);
        assert!(search.diagnostics.is_empty());
    }

    #[test]
    fn triangle_reports_one_rotated_cycle() {
        let graph = graph_of(&[("b", "c"), ("c", "a"), ("a", "b"), ("d", "a")]);
        let search = detect(&graph, 10);
        assert_eq!(search.cycles.len(), 1);
        let cycle = &search.cycles[0];
        assert_eq!(cycle.nodes, vec!["a", "b", "c"]);
        assert_eq!(cycle.length, 3);
        assert!(!search.truncated);
        assert!(!cycle.nodes.iter().any(|id| id == "d"));
    }

    #[test]
    fn two_node_cycle_detected() {
        let graph = graph_of(&[("x", "y"), ("y", "x")]);
        let search = detect(&graph, 10);
        assert_eq!(search.cycles.len(), 1);
        assert_eq!(search.cycles[0].nodes, vec!["x", "y"]);
    }

    #[test]
    fn node_in_two_cycles_reported_twice() {
        // a -> b -> a and a -> c -> a share node a.
        let graph = graph_of(&[("a", "b"), ("b", "a"), ("a", "c"), ("c", "a")]);
        let search = detect(&graph, 10);
        assert_eq!(search.cycles.len(), 2);
    }

    #[test]
    fn depth_limit_sets_truncated_instead_of_false_negative() {
        // Cycle of length 5 with max_depth 3: must not claim "no cycle"
        // without flagging the truncation.
        let graph = graph_of(&[("a", "b"), ("b", "c"), ("c", "d"), ("d", "e"), ("e", "a")]);
        let search = detect(&graph, 3);
        assert!(search.cycles.is_empty());
        assert!(search.truncated);
        assert!(
            search
                .diagnostics
                .iter()
                .any(|d| d.category == "depth-limit-exceeded")
        );
    }

    #[test]
    fn deep_enough_limit_still_finds_the_long_cycle() {
        let graph = graph_of(&[("a", "b"), ("b", "c"), ("c", "d"), ("d", "e"), ("e", "a")]);
        let search = detect(&graph, 10);
        assert_eq!(search.cycles.len(), 1);
        assert_eq!(search.cycles[0].length, 5);
        assert!(!search.truncated);
    }

    #[test]
    fn detection_is_deterministic() {
        let graph = graph_of(&[("m", "n"), ("n", "m"), ("p", "q"), ("q", "p"), ("m", "p")]);
        let first = detect(&graph, 10);
        let second = detect(&graph, 10);
        let nodes =
            |search: &CycleSearch| search.cycles.iter().map(|c| c.nodes.clone()).collect::<Vec<_>>();
        assert_eq!(nodes(&first), nodes(&second));
    }
}
