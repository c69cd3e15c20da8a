//! Directed-graph primitives: adjacency construction, Tarjan SCCs, bounded
//! cycle enumeration, and BFS reachability.
//!
//! Nothing here knows about stories. Every traversal runs on an explicit
//! work stack so authored graphs of any depth cannot overflow the call stack.

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

/// Upper bound on the cycles reported by [`find_cycles`].
pub const MAX_REPORTED_CYCLES: usize = 10;

const UNVISITED: usize = usize::MAX;

/// Adjacency-list graph over string node ids. Immutable once built.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: Vec<String>,
    index: FxHashMap<String, usize>,
    adjacency: Vec<Vec<usize>>,
}

/// A maximal set of mutually reachable nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StronglyConnectedComponent {
    pub id: usize,
    pub nodes: Vec<String>,
    /// More than one member, or a single member with a self-edge.
    pub is_loop: bool,
}

/// A simple loop, listed from the node where it re-enters the DFS path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cycle {
    pub nodes: Vec<String>,
}

impl Graph {
    /// Node ids in insertion order.
    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn edge_count(&self) -> usize {
        self.adjacency.iter().map(Vec::len).sum()
    }

    /// Outgoing neighbours of `id`; empty for unknown ids.
    pub fn successors<'a>(&'a self, id: &str) -> impl Iterator<Item = &'a str> + 'a {
        let targets: &'a [usize] = match self.index.get(id) {
            Some(&i) => &self.adjacency[i],
            None => &[],
        };
        targets.iter().map(move |&t| self.nodes[t].as_str())
    }

    /// All edges as `(source, target)` pairs, grouped by source.
    pub fn edges(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.adjacency.iter().enumerate().flat_map(move |(s, targets)| {
            targets
                .iter()
                .map(move |&t| (self.nodes[s].as_str(), self.nodes[t].as_str()))
        })
    }

    pub fn has_self_loop(&self, id: &str) -> bool {
        self.index
            .get(id)
            .is_some_and(|&i| self.adjacency[i].contains(&i))
    }
}

/// Build an adjacency list from node ids and `(source, target)` pairs.
///
/// Every node gets an entry even without outgoing edges. Duplicate node ids
/// keep their first position. Edges with an endpoint outside `node_ids` are
/// dropped, so the node set stays closed under the edge relation.
pub fn build_graph<I, S, E, A, B>(node_ids: I, edges: E) -> Graph
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
    E: IntoIterator<Item = (A, B)>,
    A: AsRef<str>,
    B: AsRef<str>,
{
    let mut graph = Graph::default();

    for id in node_ids {
        let id = id.into();
        if graph.index.contains_key(&id) {
            continue;
        }
        graph.index.insert(id.clone(), graph.nodes.len());
        graph.nodes.push(id);
        graph.adjacency.push(Vec::new());
    }

    for (source, target) in edges {
        let (source, target) = (source.as_ref(), target.as_ref());
        match (graph.index.get(source), graph.index.get(target)) {
            (Some(&s), Some(&t)) => graph.adjacency[s].push(t),
            _ => tracing::warn!(source, target, "dropping edge with unknown endpoint"),
        }
    }

    graph
}

/// Tarjan's algorithm, iterative.
///
/// Components come out in reverse topological order of the condensation:
/// a component is emitted only after every component it can reach.
pub fn find_strongly_connected_components(graph: &Graph) -> Vec<StronglyConnectedComponent> {
    let n = graph.len();
    let mut index = vec![UNVISITED; n];
    let mut lowlink = vec![0usize; n];
    let mut on_stack = vec![false; n];
    let mut stack: Vec<usize> = Vec::new();
    let mut next_index = 0usize;
    let mut sccs = Vec::new();
    // (node, position of the next successor to examine)
    let mut work: Vec<(usize, usize)> = Vec::new();

    for root in 0..n {
        if index[root] != UNVISITED {
            continue;
        }

        index[root] = next_index;
        lowlink[root] = next_index;
        next_index += 1;
        stack.push(root);
        on_stack[root] = true;
        work.push((root, 0));

        while let Some(frame) = work.last_mut() {
            let v = frame.0;

            if let Some(&w) = graph.adjacency[v].get(frame.1) {
                frame.1 += 1;
                if index[w] == UNVISITED {
                    index[w] = next_index;
                    lowlink[w] = next_index;
                    next_index += 1;
                    stack.push(w);
                    on_stack[w] = true;
                    work.push((w, 0));
                } else if on_stack[w] {
                    lowlink[v] = lowlink[v].min(index[w]);
                }
                continue;
            }

            work.pop();
            if let Some(&(parent, _)) = work.last() {
                lowlink[parent] = lowlink[parent].min(lowlink[v]);
            }

            if lowlink[v] == index[v] {
                let mut members = Vec::new();
                while let Some(w) = stack.pop() {
                    on_stack[w] = false;
                    members.push(graph.nodes[w].clone());
                    if w == v {
                        break;
                    }
                }
                let is_loop = members.len() > 1 || graph.adjacency[v].contains(&v);
                sccs.push(StronglyConnectedComponent {
                    id: sccs.len(),
                    nodes: members,
                    is_loop,
                });
            }
        }
    }

    sccs
}

/// True iff some node can reach itself through one or more edges.
pub fn has_cycle(graph: &Graph) -> bool {
    find_strongly_connected_components(graph)
        .iter()
        .any(|scc| scc.is_loop)
}

/// Report up to [`MAX_REPORTED_CYCLES`] loops.
///
/// This is a debugging aid, not an exhaustive enumeration: it reports one
/// cycle per DFS back-edge and stops as soon as the cap is reached, so a
/// dense graph with thousands of simple cycles yields at most ten of them.
pub fn find_cycles(graph: &Graph) -> Vec<Cycle> {
    find_cycles_bounded(graph, MAX_REPORTED_CYCLES)
}

/// [`find_cycles`] with an explicit cap.
pub fn find_cycles_bounded(graph: &Graph, limit: usize) -> Vec<Cycle> {
    let n = graph.len();
    let mut cycles = Vec::new();
    if limit == 0 {
        return cycles;
    }

    let mut visited = vec![false; n];
    let mut on_path = vec![false; n];
    let mut path: Vec<usize> = Vec::new();
    let mut work: Vec<(usize, usize)> = Vec::new();

    'roots: for root in 0..n {
        if visited[root] {
            continue;
        }

        visited[root] = true;
        on_path[root] = true;
        path.push(root);
        work.push((root, 0));

        while let Some(frame) = work.last_mut() {
            let v = frame.0;

            if let Some(&w) = graph.adjacency[v].get(frame.1) {
                frame.1 += 1;
                if !visited[w] {
                    visited[w] = true;
                    on_path[w] = true;
                    path.push(w);
                    work.push((w, 0));
                } else if on_path[w] {
                    if let Some(start) = path.iter().position(|&p| p == w) {
                        cycles.push(Cycle {
                            nodes: path[start..]
                                .iter()
                                .map(|&i| graph.nodes[i].clone())
                                .collect(),
                        });
                        if cycles.len() >= limit {
                            break 'roots;
                        }
                    }
                }
                continue;
            }

            work.pop();
            path.pop();
            on_path[v] = false;
        }
    }

    cycles
}

/// Node ids reachable from `start` (inclusive), in BFS order.
///
/// The queue is consumed through an index cursor rather than by removing
/// from its front, keeping the traversal linear in V + E.
pub fn bfs_order<'a>(graph: &'a Graph, start: &str) -> Vec<&'a str> {
    let Some(&start) = graph.index.get(start) else {
        return Vec::new();
    };

    let mut seen = vec![false; graph.len()];
    let mut queue = vec![start];
    seen[start] = true;
    let mut cursor = 0;

    while cursor < queue.len() {
        let current = queue[cursor];
        cursor += 1;
        for &next in &graph.adjacency[current] {
            if !seen[next] {
                seen[next] = true;
                queue.push(next);
            }
        }
    }

    queue.into_iter().map(|i| graph.nodes[i].as_str()).collect()
}

/// The set of node ids reachable from `start`, including `start` itself.
pub fn reachable_from<'a>(graph: &'a Graph, start: &str) -> FxHashSet<&'a str> {
    bfs_order(graph, start).into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(nodes: &[&str], edges: &[(&str, &str)]) -> Graph {
        build_graph(nodes.iter().copied(), edges.iter().copied())
    }

    fn assert_partition(g: &Graph) {
        let sccs = find_strongly_connected_components(g);
        let mut seen = FxHashSet::default();
        for scc in &sccs {
            for node in &scc.nodes {
                assert!(seen.insert(node.clone()), "node {} in two components", node);
            }
        }
        let expected: FxHashSet<String> = g.nodes().iter().cloned().collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn build_graph_gives_every_node_an_entry() {
        let g = graph(&["a", "b", "c"], &[("a", "b")]);
        assert_eq!(g.len(), 3);
        assert_eq!(g.successors("a").collect::<Vec<_>>(), vec!["b"]);
        assert_eq!(g.successors("c").count(), 0);
        assert_eq!(g.successors("missing").count(), 0);
    }

    #[test]
    fn build_graph_drops_dangling_edges() {
        let g = graph(&["a", "b"], &[("a", "b"), ("a", "ghost"), ("ghost", "b")]);
        assert_eq!(g.edge_count(), 1);
        assert!(!g.contains("ghost"));
    }

    #[test]
    fn build_graph_keeps_parallel_edges() {
        let g = graph(&["a", "b"], &[("a", "b"), ("a", "b")]);
        assert_eq!(g.successors("a").count(), 2);
        assert_eq!(g.edges().count(), 2);
    }

    #[test]
    fn scc_of_dag_is_all_singletons() {
        let g = graph(&["a", "b", "c"], &[("a", "b"), ("b", "c"), ("a", "c")]);
        let sccs = find_strongly_connected_components(&g);
        assert_eq!(sccs.len(), 3);
        assert!(sccs.iter().all(|s| !s.is_loop && s.nodes.len() == 1));
        assert!(!has_cycle(&g));
        assert_partition(&g);
    }

    #[test]
    fn scc_finds_loop_and_emits_sinks_first() {
        let g = graph(
            &["s", "a", "b", "c", "end"],
            &[("s", "a"), ("a", "b"), ("b", "c"), ("c", "a"), ("c", "end")],
        );
        let sccs = find_strongly_connected_components(&g);
        assert_partition(&g);

        let loop_scc = sccs.iter().find(|s| s.is_loop).unwrap();
        let mut members = loop_scc.nodes.clone();
        members.sort();
        assert_eq!(members, vec!["a", "b", "c"]);

        let pos = |id: &str| sccs.iter().position(|s| s.nodes.iter().any(|n| n == id)).unwrap();
        assert!(pos("end") < pos("a"));
        assert!(pos("a") < pos("s"));
        assert!(has_cycle(&g));
    }

    #[test]
    fn self_loop_is_a_loop() {
        let g = graph(&["a", "b"], &[("a", "a"), ("a", "b")]);
        let sccs = find_strongly_connected_components(&g);
        let a = sccs.iter().find(|s| s.nodes == vec!["a"]).unwrap();
        assert!(a.is_loop);
        let b = sccs.iter().find(|s| s.nodes == vec!["b"]).unwrap();
        assert!(!b.is_loop);
        assert!(has_cycle(&g));
        assert!(g.has_self_loop("a"));
    }

    #[test]
    fn scc_ids_are_sequential() {
        let g = graph(&["a", "b", "c", "d"], &[("a", "b"), ("b", "a"), ("c", "d")]);
        let sccs = find_strongly_connected_components(&g);
        for (i, scc) in sccs.iter().enumerate() {
            assert_eq!(scc.id, i);
        }
        assert_partition(&g);
    }

    #[test]
    fn deep_chain_does_not_overflow() {
        let n = 200_000;
        let ids: Vec<String> = (0..n).map(|i| i.to_string()).collect();
        let mut edges: Vec<(String, String)> = (0..n - 1)
            .map(|i| (i.to_string(), (i + 1).to_string()))
            .collect();
        edges.push(((n - 1).to_string(), "0".to_string()));
        let g = build_graph(ids.clone(), edges);

        let sccs = find_strongly_connected_components(&g);
        assert_eq!(sccs.len(), 1);
        assert_eq!(sccs[0].nodes.len(), n);

        let cycles = find_cycles(&g);
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].nodes.len(), n);

        assert_eq!(bfs_order(&g, "0").len(), n);
    }

    #[test]
    fn find_cycles_reports_path_suffix() {
        let g = graph(
            &["1", "2", "3", "4"],
            &[("1", "2"), ("2", "3"), ("3", "4"), ("4", "2")],
        );
        let cycles = find_cycles(&g);
        assert_eq!(cycles, vec![Cycle { nodes: vec!["2".into(), "3".into(), "4".into()] }]);
    }

    #[test]
    fn find_cycles_is_capped() {
        let ids: Vec<String> = (0..8).map(|i| i.to_string()).collect();
        let mut edges = Vec::new();
        for a in &ids {
            for b in &ids {
                edges.push((a.clone(), b.clone()));
            }
        }
        let g = build_graph(ids, edges);
        assert_eq!(find_cycles(&g).len(), MAX_REPORTED_CYCLES);
        assert_eq!(find_cycles_bounded(&g, 3).len(), 3);
        assert!(find_cycles_bounded(&g, 0).is_empty());
    }

    #[test]
    fn acyclic_graph_has_no_cycles() {
        let g = graph(&["a", "b", "c"], &[("a", "b"), ("a", "c"), ("b", "c")]);
        assert!(find_cycles(&g).is_empty());
    }

    #[test]
    fn bfs_reachability() {
        let g = graph(
            &["s", "a", "b", "island"],
            &[("s", "a"), ("a", "b"), ("b", "s")],
        );
        assert_eq!(bfs_order(&g, "s"), vec!["s", "a", "b"]);
        let reach = reachable_from(&g, "s");
        assert!(reach.contains("b"));
        assert!(!reach.contains("island"));
        assert!(bfs_order(&g, "nope").is_empty());
    }

    #[test]
    fn reachability_is_independent_of_edge_order() {
        let nodes = ["s", "a", "b", "c", "d", "x"];
        let edges = [("s", "a"), ("s", "b"), ("a", "c"), ("b", "d"), ("d", "a"), ("x", "s")];
        let forward = graph(&nodes, &edges);
        let mut reversed_edges = edges.to_vec();
        reversed_edges.reverse();
        let backward = graph(&nodes, &reversed_edges);
        assert_eq!(reachable_from(&forward, "s"), reachable_from(&backward, "s"));
    }
}
