//! Structural analysis of a story graph: per-node depth, degree, loop
//! membership and reachable endings. Layout strategies consume this.

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::core::graph::{
    build_graph, find_cycles, find_strongly_connected_components, Cycle, Graph,
    StronglyConnectedComponent,
};
use crate::schema::story::{StoryEdge, StoryNode};

/// Choice count from which a node counts as a key decision.
pub const KEY_DECISION_CHOICES: usize = 3;

/// Analysis of a single node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeAnalysis {
    pub node_id: String,
    /// Shortest distance from the start node, where edges inside one
    /// strongly connected component cost nothing. `None` when unreachable.
    pub depth: Option<u32>,
    pub scc_id: Option<usize>,
    pub is_in_loop: bool,
    pub out_degree: usize,
    pub in_degree: usize,
    pub choice_count: usize,
    pub is_key_decision: bool,
    pub reachable_endings: Vec<String>,
}

/// Whole-story analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryAnalysis {
    pub nodes: FxHashMap<String, NodeAnalysis>,
    /// Largest finite depth.
    pub max_depth: u32,
    pub start_node_id: Option<String>,
    pub ending_node_ids: Vec<String>,
    pub has_cycles: bool,
    pub sccs: Vec<StronglyConnectedComponent>,
    pub cycles: Vec<Cycle>,
}

impl StoryAnalysis {
    pub fn node(&self, id: &str) -> Option<&NodeAnalysis> {
        self.nodes.get(id)
    }

    /// Depth used for placement: unreachable nodes sit one layer below the
    /// deepest reachable one.
    pub fn layer_of(&self, id: &str) -> Option<u32> {
        self.nodes
            .get(id)
            .map(|a| a.depth.unwrap_or(self.max_depth + 1))
    }
}

pub struct StoryAnalyzer<'a> {
    nodes: &'a [StoryNode],
    edges: &'a [StoryEdge],
}

impl<'a> StoryAnalyzer<'a> {
    pub fn new(nodes: &'a [StoryNode], edges: &'a [StoryEdge]) -> Self {
        Self { nodes, edges }
    }

    pub fn analyze(&self) -> StoryAnalysis {
        let Some(start) = self.nodes.iter().find(|n| n.is_start()) else {
            return StoryAnalysis::default();
        };

        let graph = build_graph(
            self.nodes.iter().map(|n| n.id.as_str()),
            self.edges.iter().map(|e| (e.source.as_str(), e.target.as_str())),
        );
        let ending_ids: Vec<String> = self
            .nodes
            .iter()
            .filter(|n| n.is_ending())
            .map(|n| n.id.clone())
            .collect();

        let sccs = find_strongly_connected_components(&graph);
        let has_cycles = sccs.iter().any(|s| s.is_loop);
        let cycles = if has_cycles { find_cycles(&graph) } else { Vec::new() };

        let mut scc_of: FxHashMap<&str, usize> = FxHashMap::default();
        for scc in &sccs {
            for member in &scc.nodes {
                scc_of.insert(member.as_str(), scc.id);
            }
        }

        let depths = depths_with_scc(&graph, &start.id, &scc_of);
        let endings_by_scc = reachable_endings_by_scc(&graph, &sccs, &scc_of, &ending_ids);

        let mut in_degree: FxHashMap<&str, usize> = FxHashMap::default();
        for (_, target) in graph.edges() {
            *in_degree.entry(target).or_default() += 1;
        }

        let mut analysis = StoryAnalysis {
            start_node_id: Some(start.id.clone()),
            has_cycles,
            cycles,
            ..StoryAnalysis::default()
        };

        for node in self.nodes {
            if analysis.nodes.contains_key(&node.id) {
                continue;
            }
            let depth = depths.get(node.id.as_str()).copied();
            if let Some(d) = depth {
                analysis.max_depth = analysis.max_depth.max(d);
            }
            let scc_id = scc_of.get(node.id.as_str()).copied();
            let choice_count = node.choices.len();

            analysis.nodes.insert(
                node.id.clone(),
                NodeAnalysis {
                    node_id: node.id.clone(),
                    depth,
                    scc_id,
                    is_in_loop: scc_id.is_some_and(|id| sccs[id].is_loop),
                    out_degree: graph.successors(&node.id).count(),
                    in_degree: in_degree.get(node.id.as_str()).copied().unwrap_or(0),
                    choice_count,
                    is_key_decision: choice_count >= KEY_DECISION_CHOICES,
                    reachable_endings: scc_id
                        .map(|id| endings_by_scc[id].clone())
                        .unwrap_or_default(),
                },
            );
        }

        analysis.ending_node_ids = ending_ids;
        analysis.sccs = sccs;
        analysis
    }
}

/// 0-1 BFS: crossing into another component costs one layer, staying
/// inside the current component costs nothing.
fn depths_with_scc<'g>(
    graph: &'g Graph,
    start: &str,
    scc_of: &FxHashMap<&str, usize>,
) -> FxHashMap<&'g str, u32> {
    let mut dist: FxHashMap<&'g str, u32> = FxHashMap::default();
    let Some(start) = graph.nodes().iter().find(|n| n.as_str() == start) else {
        return dist;
    };

    let mut queue: VecDeque<(&'g str, u32)> = VecDeque::new();
    dist.insert(start.as_str(), 0);
    queue.push_back((start.as_str(), 0));

    while let Some((v, d)) = queue.pop_front() {
        if dist.get(v).is_some_and(|&best| best < d) {
            continue;
        }
        let v_scc = scc_of.get(v);
        for w in graph.successors(v) {
            let same = v_scc.is_some() && scc_of.get(w) == v_scc;
            let next = if same { d } else { d + 1 };
            if dist.get(w).map_or(true, |&old| next < old) {
                dist.insert(w, next);
                if same {
                    queue.push_front((w, next));
                } else {
                    queue.push_back((w, next));
                }
            }
        }
    }

    dist
}

/// Endings reachable from each component, computed bottom-up over the
/// condensation. Relies on Tarjan emitting successors before predecessors.
fn reachable_endings_by_scc(
    graph: &Graph,
    sccs: &[StronglyConnectedComponent],
    scc_of: &FxHashMap<&str, usize>,
    ending_ids: &[String],
) -> Vec<Vec<String>> {
    let ending_index: FxHashMap<&str, usize> = ending_ids
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect();
    let mut reach: Vec<FxHashSet<usize>> = Vec::with_capacity(sccs.len());

    for scc in sccs {
        let mut set = FxHashSet::default();
        for member in &scc.nodes {
            if let Some(&i) = ending_index.get(member.as_str()) {
                set.insert(i);
            }
            for succ in graph.successors(member) {
                match scc_of.get(succ) {
                    Some(&other) if other != scc.id => {
                        set.extend(reach[other].iter().copied());
                    }
                    _ => {}
                }
            }
        }
        reach.push(set);
    }

    reach
        .into_iter()
        .map(|set| {
            let mut idx: Vec<usize> = set.into_iter().collect();
            idx.sort_unstable();
            idx.into_iter().map(|i| ending_ids[i].clone()).collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::story::{Choice, NodeType, Position, PluginData};

    fn node(id: &str, node_type: NodeType, choices: &[&str]) -> StoryNode {
        StoryNode {
            id: id.to_string(),
            node_id: id.parse().unwrap_or(0),
            node_type,
            text: format!("node {}", id),
            choices: choices
                .iter()
                .map(|c| Choice {
                    id: c.to_string(),
                    text: c.to_string(),
                    plugin_data: PluginData::new(),
                })
                .collect(),
            position: Position::default(),
            plugin_data: PluginData::new(),
        }
    }

    fn edge(source: &str, target: &str) -> StoryEdge {
        StoryEdge {
            id: format!("{}-{}", source, target),
            source: source.to_string(),
            target: target.to_string(),
            source_handle: None,
        }
    }

    #[test]
    fn no_start_yields_empty_analysis() {
        let nodes = vec![node("1", NodeType::Normal, &[])];
        let analysis = StoryAnalyzer::new(&nodes, &[]).analyze();
        assert!(analysis.start_node_id.is_none());
        assert!(analysis.nodes.is_empty());
    }

    #[test]
    fn depths_follow_shortest_path() {
        let nodes = vec![
            node("1", NodeType::Start, &["a", "b"]),
            node("2", NodeType::Normal, &["a"]),
            node("3", NodeType::Normal, &["a"]),
            node("4", NodeType::Ending, &[]),
        ];
        let edges = vec![edge("1", "2"), edge("1", "3"), edge("2", "3"), edge("3", "4")];
        let analysis = StoryAnalyzer::new(&nodes, &edges).analyze();

        assert_eq!(analysis.node("1").unwrap().depth, Some(0));
        assert_eq!(analysis.node("2").unwrap().depth, Some(1));
        assert_eq!(analysis.node("3").unwrap().depth, Some(1));
        assert_eq!(analysis.node("4").unwrap().depth, Some(2));
        assert_eq!(analysis.max_depth, 2);
        assert_eq!(analysis.node("3").unwrap().in_degree, 2);
        assert_eq!(analysis.node("1").unwrap().out_degree, 2);
        assert!(!analysis.has_cycles);
    }

    #[test]
    fn loop_members_share_a_layer() {
        let nodes = vec![
            node("1", NodeType::Start, &["a"]),
            node("2", NodeType::Normal, &["a"]),
            node("3", NodeType::Normal, &["a"]),
            node("4", NodeType::Normal, &["a", "b"]),
            node("5", NodeType::Ending, &[]),
        ];
        let edges = vec![
            edge("1", "2"),
            edge("2", "3"),
            edge("3", "4"),
            edge("4", "2"),
            edge("4", "5"),
        ];
        let analysis = StoryAnalyzer::new(&nodes, &edges).analyze();

        for id in ["2", "3", "4"] {
            let a = analysis.node(id).unwrap();
            assert_eq!(a.depth, Some(1), "node {}", id);
            assert!(a.is_in_loop);
        }
        assert_eq!(analysis.node("5").unwrap().depth, Some(2));
        assert!(analysis.has_cycles);
        assert_eq!(analysis.cycles.len(), 1);
    }

    #[test]
    fn unreachable_node_has_no_depth() {
        let nodes = vec![
            node("1", NodeType::Start, &["a"]),
            node("2", NodeType::Ending, &[]),
            node("9", NodeType::Normal, &[]),
        ];
        let edges = vec![edge("1", "2")];
        let analysis = StoryAnalyzer::new(&nodes, &edges).analyze();
        assert_eq!(analysis.node("9").unwrap().depth, None);
        assert_eq!(analysis.layer_of("9"), Some(analysis.max_depth + 1));
    }

    #[test]
    fn reachable_endings_cover_the_condensation() {
        let nodes = vec![
            node("1", NodeType::Start, &["a", "b", "c"]),
            node("2", NodeType::Normal, &["a"]),
            node("3", NodeType::Ending, &[]),
            node("4", NodeType::Ending, &[]),
            node("5", NodeType::Normal, &["a"]),
        ];
        let edges = vec![
            edge("1", "2"),
            edge("1", "4"),
            edge("1", "5"),
            edge("2", "3"),
            edge("5", "1"),
        ];
        let analysis = StoryAnalyzer::new(&nodes, &edges).analyze();

        assert_eq!(analysis.node("1").unwrap().reachable_endings, vec!["3", "4"]);
        assert_eq!(analysis.node("5").unwrap().reachable_endings, vec!["3", "4"]);
        assert_eq!(analysis.node("2").unwrap().reachable_endings, vec!["3"]);
        assert_eq!(analysis.node("3").unwrap().reachable_endings, vec!["3"]);
        assert!(analysis.node("1").unwrap().is_key_decision);
        assert!(!analysis.node("2").unwrap().is_key_decision);
        assert_eq!(analysis.ending_node_ids, vec!["3", "4"]);
    }
}
