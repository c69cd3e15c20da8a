//! Story structure validation.
//!
//! Findings are data, never errors: `errors` block a story from being
//! considered complete, `warnings` are advisory. Validation only reads its
//! inputs, so it can be re-run after every edit.

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::graph::{bfs_order, build_graph, find_cycles_bounded};
use crate::schema::story::{Story, StoryEdge, StoryNode};

/// Tunable thresholds for the heuristic checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Cycles reported individually; finding more adds a "too many loops" warning.
    pub max_reported_cycles: usize,
    /// Nodes with fewer choices are not checked for fake choices.
    pub fake_choice_min_choices: usize,
    /// A target reached by this many choices of one node is flagged.
    pub duplicate_target_threshold: usize,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            max_reported_cycles: crate::core::graph::MAX_REPORTED_CYCLES,
            fake_choice_min_choices: 2,
            duplicate_target_threshold: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// A single validation finding. Nodes are named by their author-facing number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Finding {
    NoStartNode,
    MultipleStartNodes { count: usize },
    OrphanNode { node_id: u32 },
    DeadEnd { node_id: u32 },
    UnconnectedChoice { node_id: u32, choice_text: String },
    DanglingEdge { edge_id: String, missing: String },
    Cycle { path: Vec<String> },
    TooManyCycles { limit: usize },
    NoEndingNodes,
    UnreachableEnding { node_id: u32 },
    NoReachableEnding,
    FakeChoice { node_id: u32 },
    DuplicateTarget { node_id: u32, count: usize, target: String },
}

impl Finding {
    pub fn severity(&self) -> Severity {
        match self {
            Self::NoStartNode
            | Self::MultipleStartNodes { .. }
            | Self::OrphanNode { .. }
            | Self::DeadEnd { .. }
            | Self::UnconnectedChoice { .. }
            | Self::DanglingEdge { .. }
            | Self::NoReachableEnding => Severity::Error,
            Self::Cycle { .. }
            | Self::TooManyCycles { .. }
            | Self::NoEndingNodes
            | Self::UnreachableEnding { .. }
            | Self::FakeChoice { .. }
            | Self::DuplicateTarget { .. } => Severity::Warning,
        }
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoStartNode => write!(f, "story has no start node"),
            Self::MultipleStartNodes { count } => {
                write!(f, "story has {} start nodes; exactly one is allowed", count)
            }
            Self::OrphanNode { node_id } => {
                write!(f, "node {} cannot be reached from the start node", node_id)
            }
            Self::DeadEnd { node_id } => {
                write!(f, "node {} is a dead end: not an ending and has no way forward", node_id)
            }
            Self::UnconnectedChoice { node_id, choice_text } => write!(
                f,
                "choice \"{}\" of node {} is not connected to any node",
                choice_text, node_id
            ),
            Self::DanglingEdge { edge_id, missing } => {
                write!(f, "edge {} points at missing node {}", edge_id, missing)
            }
            Self::Cycle { path } => write!(f, "loop detected: {}", path.join(" -> ")),
            Self::TooManyCycles { limit } => write!(
                f,
                "more than {} loops detected; players may find the structure confusing",
                limit
            ),
            Self::NoEndingNodes => write!(f, "story has no ending nodes"),
            Self::UnreachableEnding { node_id } => {
                write!(f, "ending node {} cannot be reached from the start node", node_id)
            }
            Self::NoReachableEnding => {
                write!(f, "no ending can be reached from the start node")
            }
            Self::FakeChoice { node_id } => write!(
                f,
                "all options of node {} converge on the same node (fake choice)",
                node_id
            ),
            Self::DuplicateTarget { node_id, count, target } => {
                write!(f, "node {} has {} options leading to {}", node_id, count, target)
            }
        }
    }
}

/// Outcome of a validation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<Finding>,
    pub warnings: Vec<Finding>,
}

impl ValidationReport {
    fn push(&mut self, finding: Finding) {
        match finding.severity() {
            Severity::Error => self.errors.push(finding),
            Severity::Warning => self.warnings.push(finding),
        }
    }

    /// Error messages, in check order.
    pub fn error_messages(&self) -> Vec<String> {
        self.errors.iter().map(ToString::to_string).collect()
    }

    pub fn warning_messages(&self) -> Vec<String> {
        self.warnings.iter().map(ToString::to_string).collect()
    }
}

pub struct StoryValidator<'a> {
    nodes: &'a [StoryNode],
    edges: &'a [StoryEdge],
    config: ValidatorConfig,
}

/// Validate a story with the default thresholds.
pub fn validate_story(story: &Story) -> ValidationReport {
    StoryValidator::new(&story.nodes, &story.edges).validate()
}

impl<'a> StoryValidator<'a> {
    pub fn new(nodes: &'a [StoryNode], edges: &'a [StoryEdge]) -> Self {
        Self {
            nodes,
            edges,
            config: ValidatorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ValidatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Run every check and partition the findings.
    pub fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::default();

        let graph = build_graph(
            self.nodes.iter().map(|n| n.id.as_str()),
            self.edges.iter().map(|e| (e.source.as_str(), e.target.as_str())),
        );
        let start = self.nodes.iter().find(|n| n.is_start());
        let reachable: FxHashSet<&str> = start
            .map(|s| bfs_order(&graph, &s.id).into_iter().collect())
            .unwrap_or_default();

        self.check_start_node(&mut report);
        self.check_orphan_nodes(start.is_some(), &reachable, &mut report);
        self.check_dead_ends(&mut report);
        self.check_unconnected_choices(&mut report);
        self.check_dangling_edges(&mut report);
        self.check_cycles(&graph, &mut report);
        self.check_ending_reachability(start.is_some(), &reachable, &mut report);
        self.check_fake_choices(&mut report);

        report.valid = report.errors.is_empty();
        report
    }

    fn check_start_node(&self, report: &mut ValidationReport) {
        match self.nodes.iter().filter(|n| n.is_start()).count() {
            0 => report.push(Finding::NoStartNode),
            1 => {}
            count => report.push(Finding::MultipleStartNodes { count }),
        }
    }

    fn check_orphan_nodes(
        &self,
        has_start: bool,
        reachable: &FxHashSet<&str>,
        report: &mut ValidationReport,
    ) {
        if !has_start {
            return;
        }
        for node in self.nodes {
            if !node.is_start() && !reachable.contains(node.id.as_str()) {
                report.push(Finding::OrphanNode {
                    node_id: node.node_id,
                });
            }
        }
    }

    fn check_dead_ends(&self, report: &mut ValidationReport) {
        let sources: FxHashSet<&str> = self.edges.iter().map(|e| e.source.as_str()).collect();
        for node in self.nodes {
            if !node.is_ending() && !sources.contains(node.id.as_str()) {
                report.push(Finding::DeadEnd {
                    node_id: node.node_id,
                });
            }
        }
    }

    fn check_unconnected_choices(&self, report: &mut ValidationReport) {
        let bound: FxHashSet<(&str, &str)> = self
            .edges
            .iter()
            .filter_map(|e| Some((e.source.as_str(), e.source_handle.as_deref()?)))
            .collect();
        for node in self.nodes.iter().filter(|n| !n.is_ending()) {
            for choice in &node.choices {
                if !bound.contains(&(node.id.as_str(), choice.id.as_str())) {
                    report.push(Finding::UnconnectedChoice {
                        node_id: node.node_id,
                        choice_text: choice.text.clone(),
                    });
                }
            }
        }
    }

    fn check_dangling_edges(&self, report: &mut ValidationReport) {
        let ids: FxHashSet<&str> = self.nodes.iter().map(|n| n.id.as_str()).collect();
        for edge in self.edges {
            for endpoint in [&edge.source, &edge.target] {
                if !ids.contains(endpoint.as_str()) {
                    report.push(Finding::DanglingEdge {
                        edge_id: edge.id.clone(),
                        missing: endpoint.clone(),
                    });
                }
            }
        }
    }

    fn check_cycles(&self, graph: &crate::core::graph::Graph, report: &mut ValidationReport) {
        let limit = self.config.max_reported_cycles;
        let cycles = find_cycles_bounded(graph, limit.saturating_add(1));

        for cycle in cycles.iter().take(limit) {
            report.push(Finding::Cycle {
                path: cycle.nodes.iter().map(|id| self.label(id)).collect(),
            });
        }
        if cycles.len() > limit {
            report.push(Finding::TooManyCycles { limit });
        }
    }

    fn check_ending_reachability(
        &self,
        has_start: bool,
        reachable: &FxHashSet<&str>,
        report: &mut ValidationReport,
    ) {
        let endings: Vec<&StoryNode> = self.nodes.iter().filter(|n| n.is_ending()).collect();
        if endings.is_empty() {
            report.push(Finding::NoEndingNodes);
            return;
        }
        if !has_start {
            return;
        }

        let mut any_reached = false;
        for ending in &endings {
            if reachable.contains(ending.id.as_str()) {
                any_reached = true;
            } else {
                report.push(Finding::UnreachableEnding {
                    node_id: ending.node_id,
                });
            }
        }
        if !any_reached {
            report.push(Finding::NoReachableEnding);
        }
    }

    fn check_fake_choices(&self, report: &mut ValidationReport) {
        for node in self.nodes {
            if node.is_ending() || node.choices.len() < self.config.fake_choice_min_choices {
                continue;
            }

            // Targets in first-seen order, with how many edges reach each.
            let mut order: Vec<&str> = Vec::new();
            let mut counts: FxHashMap<&str, usize> = FxHashMap::default();
            for edge in self.edges.iter().filter(|e| e.source == node.id) {
                let count = counts.entry(edge.target.as_str()).or_insert(0);
                if *count == 0 {
                    order.push(edge.target.as_str());
                }
                *count += 1;
            }

            if counts.len() == 1 {
                report.push(Finding::FakeChoice {
                    node_id: node.node_id,
                });
            }
            for target in order {
                let count = counts[target];
                if count >= self.config.duplicate_target_threshold {
                    report.push(Finding::DuplicateTarget {
                        node_id: node.node_id,
                        count,
                        target: self.label(target),
                    });
                }
            }
        }
    }

    /// Author-facing label for a node id, falling back to the raw id.
    fn label(&self, id: &str) -> String {
        self.nodes
            .iter()
            .find(|n| n.id == id)
            .map(|n| n.node_id.to_string())
            .unwrap_or_else(|| id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::story::{Choice, NodeType, PluginData, Position};

    fn node(id: &str, node_type: NodeType, choices: &[&str]) -> StoryNode {
        StoryNode {
            id: id.to_string(),
            node_id: id.parse().unwrap(),
            node_type,
            text: String::new(),
            choices: choices
                .iter()
                .map(|c| Choice {
                    id: c.to_string(),
                    text: format!("take {}", c),
                    plugin_data: PluginData::new(),
                })
                .collect(),
            position: Position::default(),
            plugin_data: PluginData::new(),
        }
    }

    fn edge(source: &str, choice: &str, target: &str) -> StoryEdge {
        StoryEdge {
            id: format!("{}:{}", source, choice),
            source: source.to_string(),
            target: target.to_string(),
            source_handle: Some(choice.to_string()),
        }
    }

    fn linear() -> (Vec<StoryNode>, Vec<StoryEdge>) {
        (
            vec![
                node("1", NodeType::Start, &["c1"]),
                node("2", NodeType::Normal, &["c2"]),
                node("3", NodeType::Ending, &[]),
            ],
            vec![edge("1", "c1", "2"), edge("2", "c2", "3")],
        )
    }

    #[test]
    fn well_formed_story_is_valid() {
        let (nodes, edges) = linear();
        let report = StoryValidator::new(&nodes, &edges).validate();
        assert!(report.valid, "unexpected errors: {:?}", report.errors);
        assert!(report.errors.is_empty());
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn missing_start_node_is_an_error() {
        let (mut nodes, edges) = linear();
        nodes[0].node_type = NodeType::Normal;
        let report = StoryValidator::new(&nodes, &edges).validate();
        assert!(!report.valid);
        assert!(report.errors.contains(&Finding::NoStartNode));
        assert!(report.error_messages().iter().any(|m| m.contains("start node")));
    }

    #[test]
    fn two_start_nodes_is_an_error() {
        let (mut nodes, edges) = linear();
        nodes[1].node_type = NodeType::Start;
        let report = StoryValidator::new(&nodes, &edges).validate();
        assert!(report
            .errors
            .contains(&Finding::MultipleStartNodes { count: 2 }));
    }

    #[test]
    fn orphan_and_dead_end() {
        let (mut nodes, edges) = linear();
        nodes.push(node("4", NodeType::Normal, &[]));
        let report = StoryValidator::new(&nodes, &edges).validate();
        assert!(report.errors.contains(&Finding::OrphanNode { node_id: 4 }));
        assert!(report.errors.contains(&Finding::DeadEnd { node_id: 4 }));
    }

    #[test]
    fn unconnected_choice_names_node_and_text() {
        let (mut nodes, edges) = linear();
        nodes[1].choices.push(Choice {
            id: "c9".to_string(),
            text: "Open the cellar".to_string(),
            plugin_data: PluginData::new(),
        });
        let report = StoryValidator::new(&nodes, &edges).validate();
        let finding = Finding::UnconnectedChoice {
            node_id: 2,
            choice_text: "Open the cellar".to_string(),
        };
        assert!(report.errors.contains(&finding));
        let message = finding.to_string();
        assert!(message.contains("Open the cellar") && message.contains('2'));
    }

    #[test]
    fn dangling_edge_is_an_error() {
        let (nodes, mut edges) = linear();
        edges.push(edge("2", "c3", "99"));
        let report = StoryValidator::new(&nodes, &edges).validate();
        assert!(report.errors.contains(&Finding::DanglingEdge {
            edge_id: "2:c3".to_string(),
            missing: "99".to_string(),
        }));
    }

    #[test]
    fn cycles_are_warnings() {
        let (mut nodes, mut edges) = linear();
        nodes[1].choices.push(Choice {
            id: "again".to_string(),
            text: "Go back".to_string(),
            plugin_data: PluginData::new(),
        });
        edges.push(edge("2", "again", "1"));
        let report = StoryValidator::new(&nodes, &edges).validate();
        assert!(report.valid);
        assert_eq!(
            report.warnings,
            vec![Finding::Cycle {
                path: vec!["1".to_string(), "2".to_string()]
            }]
        );
        assert_eq!(report.warning_messages()[0], "loop detected: 1 -> 2");
    }

    #[test]
    fn too_many_cycles_adds_a_warning() {
        let ids: Vec<String> = (1..=6).map(|i| i.to_string()).collect();
        let mut nodes = Vec::new();
        let mut edges = Vec::new();
        for (i, id) in ids.iter().enumerate() {
            let choices: Vec<String> = ids.iter().map(|t| format!("to{}", t)).collect();
            let choice_refs: Vec<&str> = choices.iter().map(String::as_str).collect();
            let kind = if i == 0 { NodeType::Start } else { NodeType::Normal };
            nodes.push(node(id, kind, &choice_refs));
            for target in &ids {
                edges.push(edge(id, &format!("to{}", target), target));
            }
        }
        let report = StoryValidator::new(&nodes, &edges)
            .with_config(ValidatorConfig {
                max_reported_cycles: 3,
                ..ValidatorConfig::default()
            })
            .validate();
        let cycles = report
            .warnings
            .iter()
            .filter(|w| matches!(w, Finding::Cycle { .. }))
            .count();
        assert_eq!(cycles, 3);
        assert!(report.warnings.contains(&Finding::TooManyCycles { limit: 3 }));
    }

    #[test]
    fn unreachable_ending_warns_and_no_reachable_ending_errors() {
        let nodes = vec![
            node("1", NodeType::Start, &["loop"]),
            node("2", NodeType::Ending, &[]),
        ];
        let edges = vec![edge("1", "loop", "1")];
        let report = StoryValidator::new(&nodes, &edges).validate();
        assert!(report
            .warnings
            .contains(&Finding::UnreachableEnding { node_id: 2 }));
        assert!(report.errors.contains(&Finding::NoReachableEnding));
    }

    #[test]
    fn story_without_endings() {
        let nodes = vec![node("1", NodeType::Start, &["loop"])];
        let edges = vec![edge("1", "loop", "1")];
        let report = StoryValidator::new(&nodes, &edges).validate();
        assert!(report.valid);
        assert!(report.errors.is_empty());
        assert_eq!(
            report.warnings,
            vec![
                Finding::Cycle { path: vec!["1".into()] },
                Finding::NoEndingNodes,
            ]
        );
    }

    #[test]
    fn fake_and_duplicate_choices() {
        let nodes = vec![
            node("1", NodeType::Start, &["a", "b"]),
            node("2", NodeType::Normal, &["a", "b", "c"]),
            node("3", NodeType::Ending, &[]),
            node("4", NodeType::Ending, &[]),
        ];
        let edges = vec![
            edge("1", "a", "2"),
            edge("1", "b", "2"),
            edge("2", "a", "3"),
            edge("2", "b", "3"),
            edge("2", "c", "4"),
        ];
        let report = StoryValidator::new(&nodes, &edges).validate();
        assert!(report.valid);
        assert!(report.warnings.contains(&Finding::FakeChoice { node_id: 1 }));
        assert!(!report.warnings.contains(&Finding::FakeChoice { node_id: 2 }));
        assert!(report.warnings.contains(&Finding::DuplicateTarget {
            node_id: 1,
            count: 2,
            target: "2".to_string(),
        }));
        assert!(report.warnings.contains(&Finding::DuplicateTarget {
            node_id: 2,
            count: 2,
            target: "3".to_string(),
        }));
    }

    #[test]
    fn validation_is_repeatable() {
        let (nodes, edges) = linear();
        let validator = StoryValidator::new(&nodes, &edges);
        assert_eq!(validator.validate(), validator.validate());
    }
}
