//! Hub-centric layout for looping stories.
//!
//! Hubs are nodes with a high total degree or many incoming back-edges.
//! They are strung along a horizontal main line by depth, and each hub's
//! activity nodes are spread on a circle around it.

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use super::LayoutStrategy;
use crate::core::analyzer::StoryAnalysis;
use crate::schema::story::{Position, StoryEdge, StoryNode};

/// Hub detection thresholds and spacing. The thresholds are heuristics;
/// tune them per story family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadialConfig {
    /// In-degree plus out-degree at which a node becomes a hub.
    pub hub_degree_threshold: usize,
    /// Incoming back-edges at which a node becomes a hub.
    pub hub_back_edge_threshold: usize,
    /// Weight of each back-edge in the hub score.
    pub back_edge_weight: usize,
    pub main_line_y: f64,
    pub main_line_start_x: f64,
    pub min_hub_gap: f64,
    pub hub_gap_base: f64,
    pub hub_gap_per_activity: f64,
    pub base_radius: f64,
    pub radius_per_activity: f64,
    pub max_radius_increment: f64,
    /// Activities are spaced as if there were at least this many.
    pub min_angle_slots: usize,
    pub grid_gap: f64,
    pub grid_start_x: f64,
    pub grid_start_y: f64,
}

impl Default for RadialConfig {
    fn default() -> Self {
        Self {
            hub_degree_threshold: 6,
            hub_back_edge_threshold: 3,
            back_edge_weight: 2,
            main_line_y: 600.0,
            main_line_start_x: 400.0,
            min_hub_gap: 2000.0,
            hub_gap_base: 1500.0,
            hub_gap_per_activity: 100.0,
            base_radius: 600.0,
            radius_per_activity: 30.0,
            max_radius_increment: 400.0,
            min_angle_slots: 6,
            grid_gap: 700.0,
            grid_start_x: 400.0,
            grid_start_y: 400.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Hub<'n> {
    node_id: &'n str,
    score: usize,
    depth: u32,
}

struct Cluster<'n> {
    hub: Hub<'n>,
    activities: Vec<&'n str>,
}

#[derive(Debug, Clone, Default)]
pub struct RadialLayout {
    config: RadialConfig,
}

impl RadialLayout {
    pub fn new(config: RadialConfig) -> Self {
        Self { config }
    }

    fn grid(&self, nodes: &[StoryNode]) -> Vec<StoryNode> {
        let cfg = &self.config;
        let cols = ((nodes.len() as f64).sqrt().ceil() as usize).max(1);
        nodes
            .iter()
            .enumerate()
            .map(|(i, node)| StoryNode {
                position: Position::new(
                    cfg.grid_start_x + (i % cols) as f64 * cfg.grid_gap,
                    cfg.grid_start_y + (i / cols) as f64 * cfg.grid_gap,
                ),
                ..node.clone()
            })
            .collect()
    }

    fn detect_hubs<'n>(
        &self,
        nodes: &'n [StoryNode],
        edges: &[StoryEdge],
        analysis: &StoryAnalysis,
    ) -> Vec<Hub<'n>> {
        let mut back_edges: FxHashMap<&str, usize> = FxHashMap::default();
        for edge in edges {
            if let (Some(source), Some(target)) =
                (analysis.layer_of(&edge.source), analysis.layer_of(&edge.target))
            {
                if target <= source {
                    *back_edges.entry(edge.target.as_str()).or_default() += 1;
                }
            }
        }

        let mut seen = FxHashSet::default();
        let mut hubs = Vec::new();
        for node in nodes {
            let Some(a) = analysis.node(&node.id) else {
                continue;
            };
            if !seen.insert(node.id.as_str()) {
                continue;
            }
            let degree = a.in_degree + a.out_degree;
            let back = back_edges.get(node.id.as_str()).copied().unwrap_or(0);
            if degree >= self.config.hub_degree_threshold
                || back >= self.config.hub_back_edge_threshold
            {
                hubs.push(Hub {
                    node_id: node.id.as_str(),
                    score: degree + back * self.config.back_edge_weight,
                    depth: analysis.layer_of(&node.id).unwrap_or(0),
                });
            }
        }

        hubs.sort_by(|a, b| b.score.cmp(&a.score));
        hubs
    }

    /// Each hub claims its unclaimed non-hub successors; every remaining
    /// node joins the hub closest in depth.
    fn cluster<'n>(
        &self,
        nodes: &'n [StoryNode],
        edges: &'n [StoryEdge],
        hubs: Vec<Hub<'n>>,
        analysis: &StoryAnalysis,
    ) -> Vec<Cluster<'n>> {
        let known: FxHashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
        let hub_ids: FxHashSet<&str> = hubs.iter().map(|h| h.node_id).collect();
        let mut assigned: FxHashSet<&str> = FxHashSet::default();
        let mut clusters = Vec::with_capacity(hubs.len());

        for hub in hubs {
            assigned.insert(hub.node_id);
            let mut activities = Vec::new();
            for edge in edges.iter().filter(|e| e.source == hub.node_id) {
                let target = edge.target.as_str();
                if known.contains(target) && !hub_ids.contains(target) && assigned.insert(target) {
                    activities.push(target);
                }
            }
            clusters.push(Cluster { hub, activities });
        }

        for node in nodes {
            let Some(layer) = analysis.layer_of(&node.id) else {
                continue;
            };
            if !assigned.insert(node.id.as_str()) {
                continue;
            }
            let mut closest: Option<(usize, u32)> = None;
            for (i, cluster) in clusters.iter().enumerate() {
                let diff = layer.abs_diff(cluster.hub.depth);
                if closest.map_or(true, |(_, best)| diff < best) {
                    closest = Some((i, diff));
                }
            }
            if let Some((i, _)) = closest {
                clusters[i].activities.push(node.id.as_str());
            }
        }

        clusters
    }
}

impl LayoutStrategy for RadialLayout {
    fn name(&self) -> &'static str {
        "radial"
    }

    fn layout(
        &self,
        nodes: &[StoryNode],
        edges: &[StoryEdge],
        analysis: &StoryAnalysis,
    ) -> Vec<StoryNode> {
        if nodes.is_empty() {
            return Vec::new();
        }
        if analysis.start_node_id.is_none() {
            return self.grid(nodes);
        }

        let hubs = self.detect_hubs(nodes, edges, analysis);
        if hubs.is_empty() {
            return self.grid(nodes);
        }
        tracing::debug!(hubs = hubs.len(), "radial layout hubs detected");

        let cfg = &self.config;
        let clusters = self.cluster(nodes, edges, hubs, analysis);

        let mut main_line: Vec<&Cluster> = clusters.iter().collect();
        main_line.sort_by_key(|c| c.hub.depth);
        let max_activities = clusters
            .iter()
            .map(|c| c.activities.len())
            .max()
            .unwrap_or(0)
            .max(1);
        let hub_gap = cfg
            .min_hub_gap
            .max(cfg.hub_gap_base + max_activities as f64 * cfg.hub_gap_per_activity);

        let mut placed: FxHashMap<&str, Position> = FxHashMap::default();
        for (i, cluster) in main_line.into_iter().enumerate() {
            let center = Position::new(cfg.main_line_start_x + i as f64 * hub_gap, cfg.main_line_y);
            placed.insert(cluster.hub.node_id, center);

            let count = cluster.activities.len();
            if count == 0 {
                continue;
            }
            let radius =
                cfg.base_radius + (count as f64 * cfg.radius_per_activity).min(cfg.max_radius_increment);
            let step = 2.0 * PI / count.max(cfg.min_angle_slots) as f64;
            for (j, &id) in cluster.activities.iter().enumerate() {
                let angle = -PI / 2.0 + j as f64 * step;
                placed.insert(
                    id,
                    Position::new(
                        (center.x + radius * angle.cos()).round(),
                        (center.y + radius * angle.sin()).round(),
                    ),
                );
            }
        }

        nodes
            .iter()
            .map(|node| {
                let mut node = node.clone();
                if let Some(&position) = placed.get(node.id.as_str()) {
                    node.position = position;
                }
                node
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::analyzer::StoryAnalyzer;
    use crate::schema::story::{NodeType, PluginData};

    fn node(id: &str, node_type: NodeType) -> StoryNode {
        StoryNode {
            id: id.to_string(),
            node_id: id.parse().unwrap_or(0),
            node_type,
            text: String::new(),
            choices: Vec::new(),
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

    fn run(nodes: &[StoryNode], edges: &[StoryEdge]) -> Vec<StoryNode> {
        let analysis = StoryAnalyzer::new(nodes, edges).analyze();
        RadialLayout::default().layout(nodes, edges, &analysis)
    }

    fn pos(laid_out: &[StoryNode], id: &str) -> Position {
        laid_out.iter().find(|n| n.id == id).unwrap().position
    }

    fn distance(a: Position, b: Position) -> f64 {
        ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt()
    }

    #[test]
    fn star_hub_with_activities_on_a_circle() {
        let mut nodes = vec![node("1", NodeType::Start)];
        let mut edges = Vec::new();
        for i in 2..=7 {
            let id = i.to_string();
            nodes.push(node(&id, NodeType::Ending));
            edges.push(edge("1", &id));
        }
        let laid_out = run(&nodes, &edges);

        let hub = pos(&laid_out, "1");
        assert_eq!(hub, Position::new(400.0, 600.0));
        // first activity sits straight above the hub: radius 600 + 6 * 30
        assert_eq!(pos(&laid_out, "2"), Position::new(400.0, -180.0));
        for i in 2..=7 {
            let d = distance(hub, pos(&laid_out, &i.to_string()));
            assert!((d - 780.0).abs() < 1.5, "node {} at distance {}", i, d);
        }
    }

    #[test]
    fn hubs_line_up_by_depth_and_leftovers_join_nearest() {
        let mut nodes = vec![node("1", NodeType::Start), node("10", NodeType::Normal)];
        let mut edges = vec![edge("1", "10")];
        for i in 2..=6 {
            let id = i.to_string();
            nodes.push(node(&id, NodeType::Ending));
            edges.push(edge("1", &id));
        }
        for i in 11..=16 {
            let id = i.to_string();
            nodes.push(node(&id, NodeType::Ending));
            edges.push(edge("10", &id));
        }
        nodes.push(node("20", NodeType::Normal));
        let laid_out = run(&nodes, &edges);

        // seven activities around hub 10 widen the gap to 1500 + 7 * 100
        assert_eq!(pos(&laid_out, "1"), Position::new(400.0, 600.0));
        assert_eq!(pos(&laid_out, "10"), Position::new(2600.0, 600.0));

        let d = distance(pos(&laid_out, "10"), pos(&laid_out, "20"));
        assert!((d - 810.0).abs() < 1.5, "straggler at distance {}", d);
        let d = distance(pos(&laid_out, "1"), pos(&laid_out, "2"));
        assert!((d - 750.0).abs() < 1.5);
    }

    #[test]
    fn back_edges_make_a_hub() {
        let nodes = vec![
            node("1", NodeType::Start),
            node("2", NodeType::Normal),
            node("3", NodeType::Normal),
            node("4", NodeType::Normal),
            node("5", NodeType::Normal),
        ];
        let edges = vec![
            edge("1", "2"),
            edge("2", "3"),
            edge("3", "2"),
            edge("3", "4"),
            edge("4", "2"),
            edge("4", "5"),
            edge("5", "2"),
        ];
        let analysis = StoryAnalyzer::new(&nodes, &edges).analyze();
        let hubs = RadialLayout::default().detect_hubs(&nodes, &edges, &analysis);
        assert_eq!(hubs.len(), 1);
        assert_eq!(hubs[0].node_id, "2");
    }

    #[test]
    fn no_hubs_falls_back_to_grid() {
        let nodes = vec![
            node("1", NodeType::Start),
            node("2", NodeType::Normal),
            node("3", NodeType::Ending),
        ];
        let edges = vec![edge("1", "2"), edge("2", "3")];
        let laid_out = run(&nodes, &edges);
        assert_eq!(pos(&laid_out, "1"), Position::new(400.0, 400.0));
        assert_eq!(pos(&laid_out, "2"), Position::new(1100.0, 400.0));
        assert_eq!(pos(&laid_out, "3"), Position::new(400.0, 1100.0));
    }

    #[test]
    fn thresholds_are_configurable() {
        let nodes = vec![
            node("1", NodeType::Start),
            node("2", NodeType::Normal),
            node("3", NodeType::Ending),
        ];
        let edges = vec![edge("1", "2"), edge("1", "3"), edge("2", "3")];
        let analysis = StoryAnalyzer::new(&nodes, &edges).analyze();
        let layout = RadialLayout::new(RadialConfig {
            hub_degree_threshold: 2,
            ..RadialConfig::default()
        });
        let hubs = layout.detect_hubs(&nodes, &edges, &analysis);
        assert_eq!(hubs.len(), 3);
    }
}
