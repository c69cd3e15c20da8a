//! Layered layout: one row per depth, ordered by predecessor barycenters.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

use super::{compare_ids, LayoutStrategy};
use crate::core::analyzer::StoryAnalysis;
use crate::schema::story::{Position, StoryEdge, StoryNode};

/// Spacing for the layered layout. With `auto_spacing` on, the gaps and the
/// origin are replaced by a tier picked from the node count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HierarchicalConfig {
    pub auto_spacing: bool,
    pub layer_gap: f64,
    pub node_gap: f64,
    pub start_x: f64,
    pub start_y: f64,
    pub node_width: f64,
    pub node_height: f64,
}

impl Default for HierarchicalConfig {
    fn default() -> Self {
        Self {
            auto_spacing: true,
            layer_gap: 350.0,
            node_gap: 700.0,
            start_x: 100.0,
            start_y: 100.0,
            node_width: 280.0,
            node_height: 200.0,
        }
    }
}

impl HierarchicalConfig {
    /// The effective spacing for a story of `node_count` nodes.
    pub fn for_node_count(&self, node_count: usize) -> HierarchicalConfig {
        if !self.auto_spacing {
            return self.clone();
        }
        let (layer_gap, node_gap, start_x, start_y) = match node_count {
            0..=14 => (350.0, 700.0, 100.0, 100.0),
            15..=39 => (380.0, 750.0, 150.0, 120.0),
            _ => (400.0, 800.0, 200.0, 150.0),
        };
        HierarchicalConfig {
            layer_gap,
            node_gap,
            start_x,
            start_y,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct HierarchicalLayout {
    config: HierarchicalConfig,
}

impl HierarchicalLayout {
    pub fn new(config: HierarchicalConfig) -> Self {
        Self { config }
    }

    /// Vertical list, used when the story has no start node to layer from.
    fn fallback(&self, nodes: &[StoryNode]) -> Vec<StoryNode> {
        let cfg = &self.config;
        nodes
            .iter()
            .enumerate()
            .map(|(i, node)| StoryNode {
                position: Position::new(
                    cfg.start_x,
                    cfg.start_y + i as f64 * (cfg.node_height + 50.0),
                ),
                ..node.clone()
            })
            .collect()
    }
}

impl LayoutStrategy for HierarchicalLayout {
    fn name(&self) -> &'static str {
        "hierarchical"
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
            return self.fallback(nodes);
        }

        let cfg = self.config.for_node_count(nodes.len());

        let mut layers: BTreeMap<u32, Vec<&StoryNode>> = BTreeMap::new();
        for node in nodes {
            if let Some(layer) = analysis.layer_of(&node.id) {
                layers.entry(layer).or_default().push(node);
            }
        }

        let mut predecessors: FxHashMap<&str, Vec<&str>> = FxHashMap::default();
        for edge in edges {
            predecessors
                .entry(edge.target.as_str())
                .or_default()
                .push(edge.source.as_str());
        }

        let mut placed: FxHashMap<&str, Position> = FxHashMap::default();
        for (depth, layer) in layers {
            let sorted = sort_layer(layer, &predecessors, &placed, analysis);
            let y = cfg.start_y + f64::from(depth) * cfg.layer_gap;
            let left = cfg.start_x - sorted.len() as f64 * cfg.node_gap / 2.0 + cfg.node_width / 2.0;
            for (i, node) in sorted.into_iter().enumerate() {
                placed.insert(node.id.as_str(), Position::new(left + i as f64 * cfg.node_gap, y));
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

/// Order one layer: nodes with placed predecessors first, by the mean x of
/// those predecessors; the rest after them. Ties fall through to in-degree
/// and out-degree (both descending), then id.
fn sort_layer<'n>(
    mut layer: Vec<&'n StoryNode>,
    predecessors: &FxHashMap<&str, Vec<&str>>,
    placed: &FxHashMap<&str, Position>,
    analysis: &StoryAnalysis,
) -> Vec<&'n StoryNode> {
    let barycenter = |node: &StoryNode| -> Option<f64> {
        let xs: Vec<f64> = predecessors
            .get(node.id.as_str())?
            .iter()
            .filter_map(|p| placed.get(p).map(|pos| pos.x))
            .collect();
        if xs.is_empty() {
            None
        } else {
            Some(xs.iter().sum::<f64>() / xs.len() as f64)
        }
    };
    let keys: FxHashMap<&str, Option<f64>> = layer
        .iter()
        .map(|&n| (n.id.as_str(), barycenter(n)))
        .collect();
    let degrees = |id: &str| {
        analysis
            .node(id)
            .map_or((0, 0), |a| (a.in_degree, a.out_degree))
    };

    layer.sort_by(|a, b| {
        let by_barycenter = match (keys[a.id.as_str()], keys[b.id.as_str()]) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        let (a_in, a_out) = degrees(&a.id);
        let (b_in, b_out) = degrees(&b.id);
        by_barycenter
            .then(b_in.cmp(&a_in))
            .then(b_out.cmp(&a_out))
            .then_with(|| compare_ids(&a.id, &b.id))
    });
    layer
}
