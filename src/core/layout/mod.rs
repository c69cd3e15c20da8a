//! Automatic node placement for the editor canvas.
//!
//! Both strategies are pure: they read the nodes, edges and a precomputed
//! [`StoryAnalysis`] and return repositioned copies of the nodes in their
//! input order.

pub mod hierarchical;
pub mod radial;

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::core::analyzer::{StoryAnalysis, StoryAnalyzer};
use crate::schema::story::{Story, StoryEdge, StoryNode};

pub use hierarchical::{HierarchicalConfig, HierarchicalLayout};
pub use radial::{RadialConfig, RadialLayout};

/// A node placement algorithm.
pub trait LayoutStrategy {
    fn name(&self) -> &'static str;

    fn layout(
        &self,
        nodes: &[StoryNode],
        edges: &[StoryEdge],
        analysis: &StoryAnalysis,
    ) -> Vec<StoryNode>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutMode {
    #[default]
    Hierarchical,
    Radial,
}

impl fmt::Display for LayoutMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hierarchical => write!(f, "hierarchical"),
            Self::Radial => write!(f, "radial"),
        }
    }
}

impl FromStr for LayoutMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hierarchical" => Ok(Self::Hierarchical),
            "radial" => Ok(Self::Radial),
            other => Err(format!(
                "unknown layout mode '{}' (expected hierarchical or radial)",
                other
            )),
        }
    }
}

/// Analyze `story` and lay it out with the given mode.
pub fn layout_story(
    story: &Story,
    mode: LayoutMode,
    hierarchical: &HierarchicalConfig,
    radial: &RadialConfig,
) -> Vec<StoryNode> {
    let analysis = StoryAnalyzer::new(&story.nodes, &story.edges).analyze();
    let strategy: Box<dyn LayoutStrategy> = match mode {
        LayoutMode::Hierarchical => Box::new(HierarchicalLayout::new(hierarchical.clone())),
        LayoutMode::Radial => Box::new(RadialLayout::new(radial.clone())),
    };
    tracing::debug!(strategy = strategy.name(), nodes = story.nodes.len(), "laying out story");
    strategy.layout(&story.nodes, &story.edges, &analysis)
}

/// Final tiebreak between node ids: numeric when both parse, lexical otherwise.
pub(crate) fn compare_ids(a: &str, b: &str) -> Ordering {
    match (a.parse::<i64>(), b.parse::<i64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        _ => a.cmp(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_parses_from_cli_names() {
        assert_eq!("radial".parse::<LayoutMode>(), Ok(LayoutMode::Radial));
        assert_eq!(
            "hierarchical".parse::<LayoutMode>().map(|m| m.to_string()),
            Ok("hierarchical".to_string())
        );
        assert!("spiral".parse::<LayoutMode>().is_err());
    }

    #[test]
    fn ids_compare_numerically_when_possible() {
        assert_eq!(compare_ids("2", "10"), Ordering::Less);
        assert_eq!(compare_ids("b", "a"), Ordering::Greater);
    }
}
