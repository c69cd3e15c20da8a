use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// Free-form per-module data attached to nodes and choices.
///
/// The engine never interprets these values; modules own their keys
/// (for example `"blockly.scripts"`).
pub type PluginData = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Error)]
pub enum StoryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported story file extension: {0}")]
    UnsupportedFormat(String),
}

/// Role of a node in the narrative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Start,
    #[default]
    Normal,
    Ending,
}

/// Editor canvas coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// An option offered to the player. Bound to an edge through the edge's
/// `source_handle`, never through its index in the node's choice list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Choice {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub plugin_data: PluginData,
}

/// A single narrative beat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryNode {
    /// Stable identifier referenced by edges and save states.
    pub id: String,
    /// Author-facing sequential number, used in diagnostics.
    pub node_id: u32,
    #[serde(rename = "type", default)]
    pub node_type: NodeType,
    /// Template text; opaque to the engine, rewritten by `content:process`.
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub plugin_data: PluginData,
}

impl StoryNode {
    pub fn is_start(&self) -> bool {
        self.node_type == NodeType::Start
    }

    pub fn is_ending(&self) -> bool {
        self.node_type == NodeType::Ending
    }

    pub fn choice(&self, choice_id: &str) -> Option<&Choice> {
        self.choices.iter().find(|c| c.id == choice_id)
    }
}

/// A directed connection from one node's choice to another node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    /// Id of the originating choice on `source`.
    #[serde(default)]
    pub source_handle: Option<String>,
}

/// An authored story document: the node and edge lists as the editor saved them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Story {
    #[serde(default)]
    pub title: String,
    pub nodes: Vec<StoryNode>,
    #[serde(default)]
    pub edges: Vec<StoryEdge>,
}

impl Story {
    pub fn new(nodes: Vec<StoryNode>, edges: Vec<StoryEdge>) -> Self {
        Self {
            title: String::new(),
            nodes,
            edges,
        }
    }

    /// Load a story from disk, picking the format by file extension
    /// (`.ron` or `.json`).
    pub fn load(path: &Path) -> Result<Story, StoryError> {
        match path.extension().and_then(|s| s.to_str()) {
            Some("ron") => Self::load_from_ron(path),
            Some("json") => {
                let contents = std::fs::read_to_string(path)?;
                Self::parse_json(&contents)
            }
            other => Err(StoryError::UnsupportedFormat(
                other.unwrap_or_default().to_string(),
            )),
        }
    }

    pub fn load_from_ron(path: &Path) -> Result<Story, StoryError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    pub fn parse_ron(input: &str) -> Result<Story, StoryError> {
        Ok(ron::from_str(input)?)
    }

    pub fn parse_json(input: &str) -> Result<Story, StoryError> {
        Ok(serde_json::from_str(input)?)
    }

    pub fn node(&self, id: &str) -> Option<&StoryNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn start_nodes(&self) -> impl Iterator<Item = &StoryNode> {
        self.nodes.iter().filter(|n| n.is_start())
    }

    pub fn ending_nodes(&self) -> impl Iterator<Item = &StoryNode> {
        self.nodes.iter().filter(|n| n.is_ending())
    }

    /// Edges leaving `source`, in document order.
    pub fn outgoing<'a>(&'a self, source: &'a str) -> impl Iterator<Item = &'a StoryEdge> + 'a {
        self.edges.iter().filter(move |e| e.source == source)
    }

    /// The edge bound to `choice_id` on node `source`, if any.
    pub fn edge_for_choice(&self, source: &str, choice_id: &str) -> Option<&StoryEdge> {
        self.edges
            .iter()
            .find(|e| e.source == source && e.source_handle.as_deref() == Some(choice_id))
    }
}
