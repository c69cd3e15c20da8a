use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Serializable snapshot of a traversal.
///
/// `extra` holds the fields that plugins splice in through the
/// `data:save` hook and consume again in `data:load`; it is flattened so
/// the stored document stays a single flat object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveState {
    pub current_node_id: String,
    #[serde(default)]
    pub history: Vec<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl SaveState {
    pub fn new(current_node_id: impl Into<String>, history: Vec<String>) -> Self {
        Self {
            current_node_id: current_node_id.into(),
            history,
            extra: BTreeMap::new(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(input: &str) -> Result<SaveState, serde_json::Error> {
        serde_json::from_str(input)
    }
}
