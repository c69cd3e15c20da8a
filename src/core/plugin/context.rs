use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::schema::story::{Story, StoryNode};

/// Snapshot of the shared data store.
pub type DataSnapshot = BTreeMap<String, Value>;

/// A notification raised by a plugin for the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginEvent {
    pub name: String,
    #[serde(default)]
    pub data: Value,
}

/// State shared by every plugin of one runtime: a key/value data store,
/// the story under traversal, the engine's position, and an event outbox.
#[derive(Debug, Clone, Default)]
pub struct PluginContext {
    data: DataSnapshot,
    story: Option<Arc<Story>>,
    current_node_id: Option<String>,
    events: Vec<PluginEvent>,
}

impl PluginContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.data.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }

    pub fn snapshot(&self) -> DataSnapshot {
        self.data.clone()
    }

    /// Replace the whole store with `snapshot`.
    pub fn restore(&mut self, snapshot: DataSnapshot) {
        self.data = snapshot;
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    pub fn story(&self) -> Option<&Story> {
        self.story.as_deref()
    }

    pub fn set_story(&mut self, story: Arc<Story>) {
        self.story = Some(story);
    }

    /// Look up a node of the attached story.
    pub fn node(&self, id: &str) -> Option<&StoryNode> {
        self.story()?.node(id)
    }

    pub fn current_node_id(&self) -> Option<&str> {
        self.current_node_id.as_deref()
    }

    pub fn set_current_node_id(&mut self, id: Option<String>) {
        self.current_node_id = id;
    }

    pub fn emit(&mut self, name: impl Into<String>, data: Value) {
        let name = name.into();
        tracing::trace!(event = %name, "plugin event");
        self.events.push(PluginEvent { name, data });
    }

    /// Take every event raised since the last drain, oldest first.
    pub fn drain_events(&mut self) -> Vec<PluginEvent> {
        std::mem::take(&mut self.events)
    }
}
