//! Traversal engine: tracks the player's position in a story, resolves
//! what they currently see, and moves along choices.
//!
//! Every transition is an explicit call. Plugins observe and shape the
//! traversal through the hooks dispatched by the owned [`PluginRuntime`].

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::core::plugin::{HookPayload, PluginRuntime};
use crate::schema::save::SaveState;
use crate::schema::story::{NodeType, PluginData, Story, StoryNode};

/// Characters of node text kept in a history preview.
const HISTORY_PREVIEW_CHARS: usize = 50;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("story has no start node")]
    NoStartNode,
    #[error("unknown node id: {0}")]
    UnknownNode(String),
    #[error("traversal has not started; there is no current node")]
    NotStarted,
    #[error("choice {0} is not connected to any node")]
    UnboundChoice(String),
    #[error("jump target does not exist: {0}")]
    JumpTargetMissing(String),
}

/// A choice with its bound target resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedChoice {
    pub id: String,
    pub text: String,
    pub target_node_id: Option<String>,
    /// Position in the node's authored choice list.
    pub index: usize,
    #[serde(default)]
    pub plugin_data: PluginData,
}

/// What the player currently sees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentNode {
    pub id: String,
    pub node_id: u32,
    pub text: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    /// Visible choices; every one has a target.
    pub choices: Vec<ResolvedChoice>,
    #[serde(default)]
    pub plugin_data: PluginData,
}

impl CurrentNode {
    pub fn is_ending(&self) -> bool {
        self.node_type == NodeType::Ending
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: String,
    pub text: String,
}

pub struct TraversalEngine {
    story: Arc<Story>,
    runtime: PluginRuntime,
    node_index: FxHashMap<String, usize>,
    /// (source, choice id) -> target; the first matching edge wins.
    choice_targets: FxHashMap<(String, String), String>,
    current: Option<String>,
    history: Vec<String>,
}

impl TraversalEngine {
    pub fn new(story: impl Into<Arc<Story>>, mut runtime: PluginRuntime) -> Self {
        let story = story.into();
        runtime.context_mut().set_story(Arc::clone(&story));

        let mut node_index = FxHashMap::default();
        for (i, node) in story.nodes.iter().enumerate() {
            node_index.entry(node.id.clone()).or_insert(i);
        }
        let mut choice_targets = FxHashMap::default();
        for edge in &story.edges {
            if let Some(handle) = &edge.source_handle {
                choice_targets
                    .entry((edge.source.clone(), handle.clone()))
                    .or_insert_with(|| edge.target.clone());
            }
        }

        Self {
            story,
            runtime,
            node_index,
            choice_targets,
            current: None,
            history: Vec::new(),
        }
    }

    /// Begin (or restart) a traversal at `node_id`, or at the story's start
    /// node when none is given. History is reset to that single node.
    pub fn start(&mut self, node_id: Option<&str>) -> Result<CurrentNode, EngineError> {
        self.runtime.trigger(HookPayload::EngineStart);

        let start = match node_id {
            Some(id) => self
                .node(id)
                .map(|n| n.id.clone())
                .ok_or_else(|| EngineError::UnknownNode(id.to_string()))?,
            None => self
                .story
                .start_nodes()
                .next()
                .map(|n| n.id.clone())
                .ok_or(EngineError::NoStartNode)?,
        };

        tracing::debug!(node = %start, "traversal started");
        self.history = vec![start.clone()];
        self.set_current(start);
        self.current_node()
    }

    /// Resolve the current node as presented to the player.
    ///
    /// Runs `node:before-enter`, `choice:filter`, `content:process` and
    /// `node:after-enter`. Repeated calls without a transition in between
    /// return equivalent results.
    pub fn current_node(&mut self) -> Result<CurrentNode, EngineError> {
        let id = self.current.clone().ok_or(EngineError::NotStarted)?;
        let story = Arc::clone(&self.story);
        let node = self
            .node_index
            .get(&id)
            .map(|&i| &story.nodes[i])
            .ok_or_else(|| EngineError::UnknownNode(id.clone()))?;

        self.runtime.trigger(HookPayload::NodeBeforeEnter {
            node_id: id.clone(),
        });

        let authored: Vec<ResolvedChoice> = node
            .choices
            .iter()
            .enumerate()
            .map(|(index, choice)| ResolvedChoice {
                id: choice.id.clone(),
                text: choice.text.clone(),
                target_node_id: self.choice_target(&node.id, &choice.id).map(str::to_string),
                index,
                plugin_data: choice.plugin_data.clone(),
            })
            .collect();
        let choices = match self.runtime.trigger(HookPayload::ChoiceFilter {
            node_id: id.clone(),
            choices: authored.clone(),
        }) {
            HookPayload::ChoiceFilter { choices, .. } => choices,
            _ => authored,
        };

        let text = match self.runtime.trigger(HookPayload::ContentProcess {
            node_id: id.clone(),
            text: node.text.clone(),
        }) {
            HookPayload::ContentProcess { text, .. } => text,
            _ => node.text.clone(),
        };

        let current = CurrentNode {
            id: node.id.clone(),
            node_id: node.node_id,
            text,
            node_type: node.node_type,
            choices: choices
                .into_iter()
                .filter(|c| c.target_node_id.is_some())
                .collect(),
            plugin_data: node.plugin_data.clone(),
        };

        self.runtime.trigger(HookPayload::NodeAfterEnter {
            node_id: id,
            node: current.clone(),
        });
        Ok(current)
    }

    /// Follow the edge bound to `choice_id` on the current node.
    pub fn make_choice(&mut self, choice_id: &str) -> Result<CurrentNode, EngineError> {
        let from = self.current.clone().ok_or(EngineError::NotStarted)?;
        let target = self
            .choice_target(&from, choice_id)
            .map(str::to_string)
            .ok_or_else(|| EngineError::UnboundChoice(choice_id.to_string()))?;
        if self.node(&target).is_none() {
            return Err(EngineError::UnknownNode(target));
        }

        self.runtime.trigger(HookPayload::ChoiceBeforeSelect {
            choice_id: choice_id.to_string(),
            target_node_id: target.clone(),
        });
        self.runtime
            .trigger(HookPayload::NodeBeforeLeave { node_id: from });

        self.history.push(target.clone());
        self.set_current(target.clone());

        self.runtime.trigger(HookPayload::ChoiceSelect {
            choice_id: choice_id.to_string(),
            node_id: target,
        });
        self.current_node()
    }

    /// Move directly to `target`, ignoring choices and edges.
    pub fn jump_to_node(&mut self, target: &str) -> Result<CurrentNode, EngineError> {
        let from = self.current.clone().ok_or(EngineError::NotStarted)?;
        if self.node(target).is_none() {
            return Err(EngineError::JumpTargetMissing(target.to_string()));
        }

        self.runtime
            .trigger(HookPayload::NodeBeforeLeave { node_id: from });
        self.history.push(target.to_string());
        self.set_current(target.to_string());
        self.current_node()
    }

    /// Step back one history entry. Returns `None` and changes nothing when
    /// already at the first entry.
    pub fn go_back(&mut self) -> Result<Option<CurrentNode>, EngineError> {
        if self.history.len() <= 1 {
            return Ok(None);
        }
        self.history.pop();
        let Some(previous) = self.history.last().cloned() else {
            return Ok(None);
        };
        self.set_current(previous);
        self.current_node().map(Some)
    }

    pub fn can_go_back(&self) -> bool {
        self.history.len() > 1
    }

    /// Whether the current node is an ending. Does not dispatch hooks.
    pub fn is_ending(&self) -> bool {
        self.current
            .as_deref()
            .and_then(|id| self.node(id))
            .is_some_and(StoryNode::is_ending)
    }

    /// Capture the traversal, letting plugins add their own fields.
    pub fn save(&mut self) -> Result<SaveState, EngineError> {
        let current = self.current.clone().ok_or(EngineError::NotStarted)?;
        let draft = SaveState::new(current, self.history.clone());
        match self.runtime.trigger(HookPayload::DataSave(draft.clone())) {
            HookPayload::DataSave(state) => Ok(state),
            _ => Ok(draft),
        }
    }

    /// Restore a saved traversal. Plugins consume their fields first.
    ///
    /// A state naming an unknown node is rejected before and after the
    /// plugins see it. On rejection the engine and the plugin data store
    /// are left as they were. An empty history is repaired to just the
    /// current node.
    pub fn load(&mut self, state: SaveState) -> Result<CurrentNode, EngineError> {
        self.check_state(&state)?;
        let snapshot = self.runtime.data_snapshot();
        let state = match self.runtime.trigger(HookPayload::DataLoad(state.clone())) {
            HookPayload::DataLoad(adjusted) => adjusted,
            _ => state,
        };
        if let Err(err) = self.check_state(&state) {
            self.runtime.restore_data_snapshot(snapshot);
            return Err(err);
        }

        let SaveState {
            current_node_id,
            mut history,
            ..
        } = state;
        if history.is_empty() {
            history.push(current_node_id.clone());
        }
        tracing::debug!(node = %current_node_id, depth = history.len(), "traversal loaded");
        self.history = history;
        self.set_current(current_node_id);
        self.current_node()
    }

    /// Run `content:render` over a resolved node. `None` when no renderer
    /// produced output.
    pub fn render(&mut self, node: &CurrentNode) -> Option<String> {
        match self.runtime.trigger(HookPayload::ContentRender {
            node_id: node.id.clone(),
            text: node.text.clone(),
            available_choices: node.choices.clone(),
            rendered_html: None,
        }) {
            HookPayload::ContentRender { rendered_html, .. } => rendered_html,
            _ => None,
        }
    }

    pub fn history(&self) -> &[String] {
        &self.history
    }

    /// History with a short text preview per node. Ids that no longer
    /// resolve are skipped.
    pub fn history_entries(&self) -> Vec<HistoryEntry> {
        self.history
            .iter()
            .filter_map(|id| {
                let node = self.node(id)?;
                let mut text: String = node.text.chars().take(HISTORY_PREVIEW_CHARS).collect();
                if node.text.chars().count() > HISTORY_PREVIEW_CHARS {
                    text.push_str("...");
                }
                Some(HistoryEntry {
                    id: id.clone(),
                    text,
                })
            })
            .collect()
    }

    pub fn current_node_id(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn node(&self, id: &str) -> Option<&StoryNode> {
        self.node_index.get(id).map(|&i| &self.story.nodes[i])
    }

    pub fn story(&self) -> &Story {
        &self.story
    }

    pub fn runtime(&self) -> &PluginRuntime {
        &self.runtime
    }

    pub fn runtime_mut(&mut self) -> &mut PluginRuntime {
        &mut self.runtime
    }

    fn choice_target(&self, source: &str, choice_id: &str) -> Option<&str> {
        self.choice_targets
            .get(&(source.to_string(), choice_id.to_string()))
            .map(String::as_str)
    }

    fn set_current(&mut self, id: String) {
        self.runtime
            .context_mut()
            .set_current_node_id(Some(id.clone()));
        self.current = Some(id);
    }

    fn check_state(&self, state: &SaveState) -> Result<(), EngineError> {
        std::iter::once(&state.current_node_id)
            .chain(&state.history)
            .find(|id| self.node(id).is_none())
            .map_or(Ok(()), |id| Err(EngineError::UnknownNode(id.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STORY: &str = r#"(
        nodes: [
            (id: "1", nodeId: 1, type: start, text: "You wake in a cold room.",
             choices: [(id: "c1", text: "Open the door"), (id: "dead", text: "Wait")]),
            (id: "2", nodeId: 2, text: "A corridor stretches ahead.",
             choices: [(id: "c2", text: "Walk on")]),
            (id: "3", nodeId: 3, type: ending, text: "Daylight."),
        ],
        edges: [
            (id: "e1", source: "1", target: "2", sourceHandle: Some("c1")),
            (id: "e2", source: "2", target: "3", sourceHandle: Some("c2")),
        ],
    )"#;

    fn engine() -> TraversalEngine {
        let story = Story::parse_ron(STORY).unwrap();
        TraversalEngine::new(story, PluginRuntime::default())
    }

    #[test]
    fn walks_to_the_ending() {
        let mut engine = engine();
        let first = engine.start(None).unwrap();
        assert_eq!(first.id, "1");
        assert!(!engine.is_ending());

        let second = engine.make_choice("c1").unwrap();
        assert_eq!(second.id, "2");
        assert!(!engine.is_ending());

        let third = engine.make_choice("c2").unwrap();
        assert_eq!(third.node_type, NodeType::Ending);
        assert!(engine.is_ending());
        assert_eq!(engine.history(), ["1", "2", "3"]);
    }

    #[test]
    fn unbound_choices_are_hidden_and_rejected() {
        let mut engine = engine();
        let first = engine.start(None).unwrap();
        assert_eq!(first.choices.len(), 1);
        assert_eq!(first.choices[0].target_node_id.as_deref(), Some("2"));
        assert_eq!(
            engine.make_choice("dead"),
            Err(EngineError::UnboundChoice("dead".into()))
        );
        assert_eq!(engine.current_node_id(), Some("1"));
    }

    #[test]
    fn operations_before_start_fail() {
        let mut engine = engine();
        assert_eq!(engine.current_node(), Err(EngineError::NotStarted));
        assert_eq!(engine.make_choice("c1"), Err(EngineError::NotStarted));
        assert_eq!(engine.save(), Err(EngineError::NotStarted));
        assert!(!engine.is_ending());
    }

    #[test]
    fn start_at_named_node() {
        let mut engine = engine();
        assert_eq!(engine.start(Some("2")).unwrap().id, "2");
        assert_eq!(
            engine.start(Some("99")),
            Err(EngineError::UnknownNode("99".into()))
        );
        assert_eq!(engine.current_node_id(), Some("2"));
    }

    #[test]
    fn no_start_node() {
        let mut story = Story::parse_ron(STORY).unwrap();
        story.nodes[0].node_type = NodeType::Normal;
        let mut engine = TraversalEngine::new(story, PluginRuntime::default());
        assert_eq!(engine.start(None), Err(EngineError::NoStartNode));
    }

    #[test]
    fn go_back_and_jump() {
        let mut engine = engine();
        engine.start(None).unwrap();
        assert_eq!(engine.go_back(), Ok(None));
        assert!(!engine.can_go_back());

        engine.jump_to_node("3").unwrap();
        assert!(engine.can_go_back());
        assert_eq!(
            engine.jump_to_node("nowhere"),
            Err(EngineError::JumpTargetMissing("nowhere".into()))
        );
        let back = engine.go_back().unwrap().unwrap();
        assert_eq!(back.id, "1");
        assert!(!engine.can_go_back());
    }

    #[test]
    fn history_preview_is_truncated() {
        let mut story = Story::parse_ron(STORY).unwrap();
        story.nodes[0].text = "x".repeat(80);
        let mut engine = TraversalEngine::new(story, PluginRuntime::default());
        engine.start(None).unwrap();
        engine.make_choice("c1").unwrap();
        let entries = engine.history_entries();
        assert_eq!(entries[0].text, format!("{}...", "x".repeat(50)));
        assert_eq!(entries[1].text, "A corridor stretches ahead.");
    }

    #[test]
    fn load_validates_and_repairs() {
        let mut engine = engine();
        engine.start(None).unwrap();

        let bad = SaveState::new("42", vec!["1".into()]);
        assert_eq!(engine.load(bad), Err(EngineError::UnknownNode("42".into())));
        assert_eq!(engine.current_node_id(), Some("1"));

        let bare = SaveState::new("2", Vec::new());
        assert_eq!(engine.load(bare).unwrap().id, "2");
        assert_eq!(engine.history(), ["2"]);
    }

    #[test]
    fn render_without_renderer_is_none() {
        let mut engine = engine();
        let node = engine.start(None).unwrap();
        assert!(engine.render(&node).is_none());
    }
}
