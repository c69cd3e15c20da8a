//! WASM bindings for storyloom: a story player driven from JavaScript.
//!
//! Everything crossing the boundary is a JSON string.

use wasm_bindgen::prelude::*;

use storyloom::core::engine::{CurrentNode, TraversalEngine};
use storyloom::core::layout::{layout_story, HierarchicalConfig, LayoutMode, RadialConfig};
use storyloom::core::plugin::PluginRuntime;
use storyloom::core::validator::validate_story;
use storyloom::plugins::{set_variable, variables, RuntimePlugin};
use storyloom::schema::save::SaveState;
use storyloom::schema::story::Story;

mod data {
    pub const HAUNTED_MANOR: &str = include_str!("../../tests/fixtures/haunted_manor.ron");
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct PlayerView<'a> {
    node: &'a CurrentNode,
    is_ending: bool,
    can_go_back: bool,
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, JsError> {
    serde_json::to_string(value).map_err(|e| JsError::new(&format!("Serialization error: {e}")))
}

#[wasm_bindgen]
pub struct StoryPlayer {
    engine: TraversalEngine,
}

#[wasm_bindgen]
impl StoryPlayer {
    /// Create a player for a story given as JSON. `seed` fixes template
    /// randomness.
    #[wasm_bindgen(constructor)]
    pub fn new(story_json: &str, seed: u64) -> Result<StoryPlayer, JsError> {
        let story = Story::parse_json(story_json)
            .map_err(|e| JsError::new(&format!("Story parse error: {e}")))?;
        Self::with_story(story, seed)
    }

    /// A player for the bundled Hollow Manor story.
    pub fn demo(seed: u64) -> Result<StoryPlayer, JsError> {
        let story = Story::parse_ron(data::HAUNTED_MANOR)
            .map_err(|e| JsError::new(&format!("Story parse error: {e}")))?;
        Self::with_story(story, seed)
    }

    /// Start (or restart) at the start node, or at `node_id` when given.
    pub fn start(&mut self, node_id: Option<String>) -> Result<String, JsError> {
        let node = self
            .engine
            .start(node_id.as_deref())
            .map_err(|e| JsError::new(&e.to_string()))?;
        self.view(&node)
    }

    pub fn current(&mut self) -> Result<String, JsError> {
        let node = self
            .engine
            .current_node()
            .map_err(|e| JsError::new(&e.to_string()))?;
        self.view(&node)
    }

    pub fn choose(&mut self, choice_id: &str) -> Result<String, JsError> {
        let node = self
            .engine
            .make_choice(choice_id)
            .map_err(|e| JsError::new(&e.to_string()))?;
        self.view(&node)
    }

    pub fn jump(&mut self, node_id: &str) -> Result<String, JsError> {
        let node = self
            .engine
            .jump_to_node(node_id)
            .map_err(|e| JsError::new(&e.to_string()))?;
        self.view(&node)
    }

    /// Step back; returns `"null"` when already at the first node.
    pub fn back(&mut self) -> Result<String, JsError> {
        match self
            .engine
            .go_back()
            .map_err(|e| JsError::new(&e.to_string()))?
        {
            Some(node) => self.view(&node),
            None => Ok("null".to_string()),
        }
    }

    pub fn save(&mut self) -> Result<String, JsError> {
        let state = self
            .engine
            .save()
            .map_err(|e| JsError::new(&e.to_string()))?;
        to_json(&state)
    }

    pub fn load(&mut self, save_json: &str) -> Result<String, JsError> {
        let state = SaveState::from_json(save_json)
            .map_err(|e| JsError::new(&format!("Invalid save JSON: {e}")))?;
        let node = self
            .engine
            .load(state)
            .map_err(|e| JsError::new(&e.to_string()))?;
        self.view(&node)
    }

    pub fn history(&self) -> Result<String, JsError> {
        to_json(&self.engine.history_entries())
    }

    pub fn variables(&self) -> Result<String, JsError> {
        to_json(&variables(self.engine.runtime().context()))
    }

    /// Plugin events raised since the last call, oldest first.
    pub fn events(&mut self) -> Result<String, JsError> {
        to_json(&self.engine.runtime_mut().drain_events())
    }

    /// Set one story variable from a JSON value.
    pub fn set_variable(&mut self, path: &str, value_json: &str) -> Result<(), JsError> {
        let value = serde_json::from_str(value_json)
            .map_err(|e| JsError::new(&format!("Invalid value JSON: {e}")))?;
        set_variable(self.engine.runtime_mut().context_mut(), path, value)
            .map_err(|e| JsError::new(&e.to_string()))
    }

    /// Validation report of the loaded story.
    pub fn validate(&self) -> Result<String, JsError> {
        to_json(&validate_story(self.engine.story()))
    }

    /// The story's nodes repositioned by `mode` (`hierarchical` or `radial`).
    pub fn layout(&self, mode: &str) -> Result<String, JsError> {
        let mode: LayoutMode = mode.parse().map_err(|e: String| JsError::new(&e))?;
        let nodes = layout_story(
            self.engine.story(),
            mode,
            &HierarchicalConfig::default(),
            &RadialConfig::default(),
        );
        to_json(&nodes)
    }
}

// Private helpers
impl StoryPlayer {
    fn with_story(story: Story, seed: u64) -> Result<StoryPlayer, JsError> {
        let mut runtime = PluginRuntime::default();
        runtime
            .register(Box::new(RuntimePlugin::with_seed(seed)))
            .map_err(|e| JsError::new(&format!("Plugin error: {e}")))?;
        Ok(StoryPlayer {
            engine: TraversalEngine::new(story, runtime),
        })
    }

    fn view(&self, node: &CurrentNode) -> Result<String, JsError> {
        to_json(&PlayerView {
            node,
            is_ending: node.is_ending(),
            can_go_back: self.engine.can_go_back(),
        })
    }
}
