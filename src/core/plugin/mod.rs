//! Capability modules: the [`Plugin`] trait, its metadata, and the
//! [`PluginRuntime`] that installs plugins and dispatches hooks to them.

pub mod context;
pub mod hooks;
pub mod runtime;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use context::{DataSnapshot, PluginContext, PluginEvent};
pub use hooks::{HookName, HookPayload};
pub use runtime::{PluginRuntime, PluginState, RegisteredPlugin, RuntimeConfig};

/// Free-form plugin settings, exported and imported with the runtime config.
pub type Settings = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("plugin {0} is already registered")]
    AlreadyRegistered(String),
    #[error("plugin {plugin} requires {dependency}, which is not registered")]
    MissingDependency { plugin: String, dependency: String },
    #[error("plugin {plugin} conflicts with enabled plugin {other}")]
    Conflict { plugin: String, other: String },
    #[error("plugin {0} is not registered")]
    NotRegistered(String),
    #[error("plugin {plugin} failed to install: {reason}")]
    Install { plugin: String, reason: String },
    #[error("hook handler failed: {0}")]
    Handler(String),
    #[error("handler for {expected} returned a {actual} payload")]
    HookMismatch { expected: HookName, actual: HookName },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginCategory {
    Tool,
    BasicMod,
    GameMod,
    Theme,
    Enhance,
    Community,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginMetadata {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub description: String,
    pub category: PluginCategory,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Plugins that must be registered first.
    #[serde(default)]
    pub requires: Vec<String>,
    /// Plugins that cannot be enabled at the same time.
    #[serde(default)]
    pub conflicts: Vec<String>,
}

impl PluginMetadata {
    pub fn new(id: impl Into<String>, category: PluginCategory) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            version: "0.1.0".to_string(),
            author: String::new(),
            description: String::new(),
            category,
            tags: Vec::new(),
            requires: Vec::new(),
            conflicts: Vec::new(),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn requires(mut self, id: impl Into<String>) -> Self {
        self.requires.push(id.into());
        self
    }

    pub fn conflicts(mut self, id: impl Into<String>) -> Self {
        self.conflicts.push(id.into());
        self
    }
}

/// A capability module.
///
/// Only hooks listed by [`Plugin::hooks`] are dispatched to the plugin.
/// Handlers receive the payload produced by the previous handler and
/// return the payload for the next; an `Err` skips this handler's output.
#[async_trait]
pub trait Plugin: Send {
    fn metadata(&self) -> &PluginMetadata;

    /// Whether registration also enables and installs the plugin.
    fn enabled_by_default(&self) -> bool {
        true
    }

    fn hooks(&self) -> &[HookName] {
        &[]
    }

    fn install(&mut self, _ctx: &mut PluginContext) -> Result<(), PluginError> {
        Ok(())
    }

    fn uninstall(&mut self, _ctx: &mut PluginContext) -> Result<(), PluginError> {
        Ok(())
    }

    fn on_hook(
        &mut self,
        payload: HookPayload,
        _ctx: &mut PluginContext,
    ) -> Result<HookPayload, PluginError> {
        Ok(payload)
    }

    async fn on_hook_async(
        &mut self,
        payload: HookPayload,
        ctx: &mut PluginContext,
    ) -> Result<HookPayload, PluginError> {
        self.on_hook(payload, ctx)
    }

    fn settings(&self) -> Settings {
        Settings::new()
    }

    fn update_settings(&mut self, _settings: &Settings) {}
}
