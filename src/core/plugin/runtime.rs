use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{
    DataSnapshot, HookName, HookPayload, Plugin, PluginCategory, PluginContext, PluginError,
    PluginEvent, PluginMetadata, Settings,
};

/// Runtime-wide policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Categories in which at most one plugin may be enabled at a time.
    pub exclusive_categories: Vec<PluginCategory>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            exclusive_categories: vec![PluginCategory::Theme, PluginCategory::Enhance],
        }
    }
}

pub struct RegisteredPlugin {
    plugin: Box<dyn Plugin>,
    enabled: bool,
    installed_at: DateTime<Utc>,
}

impl RegisteredPlugin {
    pub fn id(&self) -> &str {
        &self.plugin.metadata().id
    }

    pub fn metadata(&self) -> &PluginMetadata {
        self.plugin.metadata()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn installed_at(&self) -> DateTime<Utc> {
        self.installed_at
    }

    pub fn plugin(&self) -> &dyn Plugin {
        self.plugin.as_ref()
    }
}

impl std::fmt::Debug for RegisteredPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredPlugin")
            .field("id", &self.id())
            .field("enabled", &self.enabled)
            .field("installed_at", &self.installed_at)
            .finish()
    }
}

/// Exported per-plugin state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginState {
    pub enabled: bool,
    #[serde(default)]
    pub settings: Settings,
}

/// Owns the registered plugins, their hook subscriptions and the shared
/// [`PluginContext`]. Each traversal session owns its own runtime.
#[derive(Debug, Default)]
pub struct PluginRuntime {
    config: RuntimeConfig,
    plugins: Vec<RegisteredPlugin>,
    /// Subscribers per hook, in install order.
    hooks: FxHashMap<HookName, Vec<String>>,
    context: PluginContext,
}

impl PluginRuntime {
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Register a plugin and, if it is enabled by default, install it.
    ///
    /// Every check runs before the plugin is added; an install failure
    /// removes it again, so a rejected call leaves the runtime unchanged.
    /// A plugin joining an exclusive category that already has an enabled
    /// member is registered disabled.
    pub fn register(&mut self, plugin: Box<dyn Plugin>) -> Result<(), PluginError> {
        let meta = plugin.metadata().clone();
        if self.has_plugin(&meta.id) {
            return Err(PluginError::AlreadyRegistered(meta.id));
        }
        if let Some(dependency) = meta.requires.iter().find(|dep| !self.has_plugin(dep)) {
            return Err(PluginError::MissingDependency {
                plugin: meta.id.clone(),
                dependency: dependency.clone(),
            });
        }

        let mut enabled = plugin.enabled_by_default();
        if enabled {
            let declared = meta.conflicts.iter().find(|c| self.is_enabled(c)).cloned();
            let reverse = self
                .enabled_plugins()
                .find(|p| p.metadata().conflicts.contains(&meta.id))
                .map(|p| p.id().to_string());
            if let Some(other) = declared.or(reverse) {
                return Err(PluginError::Conflict {
                    plugin: meta.id.clone(),
                    other,
                });
            }
            if let Some(sibling) = self.exclusive_sibling(&meta) {
                tracing::debug!(plugin = %meta.id, %sibling, "exclusive category taken; registering disabled");
                enabled = false;
            }
        }

        self.plugins.push(RegisteredPlugin {
            plugin,
            enabled,
            installed_at: Utc::now(),
        });
        if enabled {
            let idx = self.plugins.len() - 1;
            if let Err(err) = self.activate(idx) {
                self.plugins.pop();
                return Err(err);
            }
        }

        tracing::debug!(plugin = %meta.id, enabled, "plugin registered");
        Ok(())
    }

    /// Remove a plugin, uninstalling it first if enabled. Returns whether
    /// anything was removed.
    pub fn unregister(&mut self, id: &str) -> bool {
        let Some(idx) = self.index_of(id) else {
            return false;
        };
        if self.plugins[idx].enabled {
            self.deactivate(idx);
        }
        self.plugins.remove(idx);
        tracing::debug!(plugin = %id, "plugin unregistered");
        true
    }

    /// Enable a plugin, first disabling everything it conflicts with in
    /// either direction and any sibling in an exclusive category.
    ///
    /// If installation fails the plugin stays disabled and the plugins
    /// disabled on its behalf are re-enabled.
    pub fn enable(&mut self, id: &str) -> Result<(), PluginError> {
        let idx = self
            .index_of(id)
            .ok_or_else(|| PluginError::NotRegistered(id.to_string()))?;
        if self.plugins[idx].enabled {
            return Ok(());
        }

        let meta = self.plugins[idx].metadata().clone();
        let mut displaced: Vec<String> = Vec::new();
        let mut displace = |other: &str| {
            if !displaced.iter().any(|d| d == other) {
                displaced.push(other.to_string());
            }
        };

        for conflict in &meta.conflicts {
            if self.is_enabled(conflict) {
                displace(conflict);
            }
        }
        for other in self.plugins.iter().filter(|p| p.enabled && p.id() != id) {
            if other.metadata().conflicts.iter().any(|c| c == id) {
                displace(other.id());
            }
        }
        if self.config.exclusive_categories.contains(&meta.category) {
            for other in self.plugins.iter().filter(|p| p.enabled && p.id() != id) {
                if other.metadata().category == meta.category {
                    displace(other.id());
                }
            }
        }

        for other in &displaced {
            if let Some(i) = self.index_of(other) {
                self.deactivate(i);
            }
        }

        if let Err(err) = self.activate(idx) {
            for other in &displaced {
                if let Some(i) = self.index_of(other) {
                    if let Err(restore) = self.activate(i) {
                        tracing::warn!(plugin = %other, error = %restore, "could not re-enable plugin");
                    }
                }
            }
            return Err(err);
        }

        tracing::debug!(plugin = %id, displaced = ?displaced, "plugin enabled");
        Ok(())
    }

    pub fn disable(&mut self, id: &str) -> Result<(), PluginError> {
        let idx = self
            .index_of(id)
            .ok_or_else(|| PluginError::NotRegistered(id.to_string()))?;
        if self.plugins[idx].enabled {
            self.deactivate(idx);
            tracing::debug!(plugin = %id, "plugin disabled");
        }
        Ok(())
    }

    /// Run every subscribed, enabled plugin over `payload` in turn and
    /// return the final value.
    ///
    /// Handler errors and payloads of the wrong kind are logged and
    /// skipped; the previous value carries forward.
    pub fn trigger(&mut self, payload: HookPayload) -> HookPayload {
        let hook = payload.hook();
        let Some(subscribers) = self.hooks.get(&hook).cloned() else {
            return payload;
        };

        let mut current = payload;
        for id in &subscribers {
            let Some(entry) = self.plugins.iter_mut().find(|p| p.enabled && p.id() == id) else {
                continue;
            };
            let result = entry.plugin.on_hook(current.clone(), &mut self.context);
            current = accept(hook, id, current, result);
        }
        current
    }

    /// Like [`trigger`](Self::trigger), awaiting each handler before the next.
    pub async fn trigger_async(&mut self, payload: HookPayload) -> HookPayload {
        let hook = payload.hook();
        let Some(subscribers) = self.hooks.get(&hook).cloned() else {
            return payload;
        };

        let mut current = payload;
        for id in &subscribers {
            let Some(entry) = self.plugins.iter_mut().find(|p| p.enabled && p.id() == id) else {
                continue;
            };
            let result = entry
                .plugin
                .on_hook_async(current.clone(), &mut self.context)
                .await;
            current = accept(hook, id, current, result);
        }
        current
    }

    /// An enabled plugin sharing `meta`'s exclusive category, if any.
    fn exclusive_sibling(&self, meta: &PluginMetadata) -> Option<String> {
        if !self.config.exclusive_categories.contains(&meta.category) {
            return None;
        }
        self.enabled_plugins()
            .find(|p| p.id() != meta.id && p.metadata().category == meta.category)
            .map(|p| p.id().to_string())
    }

    pub fn has_plugin(&self, id: &str) -> bool {
        self.index_of(id).is_some()
    }

    pub fn is_enabled(&self, id: &str) -> bool {
        self.plugin(id).is_some_and(|p| p.enabled)
    }

    pub fn plugin(&self, id: &str) -> Option<&RegisteredPlugin> {
        self.plugins.iter().find(|p| p.id() == id)
    }

    /// Registered plugins in registration order.
    pub fn plugins(&self) -> impl Iterator<Item = &RegisteredPlugin> {
        self.plugins.iter()
    }

    pub fn enabled_plugins(&self) -> impl Iterator<Item = &RegisteredPlugin> {
        self.plugins.iter().filter(|p| p.enabled)
    }

    pub fn export_config(&self) -> BTreeMap<String, PluginState> {
        self.plugins
            .iter()
            .map(|p| {
                (
                    p.id().to_string(),
                    PluginState {
                        enabled: p.enabled,
                        settings: p.plugin.settings(),
                    },
                )
            })
            .collect()
    }

    /// Apply exported state. Unknown plugin ids are ignored.
    pub fn import_config(&mut self, config: &BTreeMap<String, PluginState>) -> Result<(), PluginError> {
        for (id, state) in config {
            if !self.has_plugin(id) {
                tracing::debug!(plugin = %id, "skipping config for unknown plugin");
                continue;
            }
            if state.enabled {
                self.enable(id)?;
            } else {
                self.disable(id)?;
            }
            if !state.settings.is_empty() {
                if let Some(idx) = self.index_of(id) {
                    self.plugins[idx].plugin.update_settings(&state.settings);
                }
            }
        }
        Ok(())
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn context(&self) -> &PluginContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut PluginContext {
        &mut self.context
    }

    pub fn data_snapshot(&self) -> DataSnapshot {
        self.context.snapshot()
    }

    pub fn restore_data_snapshot(&mut self, snapshot: DataSnapshot) {
        self.context.restore(snapshot);
    }

    pub fn clear_data(&mut self) {
        self.context.clear();
    }

    pub fn drain_events(&mut self) -> Vec<PluginEvent> {
        self.context.drain_events()
    }

    fn index_of(&self, id: &str) -> Option<usize> {
        self.plugins.iter().position(|p| p.id() == id)
    }

    /// Install the plugin at `idx` and subscribe its hooks.
    fn activate(&mut self, idx: usize) -> Result<(), PluginError> {
        let entry = &mut self.plugins[idx];
        let id = entry.id().to_string();
        entry
            .plugin
            .install(&mut self.context)
            .map_err(|e| PluginError::Install {
                plugin: id.clone(),
                reason: e.to_string(),
            })?;
        entry.enabled = true;
        for hook in entry.plugin.hooks() {
            self.hooks.entry(*hook).or_default().push(id.clone());
        }
        tracing::debug!(plugin = %id, "plugin installed");
        Ok(())
    }

    /// Unsubscribe and uninstall. Uninstall failures are logged; the plugin
    /// ends up disabled regardless.
    fn deactivate(&mut self, idx: usize) {
        let entry = &mut self.plugins[idx];
        let id = entry.id().to_string();
        for subscribers in self.hooks.values_mut() {
            subscribers.retain(|s| *s != id);
        }
        if let Err(err) = entry.plugin.uninstall(&mut self.context) {
            tracing::warn!(plugin = %id, error = %err, "plugin uninstall failed");
        }
        entry.enabled = false;
    }
}

fn accept(
    hook: HookName,
    plugin: &str,
    previous: HookPayload,
    result: Result<HookPayload, PluginError>,
) -> HookPayload {
    match result {
        Ok(next) if next.hook() == hook => next,
        Ok(next) => {
            let err = PluginError::HookMismatch {
                expected: hook,
                actual: next.hook(),
            };
            tracing::warn!(plugin, %hook, error = %err, "discarding hook output");
            previous
        }
        Err(err) => {
            tracing::warn!(plugin, %hook, error = %err, "hook handler failed");
            previous
        }
    }
}
