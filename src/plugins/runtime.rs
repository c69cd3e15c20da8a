//! The built-in variable runtime: a JSON variable store kept in the
//! plugin context, template substitution over node text, and node and
//! choice scripts run through a [`ScriptEvaluator`].
//!
//! Variables live in the shared data store under [`VARIABLES_KEY`], so
//! hosts read and change them through the context with [`variables`],
//! [`get_variable`], [`set_variable`] and [`reset_variables`].

use serde_json::{json, Map, Value};

use super::script::{ChoiceScripts, ExpressionScripts, NodeScripts, ScriptEvaluator, ScriptScope};
use super::template::{resolve_path, set_path, truthy, TemplateEngine, TemplateError};
use crate::core::engine::ResolvedChoice;
use crate::core::plugin::{
    HookName, HookPayload, Plugin, PluginCategory, PluginContext, PluginError, PluginMetadata,
};

pub const RUNTIME_PLUGIN_ID: &str = "basicmod.runtime";

/// Data store key of the variable tree.
pub const VARIABLES_KEY: &str = "$variables";

const HOOKS: &[HookName] = &[
    HookName::NodeBeforeEnter,
    HookName::NodeBeforeLeave,
    HookName::ChoiceFilter,
    HookName::ChoiceBeforeSelect,
    HookName::ContentProcess,
    HookName::DataSave,
    HookName::DataLoad,
];

pub struct RuntimePlugin {
    meta: PluginMetadata,
    templates: TemplateEngine,
    scripts: Option<Box<dyn ScriptEvaluator>>,
}

impl Default for RuntimePlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimePlugin {
    /// A runtime with the built-in helpers and [`ExpressionScripts`].
    pub fn new() -> Self {
        Self::build(TemplateEngine::new(None))
    }

    /// Like [`RuntimePlugin::new`], with a fixed seed for `random`.
    pub fn with_seed(seed: u64) -> Self {
        Self::build(TemplateEngine::new(Some(seed)))
    }

    fn build(templates: TemplateEngine) -> Self {
        Self {
            meta: PluginMetadata::new(RUNTIME_PLUGIN_ID, PluginCategory::BasicMod)
                .name("Variable runtime")
                .description("Variables, text templates and node/choice scripts"),
            templates,
            scripts: Some(Box::new(ExpressionScripts)),
        }
    }

    pub fn with_script_evaluator(mut self, evaluator: impl ScriptEvaluator + 'static) -> Self {
        self.scripts = Some(Box::new(evaluator));
        self
    }

    /// Ignore every script; choice conditions then never hide a choice.
    pub fn without_scripts(mut self) -> Self {
        self.scripts = None;
        self
    }

    pub fn with_helper<F>(mut self, name: impl Into<String>, helper: F) -> Self
    where
        F: Fn(&[Value], &mut rand::rngs::StdRng) -> Result<Value, TemplateError>
            + Send
            + Sync
            + 'static,
    {
        self.templates.register_helper(name, helper);
        self
    }

    pub fn templates(&self) -> &TemplateEngine {
        &self.templates
    }

    /// Run `script`, storing the variables back only when it succeeds.
    fn run_script(
        &mut self,
        script: Option<Value>,
        ctx: &mut PluginContext,
        node_id: Option<&str>,
        choice_id: Option<&str>,
    ) -> Result<(), PluginError> {
        let (Some(script), Some(evaluator)) = (script, self.scripts.as_mut()) else {
            return Ok(());
        };
        let mut vars = variables(ctx);
        let before = vars.clone();
        evaluator
            .evaluate(
                &script,
                ScriptScope {
                    vars: &mut vars,
                    functions: &mut self.templates,
                    node_id,
                    choice_id,
                },
            )
            .map_err(|err| {
                PluginError::Handler(format!(
                    "script on node {} failed: {err}",
                    node_id.unwrap_or("?")
                ))
            })?;
        if vars != before {
            ctx.set(VARIABLES_KEY, vars);
        }
        Ok(())
    }

    fn filter_choices(
        &mut self,
        node_id: &str,
        choices: Vec<ResolvedChoice>,
        ctx: &PluginContext,
    ) -> Vec<ResolvedChoice> {
        let Some(evaluator) = self.scripts.as_mut() else {
            return choices;
        };
        let mut vars = variables(ctx);
        let mut visible = Vec::with_capacity(choices.len());
        for choice in choices {
            let condition = ChoiceScripts::from_plugin_data(&choice.plugin_data).and_then(|s| s.condition);
            let Some(condition) = condition else {
                visible.push(choice);
                continue;
            };
            let shown = match evaluator.evaluate(
                &condition,
                ScriptScope {
                    vars: &mut vars,
                    functions: &mut self.templates,
                    node_id: Some(node_id),
                    choice_id: Some(choice.id.as_str()),
                },
            ) {
                Ok(value) => truthy(value.as_ref()),
                Err(err) => {
                    tracing::warn!(node = node_id, choice = %choice.id, error = %err, "choice condition failed; keeping choice");
                    true
                }
            };
            if shown {
                visible.push(choice);
            }
        }
        visible
    }
}

impl Plugin for RuntimePlugin {
    fn metadata(&self) -> &PluginMetadata {
        &self.meta
    }

    fn hooks(&self) -> &[HookName] {
        HOOKS
    }

    fn install(&mut self, ctx: &mut PluginContext) -> Result<(), PluginError> {
        if ctx.get(VARIABLES_KEY).is_none() {
            ctx.set(VARIABLES_KEY, Value::Object(Map::new()));
        }
        Ok(())
    }

    fn on_hook(
        &mut self,
        payload: HookPayload,
        ctx: &mut PluginContext,
    ) -> Result<HookPayload, PluginError> {
        match payload {
            HookPayload::NodeBeforeEnter { node_id } => {
                let script = ctx
                    .node(&node_id)
                    .and_then(|n| NodeScripts::from_plugin_data(&n.plugin_data))
                    .and_then(|s| s.on_enter);
                self.run_script(script, ctx, Some(node_id.as_str()), None)?;
                Ok(HookPayload::NodeBeforeEnter { node_id })
            }
            HookPayload::NodeBeforeLeave { node_id } => {
                let script = ctx
                    .node(&node_id)
                    .and_then(|n| NodeScripts::from_plugin_data(&n.plugin_data))
                    .and_then(|s| s.on_leave);
                self.run_script(script, ctx, Some(node_id.as_str()), None)?;
                Ok(HookPayload::NodeBeforeLeave { node_id })
            }
            HookPayload::ChoiceFilter { node_id, choices } => {
                let choices = self.filter_choices(&node_id, choices, ctx);
                Ok(HookPayload::ChoiceFilter { node_id, choices })
            }
            HookPayload::ChoiceBeforeSelect {
                choice_id,
                target_node_id,
            } => {
                let node_id = ctx.current_node_id().map(str::to_string);
                let script = node_id
                    .as_deref()
                    .and_then(|id| ctx.node(id))
                    .and_then(|n| n.choice(&choice_id))
                    .and_then(|c| ChoiceScripts::from_plugin_data(&c.plugin_data))
                    .and_then(|s| s.on_select);
                self.run_script(script, ctx, node_id.as_deref(), Some(choice_id.as_str()))?;
                Ok(HookPayload::ChoiceBeforeSelect {
                    choice_id,
                    target_node_id,
                })
            }
            HookPayload::ContentProcess { node_id, text } => {
                let vars = variables(ctx);
                let text = self.templates.render(&text, &vars);
                Ok(HookPayload::ContentProcess { node_id, text })
            }
            HookPayload::DataSave(mut state) => {
                state.extra.insert(VARIABLES_KEY.to_string(), variables(ctx));
                Ok(HookPayload::DataSave(state))
            }
            HookPayload::DataLoad(state) => {
                if let Some(vars) = state.extra.get(VARIABLES_KEY) {
                    ctx.set(VARIABLES_KEY, vars.clone());
                }
                Ok(HookPayload::DataLoad(state))
            }
            other => Ok(other),
        }
    }
}

/// The whole variable tree; an empty object before anything was set.
pub fn variables(ctx: &PluginContext) -> Value {
    ctx.get(VARIABLES_KEY)
        .cloned()
        .unwrap_or_else(|| Value::Object(Map::new()))
}

pub fn get_variable(ctx: &PluginContext, path: &str) -> Option<Value> {
    ctx.get(VARIABLES_KEY)
        .and_then(|vars| resolve_path(vars, path))
        .cloned()
}

/// Write one variable and raise `variable:change`. Nothing changes when
/// the path cannot be written.
pub fn set_variable(ctx: &mut PluginContext, path: &str, value: Value) -> Result<(), TemplateError> {
    let mut vars = variables(ctx);
    set_path(&mut vars, path, value.clone())?;
    ctx.set(VARIABLES_KEY, vars);
    ctx.emit("variable:change", json!({ "path": path, "value": value }));
    Ok(())
}

/// Drop every variable and raise `variable:reset`.
pub fn reset_variables(ctx: &mut PluginContext) {
    ctx.set(VARIABLES_KEY, Value::Object(Map::new()));
    ctx.emit("variable:reset", json!({}));
}
