//! Built-in plugins.

pub mod runtime;
pub mod script;
pub mod template;

pub use runtime::{
    get_variable, reset_variables, set_variable, variables, RuntimePlugin, RUNTIME_PLUGIN_ID,
    VARIABLES_KEY,
};
pub use script::{ChoiceScripts, ExpressionScripts, NodeScripts, ScriptError, ScriptEvaluator, ScriptScope};
pub use template::{TemplateEngine, TemplateError};
