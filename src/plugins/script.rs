//! Node and choice scripts, and the evaluator seam that runs them.
//!
//! Scripts are opaque to the runtime. They live in a node's or choice's
//! plugin data under [`SCRIPTS_KEY`] and are handed to whatever
//! [`ScriptEvaluator`] the host installed. [`ExpressionScripts`] is the
//! built-in evaluator for plain-text scripts.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::template::{
    as_number, number, resolve_path, set_path, truthy, TemplateEngine, TemplateError,
};
use crate::schema::story::PluginData;

/// Plugin data key holding a node's or choice's scripts.
pub const SCRIPTS_KEY: &str = "blockly.scripts";

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("script evaluation failed: {0}")]
    Evaluation(String),
    #[error("script format is not supported by this evaluator")]
    Unsupported,
    #[error(transparent)]
    Template(#[from] TemplateError),
}

/// What a script can see and change.
pub struct ScriptScope<'a> {
    pub vars: &'a mut Value,
    pub functions: &'a mut TemplateEngine,
    pub node_id: Option<&'a str>,
    pub choice_id: Option<&'a str>,
}

/// Runs a script blob against a scope.
///
/// `Ok(None)` is a no-op result; `Ok(Some(v))` is a value, read as a
/// boolean when the script is a choice condition.
pub trait ScriptEvaluator: Send {
    fn evaluate(&mut self, script: &Value, scope: ScriptScope<'_>) -> Result<Option<Value>, ScriptError>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeScripts {
    #[serde(default)]
    pub on_enter: Option<Value>,
    #[serde(default)]
    pub on_leave: Option<Value>,
}

impl NodeScripts {
    pub fn from_plugin_data(data: &PluginData) -> Option<NodeScripts> {
        data.get(SCRIPTS_KEY)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChoiceScripts {
    #[serde(default)]
    pub condition: Option<Value>,
    #[serde(default)]
    pub on_select: Option<Value>,
}

impl ChoiceScripts {
    pub fn from_plugin_data(data: &PluginData) -> Option<ChoiceScripts> {
        data.get(SCRIPTS_KEY)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

/// Evaluates string scripts made of `;`-separated statements.
///
/// A statement is `path = expr`, `path += expr`, `path -= expr`, or a bare
/// expression. Expressions are template expressions extended with `!`,
/// `&&`, `||` and the comparisons `== != < <= > >=`. The result of the last
/// statement is returned. Structured (block workspace) scripts are rejected
/// with [`ScriptError::Unsupported`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpressionScripts;

const COMPARISONS: [&str; 6] = ["==", "!=", ">=", "<=", ">", "<"];

impl ScriptEvaluator for ExpressionScripts {
    fn evaluate(&mut self, script: &Value, scope: ScriptScope<'_>) -> Result<Option<Value>, ScriptError> {
        let Value::String(source) = script else {
            return Err(ScriptError::Unsupported);
        };
        let mut result = None;
        for statement in source.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            result = run_statement(statement, scope.vars, scope.functions)?;
        }
        Ok(result)
    }
}

fn run_statement(
    statement: &str,
    vars: &mut Value,
    functions: &mut TemplateEngine,
) -> Result<Option<Value>, ScriptError> {
    let Some((target, op, rhs)) = split_assignment(statement) else {
        return eval(statement, vars, functions);
    };
    let rhs = eval(rhs, vars, functions)?.unwrap_or(Value::Null);
    let value = match op {
        "=" => rhs,
        _ => {
            let current = resolve_path(vars, target).and_then(as_number).unwrap_or(0.0);
            let delta = as_number(&rhs)
                .ok_or_else(|| ScriptError::Evaluation(format!("{target} {op} needs a number")))?;
            number(if op == "+=" { current + delta } else { current - delta })
        }
    };
    set_path(vars, target, value.clone()).map_err(|e| ScriptError::Evaluation(e.to_string()))?;
    Ok(Some(value))
}

/// `(target, operator, rhs)` when the statement assigns to a path.
fn split_assignment(statement: &str) -> Option<(&str, &str, &str)> {
    let bytes = statement.as_bytes();
    let at = (0..bytes.len()).find(|&i| {
        bytes[i] == b'='
            && bytes.get(i + 1) != Some(&b'=')
            && (i == 0 || !matches!(bytes[i - 1], b'=' | b'!' | b'<' | b'>'))
    })?;
    let (op, lhs_end) = match at.checked_sub(1).map(|i| bytes[i]) {
        Some(b'+') => ("+=", at - 1),
        Some(b'-') => ("-=", at - 1),
        _ => ("=", at),
    };
    let target = statement[..lhs_end].trim();
    let target = target.strip_prefix("$vars.").unwrap_or(target);
    let is_path = !target.is_empty()
        && target
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '[' | ']'));
    is_path.then(|| (target, op, statement[at + 1..].trim()))
}

fn eval(expr: &str, vars: &Value, functions: &mut TemplateEngine) -> Result<Option<Value>, ScriptError> {
    let expr = expr.trim();
    if let Some((a, b)) = expr.split_once("||") {
        let left = eval(a, vars, functions)?;
        if truthy(left.as_ref()) {
            return Ok(left);
        }
        return eval(b, vars, functions);
    }
    if let Some((a, b)) = expr.split_once("&&") {
        let left = eval(a, vars, functions)?;
        if !truthy(left.as_ref()) {
            return Ok(left);
        }
        return eval(b, vars, functions);
    }
    for op in COMPARISONS {
        if let Some((a, b)) = expr.split_once(op) {
            let left = eval(a, vars, functions)?.unwrap_or(Value::Null);
            let right = eval(b, vars, functions)?.unwrap_or(Value::Null);
            return Ok(Some(Value::Bool(compare(&left, op, &right))));
        }
    }
    if let Some(inner) = expr.strip_prefix('!') {
        let value = eval(inner, vars, functions)?;
        return Ok(Some(Value::Bool(!truthy(value.as_ref()))));
    }
    Ok(functions.evaluate(expr, vars)?)
}

fn compare(left: &Value, op: &str, right: &Value) -> bool {
    if let (Some(l), Some(r)) = (as_number(left), as_number(right)) {
        return match op {
            "==" => l == r,
            "!=" => l != r,
            ">=" => l >= r,
            "<=" => l <= r,
            ">" => l > r,
            _ => l < r,
        };
    }
    match (op, left, right) {
        ("==", _, _) => left == right,
        ("!=", _, _) => left != right,
        (_, Value::String(l), Value::String(r)) => match op {
            ">=" => l >= r,
            "<=" => l <= r,
            ">" => l > r,
            _ => l < r,
        },
        // ordering against a missing or non-scalar value never holds
        _ => false,
    }
}
