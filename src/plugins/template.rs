//! `{{expr}}` substitution over a JSON variable tree.
//!
//! Expressions are deliberately small: literals, `$vars.path` lookups,
//! helper calls, a single-level ternary and bare variable names. Anything
//! that does not resolve is left in the text untouched.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

/// Substitution passes before giving up on reaching a fixed point.
pub const MAX_TEMPLATE_PASSES: usize = 10;

/// Largest array index a variable path may write to.
pub const MAX_ARRAY_INDEX: usize = 1024;

#[derive(Debug, Error, PartialEq)]
pub enum TemplateError {
    #[error("unknown helper function: {0}")]
    UnknownFunction(String),
    #[error("{function}: {reason}")]
    BadArgument { function: String, reason: String },
    #[error("{path}: index {index} is past the limit of {}", MAX_ARRAY_INDEX)]
    IndexOutOfRange { path: String, index: usize },
}

/// A helper callable from templates as `name(args)` or `$fn.name(args)`.
pub type Helper = Arc<dyn Fn(&[Value], &mut StdRng) -> Result<Value, TemplateError> + Send + Sync>;

pub struct TemplateEngine {
    helpers: BTreeMap<String, Helper>,
    rng: StdRng,
}

impl std::fmt::Debug for TemplateEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateEngine")
            .field("helpers", &self.helpers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new(None)
    }
}

impl TemplateEngine {
    /// An engine with the built-in helpers. `seed` makes `random` repeatable.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut engine = Self {
            helpers: BTreeMap::new(),
            rng,
        };
        engine.register_builtins();
        engine
    }

    pub fn register_helper<F>(&mut self, name: impl Into<String>, helper: F)
    where
        F: Fn(&[Value], &mut StdRng) -> Result<Value, TemplateError> + Send + Sync + 'static,
    {
        self.helpers.insert(name.into(), Arc::new(helper));
    }

    pub fn has_helper(&self, name: &str) -> bool {
        self.helpers.contains_key(name)
    }

    pub fn call(&mut self, name: &str, args: &[Value]) -> Result<Value, TemplateError> {
        let helper = self
            .helpers
            .get(name)
            .cloned()
            .ok_or_else(|| TemplateError::UnknownFunction(name.to_string()))?;
        helper(args, &mut self.rng)
    }

    /// Substitute every `{{expr}}` in `text`, repeating until the text stops
    /// changing or [`MAX_TEMPLATE_PASSES`] is reached.
    pub fn render(&mut self, text: &str, vars: &Value) -> String {
        let mut current = text.to_string();
        for _ in 0..MAX_TEMPLATE_PASSES {
            let next = self.render_once(&current, vars);
            if next == current {
                break;
            }
            current = next;
        }
        current
    }

    fn render_once(&mut self, text: &str, vars: &Value) -> String {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;

        while let Some(open) = rest.find("{{") {
            let inner = &rest[open + 2..];
            let close = inner.find(|c| c == '{' || c == '}');
            match close {
                Some(end) if end > 0 && inner[end..].starts_with("}}") => {
                    let expr = &inner[..end];
                    out.push_str(&rest[..open]);
                    match self.evaluate(expr.trim(), vars) {
                        Ok(Some(value)) if !value.is_null() => out.push_str(&display(&value)),
                        Ok(_) => out.push_str(&rest[open..open + end + 4]),
                        Err(err) => {
                            tracing::debug!(expr, error = %err, "template expression failed");
                            out.push_str(&rest[open..open + end + 4]);
                        }
                    }
                    rest = &inner[end + 2..];
                }
                _ => {
                    out.push_str(&rest[..open + 1]);
                    rest = &rest[open + 1..];
                }
            }
        }

        out.push_str(rest);
        out
    }

    /// Evaluate one expression. `Ok(None)` means it did not resolve.
    pub fn evaluate(&mut self, expr: &str, vars: &Value) -> Result<Option<Value>, TemplateError> {
        let expr = expr.trim();

        if let Some((cond, then, otherwise)) = split_ternary(expr) {
            let branch = if truthy(self.evaluate(cond, vars)?.as_ref()) {
                then
            } else {
                otherwise
            };
            return self.evaluate(branch, vars);
        }

        for quote in ['"', '\''] {
            if expr.len() >= 2 && expr.starts_with(quote) && expr.ends_with(quote) {
                return Ok(Some(Value::String(expr[1..expr.len() - 1].to_string())));
            }
        }
        if is_number_literal(expr) {
            return Ok(expr.parse::<f64>().ok().map(number));
        }
        match expr {
            "true" => return Ok(Some(Value::Bool(true))),
            "false" => return Ok(Some(Value::Bool(false))),
            "null" => return Ok(Some(Value::Null)),
            "undefined" => return Ok(None),
            _ => {}
        }

        if let Some(path) = expr.strip_prefix("$vars.") {
            return Ok(resolve_path(vars, path).cloned());
        }

        if let Some((name, args)) = parse_call(expr) {
            if self.has_helper(name) {
                let args = if args.trim().is_empty() {
                    Vec::new()
                } else {
                    args.split(',')
                        .map(|a| -> Result<Value, TemplateError> {
                            Ok(self.evaluate(a, vars)?.unwrap_or(Value::Null))
                        })
                        .collect::<Result<Vec<_>, TemplateError>>()?
                };
                return self.call(name, &args).map(Some);
            }
        }

        Ok(vars.get(expr).cloned())
    }

    fn register_builtins(&mut self) {
        self.register_helper("random", |args, rng| {
            let min = arg(args, 0, "random")?.floor() as i64;
            let max = arg(args, 1, "random")?.floor() as i64;
            if min > max {
                return Err(bad("random", "min is greater than max"));
            }
            Ok(Value::from(rng.gen_range(min..=max)))
        });
        self.register_helper("clamp", |args, _| {
            let value = arg(args, 0, "clamp")?;
            let min = arg(args, 1, "clamp")?;
            let max = arg(args, 2, "clamp")?;
            Ok(number(min.max(max.min(value))))
        });
        self.register_helper("abs", |args, _| Ok(number(arg(args, 0, "abs")?.abs())));
        self.register_helper("floor", |args, _| Ok(number(arg(args, 0, "floor")?.floor())));
        self.register_helper("ceil", |args, _| Ok(number(arg(args, 0, "ceil")?.ceil())));
        self.register_helper("round", |args, _| {
            // half-up, not half-away-from-zero
            Ok(number((arg(args, 0, "round")? + 0.5).floor()))
        });
        self.register_helper("min", |args, _| fold(args, "min", f64::min));
        self.register_helper("max", |args, _| fold(args, "max", f64::max));
    }
}

fn bad(function: &str, reason: &str) -> TemplateError {
    TemplateError::BadArgument {
        function: function.to_string(),
        reason: reason.to_string(),
    }
}

fn arg(args: &[Value], i: usize, function: &str) -> Result<f64, TemplateError> {
    args.get(i)
        .and_then(as_number)
        .ok_or_else(|| bad(function, &format!("argument {} is not a number", i + 1)))
}

fn fold(args: &[Value], function: &str, f: fn(f64, f64) -> f64) -> Result<Value, TemplateError> {
    let mut values = args.iter().enumerate().map(|(i, _)| arg(args, i, function));
    let first = values
        .next()
        .ok_or_else(|| bad(function, "needs at least one argument"))??;
    values
        .try_fold(first, |acc, v| -> Result<f64, TemplateError> { Ok(f(acc, v?)) })
        .map(number)
}

/// Numbers, and strings holding numbers.
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// A JSON number, stored as an integer when it has no fractional part.
pub fn number(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < 9.0e15 {
        Value::from(value as i64)
    } else {
        serde_json::Number::from_f64(value).map_or(Value::Null, Value::Number)
    }
}

/// `false`, `null`, `0`, `""` and unresolved values are falsy.
pub fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

/// How a value reads when spliced into text.
pub fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(display).collect::<Vec<_>>().join(","),
        other => other.to_string(),
    }
}

/// Follow a dotted path with optional `name[i]` indexing.
pub fn resolve_path<'v>(vars: &'v Value, path: &str) -> Option<&'v Value> {
    let mut current = vars;
    for part in path.split('.') {
        current = match split_index(part) {
            Some((key, index)) => current.get(key)?.as_array()?.get(index)?,
            None => match current {
                Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
                _ => current.get(part)?,
            },
        };
    }
    Some(current)
}

/// Write `value` at a dotted path, creating objects and arrays on the way.
/// Arrays are padded with nulls up to the written index, which may not
/// exceed [`MAX_ARRAY_INDEX`].
pub fn set_path(vars: &mut Value, path: &str, value: Value) -> Result<(), TemplateError> {
    let mut current = vars;
    let mut parts = path.split('.').peekable();
    while let Some(part) = parts.next() {
        let last = parts.peek().is_none();
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let Value::Object(map) = current else {
            return Ok(());
        };
        match split_index(part) {
            Some((key, index)) => {
                if index > MAX_ARRAY_INDEX {
                    return Err(TemplateError::IndexOutOfRange {
                        path: path.to_string(),
                        index,
                    });
                }
                let slot = map
                    .entry(key.to_string())
                    .or_insert_with(|| Value::Array(Vec::new()));
                if !slot.is_array() {
                    *slot = Value::Array(Vec::new());
                }
                let Value::Array(items) = slot else {
                    return Ok(());
                };
                if items.len() <= index {
                    items.resize(index + 1, Value::Null);
                }
                if last {
                    items[index] = value;
                    return Ok(());
                }
                current = &mut items[index];
            }
            None => {
                if last {
                    map.insert(part.to_string(), value);
                    return Ok(());
                }
                current = map.entry(part.to_string()).or_insert(Value::Null);
            }
        }
    }
    Ok(())
}

fn is_word(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn split_index(part: &str) -> Option<(&str, usize)> {
    let body = part.strip_suffix(']')?;
    let (key, index) = body.split_once('[')?;
    if !is_word(key) || index.is_empty() || !index.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some((key, index.parse().ok()?))
}

fn is_number_literal(s: &str) -> bool {
    let digits = s.strip_prefix('-').unwrap_or(s);
    let (int, frac) = match digits.split_once('.') {
        Some((int, frac)) => (int, Some(frac)),
        None => (digits, None),
    };
    let all_digits = |p: &str| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit());
    all_digits(int) && frac.map_or(true, all_digits)
}

/// `name(args)` or `$fn.name(args)`.
fn parse_call(expr: &str) -> Option<(&str, &str)> {
    let expr = expr.strip_prefix("$fn.").unwrap_or(expr);
    let body = expr.strip_suffix(')')?;
    let (name, args) = body.split_once('(')?;
    is_word(name).then_some((name, args))
}

/// `cond ? a : b`, splitting at the first `?` and the first `:` after it.
fn split_ternary(expr: &str) -> Option<(&str, &str, &str)> {
    let q = expr.find('?')?;
    let (cond, rest) = (&expr[..q], &expr[q + 1..]);
    let c = rest.find(':')?;
    let (then, otherwise) = (&rest[..c], &rest[c + 1..]);
    if cond.trim().is_empty() || then.trim().is_empty() || otherwise.trim().is_empty() {
        return None;
    }
    Some((cond.trim(), then.trim(), otherwise.trim()))
}
