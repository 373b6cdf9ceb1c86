//! Value and condition evaluation.
//!
//! An [`Evaluator`] resolves AST values to JSON against a
//! [`RuntimeContext`]. It carries the template's let bindings and a stack
//! of local names bound by iterated array entries, so `Value::Ref("m.name")`
//! inside a `for m in ...` entry resolves to the current item.

use crate::context::RuntimeContext;
use crate::error::{kind_name, EvalError};
use crate::{document, stdlib};
use cuekit_compiler::ast::{CompOp, Condition, Transform, Value};
use cuekit_compiler::path::{parse_path, Segment};
use serde_json::{Map, Number, Value as JsonValue};
use std::cmp::Ordering;

/// Resolves values and conditions for one render.
#[derive(Debug, Clone)]
pub struct Evaluator<'a> {
    ctx: &'a RuntimeContext,
    lets: Map<String, JsonValue>,
    locals: Vec<(String, JsonValue)>,
}

impl<'a> Evaluator<'a> {
    pub fn new(ctx: &'a RuntimeContext) -> Self {
        Self {
            ctx,
            lets: Map::new(),
            locals: Vec::new(),
        }
    }

    pub fn context(&self) -> &'a RuntimeContext {
        self.ctx
    }

    /// Evaluate and record a let binding; later values may reference it.
    pub fn bind_let(&mut self, name: &str, value: &Value) -> Result<(), EvalError> {
        let resolved = self.value(value)?;
        tracing::debug!(name, "bound let");
        self.lets.insert(name.to_string(), resolved);
        Ok(())
    }

    pub(crate) fn bind_value(&mut self, name: &str, value: JsonValue) {
        self.lets.insert(name.to_string(), value);
    }

    pub(crate) fn push_local(&mut self, name: &str, value: JsonValue) {
        self.locals.push((name.to_string(), value));
    }

    pub(crate) fn pop_local(&mut self) {
        self.locals.pop();
    }

    // ========================================================================
    // Values
    // ========================================================================

    pub fn value(&mut self, value: &Value) -> Result<JsonValue, EvalError> {
        match value {
            Value::Literal(json) => Ok(json.clone()),
            Value::Param(param) => Ok(self
                .ctx
                .param(&param.name)
                .cloned()
                .or_else(|| param.default.clone())
                .unwrap_or(JsonValue::Null)),
            Value::Context(field) => Ok(self.ctx.field(field)),
            Value::Ref(path) => Ok(self.reference(path).unwrap_or(JsonValue::Null)),
            Value::LetRef(name) => Ok(self.lets.get(name).cloned().unwrap_or(JsonValue::Null)),
            Value::Interpolation(parts) => {
                let mut out = String::new();
                for part in parts {
                    out.push_str(&display(&self.value(part)?));
                }
                Ok(JsonValue::String(out))
            }
            Value::Transformed { source, transform } => {
                let source = self.value(source)?;
                transform_value(&source, transform)
            }
            Value::Collection(pipeline) => self.pipeline(pipeline),
            Value::MultiSource(multi) => self.multi_source(multi),
            Value::Array(builder) => self.array(builder),
            Value::Element(element) => self.element(element),
            Value::Call(call) => {
                let args = call
                    .args
                    .iter()
                    .map(|arg| self.value(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                stdlib::call(&call.package, &call.function, &args)
            }
        }
    }

    /// Resolve a reference path: locals, then lets, then `parameter`,
    /// then `context`.
    pub fn reference(&self, path: &str) -> Option<JsonValue> {
        let segments = parse_path(path);
        let (head, rest) = segments.split_first()?;
        let Segment::Field(name) = head else {
            return None;
        };
        let root = if let Some((_, local)) = self.locals.iter().rev().find(|(n, _)| n == name) {
            local
        } else if let Some(bound) = self.lets.get(name) {
            bound
        } else if name == "parameter" {
            self.ctx.parameters()
        } else if name == "context" {
            self.ctx.context()
        } else {
            return None;
        };
        document::get_segments(root, rest).cloned()
    }

    // ========================================================================
    // Conditions
    // ========================================================================

    pub fn condition(&mut self, cond: &Condition) -> Result<bool, EvalError> {
        let result = match cond {
            Condition::Compare { left, op, right } => {
                let left = self.value(left)?;
                let right = self.value(right)?;
                compare(&left, *op, &right)
            }
            Condition::And(parts) | Condition::AllOf(parts) => {
                for part in parts {
                    if !self.condition(part)? {
                        return Ok(false);
                    }
                }
                true
            }
            Condition::Or(parts) => {
                for part in parts {
                    if self.condition(part)? {
                        return Ok(true);
                    }
                }
                false
            }
            Condition::Not(inner) => !self.condition(inner)?,
            Condition::IsSet(name) => self.ctx.is_param_set(name),
            Condition::NotSet(name) => !self.ctx.is_param_set(name),
            Condition::PathExists(path) => self.reference(path).is_some_and(|v| !v.is_null()),
            Condition::PathNotExists(path) => !self.reference(path).is_some_and(|v| !v.is_null()),
            Condition::Truthy(value) => truthy(&self.value(value)?),
            Condition::Len { value, op, length } => {
                let value = self.value(value)?;
                let len = length_of(&value)?;
                compare(&JsonValue::from(len), *op, &JsonValue::from(*length))
            }
        };
        tracing::trace!(?cond, result, "evaluated condition");
        Ok(result)
    }

    /// Evaluate an optional guard; no guard holds.
    pub fn guard(&mut self, cond: Option<&Condition>) -> Result<bool, EvalError> {
        match cond {
            Some(cond) => self.condition(cond),
            None => Ok(true),
        }
    }
}

/// Text inserted for a value inside an interpolation.
pub fn display(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => String::new(),
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Null and `false` are false; everything else is true.
pub fn truthy(value: &JsonValue) -> bool {
    !matches!(value, JsonValue::Null | JsonValue::Bool(false))
}

/// Equality that treats `1` and `1.0` as the same number.
pub fn json_eq(left: &JsonValue, right: &JsonValue) -> bool {
    match (left, right) {
        (JsonValue::Number(l), JsonValue::Number(r)) => l.as_f64() == r.as_f64(),
        _ => left == right,
    }
}

pub fn compare(left: &JsonValue, op: CompOp, right: &JsonValue) -> bool {
    match op {
        CompOp::Eq => json_eq(left, right),
        CompOp::Ne => !json_eq(left, right),
        ordered => {
            let ordering = match (left, right) {
                (JsonValue::Number(l), JsonValue::Number(r)) => {
                    l.as_f64().zip(r.as_f64()).and_then(|(l, r)| l.partial_cmp(&r))
                }
                (JsonValue::String(l), JsonValue::String(r)) => Some(l.cmp(r)),
                _ => None,
            };
            match ordering {
                None => false,
                Some(ordering) => match ordered {
                    CompOp::Lt => ordering == Ordering::Less,
                    CompOp::Le => ordering != Ordering::Greater,
                    CompOp::Gt => ordering == Ordering::Greater,
                    _ => ordering != Ordering::Less,
                },
            }
        }
    }
}

fn length_of(value: &JsonValue) -> Result<usize, EvalError> {
    match value {
        JsonValue::Null => Ok(0),
        JsonValue::String(s) => Ok(s.chars().count()),
        JsonValue::Array(items) => Ok(items.len()),
        JsonValue::Object(map) => Ok(map.len()),
        other => Err(EvalError::mismatch("len", "string, list or struct", other)),
    }
}

/// Apply a transform. A null source (a missing parameter) stays null.
fn transform_value(source: &JsonValue, transform: &Transform) -> Result<JsonValue, EvalError> {
    if source.is_null() {
        return Ok(JsonValue::Null);
    }
    match transform {
        Transform::Add(n) => arithmetic(source, n, "+", |a, b| a.checked_add(b), |a, b| a + b),
        Transform::Sub(n) => arithmetic(source, n, "-", |a, b| a.checked_sub(b), |a, b| a - b),
        Transform::Mul(n) => arithmetic(source, n, "*", |a, b| a.checked_mul(b), |a, b| a * b),
        Transform::Div(n) => arithmetic(source, n, "/", |_, _| None, |a, b| a / b),
        Transform::Prefix(prefix) => match source {
            JsonValue::String(s) => Ok(JsonValue::String(format!("{}{}", prefix, s))),
            other => Err(EvalError::mismatch("prefix", "string", other)),
        },
        Transform::Suffix(suffix) => match source {
            JsonValue::String(s) => Ok(JsonValue::String(format!("{}{}", s, suffix))),
            other => Err(EvalError::mismatch("suffix", "string", other)),
        },
        Transform::ToString => match source {
            JsonValue::Number(_) | JsonValue::Bool(_) => Ok(JsonValue::String(display(source))),
            JsonValue::String(s) => Ok(JsonValue::String(s.clone())),
            other => Err(EvalError::mismatch("to string", "number", other)),
        },
    }
}

/// Integer arithmetic when both sides are integers and `int_op` succeeds,
/// float arithmetic otherwise.
fn arithmetic(
    left: &JsonValue,
    right: &JsonValue,
    op: &str,
    int_op: impl Fn(i64, i64) -> Option<i64>,
    float_op: impl Fn(f64, f64) -> f64,
) -> Result<JsonValue, EvalError> {
    let (JsonValue::Number(l), JsonValue::Number(r)) = (left, right) else {
        let found = if left.is_number() { right } else { left };
        return Err(EvalError::TypeMismatch {
            context: format!("arithmetic '{}'", op),
            expected: "number",
            found: kind_name(found).to_string(),
        });
    };
    if let Some(result) = l.as_i64().zip(r.as_i64()).and_then(|(l, r)| int_op(l, r)) {
        return Ok(JsonValue::from(result));
    }
    let (l, r) = (l.as_f64().unwrap_or_default(), r.as_f64().unwrap_or_default());
    Ok(Number::from_f64(float_op(l, r))
        .map(JsonValue::Number)
        .unwrap_or(JsonValue::Null))
}
